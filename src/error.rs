use thiserror::Error;

use crate::challenge::ChallengeType;

/// Host-side faults. Everything a learner can cause is reported as a
/// `TestResult` instead.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("invalid challenge: {0}")]
    InvalidChallenge(String),

    #[error("invalid configuration `{key}`: {reason}")]
    Config { key: &'static str, reason: String },

    #[error("failed to start sandbox thread: {0}")]
    SandboxSpawn(#[from] std::io::Error),

    #[error("evaluation task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("SyntaxError: {message} ({line}:{column})")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("failed to emit compiled code: {0}")]
    Emit(String),

    #[error("challenge type `{0}` has no executable code")]
    NotExecutable(ChallengeType),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("malformed {tag} payload: {error}")]
    Payload {
        tag: &'static str,
        #[source]
        error: serde_json::Error,
    },

    #[error("failed to encode {tag} payload: {error}")]
    Encode {
        tag: &'static str,
        #[source]
        error: serde_json::Error,
    },
}

/// A value payload from the sandbox that could not be rebuilt.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed value payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("value payload refers to unknown node {0}")]
    UnknownNode(usize),

    #[error("value is nested deeper than {0} levels")]
    TooDeep(usize),
}
