use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::harness::TestResult;

/// Tag on every envelope crossing the sandbox boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Source {
    Log,
    Info,
    Warn,
    Error,
    TestResults,
    TestError,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Log => "LOG",
            Source::Info => "INFO",
            Source::Warn => "WARN",
            Source::Error => "ERROR",
            Source::TestResults => "TEST_RESULTS",
            Source::TestError => "TEST_ERROR",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "LOG" => Some(Source::Log),
            "INFO" => Some(Source::Info),
            "WARN" => Some(Source::Warn),
            "ERROR" => Some(Source::Error),
            "TEST_RESULTS" => Some(Source::TestResults),
            "TEST_ERROR" => Some(Source::TestError),
            _ => None,
        }
    }

    /// Console levels; everything else is reserved for the runner itself.
    pub fn is_diagnostic(self) -> bool {
        matches!(self, Source::Log | Source::Info | Source::Warn | Source::Error)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{ source, message }`, where `message` is itself JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub source: Source,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorPayload {
    error: String,
}

impl Envelope {
    pub fn diagnostic(level: Source, text: &str) -> Result<Self, ProtocolError> {
        Self::with_payload(level, &text)
    }

    pub fn results(results: &[TestResult]) -> Result<Self, ProtocolError> {
        Self::with_payload(Source::TestResults, &results)
    }

    pub fn test_error(error: impl Into<String>) -> Result<Self, ProtocolError> {
        Self::with_payload(Source::TestError, &ErrorPayload { error: error.into() })
    }

    fn with_payload<T: Serialize + ?Sized>(source: Source, payload: &T) -> Result<Self, ProtocolError> {
        let message = serde_json::to_string(payload).map_err(|error| ProtocolError::Encode {
            tag: source.as_str(),
            error,
        })?;
        Ok(Self { source, message })
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|error| ProtocolError::Encode { tag: "envelope", error })
    }

    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(ProtocolError::Envelope)
    }
}

/// What the host does with one decoded envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Diagnostic(Source, String),
    Results(Vec<TestResult>),
    Failure(TestResult),
}

pub fn dispatch(envelope: &Envelope) -> Result<Delivery, ProtocolError> {
    let payload_error = |error| ProtocolError::Payload {
        tag: envelope.source.as_str(),
        error,
    };

    match envelope.source {
        Source::Log | Source::Info | Source::Warn | Source::Error => {
            // Log payloads are JSON strings, but a bare text payload is still worth showing.
            let text = serde_json::from_str::<String>(&envelope.message).unwrap_or_else(|_| envelope.message.clone());
            Ok(Delivery::Diagnostic(envelope.source, text))
        }
        Source::TestResults => {
            let results: Vec<TestResult> = serde_json::from_str(&envelope.message).map_err(payload_error)?;
            Ok(Delivery::Results(results))
        }
        Source::TestError => {
            let payload: ErrorPayload = serde_json::from_str(&envelope.message).map_err(payload_error)?;
            Ok(Delivery::Failure(TestResult::sandbox_failure(payload.error)))
        }
    }
}

/// Decodes raw envelope text and dispatches it in one step.
pub fn receive(raw: &str) -> Result<Delivery, ProtocolError> {
    dispatch(&Envelope::decode(raw)?)
}
