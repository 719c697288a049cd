use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RunnerError;

/// Closed set of challenge kinds produced by the course content layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeType {
    React,
    Typescript,
    Markup,
    Media,
    Project,
    Section,
    #[serde(other)]
    Other,
}

impl ChallengeType {
    /// Only these kinds carry code that the sandbox can run.
    pub fn is_executable(self) -> bool {
        matches!(self, Self::React | Self::Typescript | Self::Markup)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::React => "react",
            Self::Typescript => "typescript",
            Self::Markup => "markup",
            Self::Media => "media",
            Self::Project => "project",
            Self::Section => "section",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single course exercise, read-only input to the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ChallengeType,
    #[serde(default)]
    pub test_code: String,
    #[serde(default)]
    pub solution_code: Option<String>,
    #[serde(default)]
    pub starter_code: Option<String>,
}

impl Challenge {
    pub fn new(id: impl Into<String>, kind: ChallengeType) -> Self {
        Self {
            id: id.into(),
            kind,
            test_code: String::new(),
            solution_code: None,
            starter_code: None,
        }
    }

    pub fn with_solution(mut self, code: impl Into<String>) -> Self {
        self.solution_code = Some(code.into());
        self
    }

    pub fn with_starter(mut self, code: impl Into<String>) -> Self {
        self.starter_code = Some(code.into());
        self
    }

    pub fn with_tests(mut self, code: impl Into<String>) -> Self {
        self.test_code = code.into();
        self
    }

    /// The code under test: the solution when present, otherwise the
    /// starter code (for markup challenges this is the markup itself).
    pub fn code(&self) -> &str {
        self.solution_code
            .as_deref()
            .or(self.starter_code.as_deref())
            .unwrap_or("")
    }

    /// Rejects records that indicate a broken integration rather than a
    /// learner mistake.
    pub fn validate(&self) -> Result<(), RunnerError> {
        if self.id.trim().is_empty() {
            return Err(RunnerError::InvalidChallenge("challenge is missing an id".to_string()));
        }
        if self.kind.is_executable() && self.test_code.trim().is_empty() {
            return Err(RunnerError::InvalidChallenge(format!(
                "challenge {} of type {} has no test code",
                self.id, self.kind
            )));
        }
        Ok(())
    }

    pub fn parse(data: &Value) -> Result<Self, RunnerError> {
        let challenge: Challenge = serde_json::from_value(data.clone())
            .map_err(|e| RunnerError::InvalidChallenge(format!("failed to parse challenge: {}", e)))?;
        challenge.validate()?;
        Ok(challenge)
    }

    pub fn parse_all(data: &Value) -> Result<Vec<Self>, RunnerError> {
        let challenges = data
            .as_array()
            .ok_or_else(|| RunnerError::InvalidChallenge("challenge data is not an array".to_string()))?;

        challenges.iter().map(Self::parse).collect()
    }
}
