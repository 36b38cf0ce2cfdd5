//! Error taxonomy for the scenario and load execution engines.
//!
//! Classification matters as much as the message: callers branch on the
//! variant to decide retry eligibility and step/worker outcome, not on the
//! text.

use thiserror::Error;

/// Top-level error returned by anything that can fail outside the
/// per-assertion / per-step classification performed inline during
/// execution (see [`crate::model::Outcome`]).
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed scenario or host config discovered at load time.
    #[error("validation error: {0}")]
    Validation(String),

    /// DNS, connection, or protocol failure reaching the host.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request exceeded its effective timeout.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A comparison inside an assertion raised rather than resolved to
    /// true/false (e.g. ordering incompatible types). This never escapes
    /// a step — it degrades the single assertion to failed — but the
    /// type is shared so `Assertions` and the taxonomy stay aligned.
    #[error("assertion evaluation error: {0}")]
    AssertionEvalError(String),

    /// Repository/filesystem I/O failure.
    #[error("repository I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Repository content failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl EngineError {
    /// True for the two categories a [`crate::scenario_engine::ScenarioEngine`]
    /// attempt retries on. Assertion failures and validation errors are not
    /// retried — only the request itself failing is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transport(_) | EngineError::Timeout(_))
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Transport(err.to_string())
    }
}
