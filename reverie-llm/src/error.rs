//! Narration gateway errors.
//!
//! Split by where a call went wrong: reaching the narrator, reading its
//! reply, or the reply failing the contract of the call that asked for it
//! (intent, narration, location).  Only the first group is worth retrying.

use thiserror::Error;

/// Why a gateway call produced no usable result.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// No narrator configured, or nothing answers at the endpoint.
    #[error("narrator offline: {0}")]
    Offline(String),

    /// The narrator answered with a transport or server failure.
    #[error("narrator transport failure: {0}")]
    Transport(String),

    /// No answer within the per-call timeout.
    #[error("narrator did not answer within {0}ms")]
    Timeout(u64),

    /// Every attempt failed with a retryable error.
    #[error("narrator gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// The final attempt's error.
        last: String,
    },

    /// The reply held no JSON document of the requested shape.
    #[error("narrator reply is not the requested JSON: {0}")]
    MalformedReply(String),

    /// An intent extraction that cannot be used.
    #[error("intent extraction rejected: {0}")]
    Intent(String),

    /// Narration prose that cannot be shown.
    #[error("narration rejected: {0}")]
    Narration(String),

    /// A location draft that cannot be materialized.
    #[error("location draft rejected: {0}")]
    Location(String),

    /// A rendered prompt would not fit the context the narrator is given.
    #[error("prompt '{prompt}' renders to {chars} characters, over the {budget} budget")]
    PromptBudget {
        /// Template name.
        prompt: String,
        /// Rendered length.
        chars: usize,
        /// Allowed length.
        budget: usize,
    },

    /// A prompt template is missing or malformed.
    #[error("prompt template: {0}")]
    Template(String),

    /// `[llm]` settings the client cannot run with.
    #[error("narrator misconfigured: {0}")]
    Config(String),
}

impl LlmError {
    /// Whether another attempt could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_) | Self::Offline(_))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(0)
        } else if err.is_connect() {
            Self::Offline(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Gateway result.
pub type Result<T> = std::result::Result<T, LlmError>;
