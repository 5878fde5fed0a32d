//! Error types for promptvault

use crate::version::PromptId;
use thiserror::Error;

/// Result type for prompt operations
pub type Result<T> = std::result::Result<T, PromptError>;

/// Errors that can occur while editing, versioning or executing prompts
#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid model config: {0}")]
    ConfigParse(String),

    #[error("Remote error{}: {message}", status_suffix(.status))]
    Remote {
        status: Option<u16>,
        message: String,
    },

    #[error("An execution is already running")]
    ExecutionInProgress,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The prompt record was created or patched but appending the version failed.
    #[error("Prompt {prompt_id} was updated but the new version was not saved: {source}")]
    PartiallyApplied {
        prompt_id: PromptId,
        #[source]
        source: Box<PromptError>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl PromptError {
    /// Shorthand for a remote failure without a status code
    pub fn remote(message: impl Into<String>) -> Self {
        PromptError::Remote {
            status: None,
            message: message.into(),
        }
    }

    /// Whether the failed operation left local state exactly as it was
    pub fn is_state_preserving(&self) -> bool {
        !matches!(self, PromptError::PartiallyApplied { .. })
    }
}

impl From<anyhow::Error> for PromptError {
    fn from(err: anyhow::Error) -> Self {
        PromptError::remote(format!("{err:#}"))
    }
}
