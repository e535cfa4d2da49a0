use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CockpitError {
    /// Connect, timeout or body-read failure below HTTP.
    #[error("Failed to {operation}: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    /// The service answered with a non-success status.
    #[error("Failed to {operation}: {status_text}")]
    Remote {
        operation: &'static str,
        status: u16,
        status_text: String,
    },

    #[error("Browser automation failed at {action}: {message}")]
    BrowserAutomation {
        index: usize,
        action: String,
        message: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Failed to decode {operation} response: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },

    #[error("An agent run is already in progress")]
    RunInProgress,

    #[error("Run was cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CockpitError {
    /// Stable identifier used as `error_code` in observability events.
    pub fn code(&self) -> &'static str {
        match self {
            CockpitError::Transport { .. } => "transport",
            CockpitError::Remote { .. } => "remote",
            CockpitError::BrowserAutomation { .. } => "browser_automation",
            CockpitError::Validation(_) => "validation",
            CockpitError::Decode { .. } => "decode",
            CockpitError::RunInProgress => "run_in_progress",
            CockpitError::Cancelled => "cancelled",
            CockpitError::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, CockpitError>;
