use thiserror::Error;

/// Main error type for loghistory operations
#[derive(Error, Debug)]
pub enum LogHistoryError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid time window: {0}")]
    Window(String),

    #[error("Malformed log line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },

    #[error("No in-window requests, cannot determine the flow start time")]
    NoFlowOrigin,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, LogHistoryError>;
