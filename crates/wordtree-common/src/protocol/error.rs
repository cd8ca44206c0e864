use thiserror::Error;

#[derive(Error, Debug)]
pub enum WordTreeError {
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Message too large: {size} bytes (max {max} bytes)")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Component is shut down: {0}")]
    Shutdown(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<std::net::AddrParseError> for WordTreeError {
    fn from(err: std::net::AddrParseError) -> Self {
        WordTreeError::InvalidArgument(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WordTreeError>;
