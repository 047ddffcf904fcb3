use thiserror::Error;

/// Main error type for the vigil supervisor
#[derive(Debug, Error)]
pub enum VigilError {
    // Startup validation errors
    #[error("Missing required startup input: {0}")]
    MissingInput(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // Child process errors
    #[error("Failed to spawn child process: {0}")]
    SpawnError(String),

    // Status server errors
    #[error("Status server error: {0}")]
    ServerError(String),

    // IO errors (automatically converted from std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for vigil operations
pub type Result<T> = std::result::Result<T, VigilError>;
