//! Error types for sprocket

use thiserror::Error;

/// Core error type for stored-procedure execution
#[derive(Error, Debug)]
pub enum SprocketError {
    /// The context has no usable connection (absent or disposed).
    #[error("Connection state error: {0}")]
    ConnectionState(String),

    /// The caller-supplied parameter list violates a structural rule.
    #[error("Parameter contract violated: {0}")]
    ParameterContract(String),

    /// A driver value could not be coerced to the requested type.
    #[error("Type cast error: {0}")]
    TypeCast(String),

    /// Failure raised by the driver while opening, executing, committing or
    /// rolling back.
    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration parse error: {0}")]
    TomlDeserialize(#[from] toml::de::Error),
}

impl SprocketError {
    /// Whether this error originated inside the database driver.
    pub fn is_driver_error(&self) -> bool {
        matches!(self, SprocketError::Driver(_) | SprocketError::Timeout(_))
    }
}

/// Result type alias for sprocket operations
pub type Result<T> = std::result::Result<T, SprocketError>;
