use std::io;
use thiserror::Error;

/// Result type for remux operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for remux operations.
///
/// Malformed media never produces an error: parsers degrade and the
/// controller reports missing frames through events instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Serializing a box tree failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A configuration value could not be understood.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
