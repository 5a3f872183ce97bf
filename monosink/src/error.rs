//! Error types for monosink
//!
//! Defines crate error types using thiserror for clear error propagation.
//! Buffer starvation and upstream end-of-stream are not errors: the callback
//! bridge reports them as outcomes, and streams carry them as flags.

use thiserror::Error;

/// Main error type for monosink
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection setup failed (event loop, stream object or format negotiation)
    #[error("Setup failed: {0}")]
    Setup(String),

    /// Audio output device errors after the connection is established
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using monosink Error
pub type Result<T> = std::result::Result<T, Error>;
