//! Error types for the limiter.

use thiserror::Error;

/// Main error type for limiter operations.
///
/// Denials are not errors: a denied schedule is an ordinary
/// [`Delay::Wait`](crate::ratelimit::Delay::Wait).
#[derive(Error, Debug)]
pub enum LimiterError {
    /// The limiter was closed, or its actor is no longer running
    #[error("limiter closed")]
    Closed,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for limiter operations.
pub type Result<T> = std::result::Result<T, LimiterError>;
