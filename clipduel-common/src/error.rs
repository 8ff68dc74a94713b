//! Common error types for ClipDuel

use thiserror::Error;

/// Common result type for ClipDuel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by ClipDuel crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input, e.g. a duel pairing a moment with itself
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
