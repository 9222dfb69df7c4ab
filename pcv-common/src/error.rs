//! Common error types for pcv

use thiserror::Error;

/// Common result type for pcv operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type shared by the pcv crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Row expected to exist is missing (e.g. settling a job that is no longer running)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Stored data that cannot be decoded (corrupt queue or result rows, bad timestamps)
    #[error("Internal error: {0}")]
    Internal(String),
}
