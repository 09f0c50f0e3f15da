//! Error types for por-link.
//!
//! Defines the main error enum used throughout the crate.

use thiserror::Error;

/// Main error type for por-link operations.
///
/// Cloneable so a single failed connection attempt can be delivered to every
/// caller that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PorError {
    /// Session errors (node unreachable, handshake timeout, readiness never signaled, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Raw transport failures (socket closed, RPC error object, malformed response, etc.)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration errors (invalid config file, invalid endpoint URL, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rejected caller input (negative amounts, zero circulation, etc.)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PorError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a transport error with the given message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an invalid input error with the given message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wraps any error as a connection error, keeping its inner message.
    ///
    /// Errors that already are connection errors pass through unchanged.
    pub fn into_connection(self) -> Self {
        match self {
            Self::Connection(_) => self,
            Self::Transport(msg)
            | Self::Config(msg)
            | Self::InvalidInput(msg)
            | Self::Internal(msg) => Self::Connection(msg),
        }
    }

    /// Returns the inner message without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Connection(msg)
            | Self::Transport(msg)
            | Self::Config(msg)
            | Self::InvalidInput(msg)
            | Self::Internal(msg) => msg,
        }
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Transport(_) => "Transport Error",
            Self::Config(_) => "Configuration Error",
            Self::InvalidInput(_) => "Invalid Input",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using PorError.
pub type Result<T> = std::result::Result<T, PorError>;
