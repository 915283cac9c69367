//! Error types for the connectivity monitor
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for monitor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the connectivity monitor
///
/// Steady-state errors (`Config`, `Resolution`, `Publish`) are absorbed at
/// component boundaries and degrade gracefully: defaults are used, stale
/// values are retained, writes are retried next tick. Only `Startup` is
/// allowed to terminate the daemon.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (malformed or unreadable config file)
    #[error("configuration error: {0}")]
    Config(String),

    /// Public IP or geolocation lookup errors
    #[error("resolution error: {0}")]
    Resolution(String),

    /// State publication errors (status/history/ip file writes)
    #[error("publish error: {0}")]
    Publish(String),

    /// Probe setup errors (socket creation, name resolution plumbing)
    ///
    /// A probe that merely gets no reply is NOT an error; it is
    /// state-machine input and is represented as a timeout outcome.
    #[error("probe error: {0}")]
    Probe(String),

    /// Startup resource failures (state directory, pid file)
    ///
    /// The only class that terminates the daemon.
    #[error("startup error: {0}")]
    Startup(String),

    /// Notification sink delivery errors (logged, never escalated)
    #[error("notification error: {0}")]
    Notification(String),

    /// I/O errors with no more specific classification
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a resolution error
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }

    /// Create a publish error
    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }

    /// Create a probe error
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    /// Create a startup error
    pub fn startup(msg: impl Into<String>) -> Self {
        Self::Startup(msg.into())
    }

    /// Create a notification error
    pub fn notification(msg: impl Into<String>) -> Self {
        Self::Notification(msg.into())
    }

    /// Whether this error must terminate the daemon
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Startup(_))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
