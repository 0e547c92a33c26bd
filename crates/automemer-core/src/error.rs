//! Error types for automemer-core.

use thiserror::Error;

/// Result type alias using automemer-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for automemer operations
#[derive(Error, Debug)]
pub enum Error {
    // Archive errors
    #[cfg(feature = "db")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,

    // Content source errors
    #[error("Access to /r/{0} is forbidden")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Content source error: {0}")]
    Source(String),

    // Chat platform errors
    #[error("Chat platform error: {0}")]
    Chat(String),

    #[error("Chat transport closed: {0}")]
    TransportClosed(String),

    // Settings errors
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a content source error
    pub fn source(message: impl Into<String>) -> Self {
        Self::Source(message.into())
    }

    /// Create a chat platform error
    pub fn chat(message: impl Into<String>) -> Self {
        Self::Chat(message.into())
    }

    /// Create a transport-closed error
    pub fn transport_closed(message: impl Into<String>) -> Self {
        Self::TransportClosed(message.into())
    }

    /// Check if the chat connection was lost
    pub fn is_transport_closed(&self) -> bool {
        matches!(self, Self::TransportClosed(_))
    }

    /// Check if a visibility lookup was refused
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden(_))
    }
}
