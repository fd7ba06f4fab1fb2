//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the Harpoon runtime.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input (bad query, unknown column, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found (unknown table, unknown server, ...).
    #[error("not found: {0}")]
    NotFound(String),

    /// The consumer of a queue has exited; nothing will drain new events.
    #[error("queue closed: {0}")]
    QueueClosed(String),

    /// Invalid event loop state transition (start twice, join before start).
    #[error("state transition error: {0}")]
    StateTransition(String),

    /// Internal errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn queue_closed(msg: impl Into<String>) -> Self {
        Self::QueueClosed(msg.into())
    }

    pub fn state_transition(msg: impl Into<String>) -> Self {
        Self::StateTransition(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short stable label for log fields.
    pub fn as_label(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::QueueClosed(_) => "queue_closed",
            Error::StateTransition(_) => "state_transition",
            Error::Internal(_) => "internal",
            Error::Serialization(_) => "serialization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_context() {
        let err = Error::queue_closed("user-manager");
        assert_eq!(err.to_string(), "queue closed: user-manager");
        assert_eq!(err.as_label(), "queue_closed");

        let err = Error::not_found("table backlog");
        assert_eq!(err.to_string(), "not found: table backlog");
    }

    #[test]
    fn test_from_serde_json() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: Error = parse.unwrap_err().into();
        assert_eq!(err.as_label(), "serialization");
    }
}
