//! Unified error types for the Parley core.
//!
//! Three families are kept apart:
//!
//! - [`UsageError`]: the caller misused the API (no thread, reply on a
//!   reaction, mutating a form that is already being sent). Returned
//!   synchronously.
//! - [`TransportError`]: the wire failed underneath an adapter.
//! - [`AdapterError`]: anything a platform operation can fail with once it
//!   runs asynchronously. It is `Clone` so that a single captured failure can
//!   be handed to every awaiter of a dispatch handle.

use thiserror::Error;

// =============================================================================
// Usage Errors
// =============================================================================

/// Errors caused by calling the API incorrectly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    /// No target thread could be resolved for a dispatch.
    #[error("missing target thread ID")]
    MissingThread,

    /// `reply` was called but no message to reply to could be resolved.
    #[error("missing target message ID to reply to")]
    MissingReplyTo,

    /// The operation only makes sense on message-like events.
    #[error("{operation}(...) will only work on message/message_reply events")]
    NotMessageEvent {
        /// The facade operation that was attempted.
        operation: &'static str,
    },

    /// The dispatch form was changed after the adapter began sending it.
    #[error("cannot modify form after dispatch started")]
    FormLocked,

    /// The dispatch handle was resolved twice.
    #[error("dispatch handle already resolved")]
    AlreadyResolved,

    /// The form had neither a body nor attachments.
    #[error("nothing to send: form has no body and no attachments")]
    NothingToSend,
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur in transport operations.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The URL that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// Connection closed.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// Request or frame could not be sent.
    #[error("failed to send request: {0}")]
    SendFailed(String),

    /// The remote answered with a non-success status.
    #[error("request failed with status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The remote did not answer in time.
    #[error("request timed out")]
    Timeout,

    /// Invalid configuration.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// An inbound payload could not be understood.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Adapter Errors
// =============================================================================

/// Errors that can occur in adapter operations.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// Native event parsing failed.
    #[error("failed to parse event: {reason}")]
    ParseError {
        /// Reason for failure.
        reason: String,
    },

    /// The platform refused the request.
    #[error("platform rejected request: {0}")]
    Rejected(String),

    /// The adapter does not implement this operation.
    #[error("{operation} is not supported by the {platform} adapter")]
    Unsupported {
        /// Platform name of the adapter.
        platform: &'static str,
        /// Operation that was attempted.
        operation: &'static str,
    },

    /// A user id could not be turned into a display name.
    #[error("cannot fetch user's name: {user_id}")]
    UsernameUnresolved {
        /// The identifier that failed to resolve.
        user_id: String,
    },

    /// A platform-specific API was requested from the wrong adapter.
    #[error("adapter mismatch: expected {expected}, found {actual}")]
    AdapterMismatch {
        /// Requested adapter type.
        expected: &'static str,
        /// Platform of the adapter actually attached.
        actual: &'static str,
    },

    /// The adapter configuration is unusable.
    #[error("invalid adapter configuration: {0}")]
    InvalidConfig(String),

    /// Internal adapter error.
    #[error("adapter error: {0}")]
    Internal(String),

    /// Usage error surfaced through an asynchronous path.
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// Transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl AdapterError {
    /// Creates an internal adapter error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Creates a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError { reason: msg.into() }
    }

    /// Creates a rejection error.
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Creates an unsupported-operation error.
    pub fn unsupported(platform: &'static str, operation: &'static str) -> Self {
        Self::Unsupported {
            platform,
            operation,
        }
    }

    /// Creates a username resolution error.
    pub fn username_unresolved(user_id: impl Into<String>) -> Self {
        Self::UsernameUnresolved {
            user_id: user_id.into(),
        }
    }

    /// Returns `true` if this error only signals a missing capability.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for synchronous API usage.
pub type UsageResult<T> = Result<T, UsageError>;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;
