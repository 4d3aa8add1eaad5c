// ============================================
// File: crates/veilink-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Creation Reason
//! Defines error types for router control connections, sessions and the
//! local device capability.
//!
//! ## Main Functionality
//! - `TransportError`: Primary error enum for transport operations
//! - Error conversion from system and core errors
//! - Classification into protocol / network / device failures
//!
//! ## Error Categories
//! 1. **Network Errors**: Connect failures, closed control connections,
//!    timeouts, unreachable peers
//! 2. **Protocol Errors**: Malformed or unexpected router replies and
//!    router rejections
//! 3. **Session Errors**: Use after close, second listener
//! 4. **Device Errors**: Local read/write failures
//!
//! ## ⚠️ Important Note for Next Developer
//! - A closed control connection is fatal for its session; the
//!   protocol client never reconnects on its own
//! - Never format private key blobs into these errors
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::io;

use thiserror::Error;

use veilink_common::error::CommonError;
use veilink_core::error::CoreError;

use crate::sam::reply::ControlFailure;

// ============================================
// Result Type Alias
// ============================================

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

// ============================================
// TransportError
// ============================================

/// Transport layer error types.
#[derive(Error, Debug)]
pub enum TransportError {
    // ========================================
    // Network Errors
    // ========================================

    /// Could not reach the router's control endpoint.
    #[error("Failed to connect to router at {addr}: {reason}")]
    ConnectFailed {
        /// Router address
        addr: String,
        /// Why the connect failed
        reason: String,
    },

    /// The router closed a control connection.
    #[error("Control connection closed during {context}")]
    ConnectionClosed {
        /// What we were doing
        context: String,
    },

    /// Operation timed out.
    #[error("Operation timed out: {operation}")]
    Timeout {
        /// What operation timed out
        operation: String,
    },

    // ========================================
    // Protocol Errors
    // ========================================

    /// A reply line could not be parsed.
    #[error("Malformed router reply: {reason}")]
    MalformedReply {
        /// What is wrong
        reason: String,
    },

    /// The router answered with a different reply than expected.
    #[error("Unexpected router reply: expected '{expected}', got '{got}'")]
    UnexpectedReply {
        /// Expected topic and kind
        expected: String,
        /// Received topic and kind
        got: String,
    },

    /// The router doesn't speak any version in our window.
    #[error("Router supports no protocol version between {min} and {max}")]
    UnsupportedVersion {
        /// Lowest version offered
        min: String,
        /// Highest version offered
        max: String,
    },

    /// The router rejected a command.
    #[error("Router rejected {command}: {failure}{}", .message.as_deref().map(|m| format!(" ({m})")).unwrap_or_default())]
    Rejected {
        /// Command topic
        command: String,
        /// Typed rejection reason
        failure: ControlFailure,
        /// Router's explanation, if any
        message: Option<String>,
    },

    /// A datagram exceeded the router's size limit.
    #[error("Datagram of {size} bytes exceeds limit {max}")]
    DatagramTooLarge {
        /// Payload size
        size: usize,
        /// Router limit
        max: usize,
    },

    // ========================================
    // Session Errors
    // ========================================

    /// The session has been closed.
    #[error("Session is closed")]
    SessionClosed,

    /// The session already has an active listener.
    #[error("Session already has an active listener")]
    ListenerActive,

    // ========================================
    // Device Errors
    // ========================================

    /// Device read failed.
    #[error("Device read failed: {reason}")]
    DeviceRead {
        /// Why read failed
        reason: String,
    },

    /// Device write failed.
    #[error("Device write failed: {reason}")]
    DeviceWrite {
        /// Why write failed
        reason: String,
    },

    /// Device has been closed.
    #[error("Device is closed")]
    DeviceClosed,

    // ========================================
    // Configuration Errors
    // ========================================

    /// Invalid configuration.
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig {
        /// Configuration field name
        field: String,
        /// Why it's invalid
        reason: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// I/O error from the system.
    #[error("I/O error: {context}")]
    Io {
        /// What was happening when the error occurred
        context: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Error from core crate.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl TransportError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `ConnectFailed` error.
    pub fn connect_failed(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            addr: addr.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `ConnectionClosed` error.
    pub fn connection_closed(context: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            context: context.into(),
        }
    }

    /// Creates a `Timeout` error.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Creates a `MalformedReply` error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedReply {
            reason: reason.into(),
        }
    }

    /// Creates a `Rejected` error.
    pub fn rejected(
        command: impl Into<String>,
        failure: ControlFailure,
        message: Option<String>,
    ) -> Self {
        Self::Rejected {
            command: command.into(),
            failure,
            message,
        }
    }

    /// Creates an `Io` error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Maps a socket error, turning EOF-like kinds into `ConnectionClosed`.
    pub fn from_socket(context: impl Into<String>, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Self::connection_closed(context),
            _ => Self::io(context, source),
        }
    }

    /// Creates an `InvalidConfig` error.
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` for malformed, unexpected or rejected replies.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        match self {
            Self::MalformedReply { .. }
            | Self::UnexpectedReply { .. }
            | Self::UnsupportedVersion { .. }
            | Self::DatagramTooLarge { .. } => true,
            Self::Rejected { failure, .. } => !failure.is_network(),
            _ => false,
        }
    }

    /// Returns `true` for connection failures, timeouts and unreachable
    /// peers.
    #[must_use]
    pub fn is_network_error(&self) -> bool {
        match self {
            Self::ConnectFailed { .. }
            | Self::ConnectionClosed { .. }
            | Self::Timeout { .. }
            | Self::Io { .. } => true,
            Self::Rejected { failure, .. } => failure.is_network(),
            _ => false,
        }
    }

    /// Returns `true` for local device failures.
    #[must_use]
    pub const fn is_device_error(&self) -> bool {
        matches!(
            self,
            Self::DeviceRead { .. } | Self::DeviceWrite { .. } | Self::DeviceClosed
        )
    }

    /// Returns `true` if the session that produced this error can no
    /// longer be used and must be recreated by its owner.
    #[must_use]
    pub const fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed { .. } | Self::SessionClosed | Self::Io { .. }
        )
    }

    /// Returns `true` if this error is transient and retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::DeviceRead { .. } | Self::DeviceWrite { .. } => true,
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
            ),
            Self::Rejected { failure, .. } => failure.is_network(),
            _ => false,
        }
    }
}

// ============================================
// Error Conversions
// ============================================

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::from_socket("unspecified I/O operation", err)
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::connect_failed("127.0.0.1:7656", "connection refused");
        assert!(err.to_string().contains("127.0.0.1:7656"));
        assert!(err.to_string().contains("connection refused"));

        let err = TransportError::rejected(
            "SESSION",
            ControlFailure::DuplicatedId,
            Some("Duplicate id".into()),
        );
        assert!(err.to_string().contains("DUPLICATED_ID"));
        assert!(err.to_string().contains("Duplicate id"));
    }

    #[test]
    fn test_rejection_classification() {
        let unreachable = TransportError::rejected("STREAM", ControlFailure::PeerUnreachable, None);
        assert!(unreachable.is_network_error());
        assert!(!unreachable.is_protocol_error());
        assert!(unreachable.is_retryable());

        let invalid = TransportError::rejected("SESSION", ControlFailure::InvalidKey, None);
        assert!(invalid.is_protocol_error());
        assert!(!invalid.is_network_error());
        assert!(!invalid.is_retryable());
    }

    #[test]
    fn test_session_fatal() {
        assert!(TransportError::connection_closed("receive").is_session_fatal());
        assert!(TransportError::SessionClosed.is_session_fatal());
        assert!(!TransportError::malformed("bad").is_session_fatal());
        assert!(TransportError::DeviceClosed.is_device_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(
            TransportError::from(eof),
            TransportError::ConnectionClosed { .. }
        ));

        let would_block = io::Error::new(io::ErrorKind::WouldBlock, "would block");
        let err: TransportError = would_block.into();
        assert!(err.is_retryable());
    }
}
