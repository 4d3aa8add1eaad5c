// ============================================
// File: crates/veilink-relay/src/error.rs
// ============================================
//! # Relay Error Types
//!
//! ## Last Modified
//! v0.1.0 - Initial relay errors

use std::net::Ipv4Addr;

use thiserror::Error;

use veilink_common::error::CommonError;
use veilink_core::error::CoreError;
use veilink_core::identity::Label;
use veilink_transport::error::TransportError;

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

// ============================================
// AddressError
// ============================================

/// Address-map and packet validation failures.
#[derive(Error, Debug)]
pub enum AddressError {
    #[error("Invalid CIDR '{value}': {reason}")]
    InvalidCidr { value: String, reason: String },

    #[error("Invalid label '{value}': {reason}")]
    InvalidLabel { value: String, reason: String },

    #[error("No address ranges registered for {label}")]
    UnmappedLabel { label: Label },

    #[error("Packet of {len} bytes is shorter than {min}")]
    PacketTooShort { len: usize, min: usize },

    #[error("Unsupported IP version {version}")]
    UnsupportedVersion { version: u8 },

    #[error("Source {addr} is outside the ranges of {label}")]
    SpoofedSource { label: Label, addr: Ipv4Addr },

    #[error("Destination {addr} is outside our ranges")]
    ForeignDestination { addr: Ipv4Addr },

    #[error("Address map '{path}': {reason}")]
    Persistence { path: String, reason: String },
}

impl AddressError {
    pub fn invalid_cidr(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCidr {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_label(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidLabel {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn persistence(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Persistence {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for per-packet rejections (as opposed to bad map
    /// data).
    #[must_use]
    pub const fn is_packet_rejection(&self) -> bool {
        matches!(
            self,
            Self::UnmappedLabel { .. }
                | Self::PacketTooShort { .. }
                | Self::UnsupportedVersion { .. }
                | Self::SpoofedSource { .. }
                | Self::ForeignDestination { .. }
        )
    }
}

// ============================================
// RelayError
// ============================================

/// Relay error types.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad { path: String, reason: String },

    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid { field: String, reason: String },

    #[error("Key file '{path}': {reason}")]
    KeyStore { path: String, reason: String },

    #[error("Datagram session lost: {source}")]
    SessionLost {
        #[source]
        source: TransportError,
    },

    #[error("Device failed after {attempts} attempts: {source}")]
    Device {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("Malformed frame: {reason}")]
    MalformedFrame { reason: String },

    #[error("Relay is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn key_store(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::KeyStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed_frame(reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigLoad { .. } | Self::ConfigInvalid { .. })
    }

    #[must_use]
    pub const fn is_address_error(&self) -> bool {
        matches!(self, Self::Address(_))
    }

    /// Returns `true` if the relay (or the process, at startup) can't
    /// continue.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad { .. }
                | Self::ConfigInvalid { .. }
                | Self::KeyStore { .. }
                | Self::SessionLost { .. }
                | Self::Device { .. }
        )
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelayError::config_load("/etc/veilink/veilink.toml", "file not found");
        assert!(err.to_string().contains("/etc/veilink/veilink.toml"));

        let err = AddressError::invalid_cidr("10.0.0.0/33", "prefix too long");
        assert!(err.to_string().contains("10.0.0.0/33"));
    }

    #[test]
    fn test_error_classification() {
        let config_err = RelayError::config_invalid("relay.queue_capacity", "must be > 0");
        assert!(config_err.is_config_error());
        assert!(config_err.is_fatal());

        let lost = RelayError::SessionLost {
            source: TransportError::connection_closed("receive"),
        };
        assert!(lost.is_fatal());
        assert!(!lost.is_config_error());

        let rejected: RelayError = AddressError::PacketTooShort { len: 4, min: 20 }.into();
        assert!(rejected.is_address_error());
        assert!(!rejected.is_fatal());
    }

    #[test]
    fn test_packet_rejection_classification() {
        assert!(AddressError::PacketTooShort { len: 4, min: 20 }.is_packet_rejection());
        assert!(!AddressError::invalid_label("x", "bad").is_packet_rejection());
    }
}
