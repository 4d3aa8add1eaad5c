// ============================================
// File: crates/veilink-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Defines error types for the bencode codec, the link-frame protocol and
//! identity handling in the veilink core crate.
//!
//! ## Main Functionality
//! - `CodecError`: Grammar violations while decoding bencode
//! - `CoreError`: Primary error enum for core operations
//!
//! ## Error Categories
//! 1. **Codec Errors**: Leading zeros, bad tags, truncated input
//! 2. **Protocol Errors**: Missing or mistyped frame fields, bad packing
//! 3. **Identity Errors**: Undecodable destinations, malformed labels
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER include private key material in error messages
//! - Codec and protocol errors abort only the call that produced them;
//!   callers decide whether to drop the unit or propagate
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use veilink_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// CodecError
// ============================================

/// Grammar violations found while decoding bencode.
#[derive(Error, Debug)]
pub enum CodecError {
    /// A length or integer started with `0` and had more digits.
    #[error("Leading zero in {field}")]
    LeadingZero {
        /// "integer" or "length"
        field: &'static str,
    },

    /// A byte appeared where a type tag or digit was expected.
    #[error("Unexpected byte 0x{byte:02x}, expected {expected}")]
    UnexpectedByte {
        /// The offending byte
        byte: u8,
        /// What the grammar allowed at this position
        expected: &'static str,
    },

    /// The stream ended before the value was complete.
    #[error("Unexpected end of input while reading {context}")]
    UnexpectedEof {
        /// What was being read
        context: &'static str,
    },

    /// A dictionary key was not a byte string.
    #[error("Dictionary key must be a byte string, found tag 0x{tag:02x}")]
    NonStringKey {
        /// Type tag found in key position
        tag: u8,
    },

    /// An integer had no digits (`ie`, `i-e`).
    #[error("Integer has no digits")]
    EmptyInteger,

    /// Negative zero is not a canonical integer.
    #[error("Negative zero is not allowed")]
    NegativeZero,

    /// An integer or length does not fit the target type.
    #[error("Numeric overflow in {field}")]
    Overflow {
        /// "integer" or "length"
        field: &'static str,
    },

    /// A byte string declared a length above the decoder limit.
    #[error("Byte string length {length} exceeds limit {max}")]
    LengthTooLarge {
        /// Declared length
        length: usize,
        /// Decoder limit
        max: usize,
    },

    /// Lists and dictionaries nested deeper than the decoder limit.
    #[error("Nesting deeper than {max} levels")]
    NestingTooDeep {
        /// Decoder limit
        max: usize,
    },

    /// Bytes remained after a complete value in a whole-buffer decode.
    #[error("{count} trailing bytes after value")]
    TrailingBytes {
        /// Number of unread bytes
        count: usize,
    },

    /// A typed accessor was used on the wrong variant.
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Requested variant
        expected: &'static str,
        /// Actual variant
        found: &'static str,
    },

    /// Underlying reader failed.
    #[error("I/O error while decoding: {0}")]
    Io(#[source] std::io::Error),
}

impl CodecError {
    /// Maps a reader error, turning EOF into `UnexpectedEof`.
    pub(crate) fn from_read(err: std::io::Error, context: &'static str) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::UnexpectedEof { context }
        } else {
            Self::Io(err)
        }
    }
}

// ============================================
// CoreError
// ============================================

/// Core error types for codec, protocol and identity operations.
#[derive(Error, Debug)]
pub enum CoreError {
    // ========================================
    // Codec Errors
    // ========================================

    /// Bencode grammar violation.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    // ========================================
    // Protocol Errors
    // ========================================

    /// A required frame field is absent.
    #[error("Missing frame field '{field}'")]
    MissingField {
        /// Field key
        field: &'static str,
    },

    /// A frame field or parameter has the wrong type.
    #[error("Field '{field}' must be {expected}")]
    WrongType {
        /// Field or parameter key
        field: String,
        /// Expected type description
        expected: &'static str,
    },

    /// The frame carries a method number we don't know.
    #[error("Unknown link method: {0}")]
    UnknownMethod(i64),

    /// A required parameter is absent.
    #[error("Missing parameter '{key}'")]
    MissingParam {
        /// Parameter key
        key: String,
    },

    /// Too many packets for one relay frame.
    #[error("Cannot pack {count} packets (max {max})")]
    TooManyPackets {
        /// Packets offered
        count: usize,
        /// Wire limit
        max: usize,
    },

    /// A single packet does not fit the 16-bit length prefix.
    #[error("Packet of {length} bytes exceeds packing limit {max}")]
    PacketTooLarge {
        /// Packet length
        length: usize,
        /// Wire limit
        max: usize,
    },

    // ========================================
    // Identity Errors
    // ========================================

    /// Destination bytes or their encoding are invalid.
    #[error("Invalid identity: {reason}")]
    InvalidIdentity {
        /// What is wrong
        reason: String,
    },

    /// A short label is malformed.
    #[error("Invalid label '{label}': {reason}")]
    InvalidLabel {
        /// The rejected label
        label: String,
        /// What is wrong
        reason: String,
    },

    /// Persisted key material could not be parsed or produced.
    #[error("Key file error: {reason}")]
    KeyFile {
        /// What is wrong
        reason: String,
    },

    /// Common error wrapper.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl CoreError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `WrongType` error.
    pub fn wrong_type(field: impl Into<String>, expected: &'static str) -> Self {
        Self::WrongType {
            field: field.into(),
            expected,
        }
    }

    /// Creates a `MissingParam` error.
    pub fn missing_param(key: impl Into<String>) -> Self {
        Self::MissingParam { key: key.into() }
    }

    /// Creates an `InvalidIdentity` error.
    pub fn invalid_identity(reason: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidLabel` error.
    pub fn invalid_label(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidLabel {
            label: label.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `KeyFile` error.
    pub fn key_file(reason: impl Into<String>) -> Self {
        Self::KeyFile {
            reason: reason.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` for bencode grammar violations.
    #[must_use]
    pub const fn is_codec_error(&self) -> bool {
        matches!(self, Self::Codec(_))
    }

    /// Returns `true` for link-protocol violations.
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::MissingField { .. }
                | Self::WrongType { .. }
                | Self::UnknownMethod(_)
                | Self::MissingParam { .. }
                | Self::TooManyPackets { .. }
                | Self::PacketTooLarge { .. }
        )
    }

    /// Returns `true` for identity and key-material errors.
    #[must_use]
    pub const fn is_identity_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdentity { .. } | Self::InvalidLabel { .. } | Self::KeyFile { .. }
        )
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_wraps() {
        let err: CoreError = CodecError::LeadingZero { field: "integer" }.into();
        assert!(err.is_codec_error());
        assert!(!err.is_protocol_error());
        assert!(err.to_string().contains("Leading zero"));
    }

    #[test]
    fn test_protocol_classification() {
        assert!(CoreError::MissingField { field: "m" }.is_protocol_error());
        assert!(CoreError::UnknownMethod(9).is_protocol_error());
        assert!(CoreError::missing_param("tid").is_protocol_error());
        assert!(CoreError::invalid_label("x", "too short").is_identity_error());
    }

    #[test]
    fn test_eof_mapping() {
        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(
            CodecError::from_read(eof, "length"),
            CodecError::UnexpectedEof { context: "length" }
        ));

        let other = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(matches!(CodecError::from_read(other, "length"), CodecError::Io(_)));
    }
}
