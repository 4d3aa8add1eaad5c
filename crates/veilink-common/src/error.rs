// ============================================
// File: crates/veilink-common/src/error.rs
// ============================================
//! # Common Error Types
//!
//! ## Creation Reason
//! Provides foundational error types and result aliases used across
//! all veilink crates, enabling consistent error handling.
//!
//! ## Main Functionality
//! - `CommonError`: Base error enum for common operations
//! - `Result<T>`: Type alias using `CommonError`
//!
//! ## Design Philosophy
//! - Use `thiserror` for ergonomic error definitions
//! - Each crate defines its own error type wrapping `CommonError`
//!
//! ## ⚠️ Important Note for Next Developer
//! - Never put private key material in error messages
//! - Only validation failures live here; I/O and protocol errors
//!   belong to the crate that performs the operation
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions
//! v0.1.1 - Dropped variants no crate produced

use thiserror::Error;

// ============================================
// Result Type Alias
// ============================================

/// Common result type for operations that may fail.
pub type Result<T> = std::result::Result<T, CommonError>;

// ============================================
// CommonError
// ============================================

/// Common error types shared across veilink crates.
///
/// # Example
/// ```
/// use veilink_common::error::{CommonError, Result};
///
/// fn validate_name(name: &str) -> Result<()> {
///     if name.is_empty() {
///         return Err(CommonError::invalid_input("name", "cannot be empty"));
///     }
///     Ok(())
/// }
/// ```
#[derive(Error, Debug)]
pub enum CommonError {
    // ========================================
    // Validation Errors
    // ========================================

    /// Invalid input data provided.
    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput {
        /// Name of the field or parameter
        field: String,
        /// Description of what's wrong
        reason: String,
    },

    /// Value is out of acceptable range.
    #[error("Value out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        /// The value that was out of range
        value: String,
        /// Minimum acceptable value
        min: String,
        /// Maximum acceptable value
        max: String,
    },
}

impl CommonError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates an `InvalidInput` error.
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `OutOfRange` error.
    pub fn out_of_range(
        value: impl ToString,
        min: impl ToString,
        max: impl ToString,
    ) -> Self {
        Self::OutOfRange {
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
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
        let err = CommonError::invalid_input("session_name", "contains whitespace");
        assert!(err.to_string().contains("session_name"));
        assert!(err.to_string().contains("whitespace"));
    }

    #[test]
    fn test_out_of_range_display() {
        let err = CommonError::out_of_range(-3, 0, i64::MAX);
        assert!(err.to_string().contains("-3"));
        assert!(matches!(err, CommonError::OutOfRange { .. }));
    }
}
