// ============================================
// File: crates/veilink-common/src/types.rs
// ============================================
//! # Core Type Definitions
//!
//! ## Creation Reason
//! Centralizes the identifiers that cross crate boundaries so the link
//! protocol, the tunnel state tracker and the router client agree on
//! their representation.
//!
//! ## Main Functionality
//! - `TunnelId`: Numbered tunnel authorization (0 is reserved)
//! - `SessionName`: Router-side session identifier
//!
//! ## ⚠️ Important Note for Next Developer
//! - `TunnelId::NONE` doubles as "rejected" in replies and "all tunnels"
//!   in delete requests; never hand it out from an allocator
//! - Session names end up inside space-delimited command lines, so they
//!   must never contain whitespace or `=`
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::fmt;
use std::str::FromStr;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CommonError;

// ============================================
// Constants
// ============================================

/// Length of generated session names.
pub const SESSION_NAME_LEN: usize = 10;

// ============================================
// TunnelId
// ============================================

/// Identifier of one tunnel within a peer's tunnel session.
///
/// Ids are allocated per peer from a monotonic counter starting at 1.
/// The value 0 never names a real tunnel.
///
/// # Example
/// ```
/// use veilink_common::types::TunnelId;
///
/// let first = TunnelId::FIRST;
/// assert_eq!(first.value(), 1);
/// assert!(TunnelId::NONE.is_none());
/// assert_eq!(TunnelId::from_wire(7).unwrap().value(), 7);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TunnelId(u64);

impl TunnelId {
    /// Reserved id: "none", "rejected" or "all tunnels" depending on context.
    pub const NONE: Self = Self(0);

    /// First id handed out by an allocator.
    pub const FIRST: Self = Self(1);

    /// Creates a tunnel id from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Parses a tunnel id from its wire integer.
    ///
    /// # Errors
    /// Returns `OutOfRange` for negative values.
    pub fn from_wire(value: i64) -> Result<Self, CommonError> {
        u64::try_from(value)
            .map(Self)
            .map_err(|_| CommonError::out_of_range(value, 0, i64::MAX))
    }

    /// Returns the wire integer for this id.
    #[must_use]
    pub fn to_wire(self) -> i64 {
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns `true` for the reserved id 0.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Returns the id following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for TunnelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TunnelId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// ============================================
// SessionName
// ============================================

/// Name of a router-side session.
///
/// The router refuses a second session with the same name, so callers
/// that don't configure one get a random name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionName(String);

impl SessionName {
    /// Creates a validated session name.
    ///
    /// # Errors
    /// Returns `InvalidInput` if the name is empty or contains
    /// whitespace or `=`.
    pub fn new(name: impl Into<String>) -> Result<Self, CommonError> {
        let name = name.into();
        if name.is_empty() {
            return Err(CommonError::invalid_input("session_name", "cannot be empty"));
        }
        if name.chars().any(|c| c.is_whitespace() || c == '=') {
            return Err(CommonError::invalid_input(
                "session_name",
                "must not contain whitespace or '='",
            ));
        }
        Ok(Self(name))
    }

    /// Generates a random alphanumeric session name.
    #[must_use]
    pub fn random() -> Self {
        let name: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_NAME_LEN)
            .map(char::from)
            .collect();
        Self(name)
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionName {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SessionName {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SessionName> for String {
    fn from(name: SessionName) -> Self {
        name.0
    }
}

// ============================================
// Tests
// ============================================
