// ============================================
// File: crates/veilink-transport/src/device/mod.rs
// ============================================
//! # Device Implementations
//!
//! ## Creation Reason
//! The relay consumes the local packet device through the [`Device`]
//! trait only. OS backends (TUN, raw link layer) live outside this crate;
//! the in-memory mock lives here so every crate can test against it.
//!
//! [`Device`]: crate::traits::Device
//!
//! ## Last Modified
//! v0.1.0 - Mock device

// Mock implementation for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(any(test, feature = "mock"))]
pub use mock::MockDevice;
