// ============================================
// File: crates/veilink-common/src/lib.rs
// ============================================
//! # Veilink Common - Shared Types Library
//!
//! ## Creation Reason
//! Provides the small set of types and errors every veilink crate agrees
//! on, so tunnel ids and session names look the same on both sides of a
//! crate boundary.
//!
//! ## Main Functionality
//! - [`types`]: `TunnelId`, `SessionName` and shared constants
//! - [`error`]: Common error types and result aliases
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                veilink-relay                        │
//! │                    │                                │
//! │                    ▼                                │
//! │            veilink-transport                        │
//! │                    │                                │
//! │                    ▼                                │
//! │              veilink-core                           │
//! │                    │                                │
//! │                    ▼                                │
//! │             veilink-common  ◄── You are here        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dependencies
//! - No internal crate dependencies (leaf node)
//!
//! ## ⚠️ Important Note for Next Developer
//! - This crate is the foundation - changes affect everything
//! - Keep dependencies minimal
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod types;

// Re-export commonly used items at crate root
pub use error::{CommonError, Result};
pub use types::{SessionName, TunnelId};
