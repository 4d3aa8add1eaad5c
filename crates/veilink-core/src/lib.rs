// ============================================
// File: crates/veilink-core/src/lib.rs
// ============================================
//! # Veilink Core - Protocol & Identity Library
//!
//! ## Creation Reason
//! Provides the wire formats and identity types shared by the router
//! client and the relay: the bencode codec, the link-frame protocol
//! spoken between tunnel endpoints, and destination key material.
//!
//! ## Main Functionality
//!
//! ### Protocol Module ([`protocol`])
//! - Bencode `Value` codec with strict decoding
//! - `LinkFrame` control/relay messages
//! - Multi-packet relay payload packing
//!
//! ### Identity Module ([`identity`])
//! - `Identity` with long-form and label renderings
//! - `Keypair` and its key-file format
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
//! │              veilink-core  ◄── You are here         │
//! │                    │                                │
//! │                    ▼                                │
//! │             veilink-common                          │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This crate does no I/O apart from `std::io::Read` in the decoder
//! - Protocol changes MUST stay compatible with deployed peers
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod identity;
pub mod protocol;

// Re-export commonly used items
pub use error::{CodecError, CoreError, Result};
pub use identity::{Identity, Keypair, Label};
pub use protocol::{Dictionary, LinkFrame, Method, Value};
