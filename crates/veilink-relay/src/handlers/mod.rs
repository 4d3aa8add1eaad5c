// ============================================
// File: crates/veilink-relay/src/handlers/mod.rs
// ============================================
//! # Packet Handling
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`packet`]: IPv4 header access and address rewriting
//!
//! ## ⚠️ Important Note for Next Developer
//! - Only IPv4 is relayed; anything else is rejected at parse time
//!
//! ## Last Modified
//! v0.1.0 - Initial handlers structure

pub mod packet;

pub use packet::Packet;
