// ============================================
// File: crates/veilink-core/src/identity/mod.rs
// ============================================
//! # Identity Module
//!
//! ## Creation Reason
//! Centralizes destination handling: long-form and label renderings,
//! and the key material sessions are created from.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`destination`]: `Identity`, `Label` and the network base64 engine
//! - [`keys`]: `Keypair` and its JSON key-file format
//!
//! ## ⚠️ Important Note for Next Developer
//! - Private material never leaves `Keypair` except as the router's
//!   base64 blob
//!
//! ## Last Modified
//! v0.1.0 - Initial identity module

pub mod destination;
pub mod keys;

pub use destination::{Identity, Label, I2P_BASE64, LABEL_SUFFIX, MIN_DESTINATION_LEN};
pub use keys::Keypair;
