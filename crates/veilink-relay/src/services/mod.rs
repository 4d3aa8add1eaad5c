// ============================================
// File: crates/veilink-relay/src/services/mod.rs
// ============================================
//! # Relay Services
//!
//! ## Creation Reason
//! Holds the relay's state machines, separated from the task wiring in
//! [`crate::relay`] so each can be tested without a network.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`address_map`]: Which label owns which IPv4 ranges
//! - [`cache`]: Label → identity cache with pending packet queues
//! - [`tunnel`]: Per-peer tunnel negotiation and relay validation
//! - [`keystore`]: Persisted key pair
//! - `dispatcher`: The single task that owns cache and sessions
//!
//! ## Service Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Service Layer                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐   ┌─────────────────────────────────┐ │
//! │  │   AddressMap    │◄──│          Dispatcher             │ │
//! │  │                 │   │  - Route packets by address     │ │
//! │  │  - Owner lookup │   │  - Drive lookups                │ │
//! │  │  - Inbound      │   │  - Keep-alives, expiry          │ │
//! │  │    filtering    │   └───────┬────────────────┬────────┘ │
//! │  └─────────────────┘           │                │          │
//! │                    ┌───────────▼─────┐  ┌───────▼────────┐ │
//! │                    │ DestinationCache│  │ TunnelSession  │ │
//! │                    │                 │  │   (per peer)   │ │
//! │                    └─────────────────┘  └────────────────┘ │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Cache and sessions have a single owner (the dispatcher); they are
//!   plain structs, not shared maps
//! - `AddressMap` is immutable once the relay starts
//!
//! ## Last Modified
//! v0.1.0 - Initial services structure

pub mod address_map;
pub mod cache;
pub(crate) mod dispatcher;
pub mod keystore;
pub mod tunnel;

// Re-export primary types
pub use address_map::{AddressMap, FilterMode};
pub use cache::{CacheState, DestinationCache};
pub use keystore::KeyStore;
pub use tunnel::{AddressMapPolicy, FrameOutcome, Tunnel, TunnelPolicy, TunnelSession};
