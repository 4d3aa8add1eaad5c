// ============================================
// File: crates/veilink-relay/src/lib.rs
// ============================================
//! # Veilink Relay Library
//!
//! ## Creation Reason
//! Carries IPv4 packets between a local packet device and peers on an
//! anonymizing overlay network, where each peer is known only by its
//! destination label.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: Relay configuration file
//! - [`relay`]: Task orchestration and shutdown
//! - [`services`]: Address map, destination cache, tunnel sessions,
//!   key store
//! - [`handlers`]: IPv4 packet access
//! - [`error`]: Relay-specific error types
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Veilink Relay                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────────┐  │
//! │  │   Config    │────►│    Relay    │────►│   Dispatcher    │  │
//! │  │             │     │ Orchestrator│     │                 │  │
//! │  └─────────────┘     └──────┬──────┘     └────────┬────────┘  │
//! │                             │                     │           │
//! │         ┌───────────────────┼─────────────────────┤           │
//! │         ▼                   ▼                     ▼           │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     │
//! │  │ Address Map │     │ Destination │     │   Tunnel    │     │
//! │  │             │     │    Cache    │     │  Sessions   │     │
//! │  └─────────────┘     └─────────────┘     └─────────────┘     │
//! │                                                               │
//! ├───────────────────────────────────────────────────────────────┤
//! │                     Transport Layer                           │
//! │  ┌─────────────────────┐     ┌─────────────────────────────┐ │
//! │  │  Datagram Session   │     │       Packet Device         │ │
//! │  │  (router bridge)    │     │       (IP packets)          │ │
//! │  └─────────────────────┘     └─────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data Flow
//! ```text
//! Device → owner lookup → cache/resolve → tunnel → RELAY_TUN_DATA → peer
//! Device ← filter ← tunnel check ← RELAY_TUN_DATA ← peer
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The router handles encryption; frames here are plaintext to it
//! - Configuration changes require restart (no hot-reload)
//!
//! ## Last Modified
//! v0.1.0 - Initial relay library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod relay;
pub mod services;

// Re-export primary types
pub use config::RelayConfig;
pub use error::{AddressError, RelayError, Result};
pub use relay::{Relay, RelayHandle, RelayOptions};
