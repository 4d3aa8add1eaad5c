// ============================================
// File: crates/veilink-transport/src/lib.rs
// ============================================
//! # Veilink Transport - Router and Device I/O
//!
//! ## Creation Reason
//! Provides the I/O edges of veilink: the client for the local router's
//! SAM control protocol (sessions, streams, datagrams, name lookups) and
//! the abstract packet device the relay reads and writes.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`sam`]: SAM v3 control client and sessions
//! - [`traits`]: `Device`, `DatagramTransport`, `NameResolver` seams
//! - [`device`]: device implementations (mock)
//! - [`error`]: Transport-specific error types
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               veilink-relay                         │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                     │
//! │         ▼                     ▼                     │
//! │   veilink-core        veilink-transport             │
//! │                        You are here ◄──             │
//! │         │                     │                     │
//! │         └──────────┬──────────┘                     │
//! │                    ▼                                │
//! │             veilink-common                          │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data Flow
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │            Local IP stack                                │
//! │                  ▲                                       │
//! │       ┌──────────┴──────────┐                            │
//! │       │   Device (TUN-like) │                            │
//! │       └──────────┬──────────┘                            │
//! │       ┌──────────┴──────────┐                            │
//! │       │     Relay core      │                            │
//! │       └──────────┬──────────┘                            │
//! │       ┌──────────┴──────────┐                            │
//! │       │  Datagram session   │  DATAGRAM SEND / RECEIVED  │
//! │       └──────────┬──────────┘                            │
//! │                  ▼                                       │
//! │        Router (127.0.0.1:7656) ─► anonymous network      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Always use traits for testability
//! - OS device backends live outside this crate
//! - Mock implementations available with `mock` feature
//!
//! ## Last Modified
//! v0.1.0 - Initial transport layer implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod device;
pub mod error;
pub mod sam;
pub mod traits;

#[cfg(any(test, feature = "mock"))]
pub mod memory;

// Re-export primary types
pub use error::{Result, TransportError};
pub use sam::{
    ControlClient, ControlFailure, DatagramSession, SamConfig, SessionOptions, StreamConnection,
    StreamListener, StreamSession,
};
pub use traits::{DatagramTransport, Device, DeviceConfig, NameResolver};

#[cfg(any(test, feature = "mock"))]
pub use device::MockDevice;
#[cfg(any(test, feature = "mock"))]
pub use memory::{MemoryEndpoint, MemoryNetwork};
