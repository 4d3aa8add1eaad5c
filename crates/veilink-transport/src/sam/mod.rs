// ============================================
// File: crates/veilink-transport/src/sam/mod.rs
// ============================================
//! # SAM Control Protocol
//!
//! ## Creation Reason
//! The local router exposes anonymous-network sessions through a
//! line-oriented text protocol on a TCP socket. This module is the client
//! side of that protocol.
//!
//! ## Main Functionality
//! - [`client`]: handshake, one-shot commands, session creation
//! - [`reply`]: reply tokenizer and typed rejection codes
//! - [`stream`]: stream sessions (dial / listen / accept)
//! - [`datagram`]: datagram sessions (send / receive)
//!
//! ## Connection Model
//! ```text
//! ┌──────────────┐  HELLO / SESSION CREATE   ┌────────────┐
//! │   session    │ ───── control socket ───► │            │
//! │  (persists)  │ ◄──── DATAGRAM RECEIVED ─ │   router   │
//! └──────────────┘                           │ 127.0.0.1: │
//! ┌──────────────┐  HELLO / STREAM CONNECT   │    7656    │
//! │ stream conn  │ ───── fresh socket ─────► │            │
//! │ (becomes the │ ◄──── raw bytes ───────── │            │
//! │  data pipe)  │                           └────────────┘
//! └──────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The session's control socket must stay open for the session's
//!   lifetime; the router tears the session down when it closes
//! - Nothing here reconnects. Losing a control socket is reported to
//!   the owner
//!
//! ## Last Modified
//! v0.1.0 - Initial SAM v3 client

pub mod client;
pub mod datagram;
pub mod reply;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ControlClient, ControlConnection, SamConfig, SessionOptions, SessionStyle};
pub use datagram::DatagramSession;
pub use reply::{ControlFailure, ControlReply};
pub use stream::{StreamConnection, StreamListener, StreamSession};

// ============================================
// Constants
// ============================================

/// Default router control endpoint.
pub const DEFAULT_SAM_ADDRESS: &str = "127.0.0.1:7656";

/// Lowest protocol version we speak.
pub const DEFAULT_MIN_VERSION: &str = "3.0";

/// Highest protocol version we speak.
pub const DEFAULT_MAX_VERSION: &str = "3.1";

/// Name that resolves to the session's own identity.
pub const SELF_NAME: &str = "ME";

/// Largest datagram payload the router accepts.
pub const MAX_DATAGRAM_SIZE: usize = 31_744;

/// Longest reply line we'll buffer.
pub const MAX_LINE_LEN: usize = 64 * 1024;
