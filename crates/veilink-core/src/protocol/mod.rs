// ============================================
// File: crates/veilink-core/src/protocol/mod.rs
// ============================================
//! # Protocol Module
//!
//! ## Creation Reason
//! Defines the link protocol spoken between tunnel endpoints, including
//! its bencode encoding and relay payload packing.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`bencode`]: Canonical integer/bytes/list/dictionary grammar
//! - [`messages`]: `Method` and `LinkFrame`
//! - [`packing`]: Multi-packet relay payload layout
//! - [`codec`]: Buffer-oriented `Codec` implementations
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Control                                  │
//! │                                                             │
//! │  Peer A ──────── CLIENT_TUN_NEW {cidr} ────────────► Peer B │
//! │  Peer A ◄─────── reply r=tid {tid, cidr} ────────── Peer B │
//! │  Peer A ◄──────► ALIVE_PING {pn} ◄────────────────► Peer B │
//! │                                                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    Relay                                    │
//! │                                                             │
//! │  Peer A ══════ RELAY_TUN_DATA {tid, pkts} ═════════ Peer B │
//! │                                                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    Teardown                                 │
//! │                                                             │
//! │  Peer A ──────── CLIENT_TUN_DEL {tid} ─────────────► Peer B │
//! │  Peer A ◄─────── SERVER_TUN_BAI {tid} ───────────── Peer B │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Every frame is one datagram; there is no stream framing
//! - Test vectors in each submodule pin the exact wire bytes
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol definitions

pub mod bencode;
pub mod codec;
pub mod messages;
pub mod packing;

// Re-export primary types
pub use bencode::{Dictionary, Value};
pub use codec::{BencodeCodec, Codec, LinkCodec};
pub use messages::{LinkFrame, Method};
pub use packing::{pack_packets, unpack_packets};
