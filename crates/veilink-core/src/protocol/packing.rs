// ============================================
// File: crates/veilink-core/src/protocol/packing.rs
// ============================================
//! # Relay Payload Packing
//!
//! ## Creation Reason
//! A RELAY_TUN_DATA frame carries several IP packets in one `pkts` byte
//! string. This module owns that small binary layout.
//!
//! ## Wire Format
//! ```text
//! ┌─────────┬─────────┬──────────┬──────────────┬──────────┬─────
//! │ Version │  Count  │ Len (BE) │ Packet bytes │ Len (BE) │ ...
//! │ 1 byte  │ 1 byte  │ 2 bytes  │  Len bytes   │ 2 bytes  │
//! │   = 0   │  0-255  │          │              │          │
//! └─────────┴─────────┴──────────┴──────────────┴──────────┴─────
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `unpack_packets` never fails loudly: any violation yields an empty
//!   vector, because relay payloads from peers are dropped, not reported
//! - Check every declared length against the remaining buffer BEFORE
//!   slicing
//!
//! ## Last Modified
//! v0.1.0 - Initial packing implementation

use bytes::{Buf, BufMut, BytesMut};
use tracing::trace;

use crate::error::{CoreError, Result};

// ============================================
// Constants
// ============================================

/// Packing format version.
pub const PACKING_VERSION: u8 = 0;

/// Most packets one payload can carry.
pub const MAX_PACKETS_PER_FRAME: usize = u8::MAX as usize;

/// Longest packet the 16-bit length prefix can describe.
pub const MAX_PACKET_LEN: usize = u16::MAX as usize;

/// Size of version byte plus count byte.
const PACKING_HEADER_SIZE: usize = 2;

// ============================================
// Pack / Unpack
// ============================================

/// Packs packets into one relay payload.
///
/// # Errors
/// - `TooManyPackets` for more than 255 packets
/// - `PacketTooLarge` for a packet longer than 65 535 bytes
pub fn pack_packets<P: AsRef<[u8]>>(packets: &[P]) -> Result<Vec<u8>> {
    let count = u8::try_from(packets.len()).map_err(|_| CoreError::TooManyPackets {
        count: packets.len(),
        max: MAX_PACKETS_PER_FRAME,
    })?;

    let total: usize = packets.iter().map(|p| p.as_ref().len() + 2).sum();
    let mut buf = BytesMut::with_capacity(PACKING_HEADER_SIZE + total);
    buf.put_u8(PACKING_VERSION);
    buf.put_u8(count);

    for packet in packets {
        let packet = packet.as_ref();
        let len = u16::try_from(packet.len()).map_err(|_| CoreError::PacketTooLarge {
            length: packet.len(),
            max: MAX_PACKET_LEN,
        })?;
        buf.put_u16(len);
        buf.put_slice(packet);
    }

    Ok(buf.to_vec())
}

/// Unpacks a relay payload.
///
/// Returns an empty vector if the version byte is not 0 or if any
/// declared length runs past the end of the buffer. Bytes after the
/// last declared packet are ignored.
#[must_use]
pub fn unpack_packets(data: &[u8]) -> Vec<Vec<u8>> {
    let mut buf = data;
    if buf.remaining() < PACKING_HEADER_SIZE {
        trace!(len = data.len(), "Relay payload shorter than header");
        return Vec::new();
    }

    let version = buf.get_u8();
    if version != PACKING_VERSION {
        trace!(version, "Unsupported relay payload version");
        return Vec::new();
    }

    let count = usize::from(buf.get_u8());
    let mut packets = Vec::with_capacity(count);
    for index in 0..count {
        if buf.remaining() < 2 {
            trace!(index, "Relay payload truncated in length prefix");
            return Vec::new();
        }
        let len = usize::from(buf.get_u16());
        if buf.remaining() < len {
            trace!(index, len, remaining = buf.remaining(), "Relay payload truncated in packet");
            return Vec::new();
        }
        packets.push(buf[..len].to_vec());
        buf.advance(len);
    }

    packets
}

// ============================================
// Tests
// ============================================
