// ============================================
// File: crates/veilink-relay/src/handlers/packet.rs
// ============================================
//! # IPv4 Packet View
//!
//! ## Creation Reason
//! The relay only needs the addressing of a packet: which peer owns the
//! destination, whether the source is allowed, and (in rewrite mode)
//! replacing both addresses.
//!
//! ## Main Functionality
//! - `Packet`: Owned packet bytes with validated header length
//! - Source/destination accessors
//! - Address rewrite with header checksum recomputation
//!
//! ## Header Layout
//! ```text
//! ┌─────────┬─────────┬───────────────┬─────────────┬──────────────┐
//! │ 0       │ 1       │ 2..4          │ ...  10..12 │ 12..16 16..20│
//! │ ver/ihl │ tos     │ total length  │    checksum │ src    dst   │
//! └─────────┴─────────┴───────────────┴─────────────┴──────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Performance critical - no allocation beyond the owned buffer
//! - Only the header checksum is recomputed on rewrite; TCP/UDP
//!   checksums covering the pseudo-header are left to the endpoints
//!
//! ## Last Modified
//! v0.1.0 - Initial packet view

use std::fmt;
use std::net::Ipv4Addr;

use crate::error::AddressError;

// ============================================
// Constants
// ============================================

/// Minimum IPv4 header size.
pub const IPV4_HEADER_MIN_SIZE: usize = 20;

/// Offset of source IP in IPv4 header.
const IPV4_SRC_OFFSET: usize = 12;

/// Offset of destination IP in IPv4 header.
const IPV4_DST_OFFSET: usize = 16;

/// Offset of the header checksum.
const IPV4_CHECKSUM_OFFSET: usize = 10;

// ============================================
// Packet
// ============================================

/// An IPv4 packet at least one minimal header long.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    bytes: Vec<u8>,
}

impl Packet {
    /// Wraps raw packet bytes.
    ///
    /// # Errors
    /// Returns `PacketTooShort` below 20 bytes and `UnsupportedVersion`
    /// for anything but IPv4.
    pub fn parse(bytes: Vec<u8>) -> Result<Self, AddressError> {
        if bytes.len() < IPV4_HEADER_MIN_SIZE {
            return Err(AddressError::PacketTooShort {
                len: bytes.len(),
                min: IPV4_HEADER_MIN_SIZE,
            });
        }

        let version = bytes[0] >> 4;
        if version != 4 {
            return Err(AddressError::UnsupportedVersion { version });
        }

        Ok(Self { bytes })
    }

    /// Claimed source address.
    #[must_use]
    pub fn source(&self) -> Ipv4Addr {
        self.addr_at(IPV4_SRC_OFFSET)
    }

    /// Claimed destination address.
    #[must_use]
    pub fn destination(&self) -> Ipv4Addr {
        self.addr_at(IPV4_DST_OFFSET)
    }

    /// Replaces the source address and fixes the header checksum.
    pub fn set_source(&mut self, addr: Ipv4Addr) {
        self.bytes[IPV4_SRC_OFFSET..IPV4_SRC_OFFSET + 4].copy_from_slice(&addr.octets());
        self.update_checksum();
    }

    /// Replaces the destination address and fixes the header checksum.
    pub fn set_destination(&mut self, addr: Ipv4Addr) {
        self.bytes[IPV4_DST_OFFSET..IPV4_DST_OFFSET + 4].copy_from_slice(&addr.octets());
        self.update_checksum();
    }

    /// Header length in bytes, clamped to the buffer.
    #[must_use]
    pub fn header_len(&self) -> usize {
        (usize::from(self.bytes[0] & 0x0f) * 4).clamp(IPV4_HEADER_MIN_SIZE, self.bytes.len())
    }

    /// Returns `true` if the stored header checksum is correct.
    #[must_use]
    pub fn checksum_valid(&self) -> bool {
        header_checksum(&self.bytes[..self.header_len()]) == 0
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn addr_at(&self, offset: usize) -> Ipv4Addr {
        Ipv4Addr::new(
            self.bytes[offset],
            self.bytes[offset + 1],
            self.bytes[offset + 2],
            self.bytes[offset + 3],
        )
    }

    fn update_checksum(&mut self) {
        let header_len = self.header_len();
        self.bytes[IPV4_CHECKSUM_OFFSET] = 0;
        self.bytes[IPV4_CHECKSUM_OFFSET + 1] = 0;
        let sum = header_checksum(&self.bytes[..header_len]);
        self.bytes[IPV4_CHECKSUM_OFFSET..IPV4_CHECKSUM_OFFSET + 2]
            .copy_from_slice(&sum.to_be_bytes());
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("src", &self.source())
            .field("dst", &self.destination())
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// RFC 1071 ones' complement sum over the header.
fn header_checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = header
        .chunks(2)
        .map(|pair| {
            let hi = u32::from(pair[0]) << 8;
            let lo = pair.get(1).copied().map_or(0, u32::from);
            hi | lo
        })
        .sum();

    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    #[allow(clippy::cast_possible_truncation)]
    let folded = sum as u16;
    !folded
}

// ============================================
// Test helpers
// ============================================

/// Builds a minimal IPv4/UDP-looking packet with a correct header
/// checksum.
#[cfg(test)]
pub(crate) fn build_packet(src: Ipv4Addr, dst: Ipv4Addr, payload: &[u8]) -> Vec<u8> {
    let total = IPV4_HEADER_MIN_SIZE + payload.len();
    let mut bytes = vec![0u8; total];
    bytes[0] = 0x45;
    bytes[2..4].copy_from_slice(&u16::try_from(total).unwrap().to_be_bytes());
    bytes[8] = 64;
    bytes[9] = 17;
    bytes[IPV4_SRC_OFFSET..IPV4_SRC_OFFSET + 4].copy_from_slice(&src.octets());
    bytes[IPV4_DST_OFFSET..IPV4_DST_OFFSET + 4].copy_from_slice(&dst.octets());
    bytes[IPV4_HEADER_MIN_SIZE..].copy_from_slice(payload);

    let sum = header_checksum(&bytes[..IPV4_HEADER_MIN_SIZE]);
    bytes[IPV4_CHECKSUM_OFFSET..IPV4_CHECKSUM_OFFSET + 2].copy_from_slice(&sum.to_be_bytes());
    bytes
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_addresses() {
        let raw = build_packet(Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(10, 0, 0, 1), b"hi");
        let packet = Packet::parse(raw.clone()).unwrap();

        assert_eq!(packet.source(), Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(packet.destination(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(packet.as_bytes(), raw.as_slice());
        assert!(packet.checksum_valid());
    }

    #[test]
    fn test_parse_rejects_short_packet() {
        let result = Packet::parse(vec![0x45; 19]);
        assert!(matches!(
            result,
            Err(AddressError::PacketTooShort { len: 19, min: 20 })
        ));
    }

    #[test]
    fn test_parse_rejects_ipv6() {
        let mut raw = vec![0u8; 40];
        raw[0] = 0x60;
        assert!(matches!(
            Packet::parse(raw),
            Err(AddressError::UnsupportedVersion { version: 6 })
        ));
    }

    #[test]
    fn test_rewrite_keeps_checksum_valid() {
        let raw = build_packet(Ipv4Addr::new(192, 168, 1, 2), Ipv4Addr::new(8, 8, 8, 8), b"");
        let mut packet = Packet::parse(raw).unwrap();

        packet.set_source(Ipv4Addr::new(10, 0, 0, 9));
        packet.set_destination(Ipv4Addr::new(10, 0, 0, 1));

        assert_eq!(packet.source(), Ipv4Addr::new(10, 0, 0, 9));
        assert_eq!(packet.destination(), Ipv4Addr::new(10, 0, 0, 1));
        assert!(packet.checksum_valid());
    }

    #[test]
    fn test_header_len_clamped() {
        // IHL claims 60 bytes but only 24 are present.
        let mut raw = build_packet(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST, &[0; 4]);
        raw[0] = 0x4f;
        let packet = Packet::parse(raw).unwrap();
        assert_eq!(packet.header_len(), 24);
    }
}
