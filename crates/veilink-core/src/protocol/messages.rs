// ============================================
// File: crates/veilink-core/src/protocol/messages.rs
// ============================================
//! # Link Frame Definitions
//!
//! ## Creation Reason
//! Defines the control/relay message unit exchanged between tunnel
//! endpoints and its mapping onto a bencode dictionary.
//!
//! ## Main Functionality
//! - `Method`: Enum of link methods
//! - `LinkFrame`: Method, parameters and optional response code
//! - Parameter key constants and typed accessors
//!
//! ## Wire Format
//! ```text
//! d
//!   1:m i<method>e            required
//!   1:p d<params>e            required
//!   1:r i<response>e          only on replies (response >= 0)
//! e
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Add new methods at the end; numbers are shared with deployed peers
//! - A frame with a response is a reply and must never be answered
//!
//! ## Last Modified
//! v0.1.0 - Initial frame definitions

use std::fmt;

use veilink_common::TunnelId;

use crate::error::{CoreError, Result};
use crate::protocol::bencode::{self, Dictionary, Value};
use crate::protocol::packing::{pack_packets, unpack_packets};

// ============================================
// Key Constants
// ============================================

/// Frame key holding the method.
pub const KEY_METHOD: &str = "m";
/// Frame key holding the parameters.
pub const KEY_PARAMS: &str = "p";
/// Frame key holding the response code.
pub const KEY_RESPONSE: &str = "r";

/// Parameter: tunnel id.
pub const PARAM_TUNNEL_ID: &str = "tid";
/// Parameter: packed packets.
pub const PARAM_PACKETS: &str = "pkts";
/// Parameter: IPv4 CIDR range.
pub const PARAM_CIDR: &str = "cidr";
/// Parameter: keep-alive sequence number.
pub const PARAM_PING_NUMBER: &str = "pn";
/// Parameter: number of tunnels removed (delete replies).
pub const PARAM_REMOVED: &str = "n";

// ============================================
// Method
// ============================================

/// Link method identifier.
///
/// # Values
/// | Value | Method |
/// |-------|--------|
/// | 0 | Null |
/// | 1 | AlivePing |
/// | 2 | ClientTunNew |
/// | 3 | ClientTunDel |
/// | 4 | ServerTunBai |
/// | 5 | RelayTunData |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Method {
    /// No operation.
    Null = 0,
    /// Liveness probe.
    AlivePing = 1,
    /// Request a tunnel for a CIDR range.
    ClientTunNew = 2,
    /// Drop one tunnel, or all with id 0.
    ClientTunDel = 3,
    /// Notice that a granted tunnel is gone.
    ServerTunBai = 4,
    /// Packets relayed over a tunnel.
    RelayTunData = 5,
}

impl Method {
    /// Converts a wire integer to a method.
    #[must_use]
    pub const fn from_wire(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Null),
            1 => Some(Self::AlivePing),
            2 => Some(Self::ClientTunNew),
            3 => Some(Self::ClientTunDel),
            4 => Some(Self::ServerTunBai),
            5 => Some(Self::RelayTunData),
            _ => None,
        }
    }

    /// Returns the wire integer.
    #[must_use]
    pub const fn as_wire(self) -> i64 {
        self as i64
    }

    /// Checks if this method manipulates tunnel state or liveness.
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(
            self,
            Self::AlivePing | Self::ClientTunNew | Self::ClientTunDel | Self::ServerTunBai
        )
    }
}

impl TryFrom<i64> for Method {
    type Error = CoreError;

    fn try_from(value: i64) -> Result<Self> {
        Self::from_wire(value).ok_or(CoreError::UnknownMethod(value))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "NULL",
            Self::AlivePing => "ALIVE_PING",
            Self::ClientTunNew => "CLIENT_TUN_NEW",
            Self::ClientTunDel => "CLIENT_TUN_DEL",
            Self::ServerTunBai => "SERVER_TUN_BAI",
            Self::RelayTunData => "RELAY_TUN_DATA",
        };
        f.write_str(name)
    }
}

// ============================================
// LinkFrame
// ============================================

/// One control or relay message.
///
/// `response == None` marks a request. A negative response is treated
/// the same as `None` on the wire: the `r` key is omitted.
///
/// # Example
/// ```
/// use veilink_core::protocol::{LinkFrame, Method};
/// use veilink_common::TunnelId;
///
/// let frame = LinkFrame::new(Method::RelayTunData)
///     .with_param("tid", 7_i64);
/// let bytes = frame.encode();
/// let decoded = LinkFrame::decode(&bytes).unwrap();
/// assert_eq!(decoded.method, Method::RelayTunData);
/// assert_eq!(decoded.tunnel_id().unwrap(), TunnelId::from_raw(7));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFrame {
    /// Link method.
    pub method: Method,
    /// Method parameters.
    pub params: Dictionary,
    /// Response code; present only on replies.
    pub response: Option<i64>,
}

impl LinkFrame {
    /// Creates a request frame with no parameters.
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self {
            method,
            params: Dictionary::new(),
            response: None,
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key, value);
        self
    }

    /// Sets the response code, turning the frame into a reply.
    #[must_use]
    pub const fn with_response(mut self, response: i64) -> Self {
        self.response = Some(response);
        self
    }

    // ========================================
    // Constructors
    // ========================================

    /// Keep-alive probe carrying a sequence number.
    #[must_use]
    pub fn ping(sequence: u64) -> Self {
        Self::new(Method::AlivePing)
            .with_param(PARAM_PING_NUMBER, i64::try_from(sequence).unwrap_or(i64::MAX))
    }

    /// Request for a tunnel covering `cidr`.
    #[must_use]
    pub fn tunnel_request(cidr: &str) -> Self {
        Self::new(Method::ClientTunNew).with_param(PARAM_CIDR, cidr)
    }

    /// Request to drop tunnel `tid` (or all with `TunnelId::NONE`).
    #[must_use]
    pub fn tunnel_delete(tid: TunnelId) -> Self {
        Self::new(Method::ClientTunDel).with_param(PARAM_TUNNEL_ID, tid.to_wire())
    }

    /// Notice that tunnel `tid` is gone.
    #[must_use]
    pub fn tunnel_bai(tid: TunnelId) -> Self {
        Self::new(Method::ServerTunBai).with_param(PARAM_TUNNEL_ID, tid.to_wire())
    }

    /// Relay frame carrying `packets` over tunnel `tid`.
    ///
    /// # Errors
    /// Fails if the packets can't be packed.
    pub fn relay_data<P: AsRef<[u8]>>(tid: TunnelId, packets: &[P]) -> Result<Self> {
        Ok(Self::new(Method::RelayTunData)
            .with_param(PARAM_TUNNEL_ID, tid.to_wire())
            .with_param(PARAM_PACKETS, pack_packets(packets)?))
    }

    /// Starts a reply to this frame with the given response code.
    #[must_use]
    pub fn reply(&self, response: i64) -> Self {
        Self::new(self.method).with_response(response)
    }

    // ========================================
    // Inspection
    // ========================================

    /// Returns `true` if this frame answers an earlier request.
    #[must_use]
    pub fn is_reply(&self) -> bool {
        self.response.is_some_and(|r| r >= 0)
    }

    /// Returns `true` if this is a relay frame carrying packets.
    #[must_use]
    pub fn has_packets(&self) -> bool {
        self.method == Method::RelayTunData && self.params.contains_key(PARAM_PACKETS)
    }

    /// Unpacks the relayed packets (empty if absent or malformed).
    #[must_use]
    pub fn packets(&self) -> Vec<Vec<u8>> {
        self.params
            .get(PARAM_PACKETS)
            .and_then(Value::as_bytes)
            .map(unpack_packets)
            .unwrap_or_default()
    }

    /// Returns a parameter as text.
    ///
    /// # Errors
    /// Fails if the key is absent or not a UTF-8 byte string.
    pub fn get_param_str(&self, key: &str) -> Result<&str> {
        self.param(key)?
            .as_str()
            .ok_or_else(|| CoreError::wrong_type(key, "string"))
    }

    /// Returns a parameter as an integer.
    ///
    /// # Errors
    /// Fails if the key is absent or not an integer.
    pub fn get_param_int(&self, key: &str) -> Result<i64> {
        self.param(key)?
            .as_integer()
            .ok_or_else(|| CoreError::wrong_type(key, "integer"))
    }

    /// Returns a parameter as raw bytes.
    ///
    /// # Errors
    /// Fails if the key is absent or not a byte string.
    pub fn get_param_bytes(&self, key: &str) -> Result<&[u8]> {
        self.param(key)?
            .as_bytes()
            .ok_or_else(|| CoreError::wrong_type(key, "bytes"))
    }

    /// Returns the `tid` parameter.
    ///
    /// # Errors
    /// Fails if `tid` is absent, not an integer, or negative.
    pub fn tunnel_id(&self) -> Result<TunnelId> {
        Ok(TunnelId::from_wire(self.get_param_int(PARAM_TUNNEL_ID)?)?)
    }

    fn param(&self, key: &str) -> Result<&Value> {
        self.params
            .get(key)
            .ok_or_else(|| CoreError::missing_param(key))
    }

    // ========================================
    // Serialization
    // ========================================

    /// Builds the bencode dictionary for this frame.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut dict = Dictionary::new();
        dict.insert(KEY_METHOD, self.method.as_wire());
        dict.insert(KEY_PARAMS, self.params.clone());
        if let Some(response) = self.response.filter(|r| *r >= 0) {
            dict.insert(KEY_RESPONSE, response);
        }
        Value::Dict(dict)
    }

    /// Parses a frame from a decoded bencode value.
    ///
    /// # Errors
    /// Fails with a protocol error if `m` or `p` is missing or mistyped,
    /// if `r` is present but not an integer, or if the method is unknown.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Dict(mut dict) = value else {
            return Err(CoreError::wrong_type("frame", "dictionary"));
        };

        let method = dict
            .get(KEY_METHOD)
            .ok_or(CoreError::MissingField { field: KEY_METHOD })?
            .as_integer()
            .ok_or_else(|| CoreError::wrong_type(KEY_METHOD, "integer"))?;
        let method = Method::try_from(method)?;

        let params = match dict.remove(KEY_PARAMS) {
            Some(Value::Dict(params)) => params,
            Some(_) => return Err(CoreError::wrong_type(KEY_PARAMS, "dictionary")),
            None => return Err(CoreError::MissingField { field: KEY_PARAMS }),
        };

        let response = match dict.get(KEY_RESPONSE) {
            Some(Value::Integer(r)) => Some(*r),
            Some(_) => return Err(CoreError::wrong_type(KEY_RESPONSE, "integer")),
            None => None,
        };

        Ok(Self {
            method,
            params,
            response,
        })
    }

    /// Encodes the frame to bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        bencode::encode(&self.to_value())
    }

    /// Decodes a frame occupying the whole buffer.
    ///
    /// # Errors
    /// Fails with a codec error on bad bencode or a protocol error on a
    /// bad frame shape.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::from_value(bencode::decode(bytes)?)
    }
}

impl fmt::Display for LinkFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.response {
            Some(r) if r >= 0 => write!(f, "{} reply {}", self.method, r),
            _ => write!(f, "{} request", self.method),
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_round_trip() {
        for n in 0..=5 {
            let method = Method::from_wire(n).unwrap();
            assert_eq!(method.as_wire(), n);
        }
        assert!(Method::from_wire(6).is_none());
        assert!(matches!(Method::try_from(-1), Err(CoreError::UnknownMethod(-1))));
    }

    #[test]
    fn test_relay_frame_round_trip() {
        let frame = LinkFrame::new(Method::RelayTunData).with_param(PARAM_TUNNEL_ID, 7_i64);
        let bytes = frame.encode();
        let decoded = LinkFrame::decode(&bytes).unwrap();
        assert_eq!(decoded.method, frame.method);
        assert_eq!(decoded.params, frame.params);
        assert_eq!(decoded.response, None);
        // no "r" key on the wire for requests
        assert_eq!(bytes, b"d1:mi5e1:pd3:tidi7eee");
    }

    #[test]
    fn test_negative_response_omitted() {
        let frame = LinkFrame::new(Method::AlivePing).with_response(-1);
        assert!(!frame.is_reply());
        let decoded = LinkFrame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded.response, None);
    }

    #[test]
    fn test_reply_carries_response() {
        let request = LinkFrame::tunnel_request("10.0.0.0/24");
        let reply = request
            .reply(1)
            .with_param(PARAM_TUNNEL_ID, 1_i64)
            .with_param(PARAM_CIDR, "10.0.0.0/24");
        let decoded = LinkFrame::decode(&reply.encode()).unwrap();
        assert!(decoded.is_reply());
        assert_eq!(decoded.response, Some(1));
        assert_eq!(decoded.method, Method::ClientTunNew);
        assert_eq!(decoded.get_param_str(PARAM_CIDR).unwrap(), "10.0.0.0/24");
    }

    #[test]
    fn test_missing_fields() {
        assert!(matches!(
            LinkFrame::decode(b"d1:pdee"),
            Err(CoreError::MissingField { field: "m" })
        ));
        assert!(matches!(
            LinkFrame::decode(b"d1:mi1ee"),
            Err(CoreError::MissingField { field: "p" })
        ));
        assert!(matches!(
            LinkFrame::decode(b"d1:m1:x1:pdee"),
            Err(CoreError::WrongType { .. })
        ));
        assert!(matches!(
            LinkFrame::decode(b"d1:mi1e1:pi0ee"),
            Err(CoreError::WrongType { .. })
        ));
        assert!(matches!(
            LinkFrame::decode(b"d1:mi9e1:pdee"),
            Err(CoreError::UnknownMethod(9))
        ));
        assert!(matches!(LinkFrame::decode(b"i1e"), Err(CoreError::WrongType { .. })));
    }

    #[test]
    fn test_codec_error_surfaces() {
        let err = LinkFrame::decode(b"d1:mi01e1:pdee").unwrap_err();
        assert!(err.is_codec_error());
    }

    #[test]
    fn test_param_accessors() {
        let frame = LinkFrame::ping(3);
        assert_eq!(frame.get_param_int(PARAM_PING_NUMBER).unwrap(), 3);
        assert!(matches!(
            frame.get_param_str(PARAM_PING_NUMBER),
            Err(CoreError::WrongType { .. })
        ));
        assert!(matches!(
            frame.get_param_int(PARAM_CIDR),
            Err(CoreError::MissingParam { .. })
        ));
    }

    #[test]
    fn test_has_packets() {
        let packets = vec![vec![0x45u8; 20], vec![0x45u8; 28]];
        let frame = LinkFrame::relay_data(TunnelId::FIRST, &packets).unwrap();
        assert!(frame.has_packets());
        assert_eq!(frame.tunnel_id().unwrap(), TunnelId::FIRST);

        let decoded = LinkFrame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded.packets(), packets);

        // pkts on a non-relay frame is not payload
        let odd = LinkFrame::new(Method::AlivePing).with_param(PARAM_PACKETS, vec![0u8, 0]);
        assert!(!odd.has_packets());
    }

    #[test]
    fn test_negative_tid_rejected() {
        let frame = LinkFrame::new(Method::ClientTunDel).with_param(PARAM_TUNNEL_ID, -4_i64);
        assert!(frame.tunnel_id().is_err());
    }
}
