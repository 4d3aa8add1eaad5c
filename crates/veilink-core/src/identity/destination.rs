// ============================================
// File: crates/veilink-core/src/identity/destination.rs
// ============================================
//! # Destinations and Labels
//!
//! ## Creation Reason
//! An anonymous-network destination has two renderings: the long base64
//! form the router dials, and a short hash-derived label people put in
//! configuration. Both live here so nothing else hand-rolls them.
//!
//! ## Main Functionality
//! - `Identity`: Raw destination bytes plus both renderings
//! - `Label`: Validated `<52 base32 chars>.b32.i2p` address
//! - `I2P_BASE64`: Base64 engine with the network alphabet
//!
//! ## Renderings
//! ```text
//! raw destination bytes (>= 387)
//!   │
//!   ├── base64, alphabet A-Z a-z 0-9 - ~ ──► long form (dialable)
//!   │
//!   └── SHA-256 ──► base32 lowercase, no padding ──► + ".b32.i2p"
//!                                                     (label)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The network alphabet replaces `+` and `/` with `-` and `~`;
//!   the standard engine will NOT decode router output
//! - Labels are case-sensitive after parsing; `Label::parse` lowercases
//!
//! ## Last Modified
//! v0.1.0 - Initial identity types

use std::fmt;
use std::str::FromStr;

use base64::alphabet::Alphabet;
use base64::engine::general_purpose::GeneralPurposeConfig;
use base64::engine::{DecodePaddingMode, GeneralPurpose};
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};

// ============================================
// Constants
// ============================================

/// Smallest valid destination: 256-byte public key, 128-byte signing
/// key and a 3-byte certificate header.
pub const MIN_DESTINATION_LEN: usize = 387;

/// Suffix marking a label as a network address.
pub const LABEL_SUFFIX: &str = ".b32.i2p";

/// Base32 characters in a label (SHA-256, unpadded).
pub const LABEL_HASH_CHARS: usize = 52;

const BASE32_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

const I2P_ALPHABET: Alphabet =
    match Alphabet::new("ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-~") {
        Ok(alphabet) => alphabet,
        Err(_) => panic!("network base64 alphabet is malformed"),
    };

/// Base64 engine using the network alphabet.
///
/// Encodes with padding, decodes with or without it.
pub const I2P_BASE64: GeneralPurpose = GeneralPurpose::new(
    &I2P_ALPHABET,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

// ============================================
// Identity
// ============================================

/// A network destination.
///
/// Immutable once built. Equality and hashing follow the raw bytes.
///
/// # Example
/// ```
/// use veilink_core::identity::Identity;
///
/// let identity = Identity::from_bytes(vec![7u8; 387]).unwrap();
/// let parsed = Identity::from_base64(identity.to_base64()).unwrap();
/// assert_eq!(identity, parsed);
/// assert!(identity.label().as_str().ends_with(".b32.i2p"));
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    raw: Vec<u8>,
    encoded: String,
    label: Label,
}

impl Identity {
    /// Builds an identity from raw destination bytes.
    ///
    /// # Errors
    /// Returns `InvalidIdentity` if the bytes are shorter than a
    /// destination.
    pub fn from_bytes(raw: Vec<u8>) -> Result<Self> {
        if raw.len() < MIN_DESTINATION_LEN {
            return Err(CoreError::invalid_identity(format!(
                "destination is {} bytes, need at least {}",
                raw.len(),
                MIN_DESTINATION_LEN
            )));
        }
        let encoded = I2P_BASE64.encode(&raw);
        let label = Label::from_destination(&raw);
        Ok(Self {
            raw,
            encoded,
            label,
        })
    }

    /// Parses the long base64 form.
    ///
    /// # Errors
    /// Returns `InvalidIdentity` on bad base64 or a short destination.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let raw = I2P_BASE64
            .decode(encoded.trim())
            .map_err(|e| CoreError::invalid_identity(format!("bad base64: {e}")))?;
        Self::from_bytes(raw)
    }

    /// Returns `true` if `text` looks like a long-form destination
    /// rather than a name or label.
    #[must_use]
    pub fn is_long_form(text: &str) -> bool {
        text.len() >= MIN_DESTINATION_LEN * 4 / 3
            && text
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'~' || b == b'=')
    }

    /// Raw destination bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Long base64 form, usable for dialing.
    #[must_use]
    pub fn to_base64(&self) -> &str {
        &self.encoded
    }

    /// Short hash-derived label.
    #[must_use]
    pub const fn label(&self) -> &Label {
        &self.label
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.label)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

impl FromStr for Identity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_base64(s)
    }
}

impl Serialize for Identity {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.encoded)
        } else {
            serializer.serialize_bytes(&self.raw)
        }
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_base64(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            Self::from_bytes(bytes).map_err(serde::de::Error::custom)
        }
    }
}

// ============================================
// Label
// ============================================

/// Short address of a destination: base32 SHA-256 plus `.b32.i2p`.
///
/// Ordered lexicographically, which is the tie-break order used by
/// address lookups.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Label(String);

impl Label {
    /// Derives the label of raw destination bytes.
    #[must_use]
    pub fn from_destination(raw: &[u8]) -> Self {
        let digest = Sha256::digest(raw);
        let mut label = base32_encode(&digest);
        label.push_str(LABEL_SUFFIX);
        Self(label)
    }

    /// Parses and validates a label.
    ///
    /// # Errors
    /// Returns `InvalidLabel` if the suffix, length or alphabet is wrong.
    pub fn parse(text: &str) -> Result<Self> {
        let lowered = text.trim().to_ascii_lowercase();
        let Some(hash) = lowered.strip_suffix(LABEL_SUFFIX) else {
            return Err(CoreError::invalid_label(text, format!("missing '{LABEL_SUFFIX}' suffix")));
        };
        if hash.len() != LABEL_HASH_CHARS {
            return Err(CoreError::invalid_label(
                text,
                format!("expected {LABEL_HASH_CHARS} base32 characters, got {}", hash.len()),
            ));
        }
        if !hash.bytes().all(|b| BASE32_ALPHABET.contains(&b)) {
            return Err(CoreError::invalid_label(text, "not base32"));
        }
        Ok(Self(lowered))
    }

    /// Returns the label text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Label {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Label {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.0
    }
}

impl AsRef<str> for Label {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================
// Base32
// ============================================

/// RFC 4648 base32, lowercase, no padding.
fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits = 0u32;

    for &byte in data {
        buffer = ((buffer << 8) | u32::from(byte)) & 0xffff;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(char::from(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize]));
        }
    }
    if bits > 0 {
        out.push(char::from(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize]));
    }

    out
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_destination(seed: u8) -> Vec<u8> {
        (0..MIN_DESTINATION_LEN)
            .map(|i| seed.wrapping_add(u8::try_from(i % 256).unwrap()))
            .collect()
    }

    #[test]
    fn test_base32_vectors() {
        assert_eq!(base32_encode(b""), "");
        assert_eq!(base32_encode(b"f"), "my");
        assert_eq!(base32_encode(b"fo"), "mzxq");
        assert_eq!(base32_encode(b"foo"), "mzxw6");
        assert_eq!(base32_encode(b"foob"), "mzxw6yq");
        assert_eq!(base32_encode(b"fooba"), "mzxw6ytb");
        assert_eq!(base32_encode(b"foobar"), "mzxw6ytboi");
    }

    #[test]
    fn test_label_shape() {
        let identity = Identity::from_bytes(sample_destination(1)).unwrap();
        let label = identity.label().as_str();
        assert!(label.ends_with(LABEL_SUFFIX));
        assert_eq!(label.len(), LABEL_HASH_CHARS + LABEL_SUFFIX.len());
        assert_eq!(Label::parse(label).unwrap(), *identity.label());
    }

    #[test]
    fn test_label_deterministic() {
        let a = Identity::from_bytes(sample_destination(9)).unwrap();
        let b = Identity::from_bytes(sample_destination(9)).unwrap();
        let c = Identity::from_bytes(sample_destination(10)).unwrap();
        assert_eq!(a.label(), b.label());
        assert_ne!(a.label(), c.label());
    }

    #[test]
    fn test_network_alphabet() {
        // 0xfb 0xff encodes to characters 62 and 63 in standard base64
        let mut raw = vec![0xfbu8, 0xff, 0xbf];
        raw.resize(MIN_DESTINATION_LEN, 0);
        let identity = Identity::from_bytes(raw).unwrap();
        let encoded = identity.to_base64();
        assert!(encoded.starts_with("-~-~"));
        assert!(!encoded.contains('+') && !encoded.contains('/'));
        assert!(Identity::is_long_form(encoded));
        assert_eq!(Identity::from_base64(encoded).unwrap(), identity);
    }

    #[test]
    fn test_short_destination_rejected() {
        assert!(matches!(
            Identity::from_bytes(vec![0u8; 100]),
            Err(CoreError::InvalidIdentity { .. })
        ));
        assert!(Identity::from_base64("not*base64").is_err());
    }

    #[test]
    fn test_label_validation() {
        assert!(Label::parse("example.i2p").is_err());
        assert!(Label::parse("abc.b32.i2p").is_err());
        let bad_chars = format!("{}{}", "1".repeat(LABEL_HASH_CHARS), LABEL_SUFFIX);
        assert!(Label::parse(&bad_chars).is_err());
        let upper = format!("{}{}", "A".repeat(LABEL_HASH_CHARS), LABEL_SUFFIX);
        assert_eq!(
            Label::parse(&upper).unwrap().as_str(),
            format!("{}{}", "a".repeat(LABEL_HASH_CHARS), LABEL_SUFFIX)
        );
    }

    #[test]
    fn test_is_long_form() {
        assert!(!Identity::is_long_form("example.i2p"));
        let identity = Identity::from_bytes(sample_destination(3)).unwrap();
        assert!(!Identity::is_long_form(identity.label().as_str()));
    }
}
