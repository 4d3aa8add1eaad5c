// ============================================
// File: crates/veilink-core/src/identity/keys.rs
// ============================================
//! # Session Key Material
//!
//! ## Creation Reason
//! The router hands out destinations as a public/private pair. A session
//! owns that pair for its whole life, and the relay persists it so the
//! node keeps the same address across restarts.
//!
//! ## Main Functionality
//! - `Keypair`: Private blob plus the public `Identity`
//! - `KeyFile`: Two-field JSON document for persistence
//!
//! ## Key Lifecycle
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  DEST GENERATE (router) ──► Keypair ──► KeyFile (JSON)     │
//! │                                │                           │
//! │                                ▼                           │
//! │                     SESSION CREATE DESTINATION=<private>   │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The private blob is zeroed on drop and never printed by `Debug`
//! - The private blob embeds the destination; loading checks that the
//!   two halves belong together
//!
//! ## Last Modified
//! v0.1.0 - Initial key material types

use std::fmt;

use base64::Engine;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use super::destination::{Identity, I2P_BASE64};
use crate::error::{CoreError, Result};

// ============================================
// Keypair
// ============================================

/// Destination key material: the router's private blob and the public
/// identity it belongs to.
///
/// # Security
/// - Private material is zeroed on drop
/// - Only sent to the router inside session and key commands
#[derive(Clone)]
pub struct Keypair {
    identity: Identity,
    private: Zeroizing<String>,
}

impl Keypair {
    /// Builds a keypair from the two base64 halves the router returns.
    ///
    /// # Errors
    /// Returns an identity error if the public half doesn't parse, or a
    /// key-file error if the private half is empty, not base64, or does
    /// not start with the public destination.
    pub fn from_parts(public: &str, private: &str) -> Result<Self> {
        let identity = Identity::from_base64(public)?;
        let private = Zeroizing::new(private.trim().to_string());
        if private.is_empty() {
            return Err(CoreError::key_file("private key is empty"));
        }

        let decoded = Zeroizing::new(
            I2P_BASE64
                .decode(private.as_bytes())
                .map_err(|e| CoreError::key_file(format!("private key is not base64: {e}")))?,
        );
        if !decoded.starts_with(identity.as_bytes()) {
            return Err(CoreError::key_file(
                "private key does not belong to the public identity",
            ));
        }

        Ok(Self { identity, private })
    }

    /// Public identity.
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Private blob in base64, as the router expects it.
    #[must_use]
    pub fn private_base64(&self) -> &str {
        &self.private
    }

    /// Serializes to the key-file JSON document.
    ///
    /// # Errors
    /// Returns a key-file error if serialization fails.
    pub fn to_json(&self) -> Result<Zeroizing<String>> {
        let file = KeyFile {
            public: self.identity.to_base64().to_string(),
            private: self.private.to_string(),
        };
        serde_json::to_string_pretty(&file)
            .map(Zeroizing::new)
            .map_err(|e| CoreError::key_file(e.to_string()))
    }

    /// Parses a key-file JSON document.
    ///
    /// # Errors
    /// Returns a key-file error on malformed JSON or mismatched halves.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: KeyFile =
            serde_json::from_str(json).map_err(|e| CoreError::key_file(e.to_string()))?;
        Self::from_parts(&file.public, &file.private)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("identity", &self.identity)
            .field("private", &"[REDACTED]")
            .finish()
    }
}

// ============================================
// KeyFile
// ============================================

/// On-disk key document.
///
/// ```json
/// { "public": "<long form>", "private": "<router private blob>" }
/// ```
#[derive(Serialize, Deserialize)]
struct KeyFile {
    public: String,
    private: String,
}

// zeroize 1.3 has no ZeroizeOnDrop derive
impl Drop for KeyFile {
    fn drop(&mut self) {
        self.private.zeroize();
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::identity::destination::MIN_DESTINATION_LEN;

    /// Builds a router-shaped keypair from a seed byte.
    pub(crate) fn sample_keypair(seed: u8) -> Keypair {
        let public = vec![seed; MIN_DESTINATION_LEN];
        let mut private = public.clone();
        private.extend_from_slice(&[seed ^ 0x5a; 256]);
        Keypair::from_parts(&I2P_BASE64.encode(&public), &I2P_BASE64.encode(&private)).unwrap()
    }

    #[test]
    fn test_json_round_trip() {
        let keypair = sample_keypair(4);
        let json = keypair.to_json().unwrap();
        let restored = Keypair::from_json(&json).unwrap();
        assert_eq!(restored.identity(), keypair.identity());
        assert_eq!(restored.private_base64(), keypair.private_base64());
    }

    #[test]
    fn test_mismatched_halves_rejected() {
        let a = sample_keypair(1);
        let b = sample_keypair(2);
        let err = Keypair::from_parts(a.identity().to_base64(), b.private_base64()).unwrap_err();
        assert!(matches!(err, CoreError::KeyFile { .. }));
    }

    #[test]
    fn test_empty_private_rejected() {
        let a = sample_keypair(1);
        assert!(Keypair::from_parts(a.identity().to_base64(), "  ").is_err());
    }

    #[test]
    fn test_debug_redacts_private() {
        let keypair = sample_keypair(8);
        let debug = format!("{keypair:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains(keypair.private_base64()));
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            Keypair::from_json("{\"public\": 1}"),
            Err(CoreError::KeyFile { .. })
        ));
    }
}
