// ============================================
// File: crates/veilink-relay/src/services/address_map.rs
// ============================================
//! # Address Map
//!
//! ## Creation Reason
//! Binds peer labels to the IPv4 ranges they may use. Outbound packets
//! find their peer through it; inbound packets are checked against it.
//!
//! ## Main Functionality
//! - `AddressMap`: label → ranges and ip → label lookups
//! - `filter_inbound`: validates (or rewrites) a packet from a peer
//! - JSON persistence (`{ "<label>": ["10.0.0.0/24"] }`)
//!
//! ## Lookup Order
//! ```text
//! entries (sorted once, at provisioning time):
//!   10.0.0.1/32  -> bbbb...b32.i2p     longest prefix first
//!   10.0.0.0/24  -> aaaa...b32.i2p     then label ascending
//!   10.0.0.0/16  -> cccc...b32.i2p
//!
//! owner_of(10.0.0.1) = bbbb...   owner_of(10.0.0.7) = aaaa...
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The relay holds the map behind `Arc` and never mutates it;
//!   `provision` is for startup only
//! - Overlapping ranges are allowed; the ordering above is the
//!   tie-break
//!
//! ## Last Modified
//! v0.1.0 - Initial address map

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::Path;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use veilink_core::identity::Label;

use crate::error::AddressError;
use crate::handlers::Packet;

// ============================================
// FilterMode
// ============================================

/// How `filter_inbound` treats packet addressing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Source must be in the sender's ranges and destination in ours;
    /// the packet passes unmodified.
    #[default]
    Strict,
    /// Source and destination are replaced with the sender's and our
    /// first address.
    Rewrite,
}

// ============================================
// AddressMap
// ============================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    range: Ipv4Net,
    label: Label,
}

/// Peer label to address range mapping.
#[derive(Debug, Clone, Default)]
pub struct AddressMap {
    /// Longest prefix first, then label, then network address.
    entries: Vec<Entry>,
    by_label: BTreeMap<Label, Vec<Ipv4Net>>,
}

impl AddressMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from `(label, range)` pairs.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Label, Ipv4Net)>,
    {
        let mut map = Self::new();
        for (label, range) in entries {
            map.provision(label, range);
        }
        map
    }

    /// Grants `range` to `label`. Host bits are dropped; duplicates are
    /// ignored.
    pub fn provision(&mut self, label: Label, range: Ipv4Net) {
        let range = range.trunc();
        let ranges = self.by_label.entry(label.clone()).or_default();
        if ranges.contains(&range) {
            return;
        }
        ranges.push(range);
        ranges.sort_by(|a, b| b.prefix_len().cmp(&a.prefix_len()).then(a.cmp(b)));

        self.entries.push(Entry { range, label });
        self.entries.sort_by(|a, b| {
            b.range
                .prefix_len()
                .cmp(&a.range.prefix_len())
                .then_with(|| a.label.cmp(&b.label))
                .then_with(|| a.range.cmp(&b.range))
        });
    }

    /// Ranges registered for `label`, longest prefix first. Empty when
    /// the label is unknown.
    #[must_use]
    pub fn ranges_for(&self, label: &Label) -> &[Ipv4Net] {
        self.by_label.get(label).map_or(&[], Vec::as_slice)
    }

    /// Label owning `ip`: the first entry containing it.
    #[must_use]
    pub fn owner_of(&self, ip: Ipv4Addr) -> Option<&Label> {
        self.entries
            .iter()
            .find(|entry| entry.range.contains(&ip))
            .map(|entry| &entry.label)
    }

    /// Returns `true` if `label` has at least one range.
    #[must_use]
    pub fn is_authorized(&self, label: &Label) -> bool {
        self.by_label.contains_key(label)
    }

    /// Returns `true` if `range` lies inside one of `label`'s ranges.
    #[must_use]
    pub fn covers(&self, label: &Label, range: &Ipv4Net) -> bool {
        self.ranges_for(label).iter().any(|own| own.contains(range))
    }

    /// Known labels, ascending.
    pub fn labels(&self) -> impl Iterator<Item = &Label> {
        self.by_label.keys()
    }

    /// Number of `(label, range)` entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ========================================
    // Inbound filtering
    // ========================================

    /// Validates a packet `sender` delivered to `local`.
    ///
    /// # Errors
    /// - `UnmappedLabel` if either side has no ranges
    /// - `PacketTooShort`/`UnsupportedVersion` for a bad header
    /// - `SpoofedSource`/`ForeignDestination` in strict mode
    pub fn filter_inbound(
        &self,
        sender: &Label,
        local: &Label,
        bytes: Vec<u8>,
        mode: FilterMode,
    ) -> Result<Packet, AddressError> {
        let sender_ranges = self.ranges_for(sender);
        if sender_ranges.is_empty() {
            return Err(AddressError::UnmappedLabel {
                label: sender.clone(),
            });
        }
        let local_ranges = self.ranges_for(local);
        if local_ranges.is_empty() {
            return Err(AddressError::UnmappedLabel {
                label: local.clone(),
            });
        }

        let mut packet = Packet::parse(bytes)?;

        match mode {
            FilterMode::Strict => {
                let src = packet.source();
                if !sender_ranges.iter().any(|range| range.contains(&src)) {
                    return Err(AddressError::SpoofedSource {
                        label: sender.clone(),
                        addr: src,
                    });
                }
                let dst = packet.destination();
                if !local_ranges.iter().any(|range| range.contains(&dst)) {
                    return Err(AddressError::ForeignDestination { addr: dst });
                }
            }
            FilterMode::Rewrite => {
                packet.set_source(first_address(&sender_ranges[0]));
                packet.set_destination(first_address(&local_ranges[0]));
            }
        }

        Ok(packet)
    }

    // ========================================
    // Persistence
    // ========================================

    /// Parses the JSON document form.
    ///
    /// # Errors
    /// Returns `Persistence`, `InvalidLabel` or `InvalidCidr`.
    pub fn from_json(json: &str) -> Result<Self, AddressError> {
        let document: BTreeMap<String, Vec<String>> = serde_json::from_str(json)
            .map_err(|e| AddressError::persistence("<json>", e.to_string()))?;

        let mut map = Self::new();
        for (label, ranges) in document {
            let parsed = Label::parse(&label)
                .map_err(|e| AddressError::invalid_label(&label, e.to_string()))?;
            for range in ranges {
                let net: Ipv4Net = range
                    .parse()
                    .map_err(|e: ipnet::AddrParseError| {
                        AddressError::invalid_cidr(&range, e.to_string())
                    })?;
                map.provision(parsed.clone(), net);
            }
        }
        Ok(map)
    }

    /// Renders the JSON document form.
    ///
    /// # Errors
    /// Returns `Persistence` if serialization fails.
    pub fn to_json(&self) -> Result<String, AddressError> {
        let document: BTreeMap<&str, Vec<String>> = self
            .by_label
            .iter()
            .map(|(label, ranges)| {
                (label.as_str(), ranges.iter().map(ToString::to_string).collect())
            })
            .collect();
        serde_json::to_string_pretty(&document)
            .map_err(|e| AddressError::persistence("<json>", e.to_string()))
    }

    /// Loads the map from a JSON file.
    ///
    /// # Errors
    /// Returns `Persistence` if the file can't be read, or a parse error.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AddressError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AddressError::persistence(&path_str, e.to_string()))?;
        let map = Self::from_json(&content)?;

        info!(path = %path_str, entries = map.len(), "Address map loaded");
        Ok(map)
    }

    /// Saves the map to a JSON file.
    ///
    /// # Errors
    /// Returns `Persistence` if the file can't be written.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), AddressError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        let json = self.to_json()?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| AddressError::persistence(&path_str, e.to_string()))?;

        debug!(path = %path_str, entries = self.len(), "Address map saved");
        Ok(())
    }
}

/// First usable host of `range`; the address itself for /31 and /32.
fn first_address(range: &Ipv4Net) -> Ipv4Addr {
    range.hosts().next().unwrap_or_else(|| range.addr())
}

// ============================================
// Tests
// ============================================
