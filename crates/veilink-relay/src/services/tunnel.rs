// ============================================
// File: crates/veilink-relay/src/services/tunnel.rs
// ============================================
//! # Tunnel Session
//!
//! ## Creation Reason
//! Tracks the tunnels between us and one peer and applies the link
//! control protocol to them.
//!
//! ## Main Functionality
//! - `TunnelSession`: Per-peer tunnel state, owned by the dispatcher
//! - `TunnelPolicy`: Decides whether a requested range is granted
//! - `AddressMapPolicy`: Grants ranges inside the peer's own ranges
//! - `FrameOutcome`: What the dispatcher must do after a frame
//!
//! ## Tunnel Lifecycle
//! ```text
//!            CLIENT_TUN_NEW (accepted)
//!  absent ─────────────────────────────► active
//!    ▲                                     │
//!    └──── CLIENT_TUN_DEL / SERVER_TUN_BAI ┘
//! ```
//!
//! A tunnel is a grant for the requester to send from a range:
//! - `tunnels`: ranges we granted to the peer (ids from our allocator)
//! - `remote_tunnels`: ranges the peer granted to us (ids from theirs)
//!
//! ## ⚠️ Important Note for Next Developer
//! - Never performs I/O: every effect is returned in `FrameOutcome`
//! - Ids come from a monotonic counter starting at 1 and are never
//!   reused within a session
//! - Iteration is by ascending id, which makes `tunnel_id_for`
//!   first-match deterministic
//!
//! ## Last Modified
//! v0.1.0 - Initial tunnel session
//! v0.1.1 - Relayed packets checked against the tunnel the frame names

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ipnet::Ipv4Net;
use tracing::{debug, info, trace, warn};

use veilink_common::types::TunnelId;
use veilink_core::identity::{Identity, Label};
use veilink_core::protocol::messages::{
    PARAM_CIDR, PARAM_PING_NUMBER, PARAM_REMOVED, PARAM_TUNNEL_ID,
};
use veilink_core::protocol::{LinkFrame, Method};

use crate::error::{RelayError, Result};
use crate::handlers::Packet;
use crate::services::address_map::AddressMap;

/// Packets held per peer while tunnel requests are outstanding.
pub const HELD_PACKETS_PER_PEER: usize = 32;

// ============================================
// TunnelPolicy
// ============================================

/// Decides whether a peer may have a tunnel for a range.
pub trait TunnelPolicy: Send + Sync {
    /// Returns `true` to grant `range` to `peer`.
    fn allow(&self, peer: &Label, range: &Ipv4Net) -> bool;
}

/// Grants a range only if it lies inside one of the peer's registered
/// ranges.
#[derive(Debug, Clone)]
pub struct AddressMapPolicy {
    map: Arc<AddressMap>,
}

impl AddressMapPolicy {
    #[must_use]
    pub const fn new(map: Arc<AddressMap>) -> Self {
        Self { map }
    }
}

impl TunnelPolicy for AddressMapPolicy {
    fn allow(&self, peer: &Label, range: &Ipv4Net) -> bool {
        self.map.covers(peer, range)
    }
}

// ============================================
// Tunnel / FrameOutcome
// ============================================

/// An active tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tunnel {
    pub id: TunnelId,
    pub range: Ipv4Net,
}

/// Effects of handling one frame.
#[derive(Debug, Default)]
pub struct FrameOutcome {
    /// Reply to send back to the peer.
    pub reply: Option<LinkFrame>,
    /// Relayed packets for the address-map/device path.
    pub deliver: Vec<Vec<u8>>,
    /// Held packets that can now go out, with their tunnel.
    pub release: Vec<(TunnelId, Vec<u8>)>,
}

impl FrameOutcome {
    fn reply(frame: LinkFrame) -> Self {
        Self {
            reply: Some(frame),
            ..Self::default()
        }
    }
}

// ============================================
// TunnelSession
// ============================================

/// Tunnel state for one peer.
pub struct TunnelSession {
    peer: Identity,
    /// Granted by us, keyed by our ids.
    tunnels: BTreeMap<TunnelId, Tunnel>,
    next_id: TunnelId,
    /// Granted to us, keyed by the peer's ids.
    remote_tunnels: BTreeMap<TunnelId, Tunnel>,
    /// Outstanding requests and when they were sent.
    requested: BTreeMap<Ipv4Net, Instant>,
    /// Refused ranges and when they may be requested again.
    refused: BTreeMap<Ipv4Net, Instant>,
    held: VecDeque<(Ipv4Net, Vec<u8>)>,
    retry_interval: Duration,
    last_seen: Instant,
    ping_sequence: u64,
}

impl TunnelSession {
    /// Creates an empty session with `peer`.
    #[must_use]
    pub fn new(peer: Identity, retry_interval: Duration, now: Instant) -> Self {
        Self {
            peer,
            tunnels: BTreeMap::new(),
            next_id: TunnelId::FIRST,
            remote_tunnels: BTreeMap::new(),
            requested: BTreeMap::new(),
            refused: BTreeMap::new(),
            held: VecDeque::new(),
            retry_interval,
            last_seen: now,
            ping_sequence: 0,
        }
    }

    #[must_use]
    pub const fn peer(&self) -> &Identity {
        &self.peer
    }

    #[must_use]
    pub const fn label(&self) -> &Label {
        self.peer.label()
    }

    /// Tunnels we granted, ascending id.
    pub fn tunnels(&self) -> impl Iterator<Item = &Tunnel> {
        self.tunnels.values()
    }

    /// Tunnels the peer granted us, ascending id.
    pub fn remote_tunnels(&self) -> impl Iterator<Item = &Tunnel> {
        self.remote_tunnels.values()
    }

    /// Returns `true` if any tunnel exists in either direction.
    #[must_use]
    pub fn has_tunnels(&self) -> bool {
        !self.tunnels.is_empty() || !self.remote_tunnels.is_empty()
    }

    #[must_use]
    pub const fn last_seen(&self) -> Instant {
        self.last_seen
    }

    #[must_use]
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    // ========================================
    // Inbound frames
    // ========================================

    /// Applies one frame from the peer.
    ///
    /// # Errors
    /// Returns `MalformedFrame` (or a core error) when a required
    /// parameter is missing or invalid; state is unchanged.
    pub fn handle_frame(
        &mut self,
        frame: &LinkFrame,
        policy: &dyn TunnelPolicy,
        now: Instant,
    ) -> Result<FrameOutcome> {
        self.last_seen = now;

        if frame.is_reply() {
            return self.handle_reply(frame, now);
        }

        match frame.method {
            Method::Null => Ok(FrameOutcome::default()),
            Method::AlivePing => {
                let sequence = frame.get_param_int(PARAM_PING_NUMBER).ok();
                trace!(peer = %self.label(), ?sequence, "Keep-alive received");
                Ok(FrameOutcome::default())
            }
            Method::ClientTunNew => self.handle_tunnel_request(frame, policy),
            Method::ClientTunDel => self.handle_tunnel_delete(frame),
            Method::ServerTunBai => {
                let tid = frame.tunnel_id()?;
                if tid.is_none() {
                    self.remote_tunnels.clear();
                } else {
                    self.remote_tunnels.remove(&tid);
                }
                info!(peer = %self.label(), tid = %tid, "Peer withdrew tunnel");
                Ok(FrameOutcome::default())
            }
            Method::RelayTunData => Ok(FrameOutcome {
                deliver: self.accept_relay(frame)?,
                ..FrameOutcome::default()
            }),
        }
    }

    fn handle_tunnel_request(
        &mut self,
        frame: &LinkFrame,
        policy: &dyn TunnelPolicy,
    ) -> Result<FrameOutcome> {
        let cidr = frame.get_param_str(PARAM_CIDR)?;

        let id = match cidr.parse::<Ipv4Net>() {
            Ok(range) => {
                let range = range.trunc();
                if policy.allow(self.peer.label(), &range) {
                    self.grant(range)
                } else {
                    warn!(peer = %self.label(), cidr, "Tunnel request refused by policy");
                    TunnelId::NONE
                }
            }
            Err(e) => {
                warn!(peer = %self.label(), cidr, error = %e, "Tunnel request with invalid CIDR");
                TunnelId::NONE
            }
        };

        Ok(FrameOutcome::reply(
            frame
                .reply(id.to_wire())
                .with_param(PARAM_TUNNEL_ID, id.to_wire())
                .with_param(PARAM_CIDR, cidr),
        ))
    }

    fn grant(&mut self, range: Ipv4Net) -> TunnelId {
        if let Some(existing) = self.tunnels.values().find(|t| t.range == range) {
            debug!(peer = %self.label(), tid = %existing.id, %range, "Tunnel already granted");
            return existing.id;
        }

        let id = self.next_id;
        self.next_id = id.next();
        self.tunnels.insert(id, Tunnel { id, range });
        info!(peer = %self.label(), tid = %id, %range, "Tunnel granted");
        id
    }

    fn handle_tunnel_delete(&mut self, frame: &LinkFrame) -> Result<FrameOutcome> {
        let tid = frame.tunnel_id()?;

        let removed = if tid.is_none() {
            let count = self.tunnels.len();
            self.tunnels.clear();
            count
        } else {
            usize::from(self.tunnels.remove(&tid).is_some())
        };
        info!(peer = %self.label(), tid = %tid, removed, "Tunnel delete");

        Ok(FrameOutcome::reply(
            frame
                .reply(tid.to_wire())
                .with_param(PARAM_TUNNEL_ID, tid.to_wire())
                .with_param(PARAM_REMOVED, i64::try_from(removed).unwrap_or(i64::MAX)),
        ))
    }

    /// Keeps the packets the tunnel `tid` covers: the peer's source in a
    /// range we granted under `tid`, or our destination in the range the
    /// peer granted us under `tid`. Both id spaces share the wire, so a
    /// tid may name one tunnel of each kind.
    fn accept_relay(&self, frame: &LinkFrame) -> Result<Vec<Vec<u8>>> {
        let tid = frame.tunnel_id()?;
        let granted = self.tunnels.get(&tid);
        let remote = self.remote_tunnels.get(&tid);

        if granted.is_none() && remote.is_none() {
            debug!(peer = %self.label(), tid = %tid, "Relay for unknown tunnel dropped");
            return Ok(Vec::new());
        }

        let packets = frame.packets();
        let total = packets.len();
        let accepted: Vec<Vec<u8>> = packets
            .into_iter()
            .filter(|bytes| {
                Packet::parse(bytes.clone()).is_ok_and(|packet| {
                    granted.is_some_and(|t| t.range.contains(&packet.source()))
                        || remote.is_some_and(|t| t.range.contains(&packet.destination()))
                })
            })
            .collect();
        if accepted.len() < total {
            debug!(
                peer = %self.label(),
                tid = %tid,
                dropped = total - accepted.len(),
                "Dropped relayed packets outside the tunnel's range"
            );
        }
        Ok(accepted)
    }

    fn handle_reply(&mut self, frame: &LinkFrame, now: Instant) -> Result<FrameOutcome> {
        match frame.method {
            Method::ClientTunNew => {
                let id = TunnelId::from_wire(frame.response.unwrap_or_default())?;
                let cidr = frame.get_param_str(PARAM_CIDR)?;
                let range = cidr
                    .parse::<Ipv4Net>()
                    .map_err(|e| RelayError::malformed_frame(format!("cidr '{cidr}': {e}")))?
                    .trunc();

                if self.requested.remove(&range).is_none() {
                    debug!(peer = %self.label(), %range, "Unsolicited tunnel reply ignored");
                    return Ok(FrameOutcome::default());
                }

                if id.is_none() {
                    self.refused.insert(range, now + self.retry_interval);
                    let before = self.held.len();
                    self.held.retain(|(held_range, _)| *held_range != range);
                    warn!(
                        peer = %self.label(),
                        %range,
                        dropped = before - self.held.len(),
                        "Tunnel request refused by peer"
                    );
                    return Ok(FrameOutcome::default());
                }

                self.refused.remove(&range);
                self.remote_tunnels.insert(id, Tunnel { id, range });
                info!(peer = %self.label(), tid = %id, %range, "Tunnel established");

                let mut release = Vec::new();
                let mut still_held = VecDeque::with_capacity(self.held.len());
                for (held_range, bytes) in self.held.drain(..) {
                    if held_range == range {
                        release.push((id, bytes));
                    } else {
                        still_held.push_back((held_range, bytes));
                    }
                }
                self.held = still_held;

                Ok(FrameOutcome {
                    release,
                    ..FrameOutcome::default()
                })
            }
            Method::ClientTunDel => {
                let removed = frame.get_param_int(PARAM_REMOVED).unwrap_or_default();
                debug!(peer = %self.label(), removed, "Peer confirmed tunnel delete");
                Ok(FrameOutcome::default())
            }
            method => {
                trace!(peer = %self.label(), %method, "Ignoring reply");
                Ok(FrameOutcome::default())
            }
        }
    }

    // ========================================
    // Outbound
    // ========================================

    /// Id of the first tunnel we granted whose range contains the
    /// packet's source, or `TunnelId::NONE`.
    #[must_use]
    pub fn tunnel_id_for(&self, packet: &Packet) -> TunnelId {
        let src = packet.source();
        self.tunnels
            .values()
            .find(|tunnel| tunnel.range.contains(&src))
            .map_or(TunnelId::NONE, |tunnel| tunnel.id)
    }

    /// Tunnel to send `packet` to the peer on: one granted to us whose
    /// range holds the source, else one we granted whose range holds
    /// the destination.
    #[must_use]
    pub fn outbound_tunnel_for(&self, packet: &Packet) -> TunnelId {
        let src = packet.source();
        if let Some(tunnel) = self
            .remote_tunnels
            .values()
            .find(|tunnel| tunnel.range.contains(&src))
        {
            return tunnel.id;
        }

        let dst = packet.destination();
        self.tunnels
            .values()
            .find(|tunnel| tunnel.range.contains(&dst))
            .map_or(TunnelId::NONE, |tunnel| tunnel.id)
    }

    /// Returns `true` while the peer's refusal of `range` stands.
    #[must_use]
    pub fn is_refused(&self, range: &Ipv4Net, now: Instant) -> bool {
        self.refused.get(range).is_some_and(|until| *until > now)
    }

    /// Holds a packet until `range` is granted. The oldest held packet
    /// is dropped when full.
    pub fn hold(&mut self, range: Ipv4Net, packet: Vec<u8>) {
        if self.held.len() >= HELD_PACKETS_PER_PEER {
            self.held.pop_front();
            trace!(peer = %self.label(), "Held packet queue full, dropped oldest");
        }
        self.held.push_back((range, packet));
    }

    /// Builds a CLIENT_TUN_NEW for `range` unless one is outstanding or
    /// the range is refused.
    pub fn request_tunnel(&mut self, range: Ipv4Net, now: Instant) -> Option<LinkFrame> {
        if self.is_refused(&range, now) {
            return None;
        }
        if let Some(sent) = self.requested.get(&range) {
            if now.duration_since(*sent) < self.retry_interval {
                return None;
            }
        }

        self.requested.insert(range, now);
        debug!(peer = %self.label(), %range, "Requesting tunnel");
        Some(LinkFrame::tunnel_request(&range.to_string()))
    }

    /// Next keep-alive probe.
    pub fn next_ping(&mut self) -> LinkFrame {
        self.ping_sequence += 1;
        LinkFrame::ping(self.ping_sequence)
    }

    /// Frames announcing the end of every tunnel, clearing all state:
    /// SERVER_TUN_BAI per granted tunnel, then CLIENT_TUN_DEL(0) if the
    /// peer granted us any.
    pub fn teardown(&mut self) -> Vec<LinkFrame> {
        let mut frames: Vec<LinkFrame> = self
            .tunnels
            .keys()
            .map(|tid| LinkFrame::tunnel_bai(*tid))
            .collect();
        if !self.remote_tunnels.is_empty() {
            frames.push(LinkFrame::tunnel_delete(TunnelId::NONE));
        }

        self.tunnels.clear();
        self.remote_tunnels.clear();
        self.requested.clear();
        self.held.clear();
        frames
    }
}

impl fmt::Debug for TunnelSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelSession")
            .field("peer", self.label())
            .field("tunnels", &self.tunnels.len())
            .field("remote_tunnels", &self.remote_tunnels.len())
            .field("held", &self.held.len())
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================
