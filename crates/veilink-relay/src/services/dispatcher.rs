// ============================================
// File: crates/veilink-relay/src/services/dispatcher.rs
// ============================================
//! # Dispatcher
//!
//! ## Creation Reason
//! All mutable relay state (destination cache, tunnel sessions) lives
//! in one task. Readers and the resolver talk to it only through
//! queues.
//!
//! ## Main Functionality
//! - Local packets: destination → owner label → identity → tunnel → send
//! - Network frames: tunnel control, relayed packets → address map →
//!   device
//! - Lookup results: fill the cache, flush parked packets
//! - Keep-alives, revocation and teardown
//!
//! ## Event Flow
//! ```text
//!  device reader ──LocalEvent──┐
//!  network reader ─NetworkEvent┼──► Dispatcher ──► transport.send_to
//!  resolver ─────Resolution────┤        │    └───► device.write
//!  RelayHandle ──RelayCommand──┘        └──► resolver (try_send)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Never blocks on the resolver queue (try_send); a full queue fails
//!   the lookup instead, otherwise resolver and dispatcher can deadlock
//! - Per-packet problems are logged and dropped; only session loss and
//!   device failure end the loop with an error
//!
//! ## Last Modified
//! v0.1.0 - Initial dispatcher

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use veilink_common::types::TunnelId;
use veilink_core::identity::{Identity, Label};
use veilink_core::protocol::LinkFrame;
use veilink_transport::error::TransportError;
use veilink_transport::traits::{DatagramTransport, Device};

use crate::error::{RelayError, Result};
use crate::handlers::Packet;
use crate::relay::RelayOptions;
use crate::services::address_map::AddressMap;
use crate::services::cache::{CacheState, DestinationCache};
use crate::services::tunnel::{TunnelPolicy, TunnelSession};

/// Interval of the lookup-timeout sweep.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(1);

/// Peers silent for this many keep-alive intervals are reported.
const SILENT_INTERVALS: u32 = 3;

// ============================================
// Events
// ============================================

/// From the device reader.
#[derive(Debug)]
pub(crate) enum LocalEvent {
    Packet(Vec<u8>),
    Failed { attempts: u32, source: TransportError },
}

/// From the network reader.
#[derive(Debug)]
pub(crate) enum NetworkEvent {
    Frame { frame: LinkFrame, sender: Identity },
    Lost(TransportError),
}

/// From the resolver.
#[derive(Debug)]
pub(crate) struct Resolution {
    pub label: Label,
    pub result: std::result::Result<Identity, TransportError>,
}

/// From a `RelayHandle`.
#[derive(Debug)]
pub(crate) enum RelayCommand {
    Revoke(Label),
}

/// Queues the dispatcher consumes.
pub(crate) struct DispatcherInputs {
    pub local: mpsc::Receiver<LocalEvent>,
    pub network: mpsc::Receiver<NetworkEvent>,
    pub resolved: mpsc::Receiver<Resolution>,
    pub commands: mpsc::Receiver<RelayCommand>,
    pub shutdown: broadcast::Receiver<()>,
}

// ============================================
// Dispatcher
// ============================================

pub(crate) struct Dispatcher {
    options: RelayOptions,
    local: Identity,
    map: Arc<AddressMap>,
    policy: Arc<dyn TunnelPolicy>,
    device: Arc<dyn Device>,
    transport: Arc<dyn DatagramTransport>,
    resolve_tx: mpsc::Sender<Label>,
    cache: DestinationCache,
    sessions: HashMap<Label, TunnelSession>,
}

impl Dispatcher {
    pub(crate) fn new(
        options: RelayOptions,
        map: Arc<AddressMap>,
        policy: Arc<dyn TunnelPolicy>,
        device: Arc<dyn Device>,
        transport: Arc<dyn DatagramTransport>,
        resolve_tx: mpsc::Sender<Label>,
    ) -> Self {
        let cache = DestinationCache::new(
            options.pending_per_destination,
            options.lookup_timeout,
            options.negative_ttl,
        );
        Self {
            local: transport.local_identity().clone(),
            options,
            map,
            policy,
            device,
            transport,
            resolve_tx,
            cache,
            sessions: HashMap::new(),
        }
    }

    /// Runs until shutdown (`Ok`), session loss or device failure.
    pub(crate) async fn run(mut self, mut inputs: DispatcherInputs) -> Result<()> {
        let mut keepalive = tokio::time::interval(self.options.keepalive_interval);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        keepalive.tick().await;

        let mut housekeeping = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = inputs.shutdown.recv() => {
                    debug!("Dispatcher received shutdown signal");
                    self.teardown_all().await;
                    return Ok(());
                }
                Some(command) = inputs.commands.recv() => match command {
                    RelayCommand::Revoke(label) => self.revoke(&label).await?,
                },
                Some(resolution) = inputs.resolved.recv() => {
                    self.handle_resolution(resolution, Instant::now()).await?;
                }
                Some(event) = inputs.network.recv() => match event {
                    NetworkEvent::Frame { frame, sender } => {
                        self.handle_frame(&frame, sender, Instant::now()).await?;
                    }
                    NetworkEvent::Lost(source) => {
                        return Err(RelayError::SessionLost { source });
                    }
                },
                Some(event) = inputs.local.recv() => match event {
                    LocalEvent::Packet(bytes) => {
                        self.handle_local_packet(bytes, Instant::now()).await?;
                    }
                    LocalEvent::Failed { attempts, source } => {
                        self.teardown_all().await;
                        return Err(RelayError::Device { attempts, source });
                    }
                },
                _ = keepalive.tick() => self.send_keepalives(Instant::now()).await?,
                _ = housekeeping.tick() => self.expire(Instant::now()),
            }
        }
    }

    // ========================================
    // Local → network
    // ========================================

    async fn handle_local_packet(&mut self, bytes: Vec<u8>, now: Instant) -> Result<()> {
        let packet = match Packet::parse(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                trace!(error = %e, "Dropping local packet");
                return Ok(());
            }
        };

        let Some(owner) = self.map.owner_of(packet.destination()).cloned() else {
            trace!(dst = %packet.destination(), "No peer owns destination");
            return Ok(());
        };
        if &owner == self.local.label() {
            trace!(dst = %packet.destination(), "Destination is local, dropping");
            return Ok(());
        }

        match self.cache.lookup(&owner, now) {
            CacheState::Hit(identity) => self.forward(identity, packet, now).await,
            CacheState::Negative => {
                debug!(peer = %owner, "Destination unresolvable, dropping packet");
                Ok(())
            }
            CacheState::Pending | CacheState::Miss => {
                if self.cache.enqueue(&owner, packet.into_bytes(), now) {
                    self.request_lookup(owner, now);
                }
                Ok(())
            }
        }
    }

    fn request_lookup(&mut self, label: Label, now: Instant) {
        match self.resolve_tx.try_send(label.clone()) {
            Ok(()) => debug!(peer = %label, "Destination lookup queued"),
            Err(e) => {
                let dropped = self.cache.failed(&label, now);
                warn!(peer = %label, dropped, error = %e, "Could not queue destination lookup");
            }
        }
    }

    async fn forward(&mut self, peer: Identity, packet: Packet, now: Instant) -> Result<()> {
        let retry = self.options.tunnel_retry_interval;
        let session = self
            .sessions
            .entry(peer.label().clone())
            .or_insert_with(|| TunnelSession::new(peer.clone(), retry, now));

        let tid = session.outbound_tunnel_for(&packet);
        if !tid.is_none() {
            return self.send_packets(&peer, tid, packet.into_bytes()).await;
        }

        let src = packet.source();
        let Some(range) = self
            .map
            .ranges_for(self.local.label())
            .iter()
            .find(|range| range.contains(&src))
            .copied()
        else {
            debug!(src = %src, "Source outside our ranges, dropping packet");
            return Ok(());
        };

        if session.is_refused(&range, now) {
            debug!(peer = %peer.label(), %range, "Tunnel refused, dropping packet");
            return Ok(());
        }

        session.hold(range, packet.into_bytes());
        match session.request_tunnel(range, now) {
            Some(request) => self.send_frame(&peer, &request).await,
            None => Ok(()),
        }
    }

    async fn flush_pending(&mut self, peer: &Identity, packets: Vec<Vec<u8>>, now: Instant) -> Result<()> {
        for bytes in packets {
            if let Ok(packet) = Packet::parse(bytes) {
                self.forward(peer.clone(), packet, now).await?;
            }
        }
        Ok(())
    }

    // ========================================
    // Network → local
    // ========================================

    async fn handle_frame(&mut self, frame: &LinkFrame, sender: Identity, now: Instant) -> Result<()> {
        let parked = self.cache.learn(&sender);

        let retry = self.options.tunnel_retry_interval;
        let session = self
            .sessions
            .entry(sender.label().clone())
            .or_insert_with(|| TunnelSession::new(sender.clone(), retry, now));

        match session.handle_frame(frame, self.policy.as_ref(), now) {
            Ok(outcome) => {
                if let Some(reply) = outcome.reply {
                    self.send_frame(&sender, &reply).await?;
                }
                for bytes in outcome.deliver {
                    self.deliver_inbound(sender.label(), bytes).await;
                }
                for (tid, bytes) in outcome.release {
                    self.send_packets(&sender, tid, bytes).await?;
                }
            }
            Err(e) => {
                debug!(peer = %sender.label(), method = %frame.method, error = %e, "Dropping malformed frame");
            }
        }

        if !parked.is_empty() {
            self.flush_pending(&sender, parked, now).await?;
        }
        Ok(())
    }

    async fn deliver_inbound(&self, sender: &Label, bytes: Vec<u8>) {
        match self
            .map
            .filter_inbound(sender, self.local.label(), bytes, self.options.filter_mode)
        {
            Ok(packet) => {
                if let Err(e) = self.device.write(packet.as_bytes()).await {
                    warn!(device = self.device.name(), error = %e, "Device write failed");
                }
            }
            Err(e) => debug!(peer = %sender, error = %e, "Inbound packet rejected"),
        }
    }

    async fn handle_resolution(&mut self, resolution: Resolution, now: Instant) -> Result<()> {
        let Resolution { label, result } = resolution;
        match result {
            Ok(identity) if identity.label() == &label => {
                let parked = self.cache.resolved(identity.clone());
                debug!(peer = %label, parked = parked.len(), "Destination resolved");
                self.flush_pending(&identity, parked, now).await
            }
            Ok(identity) => {
                let dropped = self.cache.failed(&label, now);
                warn!(peer = %label, got = %identity.label(), dropped, "Lookup returned another destination");
                Ok(())
            }
            Err(e) => {
                let dropped = self.cache.failed(&label, now);
                warn!(peer = %label, dropped, error = %e, "Destination lookup failed");
                Ok(())
            }
        }
    }

    // ========================================
    // Sending
    // ========================================

    async fn send_packets(&self, peer: &Identity, tid: TunnelId, bytes: Vec<u8>) -> Result<()> {
        match LinkFrame::relay_data(tid, &[bytes]) {
            Ok(frame) => self.send_frame(peer, &frame).await,
            Err(e) => {
                debug!(peer = %peer.label(), tid = %tid, error = %e, "Packet not relayable");
                Ok(())
            }
        }
    }

    /// Sends a frame; only a lost session is an error.
    async fn send_frame(&self, peer: &Identity, frame: &LinkFrame) -> Result<()> {
        match self.transport.send_to(peer, &frame.encode()).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_session_fatal() => Err(RelayError::SessionLost { source: e }),
            Err(e) => {
                debug!(peer = %peer.label(), method = %frame.method, error = %e, "Send failed");
                Ok(())
            }
        }
    }

    // ========================================
    // Lifecycle
    // ========================================

    async fn send_keepalives(&mut self, now: Instant) -> Result<()> {
        let silent_after = self.options.keepalive_interval * SILENT_INTERVALS;
        let mut pings = Vec::new();
        for session in self.sessions.values_mut().filter(|s| s.has_tunnels()) {
            if now.duration_since(session.last_seen()) >= silent_after {
                debug!(peer = %session.label(), "Peer silent");
            }
            pings.push((session.peer().clone(), session.next_ping()));
        }

        for (peer, ping) in pings {
            self.send_frame(&peer, &ping).await?;
        }
        Ok(())
    }

    fn expire(&mut self, now: Instant) {
        for label in self.cache.expire(now) {
            warn!(peer = %label, "Destination lookup timed out");
        }
    }

    async fn revoke(&mut self, label: &Label) -> Result<()> {
        let Some(mut session) = self.sessions.remove(label) else {
            debug!(peer = %label, "Revoke for unknown peer");
            return Ok(());
        };

        let frames = session.teardown();
        info!(peer = %label, frames = frames.len(), "Revoking peer");
        for frame in &frames {
            self.send_frame(session.peer(), frame).await?;
        }
        Ok(())
    }

    /// Best-effort teardown of every peer.
    async fn teardown_all(&mut self) {
        let sessions: Vec<TunnelSession> = self.sessions.drain().map(|(_, s)| s).collect();
        for mut session in sessions {
            for frame in session.teardown() {
                if let Err(e) = self.send_frame(session.peer(), &frame).await {
                    debug!(peer = %session.label(), error = %e, "Teardown frame not sent");
                    break;
                }
            }
        }
    }
}
