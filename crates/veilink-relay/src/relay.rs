// ============================================
// File: crates/veilink-relay/src/relay.rs
// ============================================
//! # Relay Orchestrator
//!
//! ## Creation Reason
//! Wires a packet device and a datagram session together: spawns the
//! reader and resolver tasks, runs the dispatcher, and reports why the
//! relay stopped.
//!
//! ## Main Functionality
//! - `Relay`: Owns the collaborators until `run()`
//! - `RelayHandle`: Shutdown and peer revocation from outside
//! - `RelayOptions`: Every relay tunable, passed in explicitly
//!
//! ## Relay Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Relay                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐  │
//! │  │ Device Task  │  │ Network Task │  │  Resolver Task   │  │
//! │  │              │  │              │  │                  │  │
//! │  │ read packets │  │ receive,     │  │ lookups, bounded │  │
//! │  │ retry w/     │  │ authorize,   │  │ concurrency and  │  │
//! │  │ backoff      │  │ decode       │  │ timeout          │  │
//! │  └──────┬───────┘  └──────┬───────┘  └────────┬─────────┘  │
//! │         │                 │                   │            │
//! │         ▼                 ▼                   ▼            │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │        Dispatcher (cache + tunnel sessions)         │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Every queue is bounded by `queue_capacity`; readers wait when the
//!   dispatcher falls behind
//! - `SessionLost` is returned, never retried here: the caller builds a
//!   new session and a new relay
//! - The device is closed only on a clean shutdown, so the caller can
//!   reuse it after a session loss
//!
//! ## Last Modified
//! v0.1.0 - Initial relay implementation

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use veilink_core::identity::Label;
use veilink_core::protocol::LinkFrame;
use veilink_transport::error::TransportError;
use veilink_transport::traits::{DatagramTransport, Device, NameResolver};

use crate::error::{RelayError, Result};
use crate::services::address_map::{AddressMap, FilterMode};
use crate::services::dispatcher::{
    Dispatcher, DispatcherInputs, LocalEvent, NetworkEvent, RelayCommand, Resolution,
};
use crate::services::tunnel::TunnelPolicy;

/// Bound on waiting for each task at shutdown.
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest packet the device reader accepts.
const READ_BUFFER_SIZE: usize = 65535;

// ============================================
// RelayOptions
// ============================================

/// Relay tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOptions {
    /// Capacity of every queue between tasks.
    pub queue_capacity: usize,
    /// Bound on a single destination lookup.
    pub lookup_timeout: Duration,
    /// How long a failed lookup is remembered.
    pub negative_ttl: Duration,
    /// Packets parked per destination during its lookup.
    pub pending_per_destination: usize,
    /// Lookups in flight at once.
    pub max_concurrent_lookups: usize,
    /// Keep-alive period for peers with tunnels.
    pub keepalive_interval: Duration,
    /// Delay between device read retries.
    pub device_retry_backoff: Duration,
    /// Consecutive device read failures tolerated.
    pub device_retry_limit: u32,
    /// Minimum delay before re-requesting a tunnel.
    pub tunnel_retry_interval: Duration,
    /// Inbound packet filtering.
    pub filter_mode: FilterMode,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            lookup_timeout: Duration::from_secs(30),
            negative_ttl: Duration::from_secs(60),
            pending_per_destination: 8,
            max_concurrent_lookups: 4,
            keepalive_interval: Duration::from_secs(30),
            device_retry_backoff: Duration::from_millis(500),
            device_retry_limit: 10,
            tunnel_retry_interval: Duration::from_secs(30),
            filter_mode: FilterMode::Strict,
        }
    }
}

// ============================================
// RelayHandle
// ============================================

/// Controls a running relay.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    shutdown_tx: broadcast::Sender<()>,
    commands: mpsc::Sender<RelayCommand>,
}

impl RelayHandle {
    /// Tears down every peer, closes device and transport, and makes
    /// `run()` return `Ok(())`.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Ends every tunnel with `label` and forgets its state.
    ///
    /// # Errors
    /// Returns `ShuttingDown` if the relay is no longer running.
    pub async fn revoke(&self, label: Label) -> Result<()> {
        self.commands
            .send(RelayCommand::Revoke(label))
            .await
            .map_err(|_| RelayError::ShuttingDown)
    }
}

// ============================================
// Relay
// ============================================

/// Packet relay between a local device and network peers.
pub struct Relay {
    options: RelayOptions,
    map: Arc<AddressMap>,
    device: Arc<dyn Device>,
    transport: Arc<dyn DatagramTransport>,
    resolver: Arc<dyn NameResolver>,
    policy: Arc<dyn TunnelPolicy>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
    commands_rx: mpsc::Receiver<RelayCommand>,
}

impl Relay {
    /// Creates a relay and its handle. Our own label is the transport's
    /// local identity.
    pub fn new(
        options: RelayOptions,
        map: Arc<AddressMap>,
        device: Arc<dyn Device>,
        transport: Arc<dyn DatagramTransport>,
        resolver: Arc<dyn NameResolver>,
        policy: Arc<dyn TunnelPolicy>,
    ) -> (Self, RelayHandle) {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (commands_tx, commands_rx) = mpsc::channel(options.queue_capacity.max(1));

        let handle = RelayHandle {
            shutdown_tx: shutdown_tx.clone(),
            commands: commands_tx,
        };
        let relay = Self {
            options,
            map,
            device,
            transport,
            resolver,
            policy,
            shutdown_tx,
            shutdown_rx,
            commands_rx,
        };
        (relay, handle)
    }

    /// Our label on the network.
    #[must_use]
    pub fn local_label(&self) -> &Label {
        self.transport.local_identity().label()
    }

    /// Runs until shutdown.
    ///
    /// # Errors
    /// - `SessionLost` when the datagram session fails
    /// - `Device` when device reads keep failing past the retry limit
    pub async fn run(self) -> Result<()> {
        let local = self.local_label().clone();
        info!(
            label = %local,
            device = self.device.name(),
            peers = self.map.labels().count(),
            "Relay starting"
        );
        if !self.map.is_authorized(&local) {
            warn!(label = %local, "Local label has no address ranges; inbound packets will be rejected");
        }

        let capacity = self.options.queue_capacity.max(1);
        let (local_tx, local_rx) = mpsc::channel(capacity);
        let (network_tx, network_rx) = mpsc::channel(capacity);
        let (resolve_tx, resolve_rx) = mpsc::channel(capacity);
        let (resolved_tx, resolved_rx) = mpsc::channel(capacity);

        let tasks = vec![
            ("device", self.spawn_device_task(local_tx)),
            ("network", self.spawn_network_task(network_tx)),
            ("resolver", self.spawn_resolver_task(resolve_rx, resolved_tx)),
        ];

        let dispatcher = Dispatcher::new(
            self.options.clone(),
            Arc::clone(&self.map),
            Arc::clone(&self.policy),
            Arc::clone(&self.device),
            Arc::clone(&self.transport),
            resolve_tx,
        );
        let inputs = DispatcherInputs {
            local: local_rx,
            network: network_rx,
            resolved: resolved_rx,
            commands: self.commands_rx,
            shutdown: self.shutdown_rx,
        };

        let result = dispatcher.run(inputs).await;
        match &result {
            Ok(()) => info!("Relay shutting down"),
            Err(e) => error!(error = %e, "Relay stopped"),
        }

        // Stop readers
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "Transport close error");
        }
        if result.is_ok() {
            if let Err(e) = self.device.close().await {
                warn!(error = %e, "Device close error");
            }
        }

        for (name, task) in tasks {
            match tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, task).await {
                Ok(Ok(())) => debug!("Task '{}' completed", name),
                Ok(Err(e)) => warn!("Task '{}' failed: {}", name, e),
                Err(_) => warn!("Task '{}' timed out during shutdown", name),
            }
        }

        info!("Relay stopped");
        result
    }

    /// Spawns the device read task.
    fn spawn_device_task(&self, tx: mpsc::Sender<LocalEvent>) -> JoinHandle<()> {
        let device = Arc::clone(&self.device);
        let backoff = self.options.device_retry_backoff;
        let limit = self.options.device_retry_limit;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut buf = vec![0u8; READ_BUFFER_SIZE];
            let mut failures: u32 = 0;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Device task received shutdown signal");
                        break;
                    }
                    result = device.read(&mut buf) => {
                        match result {
                            Ok(0) => {}
                            Ok(len) => {
                                failures = 0;
                                if tx.send(LocalEvent::Packet(buf[..len].to_vec())).await.is_err() {
                                    break;
                                }
                            }
                            Err(TransportError::DeviceClosed) => break,
                            Err(e) => {
                                failures += 1;
                                if failures > limit {
                                    error!(device = device.name(), attempts = failures, error = %e, "Device read failed, giving up");
                                    let _ = tx.send(LocalEvent::Failed { attempts: failures, source: e }).await;
                                    break;
                                }
                                warn!(device = device.name(), attempt = failures, error = %e, "Device read failed, retrying");
                                tokio::time::sleep(backoff).await;
                            }
                        }
                    }
                }
            }

            debug!("Device task exiting");
        })
    }

    /// Spawns the network receive task.
    fn spawn_network_task(&self, tx: mpsc::Sender<NetworkEvent>) -> JoinHandle<()> {
        let transport = Arc::clone(&self.transport);
        let map = Arc::clone(&self.map);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Network task received shutdown signal");
                        break;
                    }
                    result = transport.receive_from() => {
                        match result {
                            Ok((payload, sender)) => {
                                if !map.is_authorized(sender.label()) {
                                    debug!(peer = %sender.label(), "Datagram from unauthorized peer dropped");
                                    continue;
                                }
                                match LinkFrame::decode(&payload) {
                                    Ok(frame) => {
                                        if tx.send(NetworkEvent::Frame { frame, sender }).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        debug!(peer = %sender.label(), error = %e, "Malformed frame dropped");
                                    }
                                }
                            }
                            Err(TransportError::SessionClosed) => break,
                            Err(e) => {
                                error!(error = %e, "Datagram session lost");
                                let _ = tx.send(NetworkEvent::Lost(e)).await;
                                break;
                            }
                        }
                    }
                }
            }

            debug!("Network task exiting");
        })
    }

    /// Spawns the lookup task.
    fn spawn_resolver_task(
        &self,
        requests: mpsc::Receiver<Label>,
        results: mpsc::Sender<Resolution>,
    ) -> JoinHandle<()> {
        tokio::spawn(run_resolver(
            Arc::clone(&self.resolver),
            requests,
            results,
            self.options.max_concurrent_lookups.max(1),
            self.options.lookup_timeout,
        ))
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("label", self.local_label())
            .field("device", &self.device.name())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Resolves labels with at most `max_in_flight` lookups at once. Exits
/// when the request queue closes.
async fn run_resolver(
    resolver: Arc<dyn NameResolver>,
    mut requests: mpsc::Receiver<Label>,
    results: mpsc::Sender<Resolution>,
    max_in_flight: usize,
    timeout: Duration,
) {
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            request = requests.recv(), if in_flight.len() < max_in_flight => {
                let Some(label) = request else { break };
                let resolver = Arc::clone(&resolver);
                in_flight.spawn(async move {
                    let result = match tokio::time::timeout(timeout, resolver.lookup(label.as_str())).await {
                        Ok(result) => result,
                        Err(_) => Err(TransportError::timeout("destination lookup")),
                    };
                    Resolution { label, result }
                });
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                match joined {
                    Ok(resolution) => {
                        if results.send(resolution).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Lookup task failed"),
                }
            }
            else => break,
        }
    }

    debug!("Resolver task exiting");
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    use veilink_core::identity::Identity;
    use veilink_transport::memory::MemoryNetwork;
    use veilink_transport::traits::DeviceConfig;
    use veilink_transport::MockDevice;

    use crate::handlers::packet::build_packet;
    use crate::services::tunnel::AddressMapPolicy;

    const WAIT: Duration = Duration::from_secs(2);

    fn identity(seed: u8) -> Identity {
        Identity::from_bytes(vec![seed; 387]).unwrap()
    }

    fn options() -> RelayOptions {
        RelayOptions {
            device_retry_backoff: Duration::from_millis(5),
            device_retry_limit: 2,
            lookup_timeout: Duration::from_millis(200),
            ..RelayOptions::default()
        }
    }

    struct Node {
        handle: RelayHandle,
        device: Arc<MockDevice>,
        task: JoinHandle<Result<()>>,
    }

    fn start(network: &Arc<MemoryNetwork>, me: Identity, map: &Arc<AddressMap>, options: RelayOptions) -> Node {
        let endpoint = Arc::new(network.endpoint(me));
        let device = Arc::new(MockDevice::new(DeviceConfig::default()));
        let (relay, handle) = Relay::new(
            options,
            Arc::clone(map),
            Arc::clone(&device) as Arc<dyn Device>,
            Arc::clone(&endpoint) as Arc<dyn DatagramTransport>,
            endpoint as Arc<dyn NameResolver>,
            Arc::new(AddressMapPolicy::new(Arc::clone(map))),
        );
        Node {
            handle,
            device,
            task: tokio::spawn(relay.run()),
        }
    }

    fn two_peer_map(a: &Identity, b: &Identity) -> Arc<AddressMap> {
        Arc::new(AddressMap::from_entries([
            (a.label().clone(), "10.0.0.0/24".parse().unwrap()),
            (b.label().clone(), "10.0.0.1/32".parse().unwrap()),
        ]))
    }

    #[tokio::test]
    async fn test_packet_crosses_after_lookup_and_tunnel() {
        let network = MemoryNetwork::new();
        let (a, b) = (identity(1), identity(2));
        let map = two_peer_map(&a, &b);

        let node_a = start(&network, a, &map, options());
        let node_b = start(&network, b, &map, options());

        let raw = build_packet(Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(10, 0, 0, 1), b"ping");
        node_a.device.inject_packet(raw.clone());

        let written = node_b.device.wait_written(1, WAIT).await;
        assert_eq!(written, vec![raw]);
        assert_eq!(network.lookup_count(), 1);

        // Reply direction uses the tunnel B granted.
        let reply = build_packet(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 5), b"pong");
        node_b.device.inject_packet(reply.clone());
        let written = node_a.device.wait_written(1, WAIT).await;
        assert_eq!(written, vec![reply]);

        node_a.handle.shutdown();
        node_b.handle.shutdown();
        assert!(node_a.task.await.unwrap().is_ok());
        assert!(node_b.task.await.unwrap().is_ok());
        assert!(node_a.device.is_closed());
    }

    #[tokio::test]
    async fn test_unresolvable_destination_dropped() {
        let network = MemoryNetwork::new();
        let (a, b) = (identity(1), identity(2));
        let map = two_peer_map(&a, &b);

        // B never joins the network.
        let node_a = start(&network, a, &map, options());
        let raw = build_packet(Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(10, 0, 0, 1), b"");
        node_a.device.inject_packet(raw.clone());
        node_a.device.inject_packet(raw);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(network.lookup_count(), 1);

        node_a.handle.shutdown();
        assert!(node_a.task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_device_failure_is_reported() {
        let network = MemoryNetwork::new();
        let (a, b) = (identity(1), identity(2));
        let map = two_peer_map(&a, &b);

        let node_a = start(&network, a, &map, options());
        node_a.device.fail_next_reads(10);

        let result = tokio::time::timeout(WAIT, node_a.task).await.unwrap().unwrap();
        assert!(matches!(result, Err(RelayError::Device { attempts: 3, .. })));
        assert!(!node_a.device.is_closed());
    }

    #[tokio::test]
    async fn test_transient_device_failure_recovers() {
        let network = MemoryNetwork::new();
        let (a, b) = (identity(1), identity(2));
        let map = two_peer_map(&a, &b);

        let node_a = start(&network, a, &map, options());
        let node_b = start(&network, b, &map, options());
        node_a.device.fail_next_reads(2);

        let raw = build_packet(Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(10, 0, 0, 1), b"x");
        node_a.device.inject_packet(raw.clone());
        assert_eq!(node_b.device.wait_written(1, WAIT).await, vec![raw]);

        node_a.handle.shutdown();
        node_b.handle.shutdown();
        assert!(node_a.task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_session_loss_is_reported() {
        let network = MemoryNetwork::new();
        let (a, b) = (identity(1), identity(2));
        let map = two_peer_map(&a, &b);

        let node_a = start(&network, a.clone(), &map, options());
        tokio::time::sleep(Duration::from_millis(20)).await;
        network.disconnect(a.label());

        let result = tokio::time::timeout(WAIT, node_a.task).await.unwrap().unwrap();
        assert!(matches!(result, Err(RelayError::SessionLost { .. })));
    }

    #[tokio::test]
    async fn test_revoke_after_shutdown_fails() {
        let network = MemoryNetwork::new();
        let (a, b) = (identity(1), identity(2));
        let map = two_peer_map(&a, &b);

        let node_a = start(&network, a, &map, options());
        node_a.handle.revoke(b.label().clone()).await.unwrap();
        node_a.handle.shutdown();
        assert!(node_a.task.await.unwrap().is_ok());

        let err = node_a.handle.revoke(b.label().clone()).await.unwrap_err();
        assert!(matches!(err, RelayError::ShuttingDown));
    }
}
