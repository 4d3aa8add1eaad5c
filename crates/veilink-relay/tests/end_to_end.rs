// ============================================
// File: crates/veilink-relay/tests/end_to_end.rs
// ============================================
//! Relay scenarios over the in-memory network.
//!
//! One peer runs a full `Relay`; the other is a bare endpoint that
//! speaks link frames directly, so replies can be checked on the wire.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use veilink_common::TunnelId;
use veilink_core::protocol::messages::{PARAM_CIDR, PARAM_REMOVED, PARAM_TUNNEL_ID};
use veilink_core::{Identity, LinkFrame, Method};
use veilink_relay::services::{AddressMap, AddressMapPolicy};
use veilink_relay::{Relay, RelayHandle, RelayOptions, Result};
use veilink_transport::{
    DatagramTransport, Device, DeviceConfig, MemoryEndpoint, MemoryNetwork, MockDevice,
    NameResolver,
};

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(200);

// ============================================
// Fixtures
// ============================================

fn identity(seed: u8) -> Identity {
    Identity::from_bytes(vec![seed; 387]).unwrap()
}

fn ipv4_packet(src: Ipv4Addr, dst: Ipv4Addr, payload: &[u8]) -> Vec<u8> {
    let total = u16::try_from(20 + payload.len()).unwrap();
    let mut bytes = vec![0x45, 0, 0, 0, 0, 0, 0, 0, 64, 17, 0, 0];
    bytes[2..4].copy_from_slice(&total.to_be_bytes());
    bytes.extend_from_slice(&src.octets());
    bytes.extend_from_slice(&dst.octets());
    bytes.extend_from_slice(payload);
    bytes
}

/// Peer `a` is driven by hand, peer `b` runs a relay.
struct Scenario {
    a: MemoryEndpoint,
    b: Identity,
    device: Arc<MockDevice>,
    handle: RelayHandle,
    task: tokio::task::JoinHandle<Result<()>>,
}

impl Scenario {
    fn start() -> (Arc<MemoryNetwork>, Self) {
        let network = MemoryNetwork::new();
        let (a, b) = (identity(1), identity(2));
        let map = Arc::new(AddressMap::from_entries([
            (a.label().clone(), "10.0.0.0/24".parse().unwrap()),
            (b.label().clone(), "10.0.0.1/32".parse().unwrap()),
        ]));

        let endpoint = Arc::new(network.endpoint(b.clone()));
        let device = Arc::new(MockDevice::new(DeviceConfig::default()));
        let (relay, handle) = Relay::new(
            RelayOptions::default(),
            Arc::clone(&map),
            Arc::clone(&device) as Arc<dyn Device>,
            Arc::clone(&endpoint) as Arc<dyn DatagramTransport>,
            endpoint as Arc<dyn NameResolver>,
            Arc::new(AddressMapPolicy::new(map)),
        );

        let scenario = Self {
            a: network.endpoint(a),
            b,
            device,
            handle,
            task: tokio::spawn(relay.run()),
        };
        (network, scenario)
    }

    async fn send(&self, frame: &LinkFrame) {
        self.a.send_to(&self.b, &frame.encode()).await.unwrap();
    }

    async fn recv(&self) -> LinkFrame {
        let (payload, sender) = tokio::time::timeout(WAIT, self.a.receive_from())
            .await
            .expect("no frame from relay")
            .unwrap();
        assert_eq!(sender.label(), self.b.label());
        LinkFrame::decode(&payload).unwrap()
    }

    async fn assert_silent(&self) {
        assert!(tokio::time::timeout(QUIET, self.a.receive_from()).await.is_err());
    }

    async fn request(&self, cidr: &str) -> LinkFrame {
        self.send(&LinkFrame::tunnel_request(cidr)).await;
        let reply = self.recv().await;
        assert_eq!(reply.method, Method::ClientTunNew);
        reply
    }

    async fn stop(self) {
        self.handle.shutdown();
        assert!(self.task.await.unwrap().is_ok());
    }
}

// ============================================
// Scenarios
// ============================================

#[tokio::test]
async fn test_granted_tunnel_delivers_packets() {
    let (_network, s) = Scenario::start();

    let reply = s.request("10.0.0.0/24").await;
    assert_eq!(reply.response, Some(1));
    assert_eq!(reply.get_param_int(PARAM_TUNNEL_ID).unwrap(), 1);
    assert_eq!(reply.get_param_str(PARAM_CIDR).unwrap(), "10.0.0.0/24");

    let packet = ipv4_packet(Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(10, 0, 0, 1), b"hello");
    s.send(&LinkFrame::relay_data(TunnelId::FIRST, &[packet.clone()]).unwrap())
        .await;
    assert_eq!(s.device.wait_written(1, WAIT).await, vec![packet]);

    s.stop().await;
}

#[tokio::test]
async fn test_repeated_request_returns_same_id() {
    let (_network, s) = Scenario::start();

    assert_eq!(s.request("10.0.0.0/24").await.response, Some(1));
    assert_eq!(s.request("10.0.0.0/24").await.response, Some(1));
    assert_eq!(s.request("10.0.0.128/25").await.response, Some(2));

    s.stop().await;
}

#[tokio::test]
async fn test_request_outside_own_ranges_refused() {
    let (_network, s) = Scenario::start();

    let reply = s.request("10.1.0.0/16").await;
    assert_eq!(reply.response, Some(0));
    assert_eq!(reply.get_param_str(PARAM_CIDR).unwrap(), "10.1.0.0/16");

    let reply = s.request("not-a-cidr").await;
    assert_eq!(reply.response, Some(0));

    s.stop().await;
}

#[tokio::test]
async fn test_packets_outside_tunnel_dropped() {
    let (_network, s) = Scenario::start();
    s.request("10.0.0.0/25").await;

    // Source outside the granted range
    let outside = ipv4_packet(Ipv4Addr::new(10, 0, 0, 200), Ipv4Addr::new(10, 0, 0, 1), b"");
    // Unknown tunnel id
    let unknown = ipv4_packet(Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(10, 0, 0, 1), b"");
    let inside = ipv4_packet(Ipv4Addr::new(10, 0, 0, 6), Ipv4Addr::new(10, 0, 0, 1), b"");

    s.send(&LinkFrame::relay_data(TunnelId::FIRST, &[outside]).unwrap()).await;
    s.send(&LinkFrame::relay_data(TunnelId::from_raw(9), &[unknown]).unwrap()).await;
    s.send(&LinkFrame::relay_data(TunnelId::FIRST, &[inside.clone()]).unwrap()).await;

    assert_eq!(s.device.wait_written(1, WAIT).await, vec![inside]);
    tokio::time::sleep(QUIET).await;
    assert!(s.device.take_written_packets().is_empty());

    s.stop().await;
}

#[tokio::test]
async fn test_tunnel_delete_reply_and_effect() {
    let (_network, s) = Scenario::start();
    s.request("10.0.0.0/24").await;

    s.send(&LinkFrame::tunnel_delete(TunnelId::FIRST)).await;
    let reply = s.recv().await;
    assert_eq!(reply.method, Method::ClientTunDel);
    assert_eq!(reply.response, Some(1));
    assert_eq!(reply.get_param_int(PARAM_REMOVED).unwrap(), 1);

    // Deleting again is a no-op
    s.send(&LinkFrame::tunnel_delete(TunnelId::FIRST)).await;
    assert_eq!(s.recv().await.get_param_int(PARAM_REMOVED).unwrap(), 0);

    let packet = ipv4_packet(Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(10, 0, 0, 1), b"");
    s.send(&LinkFrame::relay_data(TunnelId::FIRST, &[packet]).unwrap()).await;
    tokio::time::sleep(QUIET).await;
    assert_eq!(s.device.written_count(), 0);

    // Ids are never reused
    assert_eq!(s.request("10.0.0.0/24").await.response, Some(2));

    s.stop().await;
}

#[tokio::test]
async fn test_revoke_sends_bai() {
    let (_network, s) = Scenario::start();
    s.request("10.0.0.0/24").await;

    s.handle.revoke(s.a.local_identity().label().clone()).await.unwrap();
    let bai = s.recv().await;
    assert_eq!(bai.method, Method::ServerTunBai);
    assert_eq!(bai.tunnel_id().unwrap(), TunnelId::FIRST);

    s.stop().await;
}

#[tokio::test]
async fn test_shutdown_sends_bai() {
    let (_network, s) = Scenario::start();
    s.request("10.0.0.0/24").await;

    s.handle.shutdown();
    let bai = s.recv().await;
    assert_eq!(bai.method, Method::ServerTunBai);
    assert!(s.task.await.unwrap().is_ok());
    assert!(s.device.is_closed());
}

#[tokio::test]
async fn test_unknown_peer_ignored() {
    let (network, s) = Scenario::start();
    let stranger = network.endpoint(identity(3));

    stranger
        .send_to(&s.b, &LinkFrame::tunnel_request("10.0.0.0/24").encode())
        .await
        .unwrap();
    assert!(tokio::time::timeout(QUIET, stranger.receive_from()).await.is_err());

    s.assert_silent().await;
    s.stop().await;
}

#[tokio::test]
async fn test_ping_gets_no_reply() {
    let (_network, s) = Scenario::start();

    s.send(&LinkFrame::ping(1)).await;
    s.assert_silent().await;

    s.stop().await;
}
