// ============================================
// File: crates/veilink-transport/src/memory.rs
// ============================================
//! # In-Memory Network
//!
//! ## Creation Reason
//! Relay tests need two or more peers exchanging datagrams and resolving
//! each other's names without a router. `MemoryNetwork` is a shared
//! switchboard; each `MemoryEndpoint` on it implements
//! `DatagramTransport` and `NameResolver` like a datagram session does.
//!
//! ## Main Functionality
//! - Addressed delivery between endpoints, keyed by label
//! - Name registry plus label and long-form resolution
//! - `disconnect()` to simulate losing a session's control socket
//! - Optional lookup delay and lookup counter
//!
//! ## ⚠️ Important Note for Next Developer
//! - Delivery is lossy like the real thing: unknown destinations and
//!   full inboxes drop silently
//!
//! ## Last Modified
//! v0.1.0 - Initial in-memory network

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::trace;

use veilink_core::identity::{Identity, Label};

use crate::error::{Result, TransportError};
use crate::sam::reply::ControlFailure;
use crate::sam::stream::wait_closed;
use crate::sam::{MAX_DATAGRAM_SIZE, SELF_NAME};
use crate::traits::{DatagramTransport, NameResolver};

// ============================================
// Constants
// ============================================

/// Datagrams buffered per endpoint before new ones are dropped.
const INBOX_CAPACITY: usize = 1024;

type Inbox = mpsc::Sender<(Vec<u8>, Identity)>;

// ============================================
// MemoryNetwork
// ============================================

/// Shared switchboard connecting `MemoryEndpoint`s.
#[derive(Default)]
pub struct MemoryNetwork {
    endpoints: Mutex<HashMap<Label, (Identity, Inbox)>>,
    names: Mutex<HashMap<String, Identity>>,
    lookup_delay: Mutex<Option<Duration>>,
    lookups: AtomicUsize,
}

impl MemoryNetwork {
    /// Creates an empty network.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attaches an endpoint for `identity`, replacing any earlier one.
    #[must_use]
    pub fn endpoint(self: &Arc<Self>, identity: Identity) -> MemoryEndpoint {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        self.endpoints
            .lock()
            .insert(identity.label().clone(), (identity.clone(), tx));

        let (closed, _) = watch::channel(false);
        MemoryEndpoint {
            identity,
            network: Arc::clone(self),
            inbox: tokio::sync::Mutex::new(rx),
            closed,
        }
    }

    /// Registers a human-readable name for `identity`.
    pub fn register_name(&self, name: impl Into<String>, identity: Identity) {
        self.names.lock().insert(name.into(), identity);
    }

    /// Detaches an endpoint; its pending receive fails with
    /// `ConnectionClosed`.
    pub fn disconnect(&self, label: &Label) {
        self.endpoints.lock().remove(label);
    }

    /// Delays every lookup by `delay`.
    pub fn set_lookup_delay(&self, delay: Duration) {
        *self.lookup_delay.lock() = Some(delay);
    }

    /// Number of lookups served so far.
    #[must_use]
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    fn deliver(&self, from: &Identity, to: &Identity, payload: &[u8]) {
        let inbox = self
            .endpoints
            .lock()
            .get(to.label())
            .map(|(_, inbox)| inbox.clone());

        match inbox {
            Some(inbox) => {
                if inbox.try_send((payload.to_vec(), from.clone())).is_err() {
                    trace!(peer = %to.label(), "Memory inbox full, datagram dropped");
                }
            }
            None => trace!(peer = %to.label(), "No such endpoint, datagram dropped"),
        }
    }

    async fn resolve(&self, name: &str) -> Result<Identity> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let delay = *self.lookup_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if Identity::is_long_form(name) {
            return Ok(Identity::from_base64(name)?);
        }
        if let Some(identity) = self.names.lock().get(name) {
            return Ok(identity.clone());
        }
        if let Ok(label) = Label::parse(name) {
            if let Some((identity, _)) = self.endpoints.lock().get(&label) {
                return Ok(identity.clone());
            }
        }
        Err(TransportError::rejected(
            "NAMING",
            ControlFailure::KeyNotFound,
            None,
        ))
    }
}

impl std::fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryNetwork")
            .field("endpoints", &self.endpoints.lock().len())
            .field("names", &self.names.lock().len())
            .finish_non_exhaustive()
    }
}

// ============================================
// MemoryEndpoint
// ============================================

/// One identity attached to a `MemoryNetwork`.
pub struct MemoryEndpoint {
    identity: Identity,
    network: Arc<MemoryNetwork>,
    inbox: tokio::sync::Mutex<mpsc::Receiver<(Vec<u8>, Identity)>>,
    closed: watch::Sender<bool>,
}

impl MemoryEndpoint {
    fn ensure_open(&self) -> Result<()> {
        if *self.closed.borrow() {
            Err(TransportError::SessionClosed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DatagramTransport for MemoryEndpoint {
    async fn send_to(&self, dest: &Identity, payload: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if payload.len() > MAX_DATAGRAM_SIZE {
            return Err(TransportError::DatagramTooLarge {
                size: payload.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }
        self.network.deliver(&self.identity, dest, payload);
        Ok(())
    }

    async fn receive_from(&self) -> Result<(Vec<u8>, Identity)> {
        self.ensure_open()?;
        let mut closed = self.closed.subscribe();
        let mut inbox = self.inbox.lock().await;

        tokio::select! {
            received = inbox.recv() => {
                received.ok_or_else(|| TransportError::connection_closed("memory receive"))
            }
            () = wait_closed(&mut closed) => Err(TransportError::SessionClosed),
        }
    }

    fn local_identity(&self) -> &Identity {
        &self.identity
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.send_replace(true) {
            self.network.disconnect(self.identity.label());
        }
        Ok(())
    }
}

#[async_trait]
impl NameResolver for MemoryEndpoint {
    async fn lookup(&self, name: &str) -> Result<Identity> {
        if name == SELF_NAME {
            return Ok(self.identity.clone());
        }
        self.network.resolve(name).await
    }
}

impl std::fmt::Debug for MemoryEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEndpoint")
            .field("identity", &self.identity)
            .field("closed", &*self.closed.borrow())
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(seed: u8) -> Identity {
        Identity::from_bytes(vec![seed; 387]).unwrap()
    }

    #[tokio::test]
    async fn test_exchange_between_endpoints() {
        let network = MemoryNetwork::new();
        let a = network.endpoint(identity(1));
        let b = network.endpoint(identity(2));

        a.send_to(b.local_identity(), b"ping").await.unwrap();
        let (payload, from) = b.receive_from().await.unwrap();

        assert_eq!(payload, b"ping");
        assert_eq!(&from, a.local_identity());
    }

    #[tokio::test]
    async fn test_resolution() {
        let network = MemoryNetwork::new();
        let a = network.endpoint(identity(1));
        let b = network.endpoint(identity(2));
        network.register_name("b.i2p", b.local_identity().clone());

        assert_eq!(&a.lookup("b.i2p").await.unwrap(), b.local_identity());
        assert_eq!(
            &a.lookup(b.local_identity().label().as_str()).await.unwrap(),
            b.local_identity()
        );
        assert_eq!(&a.lookup(SELF_NAME).await.unwrap(), a.local_identity());
        assert!(a.lookup("nobody.i2p").await.unwrap_err().is_network_error());
        assert_eq!(network.lookup_count(), 3);
    }

    #[tokio::test]
    async fn test_disconnect_is_fatal() {
        let network = MemoryNetwork::new();
        let a = network.endpoint(identity(1));

        network.disconnect(a.local_identity().label());
        let err = a.receive_from().await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed { .. }));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let network = MemoryNetwork::new();
        let a = network.endpoint(identity(1));

        a.close().await.unwrap();
        a.close().await.unwrap();
        assert!(matches!(
            a.receive_from().await,
            Err(TransportError::SessionClosed)
        ));
    }
}
