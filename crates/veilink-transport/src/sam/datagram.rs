// ============================================
// File: crates/veilink-transport/src/sam/datagram.rs
// ============================================
//! # Datagram Sessions
//!
//! ## Creation Reason
//! The relay exchanges link frames as repliable datagrams. A datagram
//! session carries them over its own persistent control socket: each
//! datagram is a header line followed by exactly `SIZE` payload bytes.
//!
//! ## Main Functionality
//! - `DatagramSession::send_to()`: `DATAGRAM SEND` with payload
//! - `DatagramSession::receive_from()`: next `DATAGRAM RECEIVED`, with
//!   the sender's identity
//! - `DatagramSession::lookup()`: `NAMING LOOKUP` on the session socket
//! - Answers router `PING` lines with `PONG`
//! - Implements `DatagramTransport` and `NameResolver`
//!
//! ## Session Socket
//! ```text
//!              ┌──────────────┐  datagrams  ┌──────────────┐
//!   socket ───►│  read pump   │────────────►│ receive_from │
//!              │  (one task)  │             └──────────────┘
//!              │              │ NAMING REPLY ┌─────────────┐
//!              │              │─────────────►│ lookup(NAME)│
//!              └──────────────┘  PONG        └─────────────┘
//! ```
//!
//! ## Framing
//! ```text
//! DATAGRAM SEND DESTINATION=<b64> SIZE=<n>\n<n bytes>          (out)
//! DATAGRAM RECEIVED DESTINATION=<b64> SIZE=<n>\n<n bytes>      (in)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Only the pump reads the socket. Writes go through one mutex so
//!   header and payload are never interleaved
//! - The pump waits when the inbox is full; naming replies queued
//!   behind undrained datagrams wait with it
//! - Any receive error other than `SessionClosed` means the framing is
//!   lost and the session must be recreated
//!
//! ## Last Modified
//! v0.1.0 - Initial datagram session
//! v0.1.1 - Single read pump; lookups matched by name and bounded

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::{debug, info, trace, warn};

use veilink_common::types::SessionName;
use veilink_core::identity::{Identity, Keypair};

use super::client::{read_line_from, ControlConnection};
use super::reply::ControlReply;
use super::stream::wait_closed;
use super::{MAX_DATAGRAM_SIZE, SELF_NAME};
use crate::error::{Result, TransportError};
use crate::traits::{DatagramTransport, NameResolver};

/// Datagrams buffered between the pump and `receive_from`.
const INBOX_CAPACITY: usize = 64;

type Received = Result<(Vec<u8>, Identity)>;

/// One unit read from the session socket.
enum Inbound {
    Datagram(Vec<u8>, Identity),
    Reply(ControlReply),
}

/// A `NAMING LOOKUP` waiting for its reply.
struct PendingLookup {
    name: String,
    reply: oneshot::Sender<ControlReply>,
}

type PendingLookups = Arc<parking_lot::Mutex<VecDeque<PendingLookup>>>;

// ============================================
// DatagramSession
// ============================================

/// A named datagram session bound to one persistent control socket.
pub struct DatagramSession {
    name: SessionName,
    keypair: Keypair,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    inbox: Mutex<mpsc::Receiver<Received>>,
    lookups: PendingLookups,
    reply_timeout: Duration,
    closed: watch::Sender<bool>,
}

impl DatagramSession {
    /// Takes over the session socket and starts its read pump.
    pub(crate) fn new(name: SessionName, keypair: Keypair, control: ControlConnection) -> Self {
        let reply_timeout = control.reply_timeout();
        let (reader, writer) = control.into_parts();
        let (closed, _) = watch::channel(false);
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        let writer = Arc::new(Mutex::new(writer));
        let lookups = PendingLookups::default();

        tokio::spawn(pump(
            reader,
            Arc::clone(&writer),
            inbox_tx,
            Arc::clone(&lookups),
            closed.subscribe(),
        ));

        Self {
            name,
            keypair,
            writer,
            inbox: Mutex::new(inbox_rx),
            lookups,
            reply_timeout,
            closed,
        }
    }

    /// Session id.
    #[must_use]
    pub fn name(&self) -> &SessionName {
        &self.name
    }

    /// Our destination.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        self.keypair.identity()
    }

    /// Returns `true` once `close()` has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(TransportError::SessionClosed)
        } else {
            Ok(())
        }
    }

    /// Error for a pump that has gone away.
    fn pump_gone(&self, context: &str) -> TransportError {
        if self.is_closed() {
            TransportError::SessionClosed
        } else {
            TransportError::connection_closed(context)
        }
    }

    /// Sends one datagram.
    ///
    /// # Errors
    /// Returns `DatagramTooLarge` above 31 744 bytes, `SessionClosed`, or
    /// a socket error.
    pub async fn send_to(&self, dest: &Identity, payload: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if payload.len() > MAX_DATAGRAM_SIZE {
            return Err(TransportError::DatagramTooLarge {
                size: payload.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }

        let header = format!(
            "DATAGRAM SEND DESTINATION={} SIZE={}\n",
            dest.to_base64(),
            payload.len()
        );
        let mut message = Vec::with_capacity(header.len() + payload.len());
        message.extend_from_slice(header.as_bytes());
        message.extend_from_slice(payload);

        write_to(&self.writer, &message).await?;
        trace!(peer = %dest.label(), size = payload.len(), "Datagram sent");
        Ok(())
    }

    /// Waits for the next datagram.
    ///
    /// # Errors
    /// Returns `SessionClosed` when the session is closed; any other
    /// error means the session is lost.
    pub async fn receive_from(&self) -> Result<(Vec<u8>, Identity)> {
        self.ensure_open()?;
        let mut closed = self.closed.subscribe();
        let mut inbox = self.inbox.lock().await;

        tokio::select! {
            received = inbox.recv() => match received {
                Some(result) => result,
                None => Err(self.pump_gone("datagram receive")),
            },
            () = wait_closed(&mut closed) => Err(TransportError::SessionClosed),
        }
    }

    /// Resolves a name. `"ME"` and long-form destinations are answered
    /// locally.
    ///
    /// The reply arrives on the session socket and is matched to this
    /// call by its `NAME=` token, so concurrent lookups don't mix.
    ///
    /// # Errors
    /// Returns `SessionClosed`, `Timeout` after the reply timeout, or the
    /// router's rejection.
    pub async fn lookup(&self, name: &str) -> Result<Identity> {
        self.ensure_open()?;
        if name == SELF_NAME {
            return Ok(self.identity().clone());
        }
        if Identity::is_long_form(name) {
            return Ok(Identity::from_base64(name)?);
        }

        let (tx, rx) = oneshot::channel();
        self.lookups.lock().push_back(PendingLookup {
            name: name.to_string(),
            reply: tx,
        });

        let command = format!("NAMING LOOKUP NAME={name}\n");
        if let Err(e) = write_to(&self.writer, command.as_bytes()).await {
            drop(rx);
            prune_abandoned(&self.lookups);
            return Err(e);
        }

        let reply = match tokio::time::timeout(self.reply_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(self.pump_gone("lookup")),
            Err(_) => {
                prune_abandoned(&self.lookups);
                return Err(TransportError::timeout(format!("NAMING LOOKUP NAME={name}")));
            }
        };

        let reply = reply.check_result()?;
        Identity::from_base64(reply.require("VALUE")?)
            .map_err(|e| TransportError::malformed(format!("NAMING REPLY value: {e}")))
    }

    /// Closes the session, unblocking pending receives and lookups.
    /// Idempotent.
    ///
    /// # Errors
    /// Never fails today; shutdown errors on the socket are ignored.
    pub async fn close(&self) -> Result<()> {
        if self.closed.send_replace(true) {
            return Ok(());
        }
        if let Err(e) = self.writer.lock().await.shutdown().await {
            debug!(error = %e, "Datagram socket shutdown failed");
        }
        info!(session = %self.name, "Datagram session closed");
        Ok(())
    }
}

impl Drop for DatagramSession {
    fn drop(&mut self) {
        // Stops the pump
        self.closed.send_replace(true);
    }
}

impl fmt::Debug for DatagramSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatagramSession")
            .field("name", &self.name)
            .field("identity", self.identity())
            .field("closed", &self.is_closed())
            .field("pending_lookups", &self.lookups.lock().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DatagramTransport for DatagramSession {
    async fn send_to(&self, dest: &Identity, payload: &[u8]) -> Result<()> {
        Self::send_to(self, dest, payload).await
    }

    async fn receive_from(&self) -> Result<(Vec<u8>, Identity)> {
        Self::receive_from(self).await
    }

    fn local_identity(&self) -> &Identity {
        self.identity()
    }

    async fn close(&self) -> Result<()> {
        Self::close(self).await
    }
}

#[async_trait]
impl NameResolver for DatagramSession {
    async fn lookup(&self, name: &str) -> Result<Identity> {
        Self::lookup(self, name).await
    }
}

// ============================================
// Read pump
// ============================================

/// Sole reader of the session socket. Runs until the session closes or
/// the socket fails; a failure is handed to the next `receive_from`.
async fn pump(
    mut reader: BufReader<OwnedReadHalf>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    inbox: mpsc::Sender<Received>,
    lookups: PendingLookups,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            () = wait_closed(&mut closed) => break,
            event = next_event(&mut reader, &writer) => event,
        };

        let item = match event {
            Ok(Inbound::Reply(reply)) => {
                route_reply(&lookups, reply);
                continue;
            }
            Ok(Inbound::Datagram(payload, sender)) => Ok((payload, sender)),
            Err(e) => {
                warn!(error = %e, "Datagram session socket failed");
                Err(e)
            }
        };
        let failed = item.is_err();

        tokio::select! {
            () = wait_closed(&mut closed) => break,
            sent = inbox.send(item) => {
                if sent.is_err() || failed {
                    break;
                }
            }
        }
    }

    // Pending lookups see their sender dropped
    lookups.lock().clear();
    debug!("Datagram pump exiting");
}

/// Reads the next datagram or reply line, answering pings on the way.
async fn next_event(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &Mutex<OwnedWriteHalf>,
) -> Result<Inbound> {
    loop {
        let line = read_line_from(reader, "datagram receive").await?;

        if let Some(rest) = line.strip_prefix("PING") {
            if rest.is_empty() || rest.starts_with(' ') {
                write_to(writer, format!("PONG{rest}\n").as_bytes()).await?;
                trace!("Answered router ping");
                continue;
            }
        }

        let reply = ControlReply::parse(&line)?;
        if !reply.is("DATAGRAM", "RECEIVED") {
            return Ok(Inbound::Reply(reply));
        }

        let size: usize = reply
            .require("SIZE")?
            .parse()
            .map_err(|_| TransportError::malformed("DATAGRAM RECEIVED SIZE is not a number"))?;
        if size > MAX_DATAGRAM_SIZE {
            return Err(TransportError::malformed(format!(
                "DATAGRAM RECEIVED SIZE={size} exceeds {MAX_DATAGRAM_SIZE}"
            )));
        }

        let mut payload = vec![0u8; size];
        reader
            .read_exact(&mut payload)
            .await
            .map_err(|e| TransportError::from_socket("datagram payload", e))?;

        let sender = Identity::from_base64(reply.require("DESTINATION")?)
            .map_err(|e| TransportError::malformed(format!("datagram sender: {e}")))?;

        trace!(peer = %sender.label(), size, "Datagram received");
        return Ok(Inbound::Datagram(payload, sender));
    }
}

/// Hands a `NAMING REPLY` to the lookup for its `NAME=`. A reply without
/// a name goes to the oldest lookup.
fn route_reply(lookups: &PendingLookups, reply: ControlReply) {
    if reply.is("NAMING", "REPLY") {
        let mut pending = lookups.lock();
        pending.retain(|lookup| !lookup.reply.is_closed());
        let position = match reply.get("NAME") {
            Some(name) => pending.iter().position(|lookup| lookup.name == name),
            None => (!pending.is_empty()).then_some(0),
        };
        if let Some(lookup) = position.and_then(|i| pending.remove(i)) {
            let _ = lookup.reply.send(reply);
            return;
        }
    }
    debug!(
        topic = reply.topic(),
        kind = reply.kind(),
        "Ignoring unsolicited reply on datagram session"
    );
}

/// Forgets lookups whose caller stopped waiting.
fn prune_abandoned(lookups: &PendingLookups) {
    lookups.lock().retain(|lookup| !lookup.reply.is_closed());
}

async fn write_to(writer: &Mutex<OwnedWriteHalf>, bytes: &[u8]) -> Result<()> {
    let mut writer = writer.lock().await;
    writer
        .write_all(bytes)
        .await
        .map_err(|e| TransportError::from_socket("datagram send", e))
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::sam::client::ControlClient;
    use crate::sam::reply::ControlFailure;
    use crate::sam::testing::{test_keypair, FakeRouter, Response};
    use crate::sam::SessionOptions;

    async fn session_on(router: &FakeRouter) -> DatagramSession {
        ControlClient::new(router.config())
            .create_datagram_session(
                SessionName::new("dgrams").unwrap(),
                test_keypair(1),
                &SessionOptions::new(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_send_to_frames_payload() {
        let router = FakeRouter::spawn(|line| {
            if line.starts_with("SESSION CREATE") {
                vec![Response::line("SESSION STATUS RESULT=OK DESTINATION=x")]
            } else {
                vec![]
            }
        })
        .await;
        let session = session_on(&router).await;
        let peer = test_keypair(2).identity().clone();

        session.send_to(&peer, b"frame-1").await.unwrap();
        session.send_to(&peer, b"frame-2").await.unwrap();

        // Let the router drain the socket
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(router.payloads(), vec![b"frame-1".to_vec(), b"frame-2".to_vec()]);
        assert!(router.requests().contains(&format!(
            "DATAGRAM SEND DESTINATION={} SIZE=7",
            peer.to_base64()
        )));
    }

    #[tokio::test]
    async fn test_send_too_large() {
        let router = FakeRouter::spawn(|line| {
            if line.starts_with("SESSION CREATE") {
                vec![Response::line("SESSION STATUS RESULT=OK DESTINATION=x")]
            } else {
                vec![]
            }
        })
        .await;
        let session = session_on(&router).await;
        let peer = test_keypair(2).identity().clone();

        let err = session
            .send_to(&peer, &vec![0u8; MAX_DATAGRAM_SIZE + 1])
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::DatagramTooLarge { .. }));
        assert!(session.send_to(&peer, &vec![0u8; MAX_DATAGRAM_SIZE]).await.is_ok());
    }

    #[tokio::test]
    async fn test_receive_with_ping_interleaved() {
        let sender = test_keypair(5).identity().clone();
        let mut inbound = b"PING 1234\n".to_vec();
        inbound.extend_from_slice(
            format!("DATAGRAM RECEIVED DESTINATION={} SIZE=5\nhello", sender.to_base64())
                .as_bytes(),
        );

        let router = FakeRouter::spawn(move |line| {
            if line.starts_with("SESSION CREATE") {
                vec![
                    Response::line("SESSION STATUS RESULT=OK DESTINATION=x"),
                    Response::Bytes(inbound.clone()),
                ]
            } else {
                vec![]
            }
        })
        .await;
        let session = session_on(&router).await;

        let (payload, from) = session.receive_from().await.unwrap();
        assert_eq!(payload, b"hello");
        assert_eq!(from, sender);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(router.requests().contains(&"PONG 1234".to_string()));
    }

    #[tokio::test]
    async fn test_receive_connection_lost() {
        let router = FakeRouter::spawn(|line| {
            if line.starts_with("SESSION CREATE") {
                vec![
                    Response::line("SESSION STATUS RESULT=OK DESTINATION=x"),
                    Response::Delay(Duration::from_millis(50)),
                    Response::Close,
                ]
            } else {
                vec![]
            }
        })
        .await;
        let session = session_on(&router).await;

        let err = session.receive_from().await.unwrap_err();
        assert!(err.is_session_fatal());
        assert!(!matches!(err, TransportError::SessionClosed));
    }

    #[tokio::test]
    async fn test_close_unblocks_receive() {
        let router = FakeRouter::spawn(|line| {
            if line.starts_with("SESSION CREATE") {
                vec![Response::line("SESSION STATUS RESULT=OK DESTINATION=x")]
            } else {
                vec![]
            }
        })
        .await;
        let session = Arc::new(session_on(&router).await);

        let receiver = Arc::clone(&session);
        let pending = tokio::spawn(async move { receiver.receive_from().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        session.close().await.unwrap();
        session.close().await.unwrap();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(TransportError::SessionClosed)));
        assert!(matches!(
            session.send_to(&test_keypair(2).identity().clone(), b"x").await,
            Err(TransportError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_lookup_on_session_socket() {
        let known = test_keypair(8).identity().clone();
        let value = known.to_base64().to_string();
        let router = FakeRouter::spawn(move |line| {
            if line.starts_with("SESSION CREATE") {
                vec![Response::line("SESSION STATUS RESULT=OK DESTINATION=x")]
            } else if line == "NAMING LOOKUP NAME=peer.i2p" {
                vec![Response::line(format!(
                    "NAMING REPLY RESULT=OK NAME=peer.i2p VALUE={value}"
                ))]
            } else if line.starts_with("NAMING LOOKUP") {
                vec![Response::line("NAMING REPLY RESULT=KEY_NOT_FOUND")]
            } else {
                vec![]
            }
        })
        .await;
        let session = session_on(&router).await;

        assert_eq!(session.lookup("peer.i2p").await.unwrap(), known);
        assert_eq!(&session.lookup(SELF_NAME).await.unwrap(), session.identity());
        assert!(matches!(
            session.lookup("gone.i2p").await,
            Err(TransportError::Rejected {
                failure: ControlFailure::KeyNotFound,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_overlapping_lookups_get_their_own_replies() {
        let first = test_keypair(8).identity().clone();
        let second = test_keypair(9).identity().clone();
        let (a, b) = (first.to_base64().to_string(), second.to_base64().to_string());
        let router = FakeRouter::spawn(move |line| {
            if line.starts_with("SESSION CREATE") {
                vec![Response::line("SESSION STATUS RESULT=OK DESTINATION=x")]
            } else if line == "NAMING LOOKUP NAME=a.i2p" {
                vec![
                    Response::Delay(Duration::from_millis(200)),
                    Response::line(format!("NAMING REPLY RESULT=OK NAME=a.i2p VALUE={a}")),
                ]
            } else if line == "NAMING LOOKUP NAME=b.i2p" {
                vec![Response::line(format!("NAMING REPLY RESULT=OK NAME=b.i2p VALUE={b}"))]
            } else {
                vec![]
            }
        })
        .await;
        let session = Arc::new(session_on(&router).await);

        let resolver = Arc::clone(&session);
        let slow = tokio::spawn(async move { resolver.lookup("a.i2p").await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let fast = session.lookup("b.i2p").await.unwrap();

        assert_eq!(slow.await.unwrap().unwrap(), first);
        assert_eq!(fast, second);
    }

    #[tokio::test]
    async fn test_datagram_before_naming_reply_is_kept() {
        let sender = test_keypair(5).identity().clone();
        let known = test_keypair(8).identity().clone();
        let mut inbound =
            format!("DATAGRAM RECEIVED DESTINATION={} SIZE=5\nhello", sender.to_base64())
                .into_bytes();
        inbound.extend_from_slice(
            format!("NAMING REPLY RESULT=OK NAME=peer.i2p VALUE={}\n", known.to_base64())
                .as_bytes(),
        );

        let router = FakeRouter::spawn(move |line| {
            if line.starts_with("SESSION CREATE") {
                vec![Response::line("SESSION STATUS RESULT=OK DESTINATION=x")]
            } else if line.starts_with("NAMING LOOKUP") {
                vec![Response::Bytes(inbound.clone())]
            } else {
                vec![]
            }
        })
        .await;
        let session = session_on(&router).await;

        assert_eq!(session.lookup("peer.i2p").await.unwrap(), known);

        let (payload, from) = tokio::time::timeout(Duration::from_secs(1), session.receive_from())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload, b"hello");
        assert_eq!(from, sender);
    }

    #[tokio::test]
    async fn test_lookup_times_out_without_reply() {
        let router = FakeRouter::spawn(|line| {
            if line.starts_with("SESSION CREATE") {
                vec![Response::line("SESSION STATUS RESULT=OK DESTINATION=x")]
            } else {
                vec![]
            }
        })
        .await;
        let session = ControlClient::new(
            router.config().with_reply_timeout(Duration::from_millis(100)),
        )
        .create_datagram_session(
            SessionName::new("dgrams").unwrap(),
            test_keypair(1),
            &SessionOptions::new(),
        )
        .await
        .unwrap();

        let err = session.lookup("silent.i2p").await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
        assert!(session.lookups.lock().is_empty());
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn test_close_fails_pending_lookup() {
        let router = FakeRouter::spawn(|line| {
            if line.starts_with("SESSION CREATE") {
                vec![Response::line("SESSION STATUS RESULT=OK DESTINATION=x")]
            } else {
                vec![]
            }
        })
        .await;
        let session = Arc::new(session_on(&router).await);

        let resolver = Arc::clone(&session);
        let pending = tokio::spawn(async move { resolver.lookup("slow.i2p").await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.close().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), pending).await.unwrap();
        assert!(matches!(result.unwrap(), Err(TransportError::SessionClosed)));
    }
}
