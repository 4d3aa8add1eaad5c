// ============================================
// File: crates/veilink-transport/src/sam/stream.rs
// ============================================
//! # Stream Sessions
//!
//! ## Creation Reason
//! A stream session is a named destination that can dial out to other
//! destinations and accept inbound connections. Each dial or accept runs
//! on its own fresh control socket, which becomes the data pipe once the
//! router says `RESULT=OK`.
//!
//! ## Main Functionality
//! - `StreamSession`: dial / listen / lookup / close
//! - `StreamListener`: accept loop, cancelled when the session closes
//! - `StreamConnection`: full-duplex byte stream (`AsyncRead + AsyncWrite`)
//!
//! ## Accept Flow
//! ```text
//! ── STREAM ACCEPT ID=<id> SILENT=false ──►
//! ◄─ STREAM STATUS RESULT=OK ─────────────
//!            ... waits for a peer ...
//! ◄─ <peer destination> [FROM_PORT=..] ───
//! ◄═ raw stream bytes ════════════════════
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Only one listener may be active at a time; dropping it frees the slot
//! - Bytes the router sends right after the accept line are already in
//!   the connection's read buffer and are returned first
//!
//! ## Last Modified
//! v0.1.0 - Initial stream session

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use veilink_common::types::SessionName;
use veilink_core::identity::{Identity, Keypair};

use super::client::{lookup_on, ControlClient, ControlConnection};
use super::SELF_NAME;
use crate::error::{Result, TransportError};
use crate::traits::NameResolver;

// ============================================
// StreamSession
// ============================================

struct SessionInner {
    client: ControlClient,
    name: SessionName,
    keypair: Keypair,
    /// Session control socket; `None` once closed.
    control: Mutex<Option<ControlConnection>>,
    closed: watch::Sender<bool>,
    listener_active: AtomicBool,
}

impl SessionInner {
    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(TransportError::SessionClosed)
        } else {
            Ok(())
        }
    }
}

/// A named stream session. Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct StreamSession {
    inner: Arc<SessionInner>,
}

impl StreamSession {
    pub(crate) fn new(
        client: ControlClient,
        name: SessionName,
        keypair: Keypair,
        control: ControlConnection,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            inner: Arc::new(SessionInner {
                client,
                name,
                keypair,
                control: Mutex::new(Some(control)),
                closed,
                listener_active: AtomicBool::new(false),
            }),
        }
    }

    /// Session id.
    #[must_use]
    pub fn name(&self) -> &SessionName {
        &self.inner.name
    }

    /// Our destination.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        self.inner.keypair.identity()
    }

    /// Returns `true` once `close()` has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Resolves a name through the session's control socket. `"ME"`
    /// resolves to our own identity without asking the router.
    ///
    /// # Errors
    /// Returns `SessionClosed` or a lookup error.
    pub async fn lookup(&self, name: &str) -> Result<Identity> {
        self.inner.ensure_open()?;
        if name == SELF_NAME {
            return Ok(self.identity().clone());
        }
        if Identity::is_long_form(name) {
            return Ok(Identity::from_base64(name)?);
        }

        let mut control = self.inner.control.lock().await;
        let conn = control.as_mut().ok_or(TransportError::SessionClosed)?;
        lookup_on(conn, name).await
    }

    /// Connects to `target` (name, label or long form).
    ///
    /// # Errors
    /// Returns `SessionClosed`, a lookup error, or the router's rejection
    /// (`CANT_REACH_PEER`, `TIMEOUT`, ...).
    pub async fn dial(&self, target: &str) -> Result<StreamConnection> {
        let remote = self.lookup(target).await?;
        self.dial_identity(&remote).await
    }

    /// Connects to a resolved identity.
    ///
    /// # Errors
    /// See [`StreamSession::dial`].
    pub async fn dial_identity(&self, remote: &Identity) -> Result<StreamConnection> {
        self.inner.ensure_open()?;

        let mut conn = self.inner.client.connect().await?;
        conn.command(&format!(
            "STREAM CONNECT ID={} DESTINATION={} SILENT=false",
            self.inner.name,
            remote.to_base64()
        ))
        .await?
        .expect_kind("STREAM", "STATUS")?
        .check_result()?;

        debug!(session = %self.inner.name, peer = %remote.label(), "Stream connected");
        Ok(StreamConnection::new(
            conn,
            self.identity().clone(),
            remote.clone(),
        ))
    }

    /// Starts listening for inbound streams.
    ///
    /// # Errors
    /// Returns `SessionClosed`, or `ListenerActive` if a listener already
    /// exists.
    pub fn listen(&self) -> Result<StreamListener> {
        self.inner.ensure_open()?;
        if self.inner.listener_active.swap(true, Ordering::AcqRel) {
            return Err(TransportError::ListenerActive);
        }
        Ok(StreamListener {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Closes the session, cancelling pending accepts. Idempotent.
    ///
    /// # Errors
    /// Never fails today; shutdown errors on the socket are ignored.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.send_replace(true) {
            return Ok(());
        }

        if let Some(conn) = self.inner.control.lock().await.take() {
            let (_, mut writer) = conn.into_parts();
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "Control socket shutdown failed");
            }
        }

        info!(session = %self.inner.name, "Stream session closed");
        Ok(())
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("name", &self.inner.name)
            .field("identity", self.identity())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl NameResolver for StreamSession {
    async fn lookup(&self, name: &str) -> Result<Identity> {
        Self::lookup(self, name).await
    }
}

// ============================================
// StreamListener
// ============================================

/// Accepts inbound streams for a session. Dropping it frees the
/// session's listener slot.
pub struct StreamListener {
    inner: Arc<SessionInner>,
}

impl StreamListener {
    /// Waits for the next inbound stream.
    ///
    /// # Errors
    /// Returns `SessionClosed` if the session is (or becomes) closed, or
    /// the router's rejection.
    pub async fn accept(&self) -> Result<StreamConnection> {
        self.inner.ensure_open()?;
        let mut closed = self.inner.closed.subscribe();

        tokio::select! {
            result = self.accept_one() => result,
            () = wait_closed(&mut closed) => Err(TransportError::SessionClosed),
        }
    }

    async fn accept_one(&self) -> Result<StreamConnection> {
        let mut conn = self.inner.client.connect().await?;
        conn.command(&format!(
            "STREAM ACCEPT ID={} SILENT=false",
            self.inner.name
        ))
        .await?
        .expect_kind("STREAM", "STATUS")?
        .check_result()?;

        let line = conn.read_line_unbounded().await?;
        let destination = line
            .split_whitespace()
            .next()
            .ok_or_else(|| TransportError::malformed("empty accept line"))?;
        let remote = Identity::from_base64(destination)
            .map_err(|e| TransportError::malformed(format!("accept line: {e}")))?;

        debug!(session = %self.inner.name, peer = %remote.label(), "Stream accepted");
        Ok(StreamConnection::new(
            conn,
            self.inner.keypair.identity().clone(),
            remote,
        ))
    }
}

impl Drop for StreamListener {
    fn drop(&mut self) {
        self.inner.listener_active.store(false, Ordering::Release);
    }
}

impl fmt::Debug for StreamListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamListener")
            .field("session", &self.inner.name)
            .finish()
    }
}

/// Resolves once the watched flag turns `true`.
pub(crate) async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    while !*closed.borrow_and_update() {
        if closed.changed().await.is_err() {
            return;
        }
    }
}

// ============================================
// StreamConnection
// ============================================

/// An established stream between two destinations.
pub struct StreamConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    local: Identity,
    remote: Identity,
}

impl StreamConnection {
    fn new(conn: ControlConnection, local: Identity, remote: Identity) -> Self {
        let (reader, writer) = conn.into_parts();
        Self {
            reader,
            writer,
            local,
            remote,
        }
    }

    /// Our side of the stream.
    #[must_use]
    pub const fn local_identity(&self) -> &Identity {
        &self.local
    }

    /// The peer's destination.
    #[must_use]
    pub const fn remote_identity(&self) -> &Identity {
        &self.remote
    }
}

impl AsyncRead for StreamConnection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().reader).poll_read(cx, buf)
    }
}

impl AsyncWrite for StreamConnection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().writer).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_shutdown(cx)
    }
}

impl fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConnection")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .finish()
    }
}

// ============================================
// Tests
// ============================================
