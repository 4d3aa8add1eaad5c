// ============================================
// File: crates/veilink-transport/src/sam/client.rs
// ============================================
//! # Control Client
//!
//! ## Creation Reason
//! Owns the connection logic for the router's control endpoint: open a
//! socket, negotiate the protocol version, then issue commands and read
//! single-line replies under a timeout.
//!
//! ## Main Functionality
//! - `SamConfig`: router address, version window, reply timeout
//! - `ControlConnection`: one handshaken control socket
//! - `ControlClient`: one-shot commands (`DEST GENERATE`,
//!   `NAMING LOOKUP`) and session creation
//!
//! ## Command Flow
//! ```text
//! client                                   router
//!   │ ── HELLO VERSION MIN=3.0 MAX=3.1 ──────►│
//!   │ ◄─ HELLO REPLY RESULT=OK VERSION=3.1 ───│
//!   │ ── NAMING LOOKUP NAME=<name> ──────────►│
//!   │ ◄─ NAMING REPLY RESULT=OK VALUE=<b64> ──│
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Never log full command lines: `SESSION CREATE` carries the private
//!   key blob. Log the command name only
//! - One-shot commands use a fresh connection each time; only sessions
//!   keep theirs open
//!
//! ## Last Modified
//! v0.1.0 - Initial control client

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use veilink_common::types::SessionName;
use veilink_core::identity::{Identity, Keypair};

use super::datagram::DatagramSession;
use super::reply::ControlReply;
use super::stream::StreamSession;
use super::{DEFAULT_MAX_VERSION, DEFAULT_MIN_VERSION, DEFAULT_SAM_ADDRESS, MAX_LINE_LEN};
use crate::error::{Result, TransportError};
use crate::traits::NameResolver;

// ============================================
// Constants
// ============================================

/// Default bound on waiting for a single reply line.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(90);

// ============================================
// SamConfig
// ============================================

/// Connection settings for the router's control endpoint.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use veilink_transport::sam::SamConfig;
///
/// let config = SamConfig::new("127.0.0.1:7656")
///     .with_reply_timeout(Duration::from_secs(30));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamConfig {
    /// Router control address (`host:port`).
    pub address: String,
    /// Lowest acceptable protocol version.
    pub min_version: String,
    /// Highest acceptable protocol version.
    pub max_version: String,
    /// Bound on each reply read.
    pub reply_timeout: Duration,
    /// Signature type requested for generated keys, router default if
    /// unset.
    pub signature_type: Option<String>,
}

impl SamConfig {
    /// Creates a configuration for `address` with default versions and
    /// timeout.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            min_version: DEFAULT_MIN_VERSION.to_string(),
            max_version: DEFAULT_MAX_VERSION.to_string(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            signature_type: None,
        }
    }

    /// Sets the reply timeout.
    #[must_use]
    pub const fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Sets the version window.
    #[must_use]
    pub fn with_versions(mut self, min: impl Into<String>, max: impl Into<String>) -> Self {
        self.min_version = min.into();
        self.max_version = max.into();
        self
    }

    /// Sets the signature type for `DEST GENERATE`.
    #[must_use]
    pub fn with_signature_type(mut self, signature_type: impl Into<String>) -> Self {
        self.signature_type = Some(signature_type.into());
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for an empty address, an unparseable or
    /// inverted version window, or a zero timeout.
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(TransportError::invalid_config(
                "address",
                "router address cannot be empty",
            ));
        }

        let min = parse_version(&self.min_version).ok_or_else(|| {
            TransportError::invalid_config("min_version", "expected MAJOR.MINOR")
        })?;
        let max = parse_version(&self.max_version).ok_or_else(|| {
            TransportError::invalid_config("max_version", "expected MAJOR.MINOR")
        })?;
        if min > max {
            return Err(TransportError::invalid_config(
                "min_version",
                "min_version is above max_version",
            ));
        }

        if self.reply_timeout.is_zero() {
            return Err(TransportError::invalid_config(
                "reply_timeout",
                "reply timeout must be positive",
            ));
        }

        Ok(())
    }
}

impl Default for SamConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SAM_ADDRESS)
    }
}

fn parse_version(version: &str) -> Option<(u32, u32)> {
    let (major, minor) = version.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

// ============================================
// SessionStyle / SessionOptions
// ============================================

/// Kind of session to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStyle {
    /// Reliable streams (dial / accept).
    Stream,
    /// Repliable datagrams.
    Datagram,
}

impl SessionStyle {
    /// Wire name used in `SESSION CREATE STYLE=`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stream => "STREAM",
            Self::Datagram => "DATAGRAM",
        }
    }
}

impl fmt::Display for SessionStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Router tuning options appended to `SESSION CREATE` as `key=value`
/// tokens, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    entries: Vec<(String, String)>,
}

impl SessionOptions {
    /// Creates an empty option set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an option.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the key is empty or either part
    /// contains whitespace or `=` in the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        let value = value.into();

        if key.is_empty() || key.contains('=') || key.contains(char::is_whitespace) {
            return Err(TransportError::invalid_config(
                "options",
                format!("invalid option key '{key}'"),
            ));
        }
        if value.contains(char::is_whitespace) {
            return Err(TransportError::invalid_config(
                "options",
                format!("value of '{key}' contains whitespace"),
            ));
        }

        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        Ok(())
    }

    /// Parses a list of `key=value` strings.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for entries without `=` or with invalid
    /// parts.
    pub fn parse<S: AsRef<str>>(pairs: &[S]) -> Result<Self> {
        let mut options = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                TransportError::invalid_config("options", format!("'{pair}' is not key=value"))
            })?;
            options.insert(key, value)?;
        }
        Ok(options)
    }

    /// Value of `key`, if set.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Number of options.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no options are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn to_fragment(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!(" {k}={v}"))
            .collect()
    }
}

// ============================================
// ControlConnection
// ============================================

/// A handshaken socket to the router.
///
/// Sessions keep theirs open for their lifetime; stream connections turn
/// theirs into the data pipe after `STREAM CONNECT` / `STREAM ACCEPT`.
pub struct ControlConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    reply_timeout: Duration,
    version: String,
}

impl ControlConnection {
    /// Connects to the router and performs the `HELLO` handshake.
    async fn open(config: &SamConfig) -> Result<Self> {
        let stream = tokio::time::timeout(config.reply_timeout, TcpStream::connect(&config.address))
            .await
            .map_err(|_| TransportError::timeout(format!("connect to {}", config.address)))?
            .map_err(|e| TransportError::connect_failed(&config.address, e.to_string()))?;

        // Control traffic is small request/response lines
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY on control socket");
        }

        let (reader, writer) = stream.into_split();
        let mut conn = Self {
            reader: BufReader::new(reader),
            writer,
            reply_timeout: config.reply_timeout,
            version: String::new(),
        };
        conn.handshake(config).await?;
        Ok(conn)
    }

    async fn handshake(&mut self, config: &SamConfig) -> Result<()> {
        let reply = self
            .command(&format!(
                "HELLO VERSION MIN={} MAX={}",
                config.min_version, config.max_version
            ))
            .await?
            .expect_kind("HELLO", "REPLY")?;

        if reply.get("RESULT") == Some("NOVERSION") {
            return Err(TransportError::UnsupportedVersion {
                min: config.min_version.clone(),
                max: config.max_version.clone(),
            });
        }
        let reply = reply.check_result()?;

        self.version = reply
            .get("VERSION")
            .unwrap_or(&config.min_version)
            .to_string();
        debug!(version = %self.version, "Router handshake complete");
        Ok(())
    }

    /// Negotiated protocol version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Sends one command line and parses the reply line.
    ///
    /// # Errors
    /// Returns network errors from the socket, `Timeout` if no reply
    /// arrives in time, or `MalformedReply`.
    pub async fn command(&mut self, line: &str) -> Result<ControlReply> {
        self.send_line(line).await?;
        let reply = self.read_line().await?;
        ControlReply::parse(&reply)
    }

    pub(crate) async fn send_line(&mut self, line: &str) -> Result<()> {
        debug!(command = %command_name(line), "Sending control command");
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        self.writer
            .write_all(&bytes)
            .await
            .map_err(|e| TransportError::from_socket("control write", e))
    }

    /// Reads one reply line under the reply timeout.
    pub(crate) async fn read_line(&mut self) -> Result<String> {
        tokio::time::timeout(self.reply_timeout, read_line_from(&mut self.reader, "control reply"))
            .await
            .map_err(|_| TransportError::timeout("waiting for router reply"))?
    }

    /// Reads one line with no time bound (used while waiting for an
    /// inbound stream).
    pub(crate) async fn read_line_unbounded(&mut self) -> Result<String> {
        read_line_from(&mut self.reader, "accept").await
    }

    pub(crate) const fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    pub(crate) fn into_parts(self) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
        (self.reader, self.writer)
    }
}

impl fmt::Debug for ControlConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlConnection")
            .field("version", &self.version)
            .field("reply_timeout", &self.reply_timeout)
            .finish_non_exhaustive()
    }
}

/// Reads a `\n`-terminated line, bounded by `MAX_LINE_LEN`, without the
/// terminator.
pub(crate) async fn read_line_from<R>(reader: &mut R, context: &str) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let limit = u64::try_from(MAX_LINE_LEN).unwrap_or(u64::MAX);
    let read = (&mut *reader)
        .take(limit)
        .read_line(&mut line)
        .await
        .map_err(|e| TransportError::from_socket(context, e))?;

    if read == 0 {
        return Err(TransportError::connection_closed(context));
    }
    if !line.ends_with('\n') {
        if read >= MAX_LINE_LEN {
            return Err(TransportError::malformed("reply line too long"));
        }
        return Err(TransportError::connection_closed(context));
    }

    line.truncate(line.trim_end_matches(['\r', '\n']).len());
    Ok(line)
}

/// First two words of a command, safe to log.
fn command_name(line: &str) -> String {
    line.split_whitespace().take(2).collect::<Vec<_>>().join(" ")
}

// ============================================
// ControlClient
// ============================================

/// Client for the router's control protocol.
///
/// # Example
/// ```ignore
/// let client = ControlClient::new(SamConfig::default());
/// let keys = client.create_keys().await?;
/// let session = client
///     .create_datagram_session(SessionName::random(), keys, &SessionOptions::new())
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct ControlClient {
    config: SamConfig,
}

impl ControlClient {
    /// Creates a client; no connection is made until a command runs.
    #[must_use]
    pub const fn new(config: SamConfig) -> Self {
        Self { config }
    }

    /// Client configuration.
    #[must_use]
    pub const fn config(&self) -> &SamConfig {
        &self.config
    }

    /// Opens a new handshaken control connection.
    ///
    /// # Errors
    /// Returns `ConnectFailed`, `Timeout`, `UnsupportedVersion` or a
    /// reply error.
    pub async fn connect(&self) -> Result<ControlConnection> {
        ControlConnection::open(&self.config).await
    }

    /// Performs a handshake and returns the negotiated version.
    ///
    /// # Errors
    /// See [`ControlClient::connect`].
    pub async fn handshake(&self) -> Result<String> {
        let conn = self.connect().await?;
        Ok(conn.version().to_string())
    }

    /// Asks the router to generate a new destination keypair.
    ///
    /// # Errors
    /// Returns a reply error, or `MalformedReply` if the keys in the
    /// reply don't parse.
    pub async fn create_keys(&self) -> Result<Keypair> {
        let mut conn = self.connect().await?;
        let command = match &self.config.signature_type {
            Some(sig) => format!("DEST GENERATE SIGNATURE_TYPE={sig}"),
            None => "DEST GENERATE".to_string(),
        };

        let reply = conn
            .command(&command)
            .await?
            .expect_kind("DEST", "REPLY")?
            .check_result()?;

        let keypair = Keypair::from_parts(reply.require("PUB")?, reply.require("PRIV")?)
            .map_err(|e| TransportError::malformed(format!("DEST REPLY carried bad keys: {e}")))?;

        info!(label = %keypair.identity().label(), "Generated destination keys");
        Ok(keypair)
    }

    /// Resolves a name, label or long-form destination.
    ///
    /// Long-form destinations are parsed locally without a round trip.
    ///
    /// # Errors
    /// Returns `Rejected { failure: KeyNotFound, .. }` for unknown names.
    pub async fn lookup(&self, name: &str) -> Result<Identity> {
        if Identity::is_long_form(name) {
            return Ok(Identity::from_base64(name)?);
        }

        let mut conn = self.connect().await?;
        lookup_on(&mut conn, name).await
    }

    /// Creates a stream session.
    ///
    /// # Errors
    /// Returns `Rejected` with the router's reason (duplicate id, invalid
    /// key, internal error) or a connection error.
    pub async fn create_stream_session(
        &self,
        name: SessionName,
        keypair: Keypair,
        options: &SessionOptions,
    ) -> Result<StreamSession> {
        let control = self
            .open_session(SessionStyle::Stream, &name, &keypair, options)
            .await?;
        Ok(StreamSession::new(self.clone(), name, keypair, control))
    }

    /// Creates a datagram session.
    ///
    /// # Errors
    /// Same as [`ControlClient::create_stream_session`].
    pub async fn create_datagram_session(
        &self,
        name: SessionName,
        keypair: Keypair,
        options: &SessionOptions,
    ) -> Result<DatagramSession> {
        let control = self
            .open_session(SessionStyle::Datagram, &name, &keypair, options)
            .await?;
        Ok(DatagramSession::new(name, keypair, control))
    }

    /// Runs `SESSION CREATE` and returns the session's control socket.
    async fn open_session(
        &self,
        style: SessionStyle,
        name: &SessionName,
        keypair: &Keypair,
        options: &SessionOptions,
    ) -> Result<ControlConnection> {
        let mut conn = self.connect().await?;
        let command = format!(
            "SESSION CREATE STYLE={style} ID={name} DESTINATION={}{}",
            keypair.private_base64(),
            options.to_fragment()
        );

        let result = conn
            .command(&command)
            .await
            .and_then(|reply| reply.expect_kind("SESSION", "STATUS"))
            .and_then(ControlReply::check_result);

        match result {
            Ok(_) => {
                info!(
                    session = %name,
                    style = %style,
                    label = %keypair.identity().label(),
                    "Session created"
                );
                Ok(conn)
            }
            Err(e) => {
                warn!(session = %name, style = %style, error = %e, "Session create failed");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl NameResolver for ControlClient {
    async fn lookup(&self, name: &str) -> Result<Identity> {
        Self::lookup(self, name).await
    }
}

/// Runs `NAMING LOOKUP` on an existing connection.
pub(crate) async fn lookup_on(conn: &mut ControlConnection, name: &str) -> Result<Identity> {
    let reply = conn
        .command(&format!("NAMING LOOKUP NAME={name}"))
        .await?
        .expect_kind("NAMING", "REPLY")?
        .check_result()?;

    let value = reply.require("VALUE")?;
    let identity = Identity::from_base64(value)
        .map_err(|e| TransportError::malformed(format!("NAMING REPLY value: {e}")))?;

    debug!(name = %name, label = %identity.label(), "Name resolved");
    Ok(identity)
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sam::reply::ControlFailure;
    use crate::sam::testing::{test_keypair, FakeRouter, Response};

    #[test]
    fn test_sam_config_validation() {
        assert!(SamConfig::default().validate().is_ok());
        assert!(SamConfig::new("").validate().is_err());
        assert!(SamConfig::default()
            .with_versions("3.2", "3.0")
            .validate()
            .is_err());
        assert!(SamConfig::default()
            .with_versions("three", "3.1")
            .validate()
            .is_err());
        assert!(SamConfig::default()
            .with_reply_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_session_options() {
        let mut options =
            SessionOptions::parse(&["inbound.length=2", "outbound.length=2"]).unwrap();
        options.insert("inbound.length", "1").unwrap();

        assert_eq!(options.len(), 2);
        assert_eq!(options.get("inbound.length"), Some("1"));
        assert_eq!(options.to_fragment(), " inbound.length=1 outbound.length=2");

        assert!(SessionOptions::parse(&["novalue"]).is_err());
        assert!(options.insert("bad key", "1").is_err());
        assert!(options.insert("key", "two words").is_err());
    }

    #[tokio::test]
    async fn test_handshake_negotiates_version() {
        let router = FakeRouter::spawn(|_| vec![]).await;
        let client = ControlClient::new(router.config());

        let version = client.handshake().await.unwrap();
        assert_eq!(version, "3.1");
        assert_eq!(router.requests()[0], "HELLO VERSION MIN=3.0 MAX=3.1");
    }

    #[tokio::test]
    async fn test_handshake_noversion() {
        let router = FakeRouter::spawn_raw(|line| {
            if line.starts_with("HELLO") {
                vec![Response::line("HELLO REPLY RESULT=NOVERSION")]
            } else {
                vec![]
            }
        })
        .await;
        let client = ControlClient::new(router.config());

        let err = client.handshake().await.unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedVersion { .. }));
        assert!(err.is_protocol_error());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ControlClient::new(SamConfig::new(addr.to_string()));
        let err = client.handshake().await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectFailed { .. }));
        assert!(err.is_network_error());
    }

    #[tokio::test]
    async fn test_reply_timeout() {
        let router = FakeRouter::spawn_raw(|_| vec![]).await;
        let client = ControlClient::new(
            router.config().with_reply_timeout(Duration::from_millis(100)),
        );

        let err = client.handshake().await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_router_closes_connection() {
        let router = FakeRouter::spawn_raw(|_| vec![Response::Close]).await;
        let client = ControlClient::new(router.config());

        let err = client.handshake().await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed { .. }));
    }

    #[tokio::test]
    async fn test_create_keys() {
        let keys = test_keypair(3);
        let public = keys.identity().to_base64().to_string();
        let private = keys.private_base64().to_string();

        let router = FakeRouter::spawn(move |line| {
            if line.starts_with("DEST GENERATE") {
                vec![Response::line(format!("DEST REPLY PUB={public} PRIV={private}"))]
            } else {
                vec![]
            }
        })
        .await;
        let client = ControlClient::new(router.config().with_signature_type("EdDSA_SHA512_Ed25519"));

        let generated = client.create_keys().await.unwrap();
        assert_eq!(generated.identity(), keys.identity());
        assert_eq!(
            router.requests()[1],
            "DEST GENERATE SIGNATURE_TYPE=EdDSA_SHA512_Ed25519"
        );
    }

    #[tokio::test]
    async fn test_lookup_success_and_not_found() {
        let known = test_keypair(9).identity().clone();
        let value = known.to_base64().to_string();

        let router = FakeRouter::spawn(move |line| {
            if line == "NAMING LOOKUP NAME=peer.i2p" {
                vec![Response::line(format!(
                    "NAMING REPLY RESULT=OK NAME=peer.i2p VALUE={value}"
                ))]
            } else {
                vec![Response::line(
                    "NAMING REPLY RESULT=KEY_NOT_FOUND NAME=missing.i2p",
                )]
            }
        })
        .await;
        let client = ControlClient::new(router.config());

        assert_eq!(client.lookup("peer.i2p").await.unwrap(), known);

        let err = client.lookup("missing.i2p").await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Rejected {
                failure: ControlFailure::KeyNotFound,
                ..
            }
        ));
        assert!(err.is_network_error());
    }

    #[tokio::test]
    async fn test_lookup_long_form_skips_router() {
        let router = FakeRouter::spawn(|_| vec![]).await;
        let client = ControlClient::new(router.config());
        let identity = test_keypair(4).identity().clone();

        let resolved = client.lookup(identity.to_base64()).await.unwrap();
        assert_eq!(resolved, identity);
        assert!(router.requests().is_empty());
    }

    #[tokio::test]
    async fn test_create_session_duplicate_id() {
        let router = FakeRouter::spawn(|line| {
            if line.starts_with("SESSION CREATE") {
                vec![Response::line(
                    r#"SESSION STATUS RESULT=DUPLICATED_ID MESSAGE="Duplicate id""#,
                )]
            } else {
                vec![]
            }
        })
        .await;
        let client = ControlClient::new(router.config());

        let err = client
            .create_datagram_session(
                SessionName::new("dup").unwrap(),
                test_keypair(1),
                &SessionOptions::new(),
            )
            .await
            .unwrap_err();

        match err {
            TransportError::Rejected {
                failure, message, ..
            } => {
                assert_eq!(failure, ControlFailure::DuplicatedId);
                assert_eq!(message.as_deref(), Some("Duplicate id"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_session_command_line() {
        let router = FakeRouter::spawn(|line| {
            if line.starts_with("SESSION CREATE") {
                vec![Response::line("SESSION STATUS RESULT=OK DESTINATION=x")]
            } else {
                vec![]
            }
        })
        .await;
        let client = ControlClient::new(router.config());
        let keys = test_keypair(2);
        let options = SessionOptions::parse(&["inbound.quantity=3"]).unwrap();

        let session = client
            .create_stream_session(SessionName::new("veil").unwrap(), keys.clone(), &options)
            .await
            .unwrap();

        let create = router
            .requests()
            .into_iter()
            .find(|l| l.starts_with("SESSION CREATE"))
            .unwrap();
        assert_eq!(
            create,
            format!(
                "SESSION CREATE STYLE=STREAM ID=veil DESTINATION={} inbound.quantity=3",
                keys.private_base64()
            )
        );
        assert_eq!(session.identity(), keys.identity());
    }
}
