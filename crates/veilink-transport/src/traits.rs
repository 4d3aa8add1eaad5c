// ============================================
// File: crates/veilink-transport/src/traits.rs
// ============================================
//! # Transport Traits
//!
//! ## Creation Reason
//! The relay core talks to three collaborators it doesn't own: the local
//! packet device, the anonymous datagram session, and a name resolver.
//! These traits are the seams; production code plugs in the SAM session
//! and an external device backend, tests plug in the mocks.
//!
//! ## Main Functionality
//! - `Device`: read/write/close of raw IP packets
//! - `DatagramTransport`: addressed datagrams between identities
//! - `NameResolver`: name or label to `Identity`
//! - `DeviceConfig`: name and MTU of the device
//!
//! ## ⚠️ Important Note for Next Developer
//! - All traits are `Send + Sync`; the relay shares them behind `Arc`
//! - `close()` must unblock a pending `read()` / `receive_from()`
//!
//! ## Last Modified
//! v0.1.0 - Initial trait definitions

use async_trait::async_trait;

use veilink_core::identity::Identity;

use crate::error::{Result, TransportError};

// ============================================
// Device Trait
// ============================================

/// Local network device carrying raw IP packets (TUN-like).
///
/// # Data Format
/// One `read()` yields one IP packet; one `write()` injects one packet.
///
/// # Example
/// ```ignore
/// async fn drain<D: Device>(device: &D) -> Result<()> {
///     let mut buf = vec![0u8; usize::from(device.mtu())];
///     loop {
///         let len = device.read(&mut buf).await?;
///         handle(&buf[..len]);
///     }
/// }
/// ```
#[async_trait]
pub trait Device: Send + Sync {
    /// Reads one packet into `buf`.
    ///
    /// # Errors
    /// Returns `DeviceRead` on failure and `DeviceClosed` after close.
    async fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Writes one packet.
    ///
    /// # Errors
    /// Returns `DeviceWrite` on failure and `DeviceClosed` after close.
    async fn write(&self, packet: &[u8]) -> Result<usize>;

    /// Closes the device, unblocking pending reads.
    ///
    /// # Errors
    /// Returns error if the backend fails to close.
    async fn close(&self) -> Result<()>;

    /// Device name.
    fn name(&self) -> &str;

    /// Maximum packet size.
    fn mtu(&self) -> u16;
}

// ============================================
// DatagramTransport Trait
// ============================================

/// Addressed, unreliable datagrams between network identities.
#[async_trait]
pub trait DatagramTransport: Send + Sync {
    /// Sends `payload` to `dest`.
    ///
    /// # Errors
    /// Returns `DatagramTooLarge`, `SessionClosed`, or a network error.
    async fn send_to(&self, dest: &Identity, payload: &[u8]) -> Result<()>;

    /// Waits for the next datagram and its sender.
    ///
    /// # Errors
    /// Returns `SessionClosed` after close; any other error means the
    /// session is lost.
    async fn receive_from(&self) -> Result<(Vec<u8>, Identity)>;

    /// Our own identity on the network.
    fn local_identity(&self) -> &Identity;

    /// Closes the transport; idempotent.
    ///
    /// # Errors
    /// Returns error if shutdown of the underlying connection fails.
    async fn close(&self) -> Result<()>;
}

// ============================================
// NameResolver Trait
// ============================================

/// Resolves names, labels and long-form destinations to identities.
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Looks up `name`.
    ///
    /// # Errors
    /// Returns `Rejected { failure: KeyNotFound, .. }` for unknown names.
    async fn lookup(&self, name: &str) -> Result<Identity>;
}

// ============================================
// DeviceConfig
// ============================================

/// Name and MTU of the local device.
///
/// # Example
/// ```
/// use veilink_transport::traits::DeviceConfig;
///
/// let config = DeviceConfig::new("veil0").with_mtu(1280);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Device name (e.g., "veil0").
    pub name: String,
    /// MTU size.
    pub mtu: u16,
}

impl DeviceConfig {
    /// Creates a configuration with the default MTU.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mtu: 1280,
        }
    }

    /// Sets the MTU.
    #[must_use]
    pub const fn with_mtu(mut self, mtu: u16) -> Self {
        self.mtu = mtu;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns error if configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(TransportError::invalid_config(
                "name",
                "device name cannot be empty",
            ));
        }

        if self.name.len() > 15 {
            return Err(TransportError::invalid_config(
                "name",
                "device name cannot exceed 15 characters",
            ));
        }

        // IPv4 minimum datagram size
        if self.mtu < 576 {
            return Err(TransportError::invalid_config(
                "mtu",
                "MTU must be at least 576 bytes",
            ));
        }

        if usize::from(self.mtu) > crate::sam::MAX_DATAGRAM_SIZE {
            return Err(TransportError::invalid_config(
                "mtu",
                "MTU cannot exceed the datagram size limit",
            ));
        }

        Ok(())
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new("veil0")
    }
}

// ============================================
// Tests
// ============================================
