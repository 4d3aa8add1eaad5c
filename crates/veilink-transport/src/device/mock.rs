// ============================================
// File: crates/veilink-transport/src/device/mock.rs
// ============================================
//! # Mock Device Implementation
//!
//! ## Creation Reason
//! Provides an in-memory packet device for testing the relay without a
//! TUN interface or root privileges.
//!
//! ## Main Functionality
//! - In-memory packet queues
//! - Packet capture for verification
//! - Read failure injection for retry tests
//! - Close semantics matching real devices
//!
//! ## Usage in Tests
//! ```ignore
//! use veilink_transport::device::MockDevice;
//! use veilink_transport::traits::{Device, DeviceConfig};
//!
//! let device = MockDevice::new(DeviceConfig::new("mock0"));
//! device.inject_packet(b"test packet".to_vec());
//!
//! let mut buf = [0u8; 1500];
//! let len = device.read(&mut buf).await?;
//! assert_eq!(&buf[..len], b"test packet");
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This is for testing only - do not use in production
//! - Packet queues are bounded to prevent memory issues
//!
//! ## Last Modified
//! v0.1.0 - Initial mock implementation

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{Result, TransportError};
use crate::traits::{Device, DeviceConfig};

// ============================================
// Constants
// ============================================

/// Maximum number of packets to queue.
const MAX_QUEUE_SIZE: usize = 1000;

// ============================================
// MockDevice
// ============================================

/// Mock packet device for testing.
pub struct MockDevice {
    /// Device configuration
    config: DeviceConfig,
    /// Packets waiting to be read (injected for testing)
    read_queue: Mutex<VecDeque<Vec<u8>>>,
    /// Packets that have been written (captured for verification)
    write_queue: Mutex<VecDeque<Vec<u8>>>,
    /// Reads left to fail before the queue is served again
    failing_reads: AtomicUsize,
    /// Whether `close()` has run
    closed: AtomicBool,
    /// Wakes a blocked reader on inject or close
    read_notify: Notify,
}

impl MockDevice {
    /// Creates a new mock device.
    #[must_use]
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            read_queue: Mutex::new(VecDeque::with_capacity(100)),
            write_queue: Mutex::new(VecDeque::with_capacity(100)),
            failing_reads: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            read_notify: Notify::new(),
        }
    }

    /// Injects a packet to be returned by a later `read()` call.
    ///
    /// # Panics
    /// Panics if the queue is full (> `MAX_QUEUE_SIZE` packets).
    pub fn inject_packet(&self, packet: Vec<u8>) {
        let mut queue = self.read_queue.lock();
        assert!(queue.len() < MAX_QUEUE_SIZE, "Mock device read queue overflow");
        queue.push_back(packet);
        drop(queue);
        self.read_notify.notify_one();
    }

    /// Makes the next `count` reads fail with `DeviceRead`.
    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::Release);
        self.read_notify.notify_one();
    }

    /// Takes all packets that have been written to the device.
    #[must_use]
    pub fn take_written_packets(&self) -> Vec<Vec<u8>> {
        self.write_queue.lock().drain(..).collect()
    }

    /// Waits until at least `count` packets have been written or
    /// `timeout` passes, then takes what is there.
    pub async fn wait_written(&self, count: usize, timeout: Duration) -> Vec<Vec<u8>> {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.written_count() < count && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.take_written_packets()
    }

    /// Returns the number of packets waiting to be read.
    #[must_use]
    pub fn pending_read_count(&self) -> usize {
        self.read_queue.lock().len()
    }

    /// Returns the number of packets that have been written.
    #[must_use]
    pub fn written_count(&self) -> usize {
        self.write_queue.lock().len()
    }

    /// Returns `true` once `close()` has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Device for MockDevice {
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            if self.is_closed() {
                return Err(TransportError::DeviceClosed);
            }

            let failing = self.failing_reads.load(Ordering::Acquire);
            if failing > 0 {
                self.failing_reads.store(failing - 1, Ordering::Release);
                return Err(TransportError::DeviceRead {
                    reason: "injected failure".into(),
                });
            }

            {
                let mut queue = self.read_queue.lock();
                if let Some(packet) = queue.pop_front() {
                    let len = packet.len().min(buf.len());
                    buf[..len].copy_from_slice(&packet[..len]);
                    return Ok(len);
                }
            }

            // Wait for a packet, a close, or an injected failure
            self.read_notify.notified().await;
        }
    }

    async fn write(&self, packet: &[u8]) -> Result<usize> {
        if self.is_closed() {
            return Err(TransportError::DeviceClosed);
        }

        let mut queue = self.write_queue.lock();
        if queue.len() >= MAX_QUEUE_SIZE {
            return Err(TransportError::DeviceWrite {
                reason: "Write queue full".into(),
            });
        }
        queue.push_back(packet.to_vec());
        Ok(packet.len())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.read_notify.notify_one();
        Ok(())
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn mtu(&self) -> u16 {
        self.config.mtu
    }
}

impl std::fmt::Debug for MockDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDevice")
            .field("name", &self.config.name)
            .field("mtu", &self.config.mtu)
            .field("closed", &self.is_closed())
            .field("pending_reads", &self.pending_read_count())
            .field("written_packets", &self.written_count())
            .finish()
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new(DeviceConfig::default())
    }
}

// ============================================
// Tests
// ============================================
