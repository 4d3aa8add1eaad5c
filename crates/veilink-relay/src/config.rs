// ============================================
// File: crates/veilink-relay/src/config.rs
// ============================================
//! # Relay Configuration
//!
//! ## Creation Reason
//! Provides configuration management for veilink, loaded from a TOML
//! file and handed to the components as explicit constructor values.
//!
//! ## Main Functionality
//! - `RelayConfig`: Main configuration structure
//! - TOML file loading and parsing
//! - Configuration validation
//! - Conversion into `SamConfig`, `SessionOptions`, `DeviceConfig` and
//!   `RelayOptions`
//!
//! ## Configuration Sections
//! - `sam`: Router control socket, session name, tuning options
//! - `identity`: Key file path
//! - `network`: Address map path, inbound filter mode
//! - `device`: Packet device settings
//! - `relay`: Queue sizes, lookup policy, keep-alives, retries
//! - `logging`: Log level
//!
//! ## Example Configuration
//! ```toml
//! [sam]
//! address = "127.0.0.1:7656"
//! session_name = "veilink"
//! options = ["inbound.length=3", "outbound.length=3"]
//!
//! [identity]
//! key_file = "/etc/veilink/veilink.key"
//!
//! [network]
//! address_map = "/etc/veilink/network.json"
//! filter_mode = "strict"
//!
//! [device]
//! name = "veil0"
//! mtu = 1280
//!
//! [relay]
//! queue_capacity = 256
//! lookup_timeout_secs = 30
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Nothing here is global: every value reaches the component that
//!   needs it through a constructor argument
//! - Validate config before startup; the converters assume a valid
//!   config
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use veilink_common::types::SessionName;
use veilink_transport::sam::{SamConfig, SessionOptions, DEFAULT_SAM_ADDRESS};
use veilink_transport::traits::DeviceConfig;

use crate::error::{RelayError, Result};
use crate::relay::RelayOptions;
use crate::services::FilterMode;

// ============================================
// RelayConfig
// ============================================

/// Main veilink configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Router control socket and session settings.
    #[serde(default)]
    pub sam: SamSection,

    /// Key material location.
    #[serde(default)]
    pub identity: IdentitySection,

    /// Address map and filtering.
    #[serde(default)]
    pub network: NetworkSection,

    /// Packet device settings.
    #[serde(default)]
    pub device: DeviceSection,

    /// Relay core tunables.
    #[serde(default)]
    pub relay: RelaySection,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl RelayConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    /// Returns error if file cannot be read, parsed or validated.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!("Loading configuration from: {}", path_str);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RelayError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| RelayError::config_load(&path_str, e.to_string()))?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Renders the default configuration as TOML, used by `veilink init`.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn default_toml() -> Result<String> {
        toml::to_string_pretty(&Self::default())
            .map_err(|e| RelayError::config_invalid("<default>", e.to_string()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.sam.validate()?;
        self.identity.validate()?;
        self.network.validate()?;
        self.device_config().validate().map_err(|e| {
            RelayError::config_invalid("device", e.to_string())
        })?;
        self.relay.validate()?;
        Ok(())
    }

    // ========================================
    // Component conversions
    // ========================================

    /// Router client configuration.
    #[must_use]
    pub fn sam_config(&self) -> SamConfig {
        let mut config = SamConfig::new(&self.sam.address)
            .with_versions(&self.sam.min_version, &self.sam.max_version)
            .with_reply_timeout(Duration::from_secs(self.sam.reply_timeout_secs));
        if let Some(signature_type) = &self.sam.signature_type {
            config = config.with_signature_type(signature_type);
        }
        config
    }

    /// Session tuning options.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` if an option is not `key=value`.
    pub fn session_options(&self) -> Result<SessionOptions> {
        SessionOptions::parse(&self.sam.options)
            .map_err(|e| RelayError::config_invalid("sam.options", e.to_string()))
    }

    /// Session name, random when unset.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` if the configured name is not usable.
    pub fn session_name(&self) -> Result<SessionName> {
        match &self.sam.session_name {
            Some(name) => SessionName::new(name.clone())
                .map_err(|e| RelayError::config_invalid("sam.session_name", e.to_string())),
            None => Ok(SessionName::random()),
        }
    }

    /// Device name and MTU.
    #[must_use]
    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig::new(&self.device.name).with_mtu(self.device.mtu)
    }

    /// Relay core options.
    #[must_use]
    pub fn relay_options(&self) -> RelayOptions {
        let relay = &self.relay;
        RelayOptions {
            queue_capacity: relay.queue_capacity,
            lookup_timeout: Duration::from_secs(relay.lookup_timeout_secs),
            negative_ttl: Duration::from_secs(relay.negative_ttl_secs),
            pending_per_destination: relay.pending_per_destination,
            max_concurrent_lookups: relay.max_concurrent_lookups,
            keepalive_interval: Duration::from_secs(relay.keepalive_interval_secs),
            device_retry_backoff: Duration::from_millis(relay.device_retry_backoff_ms),
            device_retry_limit: relay.device_retry_limit,
            tunnel_retry_interval: Duration::from_secs(relay.tunnel_retry_secs),
            filter_mode: self.network.filter_mode,
        }
    }
}

impl FromStr for RelayConfig {
    type Err = RelayError;

    fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| RelayError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

// ============================================
// SamSection
// ============================================

/// Router control socket configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamSection {
    /// Control socket address.
    #[serde(default = "default_sam_address")]
    pub address: String,

    /// Session name; a random one is generated when absent.
    #[serde(default = "default_session_name")]
    pub session_name: Option<String>,

    /// Lowest protocol version offered in the handshake.
    #[serde(default = "default_min_version")]
    pub min_version: String,

    /// Highest protocol version offered in the handshake.
    #[serde(default = "default_max_version")]
    pub max_version: String,

    /// Bound on every control-socket reply, in seconds.
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_secs: u64,

    /// Signature type for `keygen`; router default when absent.
    #[serde(default)]
    pub signature_type: Option<String>,

    /// `key=value` session tuning options.
    #[serde(default = "default_sam_options")]
    pub options: Vec<String>,
}

fn default_sam_address() -> String {
    DEFAULT_SAM_ADDRESS.to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_session_name() -> Option<String> {
    Some("veilink".to_string())
}

fn default_min_version() -> String {
    veilink_transport::sam::DEFAULT_MIN_VERSION.to_string()
}

fn default_max_version() -> String {
    veilink_transport::sam::DEFAULT_MAX_VERSION.to_string()
}

fn default_reply_timeout() -> u64 {
    90
}

fn default_sam_options() -> Vec<String> {
    [
        "inbound.length=3",
        "outbound.length=3",
        "inbound.quantity=1",
        "outbound.quantity=1",
        "inbound.backupQuantity=1",
        "outbound.backupQuantity=1",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

impl SamSection {
    fn validate(&self) -> Result<()> {
        self.sam_config_check()?;

        if let Some(name) = &self.session_name {
            SessionName::new(name.clone())
                .map_err(|e| RelayError::config_invalid("sam.session_name", e.to_string()))?;
        }

        SessionOptions::parse(&self.options)
            .map_err(|e| RelayError::config_invalid("sam.options", e.to_string()))?;

        Ok(())
    }

    fn sam_config_check(&self) -> Result<()> {
        SamConfig::new(&self.address)
            .with_versions(&self.min_version, &self.max_version)
            .with_reply_timeout(Duration::from_secs(self.reply_timeout_secs))
            .validate()
            .map_err(|e| RelayError::config_invalid("sam", e.to_string()))
    }
}

impl Default for SamSection {
    fn default() -> Self {
        Self {
            address: default_sam_address(),
            session_name: default_session_name(),
            min_version: default_min_version(),
            max_version: default_max_version(),
            reply_timeout_secs: default_reply_timeout(),
            signature_type: None,
            options: default_sam_options(),
        }
    }
}

// ============================================
// IdentitySection
// ============================================

/// Key material configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentitySection {
    /// Path to the key file.
    #[serde(default = "default_key_file")]
    pub key_file: String,
}

fn default_key_file() -> String {
    "/etc/veilink/veilink.key".to_string()
}

impl IdentitySection {
    fn validate(&self) -> Result<()> {
        if self.key_file.trim().is_empty() {
            return Err(RelayError::config_invalid(
                "identity.key_file",
                "cannot be empty",
            ));
        }
        Ok(())
    }
}

impl Default for IdentitySection {
    fn default() -> Self {
        Self {
            key_file: default_key_file(),
        }
    }
}

// ============================================
// NetworkSection
// ============================================

/// Address map configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSection {
    /// Path to the label → CIDR list document.
    #[serde(default = "default_address_map")]
    pub address_map: String,

    /// How inbound packets are checked against the map.
    #[serde(default)]
    pub filter_mode: FilterMode,
}

fn default_address_map() -> String {
    "/etc/veilink/network.json".to_string()
}

impl NetworkSection {
    fn validate(&self) -> Result<()> {
        if self.address_map.trim().is_empty() {
            return Err(RelayError::config_invalid(
                "network.address_map",
                "cannot be empty",
            ));
        }
        Ok(())
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            address_map: default_address_map(),
            filter_mode: FilterMode::default(),
        }
    }
}

// ============================================
// DeviceSection
// ============================================

/// Packet device configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSection {
    /// Device name.
    #[serde(default = "default_device_name")]
    pub name: String,

    /// MTU size.
    #[serde(default = "default_mtu")]
    pub mtu: u16,
}

fn default_device_name() -> String {
    "veil0".to_string()
}

fn default_mtu() -> u16 {
    1280
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            name: default_device_name(),
            mtu: default_mtu(),
        }
    }
}

// ============================================
// RelaySection
// ============================================

/// Relay core tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySection {
    /// Capacity of every queue between relay tasks.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Bound on a single destination lookup, in seconds.
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,

    /// How long a failed lookup is remembered, in seconds.
    #[serde(default = "default_negative_ttl")]
    pub negative_ttl_secs: u64,

    /// Packets held per destination while its lookup is in flight.
    #[serde(default = "default_pending_per_destination")]
    pub pending_per_destination: usize,

    /// Lookups allowed in flight at once.
    #[serde(default = "default_max_concurrent_lookups")]
    pub max_concurrent_lookups: usize,

    /// Keep-alive interval, in seconds.
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,

    /// Delay between device read retries, in milliseconds.
    #[serde(default = "default_device_retry_backoff")]
    pub device_retry_backoff_ms: u64,

    /// Consecutive device read failures tolerated.
    #[serde(default = "default_device_retry_limit")]
    pub device_retry_limit: u32,

    /// Minimum delay before re-requesting a refused tunnel, in seconds.
    #[serde(default = "default_tunnel_retry")]
    pub tunnel_retry_secs: u64,
}

fn default_queue_capacity() -> usize {
    256
}

fn default_lookup_timeout() -> u64 {
    30
}

fn default_negative_ttl() -> u64 {
    60
}

fn default_pending_per_destination() -> usize {
    8
}

fn default_max_concurrent_lookups() -> usize {
    4
}

fn default_keepalive_interval() -> u64 {
    30
}

fn default_device_retry_backoff() -> u64 {
    500
}

fn default_device_retry_limit() -> u32 {
    10
}

fn default_tunnel_retry() -> u64 {
    30
}

impl RelaySection {
    fn validate(&self) -> Result<()> {
        let positive = [
            ("relay.queue_capacity", self.queue_capacity as u64),
            ("relay.lookup_timeout_secs", self.lookup_timeout_secs),
            ("relay.pending_per_destination", self.pending_per_destination as u64),
            ("relay.max_concurrent_lookups", self.max_concurrent_lookups as u64),
            ("relay.keepalive_interval_secs", self.keepalive_interval_secs),
        ];

        for (field, value) in positive {
            if value == 0 {
                return Err(RelayError::config_invalid(field, "must be greater than 0"));
            }
        }

        if self.pending_per_destination > self.queue_capacity {
            return Err(RelayError::config_invalid(
                "relay.pending_per_destination",
                "cannot exceed relay.queue_capacity",
            ));
        }

        Ok(())
    }
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            lookup_timeout_secs: default_lookup_timeout(),
            negative_ttl_secs: default_negative_ttl(),
            pending_per_destination: default_pending_per_destination(),
            max_concurrent_lookups: default_max_concurrent_lookups(),
            keepalive_interval_secs: default_keepalive_interval(),
            device_retry_backoff_ms: default_device_retry_backoff(),
            device_retry_limit: default_device_retry_limit(),
            tunnel_retry_secs: default_tunnel_retry(),
        }
    }
}

// ============================================
// LoggingSection
// ============================================

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ============================================
// Tests
// ============================================
