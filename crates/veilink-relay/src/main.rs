// ============================================
// File: crates/veilink-relay/src/main.rs
// ============================================
//! # Veilink Entry Point
//!
//! ## Creation Reason
//! Operator tooling around the relay library: key generation through the
//! router, name lookups, and configuration checks.
//!
//! ## Main Functionality
//! - CLI argument parsing with clap
//! - Logging initialization with tracing
//! - Configuration and address map loading
//! - Key file management
//!
//! ## Usage
//! ```bash
//! # Step 1: Write a default config
//! veilink init
//!
//! # Step 2: Create our destination through the router
//! veilink keygen
//!
//! # Other commands
//! veilink dest                # Show our long form and label
//! veilink lookup <name>       # Resolve a name through the router
//! veilink validate            # Validate config and address map
//! veilink check               # Open and close a datagram session
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The packet device backend is platform specific and lives outside
//!   this binary; embedders construct `Relay` themselves
//! - The key file holds private material; it is written with mode 0600
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use veilink_relay::services::{AddressMap, KeyStore};
use veilink_relay::RelayConfig;
use veilink_transport::ControlClient;

const DEFAULT_CONFIG: &str = "/etc/veilink/veilink.toml";

// ============================================
// CLI Definition
// ============================================

/// Veilink packet relay tooling
///
/// Quick Start:
///   1. Run: veilink init
///   2. Run: veilink keygen
///   3. Share the label from `veilink dest` with your peers
#[derive(Parser, Debug)]
#[command(name = "veilink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Generate a destination through the router and save the key file
    Keygen {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,

        /// Replace an existing key file
        #[arg(long)]
        force: bool,
    },

    /// Show the long form and label of our destination
    Dest {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },

    /// Resolve a name, label or long-form destination
    Lookup {
        /// Name to resolve
        name: String,

        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },

    /// Validate configuration file and address map
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },

    /// Open a datagram session with our key, then close it
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging("info");

    // Execute command
    let result = match cli.command {
        Commands::Init { config, force } => cmd_init(&config, force).await,
        Commands::Keygen { config, force } => cmd_keygen(&config, force).await,
        Commands::Dest { config } => cmd_dest(&config).await,
        Commands::Lookup { name, config } => cmd_lookup(&name, &config).await,
        Commands::Validate { config } => cmd_validate(&config).await,
        Commands::Check { config } => cmd_check(&config).await,
    };

    // Handle errors
    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

// ============================================
// Commands
// ============================================

/// Writes the default configuration.
async fn cmd_init(config_path: &Path, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        println!("⚠️  Config file already exists: {}", config_path.display());
        println!("   Use --force to overwrite.");
        return Ok(());
    }

    if let Some(parent) = config_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(config_path, RelayConfig::default_toml()?).await?;

    println!("✅ Configuration written to {}", config_path.display());
    println!();
    println!("Next: veilink keygen --config {}", config_path.display());
    Ok(())
}

/// Creates keys through the router and saves them.
async fn cmd_keygen(config_path: &Path, force: bool) -> anyhow::Result<()> {
    let config = load_or_default_config(config_path).await?;
    let store = KeyStore::new(&config.identity.key_file);

    if store.exists() && !force {
        let keypair = store.load().await?;
        println!("⚠️  Key file already exists: {}", store.path().display());
        println!();
        println!("   Label:  {}", keypair.identity().label());
        println!();
        println!("Use --force to replace it. Peers will no longer reach the old label.");
        return Ok(());
    }

    info!("Asking router at {} for a new destination...", config.sam.address);
    let client = ControlClient::new(config.sam_config());
    let keypair = client.create_keys().await?;
    store.save(&keypair).await?;

    println!("✅ Key pair saved to {}", store.path().display());
    println!();
    println!("════════════════════════════════════════");
    println!("   Label:  {}", keypair.identity().label());
    println!("════════════════════════════════════════");
    Ok(())
}

/// Prints our destination.
async fn cmd_dest(config_path: &Path) -> anyhow::Result<()> {
    let config = load_or_default_config(config_path).await?;
    let store = KeyStore::new(&config.identity.key_file);

    if !store.exists() {
        println!("❌ Key file not found: {}", store.path().display());
        println!("   Run: veilink keygen");
        std::process::exit(1);
    }

    let keypair = store.load().await?;
    println!("{}", keypair.identity().to_base64());
    println!("{}", keypair.identity().label());
    Ok(())
}

/// Resolves a name through the router.
async fn cmd_lookup(name: &str, config_path: &Path) -> anyhow::Result<()> {
    let config = load_or_default_config(config_path).await?;
    let client = ControlClient::new(config.sam_config());

    match client.lookup(name).await {
        Ok(identity) => {
            println!("{}", identity.to_base64());
            println!("{}", identity.label());
            Ok(())
        }
        Err(e) => {
            println!("❌ Lookup of '{}' failed: {}", name, e);
            std::process::exit(1);
        }
    }
}

/// Validates configuration and address map.
async fn cmd_validate(config_path: &Path) -> anyhow::Result<()> {
    if !config_path.exists() {
        println!("⚠️  Config file not found: {}", config_path.display());
        println!("   Defaults would be used.");
        return Ok(());
    }

    let config = RelayConfig::load(config_path).await?;
    let map = AddressMap::load(&config.network.address_map).await?;
    let store = KeyStore::new(&config.identity.key_file);

    println!("✅ Configuration is valid");
    println!();
    println!("Router:");
    println!("   Address:    {}", config.sam.address);
    println!("   Versions:   {} - {}", config.sam.min_version, config.sam.max_version);
    println!();
    println!("Device:");
    println!("   Name:       {}", config.device.name);
    println!("   MTU:        {}", config.device.mtu);
    println!();
    println!("Address map:  {} range(s)", map.len());
    for label in map.labels() {
        let ranges: Vec<String> = map.ranges_for(label).iter().map(ToString::to_string).collect();
        println!("   {}  {}", label, ranges.join(", "));
    }
    println!();

    if store.exists() {
        match store.load().await {
            Ok(keypair) => {
                let label = keypair.identity().label();
                println!("Key:          ✅ {}", label);
                if !map.is_authorized(label) {
                    println!("              ⚠️  Our label has no ranges in the address map");
                }
            }
            Err(e) => println!("Key:          ⚠️  {}", e),
        }
    } else {
        println!("Key:          ❌ Missing ({})", store.path().display());
    }
    println!();

    Ok(())
}

/// Opens a datagram session and closes it again.
async fn cmd_check(config_path: &Path) -> anyhow::Result<()> {
    let config = load_or_default_config(config_path).await?;
    let keypair = KeyStore::new(&config.identity.key_file).load().await?;
    let client = ControlClient::new(config.sam_config());

    let version = client.handshake().await?;
    println!("✅ Router reachable, protocol {}", version);

    let session = client
        .create_datagram_session(config.session_name()?, keypair, &config.session_options()?)
        .await?;
    println!("✅ Datagram session '{}' open as {}", session.name(), session.identity().label());
    session.close().await?;

    Ok(())
}

// ============================================
// Helper Functions
// ============================================

/// Initializes the tracing subscriber.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}

/// Loads config, or defaults when the file does not exist.
async fn load_or_default_config(path: &Path) -> anyhow::Result<RelayConfig> {
    if path.exists() {
        Ok(RelayConfig::load(path).await?)
    } else {
        info!("Config file not found, using defaults");
        Ok(RelayConfig::default())
    }
}
