//! AwareLink node entry point.
//!
//! # Usage
//!
//! ```text
//! awarelink [--config <PATH>] <COMMAND>
//!
//! Commands:
//!   demo     Run a publisher and a subscriber over the in-memory medium,
//!            bring the link up, exchange one message and disconnect
//!   config   Print the effective configuration (optionally save it)
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable            | Description                                    |
//! |---------------------|------------------------------------------------|
//! | `AWARELINK_CONFIG`  | Config file path (same as `--config`)          |
//! | `RUST_LOG`          | Overrides the config file's `node.log_level`   |
//!
//! # What the demo shows
//!
//! ```text
//! subscriber                     medium                      publisher
//!     │  discoverWifiDevices       │    advertiseCommanderService │
//!     │ ──── PeerDiscovered ◄──────┤                              │
//!     │ ──── INIT_CONNECT ─────────┼────────────────────────────► │ open port
//!     │ ◄─── COMPLETE_CONNECT ─────┼──────────────────────────────│
//!     │ ◄──────── network available on both sides ──────────────► │
//!     │  onConnect                 │                     onConnect│
//!     │ ──── sendMsg ──────────────┼──────────► receivedMessage   │
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use awarelink_core::{MachineSettings, Notification};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use awarelink_node::application::ports::{event_channel, LinkPorts, ListenerFactory};
use awarelink_node::infrastructure::listener::TcpListenerFactory;
use awarelink_node::infrastructure::runtime::{spawn_link, LinkHandle};
use awarelink_node::infrastructure::sim::{SimMedium, SimPermissions};
use awarelink_node::infrastructure::storage::config::{
    config_file_path, load_config, load_config_from, save_config_to, AwareLinkConfig,
};
use awarelink_node::infrastructure::ui_bridge::{
    handle_method_call, MethodCall, MethodInvocation, METHOD_ADVERTISE, METHOD_DISCONNECT,
    METHOD_DISCOVER, METHOD_SEND,
};

/// Upper bound for each demo step (attach, connect, deliver).
const STEP_TIMEOUT: Duration = Duration::from_secs(10);

// ── CLI argument definitions ──────────────────────────────────────────────────

/// AwareLink discovery and link negotiation node.
#[derive(Debug, Parser)]
#[command(
    name = "awarelink",
    about = "Peer discovery and point-to-point link negotiation",
    version
)]
struct Cli {
    /// Path to the TOML config file.
    ///
    /// Defaults to the platform config directory
    /// (e.g. `~/.config/awarelink/config.toml` on Linux).
    #[arg(long, global = true, env = "AWARELINK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect two simulated nodes and exchange a message.
    Demo {
        /// Text the subscriber sends once the link is up.
        #[arg(long, default_value = "hello from the subscriber")]
        message: String,
    },
    /// Print the effective configuration as TOML.
    Config {
        /// Also write it back to the config file.
        #[arg(long)]
        save: bool,
    },
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<AwareLinkConfig> {
        let config = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => load_config().context("failed to load config")?,
        };
        Ok(config)
    }

    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Ok(config_file_path()?),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    // RUST_LOG wins over the config file's level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.node.log_level)),
        )
        .init();

    match &cli.command {
        Command::Demo { message } => run_demo(&config, message.clone()).await,
        Command::Config { save } => {
            print!("{}", toml::to_string_pretty(&config)?);
            if *save {
                let path = cli.config_path()?;
                save_config_to(&config, &path)?;
                info!(path = %path.display(), "configuration saved");
            }
            Ok(())
        }
    }
}

// ── Demo ──────────────────────────────────────────────────────────────────────

async fn run_demo(config: &AwareLinkConfig, message: String) -> anyhow::Result<()> {
    let settings = config.machine_settings();
    let listen = config.listen_address()?;
    info!(
        node = %config.node.name,
        service = %settings.service_name,
        "AwareLink demo starting"
    );

    let medium = SimMedium::new();
    let (publisher, mut publisher_rx) = start_node(
        &medium,
        settings.clone(),
        Arc::new(TcpListenerFactory::new(listen)),
    );
    let (subscriber, mut subscriber_rx) = start_node(
        &medium,
        settings,
        Arc::new(TcpListenerFactory::new(listen)),
    );

    wait_attached(&publisher).await?;
    wait_attached(&subscriber).await?;

    call(&publisher, MethodCall::new(METHOD_ADVERTISE)).await?;
    call(&subscriber, MethodCall::new(METHOD_DISCOVER)).await?;

    wait_for(&mut publisher_rx, "onConnect", "publisher").await?;
    wait_for(&mut subscriber_rx, "onConnect", "subscriber").await?;
    if let Ok(snapshot) = publisher.snapshot().await {
        info!(port = ?snapshot.listener_port, "publisher listening");
    }

    call(
        &subscriber,
        MethodCall::with_arguments(METHOD_SEND, Value::String(message)),
    )
    .await?;
    let received = wait_for(&mut publisher_rx, "receivedMessage", "publisher").await?;
    println!("{}", received.to_json()?);

    call(&subscriber, MethodCall::new(METHOD_DISCONNECT)).await?;
    wait_for(&mut publisher_rx, "onDisconnect", "publisher").await?;

    info!("AwareLink demo finished");
    Ok(())
}

fn start_node(
    medium: &SimMedium,
    settings: MachineSettings,
    listener: Arc<dyn ListenerFactory>,
) -> (LinkHandle, UnboundedReceiver<Notification>) {
    let (events, events_rx) = event_channel();
    let (radio, network) = medium.radio(events);
    let ports = LinkPorts {
        discovery: Arc::new(radio),
        network: Arc::new(network),
        permissions: Arc::new(SimPermissions::default()),
        listener,
    };
    spawn_link(settings, ports, events_rx)
}

async fn wait_attached(handle: &LinkHandle) -> anyhow::Result<()> {
    handle.attach().await?;
    timeout(STEP_TIMEOUT, async {
        while !handle.snapshot().await?.attached {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        anyhow::Ok(())
    })
    .await
    .context("timed out waiting for attachment")?
}

async fn call(handle: &LinkHandle, call: MethodCall) -> anyhow::Result<()> {
    let method = call.method.clone();
    let result = handle_method_call(handle, call).await;
    if let Some(error) = result.error {
        bail!("{method} failed: {} ({})", error.message, error.code);
    }
    Ok(())
}

/// Reads notifications until one maps to `method`, logging the rest.
async fn wait_for(
    notifications: &mut UnboundedReceiver<Notification>,
    method: &str,
    node: &str,
) -> anyhow::Result<MethodInvocation> {
    let found = timeout(STEP_TIMEOUT, async {
        while let Some(notification) = notifications.recv().await {
            let invocation = MethodInvocation::from(notification);
            info!(node, method = invocation.method, arguments = ?invocation.arguments, "invocation");
            if invocation.method == method {
                return Some(invocation);
            }
            if invocation.method == "onError" {
                warn!(node, "link reported an error while waiting for {method}");
            }
        }
        None
    })
    .await
    .with_context(|| format!("timed out waiting for {method} on the {node}"))?;

    found.with_context(|| format!("{node} link stopped before {method}"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
