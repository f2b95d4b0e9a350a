//! vigild: the Vigil watchdog daemon.
//!
//! Single binary that assembles:
//! - Health poller (peer watchdogs over HTTP)
//! - MQTT adapter (device heartbeats, readings, lifecycle events)
//! - Engine (liveness registry and debounce policies)
//! - Alert dispatcher (SMTP, webhook, or log)
//! - `/health` endpoint for the peers polling us
//!
//! # Usage
//!
//! ```text
//! vigild run --config /etc/vigil/vigil.toml
//! vigild check-config --config /etc/vigil/vigil.toml
//! ```

mod bus;
mod shutdown;

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use vigil_core::VigilConfig;
use vigil_engine::Engine;
use vigil_health::{HealthPoller, HttpProbe, health_router};
use vigil_notify::{AlertDispatcher, Renderer};
use vigil_router::Router;

const BUS_QUEUE: usize = 256;
const OUTCOME_QUEUE: usize = 64;

#[derive(Parser)]
#[command(name = "vigild", about = "Vigil watchdog daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the watchdog until SIGINT or SIGTERM.
    Run {
        /// Path to the TOML configuration.
        #[arg(long, default_value = "/etc/vigil/vigil.toml")]
        config: PathBuf,
    },
    /// Validate the configuration and print what would be watched.
    CheckConfig {
        #[arg(long, default_value = "/etc/vigil/vigil.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,vigild=debug,vigil=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => run(&config).await,
        Command::CheckConfig { config } => {
            let config = load(&config)?;
            build_router(&config)?;
            print!("{}", describe(&config));
            Ok(())
        }
    }
}

fn load(path: &Path) -> anyhow::Result<VigilConfig> {
    let config = VigilConfig::from_file(path)
        .with_context(|| format!("loading {}", path.display()))?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn build_router(config: &VigilConfig) -> anyhow::Result<Option<Router>> {
    let router = config
        .bus
        .as_ref()
        .map(|bus| Router::from_config(bus, &config.timeouts))
        .transpose()
        .context("compiling bus rules")?;
    Ok(router)
}

/// Human-readable summary of what the configuration watches.
fn describe(config: &VigilConfig) -> String {
    let hostname = config.resolve_hostname();
    let mut out = String::new();
    let _ = writeln!(out, "hostname: {hostname}");

    let poller = HealthPoller::from_config(&config.poller, &hostname, Arc::new(HttpProbe));
    let _ = writeln!(out, "polled hosts:");
    for host in poller.hosts() {
        let _ = writeln!(out, "  {host} ({})", config.poller.address_for(host));
    }

    match &config.bus {
        Some(bus) => {
            let _ = writeln!(out, "broker: {}:{}", bus.host, bus.port);
            let _ = writeln!(out, "subscriptions:");
            for topic in bus.subscriptions() {
                let _ = writeln!(out, "  {topic}");
            }
        }
        None => {
            let _ = writeln!(out, "broker: none");
        }
    }
    let _ = writeln!(out, "notify: {:?}", config.notify.backend);
    out
}

async fn run(path: &Path) -> anyhow::Result<()> {
    let config = load(path)?;
    let hostname = config.resolve_hostname();
    info!(%hostname, config = %path.display(), "Vigil watchdog starting");

    // ── Notification ───────────────────────────────────────────

    let notifier = vigil_notify::from_config(&config.notify)?;
    info!(backend = notifier.name(), "notifier initialized");
    let dispatcher = AlertDispatcher::new(notifier, Renderer::new(hostname.clone()));

    // ── Engine ─────────────────────────────────────────────────

    let router = build_router(&config)?;
    let (alert_tx, alert_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (bus_tx, bus_rx) = mpsc::channel(BUS_QUEUE);
    let (outcome_tx, outcome_rx) = mpsc::channel(OUTCOME_QUEUE);

    let mut engine = Engine::new(router, alert_tx, outbound_tx);
    if let Some(bus) = &config.bus {
        engine = engine.with_log_delay(bus.log_delay());
    }

    // ── Health poller ──────────────────────────────────────────

    let poller = HealthPoller::from_config(&config.poller, &hostname, Arc::new(HttpProbe));
    info!(hosts = ?poller.hosts(), "health poller initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    // The bus adapter is stopped separately, once the engine has cancelled
    // its timers.
    let (bus_stop_tx, bus_stop_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let dispatcher_handle = tokio::spawn(dispatcher.run(alert_rx));
    let engine_handle = tokio::spawn(engine.run(bus_rx, outcome_rx, shutdown_rx.clone()));
    let poller_handle = tokio::spawn(poller.run(outcome_tx, shutdown_rx.clone()));
    let bus_handle = match &config.bus {
        Some(bus) => {
            info!(broker = %format!("{}:{}", bus.host, bus.port), "bus adapter initialized");
            let adapter = bus::BusAdapter::new(bus);
            Some(tokio::spawn(adapter.run(bus_tx, outbound_rx, bus_stop_rx)))
        }
        None => {
            info!("no [bus] configured, device monitoring disabled");
            drop(bus_tx);
            None
        }
    };

    // ── Health endpoint ────────────────────────────────────────

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding health endpoint on {addr}"))?;
    info!(%addr, "health endpoint listening");

    let server = axum::serve(listener, health_router()).with_graceful_shutdown(async move {
        shutdown::wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });
    server.await?;

    // ── Orderly shutdown ───────────────────────────────────────

    if poller_handle.await.is_err() {
        warn!("health poller task panicked");
    }
    match engine_handle.await {
        Ok(stats) => info!(alerts = stats.alerts, "engine drained"),
        Err(e) => warn!(error = %e, "engine task panicked"),
    }
    let _ = bus_stop_tx.send(true);
    if let Some(handle) = bus_handle {
        if handle.await.is_err() {
            warn!("bus adapter task panicked");
        }
    }
    // The engine dropped its alert sender, so the dispatcher finishes
    // whatever is still queued and returns.
    match dispatcher_handle.await {
        Ok(delivered) => info!(delivered, "alert dispatcher drained"),
        Err(e) => warn!(error = %e, "alert dispatcher task panicked"),
    }

    info!("Vigil watchdog stopped");
    Ok(())
}
