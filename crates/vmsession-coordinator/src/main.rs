//! Headless session coordinator entry point.
//!
//! Loads the configuration, starts the coordinator actor and logs every
//! published session change until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load AppConfig          -- --config <path> or the platform config dir
//!  └─ Coordinator::spawn()    -- actor task owning the Session
//!       ├─ DetachedEngine     (no engine attached; requests are logged)
//!       └─ ProcessHost        (power-down exits this process)
//!  └─ snapshot logger         -- watch::Receiver<SessionSnapshot>
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vmsession_coordinator::infrastructure::engine::{DetachedEngine, ProcessHost};
use vmsession_coordinator::infrastructure::storage::config::{load_config, load_config_from};
use vmsession_coordinator::Coordinator;

#[derive(Debug, Parser)]
#[command(name = "vmsession-coordinator", version, about = "VM session coordinator")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "VMSESSION_CONFIG")]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit.
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
    .context("failed to load configuration")?;

    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    // Structured logging.  `RUST_LOG` overrides the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.session.log_level)),
        )
        .init();

    info!("VM session coordinator starting");

    let (handle, actor) = Coordinator::spawn(
        config.to_coordinator_config(),
        Arc::new(DetachedEngine),
        Arc::new(ProcessHost),
    );

    // ── Snapshot logger ───────────────────────────────────────────────────────
    let mut updates = handle.subscribe();
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snap = updates.borrow_and_update().clone();
            info!(
                state = %snap.state,
                devices = snap.devices.len(),
                windows = snap.windows.len(),
                bindings = snap.bindings.len(),
                usb_busy = snap.usb_busy,
                fatal_error = ?snap.fatal_error,
                last_error = ?snap.last_error,
                "session updated"
            );
        }
    });

    info!("VM session coordinator ready.  Press Ctrl-C to exit.");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutdown signal received");

    handle.shutdown()?;
    actor.await?;

    info!("VM session coordinator stopped");
    Ok(())
}
