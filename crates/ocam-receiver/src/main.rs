//! OCam receiver entry point.
//!
//! Loads the configuration, starts the three servers with the headless
//! collaborators, applies the configured camera settings and logs a status
//! line periodically until Ctrl-C.
//!
//! ```text
//! main()
//!  └─ load_config()              -- file, then CLI overrides
//!  └─ OcamSource::start()
//!       ├─ ocam-control thread   (settings replay, capability reports)
//!       ├─ ocam-video thread     (H.264 ingest)
//!       └─ ocam-audio thread     (AAC ingest)
//!  └─ status ticker / Ctrl-C
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ocam_receiver::infrastructure::diagnostics::headless_media;
use ocam_receiver::infrastructure::storage::config::{
    default_config_path, load_config, save_config,
};
use ocam_receiver::OcamSource;

/// Command-line arguments for the receiver.
///
/// Values given here override the configuration file.
#[derive(Debug, Parser)]
#[command(
    name = "ocam-receiver",
    about = "Receives video, audio and control traffic from the OCam phone app",
    version
)]
struct Args {
    /// Path of the TOML configuration file.
    ///
    /// Defaults to the platform config directory.
    #[arg(long, short, env = "OCAM_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind all three servers to.
    #[arg(long, env = "OCAM_BIND")]
    bind: Option<String>,

    /// Log filter used when `RUST_LOG` is unset (e.g. `info`, `debug`).
    #[arg(long, env = "OCAM_LOG_LEVEL")]
    log_level: Option<String>,

    /// Write the effective configuration to the config path and exit.
    #[arg(long)]
    write_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path().context("no config path given")?,
    };
    let mut cfg = load_config(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(bind) = args.bind {
        cfg.network.bind_address = bind;
    }
    if let Some(level) = args.log_level {
        cfg.receiver.log_level = level;
    }

    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.receiver.log_level)),
        )
        .init();

    if args.write_config {
        save_config(&config_path, &cfg)
            .with_context(|| format!("writing {}", config_path.display()))?;
        info!("configuration written to {}", config_path.display());
        return Ok(());
    }

    let options = cfg.source_options().context("invalid [network] section")?;
    let settings = cfg.camera.to_settings().context("invalid [camera] section")?;

    info!(
        video = %options.video_addr,
        control = %options.control_addr,
        audio = %options.audio_addr,
        "OCam receiver starting"
    );

    let mut source = OcamSource::new(options, headless_media());
    source.start();
    source.apply_settings(&settings);

    let mut ticker =
        tokio::time::interval(Duration::from_secs(cfg.receiver.status_interval_secs.max(1)));
    ticker.tick().await;

    info!("OCam receiver ready.  Press Ctrl-C to exit.");
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("listening for Ctrl-C")?;
                info!("shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                info!("status: {}", source.status());
            }
        }
    }

    // Joining the server threads blocks for up to one poll interval.
    tokio::task::spawn_blocking(move || source.stop())
        .await
        .context("joining receiver threads")?;

    info!("OCam receiver stopped");
    Ok(())
}
