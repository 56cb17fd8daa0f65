//! glimpse-device: entry point.
//!
//! ```text
//! glimpse-device                     Run with the default config
//! glimpse-device --config <path>     Load a custom config TOML
//! glimpse-device --image test.jpg    Send a fixed image instead of the camera
//! glimpse-device --no-stdin          Headless: no trigger commands on stdin
//! glimpse-device --gen-config        Write default config to stdout
//! ```
//!
//! Lines on stdin act as the mode button: `toggle`, `capture`, a mode
//! name such as `DESCRIBE`, or `quit`.

use std::path::PathBuf;

use clap::Parser;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use glimpse_core::ModeController;
use glimpse_device::announce::spawn_announcer;
use glimpse_device::auto::spawn_auto_capture;
use glimpse_device::config::DeviceConfig;
use glimpse_device::device::Device;
use glimpse_device::session::{CaptureSession, Strategy};
use glimpse_device::trigger::{LineTrigger, spawn_trigger};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "glimpse-device", about = "glimpse capture device")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "glimpse-device.toml")]
    config: PathBuf,

    /// Server host, overriding the config.
    #[arg(long)]
    host: Option<String>,

    /// Server port, overriding the config.
    #[arg(short, long)]
    port: Option<u16>,

    /// Send this image file on every capture.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Keep one connection open for the whole run.
    #[arg(long)]
    persistent: bool,

    /// Ignore stdin; run until Ctrl-C.
    #[arg(long)]
    no_stdin: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&DeviceConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = DeviceConfig::load(&cli.config);
    if let Some(host) = cli.host {
        config.network.host = host;
    }
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    if let Some(image) = cli.image {
        config.capture.file = image.display().to_string();
    }
    if cli.persistent {
        config.session.strategy = Strategy::Persistent;
    }
    if cli.no_stdin {
        config.trigger.stdin = false;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("glimpse-device v{}", env!("CARGO_PKG_VERSION"));
    info!("server: {}", config.server());
    info!("strategy: {:?}", config.session.strategy);
    info!("initial mode: {}", config.session.initial_mode);

    let controller = ModeController::new(config.session.initial_mode);
    let (events_tx, events_rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();

    if config.trigger.stdin {
        spawn_trigger(
            LineTrigger::new(BufReader::new(tokio::io::stdin())),
            controller.clone(),
            events_tx.clone(),
            config.trigger.capture_on_toggle,
        );
    }

    if let Some(announcer) = config.announcer() {
        spawn_announcer(announcer, controller.clone(), shutdown.clone());
    }

    if let Some((mode, period)) = config.auto_capture() {
        spawn_auto_capture(controller.clone(), mode, period, events_tx.clone(), shutdown.clone());
    } else if !config.trigger.stdin {
        warn!("no stdin trigger and no auto-capture; nothing will be captured");
    }
    // Held open so a device without any producer still waits for Ctrl-C.
    let _idle = events_tx;

    let stop = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.cancel();
    });

    let session = CaptureSession::new(
        config.session_options(),
        controller,
        config.capture_provider(),
        config.playback_sink(),
    );
    Device::new(session, events_rx, shutdown).run().await;

    // The stdin reader sits on a blocking thread the runtime would wait for.
    std::process::exit(0);
}
