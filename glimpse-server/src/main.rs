//! glimpse-server: entry point.
//!
//! ```text
//! glimpse-server                  Listen with the default config
//! glimpse-server --config <path>  Load a custom config TOML
//! glimpse-server --port 9000      Override the listen port
//! glimpse-server --gen-config     Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use glimpse_core::Mode;
use glimpse_server::config::ServerConfig;
use glimpse_server::dispatch::DispatchServer;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "glimpse-server", about = "glimpse processing server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "glimpse-server.toml")]
    config: PathBuf,

    /// Address to bind, overriding the config.
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on, overriding the config.
    #[arg(short, long)]
    port: Option<u16>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ServerConfig::example())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ServerConfig::load(&cli.config);
    if let Some(bind) = cli.bind {
        config.network.bind = bind;
    }
    if let Some(port) = cli.port {
        config.network.port = port;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("glimpse-server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "tag set: {:?} (accept other: {})",
        config.protocol.tag_set, config.protocol.accept_legacy
    );

    let registry = config.registry()?;
    for mode in Mode::ALL {
        match registry.get(mode) {
            Some(_) => info!("handler registered for {mode}"),
            None => warn!("no handler for {mode}; its requests get no result"),
        }
    }
    if !config.archive.dir.is_empty() {
        info!("archiving exchanges to {}", config.archive.dir);
    }

    let server =
        DispatchServer::bind(&config.bind_addr(), registry, config.dispatch_options()).await?;
    let stop = server.shutdown_token();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.cancel();
    });

    server.run().await?;

    Ok(())
}
