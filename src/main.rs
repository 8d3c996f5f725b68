use std::path::PathBuf;

use clap::Parser;
use signal_relay::config::RelayConfig;
use signal_relay::relay::RelayServer;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// WebRTC signaling relay
#[derive(Parser, Debug)]
#[command(name = "signal-relay")]
#[command(about = "Relays WebRTC signaling messages between all connected peers", long_about = None)]
struct Args {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file
    #[arg(long)]
    bind: Option<String>,

    /// WebSocket endpoint path, overrides the config file
    #[arg(long)]
    path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("signal_relay=info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => RelayConfig::load(path)?,
        None => RelayConfig::default(),
    }
    .with_overrides(args.bind, args.path);
    config.validate()?;

    println!("   Signal Relay");
    println!("   Binding to ws://{}{}", config.bind_addr, config.path);
    println!("   Press Ctrl+C to stop\n");

    let server = RelayServer::bind(config).await?;
    server
        .run_until(async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("Signal relay stopped");
    Ok(())
}
