//! tvbridge binary entrypoint.

use std::net::IpAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tvbridge::config::BridgeConfig;
use tvbridge::provider::simulator::SimulatorProvider;
use tvbridge::registry::DeviceRegistry;
use tvbridge::server::BridgeServer;

#[derive(Parser, Debug)]
#[command(name = "tvbridge")]
#[command(about = "HTTP bridge for pairing and controlling Android TV devices")]
#[command(version)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "TVBRIDGE_PORT")]
    port: Option<u16>,

    /// Address to bind the listener to
    #[arg(long, env = "TVBRIDGE_BIND")]
    bind: Option<IpAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tvbridge=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = BridgeConfig::from_env()?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }

    // Sessions come from the in-process simulator; a real TV transport
    // implements RemoteSessionProvider and enters through the library API.
    let provider = Arc::new(SimulatorProvider::new());
    let registry = DeviceRegistry::new(config.clone(), provider);

    let mut server = BridgeServer::new(config.addr(), registry.clone());
    server.start().await?;

    tracing::info!(
        addr = %config.addr(),
        "tvbridge running; POST /pair/start, /pair/complete, /connect, \
         /disconnect, /unpair, /key, /app/launch, /text; \
         GET /status/{{deviceId}}, /health, /devices"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    server.shutdown().await;
    registry.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
