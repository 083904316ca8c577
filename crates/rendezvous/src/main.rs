use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use brawlnet_rendezvous::{DEFAULT_PORT, RendezvousConfig, RendezvousServer};

#[derive(Parser)]
#[command(name = "rendezvous")]
#[command(about = "Room-code rendezvous service for peer matches")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(long, default_value_t = 180, help = "Seconds before a room code expires")]
    expiry: u64,

    #[arg(long, default_value_t = 3600, help = "Seconds before an unjoined room is swept")]
    max_age: u64,

    #[arg(long, default_value_t = 60, help = "Seconds between sweeps")]
    sweep_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let bind_addr: SocketAddr = format!("{}:{}", args.bind, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.bind, args.port))?;

    let config = RendezvousConfig {
        bind_addr,
        soft_expiry: Duration::from_secs(args.expiry),
        hard_expiry: Duration::from_secs(args.max_age),
        sweep_interval: Duration::from_secs(args.sweep_interval),
        ..Default::default()
    };

    let server = Arc::new(RendezvousServer::new(config));
    let running = Arc::clone(&server);
    let handle = tokio::spawn(async move { running.run().await });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for ctrl-c")?;
            server.shutdown();
        }
        result = handle => {
            result.context("server task panicked")??;
        }
    }

    log::info!("Rendezvous stopped");
    Ok(())
}
