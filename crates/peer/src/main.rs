mod arena;
mod session;
mod tick;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use brawlnet::config::{
    DEFAULT_DISCOVERY_SERVER, DEFAULT_PORT_RANGE_END, DEFAULT_PORT_RANGE_START,
    DEFAULT_RENDEZVOUS_ADDR, DEFAULT_TICK_RATE,
};
use brawlnet::{
    MatchSync, NetConfig, NoopPortMapper, PeerTransport, RendezvousClient, Role, StunClient,
    spawn_port_mapping,
};
use session::SessionOptions;

#[derive(Parser)]
#[command(name = "peer")]
#[command(about = "Headless peer for two-player matches")]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[arg(long, default_value = DEFAULT_RENDEZVOUS_ADDR)]
    rendezvous: String,

    #[arg(long, default_value = DEFAULT_DISCOVERY_SERVER)]
    stun: String,

    #[arg(long, help = "Skip public endpoint discovery")]
    no_discovery: bool,

    #[arg(long, default_value_t = DEFAULT_PORT_RANGE_START)]
    port_start: u16,

    #[arg(long, default_value_t = DEFAULT_PORT_RANGE_END)]
    port_end: u16,

    #[arg(short, long, default_value_t = DEFAULT_TICK_RATE, value_parser = clap::value_parser!(u32).range(1..=240))]
    tick_rate: u32,

    #[arg(short, long, default_value = "player")]
    name: String,

    #[arg(long, default_value_t = 0)]
    variant: u8,

    #[arg(long, default_value_t = 30, help = "Match length in seconds")]
    match_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Register a room and wait for a joiner
    Host,
    /// Join a room by its code
    Join { code: String },
    /// Connect straight to a known endpoint
    Connect { addr: SocketAddr },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = NetConfig {
        port_range_start: args.port_start,
        port_range_end: args.port_end,
        rendezvous_addr: args.rendezvous.clone(),
        discovery_server: args.stun.clone(),
        ..Default::default()
    };

    let mut transport = PeerTransport::bind_in_range(&config).context("binding UDP endpoint")?;
    spawn_port_mapping(Arc::new(NoopPortMapper), transport.local_port());

    let public = if args.no_discovery {
        None
    } else {
        transport.discover_public(&StunClient::from_config(&config))
    };
    let rendezvous = RendezvousClient::from_config(&config);

    let role = match &args.command {
        Command::Host => {
            let port = public.map_or(transport.local_port(), |addr| addr.port());
            let code = rendezvous.host(port).context("registering room")?;
            log::info!("Room code {} (share it with the other player)", code);
            Role::Authoritative
        }
        Command::Join { code } => {
            let host = match rendezvous.join(code) {
                Ok(addr) => addr,
                Err(e) if e.is_retryable() => bail!("{}; ask the host for a fresh code", e),
                Err(e) => return Err(e).context("contacting rendezvous service"),
            };
            transport.set_peer(host);
            Role::Mirror
        }
        Command::Connect { addr } => {
            transport.set_peer(*addr);
            Role::Mirror
        }
    };

    let sync = MatchSync::from_config(transport, role, &config);
    let options = SessionOptions {
        tick_rate: args.tick_rate,
        name: args.name,
        variant: args.variant,
        countdown: 3,
        match_length: Duration::from_secs(args.match_secs),
        linger: Duration::from_secs(2),
    };

    session::run(sync, &options)
}
