use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct RendezvousConfig {
    pub bind_addr: SocketAddr,
    /// A join after this age answers `ERR EXPIRED` and deletes the room.
    pub soft_expiry: Duration,
    /// The sweeper deletes rooms older than this whether joined or not.
    pub hard_expiry: Duration,
    pub sweep_interval: Duration,
    pub read_timeout: Duration,
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            soft_expiry: Duration::from_secs(180),
            hard_expiry: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            read_timeout: Duration::from_secs(5),
        }
    }
}
