use std::net::{IpAddr, Ipv4Addr};
use std::ops::RangeInclusive;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT_RANGE_START: u16 = 50000;
pub const DEFAULT_PORT_RANGE_END: u16 = 50100;
pub const DEFAULT_RENDEZVOUS_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_DISCOVERY_SERVER: &str = "stun.l.google.com:19302";
pub const DEFAULT_TICK_RATE: u32 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    pub bind_ip: IpAddr,
    pub port_range_start: u16,
    pub port_range_end: u16,
    pub rendezvous_addr: String,
    pub rendezvous_timeout_ms: u64,
    pub discovery_server: String,
    pub discovery_timeout_ms: u64,
    pub discovery_attempts: u32,
    pub resend_interval_ms: u64,
    pub reliable_timeout_ms: u64,
    pub liveness_timeout_ms: u64,
    pub punch_interval_ms: u64,
    pub punch_timeout_ms: u64,
    /// Drop datagrams whose source is not the configured peer.
    pub pin_peer_address: bool,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port_range_start: DEFAULT_PORT_RANGE_START,
            port_range_end: DEFAULT_PORT_RANGE_END,
            rendezvous_addr: DEFAULT_RENDEZVOUS_ADDR.to_string(),
            rendezvous_timeout_ms: 3000,
            discovery_server: DEFAULT_DISCOVERY_SERVER.to_string(),
            discovery_timeout_ms: 1000,
            discovery_attempts: 3,
            resend_interval_ms: 500,
            reliable_timeout_ms: 5000,
            liveness_timeout_ms: 5000,
            punch_interval_ms: 200,
            punch_timeout_ms: 10_000,
            pin_peer_address: true,
        }
    }
}

impl NetConfig {
    pub fn port_range(&self) -> RangeInclusive<u16> {
        self.port_range_start..=self.port_range_end
    }

    pub fn rendezvous_timeout(&self) -> Duration {
        Duration::from_millis(self.rendezvous_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn resend_interval(&self) -> Duration {
        Duration::from_millis(self.resend_interval_ms)
    }

    pub fn reliable_timeout(&self) -> Duration {
        Duration::from_millis(self.reliable_timeout_ms)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn punch_interval(&self) -> Duration {
        Duration::from_millis(self.punch_interval_ms)
    }

    pub fn punch_timeout(&self) -> Duration {
        Duration::from_millis(self.punch_timeout_ms)
    }
}
