use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use brawlnet::rendezvous::{ErrorReason, Request, Response, RoomCode};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::RendezvousConfig;

#[derive(Debug, Clone)]
pub struct Room {
    pub code: RoomCode,
    pub endpoint: SocketAddr,
    pub created_at: Instant,
}

impl Room {
    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }
}

/// In-memory map of room codes to host endpoints. Nothing is persisted.
pub struct RoomRegistry {
    rooms: HashMap<RoomCode, Room>,
    soft_expiry: Duration,
    hard_expiry: Duration,
    rng: StdRng,
}

impl RoomRegistry {
    pub fn new(soft_expiry: Duration, hard_expiry: Duration) -> Self {
        Self {
            rooms: HashMap::new(),
            soft_expiry,
            hard_expiry,
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn from_config(config: &RendezvousConfig) -> Self {
        Self::new(config.soft_expiry, config.hard_expiry)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Registers `endpoint` under a code no live room is using.
    pub fn host(&mut self, endpoint: SocketAddr, now: Instant) -> RoomCode {
        let code = loop {
            let candidate = RoomCode::generate(&mut self.rng);
            if !self.rooms.contains_key(&candidate) {
                break candidate;
            }
            log::debug!("Room code {} already taken, regenerating", candidate);
        };

        log::info!("Room {} created for {}", code, endpoint);
        self.rooms.insert(
            code.clone(),
            Room {
                code: code.clone(),
                endpoint,
                created_at: now,
            },
        );
        code
    }

    pub fn join(&mut self, code: &str, now: Instant) -> Response {
        let Ok(code) = RoomCode::parse(code) else {
            return Response::Error(ErrorReason::Invalid);
        };

        let Some(room) = self.rooms.get(&code) else {
            log::info!("Join for unknown room {}", code);
            return Response::Error(ErrorReason::Invalid);
        };

        if room.age(now) > self.soft_expiry {
            log::info!("Room {} expired after {:?}", code, room.age(now));
            self.rooms.remove(&code);
            return Response::Error(ErrorReason::Expired);
        }

        log::info!("Room {} joined, host at {}", code, room.endpoint);
        Response::Addr(room.endpoint)
    }

    /// Answers one request. `source_ip` is the address the connection came
    /// from; hosts are registered under it, never under a claimed address.
    pub fn handle(&mut self, request: Request, source_ip: IpAddr, now: Instant) -> Response {
        match request {
            Request::Host { port } => {
                Response::Code(self.host(SocketAddr::new(source_ip, port), now))
            }
            Request::Join { code } => self.join(&code, now),
        }
    }

    /// Deletes every room past the hard ceiling. Returns how many went.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let hard_expiry = self.hard_expiry;
        let before = self.rooms.len();
        self.rooms.retain(|_, room| room.age(now) <= hard_expiry);

        let removed = before - self.rooms.len();
        if removed > 0 {
            log::info!("Swept {} abandoned rooms, {} remain", removed, self.rooms.len());
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> RoomRegistry {
        RoomRegistry::from_config(&RendezvousConfig::default())
    }

    fn host_endpoint() -> SocketAddr {
        "203.0.113.5:50000".parse().unwrap()
    }

    #[test]
    fn test_join_returns_host_address() {
        let mut registry = registry();
        let now = Instant::now();

        let response = registry.handle(
            Request::Host { port: 50000 },
            host_endpoint().ip(),
            now,
        );
        let Response::Code(code) = response else {
            panic!("Expected a code, got {:?}", response);
        };

        let response = registry.join(code.as_str(), now + Duration::from_secs(10));
        assert_eq!(response.to_string(), "ADDR 203.0.113.5 50000");
    }

    #[test]
    fn test_join_is_case_insensitive() {
        let mut registry = registry();
        let now = Instant::now();
        let code = registry.host(host_endpoint(), now);

        let lower = code.as_str().to_ascii_lowercase();
        assert_eq!(registry.join(&lower, now), Response::Addr(host_endpoint()));
    }

    #[test]
    fn test_unknown_code_is_invalid() {
        let mut registry = registry();
        let response = registry.join("ZZ9999", Instant::now());
        assert_eq!(response.to_string(), "ERR INVALID");
        assert_eq!(
            registry.join("not a code", Instant::now()),
            Response::Error(ErrorReason::Invalid)
        );
    }

    #[test]
    fn test_soft_expiry_removes_room() {
        let mut registry = registry();
        let now = Instant::now();
        let code = registry.host(host_endpoint(), now);

        assert_eq!(
            registry.join(code.as_str(), now + Duration::from_secs(179)),
            Response::Addr(host_endpoint())
        );
        assert_eq!(
            registry.join(code.as_str(), now + Duration::from_secs(181)),
            Response::Error(ErrorReason::Expired)
        );
        assert_eq!(
            registry.join(code.as_str(), now + Duration::from_secs(182)),
            Response::Error(ErrorReason::Invalid)
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sweep_removes_only_abandoned_rooms() {
        let mut registry = registry();
        let now = Instant::now();
        registry.host(host_endpoint(), now);
        registry.host(host_endpoint(), now + Duration::from_secs(1800));

        assert_eq!(registry.sweep(now + Duration::from_secs(3000)), 0);
        assert_eq!(registry.sweep(now + Duration::from_secs(3601)), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_colliding_code_is_regenerated() {
        let mut registry = registry();
        let now = Instant::now();

        registry.rng = StdRng::seed_from_u64(42);
        let first = registry.host(host_endpoint(), now);

        registry.rng = StdRng::seed_from_u64(42);
        let second = registry.host(host_endpoint(), now);

        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
    }
}
