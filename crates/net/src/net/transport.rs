use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use crate::config::NetConfig;
use crate::discovery::StunClient;
use crate::error::NetError;

use super::protocol::{PACKET_SIZE, PUNCH_PROBE, Packet, PacketBody, sequence_greater_than};
use super::stats::NetworkStats;

const RECV_BUFFER_SIZE: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No peer endpoint known yet.
    Idle,
    /// Peer endpoint configured, nothing heard from it yet.
    Punching,
    Connected,
    /// Peer known but silent past the punch or liveness timeout.
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct PeerSession {
    pub local_port: u16,
    pub remote: Option<SocketAddr>,
    pub authoritative: bool,
    pub state: ConnectionState,
    pub last_received_at: Option<Instant>,
    pub punch_started_at: Option<Instant>,
    pub last_punch_at: Option<Instant>,
    pub local_sequence: u32,
    pub remote_sequence: u32,
}

impl PeerSession {
    fn new(local_port: u16) -> Self {
        Self {
            local_port,
            remote: None,
            authoritative: false,
            state: ConnectionState::Idle,
            last_received_at: None,
            punch_started_at: None,
            last_punch_at: None,
            local_sequence: 0,
            remote_sequence: 0,
        }
    }

    pub fn has_peer(&self) -> bool {
        self.remote.is_some()
    }
}

/// One non-blocking UDP endpoint talking to at most one peer.
///
/// The socket outlives sessions: [`PeerTransport::reset`] forgets the peer
/// but keeps the bound port so the next match can reuse it.
pub struct PeerTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    public_addr: Option<SocketAddr>,
    session: PeerSession,
    stats: NetworkStats,
    recv_buffer: [u8; RECV_BUFFER_SIZE],
    liveness_timeout: Duration,
    punch_interval: Duration,
    punch_timeout: Duration,
    pin_peer_address: bool,
}

impl PeerTransport {
    pub fn bind<A: ToSocketAddrs>(addr: A, config: &NetConfig) -> Result<Self, NetError> {
        let socket = UdpSocket::bind(addr)?;
        Self::from_socket(socket, config)
    }

    /// Binds the first free port of the configured range.
    pub fn bind_in_range(config: &NetConfig) -> Result<Self, NetError> {
        for port in config.port_range() {
            match UdpSocket::bind((config.bind_ip, port)) {
                Ok(socket) => return Self::from_socket(socket, config),
                Err(e) => log::debug!("Port {} unavailable: {}", port, e),
            }
        }

        Err(NetError::NoFreePort {
            start: config.port_range_start,
            end: config.port_range_end,
        })
    }

    fn from_socket(socket: UdpSocket, config: &NetConfig) -> Result<Self, NetError> {
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;
        log::info!("Bound UDP endpoint on {}", local_addr);

        Ok(Self {
            socket,
            local_addr,
            public_addr: None,
            session: PeerSession::new(local_addr.port()),
            stats: NetworkStats::default(),
            recv_buffer: [0u8; RECV_BUFFER_SIZE],
            liveness_timeout: config.liveness_timeout(),
            punch_interval: config.punch_interval(),
            punch_timeout: config.punch_timeout(),
            pin_peer_address: config.pin_peer_address,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn public_addr(&self) -> Option<SocketAddr> {
        self.public_addr
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.session.remote
    }

    pub fn session(&self) -> &PeerSession {
        &self.session
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state
    }

    pub fn is_connected(&self) -> bool {
        self.session.state == ConnectionState::Connected
    }

    pub fn is_authoritative(&self) -> bool {
        self.session.authoritative
    }

    pub fn set_authoritative(&mut self, authoritative: bool) {
        self.session.authoritative = authoritative;
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut NetworkStats {
        &mut self.stats
    }

    /// Asks the discovery server for this socket's reflexive address.
    /// Failure is not fatal: the caller falls back to a manually entered address.
    pub fn discover_public(&mut self, client: &StunClient) -> Option<SocketAddr> {
        match client.discover(&self.socket) {
            Ok(addr) => {
                log::info!("Public endpoint is {}", addr);
                self.public_addr = Some(addr);
                Some(addr)
            }
            Err(e) => {
                log::warn!("Public endpoint discovery failed: {}", e);
                None
            }
        }
    }

    pub fn set_peer(&mut self, addr: SocketAddr) {
        log::info!("Peer endpoint set to {}", addr);
        self.session.remote = Some(addr);
        self.session.state = ConnectionState::Punching;
        self.session.punch_started_at = None;
        self.session.last_punch_at = None;
    }

    pub fn send_raw(&mut self, addr: SocketAddr, bytes: &[u8]) -> io::Result<usize> {
        let sent = self.socket.send_to(bytes, addr)?;
        self.stats.bytes_sent += sent as u64;
        Ok(sent)
    }

    pub fn send_punch(&mut self) -> Result<(), NetError> {
        self.punch(Instant::now())
    }

    fn punch(&mut self, now: Instant) -> Result<(), NetError> {
        let addr = self.session.remote.ok_or(NetError::NoPeer)?;
        self.send_raw(addr, &PUNCH_PROBE)?;
        self.stats.punches_sent += 1;
        self.session.last_punch_at = Some(now);
        Ok(())
    }

    /// Stamps the next sequence number and sends. Returns the packet as sent
    /// so callers needing retransmission can keep it.
    pub fn send(&mut self, body: PacketBody) -> Result<Packet, NetError> {
        if self.session.remote.is_none() {
            return Err(NetError::NoPeer);
        }

        let sequence = self.session.local_sequence;
        self.session.local_sequence = sequence.wrapping_add(1);

        let packet = Packet::new(sequence, body);
        self.transmit(&packet)?;
        Ok(packet)
    }

    /// Sends an already-stamped packet again, keeping its sequence.
    pub fn resend(&mut self, packet: &Packet) -> Result<(), NetError> {
        self.transmit(packet)?;
        self.stats.retransmissions += 1;
        Ok(())
    }

    fn transmit(&mut self, packet: &Packet) -> Result<(), NetError> {
        let addr = self.session.remote.ok_or(NetError::NoPeer)?;
        self.send_raw(addr, &packet.encode())?;
        self.stats.packets_sent += 1;
        Ok(())
    }

    /// Non-blocking poll for the next game packet. Punch probes, foreign and
    /// malformed datagrams are consumed here and never returned.
    pub fn receive(&mut self) -> Option<Packet> {
        loop {
            let (size, from) = match self.socket.recv_from(&mut self.recv_buffer) {
                Ok(received) => received,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return None,
                // ICMP unreachable from an earlier send; not fatal for UDP.
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => {
                    log::debug!("Receive failed: {}", e);
                    return None;
                }
            };

            self.stats.bytes_received += size as u64;

            if !self.accepts_source(from) {
                self.stats.datagrams_dropped += 1;
                continue;
            }

            let now = Instant::now();

            if self.recv_buffer[..size] == PUNCH_PROBE[..] {
                self.stats.punches_received += 1;
                if self.session.remote.is_none() {
                    self.latch(from, now);
                }
                self.touch(now);
                continue;
            }

            if self.session.remote.is_none() {
                self.stats.datagrams_dropped += 1;
                continue;
            }

            // Anything from the peer counts for liveness, even if unusable.
            self.touch(now);

            if size != PACKET_SIZE {
                self.stats.datagrams_dropped += 1;
                continue;
            }

            match Packet::decode(&self.recv_buffer[..size]) {
                Ok(packet) => {
                    self.stats.packets_received += 1;
                    if sequence_greater_than(packet.sequence, self.session.remote_sequence) {
                        self.session.remote_sequence = packet.sequence;
                    }
                    return Some(packet);
                }
                Err(e) => {
                    log::debug!("Dropping datagram from {}: {}", from, e);
                    self.stats.datagrams_dropped += 1;
                }
            }
        }
    }

    fn accepts_source(&self, from: SocketAddr) -> bool {
        match self.session.remote {
            Some(peer) => !self.pin_peer_address || peer == from,
            None => true,
        }
    }

    fn latch(&mut self, from: SocketAddr, now: Instant) {
        log::info!("Latched peer {} from punch", from);
        self.session.remote = Some(from);
        // Answer so the other side sees us before any game data flows.
        if let Err(e) = self.punch(now) {
            log::debug!("Punch reply to {} failed: {}", from, e);
        }
    }

    fn touch(&mut self, now: Instant) {
        if self.session.state != ConnectionState::Connected {
            log::info!("Connected to peer {:?}", self.session.remote);
        }
        self.session.state = ConnectionState::Connected;
        self.session.last_received_at = Some(now);
    }

    /// Re-sends punches while the peer has not answered and gives up after
    /// the punch timeout.
    pub fn maintain(&mut self, now: Instant) -> ConnectionState {
        if self.session.state != ConnectionState::Punching {
            return self.session.state;
        }

        let started = *self.session.punch_started_at.get_or_insert(now);
        if now.saturating_duration_since(started) > self.punch_timeout {
            log::warn!(
                "Peer {:?} never answered after {:?}",
                self.session.remote,
                self.punch_timeout
            );
            self.session.state = ConnectionState::TimedOut;
            return self.session.state;
        }

        let due = self
            .session
            .last_punch_at
            .is_none_or(|last| now.saturating_duration_since(last) >= self.punch_interval);
        if due {
            if let Err(e) = self.punch(now) {
                log::debug!("Punch failed: {}", e);
            }
        }

        self.session.state
    }

    /// Drops a connected session once nothing has arrived for the liveness
    /// timeout. Returns whether the peer is still considered connected.
    pub fn check_liveness(&mut self, now: Instant) -> bool {
        if self.session.state != ConnectionState::Connected {
            return false;
        }

        let silent = self
            .session
            .last_received_at
            .is_some_and(|last| now.saturating_duration_since(last) > self.liveness_timeout);
        if silent {
            log::warn!(
                "Peer {:?} silent for {:?}, disconnecting",
                self.session.remote,
                self.liveness_timeout
            );
            self.session.state = ConnectionState::TimedOut;
        }

        !silent
    }

    /// Forgets the peer and the role; the socket stays bound.
    pub fn reset(&mut self) {
        self.session = PeerSession::new(self.local_addr.port());
        self.stats = NetworkStats::default();
    }
}
