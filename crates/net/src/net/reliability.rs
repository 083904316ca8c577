use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::NetConfig;
use crate::error::NetError;

use super::protocol::{Packet, PacketBody};
use super::tracking::DeliveredWindow;
use super::transport::PeerTransport;

#[derive(Debug, Clone)]
pub struct PendingReliable {
    pub packet: Packet,
    pub first_sent_at: Instant,
    pub last_sent_at: Instant,
}

/// Retransmits packets that need acknowledgement until the peer acks them
/// or they exceed the age ceiling, and suppresses duplicate deliveries on the
/// receiving side.
#[derive(Debug)]
pub struct ReliableChannel {
    pending: VecDeque<PendingReliable>,
    delivered: DeliveredWindow,
    resend_interval: Duration,
    max_age: Duration,
}

impl ReliableChannel {
    pub fn new(resend_interval: Duration, max_age: Duration) -> Self {
        Self {
            pending: VecDeque::new(),
            delivered: DeliveredWindow::default(),
            resend_interval,
            max_age,
        }
    }

    pub fn from_config(config: &NetConfig) -> Self {
        Self::new(config.resend_interval(), config.reliable_timeout())
    }

    /// Sends `body` and keeps it queued for retransmission. Returns the
    /// sequence the peer will acknowledge.
    pub fn send(
        &mut self,
        transport: &mut PeerTransport,
        body: PacketBody,
        now: Instant,
    ) -> Result<u32, NetError> {
        let packet = transport.send(body)?;
        let sequence = packet.sequence;

        self.pending.push_back(PendingReliable {
            packet,
            first_sent_at: now,
            last_sent_at: now,
        });

        Ok(sequence)
    }

    /// Drops entries older than the ceiling, then resends whatever has waited
    /// a full interval since its last transmission.
    pub fn update(&mut self, transport: &mut PeerTransport, now: Instant) {
        let max_age = self.max_age;
        let before = self.pending.len();
        self.pending.retain(|entry| {
            let expired = now.saturating_duration_since(entry.first_sent_at) > max_age;
            if expired {
                log::warn!(
                    "Giving up on reliable packet {} ({:?}) after {:?}",
                    entry.packet.sequence,
                    entry.packet.kind(),
                    max_age
                );
            }
            !expired
        });
        transport.stats_mut().reliable_dropped += (before - self.pending.len()) as u64;

        for entry in self.pending.iter_mut() {
            if now.saturating_duration_since(entry.last_sent_at) < self.resend_interval {
                continue;
            }
            match transport.resend(&entry.packet) {
                Ok(()) => entry.last_sent_at = now,
                Err(e) => log::debug!("Resend of {} failed: {}", entry.packet.sequence, e),
            }
        }
    }

    /// Filters an inbound packet. Acks are consumed, reliable packets are
    /// acknowledged on every receipt but handed on only the first time.
    pub fn on_receive(&mut self, transport: &mut PeerTransport, packet: Packet) -> Option<Packet> {
        if let PacketBody::Ack { sequence } = packet.body {
            self.acknowledge(sequence);
            return None;
        }

        if !packet.kind().requires_ack() {
            return Some(packet);
        }

        if let Err(e) = transport.send(PacketBody::Ack {
            sequence: packet.sequence,
        }) {
            log::debug!("Ack for {} failed: {}", packet.sequence, e);
        }

        if self.delivered.record(packet.sequence) {
            Some(packet)
        } else {
            log::debug!("Duplicate reliable packet {}", packet.sequence);
            None
        }
    }

    pub fn acknowledge(&mut self, sequence: u32) -> bool {
        let before = self.pending.len();
        self.pending.retain(|entry| entry.packet.sequence != sequence);
        before != self.pending.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.delivered.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::{ControlAction, ControlEvent, MatchPhase};
    use std::net::UdpSocket;

    fn channel() -> ReliableChannel {
        ReliableChannel::new(Duration::from_millis(500), Duration::from_millis(5000))
    }

    fn transport_to_sink() -> (PeerTransport, UdpSocket) {
        let sink = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut transport = PeerTransport::bind("127.0.0.1:0", &NetConfig::default()).unwrap();
        transport.set_peer(sink.local_addr().unwrap());
        (transport, sink)
    }

    fn start_event() -> PacketBody {
        PacketBody::Control(ControlEvent::new(ControlAction::Start, MatchPhase::Playing))
    }

    #[test]
    fn test_unacked_packet_is_resent_until_ceiling() {
        let (mut transport, _sink) = transport_to_sink();
        let mut channel = channel();
        let start = Instant::now();

        channel.send(&mut transport, start_event(), start).unwrap();

        for step in 1..=60 {
            channel.update(&mut transport, start + Duration::from_millis(step * 100));
        }

        assert_eq!(channel.pending_len(), 0);
        assert_eq!(transport.stats().retransmissions, 10);
        assert_eq!(transport.stats().packets_sent, 11);
        assert_eq!(transport.stats().reliable_dropped, 1);
    }

    #[test]
    fn test_ack_stops_retransmission() {
        let (mut transport, _sink) = transport_to_sink();
        let mut channel = channel();
        let start = Instant::now();

        let sequence = channel.send(&mut transport, start_event(), start).unwrap();
        assert_eq!(channel.pending_len(), 1);

        let ack = Packet::new(7, PacketBody::Ack { sequence });
        assert!(channel.on_receive(&mut transport, ack).is_none());
        assert_eq!(channel.pending_len(), 0);

        channel.update(&mut transport, start + Duration::from_millis(1000));
        assert_eq!(transport.stats().retransmissions, 0);
    }

    #[test]
    fn test_duplicate_reliable_delivered_once_but_acked_twice() {
        let (mut transport, _sink) = transport_to_sink();
        let mut channel = channel();
        let packet = Packet::new(3, start_event());

        assert!(channel.on_receive(&mut transport, packet.clone()).is_some());
        assert!(channel.on_receive(&mut transport, packet).is_none());
        // One ack per receipt.
        assert_eq!(transport.stats().packets_sent, 2);
    }

    #[test]
    fn test_unreliable_packets_pass_through() {
        let (mut transport, _sink) = transport_to_sink();
        let mut channel = channel();

        let packet = Packet::new(1, PacketBody::Handshake);
        assert_eq!(channel.on_receive(&mut transport, packet.clone()), Some(packet));
        assert_eq!(transport.stats().packets_sent, 0);
    }

    #[test]
    fn test_unknown_ack_is_ignored() {
        let mut channel = channel();
        assert!(!channel.acknowledge(42));
    }
}
