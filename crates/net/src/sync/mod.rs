//! Per-tick exchange between the authoritative peer and its mirror.
//!
//! The authoritative side streams full [`WorldState`] snapshots and owns
//! every phase change; the mirror streams [`InputFlags`] and adopts whatever
//! phase the newest authoritative packet carries. Lifecycle events ride the
//! reliable channel, everything else is best effort.

mod slot;

use std::time::Instant;

use crate::config::NetConfig;
use crate::error::SyncError;
use crate::net::{
    ControlAction, ControlEvent, InputFlags, LobbyAnnounce, MatchPhase, NewestSequence, Packet,
    PacketBody, PeerTransport, ReliableChannel, Winner, WorldState,
};

pub use slot::LatestSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Authoritative,
    Mirror,
}

impl Role {
    pub fn is_authoritative(self) -> bool {
        self == Self::Authoritative
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Authoritative => "authoritative",
            Self::Mirror => "mirror",
        }
    }

    /// Winner recorded when this side gives up.
    fn opponent_wins(self) -> Winner {
        match self {
            Self::Authoritative => Winner::Second,
            Self::Mirror => Winner::First,
        }
    }
}

/// What arrived since the previous poll. Unreliable kinds hold only the
/// newest packet; control events are listed once each in arrival order.
#[derive(Debug, Default)]
pub struct Inbound {
    pub input: Option<InputFlags>,
    pub state: Option<WorldState>,
    pub lobby: Option<LobbyAnnounce>,
    pub control: Vec<ControlEvent>,
    pub connected: bool,
}

pub struct MatchSync {
    transport: PeerTransport,
    reliable: ReliableChannel,
    role: Role,
    phase: MatchPhase,
    winner: Winner,
    countdown: Option<u8>,
    input: LatestSlot<InputFlags>,
    state: LatestSlot<WorldState>,
    lobby: LatestSlot<LobbyAnnounce>,
    remote_phase: NewestSequence,
}

impl MatchSync {
    pub fn new(mut transport: PeerTransport, reliable: ReliableChannel, role: Role) -> Self {
        transport.set_authoritative(role.is_authoritative());
        Self {
            transport,
            reliable,
            role,
            phase: MatchPhase::Lobby,
            winner: Winner::None,
            countdown: None,
            input: LatestSlot::default(),
            state: LatestSlot::default(),
            lobby: LatestSlot::default(),
            remote_phase: NewestSequence::default(),
        }
    }

    pub fn from_config(transport: PeerTransport, role: Role, config: &NetConfig) -> Self {
        Self::new(transport, ReliableChannel::from_config(config), role)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn winner(&self) -> Winner {
        self.winner
    }

    pub fn countdown(&self) -> Option<u8> {
        self.countdown
    }

    pub fn transport(&self) -> &PeerTransport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut PeerTransport {
        &mut self.transport
    }

    pub fn pending_reliable(&self) -> usize {
        self.reliable.pending_len()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    fn require(&self, role: Role) -> Result<(), SyncError> {
        if self.role == role {
            Ok(())
        } else {
            Err(SyncError::WrongRole {
                required: role.name(),
            })
        }
    }

    fn send_unreliable(&mut self, body: PacketBody) {
        if let Err(e) = self.transport.send(body) {
            log::debug!("Unreliable send failed: {}", e);
        }
    }

    fn send_control(&mut self, event: ControlEvent, now: Instant) {
        match self
            .reliable
            .send(&mut self.transport, PacketBody::Control(event), now)
        {
            Ok(sequence) => log::info!("Sent {:?} as reliable {}", event.action, sequence),
            Err(e) => log::warn!("Could not send {:?}: {}", event.action, e),
        }
    }

    fn lifecycle_event(&self, action: ControlAction) -> ControlEvent {
        ControlEvent {
            action,
            phase: self.phase,
            winner: self.winner,
            countdown: self.countdown,
        }
    }

    /// Broadcasts a snapshot. Phase and winner are stamped from the
    /// lifecycle this side owns.
    pub fn send_state(&mut self, mut state: WorldState) -> Result<(), SyncError> {
        self.require(Role::Authoritative)?;
        state.phase = self.phase;
        state.winner = self.winner;
        state.countdown = self.countdown;
        self.send_unreliable(PacketBody::State(state));
        Ok(())
    }

    pub fn send_input(&mut self, input: InputFlags) -> Result<(), SyncError> {
        self.require(Role::Mirror)?;
        self.send_unreliable(PacketBody::Input(input));
        Ok(())
    }

    pub fn send_lobby(&mut self, announce: LobbyAnnounce) {
        self.send_unreliable(PacketBody::Lobby(announce));
    }

    /// Sends an empty packet so the peer's liveness clock keeps running
    /// while nothing else needs to be said.
    pub fn keep_alive(&mut self) {
        self.send_unreliable(PacketBody::Handshake);
    }

    pub fn start_match(&mut self, countdown: Option<u8>, now: Instant) -> Result<(), SyncError> {
        self.require(Role::Authoritative)?;
        self.phase = MatchPhase::Playing;
        self.winner = Winner::None;
        self.countdown = countdown;
        self.send_control(self.lifecycle_event(ControlAction::Start), now);
        Ok(())
    }

    pub fn pause(&mut self, now: Instant) -> Result<(), SyncError> {
        self.require(Role::Authoritative)?;
        self.phase = MatchPhase::Paused;
        self.send_control(self.lifecycle_event(ControlAction::Pause), now);
        Ok(())
    }

    pub fn resume(&mut self, now: Instant) -> Result<(), SyncError> {
        self.require(Role::Authoritative)?;
        self.phase = MatchPhase::Playing;
        self.countdown = None;
        self.send_control(self.lifecycle_event(ControlAction::Resume), now);
        Ok(())
    }

    pub fn finish(&mut self, winner: Winner, now: Instant) -> Result<(), SyncError> {
        self.require(Role::Authoritative)?;
        self.end_match(winner, now);
        Ok(())
    }

    fn end_match(&mut self, winner: Winner, now: Instant) {
        self.phase = MatchPhase::GameOver;
        self.winner = winner;
        self.countdown = None;
        self.send_control(self.lifecycle_event(ControlAction::GameOver), now);
    }

    pub fn return_to_lobby(&mut self, now: Instant) -> Result<(), SyncError> {
        self.require(Role::Authoritative)?;
        self.phase = MatchPhase::Lobby;
        self.winner = Winner::None;
        self.countdown = None;
        self.send_control(self.lifecycle_event(ControlAction::ReturnToLobby), now);
        Ok(())
    }

    /// Gives the match to the other side. The mirror only asks; its phase
    /// changes once the authoritative side confirms with a game-over event.
    pub fn forfeit(&mut self, now: Instant) {
        let winner = self.role.opponent_wins();
        let event = ControlEvent {
            action: ControlAction::Forfeit,
            phase: MatchPhase::GameOver,
            winner,
            countdown: None,
        };

        if self.role.is_authoritative() {
            self.phase = MatchPhase::GameOver;
            self.winner = winner;
            self.countdown = None;
        }
        self.send_control(event, now);
    }

    /// Runs punching and retransmission, drains every pending datagram and
    /// reports the newest of each kind. Call once per tick.
    pub fn poll(&mut self, now: Instant) -> Inbound {
        self.transport.maintain(now);
        self.reliable.update(&mut self.transport, now);

        let mut control = Vec::new();
        while let Some(packet) = self.transport.receive() {
            if let Some(packet) = self.reliable.on_receive(&mut self.transport, packet) {
                self.dispatch(packet, &mut control, now);
            }
        }

        Inbound {
            input: self.input.take(),
            state: self.state.take(),
            lobby: self.lobby.take(),
            control,
            connected: self.transport.check_liveness(now),
        }
    }

    fn dispatch(&mut self, packet: Packet, control: &mut Vec<ControlEvent>, now: Instant) {
        let sequence = packet.sequence;
        match (packet.body, self.role) {
            (PacketBody::Input(input), Role::Authoritative) => {
                self.input.offer(sequence, input);
            }
            (PacketBody::State(state), Role::Mirror) => {
                if self.remote_phase.accept(sequence) {
                    self.adopt(state.phase, state.winner, state.countdown);
                }
                self.state.offer(sequence, state);
            }
            (PacketBody::Lobby(announce), _) => {
                self.lobby.offer(sequence, announce);
            }
            // The reliable channel already hands over each control event
            // once. Ordering only decides whether its phase still applies.
            (PacketBody::Control(event), Role::Mirror) => {
                if self.remote_phase.accept(sequence) {
                    self.adopt(event.phase, event.winner, event.countdown);
                } else {
                    log::debug!("Late {:?} ({}), keeping newer phase", event.action, sequence);
                }
                control.push(event);
            }
            (PacketBody::Control(event), Role::Authoritative) => {
                if event.action == ControlAction::Forfeit
                    && matches!(self.phase, MatchPhase::Playing | MatchPhase::Paused)
                {
                    log::info!("Peer forfeited");
                    // Confirm so the mirror switches phase.
                    self.end_match(Winner::First, now);
                }
                control.push(event);
            }
            (PacketBody::Handshake, _) => {}
            (body, role) => {
                log::debug!("Ignoring {:?} packet on the {} side", body.kind(), role.name());
            }
        }
    }

    fn adopt(&mut self, phase: MatchPhase, winner: Winner, countdown: Option<u8>) {
        if phase != self.phase {
            log::info!("Phase {:?} -> {:?}", self.phase, phase);
        }
        self.phase = phase;
        self.winner = winner;
        self.countdown = countdown;
    }

    pub fn authoritative_tick(
        &mut self,
        state: WorldState,
        now: Instant,
    ) -> Result<Inbound, SyncError> {
        self.require(Role::Authoritative)?;
        let inbound = self.poll(now);
        self.send_state(state)?;
        Ok(inbound)
    }

    pub fn mirror_tick(&mut self, input: InputFlags, now: Instant) -> Result<Inbound, SyncError> {
        self.require(Role::Mirror)?;
        let inbound = self.poll(now);
        self.send_input(input)?;
        Ok(inbound)
    }

    pub fn lobby_tick(&mut self, announce: LobbyAnnounce, now: Instant) -> Inbound {
        let inbound = self.poll(now);
        self.send_lobby(announce);
        inbound
    }

    /// Ends the session and hands back the transport, still bound, for the
    /// next match.
    pub fn disconnect(mut self) -> PeerTransport {
        log::info!("Disconnecting from {:?}", self.transport.peer_addr());
        self.reliable.clear();
        self.transport.reset();
        self.transport
    }
}
