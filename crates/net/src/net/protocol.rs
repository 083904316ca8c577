use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::codec::{WireReader, WireWriter};

pub const PROTOCOL_MAGIC: u32 = 0x4252_574C;
pub const PROTOCOL_VERSION: u8 = 1;

/// Six-byte probe used to open NAT bindings. Its length alone tells it apart
/// from a game packet.
pub const PUNCH_PROBE: [u8; 6] = *b"PUNCH!";

pub const MAX_PICKUPS: usize = 5;
pub const MAX_PROJECTILES: usize = 10;
/// Slot width for display names and power names (19 visible bytes + NUL).
pub const NAME_SLOT: usize = 20;
pub const PROJECTILE_KIND_SLOT: usize = 10;

pub const HEADER_SIZE: usize = 12;
pub const BODY_SIZE: usize = WorldState::WIRE_SIZE;
pub const PACKET_SIZE: usize = HEADER_SIZE + BODY_SIZE;

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("datagram is {0} bytes, expected {PACKET_SIZE}")]
    WrongSize(usize),
    #[error("bad protocol magic {0:#010x}")]
    BadMagic(u32),
    #[error("unsupported protocol version {0}")]
    BadVersion(u8),
    #[error("unknown packet kind {0}")]
    UnknownKind(u8),
    #[error("invalid {field} value {value}")]
    InvalidField { field: &'static str, value: u8 },
    #[error("packet body truncated")]
    Truncated,
}

bitflags! {
    /// The five control flags sampled from the non-authoritative player.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct InputFlags: u8 {
        const LEFT = 1 << 0;
        const RIGHT = 1 << 1;
        const JUMP = 1 << 2;
        const DOWN = 1 << 3;
        const ATTACK = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MatchPhase {
    #[default]
    Lobby,
    Playing,
    Paused,
    GameOver,
}

impl MatchPhase {
    fn to_wire(self) -> u8 {
        match self {
            Self::Lobby => 0,
            Self::Playing => 1,
            Self::Paused => 2,
            Self::GameOver => 3,
        }
    }

    fn from_wire(value: u8) -> Result<Self, PacketError> {
        match value {
            0 => Ok(Self::Lobby),
            1 => Ok(Self::Playing),
            2 => Ok(Self::Paused),
            3 => Ok(Self::GameOver),
            _ => Err(PacketError::InvalidField {
                field: "phase",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Winner {
    #[default]
    None,
    First,
    Second,
}

impl Winner {
    fn to_wire(self) -> u8 {
        match self {
            Self::None => 0,
            Self::First => 1,
            Self::Second => 2,
        }
    }

    fn from_wire(value: u8) -> Result<Self, PacketError> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::First),
            2 => Ok(Self::Second),
            _ => Err(PacketError::InvalidField {
                field: "winner",
                value,
            }),
        }
    }
}

fn write_countdown(w: &mut WireWriter<'_>, countdown: Option<u8>) {
    w.bool(countdown.is_some());
    w.u8(countdown.unwrap_or(0));
}

fn read_countdown(r: &mut WireReader<'_>) -> Result<Option<u8>, PacketError> {
    let present = r.bool()?;
    let value = r.u8()?;
    Ok(present.then_some(value))
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CombatantState {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub health: i32,
    pub power: String,
    pub power_timer: i32,
    pub invincible_timer: i32,
    pub attack_cooldown: i32,
    pub facing_left: bool,
}

impl CombatantState {
    pub const WIRE_SIZE: usize = 4 * 4 + 4 + NAME_SLOT + 3 * 4 + 1;

    fn write(&self, w: &mut WireWriter<'_>) {
        w.f32(self.x);
        w.f32(self.y);
        w.f32(self.vx);
        w.f32(self.vy);
        w.i32(self.health);
        w.str(&self.power, NAME_SLOT);
        w.i32(self.power_timer);
        w.i32(self.invincible_timer);
        w.i32(self.attack_cooldown);
        w.bool(self.facing_left);
    }

    fn read(r: &mut WireReader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            x: r.f32()?,
            y: r.f32()?,
            vx: r.f32()?,
            vy: r.f32()?,
            health: r.i32()?,
            power: r.str(NAME_SLOT)?,
            power_timer: r.i32()?,
            invincible_timer: r.i32()?,
            attack_cooldown: r.i32()?,
            facing_left: r.bool()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pickup {
    pub x: f32,
    pub y: f32,
    pub kind: String,
}

impl Pickup {
    pub const WIRE_SIZE: usize = 2 * 4 + NAME_SLOT;

    fn write(&self, w: &mut WireWriter<'_>) {
        w.f32(self.x);
        w.f32(self.y);
        w.str(&self.kind, NAME_SLOT);
    }

    fn read(r: &mut WireReader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            x: r.f32()?,
            y: r.f32()?,
            kind: r.str(NAME_SLOT)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Projectile {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub owner: u8,
    pub kind: String,
}

impl Projectile {
    pub const WIRE_SIZE: usize = 4 * 4 + 1 + PROJECTILE_KIND_SLOT;

    fn write(&self, w: &mut WireWriter<'_>) {
        w.f32(self.x);
        w.f32(self.y);
        w.f32(self.vx);
        w.f32(self.vy);
        w.u8(self.owner);
        w.str(&self.kind, PROJECTILE_KIND_SLOT);
    }

    fn read(r: &mut WireReader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            x: r.f32()?,
            y: r.f32()?,
            vx: r.f32()?,
            vy: r.f32()?,
            owner: r.u8()?,
            kind: r.str(PROJECTILE_KIND_SLOT)?,
        })
    }
}

/// Full snapshot the authoritative side replicates every tick.
///
/// Pickups beyond [`MAX_PICKUPS`] and projectiles beyond [`MAX_PROJECTILES`]
/// are dropped when encoding.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorldState {
    pub game_time: f32,
    pub combatants: [CombatantState; 2],
    pub pickups: Vec<Pickup>,
    pub projectiles: Vec<Projectile>,
    pub phase: MatchPhase,
    /// Only meaningful once `phase` is [`MatchPhase::GameOver`].
    pub winner: Winner,
    pub countdown: Option<u8>,
}

impl WorldState {
    pub const WIRE_SIZE: usize = 4
        + 2 * CombatantState::WIRE_SIZE
        + 1
        + MAX_PICKUPS * Pickup::WIRE_SIZE
        + 1
        + MAX_PROJECTILES * Projectile::WIRE_SIZE
        + 2
        + 2;

    fn write(&self, w: &mut WireWriter<'_>) {
        w.f32(self.game_time);
        for combatant in &self.combatants {
            combatant.write(w);
        }

        let pickups = &self.pickups[..self.pickups.len().min(MAX_PICKUPS)];
        w.u8(pickups.len() as u8);
        for pickup in pickups {
            pickup.write(w);
        }
        w.skip((MAX_PICKUPS - pickups.len()) * Pickup::WIRE_SIZE);

        let projectiles = &self.projectiles[..self.projectiles.len().min(MAX_PROJECTILES)];
        w.u8(projectiles.len() as u8);
        for projectile in projectiles {
            projectile.write(w);
        }
        w.skip((MAX_PROJECTILES - projectiles.len()) * Projectile::WIRE_SIZE);

        w.u8(self.phase.to_wire());
        w.u8(self.winner.to_wire());
        write_countdown(w, self.countdown);
    }

    fn read(r: &mut WireReader<'_>) -> Result<Self, PacketError> {
        let game_time = r.f32()?;
        let combatants = [CombatantState::read(r)?, CombatantState::read(r)?];

        let pickup_count = read_count(r, "pickup count", MAX_PICKUPS)?;
        let mut pickups = Vec::with_capacity(pickup_count);
        for _ in 0..pickup_count {
            pickups.push(Pickup::read(r)?);
        }
        r.skip((MAX_PICKUPS - pickup_count) * Pickup::WIRE_SIZE)?;

        let projectile_count = read_count(r, "projectile count", MAX_PROJECTILES)?;
        let mut projectiles = Vec::with_capacity(projectile_count);
        for _ in 0..projectile_count {
            projectiles.push(Projectile::read(r)?);
        }
        r.skip((MAX_PROJECTILES - projectile_count) * Projectile::WIRE_SIZE)?;

        Ok(Self {
            game_time,
            combatants,
            pickups,
            projectiles,
            phase: MatchPhase::from_wire(r.u8()?)?,
            winner: Winner::from_wire(r.u8()?)?,
            countdown: read_countdown(r)?,
        })
    }
}

fn read_count(
    r: &mut WireReader<'_>,
    field: &'static str,
    max: usize,
) -> Result<usize, PacketError> {
    let value = r.u8()?;
    if value as usize > max {
        return Err(PacketError::InvalidField { field, value });
    }
    Ok(value as usize)
}

/// Pre-match announcement each side sends every lobby tick.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LobbyAnnounce {
    pub variant: u8,
    pub name: String,
    pub ready: bool,
}

impl LobbyAnnounce {
    pub const WIRE_SIZE: usize = 1 + NAME_SLOT + 1;

    fn write(&self, w: &mut WireWriter<'_>) {
        w.u8(self.variant);
        w.str(&self.name, NAME_SLOT);
        w.bool(self.ready);
    }

    fn read(r: &mut WireReader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            variant: r.u8()?,
            name: r.str(NAME_SLOT)?,
            ready: r.bool()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlAction {
    Start,
    Pause,
    Resume,
    GameOver,
    Forfeit,
    ReturnToLobby,
}

impl ControlAction {
    fn to_wire(self) -> u8 {
        match self {
            Self::Start => 1,
            Self::Pause => 2,
            Self::Resume => 3,
            Self::GameOver => 4,
            Self::Forfeit => 5,
            Self::ReturnToLobby => 6,
        }
    }

    fn from_wire(value: u8) -> Result<Self, PacketError> {
        match value {
            1 => Ok(Self::Start),
            2 => Ok(Self::Pause),
            3 => Ok(Self::Resume),
            4 => Ok(Self::GameOver),
            5 => Ok(Self::Forfeit),
            6 => Ok(Self::ReturnToLobby),
            _ => Err(PacketError::InvalidField {
                field: "control action",
                value,
            }),
        }
    }
}

/// Lifecycle event delivered over the reliable channel. Carries the whole
/// lifecycle snapshot so it can be applied regardless of arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlEvent {
    pub action: ControlAction,
    pub phase: MatchPhase,
    pub winner: Winner,
    pub countdown: Option<u8>,
}

impl ControlEvent {
    pub const WIRE_SIZE: usize = 3 + 2;

    pub fn new(action: ControlAction, phase: MatchPhase) -> Self {
        Self {
            action,
            phase,
            winner: Winner::None,
            countdown: None,
        }
    }

    fn write(&self, w: &mut WireWriter<'_>) {
        w.u8(self.action.to_wire());
        w.u8(self.phase.to_wire());
        w.u8(self.winner.to_wire());
        write_countdown(w, self.countdown);
    }

    fn read(r: &mut WireReader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            action: ControlAction::from_wire(r.u8()?)?,
            phase: MatchPhase::from_wire(r.u8()?)?,
            winner: Winner::from_wire(r.u8()?)?,
            countdown: read_countdown(r)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Handshake,
    Input,
    State,
    Control,
    Ack,
    Lobby,
}

impl PacketKind {
    fn to_wire(self) -> u8 {
        match self {
            Self::Handshake => 0,
            Self::Input => 1,
            Self::State => 2,
            Self::Control => 3,
            Self::Ack => 4,
            Self::Lobby => 5,
        }
    }

    fn from_wire(value: u8) -> Result<Self, PacketError> {
        match value {
            0 => Ok(Self::Handshake),
            1 => Ok(Self::Input),
            2 => Ok(Self::State),
            3 => Ok(Self::Control),
            4 => Ok(Self::Ack),
            5 => Ok(Self::Lobby),
            _ => Err(PacketError::UnknownKind(value)),
        }
    }

    /// Kinds the receiver must acknowledge.
    pub fn requires_ack(self) -> bool {
        matches!(self, Self::Control)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PacketBody {
    /// Empty keepalive; any datagram refreshes the peer's liveness clock.
    Handshake,
    Input(InputFlags),
    State(WorldState),
    Control(ControlEvent),
    Ack { sequence: u32 },
    Lobby(LobbyAnnounce),
}

impl PacketBody {
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::Handshake => PacketKind::Handshake,
            Self::Input(_) => PacketKind::Input,
            Self::State(_) => PacketKind::State,
            Self::Control(_) => PacketKind::Control,
            Self::Ack { .. } => PacketKind::Ack,
            Self::Lobby(_) => PacketKind::Lobby,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub sequence: u32,
    pub body: PacketBody,
}

impl Packet {
    pub fn new(sequence: u32, body: PacketBody) -> Self {
        Self { sequence, body }
    }

    pub fn kind(&self) -> PacketKind {
        self.body.kind()
    }

    /// Encodes into the single fixed-size record shared by every kind; bytes
    /// a kind does not use stay zero.
    pub fn encode(&self) -> [u8; PACKET_SIZE] {
        let mut buf = [0u8; PACKET_SIZE];
        let mut w = WireWriter::new(&mut buf);

        w.u32(PROTOCOL_MAGIC);
        w.u8(PROTOCOL_VERSION);
        w.u8(self.kind().to_wire());
        w.u16(0);
        w.u32(self.sequence);

        match &self.body {
            PacketBody::Handshake => {}
            PacketBody::Input(flags) => w.u8(flags.bits()),
            PacketBody::State(state) => state.write(&mut w),
            PacketBody::Control(event) => event.write(&mut w),
            PacketBody::Ack { sequence } => w.u32(*sequence),
            PacketBody::Lobby(announce) => announce.write(&mut w),
        }

        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() != PACKET_SIZE {
            return Err(PacketError::WrongSize(data.len()));
        }

        let mut r = WireReader::new(data);
        let magic = r.u32()?;
        if magic != PROTOCOL_MAGIC {
            return Err(PacketError::BadMagic(magic));
        }
        let version = r.u8()?;
        if version != PROTOCOL_VERSION {
            return Err(PacketError::BadVersion(version));
        }
        let kind = PacketKind::from_wire(r.u8()?)?;
        r.u16()?;
        let sequence = r.u32()?;

        let body = match kind {
            PacketKind::Handshake => PacketBody::Handshake,
            PacketKind::Input => PacketBody::Input(InputFlags::from_bits_truncate(r.u8()?)),
            PacketKind::State => PacketBody::State(WorldState::read(&mut r)?),
            PacketKind::Control => PacketBody::Control(ControlEvent::read(&mut r)?),
            PacketKind::Ack => PacketBody::Ack { sequence: r.u32()? },
            PacketKind::Lobby => PacketBody::Lobby(LobbyAnnounce::read(&mut r)?),
        };

        Ok(Self { sequence, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> WorldState {
        let mut state = WorldState {
            game_time: 42.5,
            phase: MatchPhase::Playing,
            ..Default::default()
        };
        state.combatants[0] = CombatantState {
            x: 100.0,
            y: 200.0,
            vx: -3.5,
            vy: 0.25,
            health: 85,
            power: "fire".to_string(),
            power_timer: 1200,
            invincible_timer: 0,
            attack_cooldown: 12,
            facing_left: true,
        };
        state.combatants[1].health = 40;
        state.pickups.push(Pickup {
            x: 10.0,
            y: 20.0,
            kind: "shield".to_string(),
        });
        state.projectiles.push(Projectile {
            x: 1.0,
            y: 2.0,
            vx: 8.0,
            vy: 0.0,
            owner: 1,
            kind: "fire".to_string(),
        });
        state
    }

    #[test]
    fn test_sequence_comparison() {
        assert!(sequence_greater_than(2, 1));
        assert!(!sequence_greater_than(1, 2));
        assert!(!sequence_greater_than(5, 5));
        assert!(sequence_greater_than(0, u32::MAX));
        assert!(!sequence_greater_than(u32::MAX, 0));
    }

    #[test]
    fn test_every_kind_encodes_to_same_size() {
        let bodies = [
            PacketBody::Handshake,
            PacketBody::Input(InputFlags::LEFT | InputFlags::ATTACK),
            PacketBody::State(sample_state()),
            PacketBody::Control(ControlEvent::new(ControlAction::Start, MatchPhase::Playing)),
            PacketBody::Ack { sequence: 9 },
            PacketBody::Lobby(LobbyAnnounce::default()),
        ];

        for body in bodies {
            let encoded = Packet::new(3, body.clone()).encode();
            assert_eq!(encoded.len(), PACKET_SIZE);
            let decoded = Packet::decode(&encoded).unwrap();
            assert_eq!(decoded.sequence, 3);
            assert_eq!(decoded.body, body);
        }
    }

    #[test]
    fn test_state_packet_preserves_fields() {
        let state = sample_state();
        let encoded = Packet::new(77, PacketBody::State(state.clone())).encode();

        match Packet::decode(&encoded).unwrap().body {
            PacketBody::State(decoded) => {
                assert_eq!(decoded.combatants[0].power, "fire");
                assert!(decoded.combatants[0].facing_left);
                assert_eq!(decoded.combatants[1].health, 40);
                assert_eq!(decoded.pickups, state.pickups);
                assert_eq!(decoded.projectiles, state.projectiles);
                assert_eq!(decoded.phase, MatchPhase::Playing);
            }
            other => panic!("Expected State, got {:?}", other),
        }
    }

    #[test]
    fn test_excess_lists_and_long_names_are_truncated() {
        let mut state = sample_state();
        state.pickups = (0..8)
            .map(|i| Pickup {
                x: i as f32,
                y: 0.0,
                kind: "health".to_string(),
            })
            .collect();
        state.projectiles = (0..15)
            .map(|i| Projectile {
                x: i as f32,
                kind: "an-overly-long-kind".to_string(),
                ..Default::default()
            })
            .collect();
        state.combatants[1].power = "x".repeat(40);

        let encoded = Packet::new(1, PacketBody::State(state)).encode();
        assert_eq!(encoded.len(), PACKET_SIZE);

        let PacketBody::State(decoded) = Packet::decode(&encoded).unwrap().body else {
            panic!("Expected State");
        };
        assert_eq!(decoded.pickups.len(), MAX_PICKUPS);
        assert_eq!(decoded.pickups[4].x, 4.0);
        assert_eq!(decoded.projectiles.len(), MAX_PROJECTILES);
        assert_eq!(decoded.projectiles[0].kind, "an-overly");
        assert_eq!(decoded.combatants[1].power.len(), NAME_SLOT - 1);
    }

    #[test]
    fn test_lobby_name_truncated_to_nineteen_bytes() {
        let announce = LobbyAnnounce {
            variant: 2,
            name: "Abcdefghijklmnopqrstuvwxyz".to_string(),
            ready: true,
        };
        let encoded = Packet::new(0, PacketBody::Lobby(announce)).encode();
        let PacketBody::Lobby(decoded) = Packet::decode(&encoded).unwrap().body else {
            panic!("Expected Lobby");
        };
        assert_eq!(decoded.name, "Abcdefghijklmnopqrs");
        assert!(decoded.ready);
        assert_eq!(decoded.variant, 2);
    }

    #[test]
    fn test_decode_rejects_foreign_datagrams() {
        assert!(matches!(
            Packet::decode(&PUNCH_PROBE),
            Err(PacketError::WrongSize(6))
        ));

        let mut encoded = Packet::new(1, PacketBody::Handshake).encode();
        encoded[0] ^= 0xFF;
        assert!(matches!(
            Packet::decode(&encoded),
            Err(PacketError::BadMagic(_))
        ));

        let mut encoded = Packet::new(1, PacketBody::Handshake).encode();
        encoded[5] = 200;
        assert!(matches!(
            Packet::decode(&encoded),
            Err(PacketError::UnknownKind(200))
        ));

        let mut encoded = Packet::new(1, PacketBody::Handshake).encode();
        encoded[4] = PROTOCOL_VERSION + 1;
        assert!(matches!(
            Packet::decode(&encoded),
            Err(PacketError::BadVersion(_))
        ));
    }

    #[test]
    fn test_only_control_requires_ack() {
        assert!(PacketKind::Control.requires_ack());
        assert!(!PacketKind::Ack.requires_ack());
        assert!(!PacketKind::State.requires_ack());
        assert!(!PacketKind::Input.requires_ack());
    }
}
