mod codec;
mod protocol;
mod reliability;
mod stats;
mod tracking;
mod transport;

pub use codec::truncate_str;
pub use protocol::sequence_greater_than;
pub use protocol::{
    BODY_SIZE, CombatantState, ControlAction, ControlEvent, HEADER_SIZE, InputFlags,
    LobbyAnnounce, MAX_PICKUPS, MAX_PROJECTILES, MatchPhase, NAME_SLOT, PACKET_SIZE,
    PROJECTILE_KIND_SLOT, PROTOCOL_MAGIC, PROTOCOL_VERSION, PUNCH_PROBE, Packet, PacketBody,
    PacketError, PacketKind, Pickup, Projectile, Winner, WorldState,
};
pub use reliability::{PendingReliable, ReliableChannel};
pub use stats::NetworkStats;
pub use tracking::{DeliveredWindow, NewestSequence};
pub use transport::{ConnectionState, PeerSession, PeerTransport};
