pub mod config;
pub mod discovery;
pub mod error;
pub mod net;
pub mod portmap;
pub mod rendezvous;
pub mod sync;

pub use config::{DEFAULT_TICK_RATE, NetConfig};
pub use discovery::{DiscoveryError, StunClient};
pub use error::{NetError, SyncError};
pub use net::{
    CombatantState, ConnectionState, ControlAction, ControlEvent, InputFlags, LobbyAnnounce,
    MatchPhase, NetworkStats, PACKET_SIZE, Packet, PacketBody, PacketError, PacketKind,
    PeerTransport, Pickup, Projectile, ReliableChannel, Winner, WorldState,
};
pub use portmap::{MappingProtocol, NoopPortMapper, PortMapError, PortMapper, spawn_port_mapping};
pub use rendezvous::{RendezvousClient, RendezvousError, Request, Response, RoomCode};
pub use sync::{Inbound, MatchSync, Role};
