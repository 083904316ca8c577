pub mod config;
pub mod registry;
pub mod server;

pub use config::{DEFAULT_PORT, RendezvousConfig};
pub use registry::{Room, RoomRegistry};
pub use server::RendezvousServer;
