use std::net::IpAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingProtocol {
    Udp,
    Tcp,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PortMapError {
    #[error("no port-mapping gateway available")]
    Unavailable,
    #[error("gateway refused mapping: {0}")]
    Refused(String),
}

/// Optional router configuration. Nothing in session setup waits on it.
pub trait PortMapper: Send + Sync {
    fn name(&self) -> &str;

    /// Requests a forward of `port`; returns the gateway's external IP
    /// when it reports one.
    fn map_port(&self, port: u16, protocol: MappingProtocol) -> Result<Option<IpAddr>, PortMapError>;

    fn unmap_port(&self, port: u16, protocol: MappingProtocol) -> Result<(), PortMapError>;
}

/// Fallback when no gateway integration is compiled in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPortMapper;

impl PortMapper for NoopPortMapper {
    fn name(&self) -> &str {
        "none"
    }

    fn map_port(&self, _port: u16, _protocol: MappingProtocol) -> Result<Option<IpAddr>, PortMapError> {
        Err(PortMapError::Unavailable)
    }

    fn unmap_port(&self, _port: u16, _protocol: MappingProtocol) -> Result<(), PortMapError> {
        Ok(())
    }
}

/// Runs a UDP mapping attempt on its own thread and logs the outcome.
/// The handle may be dropped; the attempt never affects the session.
pub fn spawn_port_mapping(mapper: Arc<dyn PortMapper>, port: u16) -> JoinHandle<()> {
    thread::spawn(move || match mapper.map_port(port, MappingProtocol::Udp) {
        Ok(Some(ip)) => log::info!("{}: mapped UDP {} (external {})", mapper.name(), port, ip),
        Ok(None) => log::info!("{}: mapped UDP {}", mapper.name(), port),
        Err(e) => log::info!("{}: port mapping skipped: {}", mapper.name(), e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU16, Ordering};

    struct RecordingMapper {
        mapped: AtomicU16,
    }

    impl PortMapper for RecordingMapper {
        fn name(&self) -> &str {
            "recording"
        }

        fn map_port(&self, port: u16, _protocol: MappingProtocol) -> Result<Option<IpAddr>, PortMapError> {
            self.mapped.store(port, Ordering::SeqCst);
            Ok(None)
        }

        fn unmap_port(&self, _port: u16, _protocol: MappingProtocol) -> Result<(), PortMapError> {
            Ok(())
        }
    }

    #[test]
    fn test_noop_mapper_reports_unavailable() {
        let mapper = NoopPortMapper;
        assert!(matches!(
            mapper.map_port(50000, MappingProtocol::Udp),
            Err(PortMapError::Unavailable)
        ));
        spawn_port_mapping(Arc::new(mapper), 50000).join().unwrap();
    }

    #[test]
    fn test_spawned_mapping_runs_detached() {
        let mapper = Arc::new(RecordingMapper {
            mapped: AtomicU16::new(0),
        });

        spawn_port_mapping(mapper.clone(), 50042).join().unwrap();
        assert_eq!(mapper.mapped.load(Ordering::SeqCst), 50042);
    }
}
