use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::NetConfig;

use super::RendezvousError;
use super::protocol::{Request, Response, RoomCode};

/// Blocking client for the rendezvous service. One request per connection;
/// used once per session before the tick loop starts.
#[derive(Debug, Clone)]
pub struct RendezvousClient {
    server: String,
    timeout: Duration,
}

impl RendezvousClient {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            timeout: Duration::from_secs(3),
        }
    }

    pub fn from_config(config: &NetConfig) -> Self {
        Self::new(config.rendezvous_addr.clone()).with_timeout(config.rendezvous_timeout())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Registers `port` under a fresh room code. The service records the
    /// source IP it observes, not one we claim.
    pub fn host(&self, port: u16) -> Result<RoomCode, RendezvousError> {
        match self.request(&Request::Host { port })? {
            Response::Code(code) => {
                log::info!("Hosting room {}", code);
                Ok(code)
            }
            Response::Error(reason) => Err(reason.into()),
            other => Err(RendezvousError::MalformedResponse(other.to_string())),
        }
    }

    pub fn join(&self, code: &str) -> Result<SocketAddr, RendezvousError> {
        let code = RoomCode::parse(code)?;
        match self.request(&Request::Join {
            code: code.to_string(),
        })? {
            Response::Addr(addr) => {
                log::info!("Room {} resolved to {}", code, addr);
                Ok(addr)
            }
            Response::Error(reason) => Err(reason.into()),
            other => Err(RendezvousError::MalformedResponse(other.to_string())),
        }
    }

    fn request(&self, request: &Request) -> Result<Response, RendezvousError> {
        let addr = self
            .server
            .to_socket_addrs()
            .map_err(|_| RendezvousError::Resolve(self.server.clone()))?
            .next()
            .ok_or_else(|| RendezvousError::Resolve(self.server.clone()))?;

        let mut stream = TcpStream::connect_timeout(&addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        log::debug!("Rendezvous request to {}: {}", addr, request);
        stream.write_all(format!("{}\n", request).as_bytes())?;

        let mut line = String::new();
        BufReader::new(stream).read_line(&mut line)?;
        Response::parse(&line)
    }
}
