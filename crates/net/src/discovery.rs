//! STUN-style binding client used to learn the public endpoint of a socket.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::config::NetConfig;

pub const MAGIC_COOKIE: u32 = 0x2112_A442;
pub const BINDING_REQUEST: u16 = 0x0001;
pub const BINDING_SUCCESS: u16 = 0x0101;
pub const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
pub const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;

const HEADER_LEN: usize = 20;
const TRANSACTION_ID_LEN: usize = 12;
const FAMILY_IPV4: u8 = 0x01;
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub type TransactionId = [u8; TRANSACTION_ID_LEN];

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Cannot resolve discovery server {0}")]
    Resolve(String),
    #[error("No binding response after {attempts} attempts")]
    NoResponse { attempts: u32 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub fn binding_request(transaction_id: &TransactionId) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    buf[0..2].copy_from_slice(&BINDING_REQUEST.to_be_bytes());
    // Length stays zero: no attributes.
    buf[4..8].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    buf[8..20].copy_from_slice(transaction_id);
    buf
}

/// Extracts the reflexive address from a binding success response.
///
/// Returns `None` for anything that is not a success response to
/// `transaction_id`. The XOR attribute wins over the plain one when both
/// are present.
pub fn parse_binding_response(data: &[u8], transaction_id: &TransactionId) -> Option<SocketAddr> {
    if data.len() < HEADER_LEN {
        return None;
    }

    let kind = u16::from_be_bytes([data[0], data[1]]);
    let length = u16::from_be_bytes([data[2], data[3]]) as usize;
    let cookie = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    if kind != BINDING_SUCCESS || cookie != MAGIC_COOKIE || data[8..20] != transaction_id[..] {
        return None;
    }

    let end = (HEADER_LEN + length).min(data.len());
    let mut offset = HEADER_LEN;
    let mut mapped = None;

    while offset + 4 <= end {
        let attr_type = u16::from_be_bytes([data[offset], data[offset + 1]]);
        let attr_len = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
        let value = data.get(offset + 4..offset + 4 + attr_len)?;

        match attr_type {
            ATTR_XOR_MAPPED_ADDRESS => {
                if let Some(addr) = decode_xor_address(value) {
                    return Some(SocketAddr::V4(addr));
                }
            }
            ATTR_MAPPED_ADDRESS => mapped = decode_mapped_address(value),
            _ => {}
        }

        // Values are padded to a 4-byte boundary.
        offset += 4 + attr_len.div_ceil(4) * 4;
    }

    mapped.map(SocketAddr::V4)
}

/// Decodes an XOR-mapped address value (reserved, family, port, address).
pub fn decode_xor_address(value: &[u8]) -> Option<SocketAddrV4> {
    let plain = decode_mapped_address(value)?;
    let port = plain.port() ^ (MAGIC_COOKIE >> 16) as u16;
    let ip = u32::from(*plain.ip()) ^ MAGIC_COOKIE;
    Some(SocketAddrV4::new(Ipv4Addr::from(ip), port))
}

pub fn encode_xor_address(addr: SocketAddrV4) -> [u8; 8] {
    let port = addr.port() ^ (MAGIC_COOKIE >> 16) as u16;
    let ip = u32::from(*addr.ip()) ^ MAGIC_COOKIE;

    let mut value = [0u8; 8];
    value[1] = FAMILY_IPV4;
    value[2..4].copy_from_slice(&port.to_be_bytes());
    value[4..8].copy_from_slice(&ip.to_be_bytes());
    value
}

fn decode_mapped_address(value: &[u8]) -> Option<SocketAddrV4> {
    if value.len() < 8 || value[1] != FAMILY_IPV4 {
        return None;
    }
    let port = u16::from_be_bytes([value[2], value[3]]);
    let ip = Ipv4Addr::new(value[4], value[5], value[6], value[7]);
    Some(SocketAddrV4::new(ip, port))
}

/// Blocking discovery client. Runs once before a match, never per tick.
#[derive(Debug, Clone)]
pub struct StunClient {
    server: String,
    timeout: Duration,
    attempts: u32,
}

impl StunClient {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            timeout: Duration::from_millis(1000),
            attempts: 3,
        }
    }

    pub fn from_config(config: &NetConfig) -> Self {
        Self::new(config.discovery_server.clone())
            .with_timeout(config.discovery_timeout())
            .with_attempts(config.discovery_attempts)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Sends binding requests from `socket` until a matching response
    /// arrives or every attempt has timed out. Unrelated datagrams received
    /// meanwhile are discarded.
    pub fn discover(&self, socket: &UdpSocket) -> Result<SocketAddr, DiscoveryError> {
        let server = self.resolve()?;
        socket.set_nonblocking(true)?;

        let mut buf = [0u8; 512];
        for attempt in 1..=self.attempts {
            let transaction_id: TransactionId = rand::rng().random();
            socket.send_to(&binding_request(&transaction_id), server)?;
            log::debug!("Binding request {} of {} to {}", attempt, self.attempts, server);

            let deadline = Instant::now() + self.timeout;
            while Instant::now() < deadline {
                match socket.recv_from(&mut buf) {
                    Ok((size, _)) => {
                        if let Some(addr) = parse_binding_response(&buf[..size], &transaction_id) {
                            return Ok(addr);
                        }
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                        thread::sleep(POLL_INTERVAL);
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        Err(DiscoveryError::NoResponse {
            attempts: self.attempts,
        })
    }

    fn resolve(&self) -> Result<SocketAddr, DiscoveryError> {
        self.server
            .to_socket_addrs()
            .map_err(|_| DiscoveryError::Resolve(self.server.clone()))?
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| DiscoveryError::Resolve(self.server.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(transaction_id: &TransactionId, attrs: &[(u16, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (attr_type, value) in attrs {
            body.extend_from_slice(&attr_type.to_be_bytes());
            body.extend_from_slice(&(value.len() as u16).to_be_bytes());
            body.extend_from_slice(value);
            while body.len() % 4 != 0 {
                body.push(0);
            }
        }

        let mut data = Vec::new();
        data.extend_from_slice(&BINDING_SUCCESS.to_be_bytes());
        data.extend_from_slice(&(body.len() as u16).to_be_bytes());
        data.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        data.extend_from_slice(transaction_id);
        data.extend_from_slice(&body);
        data
    }

    fn public_addr() -> SocketAddrV4 {
        "203.0.113.5:50000".parse().unwrap()
    }

    #[test]
    fn test_request_layout() {
        let id = [7u8; 12];
        let request = binding_request(&id);

        assert_eq!(&request[0..2], &[0x00, 0x01]);
        assert_eq!(&request[2..4], &[0x00, 0x00]);
        assert_eq!(&request[4..8], &[0x21, 0x12, 0xA4, 0x42]);
        assert_eq!(&request[8..], &id);
    }

    #[test]
    fn test_xor_address_round_trip() {
        let wire = encode_xor_address(public_addr());
        let decoded = decode_xor_address(&wire).unwrap();
        assert_eq!(decoded, public_addr());
        assert_eq!(encode_xor_address(decoded), wire);

        let raw = [0x00, 0x01, 0xA1, 0xB2, 0x11, 0x22, 0x33, 0x44];
        assert_eq!(encode_xor_address(decode_xor_address(&raw).unwrap()), raw);
    }

    #[test]
    fn test_parse_skips_unknown_and_padded_attributes() {
        let id = [1u8; 12];
        let wire = encode_xor_address(public_addr());
        let data = response(&id, &[(0x8022, b"srv"), (ATTR_XOR_MAPPED_ADDRESS, &wire)]);

        assert_eq!(
            parse_binding_response(&data, &id),
            Some(SocketAddr::V4(public_addr()))
        );
    }

    #[test]
    fn test_parse_falls_back_to_plain_mapped_address() {
        let id = [2u8; 12];
        let plain = [0x00, 0x01, 0xC3, 0x50, 203, 0, 113, 5];
        let data = response(&id, &[(ATTR_MAPPED_ADDRESS, &plain)]);

        assert_eq!(
            parse_binding_response(&data, &id),
            Some(SocketAddr::V4(public_addr()))
        );
    }

    #[test]
    fn test_parse_rejects_mismatched_responses() {
        let id = [3u8; 12];
        let wire = encode_xor_address(public_addr());
        let data = response(&id, &[(ATTR_XOR_MAPPED_ADDRESS, &wire)]);

        assert_eq!(parse_binding_response(&data, &[4u8; 12]), None);
        assert_eq!(parse_binding_response(&data[..10], &id), None);

        let mut wrong_type = data.clone();
        wrong_type[1] = 0x11;
        assert_eq!(parse_binding_response(&wrong_type, &id), None);
    }

    #[test]
    fn test_discover_against_local_server() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let mut buf = [0u8; 64];
            let (size, from) = server.recv_from(&mut buf).unwrap();
            assert_eq!(size, 20);
            let mut id = [0u8; 12];
            id.copy_from_slice(&buf[8..20]);

            let wire = encode_xor_address(public_addr());
            server.send_to(b"noise", from).unwrap();
            server
                .send_to(&response(&[0u8; 12], &[(ATTR_XOR_MAPPED_ADDRESS, &wire)]), from)
                .unwrap();
            server
                .send_to(&response(&id, &[(ATTR_XOR_MAPPED_ADDRESS, &wire)]), from)
                .unwrap();
        });

        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let client = StunClient::new(server_addr.to_string()).with_attempts(1);
        let discovered = client.discover(&socket).unwrap();

        assert_eq!(discovered, SocketAddr::V4(public_addr()));
        handle.join().unwrap();
    }

    #[test]
    fn test_discover_gives_up_after_attempts() {
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let client = StunClient::new(silent.local_addr().unwrap().to_string())
            .with_timeout(Duration::from_millis(50))
            .with_attempts(2);

        match client.discover(&socket) {
            Err(DiscoveryError::NoResponse { attempts }) => assert_eq!(attempts, 2),
            other => panic!("Expected NoResponse, got {:?}", other),
        }
    }

    #[test]
    fn test_unresolvable_server() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let client = StunClient::new("not-an-address");

        assert!(matches!(
            client.discover(&socket),
            Err(DiscoveryError::Resolve(_))
        ));
    }
}
