use std::fmt;
use std::net::{IpAddr, SocketAddr};

use rand::Rng;

use super::RendezvousError;

pub const CODE_LENGTH: usize = 6;
pub const CODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Six-symbol room code, always stored upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomCode(String);

impl RoomCode {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..CODE_LENGTH)
            .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Accepts codes in any case with surrounding whitespace.
    pub fn parse(input: &str) -> Result<Self, RendezvousError> {
        let code = input.trim().to_ascii_uppercase();
        let valid = code.len() == CODE_LENGTH && code.bytes().all(|b| CODE_ALPHABET.contains(&b));
        if valid {
            Ok(Self(code))
        } else {
            Err(RendezvousError::InvalidCode)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Host { port: u16 },
    /// Normalised to upper case but not validated; unknown shapes are
    /// answered as an invalid code.
    Join { code: String },
}

impl Request {
    /// Parses one request line. Trailing CR, LF and NUL are ignored.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n', '\0']).trim();
        let mut parts = line.split_whitespace();
        let verb = parts.next()?;
        let arg = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        if verb.eq_ignore_ascii_case("HOST") {
            arg.parse().ok().map(|port| Self::Host { port })
        } else if verb.eq_ignore_ascii_case("JOIN") {
            Some(Self::Join {
                code: arg.to_ascii_uppercase(),
            })
        } else {
            None
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host { port } => write!(f, "HOST {}", port),
            Self::Join { code } => write!(f, "JOIN {}", code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReason {
    Invalid,
    Expired,
    BadRequest,
}

impl ErrorReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Invalid => "INVALID",
            Self::Expired => "EXPIRED",
            Self::BadRequest => "BADREQUEST",
        }
    }
}

impl From<ErrorReason> for RendezvousError {
    fn from(reason: ErrorReason) -> Self {
        match reason {
            ErrorReason::Invalid => Self::InvalidCode,
            ErrorReason::Expired => Self::ExpiredCode,
            ErrorReason::BadRequest => Self::BadRequest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Code(RoomCode),
    Addr(SocketAddr),
    Error(ErrorReason),
}

impl Response {
    pub fn parse(line: &str) -> Result<Self, RendezvousError> {
        let trimmed = line.trim_end_matches(['\r', '\n', '\0']).trim();
        let malformed = || RendezvousError::MalformedResponse(trimmed.to_string());
        let parts: Vec<&str> = trimmed.split_whitespace().collect();

        match parts.as_slice() {
            ["CODE", code] => RoomCode::parse(code).map(Self::Code).map_err(|_| malformed()),
            ["ADDR", ip, port] => {
                let ip: IpAddr = ip.parse().map_err(|_| malformed())?;
                let port: u16 = port.parse().map_err(|_| malformed())?;
                Ok(Self::Addr(SocketAddr::new(ip, port)))
            }
            ["ERR", "INVALID"] => Ok(Self::Error(ErrorReason::Invalid)),
            ["ERR", "EXPIRED"] => Ok(Self::Error(ErrorReason::Expired)),
            ["ERR", "BADREQUEST"] => Ok(Self::Error(ErrorReason::BadRequest)),
            _ => Err(malformed()),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "CODE {}", code),
            Self::Addr(addr) => write!(f, "ADDR {} {}", addr.ip(), addr.port()),
            Self::Error(reason) => write!(f, "ERR {}", reason.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_generated_codes_use_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let code = RoomCode::generate(&mut rng);
            assert_eq!(code.as_str().len(), CODE_LENGTH);
            assert!(RoomCode::parse(code.as_str()).is_ok());
        }
    }

    #[test]
    fn test_code_parse_normalises_case() {
        assert_eq!(RoomCode::parse(" ab12cd ").unwrap().as_str(), "AB12CD");
        assert!(RoomCode::parse("AB12C").is_err());
        assert!(RoomCode::parse("AB12C!").is_err());
    }

    #[test]
    fn test_request_parse_tolerates_terminators() {
        assert_eq!(
            Request::parse("HOST 50000\r\n\0"),
            Some(Request::Host { port: 50000 })
        );
        assert_eq!(
            Request::parse("join ab12cd\n"),
            Some(Request::Join {
                code: "AB12CD".to_string()
            })
        );
        assert_eq!(Request::parse("HOST notaport"), None);
        assert_eq!(Request::parse("PING"), None);
        assert_eq!(Request::parse("HOST 1 2"), None);
    }

    #[test]
    fn test_response_lines() {
        let addr: SocketAddr = "203.0.113.5:50000".parse().unwrap();
        assert_eq!(Response::Addr(addr).to_string(), "ADDR 203.0.113.5 50000");
        assert_eq!(Response::parse("ADDR 203.0.113.5 50000\n").unwrap(), Response::Addr(addr));
        assert_eq!(
            Response::parse("ERR EXPIRED").unwrap(),
            Response::Error(ErrorReason::Expired)
        );
        assert_eq!(
            Response::Error(ErrorReason::Invalid).to_string(),
            "ERR INVALID"
        );
        assert!(matches!(
            Response::parse("HELLO"),
            Err(RendezvousError::MalformedResponse(_))
        ));
    }
}
