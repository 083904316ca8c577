//! Line protocol and client for the room-code rendezvous service.
//!
//! | Request       | Success            | Failure                      |
//! |---------------|--------------------|------------------------------|
//! | `HOST <port>` | `CODE <code>`      | `ERR BADREQUEST`             |
//! | `JOIN <code>` | `ADDR <ip> <port>` | `ERR INVALID`, `ERR EXPIRED` |

mod client;
mod protocol;

use std::io;

pub use client::RendezvousClient;
pub use protocol::{CODE_ALPHABET, CODE_LENGTH, ErrorReason, Request, Response, RoomCode};

#[derive(Debug, thiserror::Error)]
pub enum RendezvousError {
    #[error("Room code is not registered")]
    InvalidCode,
    #[error("Room code has expired")]
    ExpiredCode,
    #[error("Rendezvous service rejected the request")]
    BadRequest,
    #[error("Malformed rendezvous response: {0:?}")]
    MalformedResponse(String),
    #[error("Cannot resolve rendezvous server {0}")]
    Resolve(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RendezvousError {
    /// Whether the user should be prompted for another code.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::InvalidCode | Self::ExpiredCode)
    }
}
