//! RADIUS transport errors

use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RadiusError {
    /// IO error during network operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request could not be encoded
    #[error("Packet error: {0}")]
    Packet(#[from] radius_proto::PacketError),

    /// No matching reply before the deadline
    #[error("No response from {0}")]
    Timeout(SocketAddr),

    #[error("No RADIUS hosts configured")]
    NoHosts,
}

impl RadiusError {
    /// Errors that should move the pool off the host that produced them
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, RadiusError::Io(_) | RadiusError::Timeout(_))
    }
}

pub type RadiusResult<T> = Result<T, RadiusError>;
