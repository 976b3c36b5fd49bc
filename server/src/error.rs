use std::net::IpAddr;
use std::time::Duration;

use shared::HandshakeRejection;
use thiserror::Error;

use crate::registry::ClientId;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("handshake rejected: {0}")]
    Protocol(#[from] HandshakeRejection),

    #[error("rate limit exceeded by {addr} ({strikes} strikes)")]
    RateLimited { addr: IpAddr, strikes: u32 },

    #[error("address {0} is banned")]
    Banned(IpAddr),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("could not deliver to {client}: {reason}")]
    Undeliverable {
        client: ClientId,
        reason: &'static str,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server is not admitting this connection")]
    AdmissionRefused,
}
