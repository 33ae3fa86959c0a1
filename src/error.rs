//! Error types for chainsocks
//!
//! This module defines the typed errors used throughout the gateway.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// SOCKS5 protocol violations observed on the inbound side
#[derive(Error, Debug)]
pub enum Socks5Error {
    /// Unsupported SOCKS version
    #[error("unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// Client offered zero authentication methods
    #[error("no authentication methods offered")]
    NoMethodsOffered,

    /// None of the offered methods is acceptable
    #[error("no acceptable authentication method")]
    NoAcceptableMethod,

    /// Unsupported username/password sub-negotiation version
    #[error("unsupported auth sub-negotiation version: {0}")]
    UnsupportedAuthVersion(u8),

    /// Username length outside 1..=255
    #[error("invalid username length: {0}")]
    InvalidUsernameLength(usize),

    /// Password length outside 1..=255
    #[error("invalid password length: {0}")]
    InvalidPasswordLength(usize),

    /// Command other than CONNECT
    #[error("command not supported: {0}")]
    CommandNotSupported(u8),

    /// Unknown address type byte
    #[error("address type not supported: {0}")]
    AddressTypeNotSupported(u8),

    /// Domain name exceeds the 255-byte wire limit
    #[error("domain name too long: {0} bytes")]
    DomainTooLong(usize),
}

/// Failures while establishing an upstream hop
///
/// Every variant names the hop it happened on so that session logs can
/// identify the failing node rather than just the chain.
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// TCP dial to the hop failed
    #[error("hop {hop}: dial failed: {source}")]
    Dial {
        /// Hop label
        hop: String,
        /// Underlying dial error
        #[source]
        source: io::Error,
    },

    /// TCP dial to the hop did not complete in time
    #[error("hop {hop}: dial to {addr} timed out after {limit:?}")]
    DialTimeout {
        /// Hop label
        hop: String,
        /// Dialed address
        addr: String,
        /// Deadline that expired
        limit: Duration,
    },

    /// I/O failure during the hop handshake
    #[error("hop {hop}: {source}")]
    Io {
        /// Hop label
        hop: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The hop violated the SOCKS5 client protocol
    #[error("hop {hop}: {reason}")]
    Handshake {
        /// Hop label
        hop: String,
        /// Human-readable cause
        reason: String,
    },

    /// The hop rejected our username/password
    #[error("hop {hop}: authentication rejected")]
    AuthRejected {
        /// Hop label
        hop: String,
    },

    /// The hop answered the CONNECT with a non-zero reply code
    #[error("hop {hop}: connect rejected with code 0x{code:02x}")]
    ConnectRejected {
        /// Hop label
        hop: String,
        /// SOCKS5 reply code returned by the hop
        code: u8,
    },

    /// Every candidate combination was exhausted without a single dial
    #[error("no valid proxy chain")]
    NoChain,
}

impl UpstreamError {
    /// The label of the hop this error is attributed to, if any
    pub fn hop(&self) -> Option<&str> {
        match self {
            UpstreamError::Dial { hop, .. }
            | UpstreamError::DialTimeout { hop, .. }
            | UpstreamError::Io { hop, .. }
            | UpstreamError::Handshake { hop, .. }
            | UpstreamError::AuthRejected { hop }
            | UpstreamError::ConnectRejected { hop, .. } => Some(hop),
            UpstreamError::NoChain => None,
        }
    }
}

/// Anything that can end an inbound session early
///
/// These never escape the session handler; they are consumed by logging
/// after the protocol-appropriate reply (if any) has been sent.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The client violated SOCKS5 framing
    #[error(transparent)]
    Protocol(#[from] Socks5Error),

    /// Unknown user or wrong password
    #[error("authentication failed for user {0:?}")]
    AuthFailed(String),

    /// The chain dialer exhausted its candidates
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Read, write, dial or deadline failure
    #[error(transparent)]
    Io(#[from] io::Error),
}
