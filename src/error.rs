//! Error taxonomy for the Rx/AFS adapter.
//!
//! Every failure is surfaced to the immediate caller. The numeric codes the
//! remote side understands live in [`codes`]; [`RpcError`] carries one of them
//! (or any other status a peer returned) verbatim.

use thiserror::Error;

/// Status codes exchanged on the wire.
pub mod codes {
    /// Call completed successfully.
    pub const OK: i32 = 0;

    /// The call was abandoned because the transport failed.
    pub const RX_CALL_DEAD: i32 = -1;
    /// The call timed out waiting for the peer.
    pub const RX_CALL_TIMEOUT: i32 = -3;
    /// The transport was asked to do something it does not support.
    pub const RX_INVALID_OPERATION: i32 = -4;
    /// The peer sent a packet that violates the Rx protocol.
    pub const RX_PROTOCOL_ERROR: i32 = -5;

    /// Client could not marshal the request.
    pub const RXGEN_CC_MARSHAL: i32 = -450;
    /// Client could not unmarshal the response.
    pub const RXGEN_CC_UNMARSHAL: i32 = -451;
    /// Server could not marshal the response.
    pub const RXGEN_SS_MARSHAL: i32 = -452;
    /// Server could not unmarshal the request.
    pub const RXGEN_SS_UNMARSHAL: i32 = -453;
    /// Server could not read the opcode.
    pub const RXGEN_DECODE: i32 = -454;
    /// Opcode not implemented by the peer.
    pub const RXGEN_OPCODE: i32 = -455;

    /// Generic I/O failure (`UAEIO` in the unified AFS error table).
    pub const UAEIO: i32 = 49733380;
    /// Out of memory (`UAENOMEM` in the unified AFS error table).
    pub const UAENOMEM: i32 = 49733387;
}

/// Malformed host or port input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address {0:?} must have exactly four dot-separated octets")]
    SegmentCount(String),
    #[error("address {0:?} has an octet that is not a number in 0..=255")]
    BadOctet(String),
}

/// The transport failed to build a security object or a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("cannot construct {0} client security object")]
    SecurityObject(&'static str),
    #[error("cannot open connection to {addr}: {reason}")]
    Open { addr: String, reason: String },
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("transport I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// The transport failed to register a service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service {service_id} ({name}) is already registered")]
    AlreadyRegistered { service_id: u16, name: String },
    #[error("service must be hosted on {expected}, not {requested}")]
    AddressMismatch { expected: String, requested: String },
    #[error("cannot construct {0} server security object")]
    SecurityObject(&'static str),
    #[error(transparent)]
    Address(#[from] AddressError),
}

/// A malformed or truncated binary structure.
#[derive(Debug, Error)]
#[error("cannot decode {what}: {source}")]
pub struct CodecError {
    pub what: &'static str,
    #[source]
    pub source: std::io::Error,
}

impl CodecError {
    pub fn new(what: &'static str, source: std::io::Error) -> Self {
        Self { what, source }
    }
}

/// A remote procedure returned a non-zero status, or a local handler failed
/// with a code that must be forwarded as the call status.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Rx error {code}")]
pub struct RpcError {
    pub code: i32,
}

impl RpcError {
    pub const fn new(code: i32) -> Self {
        Self { code }
    }
}

impl From<i32> for RpcError {
    fn from(code: i32) -> Self {
        Self { code }
    }
}

/// Any failure the crate surfaces.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl Error {
    /// The wire status this error corresponds to, if it came from a call.
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Rpc(e) => Some(e.code),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
