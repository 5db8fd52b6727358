//! Minimal Rx transport over UDP.
//!
//! Rx is the RPC protocol every AFS service speaks. This module implements
//! the part of it the adapter needs and nothing more:
//!
//! 1. A runtime ([`Rx`]) owning one UDP socket, shared by outbound
//!    connections and inbound services, with a background receive loop
//! 2. Client connections ([`Connection`]) issuing one call at a time, with
//!    retransmission and a bounded number of attempts
//! 3. Service registration ([`new_service_host`]) routing inbound calls to an
//!    [`ExecuteRequest`] entry point
//! 4. Multi-packet request and reply reassembly
//! 5. Duplicate-call suppression with cached replies
//! 6. The null security class
//!
//! Flow control, jumbograms, keepalives and challenge/response security are
//! not implemented; peers that depend on them will time out.

use std::time::Duration;

mod assembler;
mod connection;
mod context;
mod runtime;
mod security;
mod service;
mod transaction_tracker;
mod wire;

pub use connection::{destroy_connection, new_connection, Connection};
pub use context::Context;
pub use runtime::{rx_init, Rx};
pub use security::{
    rxnull_new_client_security_object, rxnull_new_server_security_object, NullSecurity,
    SecurityClass,
};
pub use service::{new_service_host, ExecuteRequest, ServiceHandle};
pub use transaction_tracker::{CallKey, Seen, TransactionTracker};

use crate::protocol::xdr::rx::RX_MAX_PACKET_DATA_SIZE;

/// Tunables of the transport runtime.
#[derive(Clone, Debug)]
pub struct RxConfig {
    /// How long a client waits for a reply before resending its request.
    pub retransmit: Duration,
    /// Transmissions of a request before the call fails with `RX_CALL_TIMEOUT`.
    pub max_attempts: u32,
    /// How long a completed inbound call's reply is kept for retransmissions.
    /// Partially received requests idle for longer are discarded too.
    pub retention: Duration,
    /// Payload bytes per packet.
    pub max_packet_data: usize,
    /// Packets a single request or reply may span.
    pub max_call_packets: usize,
    /// Inbound requests that may be partially received at once.
    pub max_partial_calls: usize,
}

impl Default for RxConfig {
    fn default() -> Self {
        Self {
            retransmit: Duration::from_secs(1),
            max_attempts: 12,
            retention: Duration::from_secs(60),
            max_packet_data: RX_MAX_PACKET_DATA_SIZE,
            max_call_packets: 256,
            max_partial_calls: 1024,
        }
    }
}

impl RxConfig {
    pub fn with_retransmit(mut self, retransmit: Duration) -> Self {
        self.retransmit = retransmit;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_max_packet_data(mut self, max_packet_data: usize) -> Self {
        self.max_packet_data = max_packet_data.clamp(1, RX_MAX_PACKET_DATA_SIZE);
        self
    }

    pub fn with_max_partial_calls(mut self, max_partial_calls: usize) -> Self {
        self.max_partial_calls = max_partial_calls.max(1);
        self
    }

    /// Upper bound on the time a call may take before it is abandoned.
    pub fn call_deadline(&self) -> Duration {
        self.retransmit * self.max_attempts
    }
}
