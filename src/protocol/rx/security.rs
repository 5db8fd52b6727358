//! Rx security classes.
//!
//! Only the null class is provided: packets go out unmodified and incoming
//! packets are accepted as long as they claim the null security index.

use std::fmt;
use std::sync::Arc;

use crate::error::codes;
use crate::protocol::xdr::rx::{rx_packet, RX_SECIDX_NULL};

/// A security object attached to a connection or to a service.
pub trait SecurityClass: Send + Sync + fmt::Debug {
    /// Human-readable class name, used in logs and errors.
    fn name(&self) -> &'static str;

    /// Security index stamped on every packet of this class.
    fn index(&self) -> u8;

    /// Applies the class to an outgoing packet.
    fn prepare_packet(&self, packet: &mut rx_packet) -> Result<(), i32> {
        packet.header.security_index = self.index();
        Ok(())
    }

    /// Verifies an incoming packet; the error is the abort code to send.
    fn check_packet(&self, packet: &rx_packet) -> Result<(), i32>;
}

/// The null (no authentication) class.
#[derive(Debug, Default)]
pub struct NullSecurity;

impl SecurityClass for NullSecurity {
    fn name(&self) -> &'static str {
        "rxnull"
    }

    fn index(&self) -> u8 {
        RX_SECIDX_NULL
    }

    fn check_packet(&self, packet: &rx_packet) -> Result<(), i32> {
        if packet.header.security_index == RX_SECIDX_NULL {
            Ok(())
        } else {
            Err(codes::RX_PROTOCOL_ERROR)
        }
    }
}

/// Client-side null security object.
pub fn rxnull_new_client_security_object() -> Option<Arc<dyn SecurityClass>> {
    Some(Arc::new(NullSecurity))
}

/// Server-side null security object.
pub fn rxnull_new_server_security_object() -> Option<Arc<dyn SecurityClass>> {
    Some(Arc::new(NullSecurity))
}
