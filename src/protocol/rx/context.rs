//! Per-call context handed to service entry points.
//!
//! A [`Context`] describes one inbound call: who sent it, on which
//! connection and call channel, and under which security class. Handlers use
//! it for logging and may inspect the peer; it carries no mutable state.

use std::fmt;
use std::net::SocketAddrV4;

use crate::protocol::xdr::rx::rx_header;

#[derive(Clone)]
pub struct Context {
    /// Address the call arrived from.
    pub peer: SocketAddrV4,

    /// Epoch of the calling endpoint; with `cid` it names the connection.
    pub epoch: u32,

    /// Connection id with the channel bits cleared.
    pub conn_id: u32,

    pub channel: u32,

    pub call_number: u32,

    pub service_id: u16,

    /// Security index the caller used; always a class the service accepted.
    pub security_index: u8,
}

impl Context {
    pub(crate) fn from_header(peer: SocketAddrV4, header: &rx_header) -> Self {
        Self {
            peer,
            epoch: header.epoch,
            conn_id: header.conn_id(),
            channel: header.channel(),
            call_number: header.call_number,
            service_id: header.service_id,
            security_index: header.security_index,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("rx::Context")
            .field("peer", &self.peer)
            .field("conn_id", &format_args!("{:#x}", self.conn_id))
            .field("call_number", &self.call_number)
            .field("service_id", &self.service_id)
            .finish()
    }
}
