//! Outbound Rx connections.

use std::fmt;
use std::net::SocketAddrV4;
use std::sync::Arc;

use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace, warn};

use super::assembler::CallAssembler;
use super::runtime::Rx;
use super::security::{rxnull_new_client_security_object, SecurityClass};
use crate::addr::{host_to_wire, port_to_wire, wire_to_socket, Host};
use crate::error::{codes, ConnectionError, RpcError};
use crate::protocol::xdr::rx::{
    make_abort, packet_type, rx_header, rx_packet, split_into_packets, RX_CLIENT_INITIATED,
    RX_SECIDX_NULL,
};

/// A client connection to one remote service.
///
/// A connection carries one call at a time; `call` takes `&mut self`, so a
/// second call on the same handle cannot start before the first finishes.
/// Open several connections for concurrent calls.
pub struct Connection {
    rx: Arc<Rx>,
    peer: SocketAddrV4,
    service_id: u16,
    security: Arc<dyn SecurityClass>,
    cid: u32,
    call_number: u32,
}

/// Opens a null-security connection to `host:port` for `service_id`.
///
/// No packet is sent until the first call; an unreachable peer shows up as
/// `RX_CALL_TIMEOUT` on that call.
pub fn new_connection(
    rx: &Arc<Rx>,
    host: impl Into<Host>,
    port: u16,
    service_id: u16,
) -> Result<Connection, ConnectionError> {
    let host = host.into();
    let security =
        rxnull_new_client_security_object().ok_or(ConnectionError::SecurityObject("rxnull"))?;
    let wire_host = host_to_wire(&host)?;
    if wire_host == 0 || port == 0 {
        return Err(ConnectionError::Open {
            addr: format!("{host}:{port}"),
            reason: "host and port must be non-zero".to_string(),
        });
    }
    debug_assert_eq!(security.index(), RX_SECIDX_NULL);

    let conn = Connection {
        rx: rx.clone(),
        peer: wire_to_socket(wire_host, port_to_wire(port)),
        service_id,
        security,
        cid: rx.allocate_conn_id(),
        call_number: 0,
    };
    debug!("Opened connection {:?}", conn);
    Ok(conn)
}

/// Releases a connection. Taking it by value makes a second release
/// impossible.
pub fn destroy_connection(conn: Connection) {
    debug!("Destroying connection {:?}", conn);
    drop(conn);
}

impl Connection {
    pub fn peer(&self) -> SocketAddrV4 {
        self.peer
    }

    pub fn service_id(&self) -> u16 {
        self.service_id
    }

    /// Sends one request body and waits for the reply body.
    ///
    /// The request is retransmitted every `retransmit` interval until a reply
    /// arrives or `max_attempts` transmissions went unanswered. A non-zero
    /// status from the peer comes back as its `RpcError` code verbatim.
    pub async fn call(&mut self, body: &[u8]) -> Result<Vec<u8>, RpcError> {
        self.call_number = self.call_number.wrapping_add(1).max(1);
        let rx = &*self.rx;
        let config = rx.config();
        let peer = self.peer;
        let header = rx_header {
            epoch: rx.epoch(),
            cid: self.cid,
            call_number: self.call_number,
            flags: RX_CLIENT_INITIATED,
            security_index: self.security.index(),
            service_id: self.service_id,
            ..Default::default()
        };

        let mut request = split_into_packets(&header, body, config.max_packet_data);
        if request.len() > config.max_call_packets {
            return Err(RpcError::new(codes::RXGEN_CC_MARSHAL));
        }
        for packet in request.iter_mut() {
            self.security.prepare_packet(packet).map_err(RpcError::new)?;
        }

        let mut pending = rx.register_call(self.cid, self.call_number);
        let mut reply = CallAssembler::new(config.max_call_packets);

        for attempt in 1..=config.max_attempts {
            if attempt > 1 {
                trace!("Retransmitting call {} to {} (attempt {})", header.call_number, peer, attempt);
            }
            for packet in request.iter_mut() {
                packet.header.serial = rx.next_serial();
                if let Err(e) = rx.send(packet, peer).await {
                    warn!("Send to {} failed: {:?}", peer, e);
                    return Err(RpcError::new(codes::RX_CALL_DEAD));
                }
            }

            let window = Instant::now() + config.retransmit;
            loop {
                let (from, packet) = match timeout_at(window, pending.receiver.recv()).await {
                    Err(_) => break,
                    Ok(None) => return Err(RpcError::new(codes::RX_CALL_DEAD)),
                    Ok(Some(received)) => received,
                };
                if from != peer {
                    trace!("Ignoring packet for call {} from unexpected peer {}", header.call_number, from);
                    continue;
                }
                match self.handle_reply_packet(&header, &packet, &mut reply).await? {
                    Some(body) => return Ok(body),
                    None => continue,
                }
            }
        }

        debug!("Call {} to {} timed out", header.call_number, peer);
        let abort = make_abort(&header, true, codes::RX_CALL_TIMEOUT, rx.next_serial());
        let _ = rx.send(&abort, peer).await;
        Err(RpcError::new(codes::RX_CALL_TIMEOUT))
    }

    /// Applies one packet from the server side of the current call.
    async fn handle_reply_packet(
        &self,
        header: &rx_header,
        packet: &rx_packet,
        reply: &mut CallAssembler,
    ) -> Result<Option<Vec<u8>>, RpcError> {
        match packet.header.ptype {
            packet_type::RX_PACKET_TYPE_ABORT => {
                let code = packet.abort_code().unwrap_or(codes::RX_PROTOCOL_ERROR);
                debug!("Call {} aborted by {} with {}", header.call_number, self.peer, code);
                Err(RpcError::new(code))
            }
            packet_type::RX_PACKET_TYPE_DATA => {
                self.security.check_packet(packet).map_err(RpcError::new)?;
                match reply.add(packet) {
                    Ok(Some(body)) => {
                        let ack = rx_packet {
                            header: rx_header {
                                ptype: packet_type::RX_PACKET_TYPE_ACKALL,
                                serial: self.rx.next_serial(),
                                ..*header
                            },
                            payload: Vec::new(),
                        };
                        let _ = self.rx.send(&ack, self.peer).await;
                        Ok(Some(body))
                    }
                    Ok(None) => Ok(None),
                    Err(code) => {
                        let abort = make_abort(header, true, code, self.rx.next_serial());
                        let _ = self.rx.send(&abort, self.peer).await;
                        Err(RpcError::new(code))
                    }
                }
            }
            other => {
                trace!("Ignoring {:?} for call {}", other, header.call_number);
                Ok(None)
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("rx::Connection")
            .field("peer", &self.peer)
            .field("service_id", &self.service_id)
            .field("cid", &format_args!("{:#x}", self.cid))
            .field("security", &self.security.name())
            .finish()
    }
}
