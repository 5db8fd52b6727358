//! Packet routing for the Rx runtime.
//!
//! Every datagram the receive loop reads lands in [`handle_packet`], which
//! sorts it into one of two flows:
//!
//! - Packets the peer sent as the *server* side of a call (no
//!   client-initiated flag) are replies to our own outbound calls and are
//!   forwarded to the waiting [`super::Connection`].
//! - Packets the peer sent as the *client* side are requests for one of our
//!   registered services. They are reassembled, checked against the duplicate
//!   tracker, dispatched to the service entry point, and answered.

use std::net::SocketAddrV4;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use futures::FutureExt;
use tracing::{debug, error, trace, warn};

use super::assembler::CallAssembler;
use super::runtime::{lock, Rx};
use super::security::SecurityClass;
use super::service::Service;
use super::transaction_tracker::{CallKey, Seen};
use super::Context;
use crate::error::codes;
use crate::protocol::xdr::rx::{make_abort, packet_type, rx_header, rx_packet, split_into_packets};

/// Processes one received packet.
pub(super) async fn handle_packet(rx: &Arc<Rx>, from: SocketAddrV4, packet: rx_packet) {
    trace!(
        "Received {:?} seq {} call {} cid {:#x} from {}",
        packet.header.ptype,
        packet.header.seq,
        packet.header.call_number,
        packet.header.cid,
        from
    );

    if !packet.header.is_client_initiated() {
        // Our outbound calls carry our epoch; anything else is stale.
        if packet.header.epoch != rx.epoch() {
            debug!("Dropping reply for foreign epoch {:#x} from {}", packet.header.epoch, from);
            return;
        }
        rx.route_reply(from, packet);
        return;
    }

    let key = CallKey {
        peer: from,
        epoch: packet.header.epoch,
        cid: packet.header.cid,
        call_number: packet.header.call_number,
    };
    match packet.header.ptype {
        packet_type::RX_PACKET_TYPE_DATA => handle_request_data(rx, from, key, packet).await,
        packet_type::RX_PACKET_TYPE_ABORT => {
            debug!(
                "Client {} aborted call {} with {:?}",
                from,
                key.call_number,
                packet.abort_code().ok()
            );
            lock(&rx.inbound).remove(&key);
        }
        packet_type::RX_PACKET_TYPE_ACKALL => {
            trace!("Client {} acknowledged call {}", from, key.call_number);
            rx.tracker.forget(&key);
        }
        other => trace!("Ignoring {:?} packet from {}", other, from),
    }
}

/// What the request path decided while holding the assembly lock.
enum Assembly {
    Incomplete,
    Complete(Vec<u8>),
    Rejected(i32),
}

/// Request path for an inbound DATA packet:
///
/// 1. Drop it unless the runtime is serving
/// 2. Find the service and security class it names, aborting if either is missing
/// 3. Replay the cached reply if the call already completed, drop it if the
///    call is still running
/// 4. Feed it to the call's assembler and dispatch the call once complete.
///    Starting a new call first discards partial calls idle for longer than
///    the retention period, and is refused once too many are pending
async fn handle_request_data(rx: &Arc<Rx>, from: SocketAddrV4, key: CallKey, packet: rx_packet) {
    if !rx.is_serving() {
        trace!("Not serving yet, dropping call {} from {}", key.call_number, from);
        return;
    }

    let Some(service) = rx.service(packet.header.service_id) else {
        warn!("Call for unknown service {} from {}", packet.header.service_id, from);
        send_abort(rx, &packet.header, from, codes::RX_INVALID_OPERATION).await;
        return;
    };
    let Some(security) = service.security_object(packet.header.security_index) else {
        warn!(
            "Service {} has no security class {} (call from {})",
            service.name(),
            packet.header.security_index,
            from
        );
        send_abort(rx, &packet.header, from, codes::RX_INVALID_OPERATION).await;
        return;
    };
    if let Err(code) = security.check_packet(&packet) {
        send_abort(rx, &packet.header, from, code).await;
        return;
    }

    match rx.tracker.lookup(&key) {
        Seen::New => {}
        Seen::InProgress => {
            debug!("Call {} from {} still executing, dropping retransmission", key.call_number, from);
            return;
        }
        Seen::Completed(reply) => {
            debug!("Replaying reply to call {} for {}", key.call_number, from);
            if let Err(e) = send_all(rx, &reply, from).await {
                warn!("Failed to replay reply: {:#}", e);
            }
            return;
        }
    }

    let outcome = {
        let mut inbound = lock(&rx.inbound);
        let config = rx.config();
        if !inbound.contains_key(&key) {
            let now = Instant::now();
            inbound.retain(|_, partial| !partial.is_idle(now, config.retention));
            if inbound.len() >= config.max_partial_calls {
                warn!("Too many partial calls, dropping call {} from {}", key.call_number, from);
                return;
            }
        }
        let result = inbound
            .entry(key)
            .or_insert_with(|| CallAssembler::new(config.max_call_packets))
            .add(&packet);
        match result {
            Ok(None) => Assembly::Incomplete,
            Ok(Some(body)) => {
                inbound.remove(&key);
                Assembly::Complete(body)
            }
            Err(code) => {
                inbound.remove(&key);
                Assembly::Rejected(code)
            }
        }
    };

    match outcome {
        Assembly::Incomplete => {}
        Assembly::Rejected(code) => send_abort(rx, &packet.header, from, code).await,
        Assembly::Complete(body) => {
            if !rx.tracker.start(key) {
                return;
            }
            let context = Context::from_header(from, &packet.header);
            tokio::spawn(execute_call(rx.clone(), service, security, context, key, packet.header, body));
        }
    }
}

/// Runs a reassembled call through the service entry point and sends the
/// reply, or an abort carrying the non-zero status.
async fn execute_call(
    rx: Arc<Rx>,
    service: Arc<Service>,
    security: Arc<dyn SecurityClass>,
    context: Context,
    key: CallKey,
    request: rx_header,
    body: Vec<u8>,
) {
    debug!("Dispatching call {:?} to service {}", context, service.name());
    let mut output = Vec::new();
    let dispatched = AssertUnwindSafe(service.entry_point().execute_request(&context, &body, &mut output))
        .catch_unwind()
        .await;
    // A panic still completes the call, with UAEIO.
    let status = dispatched.unwrap_or_else(|_| {
        error!("Service {} panicked on call {} from {}", service.name(), key.call_number, key.peer);
        codes::UAEIO
    });

    let template = rx_header {
        flags: 0,
        serial: 0,
        security_index: security.index(),
        ..request
    };
    let mut reply = if status == codes::OK {
        split_into_packets(&template, &output, rx.config().max_packet_data)
    } else {
        debug!("Call {} for {} failed with {}", key.call_number, key.peer, status);
        vec![make_abort(&template, false, status, 0)]
    };

    for packet in reply.iter_mut() {
        packet.header.serial = rx.next_serial();
        if let Err(code) = security.prepare_packet(packet) {
            *packet = make_abort(&template, false, code, rx.next_serial());
        }
    }
    // Cache before sending, so a retransmission racing the reply is answered
    // from the cache instead of being dropped as in progress.
    rx.tracker.complete(key, reply.clone());
    if let Err(e) = send_all(&rx, &reply, key.peer).await {
        warn!("Failed to send reply: {:#}", e);
    }
}

async fn send_all(rx: &Rx, packets: &[rx_packet], to: SocketAddrV4) -> anyhow::Result<()> {
    for packet in packets {
        rx.send(packet, to).await.with_context(|| {
            format!("sending seq {} of call {} to {}", packet.header.seq, packet.header.call_number, to)
        })?;
    }
    Ok(())
}

async fn send_abort(rx: &Rx, call: &rx_header, to: SocketAddrV4, code: i32) {
    let abort = make_abort(call, false, code, rx.next_serial());
    if let Err(e) = rx.send(&abort, to).await {
        warn!("Failed to send abort to {}: {:?}", to, e);
    }
}
