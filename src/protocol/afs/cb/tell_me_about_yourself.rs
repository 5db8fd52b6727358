//! `RXAFSCB_TellMeAboutYourself` (opcode 65538).
//!
//! Reports the cache manager's UUID, its interface addresses and its
//! capability words. The handler must report at least one address.

use tracing::{debug, warn};

use crate::addr::{host_to_wire, wire_to_host};
use crate::error::{codes, RpcError};
use crate::handler::CallbackHandler;
use crate::protocol::rx::Context;
use crate::protocol::xdr::afsint::{afsUUID, interfaceAddr, Capabilities, AFS_MAX_INTERFACE_ADDR};
use crate::protocol::xdr::Serialize;

pub async fn rxafscb_tell_me_about_yourself(
    handler: Option<&dyn CallbackHandler>,
    context: &Context,
    output: &mut Vec<u8>,
) -> i32 {
    let Some(handler) = handler else {
        return codes::RXGEN_OPCODE;
    };
    let (addr, caps) = match describe(handler, context).await {
        Ok(reply) => reply,
        Err(e) => {
            debug!("TellMeAboutYourself from {} failed: {}", context.peer, e.code);
            return e.code;
        }
    };

    // Marshal into a scratch buffer so a failure leaves `output` untouched.
    let mut reply = Vec::new();
    if addr.serialize(&mut reply).and_then(|_| caps.serialize(&mut reply)).is_err() {
        return codes::RXGEN_SS_MARSHAL;
    }
    output.extend_from_slice(&reply);
    debug!(
        "TellMeAboutYourself from {}: {} address(es), {} capability word(s)",
        context.peer,
        addr.numberOfInterfaces,
        caps.len()
    );
    codes::OK
}

/// Collects everything the reply carries, fully populated before any of it
/// is marshaled.
async fn describe(
    handler: &dyn CallbackHandler,
    context: &Context,
) -> Result<(interfaceAddr, Capabilities), RpcError> {
    let uuid = handler.get_uuid(context).await?;
    let hosts = handler.get_local_addresses(context).await?;
    if hosts.is_empty() {
        return Err(RpcError::new(codes::RXGEN_OPCODE));
    }
    if hosts.len() > AFS_MAX_INTERFACE_ADDR {
        warn!("Handler reported {} addresses, at most {} fit", hosts.len(), AFS_MAX_INTERFACE_ADDR);
        return Err(RpcError::new(codes::UAEIO));
    }

    let mut addr = interfaceAddr {
        numberOfInterfaces: hosts.len() as i32,
        uuid: afsUUID::from(uuid),
        ..Default::default()
    };
    for (slot, host) in addr.addr_in.iter_mut().zip(&hosts) {
        // Validate through the wire form; XDR then sends the host-order value
        // in network byte order.
        let wire = host_to_wire(host).map_err(|e| {
            warn!("Cannot advertise local address: {}", e);
            RpcError::new(codes::UAEIO)
        })?;
        *slot = wire_to_host(wire);
    }

    let caps = Capabilities::from_slice(&handler.get_capabilities(context).await?)?;
    Ok((addr, caps))
}
