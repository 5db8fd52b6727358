//! `RXAFSCB_ProbeUuid` (opcode 214).
//!
//! A file server that knows this client under some UUID asks whether it is
//! still talking to the same cache manager. The answer is the call status
//! itself: 0 when the UUIDs match, 1 when they do not.

use std::io::Read;

use tracing::debug;

use crate::error::codes;
use crate::handler::CallbackHandler;
use crate::protocol::rx::Context;
use crate::protocol::xdr::afsint::afsUUID;
use crate::protocol::xdr::deserialize;

/// Status for a UUID that differs from ours.
const UUID_MISMATCH: i32 = 1;

pub async fn rxafscb_probe_uuid(
    handler: Option<&dyn CallbackHandler>,
    context: &Context,
    input: &mut impl Read,
) -> i32 {
    let Some(handler) = handler else {
        return codes::RXGEN_OPCODE;
    };
    let candidate = match deserialize::<afsUUID>(input) {
        Ok(uuid) => uuid,
        Err(e) => {
            debug!("ProbeUuid from {}: bad argument: {:?}", context.peer, e);
            return codes::RXGEN_SS_UNMARSHAL;
        }
    };
    match handler.get_uuid(context).await {
        Ok(own) if afsUUID::from(own).to_bytes() == candidate.to_bytes() => codes::OK,
        Ok(own) => {
            debug!("ProbeUuid from {}: {} is not {}", context.peer, uuid::Uuid::from(candidate), own);
            UUID_MISMATCH
        }
        Err(e) => e.code,
    }
}
