//! Outbound RXAFS calls.
//!
//! Each procedure lives in its own module and follows the same steps:
//!
//! 1. Marshal the opcode and the IN arguments
//! 2. Run the call over the connection
//! 3. Turn a non-zero status into [`Error::Rpc`] carrying that code
//! 4. Unmarshal the OUT arguments, failing with [`Error::Codec`]
//!
//! No call retries on its own; a failed call leaves the connection usable.

use tracing::debug;

use crate::error::{codes, CodecError, Error, RpcError};
use crate::protocol::rx::Connection;
use crate::protocol::xdr::afsint::AfsProcedure;
use crate::protocol::xdr::Serialize;

mod fetch_status;
mod get_capabilities;
mod inverse_lookup2;

pub use fetch_status::{fetch_status, FetchStatusResult};
pub use get_capabilities::get_capabilities;
pub use inverse_lookup2::inverse_lookup2;

/// Builds a request body: the opcode followed by whatever `args` writes.
fn marshal(
    opcode: AfsProcedure,
    args: impl FnOnce(&mut Vec<u8>) -> std::io::Result<()>,
) -> Result<Vec<u8>, RpcError> {
    let mut request = Vec::new();
    opcode
        .serialize(&mut request)
        .and_then(|_| args(&mut request))
        .map_err(|_| RpcError::new(codes::RXGEN_CC_MARSHAL))?;
    Ok(request)
}

/// Runs one call and hands back the reply body.
async fn invoke(conn: &mut Connection, opcode: AfsProcedure, request: &[u8]) -> Result<Vec<u8>, Error> {
    debug!("{:?} -> {}", opcode, conn.peer());
    conn.call(request).await.map_err(|e| {
        debug!("{:?} failed: {}", opcode, e.code);
        Error::Rpc(e)
    })
}

fn unmarshal_error(what: &'static str) -> impl FnOnce(std::io::Error) -> Error {
    move |e| Error::Codec(CodecError::new(what, e))
}
