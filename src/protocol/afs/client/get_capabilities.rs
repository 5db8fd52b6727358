//! `RXAFS_GetCapabilities` (opcode 65540): ask a file server which protocol
//! extensions it supports.

use tracing::debug;

use super::{invoke, marshal, unmarshal_error};
use crate::error::Error;
use crate::protocol::rx::Connection;
use crate::protocol::xdr::afsint::{AfsProcedure, Capabilities};
use crate::protocol::xdr::deserialize;

/// Returns the server's capability words, in the order sent.
pub async fn get_capabilities(conn: &mut Connection) -> Result<Vec<u32>, Error> {
    let request = marshal(AfsProcedure::RXAFS_GetCapabilities, |_| Ok(()))?;
    let reply = invoke(conn, AfsProcedure::RXAFS_GetCapabilities, &request).await?;

    // The decoded list owns its storage; consuming it here releases that
    // storage on every path out of this function.
    let caps = deserialize::<Capabilities>(&mut reply.as_slice())
        .map_err(unmarshal_error("GetCapabilities reply"))?;
    debug!("GetCapabilities -> {} word(s)", caps.len());
    Ok(caps.into_vec())
}
