//! `RXAFS_InverseLookup2` (opcode 65560): resolve a file identifier into its
//! name and the identifier of the directory holding it.
//!
//! Servers send the name as a C string, so it may arrive with a trailing NUL;
//! the name handed back never contains one.

use tracing::debug;

use super::{invoke, marshal, unmarshal_error};
use crate::error::Error;
use crate::protocol::rx::Connection;
use crate::protocol::xdr::afsint::{AFSFid, AfsProcedure};
use crate::protocol::xdr::{deserialize, Serialize};

/// Returns `(name, parent)` for `fid`.
pub async fn inverse_lookup2(conn: &mut Connection, fid: AFSFid) -> Result<(String, AFSFid), Error> {
    let request = marshal(AfsProcedure::RXAFS_InverseLookup2, |buf| fid.serialize(buf))?;
    let reply = invoke(conn, AfsProcedure::RXAFS_InverseLookup2, &request).await?;

    let mut src = reply.as_slice();
    let mut name = deserialize::<String>(&mut src).map_err(unmarshal_error("InverseLookup2 name"))?;
    let parent = deserialize::<AFSFid>(&mut src).map_err(unmarshal_error("InverseLookup2 parent"))?;

    if let Some(nul) = name.find('\0') {
        name.truncate(nul);
    }
    debug!("InverseLookup2({}) -> {:?} in {}", fid, name, parent);
    Ok((name, parent))
}
