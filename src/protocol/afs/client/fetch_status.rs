//! `RXAFS_FetchStatus` (opcode 132).

use std::io::Read;

use tracing::debug;

use super::{invoke, marshal, unmarshal_error};
use crate::error::Error;
use crate::protocol::rx::Connection;
use crate::protocol::xdr::afsint::{AFSCallBack, AFSFetchStatus, AFSFid, AFSVolSync, AfsProcedure};
use crate::protocol::xdr::{deserialize, Serialize};

/// Everything `FetchStatus` returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchStatusResult {
    pub status: AFSFetchStatus,
    /// Callback promise; the caller decides whether to track its expiry.
    pub callback: AFSCallBack,
    pub volsync: AFSVolSync,
}

pub async fn fetch_status(conn: &mut Connection, fid: AFSFid) -> Result<FetchStatusResult, Error> {
    let request = marshal(AfsProcedure::RXAFS_FetchStatus, |buf| fid.serialize(buf))?;
    let reply = invoke(conn, AfsProcedure::RXAFS_FetchStatus, &request).await?;
    let result = read_reply(&mut reply.as_slice()).map_err(unmarshal_error("FetchStatus reply"))?;
    debug!("FetchStatus({}) -> type {} length {}", fid, result.status.FileType, result.status.length64());
    Ok(result)
}

fn read_reply(src: &mut impl Read) -> std::io::Result<FetchStatusResult> {
    Ok(FetchStatusResult {
        status: deserialize(src)?,
        callback: deserialize(src)?,
        volsync: deserialize(src)?,
    })
}
