//! Behaviour the callback service needs from the embedding application.
//!
//! The callback dispatcher answers `TellMeAboutYourself` and `ProbeUuid` by
//! asking a [`CallbackHandler`] who this cache manager is. Everything else the
//! file server may call back for is either acknowledged or declined without
//! consulting the handler.

use async_trait::async_trait;
use uuid::Uuid;

use crate::addr::Host;
use crate::error::RpcError;
use crate::protocol::rx::Context;

/// Identity of the local cache manager, as reported to file servers.
///
/// Each method may fail with an [`RpcError`]; its code is returned to the
/// calling file server verbatim as the call status.
#[async_trait]
pub trait CallbackHandler: Send + Sync {
    /// UUID identifying this cache manager across restarts and address
    /// changes.
    async fn get_uuid(&self, context: &Context) -> Result<Uuid, RpcError>;

    /// Local addresses to advertise, most preferred first.
    ///
    /// At least one address is required; an empty list makes
    /// `TellMeAboutYourself` fail. At most
    /// [`AFS_MAX_INTERFACE_ADDR`](crate::protocol::xdr::afsint::AFS_MAX_INTERFACE_ADDR)
    /// addresses fit in a reply.
    async fn get_local_addresses(&self, context: &Context) -> Result<Vec<Host>, RpcError>;

    /// Capability words to advertise. The default advertises none.
    async fn get_capabilities(&self, _context: &Context) -> Result<Vec<u32>, RpcError> {
        Ok(Vec::new())
    }
}
