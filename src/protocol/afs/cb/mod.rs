//! RXAFSCB: the callback service a file server calls back into.
//!
//! Every inbound call lands in [`handle_callback`], which reads the opcode
//! and answers with a status for every procedure of the interface:
//!
//! 1. TellMeAboutYourself - describe this cache manager (needs a handler)
//! 2. ProbeUuid - check whether this cache manager has a given UUID (needs a handler)
//! 3. CallBack, Probe, InitCallBackState{,2,3} - acknowledged and ignored
//! 4. Everything else, known or not - `RXGEN_OPCODE`
//!
//! Handlers are installed into a [`CallbackDispatcher`], which is registered
//! as the service's entry point by [`new_service_rxafscb`].

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use num_traits::cast::FromPrimitive;
use tracing::{debug, trace, warn};

use crate::error::{codes, ServiceError};
use crate::handler::CallbackHandler;
use crate::protocol::rx::{new_service_host, Context, ExecuteRequest, Rx, ServiceHandle};
use crate::protocol::xdr::afsint::{CallbackProcedure, RXAFSCB_SERVICE_ID, RXAFSCB_SERVICE_NAME};
use crate::protocol::xdr::deserialize;

mod probe_uuid;
mod tell_me_about_yourself;

use probe_uuid::rxafscb_probe_uuid;
use tell_me_about_yourself::rxafscb_tell_me_about_yourself;

/// Routes inbound callback calls to the installed [`CallbackHandler`].
///
/// Starts unbound. [`bind`](Self::bind) swaps the whole handler in one
/// step: a call observes either the previous handler or the new one.
#[derive(Default)]
pub struct CallbackDispatcher {
    handler: RwLock<Option<Arc<dyn CallbackHandler>>>,
}

impl CallbackDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `handler`, replacing any previous one. Returns the previous
    /// handler.
    pub fn bind(&self, handler: Arc<dyn CallbackHandler>) -> Option<Arc<dyn CallbackHandler>> {
        let mut slot = self.handler.write().unwrap_or_else(|e| e.into_inner());
        debug!("Binding callback handler (replacing: {})", slot.is_some());
        slot.replace(handler)
    }

    /// Removes the installed handler, returning to the unbound state.
    pub fn unbind(&self) -> Option<Arc<dyn CallbackHandler>> {
        self.handler.write().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// The handler a call starting now would use.
    pub fn handler(&self) -> Option<Arc<dyn CallbackHandler>> {
        self.handler.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_bound(&self) -> bool {
        self.handler.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }
}

impl std::fmt::Debug for CallbackDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("CallbackDispatcher").field("bound", &self.is_bound()).finish()
    }
}

#[async_trait]
impl ExecuteRequest for CallbackDispatcher {
    async fn execute_request(&self, context: &Context, input: &[u8], output: &mut Vec<u8>) -> i32 {
        handle_callback(self, context, input, output).await
    }
}

/// Registers the callback service on `rx`'s address, with `dispatcher` as its
/// entry point.
pub fn new_service_rxafscb(
    rx: &Arc<Rx>,
    dispatcher: Arc<CallbackDispatcher>,
) -> Result<ServiceHandle, ServiceError> {
    new_service_host(rx, 0u32, 0, RXAFSCB_SERVICE_ID, RXAFSCB_SERVICE_NAME, dispatcher)
}

/// Dispatches one callback call and returns its status.
///
/// Reply data is appended to `output` only when the status is zero.
pub async fn handle_callback(
    dispatcher: &CallbackDispatcher,
    context: &Context,
    input: &[u8],
    output: &mut Vec<u8>,
) -> i32 {
    let mut input = input;
    let Ok(opcode) = deserialize::<u32>(&mut input) else {
        warn!("Callback call without an opcode from {}", context.peer);
        return codes::RXGEN_DECODE;
    };
    let Some(procedure) = CallbackProcedure::from_u32(opcode) else {
        warn!("Unknown callback opcode {} from {}", opcode, context.peer);
        return codes::RXGEN_OPCODE;
    };

    // One snapshot per call, so a concurrent bind never changes the handler
    // halfway through a procedure.
    let handler = dispatcher.handler();

    use CallbackProcedure::*;
    match procedure {
        RXAFSCB_TellMeAboutYourself => {
            rxafscb_tell_me_about_yourself(handler.as_deref(), context, output).await
        }
        RXAFSCB_ProbeUuid => rxafscb_probe_uuid(handler.as_deref(), context, &mut input).await,
        RXAFSCB_CallBack
        | RXAFSCB_Probe
        | RXAFSCB_InitCallBackState
        | RXAFSCB_InitCallBackState2
        | RXAFSCB_InitCallBackState3 => {
            trace!("{:?} from {} acknowledged", procedure, context.peer);
            codes::OK
        }
        RXAFSCB_GetLock
        | RXAFSCB_GetCE
        | RXAFSCB_XStatsVersion
        | RXAFSCB_GetXStats
        | RXAFSCB_WhoAreYou
        | RXAFSCB_GetServerPrefs
        | RXAFSCB_GetCellServDB
        | RXAFSCB_GetLocalCell
        | RXAFSCB_GetCacheConfig
        | RXAFSCB_GetCE64
        | RXAFSCB_GetCellByNum => {
            debug!("Unimplemented callback procedure {:?} from {}", procedure, context.peer);
            codes::RXGEN_OPCODE
        }
    }
}
