//! Inbound service registration.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::runtime::Rx;
use super::security::{rxnull_new_server_security_object, SecurityClass};
use super::Context;
use crate::addr::{host_to_wire, port_to_wire, socket_to_wire, wire_to_socket, Host};
use crate::error::ServiceError;

/// Entry point of a hosted service.
///
/// `input` is the whole request body, starting with the opcode. The handler
/// appends the reply body to `output` and returns the call status; a
/// non-zero status is sent to the caller as an abort and `output` is
/// discarded.
#[async_trait]
pub trait ExecuteRequest: Send + Sync {
    async fn execute_request(&self, context: &Context, input: &[u8], output: &mut Vec<u8>) -> i32;
}

/// A service as registered with the runtime.
pub struct Service {
    service_id: u16,
    name: String,
    security_objects: Vec<Arc<dyn SecurityClass>>,
    entry_point: Arc<dyn ExecuteRequest>,
}

impl Service {
    pub fn service_id(&self) -> u16 {
        self.service_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The security class registered under `index`, if any.
    pub fn security_object(&self, index: u8) -> Option<Arc<dyn SecurityClass>> {
        self.security_objects.iter().find(|s| s.index() == index).cloned()
    }

    pub fn entry_point(&self) -> &Arc<dyn ExecuteRequest> {
        &self.entry_point
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("rx::Service")
            .field("service_id", &self.service_id)
            .field("name", &self.name)
            .field("security", &self.security_objects.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

/// Keeps a service registered; the service is removed when the handle is
/// dropped or [`ServiceHandle::unregister`] is called.
#[must_use = "the service is unregistered when the handle is dropped"]
pub struct ServiceHandle {
    rx: Arc<Rx>,
    service: Arc<Service>,
}

impl ServiceHandle {
    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn unregister(self) {}
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        self.rx.unregister_service(&self.service);
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("ServiceHandle").field(&self.service).finish()
    }
}

/// Registers a service on `rx` with the null server security class.
///
/// The runtime owns one socket, so the service is reachable at the
/// runtime's address only: host 0 and port 0 mean "wherever the runtime
/// listens", anything else must match it.
pub fn new_service_host(
    rx: &Arc<Rx>,
    host: impl Into<Host>,
    port: u16,
    service_id: u16,
    name: &str,
    entry_point: Arc<dyn ExecuteRequest>,
) -> Result<ServiceHandle, ServiceError> {
    let (local_host, local_port) = socket_to_wire(&rx.local_addr());
    let mut host = host_to_wire(&host.into())?;
    let mut port = port_to_wire(port);
    if host == 0 {
        host = local_host;
    }
    if port == 0 {
        port = local_port;
    }
    // A runtime bound to the wildcard address answers for any local host.
    let host_matches = host == local_host || local_host == 0;
    if !host_matches || port != local_port {
        return Err(ServiceError::AddressMismatch {
            expected: rx.local_addr().to_string(),
            requested: wire_to_socket(host, port).to_string(),
        });
    }

    let security =
        rxnull_new_server_security_object().ok_or(ServiceError::SecurityObject("rxnull"))?;
    let service = Arc::new(Service {
        service_id,
        name: name.to_string(),
        security_objects: vec![security],
        entry_point,
    });
    rx.register_service(service.clone())?;
    info!("Registered service {} ({}) on {}", service_id, name, rx.local_addr());
    debug!("{:?}", service);
    Ok(ServiceHandle { rx: rx.clone(), service })
}
