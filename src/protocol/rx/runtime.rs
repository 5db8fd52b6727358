//! The transport runtime: one UDP socket, a receive loop, and the tables
//! that route packets to waiting client calls and registered services.

use std::collections::HashMap;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::assembler::CallAssembler;
use super::service::Service;
use super::transaction_tracker::{CallKey, TransactionTracker};
use super::{wire, RxConfig};
use crate::addr::{host_to_wire, port_to_wire, wire_to_socket, Host};
use crate::error::{ConnectionError, ServiceError};
use crate::protocol::xdr::rx::{rx_packet, RX_CIDSHIFT};

/// Largest datagram the receive loop accepts.
const MAX_DATAGRAM: usize = 65_536;

pub(super) type ReplySender = mpsc::UnboundedSender<(SocketAddrV4, rx_packet)>;
pub(super) type ReplyReceiver = mpsc::UnboundedReceiver<(SocketAddrV4, rx_packet)>;

/// Locks a mutex, recovering the data if another task panicked holding it.
pub(super) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// One Rx endpoint.
///
/// Created by [`rx_init`]; shared through `Arc` by every connection and
/// service handle built on it. Dropping the last reference stops the
/// receive loop.
pub struct Rx {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddrV4,
    epoch: u32,
    config: RxConfig,
    next_conn: AtomicU32,
    next_serial: AtomicU32,
    /// Client calls waiting for reply packets, keyed by `(conn_id, callNumber)`.
    pending: Mutex<HashMap<(u32, u32), ReplySender>>,
    services: RwLock<HashMap<u16, Arc<Service>>>,
    /// Partially received inbound requests.
    pub(super) inbound: Mutex<HashMap<CallKey, CallAssembler>>,
    pub(super) tracker: TransactionTracker,
    serving: AtomicBool,
    shutdown: watch::Sender<bool>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

/// Creates an Rx endpoint bound to `host:port` and starts its receive loop.
///
/// Port 0 picks an ephemeral port; host `0.0.0.0` listens on every interface.
/// Must be called from within a Tokio runtime.
pub async fn rx_init(
    host: impl Into<Host>,
    port: u16,
    config: RxConfig,
) -> Result<Arc<Rx>, ConnectionError> {
    let bind_addr = wire_to_socket(host_to_wire(&host.into())?, port_to_wire(port));
    let socket = UdpSocket::bind(bind_addr).await?;
    let local_addr = match socket.local_addr()? {
        SocketAddr::V4(addr) => addr,
        SocketAddr::V6(addr) => {
            return Err(ConnectionError::Open {
                addr: addr.to_string(),
                reason: "Rx endpoints are IPv4 only".to_string(),
            })
        }
    };

    // The epoch tells restarted endpoints apart; the high bit is reserved.
    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(1)
        & 0x7fff_ffff;

    let (shutdown, _) = watch::channel(false);
    let socket = Arc::new(socket);
    let rx = Arc::new(Rx {
        socket: socket.clone(),
        local_addr,
        epoch,
        tracker: TransactionTracker::new(config.retention),
        config,
        next_conn: AtomicU32::new(1),
        next_serial: AtomicU32::new(1),
        pending: Mutex::new(HashMap::new()),
        services: RwLock::new(HashMap::new()),
        inbound: Mutex::new(HashMap::new()),
        serving: AtomicBool::new(false),
        shutdown,
        receiver: Mutex::new(None),
    });

    let handle = tokio::spawn(receive_loop(Arc::downgrade(&rx), socket));
    *lock(&rx.receiver) = Some(handle);
    info!("Rx endpoint listening on {} (epoch {:#x})", local_addr, epoch);
    Ok(rx)
}

/// Reads datagrams until the endpoint is dropped or shut down.
async fn receive_loop(rx: Weak<Rx>, socket: Arc<UdpSocket>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let received = socket.recv_from(&mut buf).await;
        let Some(rx) = rx.upgrade() else {
            break;
        };
        let (len, from) = match received {
            Ok(v) => v,
            Err(e) => {
                // ICMP errors for earlier sends surface here on some platforms.
                debug!("Rx receive error: {:?}", e);
                continue;
            }
        };
        let SocketAddr::V4(from) = from else {
            trace!("Ignoring datagram from non-IPv4 peer {}", from);
            continue;
        };
        match rx_packet::parse(&buf[..len]) {
            Ok(packet) => wire::handle_packet(&rx, from, packet).await,
            Err(e) => debug!("Dropping malformed packet from {}: {:?}", from, e),
        }
    }
    debug!("Rx receive loop finished");
}

impl Rx {
    pub fn local_addr(&self) -> SocketAddrV4 {
        self.local_addr
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn config(&self) -> &RxConfig {
        &self.config
    }

    pub(super) fn next_serial(&self) -> u32 {
        self.next_serial.fetch_add(1, Ordering::Relaxed)
    }

    /// A fresh connection id with the channel bits clear.
    pub(super) fn allocate_conn_id(&self) -> u32 {
        self.next_conn.fetch_add(1, Ordering::Relaxed) << RX_CIDSHIFT
    }

    pub(super) async fn send(&self, packet: &rx_packet, to: SocketAddrV4) -> std::io::Result<()> {
        trace!(
            "Sending {:?} seq {} call {} to {}",
            packet.header.ptype,
            packet.header.seq,
            packet.header.call_number,
            to
        );
        self.socket.send_to(&packet.to_bytes()?, to).await.map(|_| ())
    }

    /// Registers a client call so the receive loop can route its replies.
    /// The registration is removed when the returned guard is dropped.
    pub(super) fn register_call(&self, conn_id: u32, call_number: u32) -> PendingCall<'_> {
        let (tx, receiver) = mpsc::unbounded_channel();
        lock(&self.pending).insert((conn_id, call_number), tx);
        PendingCall { rx: self, key: (conn_id, call_number), receiver }
    }

    pub(super) fn route_reply(&self, from: SocketAddrV4, packet: rx_packet) {
        let key = (packet.header.conn_id(), packet.header.call_number);
        match lock(&self.pending).get(&key) {
            Some(tx) => {
                let _ = tx.send((from, packet));
            }
            None => trace!("No call waiting for {:?} from {}", key, from),
        }
    }

    pub(super) fn register_service(&self, service: Arc<Service>) -> Result<(), ServiceError> {
        let mut services = self.services.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = services.get(&service.service_id()) {
            return Err(ServiceError::AlreadyRegistered {
                service_id: existing.service_id(),
                name: existing.name().to_string(),
            });
        }
        services.insert(service.service_id(), service);
        Ok(())
    }

    /// Removes `service` if it is still the one registered under its id.
    pub(super) fn unregister_service(&self, service: &Arc<Service>) {
        let mut services = self.services.write().unwrap_or_else(|e| e.into_inner());
        if services.get(&service.service_id()).is_some_and(|s| Arc::ptr_eq(s, service)) {
            services.remove(&service.service_id());
            debug!("Unregistered service {} ({})", service.service_id(), service.name());
        }
    }

    pub(super) fn service(&self, service_id: u16) -> Option<Arc<Service>> {
        self.services.read().unwrap_or_else(|e| e.into_inner()).get(&service_id).cloned()
    }

    /// Inbound requests currently held partially received.
    pub fn partial_calls(&self) -> usize {
        lock(&self.inbound).len()
    }

    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::Acquire)
    }

    /// Starts dispatching inbound calls to registered services.
    ///
    /// Calls that arrive before this are dropped; their clients retransmit.
    /// With `donate` set the calling task stays here, serving, until
    /// [`Rx::shutdown`] is called.
    pub async fn start_serving(&self, donate: bool) {
        self.serving.store(true, Ordering::Release);
        info!("Rx endpoint {} serving", self.local_addr);
        if !donate {
            return;
        }
        let mut stopped = self.shutdown.subscribe();
        while !*stopped.borrow_and_update() {
            if stopped.changed().await.is_err() {
                break;
            }
        }
        debug!("Rx endpoint {} stopped serving", self.local_addr);
    }

    /// Stops serving and terminates the receive loop. Outstanding client
    /// calls then time out.
    pub fn shutdown(&self) {
        self.serving.store(false, Ordering::Release);
        self.shutdown.send_replace(true);
        if let Some(handle) = lock(&self.receiver).take() {
            handle.abort();
        }
        info!("Rx endpoint {} shut down", self.local_addr);
    }
}

impl Drop for Rx {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.receiver).take() {
            handle.abort();
        }
        if !lock(&self.pending).is_empty() {
            warn!("Rx endpoint dropped with calls outstanding");
        }
    }
}

/// Registration of an outstanding client call; removed on drop so every
/// exit path of a call releases it.
pub(super) struct PendingCall<'a> {
    rx: &'a Rx,
    key: (u32, u32),
    pub(super) receiver: ReplyReceiver,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        lock(&self.rx.pending).remove(&self.key);
    }
}
