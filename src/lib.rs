//! rxafs - AFS file server and callback RPC adapter in Rust
//!
//! This library speaks the two RPC interfaces an AFS cache manager needs:
//! it calls file servers (RXAFS) to look up files, and it hosts the callback
//! service (RXAFSCB) file servers call back into.
//!
//! ## Supported Features
//!
//! - Outbound `GetCapabilities`, `FetchStatus` and `InverseLookup2`
//! - The RXAFSCB callback service: `TellMeAboutYourself` and `ProbeUuid`
//!   answered from an application-supplied handler, notifications
//!   acknowledged, everything else declined
//! - A minimal Rx transport over UDP with the null security class
//! - Asynchronous operation with Tokio runtime
//!
//! ## Main Components
//!
//! - `handler`: The [`CallbackHandler`] trait the application implements to
//!   describe itself to file servers.
//!
//! - `protocol`: The Rx transport, the RXAFS client calls, the RXAFSCB
//!   dispatcher, and XDR encoding/decoding of their wire structures.
//!
//! - `addr`: Translation of host and port values to and from wire order.
//!
//! - `volnamei`, `ridb`: Helpers for the on-disk layout of a namei
//!   fileserver: volume directory names and reverse-index records.
//!
//! ## Usage
//!
//! Create a runtime with [`rx_init`], open a [`Connection`] to a file server
//! with [`new_connection`] and issue calls from [`protocol::afs`]. To receive
//! callbacks, bind a [`CallbackHandler`] into a [`CallbackDispatcher`],
//! register it with [`new_service_rxafscb`] and call
//! [`Rx::start_serving`].

pub mod addr;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod ridb;
pub mod volnamei;

pub use error::{Error, Result};
pub use handler::CallbackHandler;
pub use protocol::afs::{new_service_rxafscb, CallbackDispatcher};
pub use protocol::rx::{
    destroy_connection, new_connection, new_service_host, rx_init, Connection, Context, Rx,
    RxConfig,
};
pub use protocol::xdr;
