//! The AFS RPC interfaces spoken over Rx.
//!
//! - `client`: outbound calls to a file server (RXAFS)
//! - `cb`: the callback service a file server calls into (RXAFSCB)

pub mod cb;
pub mod client;

pub use cb::{handle_callback, new_service_rxafscb, CallbackDispatcher};
pub use client::{fetch_status, get_capabilities, inverse_lookup2, FetchStatusResult};
