//! Protocol module implements the AFS file server and callback interfaces on
//! top of the Rx RPC protocol.
//!
//! This module contains three main components:
//!
//! - `xdr`: External Data Representation (XDR) for the wire structures of the
//!   RXAFS and RXAFSCB interfaces and for Rx packet headers.
//!
//! - `rx`: A minimal Rx transport over UDP: connections, service registration,
//!   call reassembly and duplicate-call suppression.
//!
//! - `afs`: The outbound file server calls and the inbound callback dispatcher.

pub mod afs;
pub mod rx;
pub mod xdr;
