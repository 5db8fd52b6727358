#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use rxafs::addr::Host;
use rxafs::error::{codes, RpcError};
use rxafs::protocol::rx::ExecuteRequest;
use rxafs::xdr::afsint::{
    AFSCallBack, AFSFetchStatus, AFSFid, AFSVolSync, AfsProcedure, Capabilities,
};
use rxafs::xdr::{deserialize, Serialize};
use rxafs::{rx_init, CallbackHandler, Context, Rx, RxConfig};

pub const README_FID: AFSFid = AFSFid::new(2, 1, 1);
pub const README_PARENT: AFSFid = AFSFid::new(2, 5, 9);
/// InverseLookup2 of this fid returns a name longer than one packet.
pub const LONG_NAME_FID: AFSFid = AFSFid::new(2, 2, 2);
pub const LONG_NAME_LEN: usize = 3000;
/// Any fid in this volume makes the server fail with `ENOENT_STATUS`.
pub const MISSING_VOLUME: u32 = 404;
pub const ENOENT_STATUS: i32 = 2;

/// Transport settings that keep failing tests fast.
pub fn fast_config() -> RxConfig {
    RxConfig::default()
        .with_retransmit(Duration::from_millis(100))
        .with_max_attempts(10)
}

/// A runtime on an ephemeral loopback port.
pub async fn loopback_rx(config: RxConfig) -> Arc<Rx> {
    rx_init(Ipv4Addr::LOCALHOST, 0, config).await.expect("rx_init")
}

/// A loopback runtime that dispatches inbound calls.
pub async fn serving_rx(config: RxConfig) -> Arc<Rx> {
    let rx = loopback_rx(config).await;
    rx.start_serving(false).await;
    rx
}

pub fn test_context() -> Context {
    Context {
        peer: SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 7), 7000),
        epoch: 0x1234,
        conn_id: 4,
        channel: 0,
        call_number: 1,
        service_id: 1,
        security_index: 0,
    }
}

pub fn sample_status() -> AFSFetchStatus {
    AFSFetchStatus {
        InterfaceVersion: 1,
        FileType: 1,
        LinkCount: 1,
        Length: 4096,
        DataVersion: 7,
        Owner: 1000,
        UnixModeBits: 0o644,
        ParentVnode: 5,
        ParentUnique: 9,
        ServerModTime: 1_700_000_000,
        Length_hi: 1,
        ..Default::default()
    }
}

/// Cache manager identity used by callback tests.
pub struct FixedIdentity {
    pub uuid: Uuid,
    pub addresses: Vec<Host>,
    pub capabilities: Vec<u32>,
    /// When set, `get_uuid` fails with this code.
    pub fail_with: Option<i32>,
}

impl FixedIdentity {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            addresses: vec![Host::from("127.0.0.1"), Host::from(0x0a00_0001u32)],
            capabilities: vec![1],
            fail_with: None,
        }
    }
}

#[async_trait]
impl CallbackHandler for FixedIdentity {
    async fn get_uuid(&self, _context: &Context) -> Result<Uuid, RpcError> {
        match self.fail_with {
            Some(code) => Err(RpcError::new(code)),
            None => Ok(self.uuid),
        }
    }

    async fn get_local_addresses(&self, _context: &Context) -> Result<Vec<Host>, RpcError> {
        Ok(self.addresses.clone())
    }

    async fn get_capabilities(&self, _context: &Context) -> Result<Vec<u32>, RpcError> {
        Ok(self.capabilities.clone())
    }
}

/// A handler that fails by panicking.
pub struct PanickingIdentity;

#[async_trait]
impl CallbackHandler for PanickingIdentity {
    async fn get_uuid(&self, _context: &Context) -> Result<Uuid, RpcError> {
        panic!("identity store unavailable");
    }

    async fn get_local_addresses(&self, _context: &Context) -> Result<Vec<Host>, RpcError> {
        panic!("interface list unavailable");
    }
}

/// A file server answering the three RXAFS procedures from fixed data.
#[derive(Default)]
pub struct FakeFileServer {
    /// `None` makes GetCapabilities fail with `RXGEN_OPCODE`.
    pub capabilities: Option<Vec<u32>>,
    pub calls: AtomicUsize,
}

impl FakeFileServer {
    fn dispatch(&self, input: &mut &[u8], output: &mut Vec<u8>) -> std::io::Result<i32> {
        let opcode = deserialize::<u32>(input)?;
        if opcode == AfsProcedure::RXAFS_GetCapabilities as u32 {
            let Some(words) = &self.capabilities else {
                return Ok(codes::RXGEN_OPCODE);
            };
            Capabilities::from_slice(words)
                .map_err(|_| std::io::Error::other("too many capabilities"))?
                .serialize(output)?;
        } else if opcode == AfsProcedure::RXAFS_FetchStatus as u32 {
            let fid = deserialize::<AFSFid>(input)?;
            if fid.Volume == MISSING_VOLUME {
                return Ok(ENOENT_STATUS);
            }
            sample_status().serialize(output)?;
            AFSCallBack { CallBackVersion: 3, ExpirationTime: 7200, CallBackType: 2 }
                .serialize(output)?;
            AFSVolSync::default().serialize(output)?;
        } else if opcode == AfsProcedure::RXAFS_InverseLookup2 as u32 {
            let fid = deserialize::<AFSFid>(input)?;
            if fid == LONG_NAME_FID {
                "x".repeat(LONG_NAME_LEN).serialize(output)?;
                README_PARENT.serialize(output)?;
            } else if fid.Volume == MISSING_VOLUME {
                return Ok(ENOENT_STATUS);
            } else {
                "README\0".serialize(output)?;
                README_PARENT.serialize(output)?;
            }
        } else {
            return Ok(codes::RXGEN_OPCODE);
        }
        Ok(codes::OK)
    }
}

#[async_trait]
impl ExecuteRequest for FakeFileServer {
    async fn execute_request(&self, _context: &Context, input: &[u8], output: &mut Vec<u8>) -> i32 {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut input = input;
        self.dispatch(&mut input, output).unwrap_or(codes::RXGEN_SS_UNMARSHAL)
    }
}

/// Echoes the request body back and counts executions.
#[derive(Default)]
pub struct Echo {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ExecuteRequest for Echo {
    async fn execute_request(&self, _context: &Context, input: &[u8], output: &mut Vec<u8>) -> i32 {
        self.calls.fetch_add(1, Ordering::SeqCst);
        output.extend_from_slice(input);
        codes::OK
    }
}
