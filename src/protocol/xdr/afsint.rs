//! Wire structures of the RXAFS (file server) and RXAFSCB (cache manager
//! callback) interfaces.
//!
//! Layouts follow `afsint.xg` and `afscbint.xg` field for field. Host-side
//! names keep the interface definition's spelling so the structs can be
//! cross-checked against it.

// Keep interface-definition naming for the wire structs.
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use num_derive::{FromPrimitive, ToPrimitive};
use uuid::Uuid;

use super::*;
use crate::error::{codes, RpcError};

/// Well-known UDP port of the file server.
pub const RXAFS_PORT: u16 = 7000;
/// Rx service id of the file server.
pub const RXAFS_SERVICE_ID: u16 = 1;
pub const RXAFS_SERVICE_NAME: &str = "AFS";

/// Well-known UDP port of the cache manager callback service.
pub const RXAFSCB_PORT: u16 = 7001;
/// Rx service id of the callback service.
pub const RXAFSCB_SERVICE_ID: u16 = 1;
pub const RXAFSCB_SERVICE_NAME: &str = "afs";

/// Maximum number of interfaces a client may report.
pub const AFS_MAX_INTERFACE_ADDR: usize = 32;
/// Maximum number of capability words in a [`Capabilities`] list.
pub const AFSCAPABILITIESMAX: usize = 196;

/// Client capability bit: the client understands translated error codes.
pub const CLIENT_CAPABILITY_ERRORTRANS: u32 = 0x1;

/// Procedures of the file server interface that this crate issues.
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum AfsProcedure {
    RXAFS_FetchStatus = 132,
    RXAFS_GetCapabilities = 65540,
    RXAFS_InverseLookup2 = 65560,
}
impl SerializeEnum for AfsProcedure {}
impl DeserializeEnum for AfsProcedure {}

/// Procedures of the cache manager callback interface.
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum CallbackProcedure {
    RXAFSCB_CallBack = 204,
    RXAFSCB_InitCallBackState = 205,
    RXAFSCB_Probe = 206,
    RXAFSCB_GetLock = 207,
    RXAFSCB_GetCE = 208,
    RXAFSCB_XStatsVersion = 209,
    RXAFSCB_GetXStats = 210,
    RXAFSCB_InitCallBackState2 = 211,
    RXAFSCB_WhoAreYou = 212,
    RXAFSCB_InitCallBackState3 = 213,
    RXAFSCB_ProbeUuid = 214,
    RXAFSCB_GetServerPrefs = 215,
    RXAFSCB_GetCellServDB = 216,
    RXAFSCB_GetLocalCell = 217,
    RXAFSCB_GetCacheConfig = 218,
    RXAFSCB_GetCE64 = 65536,
    RXAFSCB_GetCellByNum = 65537,
    RXAFSCB_TellMeAboutYourself = 65538,
}
impl SerializeEnum for CallbackProcedure {}
impl DeserializeEnum for CallbackProcedure {}

/// File identifier: volume, vnode and uniquifier.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct AFSFid {
    pub Volume: u32,
    pub Vnode: u32,
    pub Unique: u32,
}
DeserializeStruct!(AFSFid, Volume, Vnode, Unique);
SerializeStruct!(AFSFid, Volume, Vnode, Unique);

impl AFSFid {
    pub const fn new(volume: u32, vnode: u32, unique: u32) -> Self {
        Self { Volume: volume, Vnode: vnode, Unique: unique }
    }
}

impl fmt::Display for AFSFid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.Volume, self.Vnode, self.Unique)
    }
}

/// Failure to parse the `volume.vnode.unique` text form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFidError {
    #[error("expected \"volume.vnode.unique\", got {0} segment(s)")]
    SegmentCount(usize),
    #[error("segment {0:?} is not an unsigned 32-bit integer")]
    BadNumber(String),
}

impl FromStr for AFSFid {
    type Err = ParseFidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(ParseFidError::SegmentCount(parts.len()));
        }
        let mut fields = [0u32; 3];
        for (field, part) in fields.iter_mut().zip(&parts) {
            *field = part.parse().map_err(|_| ParseFidError::BadNumber(part.to_string()))?;
        }
        Ok(AFSFid::new(fields[0], fields[1], fields[2]))
    }
}

/// File status as reported by `FetchStatus`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AFSFetchStatus {
    pub InterfaceVersion: u32,
    pub FileType: u32,
    pub LinkCount: u32,
    pub Length: u32,
    pub DataVersion: u32,
    pub Author: u32,
    pub Owner: u32,
    pub CallerAccess: u32,
    pub AnonymousAccess: u32,
    pub UnixModeBits: u32,
    pub ParentVnode: u32,
    pub ParentUnique: u32,
    pub ResidencyMask: u32,
    pub ClientModTime: u32,
    pub ServerModTime: u32,
    pub Group: u32,
    pub SyncCounter: u32,
    pub dataVersionHigh: u32,
    pub lockCount: u32,
    pub Length_hi: u32,
    pub errorCode: u32,
}
DeserializeStruct!(
    AFSFetchStatus,
    InterfaceVersion,
    FileType,
    LinkCount,
    Length,
    DataVersion,
    Author,
    Owner,
    CallerAccess,
    AnonymousAccess,
    UnixModeBits,
    ParentVnode,
    ParentUnique,
    ResidencyMask,
    ClientModTime,
    ServerModTime,
    Group,
    SyncCounter,
    dataVersionHigh,
    lockCount,
    Length_hi,
    errorCode
);
SerializeStruct!(
    AFSFetchStatus,
    InterfaceVersion,
    FileType,
    LinkCount,
    Length,
    DataVersion,
    Author,
    Owner,
    CallerAccess,
    AnonymousAccess,
    UnixModeBits,
    ParentVnode,
    ParentUnique,
    ResidencyMask,
    ClientModTime,
    ServerModTime,
    Group,
    SyncCounter,
    dataVersionHigh,
    lockCount,
    Length_hi,
    errorCode
);

impl AFSFetchStatus {
    /// Full 64-bit file length.
    pub fn length64(&self) -> u64 {
        (u64::from(self.Length_hi) << 32) | u64::from(self.Length)
    }

    /// Full 64-bit data version.
    pub fn data_version64(&self) -> u64 {
        (u64::from(self.dataVersionHigh) << 32) | u64::from(self.DataVersion)
    }
}

/// Meaning of [`AFSCallBack::CallBackType`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum CallBackType {
    Exclusive = 1,
    Shared = 2,
    Dropped = 3,
}

/// Callback promise attached to fetched status.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AFSCallBack {
    pub CallBackVersion: u32,
    pub ExpirationTime: u32,
    pub CallBackType: u32,
}
DeserializeStruct!(AFSCallBack, CallBackVersion, ExpirationTime, CallBackType);
SerializeStruct!(AFSCallBack, CallBackVersion, ExpirationTime, CallBackType);

impl AFSCallBack {
    /// Interpreted callback type; `None` for values the protocol does not define.
    pub fn kind(&self) -> Option<CallBackType> {
        num_traits::FromPrimitive::from_u32(self.CallBackType)
    }
}

/// Reserved volume synchronisation block, passed through untouched.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AFSVolSync {
    pub spare1: u32,
    pub spare2: u32,
    pub spare3: u32,
    pub spare4: u32,
    pub spare5: u32,
    pub spare6: u32,
}
DeserializeStruct!(AFSVolSync, spare1, spare2, spare3, spare4, spare5, spare6);
SerializeStruct!(AFSVolSync, spare1, spare2, spare3, spare4, spare5, spare6);

/// DCE-style UUID as the callback interface transmits it.
///
/// On the wire each sub-field is a separate XDR unit (11 units, 44 bytes),
/// not the 16 packed bytes of RFC 4122.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct afsUUID {
    pub time_low: u32,
    pub time_mid: u16,
    pub time_hi_and_version: u16,
    pub clock_seq_hi_and_reserved: u8,
    pub clock_seq_low: u8,
    pub node: [u8; 6],
}
DeserializeStruct!(
    afsUUID,
    time_low,
    time_mid,
    time_hi_and_version,
    clock_seq_hi_and_reserved,
    clock_seq_low,
    node
);
SerializeStruct!(
    afsUUID,
    time_low,
    time_mid,
    time_hi_and_version,
    clock_seq_hi_and_reserved,
    clock_seq_low,
    node
);

impl afsUUID {
    /// The 16 packed bytes in RFC 4122 field order.
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.time_low.to_be_bytes());
        out[4..6].copy_from_slice(&self.time_mid.to_be_bytes());
        out[6..8].copy_from_slice(&self.time_hi_and_version.to_be_bytes());
        out[8] = self.clock_seq_hi_and_reserved;
        out[9] = self.clock_seq_low;
        out[10..16].copy_from_slice(&self.node);
        out
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let mut node = [0u8; 6];
        node.copy_from_slice(&bytes[10..16]);
        Self {
            time_low: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            time_mid: u16::from_be_bytes([bytes[4], bytes[5]]),
            time_hi_and_version: u16::from_be_bytes([bytes[6], bytes[7]]),
            clock_seq_hi_and_reserved: bytes[8],
            clock_seq_low: bytes[9],
            node,
        }
    }
}

impl From<Uuid> for afsUUID {
    fn from(uuid: Uuid) -> Self {
        afsUUID::from_bytes(*uuid.as_bytes())
    }
}

impl From<afsUUID> for Uuid {
    fn from(uuid: afsUUID) -> Self {
        Uuid::from_bytes(uuid.to_bytes())
    }
}

/// Interfaces the cache manager reports about itself.
///
/// All three arrays are always encoded in full; only the first
/// `numberOfInterfaces` entries are meaningful.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct interfaceAddr {
    pub numberOfInterfaces: i32,
    pub uuid: afsUUID,
    pub addr_in: [u32; AFS_MAX_INTERFACE_ADDR],
    pub subnetmask: [u32; AFS_MAX_INTERFACE_ADDR],
    pub mtu: [u32; AFS_MAX_INTERFACE_ADDR],
}
DeserializeStruct!(interfaceAddr, numberOfInterfaces, uuid, addr_in, subnetmask, mtu);
SerializeStruct!(interfaceAddr, numberOfInterfaces, uuid, addr_in, subnetmask, mtu);

impl Default for interfaceAddr {
    fn default() -> Self {
        Self {
            numberOfInterfaces: 0,
            uuid: afsUUID::default(),
            addr_in: [0; AFS_MAX_INTERFACE_ADDR],
            subnetmask: [0; AFS_MAX_INTERFACE_ADDR],
            mtu: [0; AFS_MAX_INTERFACE_ADDR],
        }
    }
}

impl interfaceAddr {
    /// Populated host-order addresses.
    pub fn addresses(&self) -> &[u32] {
        let n = usize::try_from(self.numberOfInterfaces)
            .unwrap_or(0)
            .min(AFS_MAX_INTERFACE_ADDR);
        &self.addr_in[..n]
    }
}

/// Variable-length capability word list, bounded by [`AFSCAPABILITIESMAX`].
///
/// The list owns its storage. [`Capabilities::alloc`] is the only way to size
/// one for a reply; the storage is released exactly once, when the value is
/// dropped or consumed by [`Capabilities::into_vec`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    val: Vec<u32>,
}

impl Capabilities {
    /// Maximum backing storage, in bytes.
    pub const MAX_BYTES: usize = AFSCAPABILITIESMAX * std::mem::size_of::<u32>();

    /// Allocates a zeroed list of `len` words. Sizing is checked in bytes;
    /// a request beyond [`Self::MAX_BYTES`] fails with `UAENOMEM`.
    pub fn alloc(len: usize) -> Result<Self, RpcError> {
        let bytes = len
            .checked_mul(std::mem::size_of::<u32>())
            .filter(|b| *b <= Self::MAX_BYTES)
            .ok_or(RpcError::new(codes::UAENOMEM))?;
        let mut val = Vec::new();
        val.try_reserve_exact(bytes / std::mem::size_of::<u32>())
            .map_err(|_| RpcError::new(codes::UAENOMEM))?;
        val.resize(len, 0);
        Ok(Self { val })
    }

    /// Allocates and fills a list from `words`.
    pub fn from_slice(words: &[u32]) -> Result<Self, RpcError> {
        let mut caps = Self::alloc(words.len())?;
        caps.val.copy_from_slice(words);
        Ok(caps)
    }

    pub fn len(&self) -> usize {
        self.val.len()
    }

    pub fn is_empty(&self) -> bool {
        self.val.is_empty()
    }

    /// Size of the backing storage in bytes.
    pub fn byte_len(&self) -> usize {
        self.val.len() * std::mem::size_of::<u32>()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.val
    }

    pub fn as_mut_slice(&mut self) -> &mut [u32] {
        &mut self.val
    }

    /// Consumes the list, handing its words to the caller.
    pub fn into_vec(self) -> Vec<u32> {
        self.val
    }
}

impl Serialize for Capabilities {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        if self.val.len() > AFSCAPABILITIESMAX {
            return Err(utils::invalid_data("capability list exceeds its bound"));
        }
        UsizeAsU32(self.val.len()).serialize(dest)?;
        for word in &self.val {
            word.serialize(dest)?;
        }
        Ok(())
    }
}

impl Deserialize for Capabilities {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let length = read_bounded_len(src, AFSCAPABILITIESMAX)?;
        let mut caps = Capabilities::alloc(length)
            .map_err(|_| utils::invalid_data("cannot allocate capability list"))?;
        for word in caps.as_mut_slice() {
            word.deserialize(src)?;
        }
        *self = caps;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::xdr::{decode, encode};

    #[test]
    fn fid_text_form() {
        assert_eq!("2.1.1".parse::<AFSFid>().unwrap(), AFSFid::new(2, 1, 1));
        assert_eq!(" 536870915.4.77 \n".parse::<AFSFid>().unwrap(), AFSFid::new(536870915, 4, 77));
        assert_eq!("2.1".parse::<AFSFid>(), Err(ParseFidError::SegmentCount(2)));
        assert_eq!("1.2.3.4".parse::<AFSFid>(), Err(ParseFidError::SegmentCount(4)));
        assert!(matches!("2.x.1".parse::<AFSFid>(), Err(ParseFidError::BadNumber(_))));
        assert!(matches!("2.-1.1".parse::<AFSFid>(), Err(ParseFidError::BadNumber(_))));
        assert_eq!(AFSFid::new(2, 5, 9).to_string(), "2.5.9");
    }

    #[test]
    fn uuid_wire_is_eleven_units() {
        let uuid = afsUUID::from(Uuid::from_u128(0x0011_2233_4455_6677_8899_aabb_ccdd_eeff));
        let buf = encode(&uuid).unwrap();
        assert_eq!(buf.len(), 44);
        assert_eq!(&buf[0..4], &[0x00, 0x11, 0x22, 0x33]);
        assert_eq!(&buf[4..8], &[0, 0, 0x44, 0x55]);
        assert_eq!(&buf[8..12], &[0, 0, 0x66, 0x77]);
        assert_eq!(&buf[12..16], &[0, 0, 0, 0x88]);
        assert_eq!(&buf[40..44], &[0, 0, 0, 0xff]);
        assert_eq!(Uuid::from(decode::<afsUUID>(&buf).unwrap()), Uuid::from(uuid));
    }

    #[test]
    fn interface_addr_always_carries_full_arrays() {
        let buf = encode(&interfaceAddr::default()).unwrap();
        assert_eq!(buf.len(), 4 + 44 + 3 * 4 * AFS_MAX_INTERFACE_ADDR);
    }

    #[test]
    fn capabilities_allocation_is_bounded_in_bytes() {
        assert_eq!(Capabilities::alloc(0).unwrap().byte_len(), 0);
        assert_eq!(Capabilities::alloc(3).unwrap().byte_len(), 12);
        assert!(Capabilities::alloc(AFSCAPABILITIESMAX).is_ok());
        assert_eq!(Capabilities::alloc(AFSCAPABILITIESMAX + 1), Err(RpcError::new(codes::UAENOMEM)));
        assert_eq!(Capabilities::alloc(usize::MAX), Err(RpcError::new(codes::UAENOMEM)));
    }

    #[test]
    fn oversized_capability_length_is_rejected() {
        let mut buf = encode(&(AFSCAPABILITIESMAX as u32 + 1)).unwrap();
        buf.extend(std::iter::repeat(0u8).take(4 * (AFSCAPABILITIESMAX + 1)));
        assert!(decode::<Capabilities>(&buf).is_err());
    }

    #[test]
    fn callback_kind() {
        let cb = AFSCallBack { CallBackVersion: 1, ExpirationTime: 60, CallBackType: 2 };
        assert_eq!(cb.kind(), Some(CallBackType::Shared));
        assert_eq!(AFSCallBack { CallBackType: 9, ..cb }.kind(), None);
    }
}
