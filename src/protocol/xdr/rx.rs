//! Rx packet framing.
//!
//! Every Rx datagram starts with a fixed 28-byte big-endian header followed by
//! the payload. Calls are identified by `(epoch, cid, callNumber)`; packets of
//! one call are ordered by `seq`, starting at 1.

// Keep Rx naming conventions for packet fields.
#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::cast::FromPrimitive;

use super::*;

/// Size of the packet header on the wire.
pub const RX_HEADER_SIZE: usize = 28;
/// Largest payload a single packet carries when none is configured.
pub const RX_MAX_PACKET_DATA_SIZE: usize = 1412;

/// Bits of the connection id that select the call channel.
pub const RX_CIDMASK: u32 = 0x3;
/// Shift from a connection number to its connection id.
pub const RX_CIDSHIFT: u32 = 2;

/// Security index for the null (no authentication) class.
pub const RX_SECIDX_NULL: u8 = 0;

/// Packet types.
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum packet_type {
    #[default]
    RX_PACKET_TYPE_DATA = 1,
    RX_PACKET_TYPE_ACK = 2,
    RX_PACKET_TYPE_BUSY = 3,
    RX_PACKET_TYPE_ABORT = 4,
    RX_PACKET_TYPE_ACKALL = 5,
    RX_PACKET_TYPE_CHALLENGE = 6,
    RX_PACKET_TYPE_RESPONSE = 7,
    RX_PACKET_TYPE_DEBUG = 8,
    RX_PACKET_TYPE_PARAMS = 9,
    RX_PACKET_TYPE_VERSION = 13,
}

/// The packet was sent by the side that initiated the call.
pub const RX_CLIENT_INITIATED: u8 = 0x01;
/// The sender wants an explicit acknowledgement.
pub const RX_REQUEST_ACK: u8 = 0x02;
/// Last packet of the request or reply.
pub const RX_LAST_PACKET: u8 = 0x04;
/// More packets follow.
pub const RX_MORE_PACKETS: u8 = 0x08;

/// Fixed Rx packet header.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct rx_header {
    pub epoch: u32,
    pub cid: u32,
    pub call_number: u32,
    pub seq: u32,
    pub serial: u32,
    pub ptype: packet_type,
    pub flags: u8,
    pub user_status: u8,
    pub security_index: u8,
    pub spare: u16,
    pub service_id: u16,
}

impl rx_header {
    /// Connection id with the channel bits cleared.
    pub fn conn_id(&self) -> u32 {
        self.cid & !RX_CIDMASK
    }

    pub fn channel(&self) -> u32 {
        self.cid & RX_CIDMASK
    }

    pub fn is_client_initiated(&self) -> bool {
        self.flags & RX_CLIENT_INITIATED != 0
    }

    pub fn is_last(&self) -> bool {
        self.flags & RX_LAST_PACKET != 0
    }
}

impl Serialize for rx_header {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u32::<XDREndian>(self.epoch)?;
        dest.write_u32::<XDREndian>(self.cid)?;
        dest.write_u32::<XDREndian>(self.call_number)?;
        dest.write_u32::<XDREndian>(self.seq)?;
        dest.write_u32::<XDREndian>(self.serial)?;
        dest.write_u8(self.ptype as u8)?;
        dest.write_u8(self.flags)?;
        dest.write_u8(self.user_status)?;
        dest.write_u8(self.security_index)?;
        dest.write_u16::<XDREndian>(self.spare)?;
        dest.write_u16::<XDREndian>(self.service_id)
    }
}

impl Deserialize for rx_header {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.epoch = src.read_u32::<XDREndian>()?;
        self.cid = src.read_u32::<XDREndian>()?;
        self.call_number = src.read_u32::<XDREndian>()?;
        self.seq = src.read_u32::<XDREndian>()?;
        self.serial = src.read_u32::<XDREndian>()?;
        let raw_type = src.read_u8()?;
        let Some(ptype) = packet_type::from_u8(raw_type) else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Invalid Rx packet type {raw_type}"),
            ));
        };
        self.ptype = ptype;
        self.flags = src.read_u8()?;
        self.user_status = src.read_u8()?;
        self.security_index = src.read_u8()?;
        self.spare = src.read_u16::<XDREndian>()?;
        self.service_id = src.read_u16::<XDREndian>()?;
        Ok(())
    }
}

/// A whole datagram: header plus payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct rx_packet {
    pub header: rx_header,
    pub payload: Vec<u8>,
}

impl rx_packet {
    /// Splits a received datagram into header and payload.
    pub fn parse(datagram: &[u8]) -> std::io::Result<Self> {
        let mut src = datagram;
        let header = deserialize::<rx_header>(&mut src)?;
        Ok(Self { header, payload: src.to_vec() })
    }

    pub fn to_bytes(&self) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(RX_HEADER_SIZE + self.payload.len());
        self.header.serialize(&mut buf)?;
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Error code carried by an ABORT packet.
    pub fn abort_code(&self) -> std::io::Result<i32> {
        deserialize::<i32>(&mut self.payload.as_slice())
    }
}

/// Builds the ABORT packet that terminates the call identified by `call`.
///
/// `from_client` selects which side is aborting.
pub fn make_abort(call: &rx_header, from_client: bool, code: i32, serial: u32) -> rx_packet {
    rx_packet {
        header: rx_header {
            ptype: packet_type::RX_PACKET_TYPE_ABORT,
            flags: if from_client { RX_CLIENT_INITIATED } else { 0 },
            seq: 0,
            serial,
            ..*call
        },
        payload: code.to_be_bytes().to_vec(),
    }
}

/// Splits a call body into DATA packets for the given header template.
///
/// An empty body still produces one (empty) packet so the peer sees the
/// last-packet flag.
pub fn split_into_packets(template: &rx_header, body: &[u8], max_payload: usize) -> Vec<rx_packet> {
    let max_payload = max_payload.max(1);
    let chunks: Vec<&[u8]> = if body.is_empty() {
        vec![&[][..]]
    } else {
        body.chunks(max_payload).collect()
    };
    let count = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let last = i + 1 == count;
            let mut header = rx_header {
                ptype: packet_type::RX_PACKET_TYPE_DATA,
                seq: i as u32 + 1,
                ..*template
            };
            header.flags |= if last { RX_LAST_PACKET } else { RX_MORE_PACKETS };
            rx_packet { header, payload: chunk.to_vec() }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> rx_header {
        rx_header {
            epoch: 0x5f00_0001,
            cid: 0x0000_0104,
            call_number: 3,
            flags: RX_CLIENT_INITIATED,
            service_id: 1,
            ..Default::default()
        }
    }

    #[test]
    fn header_is_28_bytes_big_endian() {
        let packet = rx_packet { header: template(), payload: vec![9, 9] };
        let bytes = packet.to_bytes().unwrap();
        assert_eq!(bytes.len(), RX_HEADER_SIZE + 2);
        assert_eq!(&bytes[0..4], &[0x5f, 0, 0, 1]);
        assert_eq!(bytes[20], packet_type::RX_PACKET_TYPE_DATA as u8);
        assert_eq!(&bytes[26..28], &[0, 1]);
        assert_eq!(rx_packet::parse(&bytes).unwrap(), packet);
    }

    #[test]
    fn unknown_packet_type_is_rejected() {
        let mut bytes = rx_packet { header: template(), payload: vec![] }.to_bytes().unwrap();
        bytes[20] = 42;
        assert!(rx_packet::parse(&bytes).is_err());
        assert!(rx_packet::parse(&bytes[..10]).is_err());
    }

    #[test]
    fn split_marks_only_the_final_packet_last() {
        let packets = split_into_packets(&template(), &[1, 2, 3, 4, 5], 2);
        assert_eq!(packets.len(), 3);
        assert_eq!(packets.iter().map(|p| p.header.seq).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(!packets[0].header.is_last());
        assert!(!packets[1].header.is_last());
        assert!(packets[2].header.is_last());
        assert!(packets.iter().all(|p| p.header.is_client_initiated()));
        assert_eq!(packets[2].payload, vec![5]);
    }

    #[test]
    fn empty_body_is_one_packet() {
        let packets = split_into_packets(&template(), &[], 1412);
        assert_eq!(packets.len(), 1);
        assert!(packets[0].header.is_last());
    }

    #[test]
    fn abort_carries_code() {
        let abort = make_abort(&template(), false, -455, 7);
        assert_eq!(abort.header.ptype, packet_type::RX_PACKET_TYPE_ABORT);
        assert!(!abort.header.is_client_initiated());
        assert_eq!(abort.abort_code().unwrap(), -455);
        assert_eq!(abort.header.call_number, 3);
    }
}
