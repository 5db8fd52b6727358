//! Host and port translation between human-readable and wire forms.
//!
//! Rx takes addresses and ports in network byte order, stored in ordinary
//! integers. A "wire" value here is such an integer: its in-memory bytes are
//! the network-order bytes, whatever the host's endianness.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::error::AddressError;

/// A host as callers supply it: dotted-decimal text or a host-order integer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Host {
    Dotted(String),
    Addr(u32),
}

impl From<&str> for Host {
    fn from(s: &str) -> Self {
        Host::Dotted(s.to_string())
    }
}

impl From<String> for Host {
    fn from(s: String) -> Self {
        Host::Dotted(s)
    }
}

impl From<u32> for Host {
    fn from(addr: u32) -> Self {
        Host::Addr(addr)
    }
}

impl From<Ipv4Addr> for Host {
    fn from(addr: Ipv4Addr) -> Self {
        Host::Addr(u32::from(addr))
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Host::Dotted(s) => f.write_str(s),
            Host::Addr(a) => write!(f, "{}", Ipv4Addr::from(*a)),
        }
    }
}

/// Parses strict dotted-decimal: exactly four segments, each 0..=255.
pub fn parse_dotted(s: &str) -> Result<[u8; 4], AddressError> {
    let segments: Vec<&str> = s.split('.').collect();
    if segments.len() != 4 {
        return Err(AddressError::SegmentCount(s.to_string()));
    }
    let mut octets = [0u8; 4];
    for (octet, segment) in octets.iter_mut().zip(&segments) {
        if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AddressError::BadOctet(s.to_string()));
        }
        *octet = segment.parse().map_err(|_| AddressError::BadOctet(s.to_string()))?;
    }
    Ok(octets)
}

/// Converts a host to its network-order wire integer.
///
/// Dotted text is parsed into four octets laid out in memory as written;
/// integers are treated as host order and byte-swapped where needed.
pub fn host_to_wire(host: &Host) -> Result<u32, AddressError> {
    match host {
        Host::Dotted(s) => Ok(u32::from_ne_bytes(parse_dotted(s)?)),
        Host::Addr(a) => Ok(a.to_be()),
    }
}

/// Inverse of [`host_to_wire`]: a network-order wire integer to host order.
pub fn wire_to_host(wire: u32) -> u32 {
    u32::from_be(wire)
}

pub fn port_to_wire(port: u16) -> u16 {
    port.to_be()
}

pub fn wire_to_port(wire: u16) -> u16 {
    u16::from_be(wire)
}

/// Socket address for a pair of wire values.
pub fn wire_to_socket(host: u32, port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::from(wire_to_host(host)), wire_to_port(port))
}

/// Wire values for a socket address.
pub fn socket_to_wire(addr: &SocketAddrV4) -> (u32, u16) {
    (u32::from(*addr.ip()).to_be(), port_to_wire(addr.port()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_wire_bytes_are_network_order() {
        let wire = host_to_wire(&"127.0.0.1".into()).unwrap();
        assert_eq!(wire.to_ne_bytes(), [127, 0, 0, 1]);
        assert_eq!(wire_to_host(wire), 0x7f00_0001);
    }

    #[test]
    fn integer_and_text_agree() {
        let text = host_to_wire(&"10.1.2.3".into()).unwrap();
        let int = host_to_wire(&Host::Addr(0x0a01_0203)).unwrap();
        assert_eq!(text, int);
    }

    #[test]
    fn integers_round_trip() {
        for a in [0u32, 1, 0x7f00_0001, 0xc0a8_0101, u32::MAX] {
            assert_eq!(wire_to_host(host_to_wire(&Host::Addr(a)).unwrap()), a);
        }
        for p in [0u16, 7000, 7001, u16::MAX] {
            assert_eq!(wire_to_port(port_to_wire(p)), p);
        }
    }

    #[test]
    fn dotted_round_trips_to_host_order() {
        let octets = [0u8, 1, 9, 10, 99, 127, 128, 200, 254, 255];
        for &a in &octets {
            for &b in &octets {
                for &c in &octets {
                    for &d in &octets {
                        let ip = Ipv4Addr::new(a, b, c, d);
                        let wire = host_to_wire(&ip.to_string().into()).unwrap();
                        assert_eq!(wire_to_host(wire), u32::from(ip), "{ip}");
                        assert_eq!(wire.to_ne_bytes(), [a, b, c, d]);
                    }
                }
            }
        }
    }

    #[test]
    fn malformed_text_is_rejected() {
        for bad in ["1.2.3", "1.2.3.4.5", "1.2.3.256", "", "a.b.c.d", "1..2.3", "1.2.3.-4", "1.2.3. 4"] {
            assert!(host_to_wire(&bad.into()).is_err(), "{bad:?} should be rejected");
        }
        assert_eq!(
            host_to_wire(&"1.2.3".into()),
            Err(AddressError::SegmentCount("1.2.3".to_string()))
        );
        assert_eq!(
            host_to_wire(&"1.2.3.256".into()),
            Err(AddressError::BadOctet("1.2.3.256".to_string()))
        );
    }

    #[test]
    fn socket_round_trip() {
        let sock = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 9), 7001);
        let (host, port) = socket_to_wire(&sock);
        assert_eq!(wire_to_socket(host, port), sock);
    }
}
