//! Reassembly of a call body from its DATA packets.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::error::codes;
use crate::protocol::xdr::rx::rx_packet;

/// Collects the DATA packets of one request or reply.
///
/// Packets may arrive out of order or more than once; the body is complete
/// once the packet flagged last and every sequence number before it are in.
#[derive(Debug)]
pub struct CallAssembler {
    packets: BTreeMap<u32, Vec<u8>>,
    last_seq: Option<u32>,
    max_packets: usize,
    last_activity: Instant,
}

impl CallAssembler {
    pub fn new(max_packets: usize) -> Self {
        Self { packets: BTreeMap::new(), last_seq: None, max_packets, last_activity: Instant::now() }
    }

    /// Whether no packet arrived for longer than `max_idle`.
    pub fn is_idle(&self, now: Instant, max_idle: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) > max_idle
    }

    /// Adds a packet. Returns the whole body once complete, or the abort code
    /// to use when the packet cannot belong to a well-formed call.
    pub fn add(&mut self, packet: &rx_packet) -> Result<Option<Vec<u8>>, i32> {
        let seq = packet.header.seq;
        if seq == 0 || seq as usize > self.max_packets {
            return Err(codes::RX_PROTOCOL_ERROR);
        }
        self.last_activity = Instant::now();
        if packet.header.is_last() {
            match self.last_seq {
                Some(last) if last != seq => return Err(codes::RX_PROTOCOL_ERROR),
                Some(_) => {}
                None => {
                    // Packets already held beyond the last one can never fit.
                    if self.packets.last_key_value().is_some_and(|(held, _)| *held > seq) {
                        return Err(codes::RX_PROTOCOL_ERROR);
                    }
                    self.last_seq = Some(seq);
                }
            }
        }
        if let Some(last) = self.last_seq {
            if seq > last {
                return Err(codes::RX_PROTOCOL_ERROR);
            }
        }
        self.packets.entry(seq).or_insert_with(|| packet.payload.clone());

        match self.last_seq {
            Some(last) if self.packets.len() == last as usize => {
                let body = std::mem::take(&mut self.packets).into_values().flatten().collect();
                Ok(Some(body))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::xdr::rx::{rx_header, RX_LAST_PACKET};

    fn packet(seq: u32, last: bool, payload: &[u8]) -> rx_packet {
        rx_packet {
            header: rx_header {
                seq,
                flags: if last { RX_LAST_PACKET } else { 0 },
                ..Default::default()
            },
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn single_packet_completes_immediately() {
        let mut asm = CallAssembler::new(8);
        assert_eq!(asm.add(&packet(1, true, b"abc")), Ok(Some(b"abc".to_vec())));
    }

    #[test]
    fn out_of_order_and_duplicates() {
        let mut asm = CallAssembler::new(8);
        assert_eq!(asm.add(&packet(3, true, b"ef")), Ok(None));
        assert_eq!(asm.add(&packet(1, false, b"ab")), Ok(None));
        assert_eq!(asm.add(&packet(1, false, b"XX")), Ok(None));
        assert_eq!(asm.add(&packet(2, false, b"cd")), Ok(Some(b"abcdef".to_vec())));
    }

    #[test]
    fn malformed_sequences_are_rejected() {
        let mut asm = CallAssembler::new(2);
        assert_eq!(asm.add(&packet(0, true, b"")), Err(codes::RX_PROTOCOL_ERROR));
        assert_eq!(asm.add(&packet(3, false, b"")), Err(codes::RX_PROTOCOL_ERROR));

        let mut asm = CallAssembler::new(8);
        assert_eq!(asm.add(&packet(2, true, b"")), Ok(None));
        assert_eq!(asm.add(&packet(4, false, b"")), Err(codes::RX_PROTOCOL_ERROR));
        assert_eq!(asm.add(&packet(1, true, b"")), Err(codes::RX_PROTOCOL_ERROR));

        let mut asm = CallAssembler::new(8);
        assert_eq!(asm.add(&packet(1, false, b"")), Ok(None));
        assert_eq!(asm.add(&packet(2, false, b"")), Ok(None));
        assert_eq!(asm.add(&packet(4, false, b"")), Ok(None));
        assert_eq!(asm.add(&packet(3, true, b"")), Err(codes::RX_PROTOCOL_ERROR));
    }

    #[test]
    fn idle_time_counts_from_the_latest_packet() {
        let mut asm = CallAssembler::new(8);
        let start = Instant::now();
        assert!(!asm.is_idle(start, Duration::from_secs(1)));
        assert!(asm.is_idle(start + Duration::from_secs(2), Duration::from_secs(1)));

        std::thread::sleep(Duration::from_millis(20));
        asm.add(&packet(2, false, b"")).unwrap();
        assert!(!asm.is_idle(Instant::now(), Duration::from_millis(10)));
    }
}
