//! Duplicate-call detection for inbound Rx calls.
//!
//! A client that does not hear back retransmits its request packets. The
//! tracker makes sure each call is dispatched once: packets of a call that is
//! still executing are dropped, and packets of a call that already completed
//! are answered by replaying the cached reply. Completed entries are kept for
//! a retention period and then discarded.

use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::protocol::xdr::rx::rx_packet;

/// Identity of one call: peer plus `(epoch, cid, callNumber)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallKey {
    pub peer: SocketAddrV4,
    pub epoch: u32,
    pub cid: u32,
    pub call_number: u32,
}

/// What to do with a request packet.
#[derive(Debug)]
pub enum Seen {
    /// Never seen: keep assembling or dispatch.
    New,
    /// Currently executing: drop the packet.
    InProgress,
    /// Already answered: send these packets again.
    Completed(Vec<rx_packet>),
}

pub struct TransactionTracker {
    retention_period: Duration,
    transactions: Mutex<HashMap<CallKey, TransactionState>>,
}

impl TransactionTracker {
    pub fn new(retention_period: Duration) -> Self {
        Self {
            retention_period,
            transactions: Mutex::new(HashMap::new()),
        }
    }

    /// Looks a call up without changing its state.
    pub fn lookup(&self, key: &CallKey) -> Seen {
        let mut transactions = self.lock();
        housekeeping(&mut transactions, self.retention_period);
        match transactions.get(key) {
            None => Seen::New,
            Some(TransactionState::InProgress) => Seen::InProgress,
            Some(TransactionState::Completed(_, reply)) => Seen::Completed(reply.clone()),
        }
    }

    /// Marks a call as dispatched. Returns `false` if it already was.
    pub fn start(&self, key: CallKey) -> bool {
        let mut transactions = self.lock();
        if let std::collections::hash_map::Entry::Vacant(e) = transactions.entry(key) {
            e.insert(TransactionState::InProgress);
            true
        } else {
            false
        }
    }

    /// Records the reply sent for a call so retransmissions can be answered.
    pub fn complete(&self, key: CallKey, reply: Vec<rx_packet>) {
        let mut transactions = self.lock();
        transactions.insert(key, TransactionState::Completed(Instant::now(), reply));
    }

    /// Forgets a call, e.g. once the client acknowledged the reply.
    pub fn forget(&self, key: &CallKey) {
        self.lock().remove(key);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CallKey, TransactionState>> {
        // A poisoned map only means another call panicked mid-update; the
        // entries themselves are still consistent.
        self.transactions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Drops completed calls older than `max_age`. In-progress calls are kept
/// regardless of age so a slow handler is never dispatched twice.
fn housekeeping(transactions: &mut HashMap<CallKey, TransactionState>, max_age: Duration) {
    let now = Instant::now();
    transactions.retain(|_, v| match v {
        TransactionState::InProgress => true,
        TransactionState::Completed(at, _) => now.duration_since(*at) <= max_age,
    });
}

enum TransactionState {
    InProgress,
    Completed(Instant, Vec<rx_packet>),
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn key(call_number: u32) -> CallKey {
        CallKey {
            peer: SocketAddrV4::new(Ipv4Addr::LOCALHOST, 7000),
            epoch: 1,
            cid: 4,
            call_number,
        }
    }

    #[test]
    fn call_lifecycle() {
        let tracker = TransactionTracker::new(Duration::from_secs(60));
        assert!(matches!(tracker.lookup(&key(1)), Seen::New));
        assert!(tracker.start(key(1)));
        assert!(!tracker.start(key(1)));
        assert!(matches!(tracker.lookup(&key(1)), Seen::InProgress));
        tracker.complete(key(1), vec![rx_packet::default()]);
        match tracker.lookup(&key(1)) {
            Seen::Completed(reply) => assert_eq!(reply.len(), 1),
            other => panic!("expected cached reply, got {other:?}"),
        }
        assert!(matches!(tracker.lookup(&key(2)), Seen::New));
        tracker.forget(&key(1));
        assert!(tracker.is_empty());
    }

    #[test]
    fn completed_calls_expire() {
        let tracker = TransactionTracker::new(Duration::ZERO);
        tracker.start(key(1));
        tracker.complete(key(1), Vec::new());
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(tracker.lookup(&key(1)), Seen::New));
    }

    #[test]
    fn in_progress_calls_never_expire() {
        let tracker = TransactionTracker::new(Duration::ZERO);
        tracker.start(key(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(tracker.lookup(&key(1)), Seen::InProgress));
    }
}
