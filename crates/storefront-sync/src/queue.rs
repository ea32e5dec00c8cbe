//! # Per-Key Write Queue
//!
//! Orders remote writes so that, for any one cart line, writes reach the
//! store in the order the user made them. Different lines proceed in
//! parallel.
//!
//! ## Structure
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  arena (BTreeMap<seq, Entry>)             index (HashMap<WriteKey, seqs>)│
//! │  ───────────────────────────              ───────────────────────────── │
//! │  #1  Upsert P1 qty 2   [in flight]        Line(P1) → [1, 3]             │
//! │  #2  Upsert P2 qty 1   [in flight]        Line(P2) → [2]                │
//! │  #3  Upsert P1 qty 5   [queued]  ◄── waits behind #1                    │
//! │  #4  Clear             [queued]  ◄── waits behind everything            │
//! │  #5  Upsert P2 qty 1   [queued]  ◄── waits behind #4                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A write may start only when no EARLIER entry (queued or in flight)
//! conflicts with it. `Cart` conflicts with every key. A newer write never
//! cancels an older one for the same key; it queues behind it.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use storefront_core::cart::CartLine;
use storefront_core::types::LineKey;

// =============================================================================
// Write Key & Operation
// =============================================================================

/// What a remote write touches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum WriteKey {
    /// One cart line.
    Line(LineKey),
    /// The whole cart (clear).
    Cart,
}

impl WriteKey {
    /// True when two writes must not overlap or reorder.
    pub fn conflicts_with(&self, other: &WriteKey) -> bool {
        match (self, other) {
            (WriteKey::Cart, _) | (_, WriteKey::Cart) => true,
            (WriteKey::Line(a), WriteKey::Line(b)) => a == b,
        }
    }

    pub fn line(&self) -> Option<&LineKey> {
        match self {
            WriteKey::Line(key) => Some(key),
            WriteKey::Cart => None,
        }
    }
}

impl fmt::Display for WriteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteKey::Line(key) => write!(f, "{}", key),
            WriteKey::Cart => f.write_str("<cart>"),
        }
    }
}

impl From<LineKey> for WriteKey {
    fn from(key: LineKey) -> Self {
        WriteKey::Line(key)
    }
}

/// A remote write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Upsert(CartLine),
    Remove(LineKey),
    Clear,
}

impl WriteOp {
    pub fn key(&self) -> WriteKey {
        match self {
            WriteOp::Upsert(line) => WriteKey::Line(line.key.clone()),
            WriteOp::Remove(key) => WriteKey::Line(key.clone()),
            WriteOp::Clear => WriteKey::Cart,
        }
    }
}

/// A write handed out by [`WriteQueue::start_ready`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedWrite {
    pub seq: u64,
    pub token: String,
    pub op: WriteOp,
}

// =============================================================================
// Write Queue
// =============================================================================

#[derive(Debug)]
struct Entry {
    token: String,
    op: WriteOp,
    in_flight: bool,
}

/// Arena of pending remote writes, indexed by [`WriteKey`].
#[derive(Debug, Default)]
pub struct WriteQueue {
    next_seq: u64,
    entries: BTreeMap<u64, Entry>,
    index: HashMap<WriteKey, VecDeque<u64>>,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a write and returns its sequence number.
    pub fn enqueue(&mut self, token: impl Into<String>, op: WriteOp) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.index.entry(op.key()).or_default().push_back(seq);
        self.entries.insert(
            seq,
            Entry {
                token: token.into(),
                op,
                in_flight: false,
            },
        );
        seq
    }

    /// Marks every startable write as in flight and returns them in order.
    pub fn start_ready(&mut self) -> Vec<QueuedWrite> {
        let mut started = Vec::new();
        let mut seen: Vec<WriteKey> = Vec::new();
        let mut cart_seen = false;

        for (seq, entry) in self.entries.iter_mut() {
            let key = entry.op.key();
            let blocked = cart_seen
                || seen.iter().any(|earlier| earlier.conflicts_with(&key));

            if !blocked && !entry.in_flight {
                entry.in_flight = true;
                started.push(QueuedWrite {
                    seq: *seq,
                    token: entry.token.clone(),
                    op: entry.op.clone(),
                });
            }

            cart_seen |= key == WriteKey::Cart;
            seen.push(key);
        }

        started
    }

    /// Removes a finished write (successful or not).
    pub fn complete(&mut self, seq: u64) -> Option<QueuedWrite> {
        let entry = self.entries.remove(&seq)?;
        let key = entry.op.key();
        if let Some(seqs) = self.index.get_mut(&key) {
            seqs.retain(|s| *s != seq);
            if seqs.is_empty() {
                self.index.remove(&key);
            }
        }
        Some(QueuedWrite {
            seq,
            token: entry.token,
            op: entry.op,
        })
    }

    /// Drops every write that has not started yet.
    pub fn drain_queued(&mut self) -> Vec<QueuedWrite> {
        let queued: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.in_flight)
            .map(|(seq, _)| *seq)
            .collect();
        queued
            .into_iter()
            .filter_map(|seq| self.complete(seq))
            .collect()
    }

    /// True when any write (queued or in flight) targets `key`.
    pub fn has_key(&self, key: &WriteKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.entries.values().filter(|e| e.in_flight).count()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_core::money::{Currency, Money};

    fn upsert(id: &str, quantity: u32) -> WriteOp {
        WriteOp::Upsert(CartLine {
            key: LineKey::product(id),
            quantity,
            unit_price: Money::new(100, Currency::Usd),
            stock_snapshot: 10,
        })
    }

    fn seqs(writes: &[QueuedWrite]) -> Vec<u64> {
        writes.iter().map(|w| w.seq).collect()
    }

    #[test]
    fn test_same_key_waits_behind_in_flight() {
        let mut queue = WriteQueue::new();
        let first = queue.enqueue("tok", upsert("P1", 2));
        let other = queue.enqueue("tok", upsert("P2", 1));
        let second = queue.enqueue("tok", upsert("P1", 5));

        assert_eq!(seqs(&queue.start_ready()), vec![first, other]);
        // Nothing new while P1 #1 is in flight
        assert!(queue.start_ready().is_empty());

        queue.complete(first);
        let ready = queue.start_ready();
        assert_eq!(seqs(&ready), vec![second]);
        assert_eq!(ready[0].op, upsert("P1", 5));
    }

    #[test]
    fn test_clear_waits_for_everything_and_blocks_later_writes() {
        let mut queue = WriteQueue::new();
        let a = queue.enqueue("tok", upsert("P1", 1));
        let clear = queue.enqueue("tok", WriteOp::Clear);
        let b = queue.enqueue("tok", upsert("P2", 1));

        assert_eq!(seqs(&queue.start_ready()), vec![a]);
        queue.complete(a);
        assert_eq!(seqs(&queue.start_ready()), vec![clear]);
        queue.complete(clear);
        assert_eq!(seqs(&queue.start_ready()), vec![b]);
    }

    #[test]
    fn test_index_tracks_outstanding_keys() {
        let mut queue = WriteQueue::new();
        let seq = queue.enqueue("tok", WriteOp::Remove(LineKey::product("P1")));
        assert!(queue.has_key(&WriteKey::Line(LineKey::product("P1"))));
        assert_eq!(queue.len(), 1);

        queue.start_ready();
        assert_eq!(queue.in_flight(), 1);
        queue.complete(seq);
        assert!(!queue.has_key(&WriteKey::Line(LineKey::product("P1"))));
        assert!(queue.is_empty());
        assert!(queue.complete(seq).is_none());
    }

    #[test]
    fn test_drain_queued_keeps_in_flight() {
        let mut queue = WriteQueue::new();
        let a = queue.enqueue("tok", upsert("P1", 1));
        queue.enqueue("tok", upsert("P1", 2));
        queue.enqueue("tok", WriteOp::Clear);
        queue.start_ready();

        let drained = queue.drain_queued();
        assert_eq!(drained.len(), 2);
        assert_eq!(queue.len(), 1);
        assert!(queue.complete(a).is_some());
    }

    #[test]
    fn test_write_key_conflicts() {
        let p1 = WriteKey::Line(LineKey::product("P1"));
        let p2 = WriteKey::Line(LineKey::product("P2"));
        assert!(p1.conflicts_with(&p1));
        assert!(!p1.conflicts_with(&p2));
        assert!(WriteKey::Cart.conflicts_with(&p2));
        assert!(p2.conflicts_with(&WriteKey::Cart));
        assert_eq!(p1.to_string(), "P1");
        assert_eq!(WriteKey::Cart.to_string(), "<cart>");
    }
}
