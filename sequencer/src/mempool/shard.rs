//! A fixed-capacity ring buffer shard.
//!
//! ## Cursors
//!
//! Positions grow monotonically; slot index is `position % capacity`.
//!
//! - `tail` is the next position to hand out. Producers reserve it with a CAS,
//!   so reservation never takes the lock.
//! - `head` is the oldest position still occupying a slot. It only moves under
//!   the lock, past a leading run of tombstones.
//!
//! A reservation succeeds only while `tail - head < capacity`. The slot for a
//! fresh position therefore always belongs to a reclaimed position, and the
//! write that follows under the lock never overwrites a live entry. A reserved
//! position whose write has not landed yet reads as an empty slot; compaction
//! stops there.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashSet},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use crossbeam::utils::CachePadded;

use super::types::{Candidate, PooledEntry};
use crate::{crypto::Hash, state::transaction::Transaction};

pub(crate) struct Shard {
    index: usize,
    capacity: u64,
    head: CachePadded<AtomicU64>,
    tail: CachePadded<AtomicU64>,
    live: AtomicUsize,
    slots: Mutex<Vec<Option<PooledEntry>>>,
}

impl Shard {
    pub(crate) fn new(index: usize, capacity: usize) -> Self {
        Self {
            index,
            capacity: capacity as u64,
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
            live: AtomicUsize::new(0),
            slots: Mutex::new(vec![None; capacity]),
        }
    }

    /// Live (non-tombstoned) entries.
    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Positions currently holding a slot, tombstones included.
    pub(crate) fn occupied(&self) -> u64 {
        let head = self.head.load(Ordering::Acquire);
        self.tail.load(Ordering::Acquire).saturating_sub(head)
    }

    /// Reserves a position and writes `tx` into it.
    ///
    /// Returns `false` without blocking when every slot is occupied.
    pub(crate) fn push(&self, tx: Arc<Transaction>, arrival: u64) -> bool {
        let Some(position) = self.reserve() else {
            return false;
        };
        let slot = self.slot_index(position);
        // `tail` already counts this position, so `reserve` treats it as
        // occupied until the write below lands; compaction stops at it.
        let mut slots = self.lock();
        slots[slot] = Some(PooledEntry::new(tx, arrival, position));
        self.live.fetch_add(1, Ordering::AcqRel);
        true
    }

    fn reserve(&self) -> Option<u64> {
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            let head = self.head.load(Ordering::Acquire);
            if tail.saturating_sub(head) >= self.capacity {
                return None;
            }
            if self
                .tail
                .compare_exchange_weak(tail, tail + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(tail);
            }
        }
    }

    /// This shard's best `k` live entries, best first.
    ///
    /// Uses a min-heap bounded at `k`, so a scan costs O(capacity · log k).
    pub(crate) fn top_candidates(&self, k: usize) -> Vec<Candidate> {
        if k == 0 {
            return Vec::new();
        }
        let slots = self.lock();
        let mut heap: BinaryHeap<Reverse<Candidate>> = BinaryHeap::with_capacity(k + 1);
        for entry in slots.iter().flatten().filter(|e| e.is_live()) {
            let candidate = Candidate::from_entry(self.index, entry);
            if heap.len() < k {
                heap.push(Reverse(candidate));
            } else if heap.peek().is_some_and(|Reverse(worst)| candidate > *worst) {
                heap.pop();
                heap.push(Reverse(candidate));
            }
        }
        let mut top: Vec<Candidate> = heap.into_iter().map(|Reverse(c)| c).collect();
        top.sort_unstable_by(|a, b| b.cmp(a));
        top
    }

    /// Tombstones the entries at `positions` and compacts.
    ///
    /// Returns how many of them were live.
    pub(crate) fn tombstone_positions(&self, positions: &[u64]) -> usize {
        let mut slots = self.lock();
        let mut marked = 0;
        for &position in positions {
            let slot = self.slot_index(position);
            if let Some(entry) = slots[slot].as_mut()
                && entry.position == position
                && entry.is_live()
            {
                entry.tombstoned = true;
                marked += 1;
            }
        }
        self.live.fetch_sub(marked, Ordering::AcqRel);
        self.compact(&mut slots);
        marked
    }

    /// Tombstones every live entry whose id is in `ids` and compacts.
    pub(crate) fn tombstone_ids(&self, ids: &HashSet<Hash>) -> usize {
        let mut slots = self.lock();
        let mut marked = 0;
        for entry in slots.iter_mut().flatten() {
            if entry.is_live() && ids.contains(&entry.tx.id) {
                entry.tombstoned = true;
                marked += 1;
            }
        }
        self.live.fetch_sub(marked, Ordering::AcqRel);
        self.compact(&mut slots);
        marked
    }

    /// Advances `head` past the leading run of tombstones, freeing their slots.
    fn compact(&self, slots: &mut [Option<PooledEntry>]) {
        let mut head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        while head < tail {
            let slot = self.slot_index(head);
            let reclaimable = matches!(
                &slots[slot],
                Some(entry) if entry.position == head && entry.tombstoned
            );
            if !reclaimable {
                break;
            }
            slots[slot] = None;
            head += 1;
        }
        self.head.store(head, Ordering::Release);
    }

    #[inline]
    fn slot_index(&self, position: u64) -> usize {
        (position % self.capacity) as usize
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Option<PooledEntry>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
