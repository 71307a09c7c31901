//! Time-ordered timer scheduling.
//!
//! The scheduler keeps a min-heap of dated entries ordered by
//! `(due, seq)`, so timers with equal due times fire in the order they
//! were scheduled. Submissions land in a pending queue first and are
//! drained into the heap at pop time, splitting each tick into a
//! collect-changes phase and a fire phase: callbacks may schedule or
//! cancel freely while a tick is popping.
//!
//! Entries are lazily invalidated. Each carries the schedule stamp of
//! the timer it was created for; cancelling or replacing a timer retires
//! the stamp and the stale heap entry is skipped when it surfaces. The
//! heap therefore reaches a timer if and only if the timer is still
//! `Scheduled`.

mod timer;


pub use timer::{SimTime, Timer, TimerAction, TimerState};

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::entity::EntityId;
use crate::keys::{PluginKey, TimerKey};
use crate::queue::GrowQueue;

/// Which of an entity's two timer stores an entry addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerSlot {
    Entity(TimerKey),
    /// A plugin's self-expiry timer.
    Plugin(PluginKey),
}

/// A dated reference to a scheduled timer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SchedEntry {
    pub due: SimTime,
    pub seq: u64,
    pub owner: EntityId,
    pub slot: TimerSlot,
}

impl PartialEq for SchedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for SchedEntry {}

impl Ord for SchedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // seq is unique, so the order is total.
        self.due.cmp(&other.due).then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for SchedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    pending: GrowQueue<SchedEntry>,
    heap: BinaryHeap<Reverse<SchedEntry>>,
    next_seq: u64,
}

impl Scheduler {
    pub fn with_capacity(pending_capacity: usize) -> Self {
        Self {
            pending: GrowQueue::with_capacity(pending_capacity),
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Allot the next schedule stamp. Stamps are unique for the life of
    /// the scheduler and double as the equal-due-time tie break.
    pub fn allot_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    pub fn submit(&mut self, entry: SchedEntry) {
        self.pending.enqueue(entry);
    }

    /// Pop the earliest entry due at or before `now`, draining pending
    /// submissions first so work scheduled by an in-tick callback with a
    /// due time inside the window still fires this tick.
    pub fn pop_due(&mut self, now: SimTime) -> Option<SchedEntry> {
        while let Ok(entry) = self.pending.dequeue() {
            self.heap.push(Reverse(entry));
        }
        match self.heap.peek() {
            Some(Reverse(entry)) if entry.due <= now => self.heap.pop().map(|Reverse(e)| e),
            _ => None,
        }
    }

    /// Entries currently held (including stale ones awaiting skip).
    pub fn entry_count(&self) -> usize {
        self.heap.len() + self.pending.len()
    }
}
