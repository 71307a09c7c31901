//! Growable circular FIFO queue.
//!
//! Fixed-capacity ring buffer addressed by head/tail indices modulo
//! capacity, with the element count tracked independently so the buffer
//! can be exactly filled without "empty" and "full" becoming ambiguous.
//! When an enqueue would exceed capacity the buffer grows to
//! `2 * capacity + 1`, copying elements out from the head in logical
//! order and resetting head/tail to `0`/`count`. The scheduler uses this
//! as its pending-submission queue.

use crate::error::CoreError;

const DEFAULT_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct GrowQueue<T> {
    buf: Vec<Option<T>>,
    head: usize,
    tail: usize,
    count: usize,
}

impl<T> Default for GrowQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> GrowQueue<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: std::iter::repeat_with(|| None).take(capacity).collect(),
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Append an item at the tail, growing the backing buffer if full.
    pub fn enqueue(&mut self, item: T) {
        if self.count == self.buf.len() {
            self.grow();
        }
        self.buf[self.tail] = Some(item);
        self.tail = (self.tail + 1) % self.buf.len();
        self.count += 1;
    }

    /// Remove and return the item at the head.
    pub fn dequeue(&mut self) -> Result<T, CoreError> {
        if self.count == 0 {
            return Err(CoreError::EmptyQueue);
        }
        let item = self.buf[self.head].take();
        self.head = (self.head + 1) % self.buf.len();
        self.count -= 1;
        // The slot held Some by the enqueue/count invariant.
        item.ok_or(CoreError::EmptyQueue)
    }

    /// The item at the head, without removing it.
    pub fn peek(&self) -> Result<&T, CoreError> {
        if self.count == 0 {
            return Err(CoreError::EmptyQueue);
        }
        self.buf[self.head].as_ref().ok_or(CoreError::EmptyQueue)
    }

    pub fn clear(&mut self) {
        for slot in &mut self.buf {
            *slot = None;
        }
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }

    /// Iterate the queued items in logical (FIFO) order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        (0..self.count).filter_map(move |i| {
            let idx = (self.head + i) % self.buf.len();
            self.buf[idx].as_ref()
        })
    }

    fn grow(&mut self) {
        let new_capacity = 2 * self.buf.len() + 1;
        let mut new_buf: Vec<Option<T>> =
            std::iter::repeat_with(|| None).take(new_capacity).collect();
        for (i, slot) in new_buf.iter_mut().take(self.count).enumerate() {
            let idx = (self.head + i) % self.buf.len();
            *slot = self.buf[idx].take();
        }
        self.buf = new_buf;
        self.head = 0;
        self.tail = self.count;
    }
}

impl<T: PartialEq> GrowQueue<T> {
    /// Linear scan for an equal item. With `T = Option<U>` a stored `None`
    /// compares equal to `None`, matching the container's null-equals-null
    /// contract.
    pub fn contains(&self, item: &T) -> bool {
        self.iter().any(|stored| stored == item)
    }
}
