//! Reorder buffer
//!
//! Segments finish synthesis in any order but must leave in index order.
//! Results are parked here until every lower index has been released.

use std::collections::BTreeMap;

/// Index-ordered release of out-of-order results
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next: usize,
    pending: BTreeMap<usize, T>,
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> Self {
        Self {
            next: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Park a result
    ///
    /// Returns the item back if its index was already released or is
    /// already parked; each index is accepted once.
    pub fn insert(&mut self, index: usize, item: T) -> Result<(), T> {
        if index < self.next || self.pending.contains_key(&index) {
            return Err(item);
        }
        self.pending.insert(index, item);
        Ok(())
    }

    /// Release the next result if it has arrived
    pub fn pop_ready(&mut self) -> Option<(usize, T)> {
        let item = self.pending.remove(&self.next)?;
        let index = self.next;
        self.next += 1;
        Some((index, item))
    }

    /// Index the buffer is waiting for
    pub fn next_index(&self) -> usize {
        self.next
    }

    /// Results parked behind a gap
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop everything parked; used when a session ends early
    pub fn discard(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}
