use crate::history::entry::HistoryEntry;
use crate::history::error::HistoryError;
use std::iter::FusedIterator;

/// Largest supported capacity; relay chunks carry `u16` index/total.
pub const MAX_CAPACITY: usize = u16::MAX as usize;

/// Fixed-capacity history of battery samples with FIFO eviction.
///
/// Backed by a preallocated ring: `head` is the physical slot of the oldest
/// entry and `len` the number of live entries, so appending at capacity
/// overwrites the oldest slot instead of shifting.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    slots: Box<[HistoryEntry]>,
    head: usize,
    len: usize,
}

impl HistoryBuffer {
    /// Create an empty buffer holding at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Result<Self, HistoryError> {
        if capacity == 0 || capacity > MAX_CAPACITY {
            return Err(HistoryError::InvalidArgument(format!(
                "history capacity must be within 1..={MAX_CAPACITY}, got {capacity}"
            )));
        }
        Ok(Self {
            slots: vec![HistoryEntry::default(); capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn count(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append `entry` as the newest element, evicting the oldest when full.
    pub fn append(&mut self, entry: HistoryEntry) {
        let cap = self.capacity();
        if self.len == cap {
            self.slots[self.head] = entry;
            self.head = (self.head + 1) % cap;
        } else {
            self.slots[(self.head + self.len) % cap] = entry;
            self.len += 1;
        }
    }

    /// Newest entry, if any.
    pub fn last(&self) -> Option<&HistoryEntry> {
        if self.len == 0 {
            return None;
        }
        Some(&self.slots[(self.head + self.len - 1) % self.capacity()])
    }

    /// Oldest-first view over the stored entries.
    pub fn entries(&self) -> Entries<'_> {
        Entries {
            buffer: self,
            front: 0,
            back: self.len,
        }
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Replace the contents with `entries`, used once at startup.
    ///
    /// Fails with `CapacityExceeded` when `declared_count` or the number of
    /// supplied entries exceeds the capacity; the buffer is then left empty.
    pub fn load_from<I>(&mut self, entries: I, declared_count: usize) -> Result<usize, HistoryError>
    where
        I: IntoIterator<Item = HistoryEntry>,
    {
        self.clear();
        let cap = self.capacity();
        if declared_count > cap {
            return Err(HistoryError::CapacityExceeded {
                declared: declared_count,
                capacity: cap,
            });
        }

        let mut staged = Vec::with_capacity(declared_count);
        for entry in entries {
            if staged.len() == cap {
                return Err(HistoryError::CapacityExceeded {
                    declared: cap + 1,
                    capacity: cap,
                });
            }
            staged.push(entry);
        }

        self.slots[..staged.len()].copy_from_slice(&staged);
        self.len = staged.len();
        Ok(self.len)
    }
}

/// Oldest-first iterator over a [`HistoryBuffer`]. Iterating has no side
/// effects, so a clone or a fresh [`HistoryBuffer::entries`] re-walks it.
#[derive(Debug, Clone)]
pub struct Entries<'a> {
    buffer: &'a HistoryBuffer,
    front: usize,
    back: usize,
}

impl Entries<'_> {
    fn slot(&self, logical: usize) -> HistoryEntry {
        let cap = self.buffer.capacity();
        self.buffer.slots[(self.buffer.head + logical) % cap]
    }
}

impl Iterator for Entries<'_> {
    type Item = HistoryEntry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        let entry = self.slot(self.front);
        self.front += 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl DoubleEndedIterator for Entries<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        self.back -= 1;
        Some(self.slot(self.back))
    }
}

impl ExactSizeIterator for Entries<'_> {}
impl FusedIterator for Entries<'_> {}
