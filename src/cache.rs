use std::cell::RefCell;

use crate::chain::BlockChain;
use crate::error::RewindError;

/// Counters accumulated by the cache, exposed through
/// [`Cursor::stats`](crate::Cursor::stats) for tests and tuning.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// heap blocks allocated by the store
    pub heap_allocations: u64,
    /// successful drop-leading runs
    pub leading_drop_runs: u64,
    /// total leading elements dropped
    pub dropped_elements: u64,
    /// compaction invocations (zero unless requested)
    pub compaction_runs: u64,
    /// heap blocks released by compaction
    pub removed_blocks: u64,
}

/// The shared heart of the adaptor: owns the producer, materializes its
/// elements into a [`BlockChain`] on demand, and tracks one read offset per
/// live cursor.
///
/// Everything lives behind a `RefCell` because semantically-read operations
/// (`front`, `is_empty`) may still have to pull from the producer. Calls
/// never suspend, so each borrow is over before control returns to the
/// caller.
pub(crate) struct ElementCache<I: Iterator> {
    inner: RefCell<Inner<I>>,
}

struct Inner<I: Iterator> {
    producer: I,
    /// set once the producer returns `None`; it is never polled again
    exhausted: bool,
    elems: BlockChain<I::Item>,
    /// per-cursor read offsets into `elems`; `None` marks a vacant slot
    /// awaiting reuse
    slots: Vec<Option<usize>>,
    live: usize,
    attempts: usize,
    /// offsets below this never trigger a drop-leading scan
    min_drop: usize,
    stats: CacheStats,
}

impl<I: Iterator> ElementCache<I> {
    pub(crate) fn new(producer: I, elems: BlockChain<I::Item>) -> Self {
        let min_drop = elems.capacity_hint();
        Self {
            inner: RefCell::new(Inner {
                producer,
                exhausted: false,
                elems,
                slots: Vec::new(),
                live: 0,
                attempts: 0,
                min_drop,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Claim a slot starting at `offset`, reusing a vacant one when
    /// possible.
    pub(crate) fn make_slice(&self, offset: usize) -> usize {
        let mut inner = self.inner.borrow_mut();
        inner.live += 1;
        match inner.slots.iter().position(Option::is_none) {
            Some(slot) => {
                inner.slots[slot] = Some(offset);
                slot
            }
            None => {
                inner.slots.push(Some(offset));
                inner.slots.len() - 1
            }
        }
    }

    pub(crate) fn release(&self, slot: usize) {
        let mut inner = self.inner.borrow_mut();
        inner.offset(slot);
        inner.slots[slot] = None;
        inner.live -= 1;
    }

    pub(crate) fn offset_of(&self, slot: usize) -> usize {
        self.inner.borrow().offset(slot)
    }

    /// Whether the cursor in `slot` has run out of elements.
    ///
    /// A cursor behind the cache frontier answers without touching the
    /// producer. At the frontier, the only way to answer is to try: one
    /// element is pulled, and pulls on later reads are saved by it.
    pub(crate) fn is_empty(&self, slot: usize) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.offset(slot) < inner.elems.len() {
            return false;
        }
        if inner.exhausted {
            return true;
        }
        match inner.producer.next() {
            Some(value) => {
                inner.elems.push(value);
                false
            }
            None => {
                inner.exhausted = true;
                true
            }
        }
    }

    pub(crate) fn front(&self, slot: usize) -> Result<I::Item, RewindError>
    where
        I::Item: Clone,
    {
        let mut inner = self.inner.borrow_mut();
        inner.expand_as_needed(slot, 1);
        let offset = inner.offset(slot);
        if offset == inner.elems.len() {
            return Err(RewindError::EndOfSource(offset));
        }
        Ok(inner.elems.get(offset).clone())
    }

    pub(crate) fn get(&self, slot: usize, index: usize) -> Result<I::Item, RewindError>
    where
        I::Item: Clone,
    {
        let mut inner = self.inner.borrow_mut();
        let offset = inner.offset(slot);
        let needed = index
            .checked_add(1)
            .ok_or(RewindError::IndexOverflow { offset, index })?;
        inner.expand_as_needed(slot, needed);
        let offset = inner.offset(slot);
        let available = inner.elems.len() - offset;
        if available < needed {
            return Err(RewindError::OutOfRange {
                offset,
                index,
                available,
            });
        }
        Ok(inner.elems.get(offset + index).clone())
    }

    pub(crate) fn pop_front(&self, slot: usize) -> Result<(), RewindError> {
        let mut inner = self.inner.borrow_mut();
        inner.expand_as_needed(slot, 1);
        let offset = inner.offset(slot);
        if offset == inner.elems.len() {
            return Err(RewindError::EndOfSource(offset));
        }
        inner.slots[slot] = Some(offset + 1);
        if offset + 1 >= inner.min_drop {
            inner.drop_leading();
        }
        Ok(())
    }

    /// `front` and `pop_front` in one borrow, for the `Iterator` impl.
    pub(crate) fn next_element(&self, slot: usize) -> Option<I::Item>
    where
        I::Item: Clone,
    {
        let mut inner = self.inner.borrow_mut();
        inner.expand_as_needed(slot, 1);
        let offset = inner.offset(slot);
        if offset == inner.elems.len() {
            return None;
        }
        let value = inner.elems.get(offset).clone();
        inner.slots[slot] = Some(offset + 1);
        if offset + 1 >= inner.min_drop {
            inner.drop_leading();
        }
        Some(value)
    }

    pub(crate) fn len(&self, slot: usize) -> usize
    where
        I: ExactSizeIterator,
    {
        let inner = self.inner.borrow();
        inner.producer.len() + inner.elems.len() - inner.offset(slot)
    }

    pub(crate) fn compact(&self) -> usize {
        let mut inner = self.inner.borrow_mut();
        let removed = inner.elems.compact();
        inner.stats.compaction_runs += 1;
        inner.stats.removed_blocks += removed as u64;
        removed
    }

    pub(crate) fn stats(&self) -> CacheStats {
        let inner = self.inner.borrow();
        CacheStats {
            heap_allocations: inner.elems.heap_allocations(),
            ..inner.stats
        }
    }

    pub(crate) fn occupancy(&self) -> (usize, usize) {
        self.inner.borrow().elems.heap_block_occupancy()
    }
}

impl<I: Iterator> Inner<I> {
    fn offset(&self, slot: usize) -> usize {
        match self.slots.get(slot) {
            Some(Some(offset)) => *offset,
            _ => panic!("slot {slot} is vacant or out of range"),
        }
    }

    /// Pull from the producer until `needed` elements are cached past the
    /// slot's offset, or the producer runs dry.
    fn expand_as_needed(&mut self, slot: usize, needed: usize) -> bool {
        let offset = self.offset(slot);
        let mut expanded = false;
        while self.elems.len() - offset < needed {
            if self.exhausted {
                break;
            }
            match self.producer.next() {
                Some(value) => {
                    self.elems.push(value);
                    expanded = true;
                }
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }
        expanded
    }

    /// Shrink the front of the store once every live cursor has moved past
    /// it.
    ///
    /// The scan over offsets is deferred until `attempts` catches up with
    /// the cursor count: with several cursors a single straggler pins the
    /// front, and rescanning on every pop buys nothing. Both `min_drop` and
    /// that deferral are tunables, not contracts.
    fn drop_leading(&mut self) {
        self.attempts += 1;
        if self.attempts < self.live {
            return;
        }
        self.attempts = 0;
        let Some(m) = self.slots.iter().flatten().copied().min() else {
            return;
        };
        if m == 0 {
            return;
        }
        self.elems.remove_front(m);
        for offset in self.slots.iter_mut().flatten() {
            *offset -= m;
        }
        self.stats.leading_drop_runs += 1;
        self.stats.dropped_elements += m as u64;
        tracing::trace!(dropped = m, "dropped leading elements");

        #[cfg(feature = "speculative-compact")]
        {
            let (total, occupied) = self.elems.heap_block_occupancy();
            if occupied < total / 4 {
                let removed = self.elems.compact();
                self.stats.compaction_runs += 1;
                self.stats.removed_blocks += removed as u64;
            }
        }
    }
}
