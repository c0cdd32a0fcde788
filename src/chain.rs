#![allow(dead_code)]

use crate::block::Block;

/// An expanding, logically circular store built from [`Block`]s.
///
/// Elements read as the concatenation of all blocks in order. Appends land in
/// the tail block and may allocate a fresh heap block; removing from the
/// front clears fully-consumed blocks and rotates them behind the live ones,
/// where they wait to be refilled. Elements never move between addresses, no
/// matter how the chain grows or recycles.
///
/// Caller-supplied buffers become the leading blocks and are never freed (or
/// removed by [`BlockChain::compact`]) until the chain itself is dropped.
pub(crate) struct BlockChain<T> {
    blocks: Vec<Block<T>>,
    /// index of the block currently receiving appends; every block after it
    /// is empty
    tail_ix: usize,
    len: usize,
    cap: usize,
    /// capacity for each newly allocated heap block
    hint: usize,
    heap_allocs: u64,
}

impl<T> BlockChain<T> {
    /// An empty chain; heap blocks of `hint` elements are allocated on
    /// demand.
    pub(crate) fn with_capacity_hint(hint: usize) -> Self {
        Self {
            blocks: Vec::new(),
            tail_ix: 0,
            len: 0,
            cap: 0,
            hint: hint.max(1),
            heap_allocs: 0,
        }
    }

    /// A chain seeded with caller-supplied byte buffers.
    ///
    /// The largest realized block capacity becomes the heap hint, so that
    /// overflow blocks match the scale the caller chose. `fallback_hint`
    /// covers the degenerate case where no buffer fits a single element.
    pub(crate) fn with_buffers(buffers: Vec<Vec<u8>>, fallback_hint: usize) -> Self {
        let mut blocks = Vec::with_capacity(buffers.len());
        let mut cap = 0;
        for buf in buffers {
            let block = Block::from_bytes(buf, true);
            cap += block.capacity();
            blocks.push(block);
        }
        let hint = match blocks.iter().map(Block::capacity).max() {
            Some(realized) if realized > 0 => realized,
            _ => fallback_hint.max(1),
        };
        Self {
            blocks,
            tail_ix: 0,
            len: 0,
            cap,
            hint,
            heap_allocs: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn capacity(&self) -> usize {
        self.cap
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn capacity_hint(&self) -> usize {
        self.hint
    }

    pub(crate) fn heap_allocations(&self) -> u64 {
        self.heap_allocs
    }

    fn grow(&mut self) {
        let block = Block::heap(self.hint, true);
        self.cap += block.capacity();
        self.heap_allocs += 1;
        tracing::trace!(capacity = self.hint, "allocated heap block");
        self.blocks.push(block);
    }

    /// Move `value` into the tail block, growing the chain if every block is
    /// full.
    pub(crate) fn push(&mut self, value: T) {
        if self.blocks.is_empty() {
            self.grow();
            self.tail_ix = 0;
        }
        while self.blocks[self.tail_ix].free_capacity() == 0 {
            self.tail_ix += 1;
            if self.tail_ix == self.blocks.len() {
                self.grow();
            }
        }
        self.blocks[self.tail_ix].push(value);
        self.len += 1;
    }

    /// Reference to the `index`-th live element.
    ///
    /// Walks the blocks subtracting lengths; blocks differ in length once
    /// the head block has been partially drained, so there is no division
    /// shortcut.
    pub(crate) fn get(&self, index: usize) -> &T {
        if index >= self.len {
            panic!("chain index (is {index}) should be < len (is {})", self.len);
        }
        let mut rem = index;
        for block in &self.blocks {
            if rem < block.len() {
                return block.get(rem);
            }
            rem -= block.len();
        }
        unreachable!("chain length out of sync with its blocks");
    }

    /// Drop the first `n` live elements.
    ///
    /// Fully-consumed blocks are cleared (destructors and all) and rotated,
    /// stably, behind the surviving blocks; the first survivor is drained
    /// in place. Cleared blocks are refilled by later appends before any new
    /// allocation happens.
    pub(crate) fn remove_front(&mut self, n: usize) {
        if n > self.len {
            panic!(
                "remove_front count (is {n}) should be <= len (is {})",
                self.len
            );
        }
        let mut rem = n;
        let mut consumed = 0;
        while rem > 0 && self.blocks[consumed].len() <= rem {
            rem -= self.blocks[consumed].len();
            consumed += 1;
        }
        if rem > 0 {
            self.blocks[consumed].remove_front(rem);
        }
        for block in self.blocks[..consumed].iter_mut().rev() {
            block.clear();
        }
        self.blocks.rotate_left(consumed);
        self.tail_ix = self.tail_ix.saturating_sub(consumed);
        self.len -= n;
    }

    /// `(total, occupied)` over heap blocks only; user blocks are not
    /// counted.
    pub(crate) fn heap_block_occupancy(&self) -> (usize, usize) {
        let mut total = 0;
        let mut occupied = 0;
        for block in &self.blocks {
            if block.is_user() {
                continue;
            }
            total += 1;
            if !block.is_empty() {
                occupied += 1;
            }
        }
        (total, occupied)
    }

    /// Release empty heap blocks back to the allocator.
    ///
    /// User blocks survive even when empty. Returns how many blocks were
    /// removed.
    pub(crate) fn compact(&mut self) -> usize {
        let before = self.blocks.len();
        self.blocks.retain(|block| block.is_user() || !block.is_empty());
        let removed = before - self.blocks.len();
        if removed > 0 {
            self.cap = self.blocks.iter().map(Block::capacity).sum();
            self.tail_ix = self
                .blocks
                .iter()
                .rposition(|block| !block.is_empty())
                .unwrap_or(0);
            tracing::trace!(removed, "compacted empty heap blocks");
        }
        removed
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.blocks.iter().flat_map(|block| block.as_slice().iter())
    }
}

impl<T> Drop for BlockChain<T> {
    fn drop(&mut self) {
        // blocks go in reverse so cached elements are destroyed last-in
        // first-out
        while self.blocks.pop().is_some() {}
    }
}

impl<T> std::fmt::Debug for BlockChain<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockChain")
            .field("blocks", &self.blocks.len())
            .field("len", &self.len)
            .field("capacity", &self.cap)
            .field("tail_ix", &self.tail_ix)
            .finish()
    }
}
