use std::rc::Rc;

use crate::cache::{CacheStats, ElementCache};
use crate::chain::BlockChain;

/// A read position over a lazily cached single-pass source.
///
/// Every cursor created from the same source shares one cache; the cache
/// pulls each source element at most once and keeps it addressable until no
/// cursor can reach it anymore. Cursors advance independently, can look
/// ahead by index into what is otherwise a one-shot stream, and are
/// deliberately not `Clone`: duplicating a read position is an explicit
/// [`Cursor::save`], which registers the copy with the cache so the shared
/// front is not dropped out from under it.
///
/// Dropping a cursor releases its position; the cache and everything it
/// holds go away with the last cursor.
pub struct Cursor<I: Iterator> {
    cache: Rc<ElementCache<I>>,
    slot: usize,
}

impl<I: Iterator> Cursor<I> {
    pub(crate) fn first(producer: I, elems: BlockChain<I::Item>) -> Self {
        let cache = Rc::new(ElementCache::new(producer, elems));
        let slot = cache.make_slice(0);
        Self { cache, slot }
    }

    /// Whether no element remains at this cursor's position.
    ///
    /// When the cursor sits at the cache frontier and the source has not yet
    /// reported its end, answering requires pulling exactly one element into
    /// the cache. That pull is kept, so a following [`Cursor::front`] is
    /// free.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty(self.slot)
    }

    /// The element at the cursor's position, materializing it if necessary.
    pub fn front(&self) -> anyhow::Result<I::Item>
    where
        I::Item: Clone,
    {
        Ok(self.cache.front(self.slot)?)
    }

    /// Advance past the current element.
    ///
    /// Advancing may shrink the shared cache: once every live cursor has
    /// moved beyond some prefix, that prefix is dropped and its storage
    /// recycled.
    pub fn pop_front(&mut self) -> anyhow::Result<()> {
        Ok(self.cache.pop_front(self.slot)?)
    }

    /// The element `index` places ahead of the cursor, without advancing.
    pub fn get(&self, index: usize) -> anyhow::Result<I::Item>
    where
        I::Item: Clone,
    {
        Ok(self.cache.get(self.slot, index)?)
    }

    /// A new cursor at the same position.
    pub fn save(&self) -> Self {
        let offset = self.cache.offset_of(self.slot);
        let slot = self.cache.make_slice(offset);
        Self {
            cache: Rc::clone(&self.cache),
            slot,
        }
    }

    /// Release empty heap blocks held by the cache. Returns how many were
    /// removed. Never invoked implicitly by the default build.
    pub fn compact(&self) -> usize {
        self.cache.compact()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// `(total, occupied)` heap blocks currently held by the cache.
    pub fn heap_block_occupancy(&self) -> (usize, usize) {
        self.cache.occupancy()
    }
}

impl<I: ExactSizeIterator> Cursor<I> {
    /// Elements remaining ahead of this cursor, counting both the cached
    /// tail and whatever the source still holds.
    pub fn len(&self) -> usize {
        self.cache.len(self.slot)
    }
}

impl<I: Iterator> Iterator for Cursor<I>
where
    I::Item: Clone,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        self.cache.next_element(self.slot)
    }
}

impl<I: Iterator> Drop for Cursor<I> {
    fn drop(&mut self) {
        self.cache.release(self.slot);
    }
}

impl<I: Iterator> std::fmt::Debug for Cursor<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("slot", &self.slot)
            .field("offset", &self.cache.offset_of(self.slot))
            .finish()
    }
}
