//! Lazily caches a single-pass iterator so it can be read more than once.
//!
//! Wrapping a producer with [`cached`] evaluates each of its elements at
//! most once, no matter how many readers revisit them. That matters the
//! moment producing an element has a side effect. The cached sequence is
//! read through [`Cursor`]s: independent positions that also gain indexed
//! lookahead ([`Cursor::get`]) and, for sized producers, a remaining count
//! ([`Cursor::len`]) over what is otherwise a one-shot stream.
//!
//! Elements live in fixed-capacity blocks that never relocate, chained into
//! a logically circular store: once every cursor has moved past a prefix it
//! is dropped and its block refilled in place, so a bounded reader loops
//! through the same memory instead of growing. Callers can even supply the
//! memory themselves with [`cached_in_buffers`] and stream through it with
//! zero heap allocation.
//!
//! ```
//! let mut cursor = rewind::cached("monday,tuesday,wednesday".split(','));
//! let saved = cursor.save();
//!
//! assert_eq!(cursor.get(2).unwrap(), "wednesday");
//! assert_eq!(cursor.next(), Some("monday"));
//! // the split is not re-run for the second reader
//! assert_eq!(saved.front().unwrap(), "monday");
//! ```
//!
//! The adaptor is single-threaded by design: sharing is reference-counted,
//! not locked, and none of this is `Send`.

use std::mem::size_of;

mod block;
mod cache;
mod chain;
mod cursor;
mod error;

pub use cache::CacheStats;
pub use cursor::Cursor;
pub use error::RewindError;

use crate::chain::BlockChain;

/// Heap blocks default to one page worth of elements.
const DEFAULT_BLOCK_BYTES: usize = 4096;

fn default_capacity<T>() -> usize {
    (DEFAULT_BLOCK_BYTES / size_of::<T>().max(1)).max(1)
}

/// Wrap `producer` in a caching adaptor and return the first cursor over it.
///
/// Further cursors come from [`Cursor::save`]. Storage grows in page-sized
/// heap blocks; see [`cached_with_capacity`] to pick the block size and
/// [`cached_in_buffers`] to supply the memory yourself.
pub fn cached<I>(producer: I) -> Cursor<I::IntoIter>
where
    I: IntoIterator,
{
    cached_with_capacity(producer, 0)
}

/// Like [`cached`], with an explicit element capacity for each heap block.
///
/// A `capacity` of zero falls back to the page-based default.
pub fn cached_with_capacity<I>(producer: I, capacity: usize) -> Cursor<I::IntoIter>
where
    I: IntoIterator,
{
    let capacity = if capacity == 0 {
        default_capacity::<I::Item>()
    } else {
        capacity
    };
    Cursor::first(producer.into_iter(), BlockChain::with_capacity_hint(capacity))
}

/// Like [`cached`], but elements are stored in the given byte buffers for as
/// long as they suffice.
///
/// Each buffer becomes one block (entered at the first `T`-aligned address,
/// so a few leading bytes may go unused). The blocks are kept for the life
/// of the cache and recycled as cursors move forward; heap blocks are
/// allocated only if live elements outgrow the buffers' joint capacity.
pub fn cached_in_buffers<I>(producer: I, buffers: Vec<Vec<u8>>) -> Cursor<I::IntoIter>
where
    I: IntoIterator,
{
    let chain = BlockChain::with_buffers(buffers, default_capacity::<I::Item>());
    Cursor::first(producer.into_iter(), chain)
}

#[cfg(test)]
mod test {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::{cached, cached_in_buffers, cached_with_capacity};

    #[test]
    fn side_effects_run_once_under_a_sliding_window() {
        let count = Rc::new(Cell::new(0u32));
        let probe = Rc::clone(&count);
        let mut cursor = cached((0..42u32).map(move |i| {
            probe.set(probe.get() + 1);
            i
        }));

        // scan every window of three for a value that is not there
        let mut found = false;
        while !cursor.is_empty() {
            for k in 0..3 {
                if let Ok(v) = cursor.get(k) {
                    found |= v == 43;
                }
            }
            cursor.pop_front().unwrap();
        }

        assert!(!found);
        assert_eq!(count.get(), 42);
    }

    #[test]
    fn random_access_over_a_one_pass_tokenizer() {
        let line = "monday,tuesday,wednesday,thursday,friday,saturday,sunday";
        let mut cursor = cached(line.split(','));

        assert_eq!(cursor.get(2).unwrap(), "wednesday");
        assert_eq!(cursor.get(1).unwrap(), "tuesday");
        for _ in 0..3 {
            cursor.pop_front().unwrap();
        }
        assert_eq!(cursor.get(0).unwrap(), "thursday");
    }

    #[test]
    fn sliding_window_in_user_buffers_never_touches_the_heap() {
        let buffers = vec![vec![0u8; 64], vec![0u8; 64]];
        let mut cursor = cached_in_buffers(0..1000u32, buffers);

        // fill half of one buffer, then slide
        assert_eq!(cursor.get(7).unwrap(), 7);
        for round in 0..117u32 {
            cursor.pop_front().unwrap();
            assert_eq!(cursor.get(7).unwrap(), round + 8);
        }

        let stats = cursor.stats();
        assert_eq!(stats.heap_allocations, 0);
        assert_eq!(cursor.heap_block_occupancy(), (0, 0));
    }

    #[test]
    fn pinned_cursor_keeps_the_whole_sequence_reachable() {
        let first = cached_with_capacity(0..10_000u32, 100);
        let mut pinned = first.save();
        let second = first.save();
        let third = first.save();

        for _ in first {}
        for _ in second {}
        for _ in third {}

        // the straggler still sees everything
        assert_eq!(pinned.len(), 10_000);
        assert_eq!(pinned.stats().heap_allocations, 100);
        assert_eq!(pinned.stats().dropped_elements, 0);

        let mut seen = 0u32;
        for (i, v) in pinned.by_ref().enumerate() {
            assert_eq!(v, i as u32);
            seen += 1;
        }
        assert_eq!(seen, 10_000);

        let stats = pinned.stats();
        assert!(stats.leading_drop_runs > 0);
        assert!(stats.dropped_elements > 0);
        assert_eq!(stats.compaction_runs, 0);
    }

    #[test]
    fn external_state_grows_exactly_once_per_element() {
        let log: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));
        let probe = Rc::clone(&log);
        let mut cursor = cached((0..1000u32).map(move |i| {
            probe.borrow_mut().push(i);
            let vec = probe.borrow();
            (vec.as_ptr() as usize, vec.capacity())
        }));

        // pair up adjacent snapshots and keep the capacities at which the
        // vector relocated
        let mut growth = Vec::new();
        while !cursor.is_empty() {
            if let (Ok((before, _)), Ok((after, cap))) = (cursor.get(0), cursor.get(1)) {
                if before != after {
                    growth.push(cap);
                }
            }
            cursor.pop_front().unwrap();
        }

        assert_eq!(log.borrow().len(), 1000);
        assert!(!growth.is_empty());
        assert!(growth.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn consumed_buffers_are_refilled_in_place() {
        let buffers = vec![vec![0u8; 100], vec![0u8; 100]];
        let mut cursor = cached_in_buffers(0..60u32, buffers);
        let collected: Vec<u32> = cursor.by_ref().collect();
        assert_eq!(collected, (0..60).collect::<Vec<u32>>());
        assert_eq!(cursor.stats().heap_allocations, 0);
    }

    #[test]
    fn zero_capacity_falls_back_to_a_positive_default() {
        let cursor = cached_with_capacity(0..5u32, 0);
        let collected: Vec<u32> = cursor.collect();
        assert_eq!(collected, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn useless_buffers_fall_back_to_the_heap() {
        // two bytes cannot hold a u32, the buffer just rides along
        let cursor = cached_in_buffers(0..10u32, vec![vec![0u8; 2]]);
        let collected: Vec<u32> = cursor.save().collect();
        assert_eq!(collected, (0..10).collect::<Vec<u32>>());
        assert!(cursor.stats().heap_allocations >= 1);
    }

    #[test]
    fn no_buffers_behave_like_the_plain_constructor() {
        let cursor = cached_in_buffers(0..10u32, Vec::new());
        let collected: Vec<u32> = cursor.collect();
        assert_eq!(collected, (0..10).collect::<Vec<u32>>());
    }
}
