#![allow(dead_code)]

use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::marker::PhantomData;
use std::mem::{align_of, needs_drop, size_of};
use std::ptr::NonNull;

/// A fixed-capacity buffer of `T` that accepts elements at the tail and drops
/// them from the head.
///
/// Live elements occupy `ptr[head..tail]`; cells outside that range are
/// uninitialized. An element's address never changes while it is live, which
/// is what the rest of the crate builds on.
///
/// The backing memory is either an array obtained from the global allocator
/// or a caller-supplied byte buffer. A byte buffer is entered at the next
/// `T`-aligned address, so a little of its front may go unused.
pub(crate) struct Block<T> {
    ptr: NonNull<T>,
    cap: usize,
    head: usize,
    tail: usize,
    /// run element destructors on [`Block::remove_front`]
    run_drop: bool,
    backing: Backing,
    _marker: PhantomData<T>,
}

enum Backing {
    Heap,
    /// kept alive for the lifetime of the block, never reallocated
    User { _buf: Vec<u8> },
}

impl<T> Block<T> {
    /// Allocate a block of `cap` elements from the global allocator.
    pub(crate) fn heap(cap: usize, run_drop: bool) -> Self {
        let ptr = if size_of::<T>() == 0 || cap == 0 {
            NonNull::dangling()
        } else {
            let layout = Layout::array::<T>(cap).expect("unexpected overflow");
            unsafe {
                let ptr = alloc(layout).cast::<T>();
                if ptr.is_null() {
                    handle_alloc_error(layout);
                }
                NonNull::new_unchecked(ptr)
            }
        };

        Self {
            ptr,
            cap,
            head: 0,
            tail: 0,
            run_drop,
            backing: Backing::Heap,
            _marker: PhantomData,
        }
    }

    /// Build a block over a caller-supplied byte buffer.
    ///
    /// The base address is advanced to the next `T` alignment and the
    /// capacity is however many whole elements fit after that. A buffer too
    /// small for even one element yields a capacity of zero.
    pub(crate) fn from_bytes(mut buf: Vec<u8>, run_drop: bool) -> Self {
        let offset = buf.as_ptr().align_offset(align_of::<T>());

        let (ptr, cap) = if size_of::<T>() == 0 {
            (NonNull::dangling(), buf.len())
        } else if buf.is_empty() || offset >= buf.len() {
            (NonNull::dangling(), 0)
        } else {
            let cap = (buf.len() - offset) / size_of::<T>();
            let ptr = unsafe { NonNull::new_unchecked(buf.as_mut_ptr().add(offset).cast::<T>()) };
            if cap == 0 { (NonNull::dangling(), 0) } else { (ptr, cap) }
        };

        Self {
            ptr,
            cap,
            head: 0,
            tail: 0,
            run_drop,
            backing: Backing::User { _buf: buf },
            _marker: PhantomData,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.cap
    }

    pub(crate) fn len(&self) -> usize {
        self.tail - self.head
    }

    pub(crate) fn free_capacity(&self) -> usize {
        self.cap - self.tail
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub(crate) fn is_user(&self) -> bool {
        matches!(self.backing, Backing::User { .. })
    }

    /// Move `value` into the next free tail cell.
    pub(crate) fn push(&mut self, value: T) {
        if self.free_capacity() == 0 {
            panic!(
                "push on a full block (capacity {}, tail {})",
                self.cap, self.tail
            );
        }
        unsafe { self.ptr.as_ptr().add(self.tail).write(value) };
        self.tail += 1;
    }

    pub(crate) fn get(&self, index: usize) -> &T {
        if index >= self.len() {
            panic!("block index (is {index}) should be < len (is {})", self.len());
        }
        unsafe { &*self.ptr.as_ptr().add(self.head + index) }
    }

    /// Drop the first `n` live elements.
    ///
    /// Destructors run in reverse order, and only when the block was built
    /// with `run_drop`. Draining the block completely resets both indices to
    /// zero, so the full capacity becomes usable again.
    pub(crate) fn remove_front(&mut self, n: usize) {
        if n > self.len() {
            panic!(
                "remove_front count (is {n}) should be <= len (is {})",
                self.len()
            );
        }
        if self.run_drop && needs_drop::<T>() {
            for i in (self.head..self.head + n).rev() {
                unsafe { std::ptr::drop_in_place(self.ptr.as_ptr().add(i)) };
            }
        }
        if n == self.len() {
            self.head = 0;
            self.tail = 0;
        } else {
            self.head += n;
        }
    }

    pub(crate) fn clear(&mut self) {
        self.remove_front(self.len());
    }

    /// View of the live cells `from..to`, relative to the head.
    pub(crate) fn slice(&self, from: usize, to: usize) -> &[T] {
        if from > to || to > self.len() {
            panic!(
                "invalid block range {from}..{to} for len {}",
                self.len()
            );
        }
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(self.head + from), to - from) }
    }

    pub(crate) fn as_slice(&self) -> &[T] {
        self.slice(0, self.len())
    }
}

impl<T> Drop for Block<T> {
    fn drop(&mut self) {
        // live elements always go, in reverse; run_drop only governs
        // remove_front
        if needs_drop::<T>() {
            for i in (self.head..self.tail).rev() {
                unsafe { std::ptr::drop_in_place(self.ptr.as_ptr().add(i)) };
            }
        }
        if matches!(self.backing, Backing::Heap) && size_of::<T>() != 0 && self.cap != 0 {
            let layout = Layout::array::<T>(self.cap).expect("unexpected overflow");
            unsafe { dealloc(self.ptr.as_ptr().cast::<u8>(), layout) };
        }
    }
}

impl<T> std::fmt::Debug for Block<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("capacity", &self.cap)
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("user", &self.is_user())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::Block;

    struct Recorded {
        id: u32,
        log: Rc<RefCell<Vec<u32>>>,
    }

    impl Drop for Recorded {
        fn drop(&mut self) {
            self.log.borrow_mut().push(self.id);
        }
    }

    #[test]
    fn push_and_get() {
        let mut block: Block<u64> = Block::heap(4, true);
        assert_eq!(block.capacity(), 4);
        assert!(block.is_empty());
        for v in 0..4u64 {
            block.push(v);
        }
        assert_eq!(block.len(), 4);
        assert_eq!(block.free_capacity(), 0);
        for i in 0..4 {
            assert_eq!(*block.get(i), i as u64);
        }
    }

    #[test]
    fn user_buffer_is_aligned() {
        let block: Block<u32> = Block::from_bytes(vec![0u8; 64], true);
        // at most one element of slack can be lost to alignment
        assert!(block.capacity() >= 15 && block.capacity() <= 16);
        let ptr = {
            let mut block = block;
            block.push(7);
            block.get(0) as *const u32
        };
        assert_eq!(ptr.align_offset(std::mem::align_of::<u32>()), 0);
    }

    #[test]
    fn empty_buffer_yields_zero_capacity() {
        let block: Block<u32> = Block::from_bytes(Vec::new(), true);
        assert_eq!(block.capacity(), 0);
        let block: Block<u64> = Block::from_bytes(vec![0u8; 3], true);
        assert_eq!(block.capacity(), 0);
    }

    #[test]
    fn remove_front_advances_head() {
        let mut block: Block<u32> = Block::heap(8, true);
        for v in 0..6 {
            block.push(v);
        }
        block.remove_front(2);
        assert_eq!(block.len(), 4);
        assert_eq!(*block.get(0), 2);
        assert_eq!(block.free_capacity(), 2);
    }

    #[test]
    fn full_drain_resets_indices() {
        let mut block: Block<u32> = Block::from_bytes(vec![0u8; 32], true);
        let cap = block.capacity();
        for v in 0..cap as u32 {
            block.push(v);
        }
        assert_eq!(block.free_capacity(), 0);
        block.remove_front(cap);
        assert!(block.is_empty());
        assert_eq!(block.free_capacity(), cap);
        // the whole buffer is usable again
        for v in 0..cap as u32 {
            block.push(v + 100);
        }
        assert_eq!(*block.get(0), 100);
    }

    #[test]
    fn remove_front_drops_in_reverse() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut block: Block<Recorded> = Block::heap(4, true);
        for id in 0..4 {
            block.push(Recorded {
                id,
                log: Rc::clone(&log),
            });
        }
        block.remove_front(3);
        assert_eq!(*log.borrow(), vec![2, 1, 0]);
    }

    #[test]
    fn run_drop_flag_skips_destructors_on_removal() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut block: Block<Recorded> = Block::heap(4, false);
        for id in 0..2 {
            block.push(Recorded {
                id,
                log: Rc::clone(&log),
            });
        }
        block.remove_front(1);
        assert!(log.borrow().is_empty());
        // destruction still drops whatever is live, in reverse
        drop(block);
        assert_eq!(*log.borrow(), vec![1]);
    }

    #[test]
    fn drop_destroys_live_elements_in_reverse() {
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let mut block: Block<Recorded> = Block::heap(4, true);
            for id in 0..3 {
                block.push(Recorded {
                    id,
                    log: Rc::clone(&log),
                });
            }
        }
        assert_eq!(*log.borrow(), vec![2, 1, 0]);
    }

    #[test]
    fn slice_views_live_cells() {
        let mut block: Block<u32> = Block::heap(8, true);
        for v in 0..6 {
            block.push(v);
        }
        block.remove_front(2);
        assert_eq!(block.slice(1, 3), &[3, 4]);
        assert_eq!(block.as_slice(), &[2, 3, 4, 5]);
    }

    #[test]
    #[should_panic(expected = "push on a full block")]
    fn push_past_capacity_panics() {
        let mut block: Block<u32> = Block::heap(1, true);
        block.push(1);
        block.push(2);
    }

    #[test]
    #[should_panic(expected = "block index (is 1) should be < len (is 1)")]
    fn get_out_of_range_panics() {
        let mut block: Block<u32> = Block::heap(2, true);
        block.push(1);
        let _ = block.get(1);
    }

    #[test]
    #[should_panic(expected = "remove_front count (is 3) should be <= len (is 2)")]
    fn remove_more_than_len_panics() {
        let mut block: Block<u32> = Block::heap(4, true);
        block.push(1);
        block.push(2);
        block.remove_front(3);
    }

    #[test]
    #[should_panic(expected = "invalid block range")]
    fn inverted_slice_panics() {
        let mut block: Block<u32> = Block::heap(4, true);
        block.push(1);
        block.push(2);
        let _ = block.slice(2, 1);
    }
}
