//! Coalescing first-fit allocation.
//!
//! A coalescing allocator tracks the free space of a contiguous range as a
//! sorted list of `(offset, size)` blocks. Allocation carves the request from
//! the start of the first block that is large enough. Deallocation locates the
//! released range's neighbours with a binary search and merges it into any
//! free block it touches, so that no two free blocks in the list are ever
//! adjacent.
//!
//! The allocator never reads or writes the managed range; it only hands out
//! offsets. The range may belong to a GPU buffer, a file, a pool of slots, or
//! anything else that can be addressed by an unsigned integer.
//!
//! ## Characteristics
//!
//! #### Time complexity
//!
//! | Operation                | Best-case | Worst-case |
//! |--------------------------|-----------|------------|
//! | Allocate                 | O(1)      | O(n)       |
//! | Deallocate               | O(log n)  | O(n)       |
//!
//! Where `n` is the number of free blocks. The linear terms come from the
//! first-fit scan and from shifting the free list on insertion and removal.
//!
//! #### Fragmentation
//!
//! Allocations are exactly the requested size, so there is no internal
//! fragmentation. First-fit tends to leave small fragments near the start of
//! the range; adjacent fragments are always coalesced on release, but
//! allocated ranges are never moved to close gaps between them.
//!
//! ## Preconditions
//!
//! [`deallocate`] trusts its caller. Releasing a range that is not currently
//! allocated (including a double free) is checked with `debug_assert!` and
//! corrupts the free list in release builds. Use [`try_deallocate`] when the
//! caller cannot guarantee this.
//!
//! [`deallocate`]: CoalescingAllocator::deallocate
//! [`try_deallocate`]: CoalescingAllocator::try_deallocate

use alloc::vec::Vec;
use core::ops::Range;

use log::{debug, trace};

use crate::{search::lower_bound, AllocError, AllocInitError, DeallocError, Size};

/// A contiguous range of free space.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FreeBlock<S: Size = u32> {
    /// The offset of the first unit of the block.
    pub offset: S,
    /// The number of units in the block.
    pub size: S,
}

impl<S: Size> FreeBlock<S> {
    /// Constructs a new `FreeBlock`.
    #[inline]
    pub fn new(offset: S, size: S) -> FreeBlock<S> {
        FreeBlock { offset, size }
    }

    /// Returns the offset one past the last unit of the block.
    ///
    /// # Panics
    ///
    /// May panic if `offset + size` overflows. Blocks stored by an allocator
    /// never do.
    #[inline]
    pub fn end(&self) -> S {
        self.offset + self.size
    }

    /// Returns the block as a range of offsets.
    #[inline]
    pub fn range(&self) -> Range<S> {
        self.offset..self.end()
    }
}

/// A coalescing first-fit allocator over a range of offsets.
///
/// For a discussion of coalescing allocation, see the [module-level
/// documentation].
///
/// The free list is stored as two parallel vectors. Cloning the allocator
/// copies the free list; clones are fully independent.
///
/// [module-level documentation]: crate::coalescing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoalescingAllocator<S: Size = u32> {
    // Free block offsets, strictly ascending.
    offsets: Vec<S>,
    // Free block sizes, all nonzero. `sizes[i]` belongs to `offsets[i]`.
    sizes: Vec<S>,
}

impl<S: Size> CoalescingAllocator<S> {
    /// The value returned by [`allocate`] when no free block can satisfy the
    /// request.
    ///
    /// [`allocate`]: CoalescingAllocator::allocate
    pub const SENTINEL: S = S::MAX;

    /// Constructs a new `CoalescingAllocator` with no free space.
    ///
    /// Free space is added by [`deallocate`]ing it.
    ///
    /// [`deallocate`]: CoalescingAllocator::deallocate
    pub fn new() -> CoalescingAllocator<S> {
        CoalescingAllocator {
            offsets: Vec::new(),
            sizes: Vec::new(),
        }
    }

    /// Constructs a new `CoalescingAllocator` managing `size` units starting
    /// at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocInitError::InvalidConfig`] if `size` is zero, or
    /// [`AllocInitError::InvalidLocation`] if `offset + size` overflows.
    ///
    /// # Example
    ///
    /// ```
    /// use coalescing_alloc::{CoalescingAllocator, FreeBlock};
    ///
    /// let mut alloc = CoalescingAllocator::<u64>::with_range(4096, 1024).unwrap();
    /// assert_eq!(alloc.allocate(24), 4096);
    /// assert_eq!(
    ///     alloc.free_blocks().collect::<Vec<_>>(),
    ///     [FreeBlock::new(4120, 1000)]
    /// );
    /// ```
    pub fn with_range(offset: S, size: S) -> Result<CoalescingAllocator<S>, AllocInitError> {
        Self::from_free_blocks([FreeBlock::new(offset, size)])
    }

    /// Constructs a new `CoalescingAllocator` whose free list is `blocks`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocInitError::InvalidConfig`] if any block is empty, or if
    /// the blocks are not sorted by offset with a gap between each pair of
    /// consecutive blocks. Returns [`AllocInitError::InvalidLocation`] if any
    /// block extends past `S::MAX`.
    pub fn from_free_blocks<I>(blocks: I) -> Result<CoalescingAllocator<S>, AllocInitError>
    where
        I: IntoIterator<Item = FreeBlock<S>>,
    {
        let blocks = blocks.into_iter();
        let (lower, _) = blocks.size_hint();

        let mut alloc = CoalescingAllocator {
            offsets: Vec::with_capacity(lower),
            sizes: Vec::with_capacity(lower),
        };

        let mut prev_end: Option<S> = None;
        for block in blocks {
            if block.size == S::ZERO {
                return Err(AllocInitError::InvalidConfig);
            }

            let end = block
                .offset
                .checked_add(block.size)
                .ok_or(AllocInitError::InvalidLocation)?;

            if prev_end.is_some_and(|prev_end| block.offset <= prev_end) {
                return Err(AllocInitError::InvalidConfig);
            }

            alloc.offsets.push(block.offset);
            alloc.sizes.push(block.size);
            prev_end = Some(end);
        }

        debug!(
            "CoalescingAllocator::from_free_blocks: {} blocks, {} units free",
            alloc.len(),
            alloc.free_size()
        );

        Ok(alloc)
    }

    /// Allocates `size` units and returns the offset of the first one.
    ///
    /// The first free block, in ascending offset order, which holds at least
    /// `size` units is used; the allocation is taken from its start.
    ///
    /// Returns [`SENTINEL`] without modifying the allocator if no free block
    /// is large enough, or if `size` is zero. Callers must check for it.
    ///
    /// [`SENTINEL`]: CoalescingAllocator::SENTINEL
    #[inline]
    pub fn allocate(&mut self, size: S) -> S {
        match self.try_allocate(size) {
            Ok(range) => range.start,
            Err(AllocError) => Self::SENTINEL,
        }
    }

    /// Attempts to allocate `size` units.
    ///
    /// This behaves like [`allocate`], but reports the allocated range on
    /// success.
    ///
    /// # Errors
    ///
    /// Returns `Err` without modifying the allocator if no free block holds
    /// at least `size` units, or if `size` is zero.
    ///
    /// [`allocate`]: CoalescingAllocator::allocate
    pub fn try_allocate(&mut self, size: S) -> Result<Range<S>, AllocError> {
        if size == S::ZERO {
            trace!("CoalescingAllocator::allocate(0) -> zero-size request");
            return Err(AllocError);
        }

        let Some(idx) = self.sizes.iter().position(|&free| free >= size) else {
            trace!("CoalescingAllocator::allocate({size}) -> no fit");
            return Err(AllocError);
        };

        let offset = self.offsets[idx];
        self.offsets[idx] += size;
        self.sizes[idx] -= size;

        if self.sizes[idx] == S::ZERO {
            self.remove(idx);
        }

        trace!("CoalescingAllocator::allocate({size}) -> {offset}");

        Ok(offset..offset + size)
    }

    /// Returns `size` units starting at `offset` to the free list.
    ///
    /// The released range is merged with the free block that ends at
    /// `offset` and with the free block that starts at `offset + size`, if
    /// either exists.
    ///
    /// The range must have been returned by a previous allocation from this
    /// allocator (or be otherwise known not to overlap any free block), it
    /// must not be empty, and `offset + size` must not overflow. These
    /// conditions are only checked when debug assertions are enabled; see
    /// [`try_deallocate`] for a checked alternative.
    ///
    /// # Panics
    ///
    /// With debug assertions enabled, panics if the conditions above are
    /// violated.
    ///
    /// [`try_deallocate`]: CoalescingAllocator::try_deallocate
    pub fn deallocate(&mut self, offset: S, size: S) {
        let idx = lower_bound(&self.offsets, &offset);

        debug_assert_eq!(
            self.check_release(idx, offset, size),
            Ok(()),
            "invalid deallocation of {size} units at offset {offset}"
        );

        self.release_at(idx, offset, size);
    }

    /// Attempts to return `size` units starting at `offset` to the free list.
    ///
    /// This behaves like [`deallocate`], but validates the released range
    /// against the neighbouring free blocks first.
    ///
    /// Only overlap with free space can be detected: releasing a range that
    /// is still partly allocated elsewhere is not caught.
    ///
    /// # Errors
    ///
    /// Returns `Err` without modifying the allocator if `size` is zero, if
    /// `offset + size` overflows, or if the range overlaps a free block.
    ///
    /// [`deallocate`]: CoalescingAllocator::deallocate
    pub fn try_deallocate(&mut self, offset: S, size: S) -> Result<(), DeallocError> {
        let idx = lower_bound(&self.offsets, &offset);
        self.check_release(idx, offset, size)?;
        self.release_at(idx, offset, size);
        Ok(())
    }

    /// Returns the number of blocks in the free list.
    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns `true` if there is no free space.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Returns an iterator over the free blocks in ascending offset order.
    pub fn free_blocks(
        &self,
    ) -> impl DoubleEndedIterator<Item = FreeBlock<S>> + ExactSizeIterator + '_ {
        self.offsets
            .iter()
            .zip(&self.sizes)
            .map(|(&offset, &size)| FreeBlock { offset, size })
    }

    /// Returns the total number of free units.
    pub fn free_size(&self) -> S {
        // Free blocks are disjoint and each ends at or below `S::MAX`, so the
        // sum cannot overflow.
        self.sizes.iter().fold(S::ZERO, |acc, &size| acc + size)
    }

    /// Returns the largest free block, or `None` if there is no free space.
    ///
    /// If several blocks share the largest size, the one with the lowest
    /// offset is returned.
    pub fn largest_free_block(&self) -> Option<FreeBlock<S>> {
        self.free_blocks()
            .reduce(|best, block| if block.size > best.size { block } else { best })
    }

    /// Verifies the free list invariants.
    ///
    /// # Panics
    ///
    /// Panics if the free list is not sorted, contains an empty block,
    /// contains a block which overflows the address range, or contains two
    /// blocks which overlap or touch.
    pub fn validate_integrity(&self) {
        assert_eq!(self.offsets.len(), self.sizes.len());

        let mut prev_end: Option<S> = None;
        for block in self.free_blocks() {
            assert!(block.size > S::ZERO, "empty free block at {}", block.offset);

            let end = block
                .offset
                .checked_add(block.size)
                .unwrap_or_else(|| panic!("free block at {} overflows", block.offset));

            if let Some(prev_end) = prev_end {
                assert!(
                    prev_end < block.offset,
                    "free block at {} is not separated from its predecessor ending at {}",
                    block.offset,
                    prev_end
                );
            }

            prev_end = Some(end);
        }
    }

    #[inline]
    fn block_end(&self, idx: usize) -> S {
        self.offsets[idx] + self.sizes[idx]
    }

    /// Checks that `offset..offset + size` may be released, given that `idx`
    /// is the lower bound of `offset` in the free list.
    fn check_release(&self, idx: usize, offset: S, size: S) -> Result<(), DeallocError> {
        if size == S::ZERO {
            return Err(DeallocError::ZeroSize);
        }

        let end = offset.checked_add(size).ok_or(DeallocError::Overflow)?;

        if idx > 0 && self.block_end(idx - 1) > offset {
            return Err(DeallocError::Overlap);
        }

        if idx < self.len() && self.offsets[idx] < end {
            return Err(DeallocError::Overlap);
        }

        Ok(())
    }

    /// Releases `offset..offset + size`, where `idx` is the lower bound of
    /// `offset` in the free list.
    fn release_at(&mut self, idx: usize, offset: S, size: S) {
        let end = offset + size;
        let merge_prev = idx > 0 && self.block_end(idx - 1) == offset;
        let merge_next = idx < self.len() && self.offsets[idx] == end;

        match (merge_prev, merge_next) {
            (true, true) => {
                trace!("CoalescingAllocator::deallocate({offset}, {size}): merging both neighbours");
                let next_size = self.sizes[idx];
                self.sizes[idx - 1] += size + next_size;
                self.remove(idx);
            }

            (true, false) => {
                trace!("CoalescingAllocator::deallocate({offset}, {size}): merging with previous");
                self.sizes[idx - 1] += size;
            }

            (false, true) => {
                trace!("CoalescingAllocator::deallocate({offset}, {size}): merging with next");
                self.offsets[idx] = offset;
                self.sizes[idx] += size;
            }

            (false, false) => {
                trace!("CoalescingAllocator::deallocate({offset}, {size}): inserting at {idx}");
                self.offsets.insert(idx, offset);
                self.sizes.insert(idx, size);
            }
        }
    }

    fn remove(&mut self, idx: usize) {
        self.offsets.remove(idx);
        self.sizes.remove(idx);
    }
}

impl<S: Size> Default for CoalescingAllocator<S> {
    /// Constructs a `CoalescingAllocator` whose single free block spans
    /// `0..S::MAX`.
    ///
    /// The sentinel `S::MAX` itself is never handed out.
    fn default() -> Self {
        CoalescingAllocator {
            offsets: alloc::vec![S::ZERO],
            sizes: alloc::vec![S::MAX],
        }
    }
}
