//! A small library for ~~hating on~~ evaluating the correctness of offset
//! allocators.
//!
//! An offset allocator hands out `(offset, size)` ranges of some address
//! space it does not own. The [`Evaluator`] drives a [`Subject`] with a
//! sequence of [`AllocatorOp`]s and keeps a shadow map of every live
//! allocation, failing as soon as the subject hands out a range that leaves
//! its region or overlaps a range that is still live.

use std::{collections::BTreeMap, ops::Range};

use arbitrary::{Arbitrary, Unstructured};

/// Upper bound on allocation sizes produced by [`ArbSize`], expressed in bits.
pub const MAX_SIZE_BITS: u32 = 20;

/// A nonzero allocation size which implements `Arbitrary`.
///
/// Sizes are spread across magnitudes rather than uniformly, so that small
/// requests are common enough to exercise splitting and coalescing.
#[derive(Clone, Copy, Debug)]
pub struct ArbSize(pub u64);

impl Arbitrary<'_> for ArbSize {
    fn arbitrary(u: &mut Unstructured<'_>) -> arbitrary::Result<Self> {
        // Select a random bit width, then a size below that width.
        let bits = u32::arbitrary(u)? % (MAX_SIZE_BITS + 1);
        let size = u64::arbitrary(u)? % (1 << bits);

        Ok(ArbSize(size + 1))
    }
}

#[derive(Arbitrary)]
enum AllocatorOpTag {
    Alloc,
    Dealloc,
}

#[derive(Clone, Debug)]
pub enum AllocatorOp {
    /// Allocate a range of the given size.
    Alloc(u64),
    /// Free an existing allocation.
    ///
    /// Given `n` outstanding allocations, the allocation to free is at index
    /// `index % n`.
    Dealloc(usize),
}

impl Arbitrary<'_> for AllocatorOp {
    fn arbitrary(u: &mut Unstructured<'_>) -> arbitrary::Result<Self> {
        let tag = AllocatorOpTag::arbitrary(u)?;

        let op = match tag {
            AllocatorOpTag::Alloc => AllocatorOp::Alloc(ArbSize::arbitrary(u)?.0),
            AllocatorOpTag::Dealloc => AllocatorOp::Dealloc(usize::arbitrary(u)?),
        };

        Ok(op)
    }
}

pub trait Subject {
    type AllocError;

    /// Returns the range of offsets the subject may hand out.
    fn region(&self) -> Range<u64>;

    /// Allocates a range of `size` units and returns its offset.
    fn allocate(&mut self, size: u64) -> Result<u64, Self::AllocError>;

    /// Releases the range of `size` units at `offset`.
    ///
    /// The range must currently be allocated by this subject with exactly
    /// this size.
    fn deallocate(&mut self, offset: u64, size: u64);

    /// Verifies the subject's internal bookkeeping, panicking on corruption.
    ///
    /// Called after every operation.
    fn check_integrity(&self) {}
}

/// An allocated range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    range: Range<u64>,
    // The unique ID of the operation that allocated this range.
    id: u64,
}

impl Block {
    pub fn new(offset: u64, size: u64, id: u64) -> Block {
        Block {
            range: offset..offset + size,
            id,
        }
    }

    pub fn offset(&self) -> u64 {
        self.range.start
    }

    pub fn size(&self) -> u64 {
        self.range.end - self.range.start
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn into_raw_parts(self) -> (u64, u64) {
        (self.offset(), self.size())
    }
}

/// A list of allocated blocks.
#[derive(Default)]
pub struct Blocks {
    blocks: Vec<Block>,
    // Shadow map of live ranges, from start to end.
    occupied: BTreeMap<u64, u64>,
}

impl Blocks {
    pub fn new() -> Blocks {
        Blocks::default()
    }

    /// Returns `true` if `range` overlaps a live block.
    pub fn overlaps(&self, range: &Range<u64>) -> bool {
        // Only the last block starting before `range.end` can reach into it.
        self.occupied
            .range(..range.end)
            .next_back()
            .is_some_and(|(_, &end)| end > range.start)
    }

    /// Records `block` as live.
    ///
    /// Returns `false`, recording nothing, if `block` overlaps a live block.
    pub fn push(&mut self, block: Block) -> bool {
        if self.overlaps(&block.range) {
            return false;
        }

        self.occupied.insert(block.range.start, block.range.end);
        self.blocks.push(block);
        true
    }

    pub fn remove_modulo(&mut self, idx: usize) -> Option<Block> {
        let len = self.blocks.len();
        let block = (len != 0).then(|| self.blocks.swap_remove(idx % len))?;
        self.occupied.remove(&block.range.start);
        Some(block)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl IntoIterator for Blocks {
    type Item = Block;

    type IntoIter = std::vec::IntoIter<Block>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.into_iter()
    }
}

pub struct Evaluator<S: Subject> {
    subject: S,
}

#[derive(Clone, Debug)]
pub struct Failed {
    pub completed: Vec<AllocatorOp>,
    pub failed_op: AllocatorOp,
}

impl<S: Subject> Evaluator<S> {
    pub fn new(subject: S) -> Evaluator<S> {
        Evaluator { subject }
    }

    pub fn into_subject(self) -> S {
        self.subject
    }

    pub fn evaluate<I>(&mut self, ops: I) -> Result<(), Failed>
    where
        I: IntoIterator<Item = AllocatorOp>,
    {
        let region = self.subject.region();
        let mut completed = Vec::new();
        let mut blocks = Blocks::new();

        for (op_id, op) in ops.into_iter().enumerate() {
            let op_id: u64 = op_id.try_into().unwrap();
            match op {
                AllocatorOp::Alloc(size) => {
                    let offset = match self.subject.allocate(size) {
                        Ok(o) => o,
                        Err(_) => continue,
                    };

                    let block = Block::new(offset, size, op_id);
                    let in_region =
                        region.start <= block.range.start && block.range.end <= region.end;

                    if !in_region || !blocks.push(block) {
                        return Err(Failed {
                            completed,
                            failed_op: op,
                        });
                    }
                }

                AllocatorOp::Dealloc(raw_idx) => {
                    let block = match blocks.remove_modulo(raw_idx) {
                        Some(b) => b,
                        None => continue,
                    };

                    let (offset, size) = block.into_raw_parts();
                    self.subject.deallocate(offset, size);
                }
            }

            self.subject.check_integrity();
            completed.push(op);
        }

        for block in blocks {
            let (offset, size) = block.into_raw_parts();
            self.subject.deallocate(offset, size);
        }

        self.subject.check_integrity();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_detect_overlap() {
        let mut blocks = Blocks::new();

        assert!(blocks.push(Block::new(10, 10, 0)));
        assert!(blocks.push(Block::new(20, 5, 1)));
        assert!(blocks.push(Block::new(0, 10, 2)));

        assert!(!blocks.push(Block::new(24, 2, 3)));
        assert!(!blocks.push(Block::new(5, 10, 4)));
        assert!(!blocks.push(Block::new(0, 100, 5)));
        assert_eq!(blocks.len(), 3);

        let removed = blocks.remove_modulo(0).unwrap();
        assert_eq!(removed.id(), 0);
        assert!(blocks.push(Block::new(12, 3, 6)));
    }

    #[test]
    fn arb_size_is_nonzero() {
        let bytes = [0_u8; 64];
        let mut u = Unstructured::new(&bytes);
        let ArbSize(size) = ArbSize::arbitrary(&mut u).unwrap();
        assert_eq!(size, 1);
    }
}
