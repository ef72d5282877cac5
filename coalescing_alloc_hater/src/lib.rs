use std::ops::Range;

use alloc_hater::Subject;
use coalescing_alloc::{AllocError, AllocInitError, CoalescingAllocator, Size};

pub struct CoalescingSubject<S: Size> {
    allocator: CoalescingAllocator<S>,
    region: Range<u64>,
    checked: bool,
}

impl<S> CoalescingSubject<S>
where
    S: Size + Into<u64>,
{
    /// Creates a subject managing `size` units starting at `offset`.
    pub fn new(offset: S, size: S) -> Result<Self, AllocInitError> {
        let allocator = CoalescingAllocator::with_range(offset, size)?;
        let start: u64 = offset.into();
        let len: u64 = size.into();

        Ok(CoalescingSubject {
            allocator,
            region: start..start + len,
            checked: false,
        })
    }

    /// Creates a subject which releases ranges through
    /// [`CoalescingAllocator::try_deallocate`].
    pub fn new_checked(offset: S, size: S) -> Result<Self, AllocInitError> {
        let mut subject = Self::new(offset, size)?;
        subject.checked = true;
        Ok(subject)
    }

    pub fn allocator(&self) -> &CoalescingAllocator<S> {
        &self.allocator
    }
}

fn narrow<S: TryFrom<u64>>(value: u64) -> S {
    S::try_from(value).unwrap_or_else(|_| panic!("{value} does not fit the size type"))
}

impl<S> Subject for CoalescingSubject<S>
where
    S: Size + Into<u64> + TryFrom<u64>,
{
    type AllocError = AllocError;

    fn region(&self) -> Range<u64> {
        self.region.clone()
    }

    fn allocate(&mut self, size: u64) -> Result<u64, AllocError> {
        let size = S::try_from(size).map_err(|_| AllocError)?;
        let range = self.allocator.try_allocate(size)?;
        Ok(range.start.into())
    }

    fn deallocate(&mut self, offset: u64, size: u64) {
        let (offset, size) = (narrow::<S>(offset), narrow::<S>(size));

        if self.checked {
            if let Err(e) = self.allocator.try_deallocate(offset, size) {
                panic!("deallocate({offset}, {size}) rejected: {e}");
            }
        } else {
            self.allocator.deallocate(offset, size);
        }
    }

    fn check_integrity(&self) {
        self.allocator.validate_integrity();
    }
}

#[cfg(test)]
mod tests {
    use alloc_hater::{AllocatorOp, Evaluator};
    use arbitrary::{Arbitrary, Unstructured};

    use super::*;

    fn pseudo_random_bytes(len: usize, mut state: u32) -> Vec<u8> {
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect()
    }

    #[test]
    fn scripted_ops() {
        let subject = CoalescingSubject::<u32>::new(0, 100).unwrap();
        let mut eval = Evaluator::new(subject);

        let ops = vec![
            AllocatorOp::Alloc(30),
            AllocatorOp::Alloc(70),
            AllocatorOp::Alloc(1),
            AllocatorOp::Dealloc(0),
            AllocatorOp::Alloc(10),
            AllocatorOp::Dealloc(1),
            AllocatorOp::Alloc(50),
        ];

        eval.evaluate(ops).unwrap();

        let subject = eval.into_subject();
        assert_eq!(subject.allocator().free_size(), 100);
        assert_eq!(subject.allocator().len(), 1);
    }

    #[test]
    fn random_ops_u32() {
        for seed in 1..=32_u32 {
            let bytes = pseudo_random_bytes(4096, seed);
            let mut u = Unstructured::new(&bytes);
            let ops = Vec::<AllocatorOp>::arbitrary(&mut u).unwrap();

            let subject = CoalescingSubject::<u32>::new(1 << 12, 1 << 22).unwrap();
            Evaluator::new(subject).evaluate(ops).unwrap();
        }
    }

    #[test]
    fn random_ops_u64_checked() {
        for seed in 1..=32_u32 {
            let bytes = pseudo_random_bytes(4096, seed.wrapping_mul(0x9E37_79B9));
            let mut u = Unstructured::new(&bytes);
            let ops = Vec::<AllocatorOp>::arbitrary(&mut u).unwrap();

            let subject = CoalescingSubject::<u64>::new_checked(1 << 40, 1 << 21).unwrap();
            Evaluator::new(subject).evaluate(ops).unwrap();
        }
    }

    #[test]
    fn oversized_request_fails() {
        let mut subject = CoalescingSubject::<u16>::new(0, 1000).unwrap();

        assert_eq!(subject.allocate(1 << 20), Err(AllocError));
        assert_eq!(subject.allocate(1001), Err(AllocError));
        assert_eq!(subject.allocate(1000), Ok(0));
    }
}
