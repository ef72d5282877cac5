#![no_main]
use alloc_hater::AllocatorOp;
use arbitrary::{Arbitrary, Unstructured};
use coalescing_alloc_hater::CoalescingSubject;
use libfuzzer_sys::fuzz_target;

const MAX_SIZE_SHIFT: u8 = 48;

#[derive(Clone, Debug)]
struct Args {
    offset: u64,
    size: u64,
    ops: Vec<AllocatorOp>,
}

impl Arbitrary<'_> for Args {
    fn arbitrary(un: &mut Unstructured) -> arbitrary::Result<Args> {
        let offset = u64::arbitrary(un)?;
        let size_shift = u8::arbitrary(un)? % MAX_SIZE_SHIFT;
        let size = u64::arbitrary(un)? % (1 << size_shift);
        let ops = Vec::arbitrary(un)?;

        Ok(Args { offset, size, ops })
    }
}

fuzz_target!(|args: Args| {
    let Args { offset, size, ops } = args;

    // The checked subject panics if a release overlaps free space.
    let subject = match CoalescingSubject::<u64>::new_checked(offset, size) {
        Ok(s) => s,
        Err(_) => return,
    };

    let mut eval = alloc_hater::Evaluator::new(subject);
    eval.evaluate(ops).unwrap();
});
