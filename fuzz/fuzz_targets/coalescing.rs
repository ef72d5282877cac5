#![no_main]
use alloc_hater::AllocatorOp;
use arbitrary::{Arbitrary, Unstructured};
use coalescing_alloc_hater::CoalescingSubject;
use libfuzzer_sys::fuzz_target;

const MAX_REGION_SIZE: u32 = 1 << 24;

#[derive(Clone, Debug)]
struct Args {
    offset: u32,
    size: u32,
    ops: Vec<AllocatorOp>,
}

impl Arbitrary<'_> for Args {
    fn arbitrary(un: &mut Unstructured) -> arbitrary::Result<Args> {
        let offset = u32::arbitrary(un)?;
        let size = u32::arbitrary(un)? % MAX_REGION_SIZE;
        let ops = Vec::arbitrary(un)?;

        Ok(Args { offset, size, ops })
    }
}

fuzz_target!(|args: Args| {
    let Args { offset, size, ops } = args;

    // Rejects empty regions and regions running past `u32::MAX`.
    let subject = match CoalescingSubject::<u32>::new(offset, size) {
        Ok(s) => s,
        Err(_) => return,
    };

    let mut eval = alloc_hater::Evaluator::new(subject);
    eval.evaluate(ops).unwrap();
});
