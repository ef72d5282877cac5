//! Lower-bound binary search.
//!
//! Both searches return the position of the first element which is not less
//! than `key`, or the length of the sequence if every element is less than
//! `key`. The result is identical to `items.partition_point(|x| x < key)`,
//! but the loop body selects the next window base with a conditional move
//! rather than a branch, and the final one or two candidates are resolved
//! with branch-free additions.

use crate::Size;

/// Returns the lower bound of `key` in `items`.
///
/// `items` must be sorted in ascending order.
///
/// # Examples
///
/// ```
/// use coalescing_alloc::search::lower_bound;
///
/// let offsets = [0_u32, 10, 20, 30];
/// assert_eq!(lower_bound(&offsets, &20), 2);
/// assert_eq!(lower_bound(&offsets, &21), 3);
/// assert_eq!(lower_bound(&offsets, &99), 4);
/// assert_eq!(lower_bound::<u32>(&[], &5), 0);
/// ```
#[inline]
pub fn lower_bound<T: Ord>(items: &[T], key: &T) -> usize {
    lower_bound_by(items.len(), |i| items[i] < *key)
}

/// Returns the lower bound of `key` in `data`, searching through `indices`.
///
/// Each element of `indices` is an index into `data`, and the sequence
/// `indices.iter().map(|&i| &data[i])` must be sorted in ascending order. The
/// returned value is a position in `indices`.
///
/// # Panics
///
/// Panics if an inspected element of `indices` is out of bounds for `data`.
///
/// # Examples
///
/// ```
/// use coalescing_alloc::search::lower_bound_indirect;
///
/// let data = [30_u32, 10, 20];
/// let order = [1_u32, 2, 0];
/// assert_eq!(lower_bound_indirect(&order, &data, &15), 1);
/// assert_eq!(lower_bound_indirect(&order, &data, &30), 2);
/// ```
#[inline]
pub fn lower_bound_indirect<I: Size, T: Ord>(indices: &[I], data: &[T], key: &T) -> usize {
    lower_bound_by(indices.len(), |i| data[indices[i].as_index()] < *key)
}

/// Shared search loop. `is_less(i)` reports whether element `i` is less than
/// the key.
#[inline(always)]
fn lower_bound_by(len: usize, is_less: impl Fn(usize) -> bool) -> usize {
    // The answer always lies in `base..=base + size`.
    let mut base = 0;
    let mut size = len;

    while size > 2 {
        let middle = base + (size >> 1);
        size = (size + 1) >> 1;
        base = if is_less(middle) { middle } else { base };
    }

    base += usize::from(size > 1 && is_less(base));
    base += usize::from(size > 0 && is_less(base));
    base
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::prelude::rust_2021::*;

    use super::*;

    #[test]
    fn empty() {
        assert_eq!(lower_bound::<u32>(&[], &0), 0);
        assert_eq!(lower_bound::<u32>(&[], &u32::MAX), 0);
        assert_eq!(lower_bound_indirect::<u32, u32>(&[], &[], &7), 0);
    }

    #[test]
    fn single_element() {
        assert_eq!(lower_bound(&[10_u32], &5), 0);
        assert_eq!(lower_bound(&[10_u32], &10), 0);
        assert_eq!(lower_bound(&[10_u32], &11), 1);
    }

    #[test]
    fn two_elements() {
        let items = [10_u32, 20];
        assert_eq!(lower_bound(&items, &0), 0);
        assert_eq!(lower_bound(&items, &10), 0);
        assert_eq!(lower_bound(&items, &15), 1);
        assert_eq!(lower_bound(&items, &20), 1);
        assert_eq!(lower_bound(&items, &21), 2);
    }

    #[test]
    fn matches_partition_point() {
        for len in 0..=40_u32 {
            let items: Vec<u32> = (0..len).map(|i| i * 3 + 1).collect();

            for key in 0..=(len * 3 + 3) {
                assert_eq!(
                    lower_bound(&items, &key),
                    items.partition_point(|&x| x < key),
                    "len={len} key={key}"
                );
            }
        }
    }

    #[test]
    fn duplicates_resolve_to_first() {
        let items = [1_u32, 2, 2, 2, 2, 3, 3, 9];
        assert_eq!(lower_bound(&items, &2), 1);
        assert_eq!(lower_bound(&items, &3), 5);
        assert_eq!(lower_bound(&items, &4), 7);
    }

    #[test]
    fn indirect_matches_direct() {
        // A permutation which orders `data` ascending.
        let data = [50_u64, 5, 40, 15, 30, 25, 10, 20, 45, 35];
        let mut order: Vec<u32> = (0..data.len() as u32).collect();
        order.sort_by_key(|&i| data[i as usize]);

        let sorted: Vec<u64> = order.iter().map(|&i| data[i as usize]).collect();

        for key in 0..=55 {
            assert_eq!(
                lower_bound_indirect(&order, &data, &key),
                lower_bound(&sorted, &key),
                "key={key}"
            );
        }
    }
}
