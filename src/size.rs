//! Unsigned integer types usable as offsets and sizes.

use core::{
    fmt::{Debug, Display},
    hash::Hash,
    ops::{Add, AddAssign, Sub, SubAssign},
};

use crate::Sealed;

/// An unsigned integer type which can address the range managed by a
/// [`CoalescingAllocator`].
///
/// This trait is sealed and implemented for `u16`, `u32`, `u64` and `usize`.
/// The maximum value of the type is reserved as the allocation failure
/// sentinel and is never a valid offset.
///
/// [`CoalescingAllocator`]: crate::CoalescingAllocator
pub trait Size:
    Copy
    + Ord
    + Hash
    + Debug
    + Display
    + Add<Output = Self>
    + Sub<Output = Self>
    + AddAssign
    + SubAssign
    + Sealed
{
    /// The value `0`.
    const ZERO: Self;

    /// The largest representable value, used as the failure sentinel.
    const MAX: Self;

    /// Checked addition. Returns `None` on overflow.
    fn checked_add(self, rhs: Self) -> Option<Self>;

    /// Converts `self` to a slice index.
    ///
    /// Values which do not fit in a `usize` are truncated; callers only use
    /// this on values that were themselves derived from slice positions.
    fn as_index(self) -> usize;
}

macro_rules! impl_size {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Sealed for $ty {}

            impl Size for $ty {
                const ZERO: Self = 0;
                const MAX: Self = <$ty>::MAX;

                #[inline]
                fn checked_add(self, rhs: Self) -> Option<Self> {
                    <$ty>::checked_add(self, rhs)
                }

                #[inline]
                fn as_index(self) -> usize {
                    self as usize
                }
            }
        )*
    };
}

impl_size!(u16, u32, u64, usize);

#[cfg(test)]
mod tests {
    use super::*;

    fn checked_add_generic<S: Size>(a: S, b: S) -> Option<S> {
        Size::checked_add(a, b)
    }

    #[test]
    fn sentinel_is_type_max() {
        assert_eq!(<u16 as Size>::MAX, u16::MAX);
        assert_eq!(<u32 as Size>::MAX, u32::MAX);
        assert_eq!(<u64 as Size>::MAX, u64::MAX);
        assert_eq!(<usize as Size>::MAX, usize::MAX);
    }

    #[test]
    fn checked_add_detects_overflow() {
        assert_eq!(checked_add_generic(u32::MAX - 1, 1), Some(u32::MAX));
        assert_eq!(checked_add_generic(u32::MAX, 1), None);
        assert_eq!(checked_add_generic(u16::MAX, 1), None);
    }
}
