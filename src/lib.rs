//! A coalescing first-fit offset allocator.
//!
//! [`CoalescingAllocator`] manages free space inside a contiguous numeric
//! range owned by someone else, such as a GPU buffer or a pool of slots. It
//! does not touch memory: allocations are plain `(offset, size)` pairs, and
//! released ranges are merged with adjacent free space so the free list
//! never holds two touching blocks.
//!
//! ```
//! use coalescing_alloc::CoalescingAllocator;
//!
//! let mut alloc = CoalescingAllocator::<u32>::with_range(0, 100).unwrap();
//!
//! let a = alloc.allocate(30);
//! let b = alloc.allocate(70);
//! assert_eq!((a, b), (0, 30));
//! assert_eq!(alloc.allocate(1), CoalescingAllocator::<u32>::SENTINEL);
//!
//! alloc.deallocate(a, 30);
//! alloc.deallocate(b, 70);
//! assert_eq!(alloc.len(), 1);
//! assert_eq!(alloc.free_size(), 100);
//! ```

#![doc(html_root_url = "https://docs.rs/coalescing_alloc/0.1.0")]
#![no_std]
#![warn(missing_debug_implementations)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

extern crate alloc;

pub mod coalescing;
pub mod search;
mod size;


use core::fmt;

pub use crate::{
    coalescing::{CoalescingAllocator, FreeBlock},
    size::Size,
};

/// Indicates an allocation failure due to exhaustion of the managed range.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct AllocError;

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("no free block can satisfy the request")
    }
}

impl core::error::Error for AllocError {}

/// The error type for allocator constructors.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AllocInitError {
    /// The configuration of the allocator is invalid.
    ///
    /// This variant is returned when a seed block is empty, or when the seed
    /// blocks are not sorted, overlap, or touch each other.
    InvalidConfig,

    /// A seed block extends past the end of the representable range.
    InvalidLocation,
}

impl fmt::Display for AllocInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocInitError::InvalidConfig => f.write_str("invalid free block configuration"),
            AllocInitError::InvalidLocation => {
                f.write_str("free block extends past the end of the address range")
            }
        }
    }
}

impl core::error::Error for AllocInitError {}

/// The error type for checked deallocation.
///
/// Returned by [`CoalescingAllocator::try_deallocate`]. The allocator is left
/// unmodified when an error is returned.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DeallocError {
    /// The released range is empty.
    ZeroSize,

    /// `offset + size` is not representable.
    Overflow,

    /// The released range overlaps a block that is already free.
    ///
    /// This indicates a double free or a range that was never allocated.
    Overlap,
}

impl fmt::Display for DeallocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeallocError::ZeroSize => f.write_str("released range is empty"),
            DeallocError::Overflow => f.write_str("released range overflows the address range"),
            DeallocError::Overlap => f.write_str("released range overlaps free space"),
        }
    }
}

impl core::error::Error for DeallocError {}

#[doc(hidden)]
mod private {
    pub trait Sealed {}
}
use private::Sealed;
