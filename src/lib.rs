//! Binned offset allocator.
//!
//! Suballocates a fixed linear address range `[0, size)` into
//! non-overlapping `(offset, size)` regions with O(1) allocate and free:
//! a two-level segregated-fit bin index over 256 logarithmic size classes,
//! a fixed-capacity node arena addressed by integer indices, and eager
//! coalescing of freed neighbors. Built for real-time use (GPU heaps,
//! arena buffers) where predictable latency beats perfect packing.
//!
//! Offsets are logical: the caller maps them onto real memory. The
//! allocator never touches memory at the offsets it hands out and never
//! allocates after construction.
//!
//! ```
//! use rangebin::OffsetAllocator;
//!
//! let mut heap = OffsetAllocator::new(256 * 1024 * 1024)?;
//! let texture = heap.allocate(1024 * 1024)?;
//! let buffer = heap.allocate(65536)?;
//! assert_ne!(texture.offset(), buffer.offset());
//!
//! heap.free(buffer);
//! heap.free(texture);
//! assert_eq!(heap.storage_report().total_free_space, 256 * 1024 * 1024);
//! # Ok::<(), rangebin::AllocError>(())
//! ```
//!
//! Not thread safe: one instance per thread, or serialize externally.

// public module: contains implementation details (hidden via pub(crate))
pub mod alloc;

// allocator
pub use alloc::allocator::{AllocError, Allocation, OffsetAllocator, OffsetAllocatorConfig};

// reporting
pub use alloc::report::{FreeRegionClass, StorageReport, StorageReportFull};
