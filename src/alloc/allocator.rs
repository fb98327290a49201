//! Offset allocator core: node arena, free-node pool, and the
//! allocate/free/coalesce engine.
//!
//! All bookkeeping lives in flat arrays addressed by `u32` indices; no
//! pointers, no heap allocation after construction. Each node describes one
//! contiguous region of the managed range and participates in two
//! doubly-linked lists at once: its size class's free list (only while
//! free) and the physical-adjacency chain (always), so coalescing can
//! reach both neighbors in O(1).

use super::bins::{BinMap, NUM_LEAF_BINS, TOP_BINS_INDEX_SHIFT};
use super::report::{FreeRegionClass, StorageReport, StorageReportFull};
use super::small_float;
use std::fmt;

pub(crate) type NodeIndex = u32;

/// Sentinel for "no node" in list links and bin heads.
const NODE_UNUSED: NodeIndex = NodeIndex::MAX;

/// Default node slot capacity: 128K concurrently live regions.
pub(crate) const DEFAULT_MAX_ALLOCATIONS: u32 = 128 * 1024;

#[derive(Debug)]
pub enum AllocError {
    /// Construction rejected a degenerate configuration.
    InvalidConfig(String),
    /// No free region large enough exists anywhere in the bin index.
    OutOfSpace { requested: u32 },
    /// The node pool is empty: too many concurrently live regions
    /// (allocations plus free fragments) for the configured capacity.
    /// Free space may still remain.
    NodeLimit { max_allocations: u32 },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            AllocError::OutOfSpace { requested } => {
                write!(f, "no contiguous free region of {requested} bytes")
            }
            AllocError::NodeLimit { max_allocations } => {
                write!(f, "node pool exhausted ({max_allocations} region slots)")
            }
        }
    }
}

impl std::error::Error for AllocError {}

/// Configuration for [`OffsetAllocator`]. Set at construction via
/// [`OffsetAllocator::with_config`].
#[derive(Clone, Debug)]
pub struct OffsetAllocatorConfig {
    /// Node slot capacity: the maximum number of concurrently live
    /// regions, counting both allocations and free fragments.
    /// Default: 131072.
    pub max_allocations: u32,
}

impl Default for OffsetAllocatorConfig {
    fn default() -> Self {
        Self {
            max_allocations: DEFAULT_MAX_ALLOCATIONS,
        }
    }
}

/// One region of the managed range, free or in use.
///
/// `bin_list_*` links are meaningful only while the node is free; the
/// `neighbor_*` chain is maintained for every node so a free can always
/// find its physical neighbors without searching.
#[derive(Clone, Copy, Debug)]
struct Node {
    data_offset: u32,
    data_size: u32,
    bin_list_prev: NodeIndex,
    bin_list_next: NodeIndex,
    neighbor_prev: NodeIndex,
    neighbor_next: NodeIndex,
    used: bool,
}

impl Node {
    const fn empty_slot() -> Self {
        Self {
            data_offset: 0,
            data_size: 0,
            bin_list_prev: NODE_UNUSED,
            bin_list_next: NODE_UNUSED,
            neighbor_prev: NODE_UNUSED,
            neighbor_next: NODE_UNUSED,
            used: false,
        }
    }
}

/// Handle to a live allocation.
///
/// Carries the granted offset plus the opaque node index the allocator
/// needs to free the region. Handles are plain `Copy` data; passing a
/// handle to [`OffsetAllocator::free`] more than once, or to a different
/// allocator instance, is a caller contract breach (checked by
/// `debug_assert!` only).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocation {
    offset: u32,
    node: NodeIndex,
}

impl Allocation {
    /// Absolute position of the region within the managed range.
    #[inline]
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset
    }
}

/// Offset allocator over a fixed linear address range `[0, size)`.
///
/// Hands out non-overlapping sub-ranges with O(1) allocate and free.
/// Allocation searches a two-level segregated-fit bin index; free eagerly
/// coalesces with both physical neighbors. Offsets are logical: the caller
/// maps them onto real memory (a GPU heap, an arena buffer).
///
/// Not thread safe. One instance per thread, or serialize externally.
pub struct OffsetAllocator {
    size: u32,
    max_allocations: u32,
    /// Running total of free bytes. Updated on every bin insert/remove,
    /// never recomputed by scanning.
    free_storage: u32,
    bin_map: BinMap,
    /// Head of each size class's free list.
    bin_heads: [NodeIndex; NUM_LEAF_BINS],
    nodes: Box<[Node]>,
    /// Stack of unused node slot indices; `free_nodes[..free_count]` are
    /// the available slots.
    free_nodes: Box<[NodeIndex]>,
    free_count: u32,
}

impl OffsetAllocator {
    /// Create an allocator managing `[0, size)` with the default node
    /// slot capacity.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidConfig`] if `size == 0` or the default
    /// capacity exceeds `size`.
    pub fn new(size: u32) -> Result<Self, AllocError> {
        Self::with_config(size, &OffsetAllocatorConfig::default())
    }

    /// Create an allocator managing `[0, size)` with an explicit
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidConfig`] if `size == 0`,
    /// `max_allocations == 0`, or `max_allocations > size`.
    pub fn with_config(size: u32, config: &OffsetAllocatorConfig) -> Result<Self, AllocError> {
        let max_allocations = config.max_allocations;
        if size == 0 {
            return Err(AllocError::InvalidConfig("size must be non-zero".into()));
        }
        if max_allocations == 0 {
            return Err(AllocError::InvalidConfig(
                "max_allocations must be non-zero".into(),
            ));
        }
        if max_allocations > size {
            return Err(AllocError::InvalidConfig(format!(
                "max_allocations {max_allocations} exceeds managed size {size}"
            )));
        }

        let mut allocator = Self {
            size,
            max_allocations,
            free_storage: 0,
            bin_map: BinMap::new(),
            bin_heads: [NODE_UNUSED; NUM_LEAF_BINS],
            nodes: vec![Node::empty_slot(); max_allocations as usize].into_boxed_slice(),
            // Descending so slot 0 pops first.
            free_nodes: (0..max_allocations).rev().collect::<Vec<_>>().into_boxed_slice(),
            free_count: max_allocations,
        };

        // Seed one free node spanning the whole range.
        allocator.insert_free_region(0, size);
        Ok(allocator)
    }

    /// Total managed range size in bytes.
    #[inline]
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Configured node slot capacity.
    #[inline]
    #[must_use]
    pub fn max_allocations(&self) -> u32 {
        self.max_allocations
    }

    /// Allocate a region of `size` bytes.
    ///
    /// `size == 0` is legal and returns a zero-length region at a valid
    /// offset. The granted region may be larger than requested internally
    /// but [`allocation_size`](Self::allocation_size) reports exactly
    /// `size`.
    ///
    /// # Errors
    ///
    /// - [`AllocError::NodeLimit`]: no node slots left to represent the
    ///   region or its split remainder, even if free space remains.
    /// - [`AllocError::OutOfSpace`]: no sufficiently large free region.
    ///
    /// Both are ordinary recoverable outcomes; free something and retry.
    pub fn allocate(&mut self, size: u32) -> Result<Allocation, AllocError> {
        // A split needs a fresh slot for the remainder; without one the
        // request cannot be represented, regardless of free space.
        if self.free_count == 0 {
            return Err(AllocError::NodeLimit {
                max_allocations: self.max_allocations,
            });
        }

        let min_bin = small_float::to_bin_round_up(size);
        let Some(bin) = self.bin_map.find_smallest_fit(min_bin) else {
            return Err(AllocError::OutOfSpace { requested: size });
        };

        // Round-down filing guarantees every region in `bin` is at least
        // the bin's nominal size, which round-up sizing made >= `size`:
        // the head fits without re-checking.
        let node_index = self.bin_heads[bin as usize];
        debug_assert_ne!(node_index, NODE_UNUSED);
        let node = self.nodes[node_index as usize];
        debug_assert!(!node.used);
        debug_assert!(node.data_size >= size);
        let node_total_size = node.data_size;

        // The popped node itself becomes the allocation record.
        self.nodes[node_index as usize].data_size = size;
        self.nodes[node_index as usize].used = true;

        self.bin_heads[bin as usize] = node.bin_list_next;
        if node.bin_list_next != NODE_UNUSED {
            self.nodes[node.bin_list_next as usize].bin_list_prev = NODE_UNUSED;
        }
        if self.bin_heads[bin as usize] == NODE_UNUSED {
            self.bin_map.mark_empty(bin);
        }
        self.free_storage -= node_total_size;

        // File the unused tail as a new free node spliced in right after
        // the allocated one.
        let remainder = node_total_size - size;
        if remainder > 0 {
            let new_index = self.insert_free_region(node.data_offset + size, remainder);

            let next = self.nodes[node_index as usize].neighbor_next;
            if next != NODE_UNUSED {
                self.nodes[next as usize].neighbor_prev = new_index;
            }
            self.nodes[new_index as usize].neighbor_prev = node_index;
            self.nodes[new_index as usize].neighbor_next = next;
            self.nodes[node_index as usize].neighbor_next = new_index;
        }

        Ok(Allocation {
            offset: node.data_offset,
            node: node_index,
        })
    }

    /// Free a region, eagerly merging it with any free physical neighbor
    /// on either side.
    ///
    /// The handle must be live and must come from this instance. Double
    /// frees and foreign handles are unchecked caller errors in release
    /// builds; debug builds assert.
    pub fn free(&mut self, allocation: Allocation) {
        let node_index = allocation.node;
        debug_assert!((node_index as usize) < self.nodes.len(), "foreign handle");
        let node = self.nodes[node_index as usize];
        debug_assert!(node.used, "free of a handle that is not live");

        let mut offset = node.data_offset;
        let mut size = node.data_size;
        let mut neighbor_prev = node.neighbor_prev;
        let mut neighbor_next = node.neighbor_next;

        // Absorb a free physical predecessor.
        if neighbor_prev != NODE_UNUSED && !self.nodes[neighbor_prev as usize].used {
            let prev = self.nodes[neighbor_prev as usize];
            debug_assert_eq!(prev.neighbor_next, node_index);
            offset = prev.data_offset;
            size += prev.data_size;
            self.remove_node_from_bin(neighbor_prev);
            neighbor_prev = prev.neighbor_prev;
        }

        // Absorb a free physical successor.
        if neighbor_next != NODE_UNUSED && !self.nodes[neighbor_next as usize].used {
            let next = self.nodes[neighbor_next as usize];
            debug_assert_eq!(next.neighbor_prev, node_index);
            size += next.data_size;
            self.remove_node_from_bin(neighbor_next);
            neighbor_next = next.neighbor_next;
        }

        // The original record is no longer needed as a distinct region;
        // the merged extent gets a freshly filed node.
        self.release_node_slot(node_index);
        let merged = self.insert_free_region(offset, size);

        if neighbor_next != NODE_UNUSED {
            self.nodes[merged as usize].neighbor_next = neighbor_next;
            self.nodes[neighbor_next as usize].neighbor_prev = merged;
        }
        if neighbor_prev != NODE_UNUSED {
            self.nodes[merged as usize].neighbor_prev = neighbor_prev;
            self.nodes[neighbor_prev as usize].neighbor_next = merged;
        }
    }

    /// Size of a live allocation.
    ///
    /// Stale or foreign handles are unchecked caller errors in release
    /// builds; debug builds assert.
    #[must_use]
    pub fn allocation_size(&self, allocation: Allocation) -> u32 {
        debug_assert!((allocation.node as usize) < self.nodes.len(), "foreign handle");
        let node = &self.nodes[allocation.node as usize];
        debug_assert!(node.used, "size query on a handle that is not live");
        node.data_size
    }

    /// Summary snapshot: total free bytes and a lower-bound estimate of
    /// the largest contiguous free region.
    ///
    /// Both report zero when the node pool is exhausted, since no request
    /// can be satisfied in that state.
    #[must_use]
    pub fn storage_report(&self) -> StorageReport {
        let mut total_free_space = 0;
        let mut largest_free_region = 0;

        if self.free_count > 0 {
            total_free_space = self.free_storage;
            if let Some(bin) = self.bin_map.highest_used_bin() {
                largest_free_region = small_float::bin_to_size(bin);
                debug_assert!(total_free_space >= largest_free_region);
            }
        }

        StorageReport {
            total_free_space,
            largest_free_region,
        }
    }

    /// Full histogram: free-region count per size class, all 256 classes
    /// in order. O(free region count).
    #[must_use]
    pub fn storage_report_full(&self) -> StorageReportFull {
        let mut report = StorageReportFull::default();
        for bin in 0..NUM_LEAF_BINS {
            let mut count = 0u32;
            let mut node_index = self.bin_heads[bin];
            while node_index != NODE_UNUSED {
                node_index = self.nodes[node_index as usize].bin_list_next;
                count += 1;
            }
            report.free_regions[bin] = FreeRegionClass {
                size: small_float::bin_to_size(bin as u32),
                count,
            };
        }
        report
    }

    /// File a free region `[data_offset, data_offset + size)` into the bin
    /// matching its round-down class, as the new list head. Neighbor links
    /// start unset; the caller splices them. Returns the node index.
    fn insert_free_region(&mut self, data_offset: u32, size: u32) -> NodeIndex {
        let bin = small_float::to_bin_round_down(size);
        debug_assert!((bin >> TOP_BINS_INDEX_SHIFT) < 32);

        if self.bin_heads[bin as usize] == NODE_UNUSED {
            self.bin_map.mark_non_empty(bin);
        }

        let head = self.bin_heads[bin as usize];
        let node_index = self.acquire_node_slot();
        self.nodes[node_index as usize] = Node {
            data_offset,
            data_size: size,
            bin_list_prev: NODE_UNUSED,
            bin_list_next: head,
            neighbor_prev: NODE_UNUSED,
            neighbor_next: NODE_UNUSED,
            used: false,
        };
        if head != NODE_UNUSED {
            self.nodes[head as usize].bin_list_prev = node_index;
        }
        self.bin_heads[bin as usize] = node_index;

        self.free_storage += size;
        node_index
    }

    /// Unlink a free node from its bin list and release its slot. Clears
    /// the bin's occupancy bit when the list empties. Neighbor links are
    /// left for the caller to splice around.
    fn remove_node_from_bin(&mut self, node_index: NodeIndex) {
        let node = self.nodes[node_index as usize];
        debug_assert!(!node.used);

        if node.bin_list_prev != NODE_UNUSED {
            // Interior of the list.
            self.nodes[node.bin_list_prev as usize].bin_list_next = node.bin_list_next;
            if node.bin_list_next != NODE_UNUSED {
                self.nodes[node.bin_list_next as usize].bin_list_prev = node.bin_list_prev;
            }
        } else {
            // List head: re-derive the bin from the node's size.
            let bin = small_float::to_bin_round_down(node.data_size);
            debug_assert_eq!(self.bin_heads[bin as usize], node_index);

            self.bin_heads[bin as usize] = node.bin_list_next;
            if node.bin_list_next != NODE_UNUSED {
                self.nodes[node.bin_list_next as usize].bin_list_prev = NODE_UNUSED;
            }
            if self.bin_heads[bin as usize] == NODE_UNUSED {
                self.bin_map.mark_empty(bin);
            }
        }

        self.release_node_slot(node_index);
        self.free_storage -= node.data_size;
    }

    /// Pop an unused slot index off the pool. Callers guarantee the pool
    /// is non-empty.
    #[inline]
    fn acquire_node_slot(&mut self) -> NodeIndex {
        debug_assert!(self.free_count > 0, "node pool underflow");
        self.free_count -= 1;
        self.free_nodes[self.free_count as usize]
    }

    /// Push a slot index back onto the pool. The slot's fields are stale
    /// until the next insert reinitializes them.
    #[inline]
    fn release_node_slot(&mut self, node_index: NodeIndex) {
        self.free_nodes[self.free_count as usize] = node_index;
        self.free_count += 1;
    }

    /// Exhaustive structural check, debug builds only. Walks the pool, all
    /// 256 bin lists, and the physical neighbor chain, and cross-checks
    /// them against the occupancy bitmaps and the running free counter.
    #[cfg(any(debug_assertions, test))]
    #[allow(dead_code)]
    pub(crate) fn assert_invariants(&self) {
        use fixedbitset::FixedBitSet;

        let slot_count = self.max_allocations as usize;
        let mut in_pool = FixedBitSet::with_capacity(slot_count);
        for &slot in &self.free_nodes[..self.free_count as usize] {
            assert!(
                !in_pool.put(slot as usize),
                "slot {slot} present twice in the pool"
            );
        }

        // Every free node sits in exactly one bin list, filed under its
        // round-down class, with consistent back links; the occupancy
        // bitmaps mirror list non-emptiness exactly.
        let mut in_bin = FixedBitSet::with_capacity(slot_count);
        let mut free_bytes = 0u64;
        for bin in 0..NUM_LEAF_BINS {
            let head = self.bin_heads[bin];
            assert_eq!(
                self.bin_map.is_marked(bin as u32),
                head != NODE_UNUSED,
                "occupancy bit out of sync for bin {bin}"
            );
            let mut prev = NODE_UNUSED;
            let mut node_index = head;
            while node_index != NODE_UNUSED {
                assert!(!in_pool.contains(node_index as usize));
                assert!(
                    !in_bin.put(node_index as usize),
                    "slot {node_index} linked into two bin lists"
                );
                let node = &self.nodes[node_index as usize];
                assert!(!node.used);
                assert_eq!(node.bin_list_prev, prev);
                assert_eq!(
                    small_float::to_bin_round_down(node.data_size) as usize,
                    bin,
                    "node filed under the wrong class"
                );
                free_bytes += u64::from(node.data_size);
                prev = node_index;
                node_index = node.bin_list_next;
            }
        }
        assert_eq!(free_bytes, u64::from(self.free_storage));

        // The neighbor chain over all live nodes partitions [0, size).
        let live_count = slot_count - self.free_count as usize;
        let mut heads = 0usize;
        let mut chain_start = NODE_UNUSED;
        for slot in 0..slot_count {
            if in_pool.contains(slot) {
                continue;
            }
            let node = &self.nodes[slot];
            assert!(
                node.used != in_bin.contains(slot),
                "slot {slot} is neither allocated nor bin-listed"
            );
            if node.neighbor_prev == NODE_UNUSED {
                heads += 1;
                chain_start = slot as NodeIndex;
            }
        }
        assert_eq!(heads, 1, "neighbor chain must have exactly one head");

        let mut cursor = chain_start;
        let mut expected_offset = 0u32;
        let mut visited = 0usize;
        let mut prev = NODE_UNUSED;
        while cursor != NODE_UNUSED {
            let node = &self.nodes[cursor as usize];
            assert!(!in_pool.contains(cursor as usize));
            assert_eq!(node.neighbor_prev, prev);
            assert_eq!(node.data_offset, expected_offset, "gap or overlap in chain");
            expected_offset += node.data_size;
            visited += 1;
            prev = cursor;
            cursor = node.neighbor_next;
        }
        assert_eq!(expected_offset, self.size, "chain does not cover the range");
        assert_eq!(visited, live_count, "live node unreachable from the chain");
    }
}
