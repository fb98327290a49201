//! Free-space reporting types.
//!
//! Snapshots are diagnostic only: values describe the allocator at the
//! moment of the call and go stale on the next allocate or free. Do not
//! base allocation decisions on them beyond "will probably fit".

use super::bins::NUM_LEAF_BINS;

/// Cheap summary snapshot, O(1) to produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageReport {
    /// Sum of all free region sizes in bytes.
    pub total_free_space: u32,
    /// Lower-bound estimate of the largest contiguous free region: the
    /// nominal size of the highest occupied size class. The true largest
    /// region may exceed this by up to the class granularity (1/8).
    pub largest_free_region: u32,
}

/// One row of the full histogram: a size class and its free-list length.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FreeRegionClass {
    /// Minimum region size filed under this class, in bytes.
    pub size: u32,
    /// Number of free regions currently in this class's list.
    pub count: u32,
}

/// Histogram of free regions over all 256 size classes, in class order.
/// O(free region count) to produce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageReportFull {
    pub free_regions: [FreeRegionClass; NUM_LEAF_BINS],
}

impl Default for StorageReportFull {
    fn default() -> Self {
        Self {
            free_regions: [FreeRegionClass::default(); NUM_LEAF_BINS],
        }
    }
}

impl StorageReportFull {
    /// Total number of free regions across all classes.
    pub fn total_free_nodes(&self) -> u32 {
        self.free_regions.iter().map(|r| r.count).sum()
    }
}
