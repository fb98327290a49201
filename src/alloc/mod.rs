pub(crate) mod allocator;
pub(crate) mod bins;
pub(crate) mod report;
pub(crate) mod small_float;
