//! Batching for key-share retrieval.
//!
//! Ids go to the key servers in groups of at most [`KEY_BATCH_SIZE`], one
//! transaction and one quorum round-trip per group.

use std::ops::Range;

/// Maximum object ids per key request.
pub const KEY_BATCH_SIZE: usize = 10;

/// Key shares required per object.
pub const KEY_THRESHOLD: u8 = 2;

/// Index ranges covering `len` items in consecutive batches of at most
/// `batch_size`, in order. Empty input yields no batches.
pub fn plan_batches(len: usize, batch_size: usize) -> Vec<Range<usize>> {
    assert!(batch_size > 0, "batch_size must be > 0");
    (0..len)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(len))
        .collect()
}
