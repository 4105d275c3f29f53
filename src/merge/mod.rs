//! Merge engine
//!
//! Pure, synchronous reconciliation of record collections. Every merge is
//! all-or-nothing at call granularity: a capacity failure is detected
//! before anything is written, so the target is left untouched.
//!
//! Two operations exist on each table:
//! - `absorb_new_only` adds unseen keys and never touches existing entries.
//!   Replaying the same remote set is a no-op the second time.
//! - `reconcile` also folds overlapping entries together (sum/min/max).
//!   It is meant for one-shot bidirectional peer exchanges and is not
//!   idempotent under replay.

pub mod names;
pub mod sessions;
pub mod summaries;
pub mod totals;

pub use names::merge_title_names;
pub use totals::recompute_totals;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("{table} table full: {needed} slots needed, {available} available")]
    Capacity {
        table: &'static str,
        needed: usize,
        available: usize,
    },
}

/// Merge operations of a record table against a remote batch.
pub trait RecordMerge<Remote: ?Sized> {
    /// Insert entries whose key is unknown locally. Returns how many were added.
    fn absorb_new_only(&mut self, remote: &Remote) -> Result<usize, MergeError>;

    /// Insert unknown entries and combine overlapping ones. Returns how many
    /// entries were newly added.
    fn reconcile(&mut self, remote: &Remote) -> Result<usize, MergeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    AbsorbNewOnly,
    Reconcile,
}
