//! Capability contracts for the applier's external collaborators.
//!
//! Column families are referenced by raw `u32` ids everywhere (0 = the
//! default family), matching the wire encoding in the batch format.

use std::sync::Arc;

use batch::RecordKind;

/// Options for a point read issued by the applier.
///
/// The snapshot pins the read to a sequence number so that records earlier
/// in the same batch are visible while later ones are not.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    pub snapshot: Option<u64>,
}

/// Per-memtable knobs the applier consults, plus the user hooks attached to
/// the column family. Cheap to clone; the hooks are shared behind `Arc`.
#[derive(Clone, Default)]
pub struct MemtableOptions {
    /// Allow `update`/`update_callback` instead of plain inserts for Puts.
    pub inplace_update_support: bool,

    /// User hook driving the read-modify-write Put path. Only consulted
    /// when `inplace_update_support` is set.
    pub inplace_callback: Option<Arc<dyn InplaceCallback>>,

    /// Opt in to the key-may-exist delete filter.
    pub filter_deletes: bool,

    /// Collapse a run of merge operands into a base value once it grows to
    /// this length. 0 disables collapsing.
    pub max_successive_merges: usize,

    /// Combines a base value with merge operands. Required for collapsing.
    pub merge_operator: Option<Arc<dyn MergeOperator>>,

    /// Event sink; when absent, no statistics are gathered.
    pub statistics: Option<Arc<dyn StatsSink>>,
}

/// Cursor over the column families of one engine instance.
///
/// Implementations carry a lookup cache keyed by the last sought id, which
/// makes the cursor stateful: do not share it (or an applier holding it)
/// across threads.
pub trait ColumnFamilyMemtables {
    /// Positions the cursor on `column_family_id`; false when the id does
    /// not name a live column family.
    fn seek(&mut self, column_family_id: u32) -> bool;

    /// The log generation the current column family was last recovered
    /// from. Only valid after a successful `seek`.
    fn log_number(&self) -> u64;

    /// Handle of the current column family, when the registry exposes one;
    /// the applier falls back to the database's default family otherwise.
    fn current_handle(&self) -> Option<u32>;

    /// The current column family's active memtable. Only valid after a
    /// successful `seek`.
    fn memtable(&mut self) -> &mut dyn Memtable;
}

/// The in-memory staging structure the applier writes into.
pub trait Memtable {
    /// Appends one record. `concurrent` selects the lock-free insert path;
    /// otherwise external synchronization is presumed.
    fn add(&mut self, sequence: u64, kind: RecordKind, key: &[u8], value: &[u8], concurrent: bool);

    /// Replaces the existing value in place when present with the same
    /// effective length, else inserts.
    fn update(&mut self, sequence: u64, key: &[u8], value: &[u8]);

    /// Lets the memtable try the in-place callback against a resident
    /// entry. True means the update was fully handled.
    fn update_callback(&mut self, sequence: u64, key: &[u8], value: &[u8]) -> bool;

    /// Length of the run of merge operands stacked at the head of `key`,
    /// as visible at `sequence`.
    fn count_successive_merges(&self, key: &[u8], sequence: u64) -> usize;

    /// True when the memtable has grown past its flush threshold.
    fn should_schedule_flush(&self) -> bool;

    /// Test-and-set latch: true for exactly one caller per memtable, so a
    /// flush is requested at most once.
    fn mark_flush_scheduled(&mut self) -> bool;

    /// The options and hooks in effect for this memtable.
    fn options(&self) -> MemtableOptions;
}

/// Read access to the composed state of the database (memtables plus the
/// on-disk tree), used by the read-modify-write paths.
pub trait Db {
    /// Point read at the options' snapshot. `None` when the key is absent.
    fn get(&self, options: &ReadOptions, column_family_id: u32, key: &[u8]) -> Option<Vec<u8>>;

    /// False only when the key is definitively absent; may return true
    /// spuriously.
    fn key_may_exist(&self, options: &ReadOptions, column_family_id: u32, key: &[u8]) -> bool;

    /// Handle of the default column family.
    fn default_column_family(&self) -> u32;
}

/// Receives flush requests for memtables that reported themselves full.
pub trait FlushScheduler {
    fn schedule_flush(&self, column_family_id: u32);
}

/// User-supplied function combining a base value and operands into a new
/// base value.
pub trait MergeOperator: Send + Sync {
    /// `None` signals a merge failure; the applier falls back to storing
    /// the operand.
    fn full_merge(&self, key: &[u8], existing: Option<&[u8]>, operands: &[&[u8]])
        -> Option<Vec<u8>>;
}

/// Outcome of an [`InplaceCallback`] invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    /// Nothing to store; the write is dropped.
    NotUpdated,
    /// The existing buffer handed to the callback now holds the final
    /// value (it may have been shortened in place).
    UpdatedInplace,
    /// The returned buffer holds the final value.
    Updated(Vec<u8>),
}

/// User hook for read-modify-write Puts.
pub trait InplaceCallback: Send + Sync {
    /// `existing` is the current value when the key is present; the
    /// callback may edit or truncate it and answer `UpdatedInplace`.
    /// Answering `UpdatedInplace` without an existing buffer is treated as
    /// an empty previous value.
    fn update(&self, existing: Option<&mut Vec<u8>>, delta: &[u8]) -> UpdateStatus;
}

/// Counter events emitted by the applier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ticker {
    /// Puts that reached the memtable through the callback path.
    KeysWritten,
    /// Puts absorbed by an in-place update.
    KeysUpdated,
    /// Deletes dropped because the key was definitively absent.
    FilteredDeletes,
    /// Merge-operator invocations that failed.
    MergeFailures,
    /// Wall time spent inside the merge operator, in nanoseconds.
    MergeNanos,
}

/// Sink for [`Ticker`] events. Implementations must tolerate concurrent
/// callers.
pub trait StatsSink: Send + Sync {
    fn record_tick(&self, ticker: Ticker, value: u64);
}
