//! The applier itself plus the writer-list dispatch entry points.

use std::sync::Arc;
use std::time::Instant;

use batch::{BatchError, Handler, RecordKind, Result, WriteBatch};

use crate::traits::{
    ColumnFamilyMemtables, Db, FlushScheduler, ReadOptions, StatsSink, Ticker, UpdateStatus,
};
use crate::ApplyOptions;

fn record_tick(statistics: &Option<Arc<dyn StatsSink>>, ticker: Ticker, value: u64) {
    if let Some(stats) = statistics {
        stats.record_tick(ticker, value);
    }
}

/// A [`Handler`] that materializes batch records into column-family
/// memtables, assigning one sequence number per user record.
///
/// The applier is stateful (sequence cursor plus the column-family lookup
/// cursor) and must stay confined to one thread; the write pipeline above
/// either serializes writers through one applier or clones the cursor per
/// worker.
pub struct MemtableApplier<'a> {
    sequence: u64,
    cf_mems: &'a mut dyn ColumnFamilyMemtables,
    flush_scheduler: Option<&'a dyn FlushScheduler>,
    db: Option<&'a dyn Db>,
    options: ApplyOptions,
}

impl<'a> MemtableApplier<'a> {
    /// Creates an applier that stamps its first record with `sequence`.
    pub fn new(
        sequence: u64,
        cf_mems: &'a mut dyn ColumnFamilyMemtables,
        flush_scheduler: Option<&'a dyn FlushScheduler>,
        db: Option<&'a dyn Db>,
        options: ApplyOptions,
    ) -> Self {
        MemtableApplier {
            sequence,
            cf_mems,
            flush_scheduler,
            db,
            options,
        }
    }

    /// The sequence number the next record would receive. After a full
    /// walk this is the starting sequence plus the number of user records
    /// that consumed one.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Positions the cursor for one record. `Ok(true)` means apply it;
    /// `Ok(false)` means skip it silently (unknown-but-ignored family, or
    /// a recovery replay the family has already absorbed). Skips and the
    /// unknown-family error alike still cost a sequence number, which the
    /// callers account for.
    fn seek_to_column_family(&mut self, column_family_id: u32) -> Result<bool> {
        if !self.cf_mems.seek(column_family_id) {
            if self.options.ignore_missing_column_families {
                return Ok(false);
            }
            return Err(BatchError::InvalidArgument(
                "Invalid column family specified in write batch",
            ));
        }
        let replaying = self.options.recovery_log_number;
        if replaying != 0 && replaying < self.cf_mems.log_number() {
            // Only reachable during recovery: the family was rebuilt from a
            // newer log, so this record was absorbed in an earlier round.
            // Applying it twice would corrupt update-in-place and merge
            // workloads.
            tracing::debug!(
                column_family_id,
                log_number = replaying,
                "skipping record already covered by a newer log"
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// The current family's handle, or the database default when the
    /// registry exposes none.
    fn current_or_default_handle(&self) -> u32 {
        self.cf_mems
            .current_handle()
            .or_else(|| self.db.map(|db| db.default_column_family()))
            .unwrap_or(0)
    }

    /// Shared tail of Delete and SingleDelete, differing only in the
    /// record kind written to the memtable.
    fn delete_impl(&mut self, column_family_id: u32, key: &[u8], kind: RecordKind) -> Result<()> {
        match self.seek_to_column_family(column_family_id) {
            Ok(true) => {}
            Ok(false) => {
                self.sequence += 1;
                return Ok(());
            }
            Err(e) => {
                self.sequence += 1;
                return Err(e);
            }
        }

        let cf_handle = self.current_or_default_handle();
        let sequence = self.sequence;
        let concurrent = self.options.concurrent_memtable_writes;
        let db = self.db;
        let mem = self.cf_mems.memtable();
        let mopts = mem.options();

        if self.options.allow_delete_filtering && mopts.filter_deletes {
            debug_assert!(!concurrent);
            if let Some(db) = db {
                let read_options = ReadOptions {
                    snapshot: Some(sequence),
                };
                if !db.key_may_exist(&read_options, cf_handle, key) {
                    record_tick(&mopts.statistics, Ticker::FilteredDeletes, 1);
                    // Nothing reaches the memtable and no sequence number
                    // is consumed for a filtered delete.
                    return Ok(());
                }
            }
        }

        mem.add(sequence, kind, key, &[], concurrent);
        self.sequence += 1;
        self.check_memtable_full();
        Ok(())
    }

    /// With a scheduler configured, requests a flush for a memtable that
    /// reports itself due. The memtable's test-and-set latch guarantees at
    /// most one request per memtable.
    fn check_memtable_full(&mut self) {
        if let Some(scheduler) = self.flush_scheduler {
            if let Some(cf_handle) = self.cf_mems.current_handle() {
                let mem = self.cf_mems.memtable();
                if mem.should_schedule_flush() && mem.mark_flush_scheduled() {
                    tracing::debug!(column_family_id = cf_handle, "scheduling memtable flush");
                    scheduler.schedule_flush(cf_handle);
                }
            }
        }
    }
}

impl Handler for MemtableApplier<'_> {
    fn put(&mut self, column_family_id: u32, key: &[u8], value: &[u8]) -> Result<()> {
        match self.seek_to_column_family(column_family_id) {
            Ok(true) => {}
            Ok(false) => {
                self.sequence += 1;
                return Ok(());
            }
            Err(e) => {
                self.sequence += 1;
                return Err(e);
            }
        }

        let cf_handle = self.current_or_default_handle();
        let sequence = self.sequence;
        let concurrent = self.options.concurrent_memtable_writes;
        let db = self.db;
        let mem = self.cf_mems.memtable();
        let mopts = mem.options();

        if !mopts.inplace_update_support {
            mem.add(sequence, RecordKind::Value, key, value, concurrent);
        } else {
            match mopts.inplace_callback.as_deref() {
                None => {
                    debug_assert!(!concurrent);
                    mem.update(sequence, key, value);
                    record_tick(&mopts.statistics, Ticker::KeysUpdated, 1);
                }
                Some(callback) => {
                    debug_assert!(!concurrent);
                    if !mem.update_callback(sequence, key, value) {
                        // Key not resident in the memtable: read the current
                        // value at this record's snapshot, run the callback,
                        // and store its outcome.
                        let read_options = ReadOptions {
                            snapshot: Some(sequence),
                        };
                        let mut previous = db.and_then(|db| db.get(&read_options, cf_handle, key));
                        match callback.update(previous.as_mut(), value) {
                            UpdateStatus::UpdatedInplace => {
                                // The previous buffer was edited in place,
                                // possibly shortened.
                                mem.add(
                                    sequence,
                                    RecordKind::Value,
                                    key,
                                    previous.as_deref().unwrap_or_default(),
                                    false,
                                );
                                record_tick(&mopts.statistics, Ticker::KeysWritten, 1);
                            }
                            UpdateStatus::Updated(merged) => {
                                mem.add(sequence, RecordKind::Value, key, &merged, false);
                                record_tick(&mopts.statistics, Ticker::KeysWritten, 1);
                            }
                            UpdateStatus::NotUpdated => {}
                        }
                    }
                }
            }
        }

        // Every Put consumes a sequence number, even when the update path
        // dropped the write, so replay produces identical numbering.
        self.sequence += 1;
        self.check_memtable_full();
        Ok(())
    }

    fn delete(&mut self, column_family_id: u32, key: &[u8]) -> Result<()> {
        self.delete_impl(column_family_id, key, RecordKind::Deletion)
    }

    fn single_delete(&mut self, column_family_id: u32, key: &[u8]) -> Result<()> {
        self.delete_impl(column_family_id, key, RecordKind::SingleDeletion)
    }

    fn merge(&mut self, column_family_id: u32, key: &[u8], value: &[u8]) -> Result<()> {
        debug_assert!(!self.options.concurrent_memtable_writes);
        match self.seek_to_column_family(column_family_id) {
            Ok(true) => {}
            Ok(false) => {
                self.sequence += 1;
                return Ok(());
            }
            Err(e) => {
                self.sequence += 1;
                return Err(e);
            }
        }

        let cf_handle = self.current_or_default_handle();
        let sequence = self.sequence;
        let db = self.db;
        let mem = self.cf_mems.memtable();
        let mopts = mem.options();

        let mut perform_merge = false;
        if mopts.max_successive_merges > 0 && db.is_some() {
            // Length of the operand run already stacked on this key.
            let num_merges = mem.count_successive_merges(key, sequence);
            if num_merges >= mopts.max_successive_merges {
                perform_merge = true;
            }
        }

        if perform_merge {
            if let (Some(db), Some(operator)) = (db, mopts.merge_operator.as_deref()) {
                // Read at this record's snapshot so merges earlier in the
                // same batch are already folded into the base value.
                let read_options = ReadOptions {
                    snapshot: Some(sequence),
                };
                let existing = db.get(&read_options, cf_handle, key);

                let timer = mopts.statistics.as_ref().map(|_| Instant::now());
                let merged = operator.full_merge(key, existing.as_deref(), &[value]);
                if let (Some(started), Some(stats)) = (timer, mopts.statistics.as_deref()) {
                    stats.record_tick(Ticker::MergeNanos, started.elapsed().as_nanos() as u64);
                }

                match merged {
                    Some(new_value) => {
                        // The whole run collapses into one base value.
                        mem.add(sequence, RecordKind::Value, key, &new_value, false);
                    }
                    None => {
                        record_tick(&mopts.statistics, Ticker::MergeFailures, 1);
                        tracing::warn!(
                            column_family_id,
                            "merge operator failed, storing the operand instead"
                        );
                        perform_merge = false;
                    }
                }
            } else {
                // No operator registered; nothing to collapse with.
                perform_merge = false;
            }
        }

        if !perform_merge {
            mem.add(sequence, RecordKind::Merge, key, value, false);
        }

        self.sequence += 1;
        self.check_memtable_full();
        Ok(())
    }
}

/// One queued write: a batch plus the per-writer outcome slot.
#[derive(Debug)]
pub struct BatchWriter {
    pub batch: WriteBatch,
    /// Filled in by [`insert_into`]; `Ok` until the writer is processed.
    pub status: Result<()>,
    /// Set by the pipeline when the writer's pre-write callback failed;
    /// such writers are skipped entirely.
    pub callback_failed: bool,
}

impl BatchWriter {
    pub fn new(batch: WriteBatch) -> Self {
        BatchWriter {
            batch,
            status: Ok(()),
            callback_failed: false,
        }
    }
}

/// Applies an ordered list of writers through one shared applier, so their
/// batches consume one contiguous range of sequence numbers starting at
/// `sequence`.
///
/// Writers marked callback-failed are skipped (consuming nothing). Each
/// processed writer's status is stored on the writer; the first failure
/// stops the walk and is also returned.
pub fn insert_into(
    writers: &mut [BatchWriter],
    sequence: u64,
    cf_mems: &mut dyn ColumnFamilyMemtables,
    flush_scheduler: Option<&dyn FlushScheduler>,
    db: Option<&dyn Db>,
    options: ApplyOptions,
) -> Result<()> {
    let mut applier = MemtableApplier::new(sequence, cf_mems, flush_scheduler, db, options);
    for writer in writers.iter_mut() {
        if writer.callback_failed {
            continue;
        }
        writer.status = writer.batch.iterate(&mut applier);
        if let Err(e) = &writer.status {
            return Err(e.clone());
        }
    }
    Ok(())
}

/// Applies a single batch, numbering records from the batch's own header
/// sequence.
pub fn insert_into_batch(
    batch: &WriteBatch,
    cf_mems: &mut dyn ColumnFamilyMemtables,
    flush_scheduler: Option<&dyn FlushScheduler>,
    db: Option<&dyn Db>,
    options: ApplyOptions,
) -> Result<()> {
    let mut applier = MemtableApplier::new(batch.sequence(), cf_mems, flush_scheduler, db, options);
    batch.iterate(&mut applier)
}
