//! Handler-driven iteration over a batch's records.
//!
//! Decoding is strict: every length prefix must land inside the buffer,
//! every tag must be known, and a walk that exhausts the buffer must have
//! seen exactly `count` user records. Iteration is non-destructive and may
//! run concurrently from multiple readers as long as the batch is not being
//! mutated.

use crate::record::{read_record, Record};
use crate::{content_flags, BatchError, Result, WriteBatch, HEADER_SIZE};

/// Receiver for the records of a batch, dispatched in buffer order.
///
/// Key/value slices borrow from the batch buffer and are only valid for the
/// duration of the call. The four record methods return a `Result` so an
/// implementation can abort the walk; `log_data` is informational and
/// cannot fail.
pub trait Handler {
    /// Called for each Put record.
    fn put(&mut self, column_family_id: u32, key: &[u8], value: &[u8]) -> Result<()>;

    /// Called for each Delete record.
    fn delete(&mut self, column_family_id: u32, key: &[u8]) -> Result<()>;

    /// Called for each SingleDelete record.
    fn single_delete(&mut self, column_family_id: u32, key: &[u8]) -> Result<()>;

    /// Called for each Merge record.
    fn merge(&mut self, column_family_id: u32, key: &[u8], value: &[u8]) -> Result<()>;

    /// Called for each LogData annotation. The default ignores them.
    fn log_data(&mut self, blob: &[u8]) {
        let _ = blob;
    }

    /// Polled before each record; returning `false` ends the walk early
    /// without error. The default never stops.
    fn should_continue(&self) -> bool {
        true
    }
}

/// Re-derives the content bitmask of a buffer whose flags are deferred.
#[derive(Default)]
pub(crate) struct ContentClassifier {
    pub(crate) flags: u32,
}

impl Handler for ContentClassifier {
    fn put(&mut self, _column_family_id: u32, _key: &[u8], _value: &[u8]) -> Result<()> {
        self.flags |= content_flags::HAS_PUT;
        Ok(())
    }

    fn delete(&mut self, _column_family_id: u32, _key: &[u8]) -> Result<()> {
        self.flags |= content_flags::HAS_DELETE;
        Ok(())
    }

    fn single_delete(&mut self, _column_family_id: u32, _key: &[u8]) -> Result<()> {
        self.flags |= content_flags::HAS_SINGLE_DELETE;
        Ok(())
    }

    fn merge(&mut self, _column_family_id: u32, _key: &[u8], _value: &[u8]) -> Result<()> {
        self.flags |= content_flags::HAS_MERGE;
        Ok(())
    }
}

impl WriteBatch {
    /// Walks every record in buffer order, dispatching each to `handler`.
    ///
    /// # Errors
    ///
    /// - `Corruption("malformed WriteBatch (too small)")` — buffer shorter
    ///   than the 12-byte header.
    /// - `Corruption("bad WriteBatch Put/Delete/Merge/Blob")` — a record's
    ///   framing is invalid (message reflects the tag family).
    /// - `Corruption("unknown WriteBatch tag")` — unrecognized tag byte.
    /// - `Corruption("WriteBatch has wrong count")` — the walk exhausted
    ///   the buffer but the number of user records seen differs from the
    ///   header count. A walk cancelled by
    ///   [`should_continue`](Handler::should_continue) skips this check.
    /// - Any error returned by a handler method, unchanged.
    pub fn iterate<H: Handler + ?Sized>(&self, handler: &mut H) -> Result<()> {
        if self.rep.len() < HEADER_SIZE {
            return Err(BatchError::Corruption("malformed WriteBatch (too small)"));
        }

        let mut input = &self.rep[HEADER_SIZE..];
        let mut found: u32 = 0;
        while !input.is_empty() {
            if !handler.should_continue() {
                // The walk did not finish, so the count check below would
                // reject every partial walk; skip it.
                return Ok(());
            }
            match read_record(&mut input)? {
                Record::Put {
                    column_family_id,
                    key,
                    value,
                } => {
                    handler.put(column_family_id, key, value)?;
                    found += 1;
                }
                Record::Delete {
                    column_family_id,
                    key,
                } => {
                    handler.delete(column_family_id, key)?;
                    found += 1;
                }
                Record::SingleDelete {
                    column_family_id,
                    key,
                } => {
                    handler.single_delete(column_family_id, key)?;
                    found += 1;
                }
                Record::Merge {
                    column_family_id,
                    key,
                    value,
                } => {
                    handler.merge(column_family_id, key, value)?;
                    found += 1;
                }
                Record::LogData { blob } => handler.log_data(blob),
            }
        }

        if found != self.count() {
            return Err(BatchError::Corruption("WriteBatch has wrong count"));
        }
        Ok(())
    }
}
