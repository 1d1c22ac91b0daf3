//! # Batch — atomic write batches
//!
//! The unit of atomic mutation accepted by the engine. A [`WriteBatch`] is
//! an ordered, self-describing, binary-encoded sequence of key operations
//! (Put, Delete, SingleDelete, Merge, plus opaque LogData annotations)
//! partitioned across column families. Every update the engine accepts —
//! direct call or write-ahead-log replay — is materialized as one of these
//! before it touches a memtable.
//!
//! ## Binary layout
//!
//! ```text
//! [sequence: u64 LE][count: u32 LE][record ...]
//! ```
//!
//! Record (tag byte first, see [`RecordKind`] for the tag table):
//!
//! ```text
//! Value                      | keyLP valueLP
//! Deletion                   | keyLP
//! SingleDeletion             | keyLP
//! Merge                      | keyLP valueLP
//! ColumnFamilyValue          | cfid:varint32 keyLP valueLP
//! ColumnFamilyDeletion       | cfid:varint32 keyLP
//! ColumnFamilySingleDeletion | cfid:varint32 keyLP
//! ColumnFamilyMerge          | cfid:varint32 keyLP valueLP
//! LogData                    | blobLP
//! ```
//!
//! `keyLP`/`valueLP`/`blobLP` are varint32-length-prefixed byte strings.
//! `count` covers user records only; LogData records are interleaved but
//! never counted.
//!
//! ## Example
//!
//! ```rust
//! use batch::WriteBatch;
//!
//! let mut b = WriteBatch::new();
//! b.put(0, b"name", b"alice");
//! b.delete(0, b"stale");
//! assert_eq!(b.count(), 2);
//! assert!(b.has_put() && b.has_delete());
//! ```
//!
//! Decoding is handler-driven: implement [`Handler`] and call
//! [`WriteBatch::iterate`]. The built-in memtable applier lives in the
//! `apply` crate.

mod iterate;
mod record;

pub use iterate::Handler;
pub use record::RecordKind;

use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

/// Size of the fixed header: 8-byte sequence number + 4-byte record count.
pub const HEADER_SIZE: usize = 12;

/// Result type alias for batch operations.
pub type Result<T> = std::result::Result<T, BatchError>;

/// Errors surfaced by batch decoding, validation, and save-point handling.
///
/// Handler implementations (such as the memtable applier) reuse this type so
/// a failed apply surfaces to the caller unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// Malformed framing: truncated header, bad length prefix, unknown tag,
    /// or a record count that does not match the payload.
    #[error("corruption: {0}")]
    Corruption(&'static str),

    /// The caller referenced something that does not exist, e.g. an unknown
    /// column family.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Rollback was requested with no save point on the stack.
    #[error("not found")]
    NotFound,
}

/// Cached classification of the record kinds present in a batch.
///
/// `DEFERRED` marks a buffer adopted from raw bytes whose contents have not
/// been scanned yet; the first content query replaces it with the exact
/// bitmask. The flags are advisory and never serialized.
pub(crate) mod content_flags {
    pub const DEFERRED: u32 = 1;
    pub const HAS_PUT: u32 = 2;
    pub const HAS_DELETE: u32 = 4;
    pub const HAS_SINGLE_DELETE: u32 = 8;
    pub const HAS_MERGE: u32 = 16;
}

/// Snapshot of the batch state taken by [`WriteBatch::set_save_point`].
#[derive(Debug, Clone)]
struct SavePoint {
    size: usize,
    count: u32,
    content_flags: u32,
}

/// An ordered, append-only batch of key operations with a bit-exact binary
/// representation (see the module docs for the layout).
///
/// The buffer is owned exclusively; clones are deep copies. Appends only
/// grow the buffer — existing bytes are never rewritten except for the
/// in-place header updates of `sequence` and `count`.
#[derive(Debug)]
pub struct WriteBatch {
    /// The wire representation: 12-byte header + records.
    rep: Vec<u8>,
    /// See [`content_flags`]. Relaxed atomics so content queries can race
    /// with flag updates from another thread; a stale read at worst forces
    /// a recompute.
    flags: AtomicU32,
    /// Save-point stack, allocated on first use.
    save_points: Option<Vec<SavePoint>>,
}

impl WriteBatch {
    /// Creates an empty batch (header only, zeroed).
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty batch with at least `reserved_bytes` of buffer
    /// capacity pre-allocated.
    pub fn with_capacity(reserved_bytes: usize) -> Self {
        let mut rep = Vec::with_capacity(reserved_bytes.max(HEADER_SIZE));
        rep.resize(HEADER_SIZE, 0);
        WriteBatch {
            rep,
            flags: AtomicU32::new(0),
            save_points: None,
        }
    }

    /// Adopts an externally produced wire representation verbatim.
    ///
    /// The bytes are not validated here — [`iterate`](Self::iterate) is the
    /// validating entry point — and the content flags start out deferred.
    pub fn from_bytes(rep: Vec<u8>) -> Self {
        WriteBatch {
            rep,
            flags: AtomicU32::new(content_flags::DEFERRED),
            save_points: None,
        }
    }

    /// Resets the batch to the empty state: header-only buffer with zeroed
    /// sequence and count, cleared content flags, empty save-point stack.
    /// Buffer capacity is retained.
    pub fn clear(&mut self) {
        self.rep.clear();
        self.rep.resize(HEADER_SIZE, 0);
        self.flags.store(0, Ordering::Relaxed);
        if let Some(stack) = &mut self.save_points {
            stack.clear();
        }
    }

    // -------------------- Header accessors --------------------
    //
    // These index the first 12 bytes directly and therefore require a
    // buffer holding at least the header; `new`/`with_capacity`/`clear`
    // guarantee that, `from_bytes`/`set_contents` leave it to the caller.

    /// The sequence number assigned to the first record (header offset 0).
    pub fn sequence(&self) -> u64 {
        codec::decode_fixed64(&self.rep[..8])
    }

    /// Overwrites the header sequence number in place.
    pub fn set_sequence(&mut self, sequence: u64) {
        codec::encode_fixed64(&mut self.rep[..8], sequence);
    }

    /// The number of user records in the batch (header offset 8). LogData
    /// records are not counted.
    pub fn count(&self) -> u32 {
        codec::decode_fixed32(&self.rep[8..HEADER_SIZE])
    }

    /// Overwrites the header record count in place.
    pub fn set_count(&mut self, count: u32) {
        codec::encode_fixed32(&mut self.rep[8..HEADER_SIZE], count);
    }

    /// The full wire representation, header included.
    pub fn data(&self) -> &[u8] {
        &self.rep
    }

    /// Byte length of the wire representation.
    pub fn data_size(&self) -> usize {
        self.rep.len()
    }

    /// True when the batch holds no records and no log data.
    pub fn is_empty(&self) -> bool {
        self.rep.len() <= HEADER_SIZE
    }

    /// Consumes the batch, returning the owned wire representation.
    pub fn into_bytes(self) -> Vec<u8> {
        self.rep
    }

    /// Replaces the whole buffer with externally produced bytes and defers
    /// content classification, like [`from_bytes`](Self::from_bytes) on an
    /// existing batch.
    pub fn set_contents(&mut self, rep: Vec<u8>) {
        self.rep = rep;
        self.flags
            .store(content_flags::DEFERRED, Ordering::Relaxed);
    }

    // -------------------- Typed appends --------------------

    /// Bumps the header count and appends the tag (plus cf-id for
    /// non-default column families) for one user record.
    fn append_record_prefix(
        &mut self,
        column_family_id: u32,
        default_kind: RecordKind,
        cf_kind: RecordKind,
    ) {
        self.set_count(self.count() + 1);
        if column_family_id == 0 {
            self.rep.push(default_kind as u8);
        } else {
            self.rep.push(cf_kind as u8);
            codec::put_varint32(&mut self.rep, column_family_id);
        }
    }

    fn or_flags(&self, bit: u32) {
        let current = self.flags.load(Ordering::Relaxed);
        self.flags.store(current | bit, Ordering::Relaxed);
    }

    /// Appends a Put record for `key` -> `value` in the given column family
    /// (0 = default).
    pub fn put(&mut self, column_family_id: u32, key: &[u8], value: &[u8]) {
        self.append_record_prefix(
            column_family_id,
            RecordKind::Value,
            RecordKind::ColumnFamilyValue,
        );
        codec::put_length_prefixed(&mut self.rep, key);
        codec::put_length_prefixed(&mut self.rep, value);
        self.or_flags(content_flags::HAS_PUT);
    }

    /// Like [`put`](Self::put), but key and value are supplied as chunk
    /// lists that are concatenated into the encoding without an
    /// intermediate allocation.
    pub fn put_parts(&mut self, column_family_id: u32, key: &[&[u8]], value: &[&[u8]]) {
        self.append_record_prefix(
            column_family_id,
            RecordKind::Value,
            RecordKind::ColumnFamilyValue,
        );
        codec::put_length_prefixed_parts(&mut self.rep, key);
        codec::put_length_prefixed_parts(&mut self.rep, value);
        self.or_flags(content_flags::HAS_PUT);
    }

    /// Appends a Delete record for `key` in the given column family.
    pub fn delete(&mut self, column_family_id: u32, key: &[u8]) {
        self.append_record_prefix(
            column_family_id,
            RecordKind::Deletion,
            RecordKind::ColumnFamilyDeletion,
        );
        codec::put_length_prefixed(&mut self.rep, key);
        self.or_flags(content_flags::HAS_DELETE);
    }

    /// Chunked variant of [`delete`](Self::delete).
    pub fn delete_parts(&mut self, column_family_id: u32, key: &[&[u8]]) {
        self.append_record_prefix(
            column_family_id,
            RecordKind::Deletion,
            RecordKind::ColumnFamilyDeletion,
        );
        codec::put_length_prefixed_parts(&mut self.rep, key);
        self.or_flags(content_flags::HAS_DELETE);
    }

    /// Appends a SingleDelete record for `key` in the given column family.
    ///
    /// A single-delete removes only the most recent version of the key; the
    /// distinction matters to the engine's compaction, not to the batch.
    pub fn single_delete(&mut self, column_family_id: u32, key: &[u8]) {
        self.append_record_prefix(
            column_family_id,
            RecordKind::SingleDeletion,
            RecordKind::ColumnFamilySingleDeletion,
        );
        codec::put_length_prefixed(&mut self.rep, key);
        self.or_flags(content_flags::HAS_SINGLE_DELETE);
    }

    /// Chunked variant of [`single_delete`](Self::single_delete).
    pub fn single_delete_parts(&mut self, column_family_id: u32, key: &[&[u8]]) {
        self.append_record_prefix(
            column_family_id,
            RecordKind::SingleDeletion,
            RecordKind::ColumnFamilySingleDeletion,
        );
        codec::put_length_prefixed_parts(&mut self.rep, key);
        self.or_flags(content_flags::HAS_SINGLE_DELETE);
    }

    /// Appends a Merge record: `value` is an operand for the column
    /// family's merge operator, applied against the current value of `key`.
    pub fn merge(&mut self, column_family_id: u32, key: &[u8], value: &[u8]) {
        self.append_record_prefix(
            column_family_id,
            RecordKind::Merge,
            RecordKind::ColumnFamilyMerge,
        );
        codec::put_length_prefixed(&mut self.rep, key);
        codec::put_length_prefixed(&mut self.rep, value);
        self.or_flags(content_flags::HAS_MERGE);
    }

    /// Chunked variant of [`merge`](Self::merge).
    pub fn merge_parts(&mut self, column_family_id: u32, key: &[&[u8]], value: &[&[u8]]) {
        self.append_record_prefix(
            column_family_id,
            RecordKind::Merge,
            RecordKind::ColumnFamilyMerge,
        );
        codec::put_length_prefixed_parts(&mut self.rep, key);
        codec::put_length_prefixed_parts(&mut self.rep, value);
        self.or_flags(content_flags::HAS_MERGE);
    }

    /// Appends an opaque LogData annotation. It travels with the batch (and
    /// through the write-ahead log) but is not counted as a user record and
    /// is never materialized in a memtable.
    pub fn put_log_data(&mut self, blob: &[u8]) {
        self.rep.push(RecordKind::LogData as u8);
        codec::put_length_prefixed(&mut self.rep, blob);
    }

    // -------------------- Content queries --------------------

    /// Returns the exact content bitmask, scanning the buffer once if the
    /// cached value is still deferred. Conceptually read-only; the cache
    /// update goes through the atomic so `&self` suffices.
    pub(crate) fn compute_content_flags(&self) -> u32 {
        let cached = self.flags.load(Ordering::Relaxed);
        if cached & content_flags::DEFERRED == 0 {
            return cached;
        }
        let mut classifier = iterate::ContentClassifier::default();
        // A corrupt buffer terminates the scan early; the bits gathered up
        // to that point still replace the deferred marker, the same way the
        // corruption itself will surface on the next full iterate.
        let _ = self.iterate(&mut classifier);
        self.flags.store(classifier.flags, Ordering::Relaxed);
        classifier.flags
    }

    /// True when the batch contains at least one Put record.
    pub fn has_put(&self) -> bool {
        self.compute_content_flags() & content_flags::HAS_PUT != 0
    }

    /// True when the batch contains at least one Delete record.
    pub fn has_delete(&self) -> bool {
        self.compute_content_flags() & content_flags::HAS_DELETE != 0
    }

    /// True when the batch contains at least one SingleDelete record.
    pub fn has_single_delete(&self) -> bool {
        self.compute_content_flags() & content_flags::HAS_SINGLE_DELETE != 0
    }

    /// True when the batch contains at least one Merge record.
    pub fn has_merge(&self) -> bool {
        self.compute_content_flags() & content_flags::HAS_MERGE != 0
    }

    // -------------------- Save points --------------------

    /// Records the current batch state. A later
    /// [`rollback_to_save_point`](Self::rollback_to_save_point) discards
    /// everything appended since. Save points nest arbitrarily deep.
    pub fn set_save_point(&mut self) {
        let save_point = SavePoint {
            size: self.rep.len(),
            count: self.count(),
            content_flags: self.flags.load(Ordering::Relaxed),
        };
        self.save_points
            .get_or_insert_with(Vec::new)
            .push(save_point);
    }

    /// Pops the most recent save point and truncates the batch back to it,
    /// restoring the recorded count and content flags. The header sequence
    /// number is left untouched.
    ///
    /// Returns [`BatchError::NotFound`] when no save point is recorded.
    pub fn rollback_to_save_point(&mut self) -> Result<()> {
        let save_point = self
            .save_points
            .as_mut()
            .and_then(|stack| stack.pop())
            .ok_or(BatchError::NotFound)?;

        debug_assert!(save_point.size <= self.rep.len());
        debug_assert!(save_point.count <= self.count());

        if save_point.size == self.rep.len() {
            // Nothing was appended since the save point.
        } else if save_point.size == 0 {
            // Rollback-everything sentinel.
            self.clear();
        } else {
            self.rep.truncate(save_point.size);
            self.set_count(save_point.count);
            self.flags.store(save_point.content_flags, Ordering::Relaxed);
        }
        Ok(())
    }

    // -------------------- Batch concatenation --------------------

    /// Appends `src`'s records onto `self`: count is added into the header,
    /// `src`'s payload (everything past its header) is spliced onto the
    /// buffer, and `src`'s content flags are OR-ed in.
    ///
    /// `src` must hold at least a full header.
    pub fn append_batch(&mut self, src: &WriteBatch) {
        debug_assert!(src.rep.len() >= HEADER_SIZE);
        self.set_count(self.count() + src.count());
        self.rep.extend_from_slice(&src.rep[HEADER_SIZE..]);
        self.or_flags(src.flags.load(Ordering::Relaxed));
    }

    /// Byte size of the concatenation of two batches of the given sizes:
    /// the two share one header, except that a zero-sized (absent) operand
    /// contributes nothing.
    pub fn appended_byte_size(left: usize, right: usize) -> usize {
        if left == 0 || right == 0 {
            left + right
        } else {
            left + right - HEADER_SIZE
        }
    }
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for WriteBatch {
    /// Deep copy: buffer and save-point stack are both duplicated, so
    /// rollbacks on the clone never affect the original.
    fn clone(&self) -> Self {
        WriteBatch {
            rep: self.rep.clone(),
            flags: AtomicU32::new(self.flags.load(Ordering::Relaxed)),
            save_points: self.save_points.clone(),
        }
    }
}

#[cfg(test)]
mod tests;
