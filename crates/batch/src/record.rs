//! Record tags and the single-record decoder.
//!
//! Tag values are part of the on-wire format and are shared with the
//! engine's memtable and log encodings; they must never be renumbered.

use crate::{BatchError, Result};
use codec::{get_length_prefixed, get_varint32, CodecError};

/// The tag byte identifying each record variant.
///
/// Default-column-family variants implicitly carry cf-id 0; the
/// `ColumnFamily*` variants are followed by an explicit varint32 cf-id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordKind {
    Deletion = 0,
    Value = 1,
    Merge = 2,
    LogData = 3,
    ColumnFamilyDeletion = 4,
    ColumnFamilyValue = 5,
    ColumnFamilyMerge = 6,
    SingleDeletion = 7,
    ColumnFamilySingleDeletion = 8,
}

impl RecordKind {
    /// Maps a wire tag byte back to its kind. Unknown tags return `None`.
    pub fn from_u8(tag: u8) -> Option<RecordKind> {
        match tag {
            0 => Some(RecordKind::Deletion),
            1 => Some(RecordKind::Value),
            2 => Some(RecordKind::Merge),
            3 => Some(RecordKind::LogData),
            4 => Some(RecordKind::ColumnFamilyDeletion),
            5 => Some(RecordKind::ColumnFamilyValue),
            6 => Some(RecordKind::ColumnFamilyMerge),
            7 => Some(RecordKind::SingleDeletion),
            8 => Some(RecordKind::ColumnFamilySingleDeletion),
            _ => None,
        }
    }
}

/// One decoded record, borrowing key/value bytes from the batch buffer.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Record<'a> {
    Put {
        column_family_id: u32,
        key: &'a [u8],
        value: &'a [u8],
    },
    Delete {
        column_family_id: u32,
        key: &'a [u8],
    },
    SingleDelete {
        column_family_id: u32,
        key: &'a [u8],
    },
    Merge {
        column_family_id: u32,
        key: &'a [u8],
        value: &'a [u8],
    },
    LogData {
        blob: &'a [u8],
    },
}

fn bad(msg: &'static str) -> impl Fn(CodecError) -> BatchError {
    move |_| BatchError::Corruption(msg)
}

/// Decodes exactly one record from the front of `input`, advancing the
/// cursor past it. `input` must be non-empty.
///
/// Corruption messages reflect the tag family, not the codec detail, so a
/// truncated varint inside a Put reports the same way as a bad length
/// prefix.
pub(crate) fn read_record<'a>(input: &mut &'a [u8]) -> Result<Record<'a>> {
    debug_assert!(!input.is_empty());
    let tag = input[0];
    *input = &input[1..];

    let kind = RecordKind::from_u8(tag)
        .ok_or(BatchError::Corruption("unknown WriteBatch tag"))?;

    match kind {
        RecordKind::Value | RecordKind::ColumnFamilyValue => {
            let column_family_id = if kind == RecordKind::ColumnFamilyValue {
                get_varint32(input).map_err(bad("bad WriteBatch Put"))?
            } else {
                0
            };
            let key = get_length_prefixed(input).map_err(bad("bad WriteBatch Put"))?;
            let value = get_length_prefixed(input).map_err(bad("bad WriteBatch Put"))?;
            Ok(Record::Put {
                column_family_id,
                key,
                value,
            })
        }
        RecordKind::Deletion | RecordKind::ColumnFamilyDeletion => {
            let column_family_id = if kind == RecordKind::ColumnFamilyDeletion {
                get_varint32(input).map_err(bad("bad WriteBatch Delete"))?
            } else {
                0
            };
            let key = get_length_prefixed(input).map_err(bad("bad WriteBatch Delete"))?;
            Ok(Record::Delete {
                column_family_id,
                key,
            })
        }
        RecordKind::SingleDeletion | RecordKind::ColumnFamilySingleDeletion => {
            let column_family_id = if kind == RecordKind::ColumnFamilySingleDeletion {
                get_varint32(input).map_err(bad("bad WriteBatch Delete"))?
            } else {
                0
            };
            let key = get_length_prefixed(input).map_err(bad("bad WriteBatch Delete"))?;
            Ok(Record::SingleDelete {
                column_family_id,
                key,
            })
        }
        RecordKind::Merge | RecordKind::ColumnFamilyMerge => {
            let column_family_id = if kind == RecordKind::ColumnFamilyMerge {
                get_varint32(input).map_err(bad("bad WriteBatch Merge"))?
            } else {
                0
            };
            let key = get_length_prefixed(input).map_err(bad("bad WriteBatch Merge"))?;
            let value = get_length_prefixed(input).map_err(bad("bad WriteBatch Merge"))?;
            Ok(Record::Merge {
                column_family_id,
                key,
                value,
            })
        }
        RecordKind::LogData => {
            let blob = get_length_prefixed(input).map_err(bad("bad WriteBatch Blob"))?;
            Ok(Record::LogData { blob })
        }
    }
}
