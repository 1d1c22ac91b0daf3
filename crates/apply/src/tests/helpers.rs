//! Mock collaborators for exercising the applier.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use batch::RecordKind;

use crate::{
    ColumnFamilyMemtables, Db, FlushScheduler, InplaceCallback, Memtable, MemtableOptions,
    MergeOperator, ReadOptions, StatsSink, Ticker, UpdateStatus,
};

// -------------------- Memtable --------------------

/// One `Memtable::add` call as observed by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedEntry {
    pub sequence: u64,
    pub kind: RecordKind,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub concurrent: bool,
}

pub fn entry(sequence: u64, kind: RecordKind, key: &[u8], value: &[u8]) -> AddedEntry {
    AddedEntry {
        sequence,
        kind,
        key: key.to_vec(),
        value: value.to_vec(),
        concurrent: false,
    }
}

/// Map-backed memtable that records every applier interaction.
#[derive(Default)]
pub struct MockMemtable {
    pub options: MemtableOptions,
    /// Every `add` in call order.
    pub log: Vec<AddedEntry>,
    /// Entries visible to `update`/`update_callback`.
    pub resident: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Every `update` in call order.
    pub updates: Vec<(u64, Vec<u8>, Vec<u8>)>,
    /// Fixed answer for `count_successive_merges`.
    pub successive_merges: usize,
    pub flush_due: bool,
    pub flush_latched: bool,
}

impl Memtable for MockMemtable {
    fn add(&mut self, sequence: u64, kind: RecordKind, key: &[u8], value: &[u8], concurrent: bool) {
        self.log.push(AddedEntry {
            sequence,
            kind,
            key: key.to_vec(),
            value: value.to_vec(),
            concurrent,
        });
    }

    fn update(&mut self, sequence: u64, key: &[u8], value: &[u8]) {
        self.resident.insert(key.to_vec(), value.to_vec());
        self.updates.push((sequence, key.to_vec(), value.to_vec()));
    }

    fn update_callback(&mut self, sequence: u64, key: &[u8], value: &[u8]) -> bool {
        if self.resident.contains_key(key) {
            self.update(sequence, key, value);
            true
        } else {
            false
        }
    }

    fn count_successive_merges(&self, _key: &[u8], _sequence: u64) -> usize {
        self.successive_merges
    }

    fn should_schedule_flush(&self) -> bool {
        self.flush_due
    }

    fn mark_flush_scheduled(&mut self) -> bool {
        if self.flush_latched {
            false
        } else {
            self.flush_latched = true;
            true
        }
    }

    fn options(&self) -> MemtableOptions {
        self.options.clone()
    }
}

// -------------------- Column-family registry --------------------

#[derive(Default)]
pub struct MockFamily {
    pub memtable: MockMemtable,
    pub log_number: u64,
}

/// Registry over a fixed set of families with a positionable cursor.
pub struct MockColumnFamilyMemtables {
    pub families: BTreeMap<u32, MockFamily>,
    pub current: Option<u32>,
    /// When false, `current_handle` answers `None`, forcing the applier
    /// onto the database's default-family fallback.
    pub expose_handles: bool,
}

pub fn families(ids: &[u32]) -> MockColumnFamilyMemtables {
    let mut map = BTreeMap::new();
    for &id in ids {
        map.insert(id, MockFamily::default());
    }
    MockColumnFamilyMemtables {
        families: map,
        current: None,
        expose_handles: true,
    }
}

impl MockColumnFamilyMemtables {
    pub fn family_mut(&mut self, id: u32) -> &mut MockFamily {
        self.families.get_mut(&id).expect("family exists")
    }

    pub fn memtable_mut(&mut self, id: u32) -> &mut MockMemtable {
        &mut self.family_mut(id).memtable
    }

    pub fn added(&self, id: u32) -> Vec<AddedEntry> {
        self.families[&id].memtable.log.clone()
    }
}

impl ColumnFamilyMemtables for MockColumnFamilyMemtables {
    fn seek(&mut self, column_family_id: u32) -> bool {
        if self.families.contains_key(&column_family_id) {
            self.current = Some(column_family_id);
            true
        } else {
            false
        }
    }

    fn log_number(&self) -> u64 {
        self.current
            .map(|id| self.families[&id].log_number)
            .unwrap_or(0)
    }

    fn current_handle(&self) -> Option<u32> {
        if self.expose_handles {
            self.current
        } else {
            None
        }
    }

    fn memtable(&mut self) -> &mut dyn Memtable {
        let id = self.current.expect("memtable() before successful seek");
        &mut self.families.get_mut(&id).expect("family exists").memtable
    }
}

// -------------------- Database --------------------

/// Point-read mock with an exact key-may-exist answer.
#[derive(Default)]
pub struct MockDb {
    pub values: BTreeMap<(u32, Vec<u8>), Vec<u8>>,
}

impl MockDb {
    pub fn with(entries: &[(u32, &[u8], &[u8])]) -> Self {
        let mut db = MockDb::default();
        for &(cf, key, value) in entries {
            db.values.insert((cf, key.to_vec()), value.to_vec());
        }
        db
    }
}

impl Db for MockDb {
    fn get(&self, _options: &ReadOptions, column_family_id: u32, key: &[u8]) -> Option<Vec<u8>> {
        self.values.get(&(column_family_id, key.to_vec())).cloned()
    }

    fn key_may_exist(&self, options: &ReadOptions, column_family_id: u32, key: &[u8]) -> bool {
        self.get(options, column_family_id, key).is_some()
    }

    fn default_column_family(&self) -> u32 {
        0
    }
}

// -------------------- Scheduler and statistics --------------------

#[derive(Default)]
pub struct RecordingScheduler {
    pub scheduled: RefCell<Vec<u32>>,
}

impl FlushScheduler for RecordingScheduler {
    fn schedule_flush(&self, column_family_id: u32) {
        self.scheduled.borrow_mut().push(column_family_id);
    }
}

#[derive(Default)]
pub struct CountingStats {
    pub ticks: Mutex<HashMap<Ticker, u64>>,
}

impl CountingStats {
    pub fn count(&self, ticker: Ticker) -> u64 {
        *self.ticks.lock().unwrap().get(&ticker).unwrap_or(&0)
    }

    pub fn has(&self, ticker: Ticker) -> bool {
        self.ticks.lock().unwrap().contains_key(&ticker)
    }
}

impl StatsSink for CountingStats {
    fn record_tick(&self, ticker: Ticker, value: u64) {
        *self.ticks.lock().unwrap().entry(ticker).or_insert(0) += value;
    }
}

// -------------------- Merge operators --------------------

/// Joins the base value and operands with commas.
pub struct AppendMergeOperator;

impl MergeOperator for AppendMergeOperator {
    fn full_merge(
        &self,
        _key: &[u8],
        existing: Option<&[u8]>,
        operands: &[&[u8]],
    ) -> Option<Vec<u8>> {
        let mut out = existing.map(<[u8]>::to_vec).unwrap_or_default();
        for operand in operands {
            if !out.is_empty() {
                out.push(b',');
            }
            out.extend_from_slice(operand);
        }
        Some(out)
    }
}

pub struct FailingMergeOperator;

impl MergeOperator for FailingMergeOperator {
    fn full_merge(
        &self,
        _key: &[u8],
        _existing: Option<&[u8]>,
        _operands: &[&[u8]],
    ) -> Option<Vec<u8>> {
        None
    }
}

// -------------------- In-place callbacks --------------------

/// Produces `existing + delta` as a fresh buffer.
pub struct ConcatCallback;

impl InplaceCallback for ConcatCallback {
    fn update(&self, existing: Option<&mut Vec<u8>>, delta: &[u8]) -> UpdateStatus {
        let mut merged = existing.map(|buf| buf.clone()).unwrap_or_default();
        merged.extend_from_slice(delta);
        UpdateStatus::Updated(merged)
    }
}

/// Shortens the existing buffer to its first byte, in place.
pub struct KeepFirstByteCallback;

impl InplaceCallback for KeepFirstByteCallback {
    fn update(&self, existing: Option<&mut Vec<u8>>, _delta: &[u8]) -> UpdateStatus {
        match existing {
            Some(buf) => {
                buf.truncate(1);
                UpdateStatus::UpdatedInplace
            }
            None => UpdateStatus::NotUpdated,
        }
    }
}

pub struct RejectingCallback;

impl InplaceCallback for RejectingCallback {
    fn update(&self, _existing: Option<&mut Vec<u8>>, _delta: &[u8]) -> UpdateStatus {
        UpdateStatus::NotUpdated
    }
}
