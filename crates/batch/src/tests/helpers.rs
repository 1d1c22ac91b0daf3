use crate::{Handler, Result, WriteBatch};

/// A recorded handler callback, one per dispatched record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Put {
        cf: u32,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        cf: u32,
        key: Vec<u8>,
    },
    SingleDelete {
        cf: u32,
        key: Vec<u8>,
    },
    Merge {
        cf: u32,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    LogData {
        blob: Vec<u8>,
    },
}

pub fn ev_put(cf: u32, key: &[u8], value: &[u8]) -> Event {
    Event::Put {
        cf,
        key: key.to_vec(),
        value: value.to_vec(),
    }
}

pub fn ev_delete(cf: u32, key: &[u8]) -> Event {
    Event::Delete {
        cf,
        key: key.to_vec(),
    }
}

pub fn ev_single_delete(cf: u32, key: &[u8]) -> Event {
    Event::SingleDelete {
        cf,
        key: key.to_vec(),
    }
}

pub fn ev_merge(cf: u32, key: &[u8], value: &[u8]) -> Event {
    Event::Merge {
        cf,
        key: key.to_vec(),
        value: value.to_vec(),
    }
}

pub fn ev_log_data(blob: &[u8]) -> Event {
    Event::LogData {
        blob: blob.to_vec(),
    }
}

/// Collects every dispatched record. With `stop_after` set, the handler
/// stops consenting once that many events have been recorded.
#[derive(Default)]
pub struct CollectingHandler {
    pub events: Vec<Event>,
    pub stop_after: Option<usize>,
}

impl CollectingHandler {
    pub fn stopping_after(n: usize) -> Self {
        CollectingHandler {
            events: Vec::new(),
            stop_after: Some(n),
        }
    }
}

impl Handler for CollectingHandler {
    fn put(&mut self, column_family_id: u32, key: &[u8], value: &[u8]) -> Result<()> {
        self.events.push(ev_put(column_family_id, key, value));
        Ok(())
    }

    fn delete(&mut self, column_family_id: u32, key: &[u8]) -> Result<()> {
        self.events.push(ev_delete(column_family_id, key));
        Ok(())
    }

    fn single_delete(&mut self, column_family_id: u32, key: &[u8]) -> Result<()> {
        self.events.push(ev_single_delete(column_family_id, key));
        Ok(())
    }

    fn merge(&mut self, column_family_id: u32, key: &[u8], value: &[u8]) -> Result<()> {
        self.events.push(ev_merge(column_family_id, key, value));
        Ok(())
    }

    fn log_data(&mut self, blob: &[u8]) {
        self.events.push(ev_log_data(blob));
    }

    fn should_continue(&self) -> bool {
        self.stop_after.map_or(true, |n| self.events.len() < n)
    }
}

/// Iterates `batch` and returns every dispatched event, panicking on any
/// decode failure.
pub fn events_of(batch: &WriteBatch) -> Vec<Event> {
    let mut handler = CollectingHandler::default();
    batch.iterate(&mut handler).unwrap();
    handler.events
}
