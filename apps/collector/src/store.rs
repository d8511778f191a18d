use chrono::Local;
use greenhouse_control::uplink::{Fields, UploadMessage};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRecord {
    pub path: String,
    pub fields: Fields,
    pub received_at: i64,
}

/// Records keyed by path. Same path means same record: last write wins.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: HashMap<String, StoredRecord>,
    latest: Option<String>,
}

impl RecordStore {
    /// Returns true when an existing record was replaced.
    pub fn insert(&mut self, msg: UploadMessage) -> bool {
        let record = StoredRecord {
            path: msg.path.clone(),
            fields: msg.fields,
            received_at: Local::now().timestamp(),
        };
        self.latest = Some(msg.path.clone());
        self.records.insert(msg.path, record).is_some()
    }

    pub fn all(&self) -> Vec<StoredRecord> {
        let mut out: Vec<_> = self.records.values().cloned().collect();
        out.sort_by(|a, b| {
            a.received_at
                .cmp(&b.received_at)
                .then_with(|| a.path.cmp(&b.path))
        });
        out
    }

    pub fn latest(&self) -> Option<&StoredRecord> {
        self.latest.as_ref().and_then(|p| self.records.get(p))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
