//! In-memory store for tests and servers started without a storage path.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use scribe_ot::{DocSnapshot, Update};

use super::{DurableStore, StoreError};

#[derive(Default)]
struct MemDoc {
    snapshot: Option<DocSnapshot>,
    log: BTreeMap<u64, Update>,
    history: BTreeMap<u64, Update>,
}

/// A [`DurableStore`] that lives only as long as the process.
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<Uuid, MemDoc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of logged updates for `doc_id`.
    pub fn log_len(&self, doc_id: Uuid) -> usize {
        self.docs.read().get(&doc_id).map_or(0, |d| d.log.len())
    }
}

impl DurableStore for MemoryStore {
    fn load(&self, doc_id: Uuid) -> Result<Option<DocSnapshot>, StoreError> {
        Ok(self.docs.read().get(&doc_id).and_then(|d| d.snapshot.clone()))
    }

    fn save(&self, snapshot: &DocSnapshot) -> Result<(), StoreError> {
        self.docs.write().entry(snapshot.doc_id).or_default().snapshot = Some(snapshot.clone());
        Ok(())
    }

    fn append_to_log(&self, update: &Update) -> Result<(), StoreError> {
        self.docs
            .write()
            .entry(update.doc_id)
            .or_default()
            .log
            .insert(update.version, update.clone());
        Ok(())
    }

    fn read_log(&self, doc_id: Uuid, from: u64, to: u64) -> Result<Vec<Update>, StoreError> {
        if from >= to {
            return Ok(Vec::new());
        }
        let docs = self.docs.read();
        Ok(docs
            .get(&doc_id)
            .map(|d| d.log.range(from..to).map(|(_, u)| u.clone()).collect())
            .unwrap_or_default())
    }

    fn append_history(&self, doc_id: Uuid, updates: &[Update], replace_last: bool) -> Result<(), StoreError> {
        let mut docs = self.docs.write();
        let doc = docs.entry(doc_id).or_default();
        if replace_last {
            doc.history.pop_last();
        }
        for update in updates {
            doc.history.insert(update.version, update.clone());
        }
        Ok(())
    }

    fn read_history(&self, doc_id: Uuid) -> Result<Vec<Update>, StoreError> {
        let docs = self.docs.read();
        Ok(docs
            .get(&doc_id)
            .map(|d| d.history.values().cloned().collect())
            .unwrap_or_default())
    }

    fn last_history_entry(&self, doc_id: Uuid) -> Result<Option<Update>, StoreError> {
        let docs = self.docs.read();
        Ok(docs
            .get(&doc_id)
            .and_then(|d| d.history.last_key_value().map(|(_, u)| u.clone())))
    }

    fn list_documents(&self) -> Result<Vec<Uuid>, StoreError> {
        Ok(self.docs.read().keys().copied().collect())
    }

    fn delete_document(&self, doc_id: Uuid) -> Result<(), StoreError> {
        self.docs.write().remove(&doc_id);
        Ok(())
    }
}
