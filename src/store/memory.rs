//! In-memory record store used by the publish protocol tests.

use super::RecordStore;
use crate::error::StoreError;
use crate::models::{NewRecord, OwnerId, RecordId, RecordUpdate, RemoteRecord, RunToken};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct State {
    runs: HashMap<String, OwnerId>,
    records: Vec<RemoteRecord>,
    next_id: RecordId,
}

/// Store backed by a `Mutex`, counting every write.
#[derive(Default)]
pub struct MemoryRecordStore {
    state: Mutex<State>,
    creates: AtomicUsize,
    updates: AtomicUsize,
}

impl MemoryRecordStore {
    /// A store that knows one run.
    pub fn with_run(run_token: &RunToken, owner: OwnerId) -> Self {
        let store = Self::default();
        store
            .state
            .lock()
            .unwrap()
            .runs
            .insert(run_token.0.clone(), owner);
        store
    }

    /// Seed a record without counting it as a write.
    pub fn insert_record(&self, owner: OwnerId, key: &str, value: Value, record_type: &str) {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.records.push(RemoteRecord {
            id,
            owner,
            key: key.to_string(),
            value,
            record_type: record_type.to_string(),
            created: Some(Utc::now()),
            updated: None,
        });
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_run_owner(&self, run_token: &RunToken) -> Result<OwnerId, StoreError> {
        self.state
            .lock()
            .unwrap()
            .runs
            .get(&run_token.0)
            .copied()
            .ok_or_else(|| StoreError::RunNotFound(run_token.0.clone()))
    }

    async fn find_record(
        &self,
        owner: OwnerId,
        key: &str,
    ) -> Result<Option<RemoteRecord>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .records
            .iter()
            .find(|r| r.owner == owner && r.key == key)
            .cloned())
    }

    async fn create_record(&self, record: &NewRecord) -> Result<RemoteRecord, StoreError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.insert_record(record.owner, &record.key, record.value.clone(), &record.record_type);
        let state = self.state.lock().unwrap();
        state
            .records
            .last()
            .cloned()
            .ok_or_else(|| StoreError::Protocol {
                operation: "create record",
                message: "record vanished".to_string(),
            })
    }

    async fn update_record(
        &self,
        id: RecordId,
        update: &RecordUpdate,
    ) -> Result<RemoteRecord, StoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let record = state
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::Status {
                operation: "update record",
                status: 404,
                body: format!("record {} not found", id),
            })?;
        record.key = update.key.clone();
        record.value = update.value.clone();
        record.record_type = update.record_type.clone();
        record.updated = Some(Utc::now());
        Ok(record.clone())
    }
}
