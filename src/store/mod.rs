//! Remote record store and the idempotent publish protocol.
//!
//! [`RecordSync`] resolves the run's owner, then creates the results
//! record or updates it in place, and only when the stored document
//! differs from the one being published. Publishing the same tree twice
//! therefore never writes twice and never creates a second record for the
//! same `(owner, key)`.

pub mod ara;
#[cfg(test)]
pub mod memory;

pub use ara::{AraClient, StoreConfig};

use crate::error::StoreError;
use crate::models::{
    NewRecord, OwnerId, RecordId, RecordUpdate, RemoteRecord, RunToken, RECORD_KEY, RECORD_TYPE,
};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

/// The four store operations the publish protocol relies on.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Owner id of the run identified by `run_token`.
    async fn find_run_owner(&self, run_token: &RunToken) -> Result<OwnerId, StoreError>;

    /// The record stored under `(owner, key)`, if any, including its value.
    async fn find_record(&self, owner: OwnerId, key: &str)
        -> Result<Option<RemoteRecord>, StoreError>;

    async fn create_record(&self, record: &NewRecord) -> Result<RemoteRecord, StoreError>;

    async fn update_record(
        &self,
        id: RecordId,
        update: &RecordUpdate,
    ) -> Result<RemoteRecord, StoreError>;
}

/// What a publish did to the remote record.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    Created(RemoteRecord),
    Updated(RemoteRecord),
    Unchanged(RemoteRecord),
}

impl PublishOutcome {
    pub fn record(&self) -> &RemoteRecord {
        match self {
            PublishOutcome::Created(r) | PublishOutcome::Updated(r) | PublishOutcome::Unchanged(r) => r,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PublishOutcome::Created(_) => "created",
            PublishOutcome::Updated(_) => "updated",
            PublishOutcome::Unchanged(_) => "unchanged",
        }
    }
}

/// Create-or-update publisher for one run's results.
pub struct RecordSync<S> {
    store: S,
}

impl<S: RecordStore> RecordSync<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Publish `value` as the run's results record.
    pub async fn publish(
        &self,
        run_token: &RunToken,
        value: Value,
    ) -> Result<PublishOutcome, StoreError> {
        let owner = self.store.find_run_owner(run_token).await?;
        debug!("Run {} is owned by {}", run_token, owner);

        match self.store.find_record(owner, RECORD_KEY).await? {
            None => {
                let record = self
                    .store
                    .create_record(&NewRecord {
                        owner,
                        key: RECORD_KEY.to_string(),
                        value,
                        record_type: RECORD_TYPE.to_string(),
                    })
                    .await?;
                info!("Created record {} for owner {}", record.id, owner);
                Ok(PublishOutcome::Created(record))
            }
            Some(existing) if existing.value == value && existing.record_type == RECORD_TYPE => {
                info!("Record {} is up to date", existing.id);
                Ok(PublishOutcome::Unchanged(existing))
            }
            Some(existing) => {
                if existing.record_type != RECORD_TYPE {
                    warn!(
                        "Record {} has type {}, replacing with {}",
                        existing.id, existing.record_type, RECORD_TYPE
                    );
                }
                let record = self
                    .store
                    .update_record(
                        existing.id,
                        &RecordUpdate {
                            key: RECORD_KEY.to_string(),
                            value,
                            record_type: RECORD_TYPE.to_string(),
                        },
                    )
                    .await?;
                info!("Updated record {}", record.id);
                Ok(PublishOutcome::Updated(record))
            }
        }
    }
}
