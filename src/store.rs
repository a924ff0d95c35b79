// Ports for the three collaborators the aggregator depends on. Concrete
// backends live in `pg` (Postgres) and `memory` (tests, local development).

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{RawResult, SummaryDoc, SyncFilter, UserProfile};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Append-only collection of per-test result records.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn fetch(&self, filter: Option<&SyncFilter>) -> Result<Vec<RawResult>, StoreError>;
}

/// Document store holding one summary per student identity, addressed by key.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    async fn read_all(&self) -> Result<Vec<SummaryDoc>, StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    /// Full replace of the document at `doc.key`.
    async fn upsert(&self, doc: &SummaryDoc) -> Result<(), StoreError>;
}

/// Read-only student profile records.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn read_all(&self) -> Result<Vec<UserProfile>, StoreError>;
}
