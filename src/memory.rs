// In-memory implementations of the store ports, for tests and local
// development without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::{RawResult, SummaryDoc, SyncFilter, UserProfile};
use crate::store::{ProfileStore, ResultStore, StoreError, SummaryStore};

#[derive(Default)]
pub struct InMemoryResultStore {
    records: RwLock<Vec<RawResult>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, record: RawResult) {
        self.records.write().await.push(record);
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn fetch(&self, filter: Option<&SyncFilter>) -> Result<Vec<RawResult>, StoreError> {
        let records = self.records.read().await;
        let matches = records
            .iter()
            .filter(|record| match filter {
                Some(filter) => {
                    record.student_name.as_deref() == Some(filter.student_name.as_str())
                        && record.student_class.as_deref() == Some(filter.student_class.as_str())
                }
                None => true,
            })
            .cloned()
            .collect();
        Ok(matches)
    }
}

#[derive(Default)]
pub struct InMemorySummaryStore {
    docs: RwLock<HashMap<String, SummaryDoc>>,
}

impl InMemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, doc: SummaryDoc) {
        self.docs.write().await.insert(doc.key.clone(), doc);
    }

    pub async fn get(&self, key: &str) -> Option<SummaryDoc> {
        self.docs.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }
}

#[async_trait]
impl SummaryStore for InMemorySummaryStore {
    async fn read_all(&self) -> Result<Vec<SummaryDoc>, StoreError> {
        Ok(self.docs.read().await.values().cloned().collect())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.docs.write().await.remove(key);
        Ok(())
    }

    async fn upsert(&self, doc: &SummaryDoc) -> Result<(), StoreError> {
        self.docs
            .write()
            .await
            .insert(doc.key.clone(), doc.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<Vec<UserProfile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, profile: UserProfile) {
        self.profiles.write().await.push(profile);
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn read_all(&self) -> Result<Vec<UserProfile>, StoreError> {
        Ok(self.profiles.read().await.clone())
    }
}
