use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use thiserror::Error;
use tracing::{info, warn};

use crate::aggregate::{
    document_key, finalize_entries, group_results, plan_summary_cleanup, profile_index,
    validate_raw,
};
use crate::models::{StudentSummary, SummaryDoc, SyncFilter, SyncReport};
use crate::store::{ProfileStore, ResultStore, StoreError, SummaryStore};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("duplicate summary cleanup failed: {0}")]
    Cleanup(StoreError),
    #[error("reading raw results failed: {0}")]
    ReadResults(StoreError),
    #[error("reading profiles failed: {0}")]
    ReadProfiles(StoreError),
    #[error("writing summaries failed: {0}")]
    Write(StoreError),
}

/// Converges the summary store to one deduplicated document per student
/// identity from the raw result records. Safe to re-run; a completed run is
/// idempotent with respect to the final state, but a single run is not atomic
/// across its phases and committed writes are never rolled back.
pub struct ResultAggregator {
    results: Arc<dyn ResultStore>,
    summaries: Arc<dyn SummaryStore>,
    profiles: Arc<dyn ProfileStore>,
}

impl ResultAggregator {
    pub fn new(
        results: Arc<dyn ResultStore>,
        summaries: Arc<dyn SummaryStore>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            results,
            summaries,
            profiles,
        }
    }

    /// Full sweep, or a targeted one when `filter` is set.
    pub async fn sync_all(&self, filter: Option<SyncFilter>) -> Result<SyncReport, SyncError> {
        self.sync_with(filter, None).await
    }

    /// Targeted sweep for one student. A missing batch is backfilled from the
    /// profile store on a best-effort basis; a profile read failure here only
    /// means the batch stays unresolved.
    pub async fn sync_one(
        &self,
        student_name: &str,
        student_class: &str,
        student_batch: Option<&str>,
    ) -> Result<SyncReport, SyncError> {
        let batch = match student_batch {
            Some(batch) => Some(batch.to_string()),
            None => match self.profiles.read_all().await {
                Ok(profiles) => profile_index(&profiles)
                    .get(&(student_name.to_string(), student_class.to_string()))
                    .cloned(),
                Err(err) => {
                    warn!(
                        student = student_name,
                        class = student_class,
                        "profile lookup failed, batch stays unresolved: {err}"
                    );
                    None
                }
            },
        };

        let filter = SyncFilter {
            student_name: student_name.to_string(),
            student_class: student_class.to_string(),
        };
        self.sync_with(Some(filter), batch.as_deref()).await
    }

    async fn sync_with(
        &self,
        filter: Option<SyncFilter>,
        batch_hint: Option<&str>,
    ) -> Result<SyncReport, SyncError> {
        // Phase A: collapse summary documents left behind by earlier runs.
        let existing = self.summaries.read_all().await.map_err(SyncError::Cleanup)?;
        let stale = plan_summary_cleanup(&existing);
        if !stale.is_empty() {
            info!(count = stale.len(), "removing duplicate summary documents");
            try_join_all(stale.iter().map(|key| self.summaries.delete(key)))
                .await
                .map_err(SyncError::Cleanup)?;
        }
        let duplicates_removed = stale.len();

        // Phase B: read raw results; zero records is a successful no-op.
        let raw = self
            .results
            .fetch(filter.as_ref())
            .await
            .map_err(SyncError::ReadResults)?;
        if raw.is_empty() {
            return Ok(SyncReport {
                written: 0,
                duplicates_removed,
                skipped: 0,
            });
        }

        let mut skipped = 0usize;
        let mut records = Vec::with_capacity(raw.len());
        for result in &raw {
            match validate_raw(result) {
                Some(valid) => records.push(valid),
                None => {
                    skipped += 1;
                    warn!(record = ?result, "skipping result without student name or class");
                }
            }
        }

        // Phase C: resolve batches from profiles, then group by identity.
        let profiles = self
            .profiles
            .read_all()
            .await
            .map_err(SyncError::ReadProfiles)?;
        let index = profile_index(&profiles);
        let groups = group_results(records, &index, batch_hint);

        // Phase D: finalize each group and write every summary, concurrently.
        let now = Utc::now();
        let docs: Vec<SummaryDoc> = groups
            .into_iter()
            .map(|(identity, entries)| SummaryDoc {
                key: document_key(&identity.name, &identity.class, &identity.batch),
                summary: StudentSummary {
                    name: identity.name,
                    class: identity.class,
                    batch: identity.batch,
                    results: finalize_entries(entries),
                    last_updated: now,
                },
            })
            .collect();

        try_join_all(docs.iter().map(|doc| self.summaries.upsert(doc)))
            .await
            .map_err(SyncError::Write)?;

        info!(
            written = docs.len(),
            duplicates_removed, skipped, "sync complete"
        );
        Ok(SyncReport {
            written: docs.len(),
            duplicates_removed,
            skipped,
        })
    }
}
