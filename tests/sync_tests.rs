use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use institute_results_sync::memory::{
    InMemoryProfileStore, InMemoryResultStore, InMemorySummaryStore,
};
use institute_results_sync::models::{
    RawResult, ResultEntry, StudentSummary, SummaryDoc, UserProfile,
};
use institute_results_sync::store::{ProfileStore, StoreError};
use institute_results_sync::sync::ResultAggregator;

fn raw(
    name: Option<&str>,
    class: Option<&str>,
    batch: Option<&str>,
    subject: &str,
    marks: &str,
    out_of: &str,
    date: Option<&str>,
    remarks: &str,
) -> RawResult {
    RawResult {
        student_name: name.map(str::to_string),
        student_class: class.map(str::to_string),
        batch: batch.map(str::to_string),
        subject: Some(subject.to_string()),
        marks_obtained: Some(marks.to_string()),
        marks_possible: Some(out_of.to_string()),
        test_date: date.map(str::to_string),
        remarks: Some(remarks.to_string()),
    }
}

fn entry(subject: &str, marks: f64, date: Option<&str>) -> ResultEntry {
    ResultEntry {
        subject: subject.to_string(),
        marks,
        out_of: 100.0,
        test_date: date.map(str::to_string),
        remarks: String::new(),
    }
}

fn summary_doc(key: &str, name: &str, class: &str, batch: &str, results: Vec<ResultEntry>) -> SummaryDoc {
    SummaryDoc {
        key: key.to_string(),
        summary: StudentSummary {
            name: name.to_string(),
            class: class.to_string(),
            batch: batch.to_string(),
            results,
            last_updated: Utc::now(),
        },
    }
}

struct Fixture {
    results: Arc<InMemoryResultStore>,
    summaries: Arc<InMemorySummaryStore>,
    profiles: Arc<InMemoryProfileStore>,
    aggregator: ResultAggregator,
}

fn fixture() -> Fixture {
    let results = Arc::new(InMemoryResultStore::new());
    let summaries = Arc::new(InMemorySummaryStore::new());
    let profiles = Arc::new(InMemoryProfileStore::new());
    let aggregator = ResultAggregator::new(
        results.clone(),
        summaries.clone(),
        profiles.clone(),
    );
    Fixture {
        results,
        summaries,
        profiles,
        aggregator,
    }
}

#[tokio::test]
async fn sync_all_is_idempotent() {
    let fx = fixture();
    fx.results
        .push(raw(
            Some("Asha Verma"),
            Some("Class 10"),
            Some("MorningBatch"),
            "Maths",
            "92",
            "100",
            Some("2024-03-01"),
            "",
        ))
        .await;
    fx.results
        .push(raw(
            Some("Ravi Kumar"),
            Some("Class 9"),
            None,
            "English",
            "74",
            "100",
            Some("2024-02-14"),
            "",
        ))
        .await;

    let first = fx.aggregator.sync_all(None).await.unwrap();
    assert_eq!(first.written, 2);

    let mut after_first: Vec<(String, Vec<ResultEntry>)> = Vec::new();
    use institute_results_sync::store::SummaryStore;
    for doc in fx.summaries.read_all().await.unwrap() {
        after_first.push((doc.key, doc.summary.results));
    }
    after_first.sort_by(|a, b| a.0.cmp(&b.0));

    let second = fx.aggregator.sync_all(None).await.unwrap();
    assert_eq!(second.written, 2);
    assert_eq!(second.duplicates_removed, 0);

    let mut after_second: Vec<(String, Vec<ResultEntry>)> = Vec::new();
    for doc in fx.summaries.read_all().await.unwrap() {
        after_second.push((doc.key, doc.summary.results));
    }
    after_second.sort_by(|a, b| a.0.cmp(&b.0));

    assert_eq!(after_first, after_second);
}

#[tokio::test]
async fn repeated_data_entry_collapses_to_one_result() {
    let fx = fixture();
    // Same tuple, different remarks only.
    fx.results
        .push(raw(
            Some("Asha Verma"),
            Some("Class 10"),
            None,
            "Maths",
            "85",
            "100",
            Some("2024-01-10"),
            "good",
        ))
        .await;
    fx.results
        .push(raw(
            Some("Asha Verma"),
            Some("Class 10"),
            None,
            "Maths",
            "85",
            "100",
            Some("2024-01-10"),
            "ok",
        ))
        .await;

    fx.aggregator.sync_all(None).await.unwrap();

    let doc = fx
        .summaries
        .get("Asha_Verma_Class 10_NoBatch")
        .await
        .unwrap();
    assert_eq!(doc.summary.results.len(), 1);
}

#[tokio::test]
async fn duplicate_summaries_collapse_to_the_most_complete_one() {
    let fx = fixture();
    fx.summaries
        .insert(summary_doc(
            "stale",
            "Asha Verma",
            "Class 10",
            "MorningBatch",
            vec![
                entry("Maths", 90.0, Some("2024-01-10")),
                entry("Science", 80.0, Some("2024-01-11")),
                entry("English", 80.0, Some("2024-01-12")),
            ],
        ))
        .await;
    fx.summaries
        .insert(summary_doc(
            "survivor",
            "Asha Verma",
            "Class 10",
            "MorningBatch",
            vec![
                entry("Maths", 40.0, Some("2024-01-10")),
                entry("Science", 40.0, Some("2024-01-11")),
                entry("English", 40.0, Some("2024-01-12")),
                entry("Hindi", 40.0, Some("2024-01-13")),
                entry("SST", 40.0, Some("2024-01-14")),
            ],
        ))
        .await;

    let outcome = fx.aggregator.sync_all(None).await.unwrap();

    assert_eq!(outcome.duplicates_removed, 1);
    assert_eq!(fx.summaries.len().await, 1);
    let kept = fx.summaries.get("survivor").await.unwrap();
    assert_eq!(kept.summary.results.len(), 5);
    assert!(fx.summaries.get("stale").await.is_none());
}

#[tokio::test]
async fn records_merge_under_the_profile_resolved_batch() {
    let fx = fixture();
    fx.profiles
        .push(UserProfile {
            name: "Asha Verma".to_string(),
            class: "Class 10".to_string(),
            batch: "MorningBatch".to_string(),
        })
        .await;
    fx.results
        .push(raw(
            Some("Asha Verma"),
            Some("Class 10"),
            Some("MorningBatch"),
            "Maths",
            "92",
            "100",
            Some("2024-03-01"),
            "",
        ))
        .await;
    fx.results
        .push(raw(
            Some("Asha Verma"),
            Some("Class 10"),
            Some(""),
            "Science",
            "85",
            "100",
            Some("2024-01-10"),
            "",
        ))
        .await;

    let outcome = fx.aggregator.sync_all(None).await.unwrap();

    assert_eq!(outcome.written, 1);
    let doc = fx
        .summaries
        .get("Asha_Verma_Class 10_MorningBatch")
        .await
        .unwrap();
    assert_eq!(doc.summary.batch, "MorningBatch");
    assert_eq!(doc.summary.results.len(), 2);
}

#[tokio::test]
async fn unusable_records_are_skipped_without_failing_the_run() {
    let fx = fixture();
    fx.results
        .push(raw(
            Some("Asha Verma"),
            None,
            None,
            "Maths",
            "85",
            "100",
            Some("2024-01-10"),
            "",
        ))
        .await;
    fx.results
        .push(raw(
            Some("Ravi Kumar"),
            Some("Class 9"),
            None,
            "English",
            "74",
            "100",
            Some("2024-02-14"),
            "",
        ))
        .await;

    let outcome = fx.aggregator.sync_all(None).await.unwrap();

    assert_eq!(outcome.skipped, 1);
    assert_eq!(outcome.written, 1);
    assert_eq!(fx.summaries.len().await, 1);
    assert!(fx.summaries.get("Ravi_Kumar_Class 9_NoBatch").await.is_some());
}

#[tokio::test]
async fn results_are_ordered_newest_first_with_undated_last() {
    let fx = fixture();
    for (subject, date) in [
        ("Maths", Some("2024-01-10")),
        ("Science", None),
        ("English", Some("2024-03-01")),
    ] {
        fx.results
            .push(raw(
                Some("Asha Verma"),
                Some("Class 10"),
                None,
                subject,
                "80",
                "100",
                date,
                "",
            ))
            .await;
    }

    fx.aggregator.sync_all(None).await.unwrap();

    let doc = fx
        .summaries
        .get("Asha_Verma_Class 10_NoBatch")
        .await
        .unwrap();
    let subjects: Vec<&str> = doc
        .summary
        .results
        .iter()
        .map(|e| e.subject.as_str())
        .collect();
    assert_eq!(subjects, vec!["English", "Maths", "Science"]);
}

#[tokio::test]
async fn empty_raw_collection_is_a_successful_noop() {
    let fx = fixture();
    fx.summaries
        .insert(summary_doc(
            "existing",
            "Meena Iyer",
            "Class 8",
            "A1",
            vec![entry("Maths", 60.0, Some("2023-11-05"))],
        ))
        .await;

    let outcome = fx.aggregator.sync_all(None).await.unwrap();

    assert_eq!(outcome.written, 0);
    assert_eq!(outcome.duplicates_removed, 0);
    let untouched = fx.summaries.get("existing").await.unwrap();
    assert_eq!(untouched.summary.results.len(), 1);
}

#[tokio::test]
async fn sync_one_backfills_the_batch_from_profiles() {
    let fx = fixture();
    fx.profiles
        .push(UserProfile {
            name: "Ravi Kumar".to_string(),
            class: "Class 9".to_string(),
            batch: "B2".to_string(),
        })
        .await;
    fx.results
        .push(raw(
            Some("Ravi Kumar"),
            Some("Class 9"),
            None,
            "English",
            "74",
            "100",
            Some("2024-02-14"),
            "",
        ))
        .await;
    // Another student's record must stay out of a targeted run.
    fx.results
        .push(raw(
            Some("Asha Verma"),
            Some("Class 10"),
            None,
            "Maths",
            "92",
            "100",
            Some("2024-03-01"),
            "",
        ))
        .await;

    let outcome = fx
        .aggregator
        .sync_one("Ravi Kumar", "Class 9", None)
        .await
        .unwrap();

    assert_eq!(outcome.written, 1);
    let doc = fx.summaries.get("Ravi_Kumar_Class 9_B2").await.unwrap();
    assert_eq!(doc.summary.batch, "B2");
    assert!(fx
        .summaries
        .get("Asha_Verma_Class 10_NoBatch")
        .await
        .is_none());
}

#[tokio::test]
async fn sync_one_uses_an_explicit_batch_argument() {
    let fx = fixture();
    fx.results
        .push(raw(
            Some("Meena Iyer"),
            Some("Class 8"),
            None,
            "Maths",
            "66",
            "100",
            Some("2024-02-01"),
            "",
        ))
        .await;

    fx.aggregator
        .sync_one("Meena Iyer", "Class 8", Some("EveningBatch"))
        .await
        .unwrap();

    let doc = fx
        .summaries
        .get("Meena_Iyer_Class 8_EveningBatch")
        .await
        .unwrap();
    assert_eq!(doc.summary.batch, "EveningBatch");
}

/// Fails the first read and recovers afterwards, mimicking a transient
/// profile store outage during sync_one's pre-resolution step.
struct FlakyProfileStore {
    failed_once: AtomicBool,
}

#[async_trait]
impl ProfileStore for FlakyProfileStore {
    async fn read_all(&self) -> Result<Vec<UserProfile>, StoreError> {
        if !self.failed_once.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Backend("connection reset".to_string()));
        }
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn sync_one_continues_when_profile_preresolution_fails() {
    let results = Arc::new(InMemoryResultStore::new());
    let summaries = Arc::new(InMemorySummaryStore::new());
    let profiles = Arc::new(FlakyProfileStore {
        failed_once: AtomicBool::new(false),
    });
    let aggregator = ResultAggregator::new(results.clone(), summaries.clone(), profiles);

    results
        .push(raw(
            Some("Ravi Kumar"),
            Some("Class 9"),
            None,
            "English",
            "74",
            "100",
            Some("2024-02-14"),
            "",
        ))
        .await;

    let outcome = aggregator
        .sync_one("Ravi Kumar", "Class 9", None)
        .await
        .unwrap();

    // Batch stays unresolved; the sync itself still completes.
    assert_eq!(outcome.written, 1);
    assert!(summaries.get("Ravi_Kumar_Class 9_NoBatch").await.is_some());
}
