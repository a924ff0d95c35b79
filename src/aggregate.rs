use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use crate::models::{RawResult, ResultEntry, StudentIdentity, SummaryDoc, UserProfile};

/// Replaces whitespace runs with single underscores for use in document keys.
pub fn slug(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join("_")
}

pub fn document_key(name: &str, class: &str, batch: &str) -> String {
    let batch_part = if batch.is_empty() { "NoBatch" } else { batch };
    format!("{}_{}_{}", slug(name), class, batch_part)
}

/// Coerces a marks field as entered ("85", " 72.5 ", empty, garbage) to a
/// number, defaulting to 0.
pub fn parse_marks(value: Option<&str>) -> f64 {
    value
        .map(str::trim)
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Parses an ISO test date, accepting a plain date or an RFC 3339 timestamp.
/// Missing or unparseable dates map to the epoch so they sort as earliest.
pub fn parse_test_date(value: Option<&str>) -> NaiveDate {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return epoch;
    };
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date;
    }
    if let Ok(stamp) = chrono::DateTime::parse_from_rfc3339(raw) {
        return stamp.date_naive();
    }
    epoch
}

/// Finds redundant summary documents left behind by earlier runs. Documents
/// are grouped by identity; within a group the document with the most result
/// entries wins, ties broken by total marks, then by key for determinism.
/// Returns the keys of every losing document.
pub fn plan_summary_cleanup(docs: &[SummaryDoc]) -> Vec<String> {
    let mut groups: HashMap<StudentIdentity, Vec<&SummaryDoc>> = HashMap::new();
    for doc in docs {
        groups.entry(doc.summary.identity()).or_default().push(doc);
    }

    let mut stale = Vec::new();
    for (_, mut group) in groups {
        if group.len() < 2 {
            continue;
        }
        group.sort_by(|a, b| {
            b.summary
                .results
                .len()
                .cmp(&a.summary.results.len())
                .then_with(|| {
                    b.summary
                        .marks_total()
                        .partial_cmp(&a.summary.marks_total())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.key.cmp(&b.key))
        });
        for doc in group.into_iter().skip(1) {
            stale.push(doc.key.clone());
        }
    }
    stale.sort();
    stale
}

/// A raw result that carries a usable grouping key.
#[derive(Debug, Clone)]
pub struct ValidResult {
    pub name: String,
    pub class: String,
    pub batch: String,
    pub entry: ResultEntry,
}

/// Rejects records missing a student name or class; they cannot be grouped.
pub fn validate_raw(raw: &RawResult) -> Option<ValidResult> {
    let name = raw.student_name.as_deref().map(str::trim).unwrap_or("");
    let class = raw.student_class.as_deref().map(str::trim).unwrap_or("");
    if name.is_empty() || class.is_empty() {
        return None;
    }
    Some(ValidResult {
        name: name.to_string(),
        class: class.to_string(),
        batch: raw
            .batch
            .as_deref()
            .map(str::trim)
            .unwrap_or("")
            .to_string(),
        entry: ResultEntry {
            subject: raw.subject.clone().unwrap_or_default(),
            marks: parse_marks(raw.marks_obtained.as_deref()),
            out_of: parse_marks(raw.marks_possible.as_deref()),
            test_date: raw.test_date.clone().filter(|d| !d.trim().is_empty()),
            remarks: raw.remarks.clone().unwrap_or_default(),
        },
    })
}

pub fn profile_index(profiles: &[UserProfile]) -> HashMap<(String, String), String> {
    let mut index = HashMap::new();
    for profile in profiles {
        if profile.batch.is_empty() {
            continue;
        }
        index
            .entry((profile.name.clone(), profile.class.clone()))
            .or_insert_with(|| profile.batch.clone());
    }
    index
}

/// Resolves the batch for one record: the record's own value wins, then the
/// profile index, then the caller-supplied hint, then empty.
pub fn resolve_batch(
    raw_batch: &str,
    name: &str,
    class: &str,
    index: &HashMap<(String, String), String>,
    hint: Option<&str>,
) -> String {
    if !raw_batch.is_empty() {
        return raw_batch.to_string();
    }
    if let Some(batch) = index.get(&(name.to_string(), class.to_string())) {
        return batch.clone();
    }
    hint.unwrap_or("").to_string()
}

/// Groups validated records by their resolved identity. Records whose batch
/// resolves to the same value merge into a single group even when some raw
/// rows carried the batch and others did not.
pub fn group_results(
    records: Vec<ValidResult>,
    index: &HashMap<(String, String), String>,
    hint: Option<&str>,
) -> HashMap<StudentIdentity, Vec<ResultEntry>> {
    let mut groups: HashMap<StudentIdentity, Vec<ResultEntry>> = HashMap::new();
    for record in records {
        let batch = resolve_batch(&record.batch, &record.name, &record.class, index, hint);
        let identity = StudentIdentity {
            name: record.name,
            class: record.class,
            batch,
        };
        groups.entry(identity).or_default().push(record.entry);
    }
    groups
}

/// Sorts entries newest test first (missing dates last) and drops entries
/// whose (subject, marks, out_of, test_date) tuple has already been kept.
pub fn finalize_entries(mut entries: Vec<ResultEntry>) -> Vec<ResultEntry> {
    entries.sort_by(|a, b| {
        parse_test_date(b.test_date.as_deref()).cmp(&parse_test_date(a.test_date.as_deref()))
    });

    let mut seen = HashSet::new();
    entries.retain(|entry| seen.insert(entry.dedup_key()));
    entries
}

/// Tolerant-read adapter for profile documents. Historical exports disagree
/// on field names: `batch` vs `studentBatch` and `class` vs `Class`; the
/// first variant wins when both are present.
pub fn normalize_profile(doc: &serde_json::Value) -> Option<UserProfile> {
    let text = |keys: &[&str]| -> Option<String> {
        keys.iter()
            .find_map(|k| doc.get(*k))
            .and_then(|v| v.as_str())
            .map(|v| v.trim().to_string())
    };

    let name = text(&["name"]).filter(|v| !v.is_empty())?;
    let class = text(&["class", "Class"]).filter(|v| !v.is_empty())?;
    let batch = text(&["batch", "studentBatch"]).unwrap_or_default();
    Some(UserProfile { name, class, batch })
}
