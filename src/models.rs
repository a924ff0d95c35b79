use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One test score entry as originally recorded. Upstream data entry is
/// unreliable, so every field is optional at this edge; marks are kept as
/// entered and coerced to numbers during aggregation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawResult {
    pub student_name: Option<String>,
    pub student_class: Option<String>,
    pub batch: Option<String>,
    pub subject: Option<String>,
    pub marks_obtained: Option<String>,
    pub marks_possible: Option<String>,
    pub test_date: Option<String>,
    pub remarks: Option<String>,
}

/// Grouping key for raw results and address basis for summary documents.
/// `batch` is the empty string when unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StudentIdentity {
    pub name: String,
    pub class: String,
    pub batch: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub subject: String,
    pub marks: f64,
    pub out_of: f64,
    pub test_date: Option<String>,
    pub remarks: String,
}

impl ResultEntry {
    /// Equality key for deduplication; remarks are deliberately excluded.
    pub fn dedup_key(&self) -> (String, u64, u64, Option<String>) {
        (
            self.subject.clone(),
            self.marks.to_bits(),
            self.out_of.to_bits(),
            self.test_date.clone(),
        )
    }
}

/// Denormalized per-student aggregate, newest test first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentSummary {
    pub name: String,
    pub class: String,
    pub batch: String,
    pub results: Vec<ResultEntry>,
    pub last_updated: DateTime<Utc>,
}

impl StudentSummary {
    pub fn identity(&self) -> StudentIdentity {
        StudentIdentity {
            name: self.name.clone(),
            class: self.class.clone(),
            batch: self.batch.clone(),
        }
    }

    pub fn marks_total(&self) -> f64 {
        self.results.iter().map(|entry| entry.marks).sum()
    }
}

/// A summary together with the key it is stored under.
#[derive(Debug, Clone)]
pub struct SummaryDoc {
    pub key: String,
    pub summary: StudentSummary,
}

/// Normalized profile record; supplies a batch for a (name, class) pair when
/// raw results omit it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub class: String,
    pub batch: String,
}

/// Restricts a sync run to a single student.
#[derive(Debug, Clone)]
pub struct SyncFilter {
    pub student_name: String,
    pub student_class: String,
}

/// Outcome of a completed sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub written: usize,
    pub duplicates_removed: usize,
    pub skipped: usize,
}
