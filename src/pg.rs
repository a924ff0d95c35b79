use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::warn;
use uuid::Uuid;

use crate::aggregate::normalize_profile;
use crate::models::{RawResult, ResultEntry, StudentSummary, SummaryDoc, SyncFilter, UserProfile};
use crate::store::{ProfileStore, ResultStore, StoreError, SummaryStore};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query("CREATE SCHEMA IF NOT EXISTS results_sync")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS results_sync.raw_results (
            id UUID PRIMARY KEY,
            student_name TEXT,
            student_class TEXT,
            batch TEXT,
            subject TEXT,
            marks_obtained TEXT,
            marks_possible TEXT,
            test_date TEXT,
            remarks TEXT,
            recorded_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS results_sync.student_summaries (
            doc_key TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            class TEXT NOT NULL,
            batch TEXT NOT NULL DEFAULT '',
            results TEXT NOT NULL,
            last_updated TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS results_sync.user_profiles (
            name TEXT NOT NULL,
            class TEXT NOT NULL,
            batch TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (name, class)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let profiles = vec![
        ("Asha Verma", "Class 10", "MorningBatch"),
        ("Ravi Kumar", "Class 9", "B2"),
        ("Meena Iyer", "Class 10", "EveningBatch"),
    ];

    for (name, class, batch) in profiles {
        sqlx::query(
            r#"
            INSERT INTO results_sync.user_profiles (name, class, batch)
            VALUES ($1, $2, $3)
            ON CONFLICT (name, class) DO UPDATE SET batch = EXCLUDED.batch
            "#,
        )
        .bind(name)
        .bind(class)
        .bind(batch)
        .execute(pool)
        .await?;
    }

    // The duplicated Maths row below is intentional: repeated data entry is
    // exactly what the sync has to cope with.
    let results = vec![
        (
            "5f0f4c6e-9f1d-4a34-9a04-b8c85d1a9a01",
            "Asha Verma",
            "Class 10",
            "MorningBatch",
            "Maths",
            "92",
            "100",
            "2024-03-01",
            "Strong improvement",
        ),
        (
            "5f0f4c6e-9f1d-4a34-9a04-b8c85d1a9a02",
            "Asha Verma",
            "Class 10",
            "MorningBatch",
            "Maths",
            "92",
            "100",
            "2024-03-01",
            "Strong improvement",
        ),
        (
            "5f0f4c6e-9f1d-4a34-9a04-b8c85d1a9a03",
            "Asha Verma",
            "Class 10",
            "",
            "Science",
            "85",
            "100",
            "2024-01-10",
            "",
        ),
        (
            "5f0f4c6e-9f1d-4a34-9a04-b8c85d1a9a04",
            "Ravi Kumar",
            "Class 9",
            "",
            "English",
            "74",
            "100",
            "2024-02-14",
            "Needs grammar practice",
        ),
    ];

    for (id, name, class, batch, subject, marks, out_of, date, remarks) in results {
        sqlx::query(
            r#"
            INSERT INTO results_sync.raw_results
            (id, student_name, student_class, batch, subject, marks_obtained,
             marks_possible, test_date, remarks)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(name)
        .bind(class)
        .bind(batch)
        .bind(subject)
        .bind(marks)
        .bind(out_of)
        .bind(date)
        .bind(remarks)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn import_results_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_name: Option<String>,
        student_class: Option<String>,
        batch: Option<String>,
        subject: Option<String>,
        marks_obtained: Option<String>,
        marks_possible: Option<String>,
        test_date: Option<String>,
        remarks: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    // Rows are appended as-is. Exact duplicates are kept; the sync collapses
    // them when it builds summaries.
    for row in reader.deserialize::<CsvRow>() {
        let row = row?;
        sqlx::query(
            r#"
            INSERT INTO results_sync.raw_results
            (id, student_name, student_class, batch, subject, marks_obtained,
             marks_possible, test_date, remarks)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.student_name)
        .bind(&row.student_class)
        .bind(&row.batch)
        .bind(&row.subject)
        .bind(&row.marks_obtained)
        .bind(&row.marks_possible)
        .bind(&row.test_date)
        .bind(&row.remarks)
        .execute(pool)
        .await?;
        inserted += 1;
    }

    Ok(inserted)
}

pub async fn import_profiles_json(
    pool: &PgPool,
    json_path: &std::path::Path,
) -> anyhow::Result<usize> {
    let text = std::fs::read_to_string(json_path)?;
    let docs: Vec<serde_json::Value> = serde_json::from_str(&text)?;
    let mut inserted = 0usize;

    for doc in &docs {
        let Some(profile) = normalize_profile(doc) else {
            warn!(doc = %doc, "skipping profile without usable name and class");
            continue;
        };
        sqlx::query(
            r#"
            INSERT INTO results_sync.user_profiles (name, class, batch)
            VALUES ($1, $2, $3)
            ON CONFLICT (name, class) DO UPDATE SET batch = EXCLUDED.batch
            "#,
        )
        .bind(&profile.name)
        .bind(&profile.class)
        .bind(&profile.batch)
        .execute(pool)
        .await?;
        inserted += 1;
    }

    Ok(inserted)
}

pub struct PgResultStore {
    pool: PgPool,
}

impl PgResultStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for PgResultStore {
    async fn fetch(&self, filter: Option<&SyncFilter>) -> Result<Vec<RawResult>, StoreError> {
        let mut query = String::from(
            "SELECT student_name, student_class, batch, subject, marks_obtained, \
             marks_possible, test_date, remarks \
             FROM results_sync.raw_results",
        );
        if filter.is_some() {
            query.push_str(" WHERE student_name = $1 AND student_class = $2");
        }

        let mut rows = sqlx::query(&query);
        if let Some(filter) = filter {
            rows = rows
                .bind(&filter.student_name)
                .bind(&filter.student_class);
        }

        let records = rows.fetch_all(&self.pool).await?;
        let mut results = Vec::with_capacity(records.len());
        for row in records {
            results.push(RawResult {
                student_name: row.get("student_name"),
                student_class: row.get("student_class"),
                batch: row.get("batch"),
                subject: row.get("subject"),
                marks_obtained: row.get("marks_obtained"),
                marks_possible: row.get("marks_possible"),
                test_date: row.get("test_date"),
                remarks: row.get("remarks"),
            });
        }
        Ok(results)
    }
}

pub struct PgSummaryStore {
    pool: PgPool,
}

impl PgSummaryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SummaryStore for PgSummaryStore {
    async fn read_all(&self) -> Result<Vec<SummaryDoc>, StoreError> {
        let rows = sqlx::query(
            "SELECT doc_key, name, class, batch, results, last_updated \
             FROM results_sync.student_summaries",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let results: Vec<ResultEntry> =
                serde_json::from_str(row.get::<String, _>("results").as_str())?;
            docs.push(SummaryDoc {
                key: row.get("doc_key"),
                summary: StudentSummary {
                    name: row.get("name"),
                    class: row.get("class"),
                    batch: row.get("batch"),
                    results,
                    last_updated: row.get("last_updated"),
                },
            });
        }
        Ok(docs)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM results_sync.student_summaries WHERE doc_key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert(&self, doc: &SummaryDoc) -> Result<(), StoreError> {
        let results = serde_json::to_string(&doc.summary.results)?;
        sqlx::query(
            r#"
            INSERT INTO results_sync.student_summaries
            (doc_key, name, class, batch, results, last_updated)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (doc_key) DO UPDATE
            SET name = EXCLUDED.name,
                class = EXCLUDED.class,
                batch = EXCLUDED.batch,
                results = EXCLUDED.results,
                last_updated = EXCLUDED.last_updated
            "#,
        )
        .bind(&doc.key)
        .bind(&doc.summary.name)
        .bind(&doc.summary.class)
        .bind(&doc.summary.batch)
        .bind(results)
        .bind(doc.summary.last_updated)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn read_all(&self) -> Result<Vec<UserProfile>, StoreError> {
        let rows = sqlx::query("SELECT name, class, batch FROM results_sync.user_profiles")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| UserProfile {
                name: row.get("name"),
                class: row.get("class"),
                batch: row.get("batch"),
            })
            .collect())
    }
}
