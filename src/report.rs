use std::fmt::Write;

use crate::aggregate::parse_test_date;
use crate::models::SummaryDoc;

#[derive(Debug, Clone)]
pub struct StudentStanding {
    pub name: String,
    pub class: String,
    pub batch: String,
    pub tests: usize,
    pub average_percent: f64,
}

pub fn standings(docs: &[SummaryDoc]) -> Vec<StudentStanding> {
    let mut standings: Vec<StudentStanding> = docs
        .iter()
        .map(|doc| {
            let marks: f64 = doc.summary.results.iter().map(|e| e.marks).sum();
            let out_of: f64 = doc.summary.results.iter().map(|e| e.out_of).sum();
            StudentStanding {
                name: doc.summary.name.clone(),
                class: doc.summary.class.clone(),
                batch: doc.summary.batch.clone(),
                tests: doc.summary.results.len(),
                average_percent: if out_of > 0.0 {
                    marks / out_of * 100.0
                } else {
                    0.0
                },
            }
        })
        .collect();

    standings.sort_by(|a, b| {
        b.average_percent
            .partial_cmp(&a.average_percent)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    standings
}

pub fn build_report(docs: &[SummaryDoc]) -> String {
    let standings = standings(docs);

    let mut output = String::new();
    let _ = writeln!(output, "# Student Results Report");
    let _ = writeln!(
        output,
        "Covering {} students with a synced summary.",
        docs.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Standings");

    if standings.is_empty() {
        let _ = writeln!(output, "No summaries synced yet.");
    } else {
        for standing in standings.iter() {
            let batch_label = if standing.batch.is_empty() {
                "no batch"
            } else {
                standing.batch.as_str()
            };
            let _ = writeln!(
                output,
                "- {} ({}, {}) averaging {:.1}% across {} tests",
                standing.name, standing.class, batch_label, standing.average_percent, standing.tests
            );
        }
    }

    let mut recent: Vec<(&SummaryDoc, &crate::models::ResultEntry)> = docs
        .iter()
        .flat_map(|doc| doc.summary.results.iter().map(move |entry| (doc, entry)))
        .collect();
    recent.sort_by(|a, b| {
        parse_test_date(b.1.test_date.as_deref()).cmp(&parse_test_date(a.1.test_date.as_deref()))
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Tests");

    if recent.is_empty() {
        let _ = writeln!(output, "No test results recorded.");
    } else {
        for (doc, entry) in recent.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} scored {:.0}/{:.0} in {} on {}",
                doc.summary.name,
                entry.marks,
                entry.out_of,
                entry.subject,
                entry.test_date.as_deref().unwrap_or("an unknown date")
            );
        }
    }

    output
}
