//! Batch processing of upstream contact records.

use crate::core::error::{AppError, Result};
use crate::core::models::Person;
use crate::discovery::EmailFinder;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const EMAIL_KEY: &str = "Email";
const VERIFIED_KEY: &str = "Verified Email";

/// One row from the contact discovery stage. Unknown keys are carried through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactRecord {
    #[serde(rename = "Company URL", default, skip_serializing_if = "Option::is_none")]
    pub company_url: Option<String>,
    #[serde(rename = "Person Name", default, skip_serializing_if = "Option::is_none")]
    pub person_name: Option<String>,
    #[serde(rename = "Designation", default, skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A record with the discovery result attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedRecord {
    #[serde(flatten)]
    pub record: ContactRecord,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Verified Email")]
    pub verified: bool,
}

impl ProcessedRecord {
    fn new(mut record: ContactRecord, email: Option<String>, verified: bool) -> Self {
        record.extra.remove(EMAIL_KEY);
        record.extra.remove(VERIFIED_KEY);
        Self {
            record,
            email: email.unwrap_or_default(),
            verified,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub processed: usize,
    pub found: usize,
    pub verified: usize,
    pub skipped: usize,
}

/// Reads a JSON array of records, or JSON Lines when the input is not an array.
/// Malformed lines are skipped with a warning.
pub fn read_records(path: &Path) -> Result<Vec<ContactRecord>> {
    let content = std::fs::read_to_string(path)?;
    let trimmed = content.trim_start();

    if trimmed.starts_with('[') {
        let records: Vec<ContactRecord> = serde_json::from_str(trimmed)?;
        tracing::info!(target: "pipeline_task", "Read {} records from {}", records.len(), path.display());
        return Ok(records);
    }

    let mut records = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<ContactRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(target: "pipeline_task", "Skipping malformed line {} in {}: {}", index + 1, path.display(), e);
            }
        }
    }
    tracing::info!(target: "pipeline_task", "Read {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Appends processed records as JSON lines.
pub struct RecordWriter {
    path: PathBuf,
    file: tokio::fs::File,
}

impl RecordWriter {
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub async fn append(&mut self, record: &ProcessedRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line).await?;
        self.file.flush().await?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Runs discovery for one record. Never fails: problems end as an empty email.
pub async fn process_record(finder: &EmailFinder, record: ContactRecord) -> ProcessedRecord {
    let name = record.person_name.as_deref().map(str::trim).unwrap_or_default();
    let url = record.company_url.as_deref().map(str::trim).unwrap_or_default();

    if name.is_empty() || url.is_empty() {
        tracing::warn!(target: "pipeline_task", "Record is missing 'Person Name' or 'Company URL'; skipping");
        return ProcessedRecord::new(record, None, false);
    }

    match finder.find_email(&Person::new(name), url).await {
        Ok(outcome) => ProcessedRecord::new(record, outcome.email, outcome.verified),
        Err(e @ (AppError::InvalidName(_) | AppError::DomainExtraction(_))) => {
            tracing::warn!(target: "pipeline_task", "Skipping '{}' at '{}': {}", name, url, e);
            ProcessedRecord::new(record, None, false)
        }
        Err(e) => {
            tracing::error!(target: "pipeline_task", "Discovery failed for '{}' at '{}': {}", name, url, e);
            ProcessedRecord::new(record, None, false)
        }
    }
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    bar.set_style(style);
    bar
}

/// Processes `records` with at most `concurrency` discoveries in flight,
/// appending each result to `writer` as soon as it completes.
pub async fn process_records(
    finder: &EmailFinder,
    records: Vec<ContactRecord>,
    writer: &mut RecordWriter,
    concurrency: usize,
    show_progress: bool,
) -> Result<PipelineSummary> {
    let bar = progress_bar(records.len(), show_progress);
    let mut summary = PipelineSummary::default();

    let mut results = stream::iter(records)
        .map(|record| process_record(finder, record))
        .buffer_unordered(concurrency.max(1));

    while let Some(processed) = results.next().await {
        writer.append(&processed).await?;
        summary.processed += 1;
        if processed.email.is_empty() {
            summary.skipped += 1;
        } else {
            summary.found += 1;
        }
        if processed.verified {
            summary.verified += 1;
        }
        bar.set_message(processed.email.clone());
        bar.inc(1);
    }

    bar.finish_with_message("done");
    tracing::info!(target: "pipeline_task",
        "Processed {} records: {} with an email, {} verified, written to {}",
        summary.processed, summary.found, summary.verified, writer.path().display()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{CandidateEmail, PatternRule};
    use crate::ranking::Ranker;
    use crate::utils::dns::tests::StubLookup;
    use crate::utils::dns::MxResolver;
    use crate::utils::smtp::ProbeOutcome;
    use crate::verification::{Probe, RetryPolicy, Verifier};
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;

    struct FirstDotLastProbe;

    #[async_trait]
    impl Probe for FirstDotLastProbe {
        fn name(&self) -> &'static str {
            "first-dot-last"
        }

        async fn probe(&self, _domain: &str, _host: &str, candidate: &CandidateEmail) -> ProbeOutcome {
            if candidate.rule == PatternRule::FirstDotLast {
                ProbeOutcome::accepted("250 ok")
            } else {
                ProbeOutcome::rejected(Some(550), "no such user")
            }
        }
    }

    fn finder() -> EmailFinder {
        let resolver = MxResolver::new(
            Arc::new(StubLookup::with("acme.com", &[("mx.acme.com", 10)])),
            Duration::from_secs(60),
        );
        EmailFinder::new(
            Arc::new(resolver),
            Verifier::new(Arc::new(FirstDotLastProbe), RetryPolicy::new(3, Duration::from_millis(1))),
            Ranker::static_order(),
            false,
        )
    }

    fn record(name: &str, url: &str) -> ContactRecord {
        ContactRecord {
            company_url: Some(url.to_string()),
            person_name: Some(name.to_string()),
            designation: Some("CTO".to_string()),
            extra: Map::new(),
        }
    }

    #[test]
    fn reads_arrays_and_json_lines() {
        let mut array = tempfile::NamedTempFile::new().unwrap();
        write!(
            array,
            r#"[{{"Company URL": "https://acme.com", "Person Name": "Jane Doe", "Designation": "CTO", "Location": "Berlin"}}]"#
        )
        .unwrap();
        let records = read_records(array.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].person_name.as_deref(), Some("Jane Doe"));
        assert_eq!(records[0].extra.get("Location"), Some(&Value::from("Berlin")));

        let mut lines = tempfile::NamedTempFile::new().unwrap();
        writeln!(lines, r#"{{"Company URL": "acme.com", "Person Name": "Jane Doe"}}"#).unwrap();
        writeln!(lines).unwrap();
        writeln!(lines, "not json").unwrap();
        writeln!(lines, r#"{{"Company URL": "other.org", "Person Name": "John Roe"}}"#).unwrap();
        let records = read_records(lines.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[1].designation.is_none());
    }

    #[test]
    fn output_replaces_stale_result_fields() {
        let mut input = record("Jane Doe", "acme.com");
        input.extra.insert("Email".to_string(), Value::from("old@acme.com"));
        let processed = ProcessedRecord::new(input, Some("jane.doe@acme.com".to_string()), true);

        let json = serde_json::to_value(&processed).unwrap();
        assert_eq!(json["Email"], "jane.doe@acme.com");
        assert_eq!(json["Verified Email"], true);
        assert_eq!(json["Person Name"], "Jane Doe");
        assert_eq!(json["Designation"], "CTO");
    }

    #[tokio::test]
    async fn bad_records_are_written_with_empty_email() {
        let f = finder();
        let processed = process_record(&f, record("Cher", "acme.com")).await;
        assert_eq!(processed.email, "");
        assert!(!processed.verified);

        let processed = process_record(&f, ContactRecord::default()).await;
        assert_eq!(processed.email, "");
    }

    #[tokio::test]
    async fn appends_results_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("results").join("out.jsonl");
        let mut writer = RecordWriter::open(&out).await.unwrap();

        let records = vec![
            record("Jane Doe", "https://www.acme.com/about"),
            record("Prince", "acme.com"),
            record("John Roe", "nomail.test"),
        ];
        let summary = process_records(&finder(), records, &mut writer, 2, false).await.unwrap();
        assert_eq!(
            summary,
            PipelineSummary {
                processed: 3,
                found: 2,
                verified: 1,
                skipped: 1,
            }
        );

        let written = std::fs::read_to_string(&out).unwrap();
        let rows: Vec<Value> = written.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(rows.len(), 3);
        let jane = rows.iter().find(|r| r["Person Name"] == "Jane Doe").unwrap();
        assert_eq!(jane["Email"], "jane.doe@acme.com");
        assert_eq!(jane["Verified Email"], true);
        let john = rows.iter().find(|r| r["Person Name"] == "John Roe").unwrap();
        assert_eq!(john["Email"], "john.roe@nomail.test");
        assert_eq!(john["Verified Email"], false);

        let mut again = RecordWriter::open(&out).await.unwrap();
        again.append(&ProcessedRecord::new(record("A B", "acme.com"), None, false)).await.unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap().lines().count(), 4);
    }
}
