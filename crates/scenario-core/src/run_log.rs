//! Run logging for post-mortem analysis.
//!
//! Appends one JSON line per scenario run:
//! ```jsonl
//! {"ts":"2024-01-15T10:23:45Z","endpoints":["Sender","Receiver"],"outcome":"timed_out","elapsed_ms":10502,"detail":"..."}
//! ```

use crate::error::ScenarioError;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    AssertionsFailed,
    TimedOut,
    InitializationFailed,
    Error,
}

impl RunOutcome {
    /// Classifies a run result.
    pub fn of<T>(result: &Result<T, ScenarioError>) -> Self {
        match result {
            Ok(_) => RunOutcome::Succeeded,
            Err(ScenarioError::AssertionsFailed { .. }) => RunOutcome::AssertionsFailed,
            Err(ScenarioError::TimedOut { .. }) => RunOutcome::TimedOut,
            Err(ScenarioError::Initialization { .. }) => RunOutcome::InitializationFailed,
            Err(_) => RunOutcome::Error,
        }
    }
}

/// One logged run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// ISO 8601 timestamp.
    pub ts: String,

    /// Endpoint names, in registration order.
    pub endpoints: Vec<String>,

    pub outcome: RunOutcome,

    pub elapsed_ms: u64,

    /// Report or error text for failed runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RunRecord {
    /// Maximum detail length before truncation.
    const MAX_DETAIL_LEN: usize = 4000;

    pub fn new<T>(
        endpoints: Vec<String>,
        result: &Result<T, ScenarioError>,
        elapsed: Duration,
    ) -> Self {
        let detail = result.as_ref().err().map(|e| {
            let text = e.to_string();
            if text.len() > Self::MAX_DETAIL_LEN {
                let cut = floor_char_boundary(&text, Self::MAX_DETAIL_LEN);
                format!(
                    "{}... [truncated, {} chars total]",
                    &text[..cut],
                    text.chars().count()
                )
            } else {
                text
            }
        });

        Self {
            ts: chrono::Utc::now().to_rfc3339(),
            endpoints,
            outcome: RunOutcome::of(result),
            elapsed_ms: elapsed.as_millis() as u64,
            detail,
        }
    }
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    (0..=index)
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0)
}

/// Appends [`RunRecord`]s to a JSONL file.
pub struct RunLogger {
    path: PathBuf,
    file: Option<File>,
}

impl RunLogger {
    /// Creates a logger; the file and its parent directory are created on
    /// first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    fn ensure_open(&mut self) -> std::io::Result<&mut File> {
        if self.file.is_none() {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            self.file = Some(file);
        }
        self.file
            .as_mut()
            .ok_or_else(|| std::io::Error::other("run log file not open"))
    }

    pub fn log(&mut self, record: &RunRecord) -> std::io::Result<()> {
        let file = self.ensure_open()?;
        let json = serde_json::to_string(record)?;
        writeln!(file, "{json}")?;
        file.flush()?;
        debug!(outcome = ?record.outcome, path = %self.path.display(), "Run logged");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reader for run log files.
pub struct RunHistory {
    path: PathBuf,
}

impl RunHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads every record, skipping lines that fail to parse.
    pub fn read_all(&self) -> std::io::Result<Vec<RunRecord>> {
        if !self.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(line = line_num + 1, error = %e, "Failed to parse run record");
                }
            }
        }

        Ok(records)
    }

    /// Reads the last `n` records.
    pub fn read_last(&self, n: usize) -> std::io::Result<Vec<RunRecord>> {
        let all = self.read_all()?;
        let start = all.len().saturating_sub(n);
        Ok(all[start..].to_vec())
    }

    pub fn filter_by_outcome(&self, outcome: RunOutcome) -> std::io::Result<Vec<RunRecord>> {
        let all = self.read_all()?;
        Ok(all.into_iter().filter(|r| r.outcome == outcome).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ok() -> Result<(), ScenarioError> {
        Ok(())
    }

    fn timed_out() -> Result<(), ScenarioError> {
        Err(ScenarioError::TimedOut {
            report: "The maximum time limit for this test(10s) has been reached".to_string(),
        })
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(RunOutcome::of(&ok()), RunOutcome::Succeeded);
        assert_eq!(RunOutcome::of(&timed_out()), RunOutcome::TimedOut);
        assert_eq!(
            RunOutcome::of::<()>(&Err(ScenarioError::Initialization {
                endpoints: vec!["A".into()]
            })),
            RunOutcome::InitializationFailed
        );
        assert_eq!(
            RunOutcome::of::<()>(&Err(ScenarioError::NoScenarios)),
            RunOutcome::Error
        );
    }

    #[test]
    fn test_log_and_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("runs.jsonl");
        let mut logger = RunLogger::new(&path);

        let endpoints = vec!["Sender".to_string(), "Receiver".to_string()];
        logger
            .log(&RunRecord::new(endpoints.clone(), &ok(), Duration::from_millis(20)))
            .unwrap();
        logger
            .log(&RunRecord::new(endpoints, &timed_out(), Duration::from_millis(10_500)))
            .unwrap();

        let records = RunHistory::new(&path).read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].outcome, RunOutcome::Succeeded);
        assert!(records[0].detail.is_none());
        assert_eq!(records[1].outcome, RunOutcome::TimedOut);
        assert_eq!(records[1].elapsed_ms, 10_500);
        assert!(records[1].detail.as_deref().unwrap().contains("(10s)"));
    }

    #[test]
    fn test_read_last_and_filter() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("runs.jsonl");
        let mut logger = RunLogger::new(&path);

        for i in 0..5 {
            let result = if i % 2 == 0 { ok() } else { timed_out() };
            logger
                .log(&RunRecord::new(vec![format!("E{i}")], &result, Duration::ZERO))
                .unwrap();
        }

        let history = RunHistory::new(&path);
        let last = history.read_last(2).unwrap();
        assert_eq!(last.len(), 2);
        assert_eq!(last[1].endpoints, vec!["E4"]);

        let timeouts = history.filter_by_outcome(RunOutcome::TimedOut).unwrap();
        assert_eq!(timeouts.len(), 2);
    }

    #[test]
    fn test_skips_malformed_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("runs.jsonl");
        let mut logger = RunLogger::new(&path);
        logger
            .log(&RunRecord::new(vec![], &ok(), Duration::ZERO))
            .unwrap();
        drop(logger);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file).unwrap();

        let records = RunHistory::new(&path).read_all().unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_missing_history_is_empty() {
        let tmp = TempDir::new().unwrap();
        let history = RunHistory::new(tmp.path().join("none.jsonl"));
        assert!(!history.exists());
        assert!(history.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_creates_parent_directory() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/runs.jsonl");
        let mut logger = RunLogger::new(&path);
        logger
            .log(&RunRecord::new(vec![], &ok(), Duration::ZERO))
            .unwrap();
        assert!(path.exists());
        assert_eq!(logger.path(), path.as_path());
    }

    #[test]
    fn test_detail_truncation() {
        let result: Result<(), ScenarioError> = Err(ScenarioError::AssertionsFailed {
            report: "é".repeat(5000),
        });
        let record = RunRecord::new(vec![], &result, Duration::ZERO);
        let detail = record.detail.unwrap();
        assert!(detail.contains("[truncated, 5000 chars total]"));
        assert!(detail.len() < 5000);
    }
}
