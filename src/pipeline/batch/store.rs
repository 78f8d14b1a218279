//! Run artifacts on disk.
//!
//! ```text
//! <results>/run_<YYYYmmdd_HHMMSS>_<n>_claims/
//!     claim_<id>.json
//!     summary.json
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use super::types::{ClaimResult, RunListing, RunSummary};

const SUMMARY_FILE: &str = "summary.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt artifact {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Invalid run id: {0}")]
    InvalidRunId(String),

    #[error("Run {0} not found")]
    RunNotFound(String),

    #[error("Summary not found for run {0}")]
    SummaryNotFound(String),
}

/// Directory of one batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDir {
    pub run_id: String,
    pub path: PathBuf,
}

/// Reads and writes run artifacts under the results directory.
#[derive(Debug, Clone)]
pub struct RunStore {
    root: PathBuf,
}

impl RunStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `run_<YYYYmmdd_HHMMSS>_<n>_claims`
    pub fn run_id_for(started: DateTime<Local>, claim_count: usize) -> String {
        format!("run_{}_{}_claims", started.format("%Y%m%d_%H%M%S"), claim_count)
    }

    /// Create a fresh run directory. A batch never reuses another batch's
    /// directory: on a name collision the id gets a `_2`, `_3`, ... suffix.
    pub fn create_run(&self, started: DateTime<Local>, claim_count: usize) -> Result<RunDir, StoreError> {
        std::fs::create_dir_all(&self.root).map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })?;

        let base = Self::run_id_for(started, claim_count);
        let mut attempt = 1u32;
        loop {
            let run_id = if attempt == 1 {
                base.clone()
            } else {
                format!("{base}_{attempt}")
            };
            let path = self.root.join(&run_id);
            match std::fs::create_dir(&path) {
                Ok(()) => {
                    tracing::info!(run_id = %run_id, path = %path.display(), "Run directory created");
                    return Ok(RunDir { run_id, path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(source) => return Err(StoreError::Io { path, source }),
            }
        }
    }

    pub fn write_claim(&self, run: &RunDir, result: &ClaimResult) -> Result<PathBuf, StoreError> {
        let path = run.path.join(format!("claim_{}.json", result.claim_number));
        write_json(&path, result)?;
        Ok(path)
    }

    pub fn write_summary(&self, run: &RunDir, summary: &RunSummary) -> Result<PathBuf, StoreError> {
        let path = run.path.join(SUMMARY_FILE);
        write_json(&path, summary)?;
        Ok(path)
    }

    /// Run directory names, newest first. Names embed the start time, so
    /// descending name order is descending time order.
    fn run_ids(&self) -> Result<Vec<String>, StoreError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut ids: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(ids)
    }

    /// Every run that has a readable summary, newest first.
    pub fn list_runs(&self) -> Result<Vec<RunListing>, StoreError> {
        let mut runs = Vec::new();
        for run_id in self.run_ids()? {
            let path = self.root.join(&run_id).join(SUMMARY_FILE);
            if !path.is_file() {
                continue;
            }
            match read_json::<RunSummary>(&path) {
                Ok(summary) => runs.push(RunListing {
                    run_id,
                    timestamp: summary.run_timestamp,
                    claims_count: summary.statistics.total_claims,
                    accuracy: summary.statistics.accuracy,
                    statistics: summary.statistics,
                }),
                Err(e) => tracing::warn!(run_id = %run_id, error = %e, "Skipping unreadable run summary"),
            }
        }
        Ok(runs)
    }

    pub fn load_summary(&self, run_id: &str) -> Result<RunSummary, StoreError> {
        validate_run_id(run_id)?;
        let dir = self.root.join(run_id);
        if !dir.is_dir() {
            return Err(StoreError::RunNotFound(run_id.to_string()));
        }
        let path = dir.join(SUMMARY_FILE);
        if !path.is_file() {
            return Err(StoreError::SummaryNotFound(run_id.to_string()));
        }
        let mut summary: RunSummary = read_json(&path)?;
        if summary.run_id.is_empty() {
            summary.run_id = run_id.to_string();
        }
        Ok(summary)
    }

    /// Result for `claim_id` from the newest run that contains it.
    pub fn latest_claim_result(&self, claim_id: u32) -> Result<Option<ClaimResult>, StoreError> {
        let filename = format!("claim_{claim_id}.json");
        for run_id in self.run_ids()? {
            let path = self.root.join(&run_id).join(&filename);
            if path.is_file() {
                return read_json(&path).map(Some);
            }
        }
        Ok(None)
    }
}

/// Run ids are single path components; anything that could escape the
/// results directory is rejected.
fn validate_run_id(run_id: &str) -> Result<(), StoreError> {
    let invalid = run_id.is_empty()
        || run_id == "."
        || run_id.contains("..")
        || run_id.contains('/')
        || run_id.contains('\\');
    if invalid {
        return Err(StoreError::InvalidRunId(run_id.to_string()));
    }
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let raw = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::batch::types::{BatchItem, ClaimData, ClaimError, Stats};
    use crate::pipeline::decision::{Decision, DecisionKind};
    use chrono::{TimeZone, Utc};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 14, h, m, s).unwrap()
    }

    fn claim(n: u32, decision: DecisionKind) -> ClaimResult {
        ClaimResult {
            claim_number: n,
            timestamp: Utc::now(),
            claim_data: ClaimData {
                description: format!("claim {n}"),
                documents: vec![],
            },
            image_metadata: vec![],
            llm_decision: Decision::new(decision, "because"),
            expected_answer: None,
            matches_expected: None,
        }
    }

    fn summary(run_id: &str, items: Vec<BatchItem>) -> RunSummary {
        let mut statistics = Stats::new(items.len() as u32);
        for item in &items {
            statistics.record(item);
        }
        RunSummary {
            run_id: run_id.to_string(),
            run_timestamp: Utc::now(),
            claims_processed: items.iter().map(BatchItem::claim_number).collect(),
            verification_enabled: false,
            cancelled: false,
            statistics,
            results: items,
        }
    }

    #[test]
    fn run_id_format() {
        assert_eq!(RunStore::run_id_for(at(9, 5, 7), 3), "run_20250314_090507_3_claims");
    }

    #[test]
    fn create_run_makes_nested_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RunStore::new(tmp.path().join("results"));
        let run = store.create_run(at(10, 0, 0), 2).unwrap();
        assert!(run.path.is_dir());
        assert_eq!(run.run_id, "run_20250314_100000_2_claims");
    }

    #[test]
    fn same_second_runs_get_distinct_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RunStore::new(tmp.path());
        let first = store.create_run(at(10, 0, 0), 1).unwrap();
        let second = store.create_run(at(10, 0, 0), 1).unwrap();
        let third = store.create_run(at(10, 0, 0), 1).unwrap();

        assert_eq!(first.run_id, "run_20250314_100000_1_claims");
        assert_eq!(second.run_id, "run_20250314_100000_1_claims_2");
        assert_eq!(third.run_id, "run_20250314_100000_1_claims_3");

        store.write_claim(&first, &claim(1, DecisionKind::Approve)).unwrap();
        store.write_claim(&second, &claim(2, DecisionKind::Deny)).unwrap();
        store
            .write_summary(&first, &summary(&first.run_id, vec![BatchItem::Completed(Box::new(claim(1, DecisionKind::Approve)))]))
            .unwrap();
        store
            .write_summary(&second, &summary(&second.run_id, vec![BatchItem::Completed(Box::new(claim(2, DecisionKind::Deny)))]))
            .unwrap();

        assert!(!second.path.join("claim_1.json").exists());
        assert_eq!(store.load_summary(&first.run_id).unwrap().claims_processed, vec![1]);
        assert_eq!(store.load_summary(&second.run_id).unwrap().claims_processed, vec![2]);
        assert_eq!(store.list_runs().unwrap().len(), 2);
    }

    #[test]
    fn claim_artifact_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RunStore::new(tmp.path());
        let run = store.create_run(at(10, 0, 0), 1).unwrap();
        let path = store.write_claim(&run, &claim(4, DecisionKind::Deny)).unwrap();
        assert!(path.ends_with("claim_4.json"));

        let loaded = store.latest_claim_result(4).unwrap().unwrap();
        assert_eq!(loaded.llm_decision.decision, DecisionKind::Deny);
        assert!(store.latest_claim_result(5).unwrap().is_none());
    }

    #[test]
    fn latest_claim_prefers_newest_run() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RunStore::new(tmp.path());
        let old = store.create_run(at(8, 0, 0), 1).unwrap();
        let new = store.create_run(at(12, 0, 0), 1).unwrap();
        store.write_claim(&old, &claim(2, DecisionKind::Approve)).unwrap();
        store.write_claim(&new, &claim(2, DecisionKind::Deny)).unwrap();

        let loaded = store.latest_claim_result(2).unwrap().unwrap();
        assert_eq!(loaded.llm_decision.decision, DecisionKind::Deny);
    }

    #[test]
    fn list_runs_newest_first_and_skips_incomplete() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RunStore::new(tmp.path());
        let first = store.create_run(at(8, 0, 0), 1).unwrap();
        let second = store.create_run(at(9, 0, 0), 2).unwrap();
        store.create_run(at(10, 0, 0), 1).unwrap(); // no summary yet

        store
            .write_summary(&first, &summary(&first.run_id, vec![BatchItem::Completed(Box::new(claim(1, DecisionKind::Approve)))]))
            .unwrap();
        store
            .write_summary(
                &second,
                &summary(&second.run_id, vec![BatchItem::Failed(ClaimError::new(3, "x")), BatchItem::Failed(ClaimError::new(4, "y"))]),
            )
            .unwrap();

        let runs = store.list_runs().unwrap();
        let ids: Vec<_> = runs.iter().map(|r| r.run_id.as_str()).collect();
        assert_eq!(ids, vec![second.run_id.as_str(), first.run_id.as_str()]);
        assert_eq!(runs[0].claims_count, 2);
        assert_eq!(runs[0].statistics.failed, 2);
    }

    #[test]
    fn list_runs_on_missing_root_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RunStore::new(tmp.path().join("never-created"));
        assert!(store.list_runs().unwrap().is_empty());
        assert!(store.latest_claim_result(1).unwrap().is_none());
    }

    #[test]
    fn load_summary_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RunStore::new(tmp.path());
        let run = store.create_run(at(8, 0, 0), 1).unwrap();

        assert!(matches!(store.load_summary("run_missing"), Err(StoreError::RunNotFound(_))));
        assert!(matches!(store.load_summary(&run.run_id), Err(StoreError::SummaryNotFound(_))));
        for bad in ["", "..", "../etc", "a/b", "a\\b"] {
            assert!(matches!(store.load_summary(bad), Err(StoreError::InvalidRunId(_))), "{bad}");
        }

        std::fs::write(run.path.join("summary.json"), "{broken").unwrap();
        assert!(matches!(store.load_summary(&run.run_id), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn load_summary_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RunStore::new(tmp.path());
        let run = store.create_run(at(8, 0, 0), 1).unwrap();
        let written = summary(&run.run_id, vec![BatchItem::Completed(Box::new(claim(1, DecisionKind::Uncertain)))]);
        store.write_summary(&run, &written).unwrap();

        let loaded = store.load_summary(&run.run_id).unwrap();
        assert_eq!(loaded, written);
    }
}
