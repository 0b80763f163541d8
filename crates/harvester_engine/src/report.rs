use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use harvester_core::RunSummary;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("could not encode report: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupReport {
    pub group_key: String,
    pub attempted: u64,
    pub saved: u64,
    pub merged: u64,
    pub skipped: u64,
    pub misses: u64,
    pub rounds: u64,
    pub running_total: u64,
    pub stop_reason: String,
}

impl From<&RunSummary> for GroupReport {
    fn from(summary: &RunSummary) -> Self {
        Self {
            group_key: summary.group_key.clone(),
            attempted: summary.attempted_count,
            saved: summary.saved_count,
            merged: summary.merged_count,
            skipped: summary.skipped_count,
            misses: summary.miss_count,
            rounds: summary.rounds,
            running_total: summary.running_total,
            stop_reason: summary.stop_reason.code().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_saved: u64,
    pub groups: Vec<GroupReport>,
}

impl RunReport {
    pub fn new(
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        summaries: &[RunSummary],
    ) -> Self {
        Self {
            started_at,
            finished_at,
            total_saved: summaries.iter().map(|s| s.saved_count).sum(),
            groups: summaries.iter().map(GroupReport::from).collect(),
        }
    }
}

/// Ensure the directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), ReportError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| ReportError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(ReportError::OutputDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| ReportError::OutputDir(e.to_string()))?;
    }
    Ok(())
}

/// Atomically writes the report as pretty JSON: temp file in the target
/// directory, then rename.
pub fn write_report(path: &Path, report: &RunReport) -> Result<PathBuf, ReportError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    ensure_output_dir(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    serde_json::to_writer_pretty(&mut tmp, report)?;
    tmp.write_all(b"\n")?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;

    tmp.persist(path).map_err(|e| ReportError::Io(e.error))?;
    Ok(path.to_path_buf())
}
