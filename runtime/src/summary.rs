//! JSONL summary log — one record per harvest cycle.
//!
//! Append-only, rotated when the file exceeds `MAX_LOG_SIZE` (10 MB).
//! Rotated files are named `.1`, `.2`, ... (max 5 rotations).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use marketsweep::{HarvestPhase, InterceptStats, SessionCounts};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Maximum summary log size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated log files to keep.
const MAX_ROTATIONS: u32 = 5;

/// Counters persisted at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestSummary {
    pub run_id: String,
    pub scope: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
    /// `complete` or `error`.
    pub phase: HarvestPhase,
    pub counts: SessionCounts,
    pub intercept: InterceptStats,
    /// Most recent error-log line, if any.
    pub last_error: Option<String>,
}

impl HarvestSummary {
    pub fn succeeded(&self) -> bool {
        self.phase == HarvestPhase::Complete
    }
}

/// Append-only JSONL log of [`HarvestSummary`] records.
pub struct SummaryLog {
    file: File,
    path: PathBuf,
    /// Approximate current size (re-checked on rotation).
    current_size: u64,
    max_size: u64,
}

impl SummaryLog {
    /// Open or create the log file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open summary log: {}", path.display()))?;

        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            current_size,
            max_size: MAX_LOG_SIZE,
        })
    }

    /// Override the rotation threshold.
    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one summary.
    pub fn append(&mut self, summary: &HarvestSummary) -> Result<()> {
        if self.current_size >= self.max_size {
            self.rotate()?;
        }

        let json = serde_json::to_string(summary)?;
        writeln!(self.file, "{json}").context("failed to write summary")?;
        self.current_size += json.len() as u64 + 1;
        Ok(())
    }

    /// Rotate: summaries.jsonl → .1, .1 → .2, etc.
    fn rotate(&mut self) -> Result<()> {
        self.file.flush()?;

        for i in (1..MAX_ROTATIONS).rev() {
            let from = rotation_path(&self.path, i);
            let to = rotation_path(&self.path, i + 1);
            if from.exists() {
                let _ = std::fs::rename(&from, &to);
            }
        }

        let _ = std::fs::rename(&self.path, rotation_path(&self.path, 1));

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| "failed to reopen summary log after rotation")?;
        self.current_size = 0;

        Ok(())
    }
}

/// Read the newest `limit` summaries from the live log file, newest first.
///
/// Lines that fail to parse are skipped.
pub fn read_recent(path: &Path, limit: usize) -> Result<Vec<HarvestSummary>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)
        .with_context(|| format!("failed to open summary log: {}", path.display()))?;
    let mut summaries: Vec<HarvestSummary> = BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .filter_map(|line| serde_json::from_str(&line).ok())
        .collect();
    summaries.reverse();
    summaries.truncate(limit);
    Ok(summaries)
}

/// Build path for a rotated log file: `summaries.jsonl.1`, `.2`, etc.
fn rotation_path(base: &Path, index: u32) -> PathBuf {
    let name = format!(
        "{}.{index}",
        base.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("summaries.jsonl")
    );
    base.with_file_name(name)
}
