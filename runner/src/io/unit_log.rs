//! Per-run log directory: one transcript per launched unit plus `run.json`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::summary::RunSummary;
use crate::core::unit::{UnitId, WorkUnit};
use crate::io::resources::SkippedUnit;

#[derive(Debug, Clone)]
pub struct LogPaths {
    pub dir: PathBuf,
    pub report_path: PathBuf,
}

impl LogPaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            report_path: dir.join("run.json"),
        }
    }

    pub fn unit_log(&self, id: UnitId) -> PathBuf {
        self.dir.join(format!("unit-{}.log", id.0))
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create log dir {}", self.dir.display()))
    }
}

/// Final record of a run, written to `run.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord<'a> {
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
    pub destination: &'a str,
    pub rpc_url: &'a str,
    pub unit_count: u32,
    pub cancelled: bool,
    pub summary: RunSummary,
    pub units: &'a [WorkUnit],
    pub skipped: &'a [SkippedUnit],
}

pub fn write_unit_log(paths: &LogPaths, id: UnitId, transcript: &str) -> Result<PathBuf> {
    let path = paths.unit_log(id);
    fs::write(&path, transcript).with_context(|| format!("write unit log {}", path.display()))?;
    Ok(path)
}

pub fn write_run_record(paths: &LogPaths, record: &RunRecord<'_>) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(record).context("serialize run record")?;
    buf.push('\n');
    fs::write(&paths.report_path, buf)
        .with_context(|| format!("write {}", paths.report_path.display()))
}
