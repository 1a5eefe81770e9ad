//! File-backed trace storage.
//!
//! Each sealed trace is one pretty-printed JSON file under a directory named
//! for the day the run started:
//!
//! ```text
//! {root}/
//!   2026-10-19/
//!     {run_id}.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::{RunTrace, TraceId};

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("No stored trace with id {0}")]
    NotFound(TraceId),

    #[error("Trace {0} was modified after it was sealed")]
    Tampered(TraceId),

    #[error("Trace is not sealed yet")]
    Unsealed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct FileTraceStore {
    root: PathBuf,
}

impl FileTraceStore {
    /// Open a store at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, TraceError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Write a sealed trace and return the file it landed in.
    pub fn save(&self, trace: &RunTrace) -> Result<PathBuf, TraceError> {
        if trace.content_hash.is_none() {
            return Err(TraceError::Unsealed);
        }
        let day = self.root.join(trace.started_at.format("%Y-%m-%d").to_string());
        fs::create_dir_all(&day)?;
        let path = day.join(format!("{}.json", trace.id));
        fs::write(&path, serde_json::to_vec_pretty(trace)?)?;
        Ok(path)
    }

    /// Load one trace, refusing it if its content no longer matches the seal.
    pub fn load(&self, id: TraceId) -> Result<RunTrace, TraceError> {
        let filename = format!("{id}.json");
        let path = self
            .day_dirs()?
            .into_iter()
            .map(|day| day.join(&filename))
            .find(|path| path.is_file())
            .ok_or(TraceError::NotFound(id))?;
        let trace = read_trace(&path)?;
        if !trace.verify_integrity() {
            return Err(TraceError::Tampered(id));
        }
        Ok(trace)
    }

    /// Every stored run of a session, newest first. Unreadable files are skipped.
    pub fn for_session(&self, session_id: &str) -> Result<Vec<RunTrace>, TraceError> {
        let mut traces = Vec::new();
        for day in self.day_dirs()? {
            for entry in fs::read_dir(&day)?.flatten() {
                let path = entry.path();
                if path.extension().map_or(true, |ext| ext != "json") {
                    continue;
                }
                match read_trace(&path) {
                    Ok(trace) if trace.session_id == session_id => traces.push(trace),
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable trace");
                    }
                }
            }
        }
        traces.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(traces)
    }

    /// Day directories, most recent first.
    fn day_dirs(&self) -> Result<Vec<PathBuf>, TraceError> {
        let mut days: Vec<PathBuf> = fs::read_dir(&self.root)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        days.sort_unstable_by(|a, b| b.cmp(a));
        Ok(days)
    }
}

fn read_trace(path: &Path) -> Result<RunTrace, TraceError> {
    Ok(serde_json::from_slice(&fs::read(path)?)?)
}
