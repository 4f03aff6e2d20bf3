//! Per-run error log: JSON lines at `data/<batch_id>/errors.log`.
//!
//! Shared by every stage through a cheap clone. Records are appended as
//! they happen; counters back the end-of-run summary and the CLI exit
//! code decision.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ErrorKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub stage: String,
    pub source: String,
    pub kind: ErrorKind,
    pub message: String,
}

struct Inner {
    file: Option<File>,
    counts: BTreeMap<ErrorKind, u64>,
    failed_sources: Vec<String>,
}

#[derive(Clone)]
pub struct ErrorLog {
    inner: Arc<Mutex<Inner>>,
}

impl ErrorLog {
    /// Open (append) the log file under the batch directory. Logging
    /// failures are not themselves fatal; a sink-less log still counts.
    pub fn open(batch_dir: &Path) -> Self {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(batch_dir.join("errors.log"))
            .map_err(|e| warn!(error = %e, "Cannot open errors.log, counting only"))
            .ok();
        Self {
            inner: Arc::new(Mutex::new(Inner {
                file,
                counts: BTreeMap::new(),
                failed_sources: Vec::new(),
            })),
        }
    }

    /// In-memory log for tests and the standalone scraper.
    pub fn discard() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                file: None,
                counts: BTreeMap::new(),
                failed_sources: Vec::new(),
            })),
        }
    }

    pub fn record(&self, stage: &str, source: &str, kind: ErrorKind, message: impl Into<String>) {
        let record = ErrorRecord {
            timestamp: Utc::now(),
            stage: stage.to_string(),
            source: source.to_string(),
            kind,
            message: message.into(),
        };
        let mut inner = self.inner.lock().expect("error log poisoned");
        *inner.counts.entry(kind).or_insert(0) += 1;
        if kind == ErrorKind::Source {
            inner.failed_sources.push(source.to_string());
        }
        if let Some(file) = inner.file.as_mut() {
            if let Ok(line) = serde_json::to_string(&record) {
                let _ = writeln!(file, "{line}");
            }
        }
    }

    pub fn counts(&self) -> BTreeMap<ErrorKind, u64> {
        self.inner.lock().expect("error log poisoned").counts.clone()
    }

    pub fn total(&self) -> u64 {
        self.counts().values().sum()
    }

    /// Number of sources that failed outright (fetch or parse).
    pub fn failed_source_count(&self) -> usize {
        self.inner
            .lock()
            .expect("error log poisoned")
            .failed_sources
            .len()
    }
}
