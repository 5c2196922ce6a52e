//! Collaborator contracts around the pipeline.
//!
//! The pipeline itself is stateless; caching and diagnostics belong to the
//! caller. These traits pin down the two seams it relies on.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use log::{debug, warn};

use crate::report::Snapshot;

/// Keyed cache of extraction results, owned by the consuming layer.
///
/// The consumer saves after a successful extraction and serves `load` when
/// no fresh extraction was requested. Nothing here synchronizes: concurrent
/// saves for the same caller race and the last write wins.
pub trait Store {
    fn load(&self, caller_id: &str) -> Option<Snapshot>;
    fn save(&mut self, caller_id: &str, snapshot: &Snapshot);
}

/// A cached snapshot with its sync time.
#[derive(Debug, Clone)]
pub struct CachedRecord {
    pub snapshot: Snapshot,
    pub last_sync: DateTime<Local>,
}

/// In-memory store for tests and single-process callers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, CachedRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When a caller's snapshot was last saved.
    pub fn last_sync(&self, caller_id: &str) -> Option<DateTime<Local>> {
        self.entries.get(caller_id).map(|record| record.last_sync)
    }
}

impl Store for MemoryStore {
    fn load(&self, caller_id: &str) -> Option<Snapshot> {
        self.entries.get(caller_id).map(|record| record.snapshot.clone())
    }

    fn save(&mut self, caller_id: &str, snapshot: &Snapshot) {
        self.entries.insert(
            caller_id.to_string(),
            CachedRecord {
                snapshot: snapshot.clone(),
                last_sync: Local::now(),
            },
        );
    }
}

/// Side channel for raw page bodies. Strictly fire-and-forget: a failing
/// sink must never slow down or fail the pipeline.
pub trait DebugSink {
    fn persist(&self, org_id: &str, body: &str);
}

/// Writes each fetched page under a directory as `yandex_page_<org_id>.html`.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DebugSink for FileSink {
    fn persist(&self, org_id: &str, body: &str) {
        let path = self.dir.join(format!("yandex_page_{}.html", org_id));

        let write = std::fs::create_dir_all(&self.dir).and_then(|_| std::fs::write(&path, body));
        match write {
            Ok(()) => debug!("saved page body to {}", path.display()),
            Err(e) => warn!("failed to persist page for {}: {}", org_id, e),
        }
    }
}
