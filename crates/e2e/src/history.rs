//! Run history - timestamped session directories, the `latest` alias and retention

use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::E2eResult;

/// Name of the alias pointing at the newest session
pub const LATEST: &str = "latest";

const ID_FORMAT: &str = "%Y%m%d%H%M%S";

/// Largest suffix that keeps same-second identifiers sortable
const MAX_SUFFIX: u32 = 999;

/// One invocation of the runner and the directory that holds its artifacts
#[derive(Debug, Clone, Serialize)]
pub struct RunSession {
    pub id: String,
    pub directory: PathBuf,
}

impl RunSession {
    /// Create the working directory for one environment
    pub fn environment_dir(&self, name: &str) -> E2eResult<PathBuf> {
        let dir = self.directory.join(name);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// A session directory found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirectoryEntry {
    pub identifier: String,
    pub path: PathBuf,
}

/// Session directories under a fixed root
#[derive(Debug, Clone)]
pub struct RunHistoryStore {
    root: PathBuf,
}

impl RunHistoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Allocate a new session directory and point `latest` at it
    pub fn begin_session(&self) -> E2eResult<RunSession> {
        std::fs::create_dir_all(&self.root)?;

        let base = Local::now().format(ID_FORMAT).to_string();
        let id = self.next_id(&base)?;
        let directory = self.root.join(&id);
        std::fs::create_dir(&directory)?;
        self.point_latest(&id)?;

        info!("Session {} at {}", id, directory.display());
        Ok(RunSession { id, directory })
    }

    /// First free identifier for `base`. Same-second sessions get a
    /// `-NNN` suffix that still sorts after the base.
    fn next_id(&self, base: &str) -> E2eResult<String> {
        if !self.root.join(base).exists() {
            return Ok(base.to_string());
        }
        (1..=MAX_SUFFIX)
            .map(|suffix| format!("{}-{:03}", base, suffix))
            .find(|id| !self.root.join(id).exists())
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("more than {} sessions started at {}", MAX_SUFFIX, base),
                )
                .into()
            })
    }

    /// Replace the `latest` symlink via rename so it is never missing
    fn point_latest(&self, id: &str) -> E2eResult<()> {
        let tmp = self.root.join(format!(".{}.{}", LATEST, id));
        if tmp.symlink_metadata().is_ok() {
            std::fs::remove_file(&tmp)?;
        }
        std::os::unix::fs::symlink(id, &tmp)?;
        std::fs::rename(&tmp, self.root.join(LATEST))?;
        Ok(())
    }

    /// Where `latest` currently points
    pub fn latest(&self) -> Option<PathBuf> {
        std::fs::read_link(self.root.join(LATEST))
            .ok()
            .map(|target| self.root.join(target))
    }

    /// Session directories, newest first. The alias is not an entry.
    pub fn entries(&self) -> Vec<RunDirectoryEntry> {
        let mut entries: Vec<RunDirectoryEntry> = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir())
            .filter_map(|entry| {
                let identifier = entry.file_name().to_str()?.to_string();
                if identifier == LATEST || identifier.starts_with('.') {
                    return None;
                }
                Some(RunDirectoryEntry {
                    identifier,
                    path: entry.into_path(),
                })
            })
            .collect();

        entries.sort_by(|a, b| b.identifier.cmp(&a.identifier));
        entries
    }

    /// Remove every session beyond the newest `cap`, never touching
    /// `protect`. Removal failures are logged and skipped.
    pub fn prune(&self, cap: usize, protect: Option<&Path>) -> Vec<PathBuf> {
        let stale: Vec<RunDirectoryEntry> = self.entries().into_iter().skip(cap).collect();
        remove_entries(stale, protect)
    }
}

/// Recursively remove each entry except `protect`, continuing past failures.
/// Returns the paths actually removed.
fn remove_entries(entries: Vec<RunDirectoryEntry>, protect: Option<&Path>) -> Vec<PathBuf> {
    let mut removed = Vec::new();

    for entry in entries {
        if protect == Some(entry.path.as_path()) {
            debug!("Keeping in-progress session {}", entry.identifier);
            continue;
        }

        info!("Cleaning up {}", entry.path.display());
        match std::fs::remove_dir_all(&entry.path) {
            Ok(()) => removed.push(entry.path),
            Err(e) => warn!("Failed to remove {}: {}", entry.path.display(), e),
        }
    }

    removed
}
