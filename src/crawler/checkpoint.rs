//! Crawl checkpoints
//!
//! A checkpoint captures the frontier (seen-set and pending queue) together
//! with the crawl counters so an interrupted crawl can resume where it
//! stopped. Files are JSON and are replaced atomically.

use crate::crawler::scheduler::{QueuedRequest, SchedulerState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Checkpoint serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CheckpointResult<T> = std::result::Result<T, CheckpointError>;

/// Snapshot of a crawl in progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub pages_crawled: usize,

    /// Normalized URLs in insertion order, oldest first
    #[serde(default)]
    pub seen_urls: Vec<String>,

    /// Pending requests in pop order
    #[serde(default)]
    pub pending_queue: Vec<QueuedRequest>,

    /// Next sink batch number
    #[serde(default)]
    pub batch_number: u64,

    /// Hash of the config file the crawl was started with
    #[serde(default)]
    pub config_hash: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        pages_crawled: usize,
        frontier: SchedulerState,
        batch_number: u64,
        config_hash: Option<String>,
    ) -> Self {
        Self {
            pages_crawled,
            seen_urls: frontier.seen_urls,
            pending_queue: frontier.pending,
            batch_number,
            config_hash,
            timestamp: Utc::now(),
        }
    }

    /// The frontier part of the checkpoint
    pub fn scheduler_state(&self) -> SchedulerState {
        SchedulerState {
            seen_urls: self.seen_urls.clone(),
            pending: self.pending_queue.clone(),
        }
    }

    /// Writes the checkpoint to a uniquely named temporary file in the same
    /// directory and renames it into place
    ///
    /// Concurrent saves to one path never share a temporary file; the last
    /// rename wins.
    pub fn save(&self, path: &Path) -> CheckpointResult<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let encoded = serde_json::to_vec_pretty(self)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&encoded)?;
        tmp.persist(path).map_err(|e| e.error)?;

        debug!(
            "Checkpoint saved to {} ({} pages, {} pending)",
            path.display(),
            self.pages_crawled,
            self.pending_queue.len()
        );
        Ok(())
    }

    pub fn load(path: &Path) -> CheckpointResult<Self> {
        let content = fs::read(path)?;
        let checkpoint: Checkpoint = serde_json::from_slice(&content)?;

        info!(
            "Loaded checkpoint from {} ({} pages crawled, {} pending, saved {})",
            path.display(),
            checkpoint.pages_crawled,
            checkpoint.pending_queue.len(),
            checkpoint.timestamp.to_rfc3339()
        );
        Ok(checkpoint)
    }

    /// Loads the checkpoint if the file exists
    pub fn load_if_exists(path: &Path) -> CheckpointResult<Option<Self>> {
        match Self::load(path) {
            Ok(checkpoint) => Ok(Some(checkpoint)),
            Err(CheckpointError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Removes the checkpoint file; a missing file is not an error
    pub fn delete(path: &Path) -> CheckpointResult<bool> {
        match fs::remove_file(path) {
            Ok(()) => {
                info!("Removed checkpoint {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::scheduler::Scheduler;
    use crate::state::CrawlRequest;
    use tempfile::TempDir;

    fn frontier() -> SchedulerState {
        let scheduler = Scheduler::new(100, 100);
        scheduler.add(CrawlRequest::new("https://example.com/a").with_priority(1));
        scheduler.add(CrawlRequest::new("https://example.com/b").with_depth(2));
        scheduler.add(CrawlRequest::new("https://example.com/c").with_priority(5));
        scheduler.get_nowait();
        scheduler.get_state()
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("checkpoint.json");

        let checkpoint = Checkpoint::new(7, frontier(), 3, Some("abc".to_string()));
        checkpoint.save(&path).unwrap();

        let loaded = Checkpoint::load(&path).unwrap();
        assert_eq!(loaded, checkpoint);
        assert_eq!(loaded.seen_urls.len(), 3);
        assert_eq!(loaded.pending_queue.len(), 2);
        assert_eq!(loaded.pending_queue[0].request.url, "https://example.com/a");
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("checkpoint.json")]);
    }

    #[test]
    fn test_save_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");

        Checkpoint::new(1, SchedulerState::default(), 0, None)
            .save(&path)
            .unwrap();
        Checkpoint::new(2, frontier(), 1, None).save(&path).unwrap();

        assert_eq!(Checkpoint::load(&path).unwrap().pages_crawled, 2);
    }

    #[test]
    fn test_concurrent_saves_to_one_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");

        let handles: Vec<_> = (0..8)
            .map(|writer| {
                let path = path.clone();
                std::thread::spawn(move || {
                    for round in 0..20 {
                        Checkpoint::new(writer * 100 + round, frontier(), 0, None)
                            .save(&path)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let loaded = Checkpoint::load(&path).unwrap();
        assert_eq!(loaded.pending_queue.len(), 2);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_json_layout() {
        let checkpoint = Checkpoint::new(4, frontier(), 0, None);
        let json: serde_json::Value = serde_json::to_value(&checkpoint).unwrap();

        for key in [
            "pages_crawled",
            "seen_urls",
            "pending_queue",
            "batch_number",
            "config_hash",
            "timestamp",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        let first = &json["pending_queue"][0];
        assert!(first.get("priority").is_some());
        assert!(first.get("sequence").is_some());
        assert_eq!(first["request"]["url"], "https://example.com/a");
    }

    #[test]
    fn test_restored_frontier_keeps_order() {
        let state = frontier();
        let checkpoint = Checkpoint::new(1, state.clone(), 0, None);

        let restored = Scheduler::new(100, 100);
        restored.restore_state(checkpoint.scheduler_state());
        assert_eq!(restored.get_state(), state);
        assert!(!restored.add(CrawlRequest::new("https://example.com/c")));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("none.json");

        assert!(Checkpoint::load_if_exists(&path).unwrap().is_none());
        assert!(!Checkpoint::delete(&path).unwrap());
        assert!(matches!(Checkpoint::load(&path), Err(CheckpointError::Io(_))));
    }

    #[test]
    fn test_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(Checkpoint::load(&path), Err(CheckpointError::Json(_))));
    }

    #[test]
    fn test_delete() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");
        Checkpoint::new(0, SchedulerState::default(), 0, None)
            .save(&path)
            .unwrap();
        assert!(Checkpoint::delete(&path).unwrap());
        assert!(!path.exists());
    }
}
