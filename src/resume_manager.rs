use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use chrono::Local;
use serde::{Deserialize, Serialize};
use log::{debug, info, error};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Progress of a run as persisted between sessions.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Checkpoint {
    #[serde(default)]
    pub processed: usize,
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub processed_codes: Vec<String>,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub results_count: usize,
}

impl Checkpoint {
    pub fn new(processed_codes: &HashSet<String>, total: usize, results_count: usize) -> Self {
        let mut codes: Vec<String> = processed_codes.iter().cloned().collect();
        codes.sort();
        Checkpoint {
            processed: codes.len(),
            total,
            processed_codes: codes,
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            results_count,
        }
    }

    pub fn processed_set(&self) -> HashSet<String> {
        self.processed_codes.iter().cloned().collect()
    }
}

/// JSON checkpoint file. Reads and writes never abort the run.
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        CheckpointStore { path: path.into() }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> Option<Checkpoint> {
        if !self.path.exists() {
            info!("No checkpoint found at {:?}. Starting fresh.", self.path);
            return None;
        }
        match self.read() {
            Ok(checkpoint) => {
                info!(
                    "Checkpoint found: {}/{} codes processed (saved {})",
                    checkpoint.processed, checkpoint.total, checkpoint.timestamp
                );
                Some(checkpoint)
            }
            Err(e) => {
                error!("Failed to load checkpoint: {}. Starting fresh.", e);
                None
            }
        }
    }

    fn read(&self) -> Result<Checkpoint, CheckpointError> {
        let content = fs::read_to_string(&self.path).map_err(|source| CheckpointError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Best effort: failures are logged and swallowed.
    pub fn save(&self, processed_codes: &HashSet<String>, total: usize, results_count: usize) {
        let checkpoint = Checkpoint::new(processed_codes, total, results_count);
        match self.write(&checkpoint) {
            Ok(()) => debug!(
                "Checkpoint saved: {}/{} codes, {} rows",
                checkpoint.processed, checkpoint.total, checkpoint.results_count
            ),
            Err(e) => error!("Failed to save checkpoint: {}", e),
        }
    }

    // Written next to the target then renamed, so a kill mid-write leaves the
    // previous checkpoint intact.
    fn write(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let json = serde_json::to_string_pretty(checkpoint)?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, json).map_err(|source| CheckpointError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| CheckpointError::Io {
            path: self.path.clone(),
            source,
        })
    }

    pub fn delete(&self) -> bool {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Checkpoint removed (all codes processed)");
                true
            }
            Err(e) => {
                debug!("Could not remove checkpoint {:?}: {}", self.path, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn set(codes: &[&str]) -> HashSet<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn save_then_load_keeps_progress() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));

        store.save(&set(&["B20", "A00.0"]), 4, 7);
        let loaded = store.load().unwrap();

        assert_eq!(loaded.processed, 2);
        assert_eq!(loaded.total, 4);
        assert_eq!(loaded.results_count, 7);
        assert_eq!(loaded.processed_codes, vec!["A00.0", "B20"]);
        assert_eq!(loaded.processed_set(), set(&["A00.0", "B20"]));
        assert!(!dir.path().join("checkpoint.tmp").exists());
    }

    #[test]
    fn serialized_field_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        CheckpointStore::new(&path).save(&set(&["A01"]), 3, 2);

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        for field in ["processed", "total", "processed_codes", "timestamp", "results_count"] {
            assert!(value.get(field).is_some(), "missing {}", field);
        }
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn missing_or_corrupt_checkpoint_is_absent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let store = CheckpointStore::new(&path);
        assert!(store.load().is_none());

        fs::write(&path, "{ not json").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn partial_checkpoint_defaults_missing_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        fs::write(&path, r#"{"processed_codes": ["A00.0"]}"#).unwrap();

        let loaded = CheckpointStore::new(&path).load().unwrap();
        assert_eq!(loaded.processed_set(), set(&["A00.0"]));
        assert_eq!(loaded.total, 0);
    }

    #[test]
    fn write_failure_is_swallowed() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("missing_dir").join("checkpoint.json"));
        store.save(&set(&["A00.0"]), 1, 0);
        assert!(!store.exists());
    }

    #[test]
    fn delete_removes_file_and_tolerates_absence() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        store.save(&set(&["A00.0"]), 1, 0);
        assert!(store.delete());
        assert!(!store.exists());
        assert!(!store.delete());
    }
}
