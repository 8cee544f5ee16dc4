//! Portfolio state snapshots
//!
//! Each ledger component serializes to an independent JSON blob; the
//! portfolio composes them into one bundle written to disk. A restore that
//! cannot parse a sub-blob leaves that component at its pre-restore value.

use crate::error::{PolysimError, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Trait for components whose state round-trips through JSON
pub trait Checkpointable {
    /// Component name used as the key inside the bundle
    fn component_name(&self) -> &str;

    /// Serialize current state to JSON
    fn to_checkpoint(&self) -> serde_json::Value;

    /// Restore state from a checkpoint blob.
    ///
    /// Must never panic; on a parse failure the implementation returns Err
    /// and leaves its in-memory state untouched.
    fn from_checkpoint(&mut self, data: &serde_json::Value) -> std::result::Result<(), String>;
}

/// File-backed store for the serialized portfolio bundle
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist a component's bundle. Writes to a temp file first so a crash
    /// mid-write cannot corrupt the previous snapshot.
    pub fn save<T: Checkpointable>(&self, component: &T) -> Result<()> {
        let bundle = serde_json::json!({
            "component": component.component_name(),
            "saved_at": Utc::now(),
            "state": component.to_checkpoint(),
        });

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&bundle)?)?;
        fs::rename(&tmp, &self.path)?;

        info!("Saved {} checkpoint to {}", component.component_name(), self.path.display());
        Ok(())
    }

    /// Restore a component from disk. A missing file is a fresh start, not
    /// an error; a malformed file is reported and the component keeps its
    /// prior state.
    pub fn load<T: Checkpointable>(&self, component: &mut T) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }

        let raw = fs::read_to_string(&self.path)?;
        let bundle: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| PolysimError::Checkpoint(format!("unreadable checkpoint: {e}")))?;

        let state = bundle
            .get("state")
            .ok_or_else(|| PolysimError::Checkpoint("checkpoint missing state field".into()))?;

        match component.from_checkpoint(state) {
            Ok(()) => {
                info!(
                    "Restored {} checkpoint from {}",
                    component.component_name(),
                    self.path.display()
                );
                Ok(true)
            }
            Err(e) => {
                warn!("Checkpoint restore failed, keeping in-memory state: {e}");
                Err(PolysimError::Checkpoint(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        value: u64,
    }

    impl Checkpointable for Counter {
        fn component_name(&self) -> &str {
            "counter"
        }

        fn to_checkpoint(&self) -> serde_json::Value {
            serde_json::json!({ "value": self.value })
        }

        fn from_checkpoint(&mut self, data: &serde_json::Value) -> std::result::Result<(), String> {
            let value = data
                .get("value")
                .and_then(|v| v.as_u64())
                .ok_or_else(|| "missing value".to_string())?;
            self.value = value;
            Ok(())
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = std::env::temp_dir().join("polysim-ckpt-test");
        let store = FileStateStore::new(dir.join("counter.json"));

        let original = Counter { value: 42 };
        store.save(&original).unwrap();

        let mut restored = Counter { value: 0 };
        assert!(store.load(&mut restored).unwrap());
        assert_eq!(restored.value, 42);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_file_is_fresh_start() {
        let store = FileStateStore::new("/nonexistent/polysim/nothing.json");
        let mut counter = Counter { value: 7 };
        assert!(!store.load(&mut counter).unwrap());
        assert_eq!(counter.value, 7);
    }

    #[test]
    fn test_malformed_state_keeps_prior_value() {
        let dir = std::env::temp_dir().join("polysim-ckpt-bad");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("counter.json");
        std::fs::write(&path, r#"{"state": {"value": "not-a-number"}}"#).unwrap();

        let store = FileStateStore::new(&path);
        let mut counter = Counter { value: 7 };
        assert!(store.load(&mut counter).is_err());
        assert_eq!(counter.value, 7);

        std::fs::remove_dir_all(&dir).ok();
    }
}
