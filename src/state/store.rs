use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::dataset::{ClassCount, ClassFileIndex};
use crate::core::operations::write_atomic;
use crate::error::StateError;

/// File name of the snapshot inside the output folder
pub const STATE_FILE: &str = "dataset_balance_state.json";

const STATE_VERSION: u32 = 1;

/// Last phase whose effects are reflected in a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancePhase {
    #[default]
    Seed,
    Populate,
    TopUp,
    Evict,
    Complete,
}

impl BalancePhase {
    pub fn as_str(&self) -> &str {
        match self {
            BalancePhase::Seed => "Seed",
            BalancePhase::Populate => "Populate output",
            BalancePhase::TopUp => "Top up from secondary",
            BalancePhase::Evict => "Evict excess",
            BalancePhase::Complete => "Complete",
        }
    }
}

/// Durable snapshot of a balancing run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancerState {
    #[serde(default = "default_version")]
    pub version: u32,
    pub target_count: usize,
    #[serde(default)]
    pub phase: BalancePhase,
    #[serde(default)]
    pub iteration: usize,
    /// Object counts of the output folder
    pub class_counts: ClassCount,
    /// File index of the output folder
    pub output_index: ClassFileIndex,
    /// Annotation files already copied into the output folder
    pub processed_files: BTreeSet<String>,
    #[serde(default)]
    pub updated_at: String,
}

fn default_version() -> u32 {
    STATE_VERSION
}

impl BalancerState {
    pub fn new(target_count: usize) -> Self {
        Self {
            version: STATE_VERSION,
            target_count,
            phase: BalancePhase::Seed,
            iteration: 0,
            class_counts: ClassCount::new(),
            output_index: ClassFileIndex::new(),
            processed_files: BTreeSet::new(),
            updated_at: String::new(),
        }
    }

    pub fn is_processed(&self, file_name: &str) -> bool {
        self.processed_files.contains(file_name)
    }

    pub fn mark_processed(&mut self, file_name: &str) {
        self.processed_files.insert(file_name.to_string());
    }
}

/// Loads and saves `BalancerState` snapshots at a fixed path
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store rooted in the output folder
    pub fn new(output_folder: &Path) -> Self {
        Self {
            path: output_folder.join(STATE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last snapshot. A missing file is `Ok(None)`.
    pub fn load(&self) -> Result<Option<BalancerState>, StateError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No saved state found at {:?}. Starting fresh.", self.path);
                return Ok(None);
            }
            Err(e) => {
                return Err(StateError::Read {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        let state: BalancerState =
            serde_json::from_str(&contents).map_err(|e| StateError::Corrupt {
                path: self.path.clone(),
                source: e,
            })?;

        if state.version != STATE_VERSION {
            warn!(
                "State snapshot version {} differs from {}; loading anyway",
                state.version, STATE_VERSION
            );
        }
        info!(
            "Loaded state from {:?} (phase: {}, iteration {}, {} processed files)",
            self.path,
            state.phase.as_str(),
            state.iteration,
            state.processed_files.len()
        );
        Ok(Some(state))
    }

    /// Write a complete snapshot, replacing the previous one atomically.
    pub fn save(&self, state: &BalancerState) -> Result<(), StateError> {
        let mut snapshot = state.clone();
        snapshot.updated_at = chrono::Local::now().to_rfc3339();

        let json = serde_json::to_string_pretty(&snapshot)?;
        write_atomic(&self.path, json.as_bytes())?;
        debug!("Saved state snapshot to {:?}", self.path);
        Ok(())
    }

    /// Delete the snapshot if present.
    pub fn clear(&self) -> std::io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Removed state snapshot {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dataset::FileClassCounts;

    fn sample_state() -> BalancerState {
        let mut state = BalancerState::new(300);
        state.phase = BalancePhase::Evict;
        state.iteration = 3;
        state.class_counts = ClassCount::from([(0, 300), (1, 120), (7, 300)]);
        state
            .output_index
            .insert("a.txt", FileClassCounts::from([(0, 2), (7, 1)]));
        state.output_index.insert("empty.txt", FileClassCounts::new());
        state.mark_processed("a.txt");
        state.mark_processed("b.txt");
        state
    }

    #[test]
    fn test_load_absent_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_state_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let state = sample_state();

        store.save(&state).unwrap();
        let loaded = store.load().unwrap().unwrap();

        assert_eq!(loaded.class_counts, state.class_counts);
        assert_eq!(loaded.output_index, state.output_index);
        assert_eq!(loaded.processed_files, state.processed_files);
        assert_eq!(loaded.phase, BalancePhase::Evict);
        assert_eq!(loaded.iteration, 3);
        assert!(!loaded.updated_at.is_empty());
        assert!(loaded.is_processed("b.txt"));
    }

    #[test]
    fn test_save_overwrites_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store.save(&sample_state()).unwrap();

        let mut next = sample_state();
        next.class_counts.insert(1, 300);
        store.save(&next).unwrap();

        assert_eq!(store.load().unwrap().unwrap().class_counts[&1], 300);
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name() != STATE_FILE)
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_corrupt_snapshot_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(store.load(), Err(StateError::Corrupt { .. })));
    }

    #[test]
    fn test_clear_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store.clear().unwrap();
        store.save(&sample_state()).unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
    }
}
