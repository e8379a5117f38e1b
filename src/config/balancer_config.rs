use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::analysis::SelectionStrategy;
use crate::core::operations::EvictionPolicy;
use crate::error::BalanceError;

/// Configuration of a balancing run.
///
/// Loaded from an optional JSON file; the command line overrides it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// Base pool, copied into the output
    pub input_folder: PathBuf,
    /// Pool used to top up under-represented classes
    pub secondary_folder: PathBuf,
    /// Balanced result
    pub output_folder: PathBuf,
    /// Overflow folder receiving evicted files and lines
    pub extra_folder: PathBuf,
    /// Object count every class is driven toward
    pub target_count: usize,
    /// Bound on top-up/evict passes
    pub max_iterations: usize,
    pub selection: SelectionStrategy,
    pub eviction: EvictionPolicy,
    /// Empty output and extra folders and discard saved state before running
    pub reset: bool,
    /// Save a snapshot every N transfers within a phase
    pub checkpoint_every: usize,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            input_folder: PathBuf::new(),
            secondary_folder: PathBuf::new(),
            output_folder: PathBuf::new(),
            extra_folder: PathBuf::new(),
            target_count: 300,
            max_iterations: 100,
            selection: SelectionStrategy::Ordered,
            eviction: EvictionPolicy::Isolating,
            reset: false,
            checkpoint_every: 25,
        }
    }
}

impl BalancerConfig {
    pub fn new(
        input_folder: impl Into<PathBuf>,
        secondary_folder: impl Into<PathBuf>,
        output_folder: impl Into<PathBuf>,
        extra_folder: impl Into<PathBuf>,
        target_count: usize,
    ) -> Self {
        Self {
            input_folder: input_folder.into(),
            secondary_folder: secondary_folder.into(),
            output_folder: output_folder.into(),
            extra_folder: extra_folder.into(),
            target_count,
            ..Default::default()
        }
    }

    /// Load a configuration file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, BalanceError> {
        info!("Loading configuration from: {:?}", path);
        let contents = fs::read_to_string(path).map_err(|e| {
            BalanceError::InvalidConfig(format!("cannot read {:?}: {}", path, e))
        })?;
        serde_json::from_str(&contents)
            .map_err(|e| BalanceError::InvalidConfig(format!("cannot parse {:?}: {}", path, e)))
    }

    pub fn validate(&self) -> Result<(), BalanceError> {
        let folders = [
            ("input_folder", &self.input_folder),
            ("secondary_folder", &self.secondary_folder),
            ("output_folder", &self.output_folder),
            ("extra_folder", &self.extra_folder),
        ];
        for (name, folder) in folders {
            if folder.as_os_str().is_empty() {
                return Err(BalanceError::InvalidConfig(format!("{} is not set", name)));
            }
        }

        // Output and extra are written; neither may alias another folder
        for (written, written_folder) in &folders[2..] {
            for (other, other_folder) in &folders {
                if written != other && written_folder == other_folder {
                    return Err(BalanceError::InvalidConfig(format!(
                        "{} must differ from {}",
                        written, other
                    )));
                }
            }
        }

        if self.target_count == 0 {
            return Err(BalanceError::InvalidConfig(
                "target_count must be at least 1".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(BalanceError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> BalancerConfig {
        BalancerConfig::new("in", "secondary", "out", "extra", 400)
    }

    #[test]
    fn test_config_default() {
        let config = BalancerConfig::default();
        assert_eq!(config.target_count, 300);
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.selection, SelectionStrategy::Ordered);
        assert_eq!(config.eviction, EvictionPolicy::Isolating);
        assert!(!config.reset);
    }

    #[test]
    fn test_validate_accepts_distinct_folders() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = valid();
        config.output_folder = PathBuf::from("in");
        assert!(config.validate().is_err());

        let mut config = valid();
        config.extra_folder = PathBuf::from("out");
        assert!(config.validate().is_err());

        let mut config = valid();
        config.target_count = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.extra_folder = PathBuf::from("in");
        assert!(config.validate().is_err());

        let mut config = valid();
        config.extra_folder = PathBuf::from("secondary");
        assert!(config.validate().is_err());

        // Both pools are only read, so they may be the same folder
        let mut config = valid();
        config.secondary_folder = PathBuf::from("in");
        assert!(config.validate().is_ok());

        let mut config = valid();
        config.secondary_folder = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("balance.json");
        fs::write(
            &path,
            r#"{ "input_folder": "a", "secondary_folder": "b", "output_folder": "c",
                 "extra_folder": "d", "target_count": 50,
                 "selection": { "random": { "seed": 7 } }, "eviction": "lines-only" }"#,
        )
        .unwrap();

        let config = BalancerConfig::load(&path).unwrap();

        assert_eq!(config.target_count, 50);
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.selection, SelectionStrategy::Random { seed: 7 });
        assert_eq!(config.eviction, EvictionPolicy::LinesOnly);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = valid();
        config.selection = SelectionStrategy::FewestInstances;
        config.eviction = EvictionPolicy::WholeFile;

        let json = serde_json::to_string(&config).unwrap();
        let loaded: BalancerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, config);
    }
}
