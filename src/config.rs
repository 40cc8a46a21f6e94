//! Engine configuration
//!
//! Loaded from `<data_dir>/config.toml` when present; every field has a default so a partial
//! file is enough.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Store and log location
    pub data_dir: PathBuf,

    /// Files per concurrent indexing batch
    pub batch_size: usize,

    /// Maximum file size to process (in bytes)
    pub max_file_size: u64,

    /// Watcher quiet window
    pub debounce_ms: u64,

    /// Directory names never indexed or watched
    pub excluded_dirs: Vec<String>,

    pub call_hierarchy_limit: usize,

    /// Arm the file watcher after a workspace pass
    pub watch: bool,

    pub embedding: EmbeddingConfig,

    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub enabled: bool,
    pub workers: usize,
    pub dimensions: usize,
    /// In-process fallback batch size before yielding
    pub fallback_batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub default_threshold: f32,
    /// Weight of the vector score in hybrid ranking
    pub semantic_weight: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".marlin"),
            batch_size: 10,
            max_file_size: 1024 * 1024, // 1MB default
            debounce_ms: 500,
            excluded_dirs: [
                "node_modules",
                "target",
                "build",
                "dist",
                "out",
                ".git",
                ".svn",
                ".hg",
                "__pycache__",
                ".venv",
                "venv",
                "vendor",
                "coverage",
                ".next",
                ".idea",
                ".vscode",
                ".marlin",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            call_hierarchy_limit: 50,
            watch: true,
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: num_cpus::get().clamp(1, 4),
            dimensions: 384,
            fallback_batch_size: 16,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            default_threshold: 0.3,
            semantic_weight: 0.6,
        }
    }
}

impl EngineConfig {
    /// Config rooted at `data_dir`, read from its `config.toml` if one exists.
    ///
    /// The `data_dir` argument always wins over a value in the file.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(CONFIG_FILE_NAME);

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .map_err(|e| anyhow!("Failed to read config file: {}", e))?;
            let parsed: EngineConfig = toml::from_str(&content)
                .map_err(|e| anyhow!("Failed to parse config file: {}", e))?;
            debug!("Loaded configuration from: {}", config_path.display());
            parsed
        } else {
            debug!("No config file at {}, using defaults", config_path.display());
            EngineConfig::default()
        };

        config.data_dir = data_dir.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;
        fs::write(self.data_dir.join(CONFIG_FILE_NAME), content)
            .map_err(|e| anyhow!("Failed to write config file: {}", e))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(anyhow!("batch_size must be greater than zero"));
        }
        if self.max_file_size == 0 {
            return Err(anyhow!("max_file_size must be greater than zero"));
        }
        if self.call_hierarchy_limit == 0 {
            return Err(anyhow!("call_hierarchy_limit must be greater than zero"));
        }
        if self.embedding.dimensions == 0 {
            return Err(anyhow!("embedding.dimensions must be greater than zero"));
        }
        for (name, value) in [
            ("search.default_threshold", self.search.default_threshold),
            ("search.semantic_weight", self.search.semantic_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
            }
        }
        Ok(())
    }

    /// Path of the SQLite store inside `data_dir`
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("marlin.db")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn is_excluded_dir(&self, name: &str) -> bool {
        self.excluded_dirs.iter().any(|d| d == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, 10);
        assert!((1..=4).contains(&config.embedding.workers));
        assert!(config.is_excluded_dir("node_modules"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "batch_size = 4\n[embedding]\nenabled = false\n",
        )
        .unwrap();

        let config = EngineConfig::load(dir.path()).unwrap();
        assert_eq!(config.batch_size, 4);
        assert!(!config.embedding.enabled);
        assert_eq!(config.embedding.dimensions, 384);
        assert_eq!(config.data_dir, dir.path());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = EngineConfig::default();
        config.search.semantic_weight = 1.5;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());
    }
}
