/// Search configuration: a RON file with every field defaulted, then
/// environment overrides.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::core::cache::IndexCache;
use crate::core::query::{SearchEngine, SearchMode, SearchOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

pub const ENV_DATA_DIR: &str = "FTL_DATA_DIR";
pub const ENV_DISABLE_CACHE: &str = "FTL_SEARCH_DISABLE_CACHE";
pub const ENV_TIMING: &str = "FTL_SEARCH_TIMING";

/// Directory name searched for when no corpus location is configured.
pub const DEFAULT_DATA_DIR: &str = "data";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub data_dir: Option<PathBuf>,
    pub max_depth: usize,
    pub max_line_len: usize,
    pub only_outcomes: bool,
    pub mode: SearchMode,
    pub cache_enabled: bool,
    pub timing: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let options = SearchOptions::default();
        Self {
            data_dir: None,
            max_depth: options.max_depth,
            max_line_len: options.max_line_len,
            only_outcomes: options.only_outcomes,
            mode: options.mode,
            cache_enabled: true,
            timing: false,
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn is_set(value: &str) -> bool {
    !matches!(value.trim().to_lowercase().as_str(), "" | "0" | "false" | "off")
}

impl SearchConfig {
    pub fn load_from_ron(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(input)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            let dir = PathBuf::from(dir.trim());
            if dir.is_dir() {
                self.data_dir = Some(dir);
            }
        }
        if lookup(ENV_DISABLE_CACHE).map_or(false, |v| is_truthy(&v)) {
            self.cache_enabled = false;
        }
        if lookup(ENV_TIMING).map_or(false, |v| is_set(&v)) {
            self.timing = true;
        }
    }

    /// Corpus root: the configured directory, else the nearest `data/`
    /// directory above the working directory, else `./data`.
    pub fn locate_data_dir(&self) -> PathBuf {
        let start = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        self.locate_data_dir_from(&start)
    }

    pub fn locate_data_dir_from(&self, start: &Path) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        start
            .ancestors()
            .map(|dir| dir.join(DEFAULT_DATA_DIR))
            .find(|candidate| candidate.is_dir())
            .unwrap_or_else(|| PathBuf::from(".").join(DEFAULT_DATA_DIR))
    }

    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            mode: self.mode,
            max_depth: self.max_depth,
            only_outcomes: self.only_outcomes,
            max_line_len: self.max_line_len,
        }
    }

    pub fn build_cache(&self) -> Arc<IndexCache> {
        Arc::new(IndexCache::with_enabled(self.cache_enabled))
    }

    pub fn engine(&self) -> SearchEngine {
        SearchEngine::new(self.build_cache()).with_timing(self.timing)
    }
}
