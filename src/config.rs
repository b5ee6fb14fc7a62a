use std::path::{Path, PathBuf};

use homedir::my_home;
use serde::{Deserialize, Serialize};

use crate::semantic::highlight::DEFAULT_HIGHLIGHT_PHRASES;
use crate::semantic::preprocess::DEFAULT_SENTENCES_PER_CHUNK;
use crate::semantic::{
    DEFAULT_DIMENSIONS, DEFAULT_MIN_THRESHOLD, DEFAULT_MODEL, DEFAULT_THRESHOLD,
    DEFAULT_THRESHOLD_STEP,
};

const CONFIG_FILE: &str = "config.yaml";

/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
/// Texts embedded per model call during a build
const DEFAULT_BATCH_SIZE: usize = 64;
const MAX_SENTENCES_PER_CHUNK: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine home directory")]
    HomeNotFound,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Where the book catalog lives and how its table is laid out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// SQLite file; relative paths resolve against the base path.
    /// `BOOK_DB_PATH` overrides it at load time.
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,

    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default = "default_id_column")]
    pub id_column: String,

    #[serde(default = "default_title_column")]
    pub title_column: String,

    #[serde(default = "default_description_column")]
    pub description_column: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
            table: default_table(),
            id_column: default_id_column(),
            title_column: default_title_column(),
            description_column: default_description_column(),
        }
    }
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("db.sqlite3")
}

fn default_table() -> String {
    "books".to_string()
}

fn default_id_column() -> String {
    "Acc_No".to_string()
}

fn default_title_column() -> String {
    "Title".to_string()
}

fn default_description_column() -> String {
    "description".to_string()
}

/// Configuration for semantic search functionality
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SemanticSearchConfig {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_semantic_model")]
    pub model: String,

    /// Expected embedding width; a model producing anything else is rejected
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Starting similarity threshold [-1.0, 1.0]
    #[serde(default = "default_semantic_threshold")]
    pub default_threshold: f32,

    /// Lowest threshold the backoff may reach
    #[serde(default = "default_min_threshold")]
    pub min_threshold: f32,

    #[serde(default = "default_threshold_step")]
    pub threshold_step: f32,

    /// Sentences per description chunk (1..=3)
    #[serde(default = "default_sentences_per_chunk")]
    pub sentences_per_chunk: usize,

    /// Highlight phrases attached to each result
    #[serde(default = "default_highlight_phrases")]
    pub highlight_phrases: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Build the store on first use when it is missing
    #[serde(default = "default_auto_rebuild")]
    pub auto_rebuild: bool,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for SemanticSearchConfig {
    fn default() -> Self {
        Self {
            model: default_semantic_model(),
            dimensions: default_dimensions(),
            default_threshold: default_semantic_threshold(),
            min_threshold: default_min_threshold(),
            threshold_step: default_threshold_step(),
            sentences_per_chunk: default_sentences_per_chunk(),
            highlight_phrases: default_highlight_phrases(),
            batch_size: default_batch_size(),
            auto_rebuild: default_auto_rebuild(),
            download_timeout_secs: default_download_timeout_secs(),
        }
    }
}

fn default_semantic_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_dimensions() -> usize {
    DEFAULT_DIMENSIONS
}

fn default_semantic_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

fn default_min_threshold() -> f32 {
    DEFAULT_MIN_THRESHOLD
}

fn default_threshold_step() -> f32 {
    DEFAULT_THRESHOLD_STEP
}

fn default_sentences_per_chunk() -> usize {
    DEFAULT_SENTENCES_PER_CHUNK
}

fn default_highlight_phrases() -> usize {
    DEFAULT_HIGHLIGHT_PHRASES
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_auto_rebuild() -> bool {
    true
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

impl SemanticSearchConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("default_threshold", self.default_threshold),
            ("min_threshold", self.min_threshold),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "semantic_search.{name} must be between -1.0 and 1.0, got {value}"
                )));
            }
        }

        if self.min_threshold > self.default_threshold {
            return Err(ConfigError::Invalid(format!(
                "semantic_search.min_threshold ({}) must not exceed default_threshold ({})",
                self.min_threshold, self.default_threshold
            )));
        }

        if self.threshold_step.is_nan() || self.threshold_step <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "semantic_search.threshold_step must be greater than 0, got {}",
                self.threshold_step
            )));
        }

        if !(1..=MAX_SENTENCES_PER_CHUNK).contains(&self.sentences_per_chunk) {
            return Err(ConfigError::Invalid(format!(
                "semantic_search.sentences_per_chunk must be between 1 and {}, got {}",
                MAX_SENTENCES_PER_CHUNK, self.sentences_per_chunk
            )));
        }

        if self.dimensions == 0 {
            return Err(ConfigError::Invalid(
                "semantic_search.dimensions must be greater than 0".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "semantic_search.batch_size must be greater than 0".to_string(),
            ));
        }

        if self.download_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "semantic_search.download_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub semantic_search: SemanticSearchConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

/// Data directory: `BOOKSEEK_BASE_PATH`, else `~/.local/share/bookseek`.
pub fn base_path() -> Result<PathBuf, ConfigError> {
    if let Ok(path) = std::env::var("BOOKSEEK_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = my_home()
        .map_err(|_| ConfigError::HomeNotFound)?
        .ok_or(ConfigError::HomeNotFound)?;

    Ok(home.join(".local/share/bookseek"))
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.semantic_search.validate()?;

        let catalog = &self.catalog;
        for (name, value) in [
            ("table", &catalog.table),
            ("id_column", &catalog.id_column),
            ("title_column", &catalog.title_column),
            ("description_column", &catalog.description_column),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("catalog.{name} must not be empty")));
            }
        }

        Ok(())
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(&base_path()?)
    }

    /// Load `config.yaml` from `base_path`, writing defaults if it is absent.
    pub fn load_with(base_path: &Path) -> Result<Self, ConfigError> {
        std::fs::create_dir_all(base_path)?;
        let config_path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !config_path.exists() {
            write_atomic(base_path, &config_path, &serde_yml::to_string(&Self::default())?)?;
        }

        let config_str = std::fs::read_to_string(&config_path)?;
        let mut config: Self = serde_yml::from_str(&config_str)?;
        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        // runtime-only resolution, never written back
        if let Ok(db_path) = std::env::var("BOOK_DB_PATH") {
            config.catalog.path = PathBuf::from(db_path);
        }
        if config.catalog.path.is_relative() {
            config.catalog.path = base_path.join(&config.catalog.path);
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let config_str = serde_yml::to_string(&self)?;
        write_atomic(&self.base_path, &self.base_path.join(CONFIG_FILE), &config_str)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

fn write_atomic(dir: &Path, path: &Path, contents: &str) -> Result<(), ConfigError> {
    use std::io::Write;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        let sem = &config.semantic_search;

        assert_eq!(sem.model, "all-MiniLM-L6-v2");
        assert_eq!(sem.dimensions, 384);
        assert_eq!(sem.default_threshold, 0.60);
        assert_eq!(sem.min_threshold, 0.45);
        assert_eq!(sem.threshold_step, 0.05);
        assert_eq!(sem.sentences_per_chunk, 2);
        assert!(sem.auto_rebuild);

        assert_eq!(config.catalog.table, "books");
        assert_eq!(config.catalog.id_column, "Acc_No");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();

        let config = Config::load_with(dir.path()).unwrap();
        assert!(dir.path().join("config.yaml").exists());
        assert_eq!(config.semantic_search, SemanticSearchConfig::default());
        assert_eq!(config.catalog.path, dir.path().join("db.sqlite3"));
    }

    #[test]
    fn test_partial_config_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "semantic_search:\n  default_threshold: 0.7\n  sentences_per_chunk: 3\n",
        )
        .unwrap();

        let config = Config::load_with(dir.path()).unwrap();
        assert_eq!(config.semantic_search.default_threshold, 0.7);
        assert_eq!(config.semantic_search.sentences_per_chunk, 3);
        assert_eq!(config.semantic_search.min_threshold, 0.45);
        assert_eq!(config.catalog.title_column, "Title");

        // upgraded file now lists every field
        let saved = std::fs::read_to_string(dir.path().join("config.yaml")).unwrap();
        assert!(saved.contains("batch_size"));
    }

    #[test]
    fn test_malformed_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "semantic_search: [not, a, map]").unwrap();

        assert!(matches!(
            Config::load_with(dir.path()),
            Err(ConfigError::Malformed(_))
        ));
    }

    #[test]
    fn test_validation_errors() {
        let cases: [fn(&mut SemanticSearchConfig); 9] = [
            |c: &mut SemanticSearchConfig| c.default_threshold = 1.5,
            |c: &mut SemanticSearchConfig| c.min_threshold = -2.0,
            |c: &mut SemanticSearchConfig| c.min_threshold = 0.9,
            |c: &mut SemanticSearchConfig| c.threshold_step = 0.0,
            |c: &mut SemanticSearchConfig| c.sentences_per_chunk = 0,
            |c: &mut SemanticSearchConfig| c.sentences_per_chunk = 4,
            |c: &mut SemanticSearchConfig| c.dimensions = 0,
            |c: &mut SemanticSearchConfig| c.batch_size = 0,
            |c: &mut SemanticSearchConfig| c.download_timeout_secs = 0,
        ];

        for mutate in cases {
            let mut config = Config::default();
            mutate(&mut config.semantic_search);
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "{:?}",
                config.semantic_search
            );
        }
    }

    #[test]
    fn test_empty_catalog_column_rejected() {
        let mut config = Config::default();
        config.catalog.title_column = " ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
