//! Corpus configuration
//!
//! Read once from a JSON file. Only `data_dir` is required; every other
//! field has a default, including the collection taxonomy.
//!
//! ```json
//! {
//!   "data_dir": "./data",
//!   "registry_path": "./data/webids.yaml",
//!   "collections": [
//!     { "name": "assets", "sharded": true },
//!     { "name": "networks", "parent": "assets" }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Base URL documentary attachments are resolved against.
pub const DEFAULT_DOCUMENT_BASE_URL: &str = "https://github.com/opencrypto-io/data/blob/master/";

/// Configuration errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("Invalid config JSON in {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Serialization format of entity index documents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexFormat {
    #[default]
    Yaml,
    Json,
}

impl IndexFormat {
    /// File extension of index documents in this format
    pub fn extension(&self) -> &'static str {
        match self {
            IndexFormat::Yaml => "yaml",
            IndexFormat::Json => "json",
        }
    }
}

/// One entry of the collection table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDef {
    /// Plural name, also the directory name on disk
    pub name: String,
    /// Entity kind; defaults to the singular of `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Parent collection, for collections nested inside another
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Directory-of-directories layout keyed by the first id character
    #[serde(default)]
    pub sharded: bool,
}

impl CollectionDef {
    /// A top-level collection
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            parent: None,
            sharded: false,
        }
    }

    /// A collection whose entities live inside entities of `parent`
    pub fn nested(name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            parent: Some(parent.into()),
            ..Self::root(name)
        }
    }

    /// Enables the sharded layout
    pub fn sharded(mut self) -> Self {
        self.sharded = true;
        self
    }

    /// Overrides the derived kind name
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Entity kind governed by this collection
    pub fn kind(&self) -> &str {
        match &self.kind {
            Some(kind) => kind,
            None => singularize(&self.name),
        }
    }

    /// Whether this collection sits at the top of the hierarchy
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// File name of an entity's index document, e.g. `asset.yaml`
    pub fn index_file_name(&self, format: IndexFormat) -> String {
        format!("{}.{}", self.kind(), format.extension())
    }
}

/// Drops one trailing `s`: `assets` -> `asset`.
pub fn singularize(name: &str) -> &str {
    name.strip_suffix('s').unwrap_or(name)
}

/// The taxonomy used when the configuration does not declare one.
pub fn default_collections() -> Vec<CollectionDef> {
    vec![
        CollectionDef::root("assets"),
        CollectionDef::root("exchanges"),
        CollectionDef::root("wallets"),
        CollectionDef::nested("networks", "assets"),
        CollectionDef::nested("markets", "exchanges"),
    ]
}

fn default_document_base_url() -> String {
    DEFAULT_DOCUMENT_BASE_URL.to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("dist")
}

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Corpus root (required)
    pub data_dir: PathBuf,

    /// Schema definitions (default `<data_dir>/schemas`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_dir: Option<PathBuf>,

    /// Known-identifier registry file (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_path: Option<PathBuf>,

    /// Index document format (default yaml)
    #[serde(default)]
    pub index_format: IndexFormat,

    /// Prefix for documentary attachment URLs, must end with `/`
    #[serde(default = "default_document_base_url")]
    pub document_base_url: String,

    /// Where `build` writes `data.json` (default `dist`)
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Collection table
    #[serde(default = "default_collections")]
    pub collections: Vec<CollectionDef>,
}

impl CorpusConfig {
    /// Configuration with every default applied
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            schema_dir: None,
            registry_path: None,
            index_format: IndexFormat::default(),
            document_base_url: default_document_base_url(),
            output_dir: default_output_dir(),
            collections: default_collections(),
        }
    }

    /// Replaces the collection table
    pub fn with_collections(mut self, collections: Vec<CollectionDef>) -> Self {
        self.collections = collections;
        self
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let config: CorpusConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Malformed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Checks what serde cannot: non-empty paths, URL shape, unique names.
    ///
    /// Parent linkage is checked by the schema registry, which owns the taxonomy.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir must not be empty".into()));
        }

        if !self.document_base_url.ends_with('/') {
            return Err(ConfigError::Invalid(format!(
                "document_base_url must end with '/': '{}'",
                self.document_base_url
            )));
        }

        let mut seen = HashSet::new();
        for collection in &self.collections {
            if collection.name.is_empty() || collection.kind().is_empty() {
                return Err(ConfigError::Invalid(
                    "collection names and kinds must not be empty".into(),
                ));
            }
            if !seen.insert(collection.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate collection '{}'",
                    collection.name
                )));
            }
        }

        Ok(())
    }

    /// Schema directory, defaulting under the data directory
    pub fn schema_path(&self) -> PathBuf {
        self.schema_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("schemas"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("assets"), "asset");
        assert_eq!(singularize("exchanges"), "exchange");
        assert_eq!(singularize("fish"), "fish");
    }

    #[test]
    fn test_collection_kind_and_index_name() {
        let markets = CollectionDef::nested("markets", "exchanges");
        assert_eq!(markets.kind(), "market");
        assert!(!markets.is_root());
        assert_eq!(markets.index_file_name(IndexFormat::Yaml), "market.yaml");

        let people = CollectionDef::root("people").with_kind("person");
        assert_eq!(people.index_file_name(IndexFormat::Json), "person.json");
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("coindex.json");
        fs::write(&path, r#"{ "data_dir": "/srv/data" }"#).unwrap();

        let config = CorpusConfig::load(&path).unwrap();
        assert_eq!(config.index_format, IndexFormat::Yaml);
        assert_eq!(config.document_base_url, DEFAULT_DOCUMENT_BASE_URL);
        assert_eq!(config.collections, default_collections());
        assert_eq!(config.schema_path(), PathBuf::from("/srv/data/schemas"));
    }

    #[test]
    fn test_explicit_collections_and_format() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("coindex.json");
        fs::write(
            &path,
            r#"{
                "data_dir": "data",
                "index_format": "json",
                "collections": [ { "name": "assets", "sharded": true } ]
            }"#,
        )
        .unwrap();

        let config = CorpusConfig::load(&path).unwrap();
        assert_eq!(config.index_format, IndexFormat::Json);
        assert_eq!(config.collections, vec![CollectionDef::root("assets").sharded()]);
    }

    #[test]
    fn test_base_url_must_end_with_slash() {
        let mut config = CorpusConfig::new("data");
        config.document_base_url = "https://example.org/data".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_duplicate_collection_rejected() {
        let config = CorpusConfig::new("data").with_collections(vec![
            CollectionDef::root("assets"),
            CollectionDef::root("assets"),
        ]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate collection 'assets'"));
    }

    #[test]
    fn test_malformed_json_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("coindex.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            CorpusConfig::load(&path),
            Err(ConfigError::Malformed { .. })
        ));
    }

    #[test]
    fn test_missing_file_rejected() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            CorpusConfig::load(&tmp.path().join("absent.json")),
            Err(ConfigError::Unreadable { .. })
        ));
    }
}
