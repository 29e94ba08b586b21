//! Corpus engine for coindex
//!
//! Pipeline, leaf-first:
//!
//! ```text
//! SchemaRegistry ─► CollectionWalker ─► EntityLoader ─► AttachmentClassifier
//!                         │
//!                         ▼
//!                      Forest ─► Materializer ─► CorpusValidator
//!                         │
//!                         └────► UpsertWriter (on demand)
//! ```
//!
//! A load pass is read-only and either completes or aborts on the first
//! fatal [`CorpusError`]. Schema violations never abort; they end up in a
//! [`ValidationReport`].

mod attachment;
mod entity;
mod errors;
mod layout;
mod materializer;
mod validation;
mod walker;
mod writer;

pub use attachment::{Attachment, AttachmentCategory, AttachmentClassifier, NestedTarget, TargetSplit};
pub use entity::{parse_yaml, Entity, EntityLoader};
pub use errors::{CorpusError, CorpusResult};
pub use layout::{ShardKey, FALLBACK_SHARD, NUMERIC_SHARD};
pub use materializer::{Materialized, MaterializedNode, Materializer};
pub use validation::{CorpusValidator, EntityDiagnostic, UnresolvedReference, ValidationReport};
pub use walker::{CollectionWalker, Forest};
pub use writer::{normalize, EntityKey, SkipReason, UpsertOutcome, UpsertRequest, UpsertWriter};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::CorpusConfig;
use crate::observability::{log_event_with_fields, Event, ObservationScope};
use crate::schema::{IdentifierRegistry, SchemaRegistry};

/// File name of the produced document inside the output directory
pub const BUILD_FILE_NAME: &str = "data.json";

/// A configured corpus: taxonomy, schemas and known identifiers.
///
/// Holds no loaded state; every pass starts from a fresh [`Forest`].
pub struct Corpus {
    config: CorpusConfig,
    registry: SchemaRegistry,
    identifiers: IdentifierRegistry,
}

impl Corpus {
    /// Loads schemas and the identifier registry named by `config`.
    ///
    /// A configured registry path that does not exist yields an empty registry.
    pub fn open(config: CorpusConfig) -> CorpusResult<Self> {
        let schema_dir = config.schema_path();
        let registry = SchemaRegistry::load(&schema_dir, &config.collections)?;
        let schema_count = registry.schema_count().to_string();
        let schema_dir_str = schema_dir.display().to_string();
        log_event_with_fields(
            Event::SchemasLoaded,
            &[("schemas", schema_count.as_str()), ("schema_dir", schema_dir_str.as_str())],
        );

        let identifiers = match &config.registry_path {
            Some(path) if path.exists() => IdentifierRegistry::load(path)?,
            _ => IdentifierRegistry::new(),
        };
        let identifier_count = identifiers.len().to_string();
        log_event_with_fields(Event::RegistryLoaded, &[("identifiers", identifier_count.as_str())]);

        Ok(Self::with_registries(config, registry, identifiers))
    }

    /// Assembles a corpus from already-built registries.
    pub fn with_registries(
        config: CorpusConfig,
        registry: SchemaRegistry,
        identifiers: IdentifierRegistry,
    ) -> Self {
        Self {
            config,
            registry,
            identifiers,
        }
    }

    pub fn config(&self) -> &CorpusConfig {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn identifiers(&self) -> &IdentifierRegistry {
        &self.identifiers
    }

    /// Walks the data directory into a fresh forest.
    pub fn load(&self) -> CorpusResult<Forest> {
        let data_dir = self.config.data_dir.display().to_string();
        let scope = ObservationScope::with_fields("LOAD", &[("data_dir", data_dir.as_str())]);

        let walker = CollectionWalker::new(&self.registry, &self.config.data_dir, self.config.index_format);
        match walker.walk() {
            Ok(forest) => {
                let entities = forest.len().to_string();
                scope.complete_with_fields(&[("entities", entities.as_str())]);
                Ok(forest)
            }
            Err(e) => {
                let path = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                log_event_with_fields(
                    Event::LoadAborted,
                    &[("code", e.code()), ("path", path.as_str()), ("error", e.to_string().as_str())],
                );
                scope.fail(e.code());
                Err(e)
            }
        }
    }

    /// Looks up a root entity of a declared collection.
    pub fn find<'f>(&self, forest: &'f Forest, collection: &str, id: &str) -> CorpusResult<Option<&'f Entity>> {
        if self.registry.collection(collection).is_none() {
            return Err(CorpusError::UnknownCollection(collection.to_string()));
        }
        Ok(forest.find(collection, id))
    }

    /// Entity count per declared collection
    pub fn counts(&self, forest: &Forest) -> BTreeMap<String, usize> {
        forest.counts()
    }

    pub fn materialize(&self, forest: &Forest) -> CorpusResult<Materialized> {
        Materializer::new(&self.registry, &self.config.data_dir, &self.config.document_base_url)
            .materialize(forest)
    }

    /// Materializes and validates every entity, resolving references once.
    pub fn validate(&self, forest: &Forest) -> CorpusResult<ValidationReport> {
        let scope = ObservationScope::new("VALIDATE");

        let report = match self
            .materialize(forest)
            .and_then(|m| CorpusValidator::new(&self.registry, &self.identifiers).validate(&m))
        {
            Ok(report) => report,
            Err(e) => {
                scope.fail(e.code());
                return Err(e);
            }
        };

        let checked = report.checked.to_string();
        let failed = report.failures.len().to_string();
        let unresolved = report.unresolved.len().to_string();
        scope.complete_with_fields(&[
            ("checked", checked.as_str()),
            ("failed", failed.as_str()),
            ("unresolved", unresolved.as_str()),
        ]);
        Ok(report)
    }

    /// The produced document, stamped with the current time.
    pub fn build(&self, forest: &Forest) -> CorpusResult<Value> {
        self.build_at(forest, Utc::now())
    }

    /// The produced document with an explicit generation time.
    pub fn build_at(&self, forest: &Forest, generated: DateTime<Utc>) -> CorpusResult<Value> {
        let materialized = self.materialize(forest)?;
        Ok(materialized.to_document(generated, &forest.counts()))
    }

    /// Writes the produced document to `<dir>/data.json`, `dir` defaulting to
    /// the configured output directory.
    pub fn write_build(&self, forest: &Forest, dir: Option<&Path>) -> CorpusResult<PathBuf> {
        let dir = dir.unwrap_or(self.config.output_dir.as_path());
        let document = self.build(forest)?;

        fs::create_dir_all(dir).map_err(|e| CorpusError::io(dir, e))?;
        let path = dir.join(BUILD_FILE_NAME);
        let contents = serde_json::to_string_pretty(&document)?;
        fs::write(&path, contents).map_err(|e| CorpusError::io(&path, e))?;

        let path_str = path.display().to_string();
        let bytes = document_size(&path);
        log_event_with_fields(Event::BuildWritten, &[("path", path_str.as_str()), ("bytes", bytes.as_str())]);
        Ok(path)
    }

    /// Creates a record unless it already exists.
    pub fn upsert(&self, forest: &Forest, request: &UpsertRequest) -> CorpusResult<UpsertOutcome> {
        UpsertWriter::new(&self.registry, &self.config.data_dir, self.config.index_format)
            .upsert(forest, request)
    }
}

fn document_size(path: &Path) -> String {
    fs::metadata(path)
        .map(|m| m.len().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
