//! # Upsert Writer
//!
//! Create-if-absent writes of new records. An identifier that is already
//! loaded, or whose index document already exists on disk, is left alone.
//! There is no locking: callers serialize writers against one corpus.
//!
//! A crash between directory creation and the index write leaves an empty
//! directory behind. The walker skips it and the next upsert fills it in.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::errors::{CorpusError, CorpusResult};
use super::layout::{entity_dir, index_path, is_hidden, ShardKey};
use super::walker::Forest;
use crate::config::{CollectionDef, IndexFormat};
use crate::observability::{log_event_with_fields, Event};
use crate::schema::{SchemaRegistry, ID_FIELD};

/// Collection and identifier of one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityKey {
    pub collection: String,
    pub id: String,
}

impl EntityKey {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

/// A record to create
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertRequest {
    pub collection: String,
    pub id: String,
    /// Ancestors from the root entity down, empty for root collections
    pub parents: Vec<EntityKey>,
    pub record: Value,
}

impl UpsertRequest {
    pub fn new(collection: impl Into<String>, id: impl Into<String>, record: Value) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            parents: Vec::new(),
            record,
        }
    }

    /// Appends an ancestor; call outermost first.
    pub fn under(mut self, collection: impl Into<String>, id: impl Into<String>) -> Self {
        self.parents.push(EntityKey::new(collection, id));
        self
    }
}

/// Why an upsert wrote nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The entity is in the loaded forest
    Loaded,
    /// Its index document exists on disk
    OnDisk,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Loaded => "loaded",
            SkipReason::OnDisk => "on_disk",
        }
    }
}

/// Result of an upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New index document written at this path
    Created(PathBuf),
    Skipped(SkipReason),
}

impl UpsertOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, UpsertOutcome::Created(_))
    }
}

/// Writes new records into a corpus directory.
pub struct UpsertWriter<'a> {
    registry: &'a SchemaRegistry,
    root: PathBuf,
    format: IndexFormat,
}

impl<'a> UpsertWriter<'a> {
    pub fn new(registry: &'a SchemaRegistry, root: impl Into<PathBuf>, format: IndexFormat) -> Self {
        Self {
            registry,
            root: root.into(),
            format,
        }
    }

    /// Writes `request` unless the entity already exists.
    ///
    /// The record is not validated here; that is the caller's job.
    ///
    /// # Errors
    ///
    /// - `UnknownCollection` / `InvalidParentChain` if the request does not
    ///   fit the taxonomy or a parent is missing on disk
    /// - `InvalidIdentifier` for ids that are not plain directory names
    /// - `MalformedIndex` if the record is not a mapping
    /// - `Io` / `Serialization` from the write itself, with no retry
    pub fn upsert(&self, forest: &Forest, request: &UpsertRequest) -> CorpusResult<UpsertOutcome> {
        let collection = self
            .registry
            .collection(&request.collection)
            .ok_or_else(|| CorpusError::UnknownCollection(request.collection.clone()))?;
        check_identifier(&request.id)?;
        self.check_parent_chain(collection, request)?;

        let mut path: Vec<(&str, &str)> = request
            .parents
            .iter()
            .map(|p| (p.collection.as_str(), p.id.as_str()))
            .collect();
        path.push((request.collection.as_str(), request.id.as_str()));
        if forest.find_path(&path).is_some() {
            return Ok(self.skipped(request, SkipReason::Loaded));
        }

        let dir = self.entity_dir(request)?;
        let index = index_path(&dir, collection, self.format);
        if index.exists() {
            return Ok(self.skipped(request, SkipReason::OnDisk));
        }

        let record = request.record.as_object().ok_or_else(|| CorpusError::MalformedIndex {
            path: index.clone(),
            reason: "upsert record must be a mapping".to_string(),
        })?;
        let normalized = normalize(record, &request.id);

        if collection.sharded && ShardKey::of(&request.id).is_fallback() {
            log_event_with_fields(
                Event::ShardKeyFallback,
                &[
                    ("collection", request.collection.as_str()),
                    ("id", request.id.as_str()),
                ],
            );
        }

        fs::create_dir_all(&dir).map_err(|e| CorpusError::io(&dir, e))?;
        let contents = match self.format {
            IndexFormat::Yaml => serde_yaml::to_string(&normalized)?,
            IndexFormat::Json => format!("{}\n", serde_json::to_string_pretty(&normalized)?),
        };
        fs::write(&index, contents).map_err(|e| CorpusError::io(&index, e))?;

        let index_str = index.display().to_string();
        log_event_with_fields(
            Event::UpsertWritten,
            &[
                ("collection", request.collection.as_str()),
                ("id", request.id.as_str()),
                ("path", index_str.as_str()),
            ],
        );

        Ok(UpsertOutcome::Created(index))
    }

    /// Directory the request's entity lives in, shard levels applied.
    ///
    /// # Errors
    ///
    /// `UnknownCollection` for collections missing from the taxonomy.
    pub fn entity_dir(&self, request: &UpsertRequest) -> CorpusResult<PathBuf> {
        let target = EntityKey::new(&request.collection, &request.id);
        let mut dir = self.root.clone();
        for key in request.parents.iter().chain(std::iter::once(&target)) {
            let collection = self
                .registry
                .collection(&key.collection)
                .ok_or_else(|| CorpusError::UnknownCollection(key.collection.clone()))?;
            dir = entity_dir(&dir, collection, &key.id);
        }
        Ok(dir)
    }

    fn check_parent_chain(&self, collection: &CollectionDef, request: &UpsertRequest) -> CorpusResult<()> {
        let invalid = |reason: String| CorpusError::InvalidParentChain {
            collection: request.collection.clone(),
            id: request.id.clone(),
            reason,
        };

        // Ancestor collections, root first
        let mut expected = Vec::new();
        let mut parent = collection.parent.as_deref();
        while let Some(name) = parent {
            let def = self
                .registry
                .collection(name)
                .ok_or_else(|| CorpusError::UnknownCollection(name.to_string()))?;
            expected.push(def);
            parent = def.parent.as_deref();
        }
        expected.reverse();

        let given: Vec<&str> = request.parents.iter().map(|p| p.collection.as_str()).collect();
        let wanted: Vec<&str> = expected.iter().map(|c| c.name.as_str()).collect();
        if given != wanted {
            return Err(invalid(format!(
                "expected parents [{}], got [{}]",
                wanted.join(", "),
                given.join(", ")
            )));
        }

        let mut dir = self.root.clone();
        for (def, key) in expected.iter().zip(&request.parents) {
            check_identifier(&key.id)?;
            dir = entity_dir(&dir, def, &key.id);
            if !index_path(&dir, def, self.format).is_file() {
                return Err(invalid(format!(
                    "parent {}/{} does not exist",
                    key.collection, key.id
                )));
            }
        }

        Ok(())
    }

    fn skipped(&self, request: &UpsertRequest, reason: SkipReason) -> UpsertOutcome {
        log_event_with_fields(
            Event::UpsertSkipped,
            &[
                ("collection", request.collection.as_str()),
                ("id", request.id.as_str()),
                ("reason", reason.as_str()),
            ],
        );
        UpsertOutcome::Skipped(reason)
    }
}

fn check_identifier(id: &str) -> CorpusResult<()> {
    let usable = !id.is_empty()
        && !is_hidden(id)
        && !id.contains(|c| c == '/' || c == '\\')
        && Path::new(id).file_name().is_some_and(|name| name == id);
    if usable {
        Ok(())
    } else {
        Err(CorpusError::InvalidIdentifier(id.to_string()))
    }
}

/// Normalized form of a record: nulls dropped at every depth, `id` set,
/// keys sorted.
pub fn normalize(record: &Map<String, Value>, id: &str) -> Value {
    let mut normalized = match strip_nulls(&Value::Object(record.clone())) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    normalized.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    Value::Object(normalized)
}

fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter(|v| !v.is_null())
                .map(strip_nulls)
                .collect(),
        ),
        other => other.clone(),
    }
}
