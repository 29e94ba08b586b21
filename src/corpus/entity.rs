//! # Entity Loader
//!
//! Turns one entity directory into an [`Entity`]: index document parsed as
//! an untyped map, identifier overlaid from the directory name, loose files
//! classified. Nested entities are attached by the walker afterwards.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::attachment::{Attachment, AttachmentClassifier};
use super::errors::{CorpusError, CorpusResult};
use super::layout::index_path;
use crate::config::{CollectionDef, IndexFormat};
use crate::schema::{SchemaRegistry, ID_FIELD};

/// One loaded record
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    id: String,
    kind: String,
    collection: String,
    dir: PathBuf,
    fields: Map<String, Value>,
    attachments: Vec<Attachment>,
    children: BTreeMap<String, Vec<Entity>>,
}

impl Entity {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Directory the entity was loaded from
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Declared fields, `id` already overlaid
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Nested entities keyed by child collection name
    pub fn children(&self) -> &BTreeMap<String, Vec<Entity>> {
        &self.children
    }

    /// Nested entities of one child collection
    pub fn children_in(&self, collection: &str) -> &[Entity] {
        self.children
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn set_children(&mut self, collection: &str, entities: Vec<Entity>) {
        self.children.insert(collection.to_string(), entities);
    }
}

/// Loads single entity directories.
pub struct EntityLoader<'a> {
    registry: &'a SchemaRegistry,
    classifier: AttachmentClassifier,
    format: IndexFormat,
}

impl<'a> EntityLoader<'a> {
    pub fn new(registry: &'a SchemaRegistry, format: IndexFormat) -> Self {
        Self {
            registry,
            classifier: AttachmentClassifier::new(registry),
            format,
        }
    }

    /// Loads the entity `id` of `collection` from `dir`.
    ///
    /// # Errors
    ///
    /// - `UnknownCollection` if the collection is not in the registry
    /// - `MissingIndex` naming the expected index path
    /// - `MalformedIndex` with the parser diagnostic
    /// - any attachment classification error
    pub fn load(&self, id: &str, collection: &CollectionDef, dir: &Path) -> CorpusResult<Entity> {
        if self.registry.collection(&collection.name).is_none() {
            return Err(CorpusError::UnknownCollection(collection.name.clone()));
        }

        let path = index_path(dir, collection, self.format);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CorpusError::MissingIndex(path));
            }
            Err(e) => return Err(CorpusError::io(&path, e)),
        };

        let mut fields = parse_index(&path, &contents, self.format)?;
        // Directory name wins over whatever the document says
        fields.insert(ID_FIELD.to_string(), Value::String(id.to_string()));

        let index_file_name = collection.index_file_name(self.format);
        let attachments = self.classifier.classify_dir(dir, &index_file_name)?;

        Ok(Entity {
            id: id.to_string(),
            kind: collection.kind().to_string(),
            collection: collection.name.clone(),
            dir: dir.to_path_buf(),
            fields,
            attachments,
            children: BTreeMap::new(),
        })
    }
}

fn parse_index(path: &Path, contents: &str, format: IndexFormat) -> CorpusResult<Map<String, Value>> {
    if contents.trim().is_empty() {
        return Ok(Map::new());
    }

    let parsed: Result<Value, String> = match format {
        IndexFormat::Yaml => parse_yaml(contents),
        IndexFormat::Json => serde_json::from_str(contents).map_err(|e| e.to_string()),
    };

    match parsed {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(CorpusError::MalformedIndex {
            path: path.to_path_buf(),
            reason: format!("expected a mapping at the top level, got {}", type_label(&other)),
        }),
        Err(reason) => Err(CorpusError::MalformedIndex {
            path: path.to_path_buf(),
            reason,
        }),
    }
}

/// Parses a YAML document into a JSON value.
///
/// Scalar mapping keys (`2017:`, `true:`, `~:`) become their string form;
/// sequence or mapping keys and non-finite floats are rejected. Tags are
/// dropped.
pub fn parse_yaml(contents: &str) -> Result<Value, String> {
    let value: serde_yaml::Value = serde_yaml::from_str(contents).map_err(|e| e.to_string())?;
    yaml_to_json(value)
}

fn yaml_to_json(value: serde_yaml::Value) -> Result<Value, String> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| format!("number {} has no JSON representation", n))?
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                let key = match key {
                    Yaml::String(s) => s,
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    Yaml::Null => "null".to_string(),
                    _ => return Err("mapping keys must be scalars".to_string()),
                };
                if map.contains_key(&key) {
                    return Err(format!("duplicate key '{}' after converting keys to strings", key));
                }
                map.insert(key, yaml_to_json(value)?);
            }
            Value::Object(map)
        }
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

fn type_label(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
