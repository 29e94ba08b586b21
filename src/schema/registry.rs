//! Schema registry
//!
//! Loads one schema per entity kind from a directory of `.json`, `.yaml`
//! or `.yml` files, derives the strict variant of each, and checks that
//! collections and schemas map one-to-one.
//!
//! The registry also owns the collection table and a precomputed ownership
//! chain per kind (`network -> asset`), so nothing downstream has to walk
//! parent links by hand.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

use super::errors::{SchemaError, SchemaResult};
use super::types::{anchored_pattern, Schema};
use crate::config::CollectionDef;

/// Strict schemas indexed by kind, plus the collection taxonomy.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    /// Strict schemas by kind
    schemas: BTreeMap<String, Schema>,
    /// Collection table in declaration order
    collections: Vec<CollectionDef>,
    /// Kind -> index into `collections`
    by_kind: BTreeMap<String, usize>,
    /// Kind -> [kind, parent kind, ..., root kind]
    chains: BTreeMap<String, Vec<String>>,
    /// Declared pattern -> its anchored, compiled form
    patterns: HashMap<String, Regex>,
}

impl SchemaRegistry {
    /// Loads every schema file in `schema_dir` and binds it to `collections`.
    ///
    /// Unreadable or malformed files, duplicate kinds, and any mismatch
    /// between collections and schemas are FATAL.
    pub fn load(schema_dir: &Path, collections: &[CollectionDef]) -> SchemaResult<Self> {
        let entries = fs::read_dir(schema_dir).map_err(|e| {
            SchemaError::malformed_schema(
                schema_dir.display().to_string(),
                format!("Failed to read schema directory: {}", e),
            )
        })?;

        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                SchemaError::malformed_schema(
                    schema_dir.display().to_string(),
                    format!("Failed to read directory entry: {}", e),
                )
            })?;
            let path = entry.path();
            let is_schema = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| matches!(ext, "json" | "yaml" | "yml"));
            if is_schema && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut schemas = Vec::with_capacity(paths.len());
        let mut origins = BTreeMap::new();
        for path in &paths {
            let schema = Self::read_schema_file(path)?;
            if origins
                .insert(schema.kind.clone(), path.display().to_string())
                .is_some()
            {
                return Err(SchemaError::duplicate_kind(
                    &schema.kind,
                    path.display().to_string(),
                ));
            }
            schemas.push(schema);
        }

        Self::from_schemas(schemas, collections)
    }

    /// Builds a registry from in-memory schemas.
    pub fn from_schemas(schemas: Vec<Schema>, collections: &[CollectionDef]) -> SchemaResult<Self> {
        let mut by_kind = BTreeMap::new();
        let mut names = HashSet::new();
        for (index, collection) in collections.iter().enumerate() {
            if !names.insert(collection.name.as_str()) {
                return Err(SchemaError::taxonomy_mismatch(format!(
                    "Collection '{}' is declared twice",
                    collection.name
                )));
            }
            if by_kind.insert(collection.kind().to_string(), index).is_some() {
                return Err(SchemaError::taxonomy_mismatch(format!(
                    "Kind '{}' is claimed by more than one collection",
                    collection.kind()
                )));
            }
        }

        let mut strict = BTreeMap::new();
        for schema in schemas {
            schema
                .validate_structure()
                .map_err(|e| SchemaError::malformed_schema(format!("<{}>", schema.kind), e))?;

            let collection = by_kind
                .get(&schema.kind)
                .map(|&i| &collections[i])
                .ok_or_else(|| {
                    SchemaError::taxonomy_mismatch(format!(
                        "Schema '{}' has no matching collection",
                        schema.kind
                    ))
                })?;
            if collection.name != schema.collection {
                return Err(SchemaError::taxonomy_mismatch(format!(
                    "Schema '{}' names collection '{}', but kind '{}' belongs to '{}'",
                    schema.kind, schema.collection, schema.kind, collection.name
                )));
            }

            let kind = schema.kind.clone();
            if strict.insert(kind.clone(), schema.into_strict()).is_some() {
                return Err(SchemaError::duplicate_kind(kind, "<in-memory>"));
            }
        }

        for collection in collections {
            if !strict.contains_key(collection.kind()) {
                return Err(SchemaError::taxonomy_mismatch(format!(
                    "Collection '{}' has no schema for kind '{}'",
                    collection.name,
                    collection.kind()
                )));
            }
        }

        let chains = Self::build_chains(collections)?;
        let patterns = Self::compile_patterns(&strict)?;

        Ok(Self {
            schemas: strict,
            collections: collections.to_vec(),
            by_kind,
            chains,
            patterns,
        })
    }

    fn read_schema_file(path: &Path) -> SchemaResult<Schema> {
        let content = fs::read_to_string(path).map_err(|e| {
            SchemaError::malformed_schema(
                path.display().to_string(),
                format!("Failed to read file: {}", e),
            )
        })?;

        let is_json = path.extension().is_some_and(|ext| ext == "json");
        let parsed = if is_json {
            serde_json::from_str::<Schema>(&content).map_err(|e| format!("Invalid JSON: {}", e))
        } else {
            serde_yaml::from_str::<Schema>(&content).map_err(|e| format!("Invalid YAML: {}", e))
        };
        let schema =
            parsed.map_err(|reason| SchemaError::malformed_schema(path.display().to_string(), reason))?;

        schema
            .validate_structure()
            .map_err(|e| SchemaError::malformed_schema(path.display().to_string(), e))?;

        Ok(schema)
    }

    fn compile_patterns(schemas: &BTreeMap<String, Schema>) -> SchemaResult<HashMap<String, Regex>> {
        let mut compiled = HashMap::new();
        for schema in schemas.values() {
            for pattern in schema.patterns() {
                if compiled.contains_key(pattern) {
                    continue;
                }
                let regex = Regex::new(&anchored_pattern(pattern)).map_err(|e| {
                    SchemaError::malformed_schema(
                        format!("<{}>", schema.kind),
                        format!("invalid pattern /{}/: {}", pattern, e),
                    )
                })?;
                compiled.insert(pattern.to_string(), regex);
            }
        }
        Ok(compiled)
    }

    /// Walks parent links once per collection; unknown parents and cycles are FATAL.
    fn build_chains(collections: &[CollectionDef]) -> SchemaResult<BTreeMap<String, Vec<String>>> {
        let by_name: BTreeMap<&str, &CollectionDef> =
            collections.iter().map(|c| (c.name.as_str(), c)).collect();

        let mut chains = BTreeMap::new();
        for collection in collections {
            let mut chain = Vec::new();
            let mut visited = HashSet::new();
            let mut current = Some(collection);

            while let Some(col) = current {
                if !visited.insert(col.name.as_str()) {
                    return Err(SchemaError::taxonomy_mismatch(format!(
                        "Circular parent linkage through collection '{}'",
                        col.name
                    )));
                }
                chain.push(col.kind().to_string());

                current = match &col.parent {
                    None => None,
                    Some(parent) => Some(by_name.get(parent.as_str()).copied().ok_or_else(|| {
                        SchemaError::taxonomy_mismatch(format!(
                            "Collection '{}' names unknown parent '{}'",
                            col.name, parent
                        ))
                    })?),
                };
            }

            chains.insert(collection.kind().to_string(), chain);
        }

        Ok(chains)
    }

    /// Returns the strict schema for `kind`.
    pub fn schema_for(&self, kind: &str) -> SchemaResult<&Schema> {
        self.schemas
            .get(kind)
            .ok_or_else(|| SchemaError::unknown_kind(kind))
    }

    /// Checks if a kind is governed by a schema.
    pub fn is_known_kind(&self, kind: &str) -> bool {
        self.schemas.contains_key(kind)
    }

    /// All governed kinds, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    /// Looks up a collection by name.
    pub fn collection(&self, name: &str) -> Option<&CollectionDef> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// Returns the collection a kind belongs to.
    pub fn collection_for_kind(&self, kind: &str) -> SchemaResult<&CollectionDef> {
        self.by_kind
            .get(kind)
            .map(|&i| &self.collections[i])
            .ok_or_else(|| SchemaError::unknown_kind(kind))
    }

    /// The whole collection table, in declaration order.
    pub fn collections(&self) -> &[CollectionDef] {
        &self.collections
    }

    /// Top-level collections, in declaration order.
    pub fn root_collections(&self) -> impl Iterator<Item = &CollectionDef> {
        self.collections.iter().filter(|c| c.is_root())
    }

    /// Collections directly nested inside `parent`.
    pub fn child_collections<'a>(
        &'a self,
        parent: &'a str,
    ) -> impl Iterator<Item = &'a CollectionDef> + 'a {
        self.collections
            .iter()
            .filter(move |c| c.parent.as_deref() == Some(parent))
    }

    /// Kinds from `kind` up to its root, `kind` first.
    pub fn ownership_chain(&self, kind: &str) -> SchemaResult<&[String]> {
        self.chains
            .get(kind)
            .map(Vec::as_slice)
            .ok_or_else(|| SchemaError::unknown_kind(kind))
    }

    /// Compiled, anchored form of a pattern declared by a loaded schema.
    pub fn pattern(&self, pattern: &str) -> Option<&Regex> {
        self.patterns.get(pattern)
    }

    /// Returns the number of loaded schemas.
    pub fn schema_count(&self) -> usize {
        self.schemas.len()
    }
}
