//! # Collection Walker
//!
//! Walks the collection table from the root collections down. Nested
//! collections are found inside each parent entity directory, so the
//! resulting [`Forest`] already has the containment hierarchy.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::entity::{Entity, EntityLoader};
use super::errors::{CorpusError, CorpusResult};
use super::layout::{collection_dir, is_hidden};
use crate::config::{CollectionDef, IndexFormat};
use crate::observability::{log_event_with_fields, Event, Logger};
use crate::schema::SchemaRegistry;

/// Every entity of one load pass, grouped by root collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Forest {
    roots: BTreeMap<String, Vec<Entity>>,
    /// Every declared collection, nested ones included
    collections: Vec<String>,
}

impl Forest {
    /// Root entities of a collection, empty if the collection is absent
    pub fn collection(&self, name: &str) -> &[Entity] {
        self.roots.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Root collections with their entities, sorted by collection name
    pub fn root_collections(&self) -> impl Iterator<Item = (&str, &[Entity])> {
        self.roots.iter().map(|(name, v)| (name.as_str(), v.as_slice()))
    }

    /// Looks up a root entity.
    pub fn find(&self, collection: &str, id: &str) -> Option<&Entity> {
        self.find_path(&[(collection, id)])
    }

    /// Follows `(collection, id)` pairs from a root entity downwards.
    pub fn find_path(&self, path: &[(&str, &str)]) -> Option<&Entity> {
        let ((collection, id), rest) = path.split_first()?;
        let mut current = self.collection(collection).iter().find(|e| e.id() == *id)?;
        for (collection, id) in rest {
            current = current.children_in(collection).iter().find(|e| e.id() == *id)?;
        }
        Some(current)
    }

    /// All entities, depth-first, parents before children
    pub fn entities(&self) -> Vec<&Entity> {
        fn visit<'f>(entity: &'f Entity, out: &mut Vec<&'f Entity>) {
            out.push(entity);
            for children in entity.children().values() {
                for child in children {
                    visit(child, out);
                }
            }
        }

        let mut out = Vec::new();
        for entities in self.roots.values() {
            for entity in entities {
                visit(entity, &mut out);
            }
        }
        out
    }

    /// Entity count per collection; nested collections are summed over all parents.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> =
            self.collections.iter().map(|c| (c.clone(), 0)).collect();
        for entity in self.entities() {
            *counts.entry(entity.collection().to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Total number of entities
    pub fn len(&self) -> usize {
        self.entities().len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.values().all(Vec::is_empty)
    }
}

/// Walks a corpus directory into a [`Forest`].
pub struct CollectionWalker<'a> {
    registry: &'a SchemaRegistry,
    loader: EntityLoader<'a>,
    root: PathBuf,
}

impl<'a> CollectionWalker<'a> {
    pub fn new(registry: &'a SchemaRegistry, root: impl Into<PathBuf>, format: IndexFormat) -> Self {
        Self {
            registry,
            loader: EntityLoader::new(registry, format),
            root: root.into(),
        }
    }

    /// Loads every entity below the corpus root.
    ///
    /// Stops at the first fatal error; there is no partial forest.
    pub fn walk(&self) -> CorpusResult<Forest> {
        let mut forest = Forest {
            roots: BTreeMap::new(),
            collections: self
                .registry
                .collections()
                .iter()
                .map(|c| c.name.clone())
                .collect(),
        };

        for collection in self.registry.root_collections() {
            let entities = self.walk_collection(&self.root, collection)?;
            forest.roots.insert(collection.name.clone(), entities);
        }

        Ok(forest)
    }

    fn walk_collection(&self, parent_dir: &Path, collection: &CollectionDef) -> CorpusResult<Vec<Entity>> {
        let dir = collection_dir(parent_dir, collection);

        let entity_dirs = if collection.sharded {
            let mut dirs = Vec::new();
            for (_, shard) in list_subdirs(&dir)? {
                dirs.extend(list_subdirs(&shard)?);
            }
            dirs
        } else {
            list_subdirs(&dir)?
        };

        let mut entities = Vec::with_capacity(entity_dirs.len());
        for (id, path) in entity_dirs {
            if is_empty_dir(&path)? {
                let path_str = path.display().to_string();
                log_event_with_fields(
                    Event::OrphanDirectorySkipped,
                    &[
                        ("collection", collection.name.as_str()),
                        ("id", id.as_str()),
                        ("path", path_str.as_str()),
                    ],
                );
                continue;
            }

            let mut entity = self.loader.load(&id, collection, &path)?;
            for child in self.registry.child_collections(&collection.name) {
                let children = self.walk_collection(&path, child)?;
                entity.set_children(&child.name, children);
            }

            Logger::trace(
                Event::EntityLoaded.as_str(),
                &[("collection", collection.name.as_str()), ("id", id.as_str())],
            );
            entities.push(entity);
        }

        Ok(entities)
    }
}

/// Visible subdirectories of `dir`, sorted by name. A missing `dir` is empty.
fn list_subdirs(dir: &Path) -> CorpusResult<Vec<(String, PathBuf)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CorpusError::io(dir, e)),
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CorpusError::io(dir, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().into_string().map_err(|_| CorpusError::Io {
            path: path.clone(),
            message: "directory name is not valid UTF-8".to_string(),
        })?;
        if is_hidden(&name) {
            continue;
        }
        dirs.push((name, path));
    }

    dirs.sort();
    Ok(dirs)
}

fn is_empty_dir(dir: &Path) -> CorpusResult<bool> {
    let mut entries = fs::read_dir(dir).map_err(|e| CorpusError::io(dir, e))?;
    Ok(entries.next().is_none())
}
