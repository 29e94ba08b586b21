//! # Materializer
//!
//! Converts a loaded [`Forest`] into the nested output form. Images are
//! base64-embedded under `images`, documents become a `whitepaper` URL.
//! Attachments addressed to a descendant are located through the
//! precomputed ownership chain of their target kind, never by walking the
//! tree for a name match.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use super::attachment::{Attachment, AttachmentCategory, NestedTarget, TargetSplit};
use super::entity::Entity;
use super::errors::{CorpusError, CorpusResult};
use super::layout::{encode_url_segment, relative_url_path};
use super::walker::Forest;
use crate::schema::{SchemaRegistry, SchemaResult};

/// Position of a descendant: `(child collection, index)` steps from a node
type NodePath = Vec<(String, usize)>;

/// Attachment-embedded form of one entity and its descendants
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedNode {
    kind: String,
    collection: String,
    id: String,
    /// Own fields and embedded attachments, children excluded
    document: Map<String, Value>,
    /// Child collection name to nodes, sorted by id; empty collections omitted
    children: BTreeMap<String, Vec<MaterializedNode>>,
    document_attached: bool,
}

impl MaterializedNode {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The node's own document, without nested entities. This is what gets
    /// validated against the node's schema.
    pub fn own_document(&self) -> Value {
        Value::Object(self.document.clone())
    }

    /// Full document with nested entities embedded as arrays named after
    /// their collection.
    pub fn to_document(&self) -> Value {
        let mut document = self.document.clone();
        for (collection, nodes) in &self.children {
            document.insert(
                collection.clone(),
                Value::Array(nodes.iter().map(MaterializedNode::to_document).collect()),
            );
        }
        Value::Object(document)
    }

    /// Projects the full document into a typed representation.
    ///
    /// Meant to run after validation succeeded; a shape mismatch here is
    /// reported as a serialization error.
    pub fn project<T: DeserializeOwned>(&self) -> CorpusResult<T> {
        Ok(serde_json::from_value(self.to_document())?)
    }

    pub fn children(&self) -> &BTreeMap<String, Vec<MaterializedNode>> {
        &self.children
    }

    /// Direct child by collection and id
    pub fn child(&self, collection: &str, id: &str) -> Option<&MaterializedNode> {
        self.children.get(collection)?.iter().find(|n| n.id == id)
    }

    /// This node and every descendant, depth-first
    pub fn nodes(&self) -> Vec<&MaterializedNode> {
        let mut out = vec![self];
        for nodes in self.children.values() {
            for node in nodes {
                out.extend(node.nodes());
            }
        }
        out
    }

    fn owner(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }

    fn descendant_mut(&mut self, path: &[(String, usize)]) -> Option<&mut MaterializedNode> {
        let mut current = self;
        for (collection, index) in path {
            current = current.children.get_mut(collection)?.get_mut(*index)?;
        }
        Some(current)
    }
}

/// Materialized corpus, root collections sorted by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Materialized {
    roots: BTreeMap<String, Vec<MaterializedNode>>,
}

impl Materialized {
    /// Root nodes of a collection, sorted by id
    pub fn collection(&self, name: &str) -> &[MaterializedNode] {
        self.roots.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Looks up a root node.
    pub fn find(&self, collection: &str, id: &str) -> Option<&MaterializedNode> {
        self.collection(collection).iter().find(|n| n.id == id)
    }

    /// Every node, roots and descendants, depth-first
    pub fn nodes(&self) -> Vec<&MaterializedNode> {
        self.roots
            .values()
            .flat_map(|nodes| nodes.iter())
            .flat_map(MaterializedNode::nodes)
            .collect()
    }

    /// The produced document: a `meta` block plus one array per root collection.
    pub fn to_document(&self, generated: DateTime<Utc>, counts: &BTreeMap<String, usize>) -> Value {
        let mut document = Map::new();
        document.insert(
            "meta".to_string(),
            json!({
                "generated": generated.to_rfc3339_opts(SecondsFormat::Secs, true),
                "counts": counts,
            }),
        );
        for (collection, nodes) in &self.roots {
            document.insert(
                collection.clone(),
                Value::Array(nodes.iter().map(MaterializedNode::to_document).collect()),
            );
        }
        Value::Object(document)
    }
}

/// Builds [`Materialized`] corpora from loaded forests.
pub struct Materializer<'a> {
    registry: &'a SchemaRegistry,
    /// Corpus root; document URLs are built relative to it
    root: PathBuf,
    base_url: String,
}

impl<'a> Materializer<'a> {
    pub fn new(registry: &'a SchemaRegistry, root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            registry,
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    /// Materializes every root entity and, transitively, its descendants.
    ///
    /// # Errors
    ///
    /// - `DanglingAttachmentTarget` / `AmbiguousAttachmentTarget` when a
    ///   nested target does not name exactly one descendant
    /// - `DuplicateAttachmentKey` on a key collision
    /// - `Io` if an image cannot be read
    pub fn materialize(&self, forest: &Forest) -> CorpusResult<Materialized> {
        let mut roots = BTreeMap::new();
        for (collection, entities) in forest.root_collections() {
            roots.insert(collection.to_string(), self.materialize_all(entities)?);
        }
        Ok(Materialized { roots })
    }

    fn materialize_all(&self, entities: &[Entity]) -> CorpusResult<Vec<MaterializedNode>> {
        let mut nodes = entities
            .iter()
            .map(|e| self.materialize_entity(e))
            .collect::<CorpusResult<Vec<_>>>()?;
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    fn materialize_entity(&self, entity: &Entity) -> CorpusResult<MaterializedNode> {
        let mut children = BTreeMap::new();
        for (collection, entities) in entity.children() {
            let nodes = self.materialize_all(entities)?;
            if !nodes.is_empty() {
                children.insert(collection.clone(), nodes);
            }
        }

        let mut node = MaterializedNode {
            kind: entity.kind().to_string(),
            collection: entity.collection().to_string(),
            id: entity.id().to_string(),
            document: entity.fields().clone(),
            children,
            document_attached: false,
        };

        // Children are sorted at this point, so located paths stay valid.
        for attachment in entity.attachments() {
            let (target, key) = match &attachment.target {
                None => (&mut node, attachment.key()),
                Some(nested) => {
                    let (path, split) = self.locate(&node, attachment, nested)?;
                    let owner = node.owner();
                    let target = node
                        .descendant_mut(&path)
                        .ok_or_else(|| dangling(attachment, nested, owner))?;
                    (target, split.key())
                }
            };
            self.embed(target, attachment, key)?;
        }

        Ok(node)
    }

    /// Finds the single descendant of `node` the nested target names, and
    /// the `<id>-<base>` reading that names it.
    ///
    /// Readings are tried longest id first. More than one matching
    /// descendant, across all readings, is ambiguous.
    fn locate<'n>(
        &self,
        node: &MaterializedNode,
        attachment: &Attachment,
        nested: &'n NestedTarget,
    ) -> CorpusResult<(NodePath, &'n TargetSplit)> {
        let chain = self.registry.ownership_chain(&nested.kind)?;

        // Collections from just below `node` down to the target kind
        let steps: Vec<&str> = match chain.iter().position(|k| *k == node.kind) {
            Some(depth) if depth > 0 => chain[..depth]
                .iter()
                .rev()
                .map(|kind| self.registry.collection_for_kind(kind).map(|c| c.name.as_str()))
                .collect::<SchemaResult<Vec<&str>>>()?,
            _ => return Err(dangling(attachment, nested, node.owner())),
        };

        let mut matches = Vec::new();
        for split in &nested.splits {
            let mut found = Vec::new();
            collect_matches(node, &steps, &split.id, &mut Vec::new(), &mut found);
            matches.extend(found.into_iter().map(|path| (path, split)));
        }

        match matches.len() {
            0 => Err(dangling(attachment, nested, node.owner())),
            1 => Ok(matches.remove(0)),
            n => {
                let mut ids: Vec<&str> = matches.iter().map(|(_, split)| split.id.as_str()).collect();
                ids.dedup();
                Err(CorpusError::AmbiguousAttachmentTarget {
                    path: attachment.path.clone(),
                    kind: nested.kind.clone(),
                    id: ids.join("', '"),
                    owner: node.owner(),
                    matches: n,
                })
            }
        }
    }

    fn embed(&self, node: &mut MaterializedNode, attachment: &Attachment, key: String) -> CorpusResult<()> {
        let owner = node.owner();
        let field = attachment.category.field_name();

        match attachment.category {
            AttachmentCategory::Image => {
                let bytes = fs::read(&attachment.path).map_err(|e| CorpusError::io(&attachment.path, e))?;

                let images = node
                    .document
                    .entry(field.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                let Value::Object(images) = images else {
                    return Err(CorpusError::MalformedIndex {
                        path: attachment.path.clone(),
                        reason: format!("field '{}' of {} is not a mapping", field, owner),
                    });
                };
                if images.contains_key(&key) {
                    return Err(CorpusError::DuplicateAttachmentKey {
                        path: attachment.path.clone(),
                        category: field.to_string(),
                        key,
                        owner,
                    });
                }
                images.insert(
                    key,
                    json!({ "type": attachment.extension, "data": STANDARD.encode(bytes) }),
                );
            }
            AttachmentCategory::Document => {
                // An index-declared URL is replaced; a second document is a collision.
                if node.document_attached {
                    return Err(CorpusError::DuplicateAttachmentKey {
                        path: attachment.path.clone(),
                        category: field.to_string(),
                        key: field.to_string(),
                        owner,
                    });
                }
                let url = self.document_url(attachment, &node.collection, &node.id);
                node.document.insert(field.to_string(), Value::String(url));
                node.document_attached = true;
            }
        }

        Ok(())
    }

    /// Base URL plus the file's path below the corpus root.
    fn document_url(&self, attachment: &Attachment, collection: &str, id: &str) -> String {
        let path = relative_url_path(&self.root, &attachment.path)
            .unwrap_or_else(|| {
                [collection, id, attachment.file_name.as_str()]
                    .iter()
                    .map(|segment| encode_url_segment(segment))
                    .collect::<Vec<_>>()
                    .join("/")
            });
        format!("{}{}", self.base_url, path)
    }
}

fn collect_matches(
    node: &MaterializedNode,
    steps: &[&str],
    id: &str,
    trail: &mut NodePath,
    out: &mut Vec<NodePath>,
) {
    let Some((collection, rest)) = steps.split_first() else {
        return;
    };
    let Some(children) = node.children.get(*collection) else {
        return;
    };

    for (index, child) in children.iter().enumerate() {
        trail.push((collection.to_string(), index));
        if rest.is_empty() {
            if child.id == id {
                out.push(trail.clone());
            }
        } else {
            collect_matches(child, rest, id, trail, out);
        }
        trail.pop();
    }
}

/// Reported with the longest candidate id.
fn dangling(attachment: &Attachment, nested: &NestedTarget, owner: String) -> CorpusError {
    CorpusError::DanglingAttachmentTarget {
        path: attachment.path.clone(),
        kind: nested.kind.clone(),
        id: nested.longest().map(|s| s.id.clone()).unwrap_or_default(),
        owner,
    }
}
