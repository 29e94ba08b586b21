//! On-disk layout shared by the walker and the upsert writer
//!
//! ```text
//! <root>/<collection>/[<shard>/]<id>/<kind>.<format>
//! <entity dir>/<child collection>/[<shard>/]<child id>/<child kind>.<format>
//! ```

use std::path::{Path, PathBuf};

use crate::config::{CollectionDef, IndexFormat};

/// Shard directory for identifiers starting with a digit
pub const NUMERIC_SHARD: &str = "0";

/// Shard directory for identifiers with no directory-safe first character
pub const FALLBACK_SHARD: &str = "_";

/// Shard an identifier is filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardKey {
    /// First character is an ASCII digit
    Numeric,
    /// First character is an ASCII letter, kept as-is
    Letter(char),
    /// Anything else, including the empty identifier
    Fallback,
}

impl ShardKey {
    pub fn of(id: &str) -> Self {
        match id.chars().next() {
            Some(c) if c.is_ascii_digit() => ShardKey::Numeric,
            Some(c) if c.is_ascii_alphabetic() => ShardKey::Letter(c),
            _ => ShardKey::Fallback,
        }
    }

    pub fn dir_name(&self) -> String {
        match self {
            ShardKey::Numeric => NUMERIC_SHARD.to_string(),
            ShardKey::Letter(c) => c.to_string(),
            ShardKey::Fallback => FALLBACK_SHARD.to_string(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ShardKey::Fallback)
    }
}

/// Dotfiles and dot-directories are never part of the corpus
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Directory holding a collection's entities below `parent_dir`
pub fn collection_dir(parent_dir: &Path, collection: &CollectionDef) -> PathBuf {
    parent_dir.join(&collection.name)
}

/// Directory of one entity, shard level included when the collection is sharded
pub fn entity_dir(parent_dir: &Path, collection: &CollectionDef, id: &str) -> PathBuf {
    let base = collection_dir(parent_dir, collection);
    if collection.sharded {
        base.join(ShardKey::of(id).dir_name()).join(id)
    } else {
        base.join(id)
    }
}

/// Index document path inside an entity directory
pub fn index_path(entity_dir: &Path, collection: &CollectionDef, format: IndexFormat) -> PathBuf {
    entity_dir.join(collection.index_file_name(format))
}

/// Slash-joined path of `path` relative to `root`, each segment percent-encoded for URLs
pub fn relative_url_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<String>> = relative
        .components()
        .map(|c| c.as_os_str().to_str().map(encode_url_segment))
        .collect();
    Some(parts?.join("/"))
}

/// Percent-encodes one path segment. Only RFC 3986 unreserved bytes pass through.
pub fn encode_url_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
