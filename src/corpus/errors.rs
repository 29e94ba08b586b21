//! # Corpus Errors
//!
//! Every variant here aborts the pass: it means the corpus on disk is
//! inconsistent and any partial result would mislead. Per-entity schema
//! violations never show up here; they are collected in a `ValidationReport`.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::schema::{SchemaError, SchemaErrorCode};

/// Result type for corpus operations
pub type CorpusResult<T> = Result<T, CorpusError>;

/// Fatal corpus errors
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("Unknown entity kind: {0}")]
    UnknownKind(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Missing index document: {}", .0.display())]
    MissingIndex(PathBuf),

    #[error("Malformed index document {}: {reason}", path.display())]
    MalformedIndex { path: PathBuf, reason: String },

    #[error("Unsupported attachment {}: extension '{extension}' is not recognized", path.display())]
    UnsupportedAttachment { path: PathBuf, extension: String },

    #[error("Dangling attachment target {}: no {kind} '{id}' below {owner}", path.display())]
    DanglingAttachmentTarget {
        path: PathBuf,
        kind: String,
        id: String,
        owner: String,
    },

    #[error("Ambiguous attachment target {}: {matches} {kind} entities named '{id}' below {owner}", path.display())]
    AmbiguousAttachmentTarget {
        path: PathBuf,
        kind: String,
        id: String,
        owner: String,
        matches: usize,
    },

    #[error("Duplicate attachment key '{key}' in {category} of {owner}: {}", path.display())]
    DuplicateAttachmentKey {
        path: PathBuf,
        category: String,
        key: String,
        owner: String,
    },

    #[error("Invalid identifier '{0}': not usable as a directory name")]
    InvalidIdentifier(String),

    #[error("Invalid parent chain for {collection}/{id}: {reason}")]
    InvalidParentChain {
        collection: String,
        id: String,
        reason: String,
    },

    #[error(transparent)]
    Schema(SchemaError),

    #[error("I/O error at {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CorpusError {
    /// Wraps an I/O failure with the path it happened at
    pub fn io(path: &Path, err: io::Error) -> Self {
        CorpusError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            CorpusError::UnknownKind(_) => "COINDEX_UNKNOWN_KIND",
            CorpusError::UnknownCollection(_) => "COINDEX_UNKNOWN_COLLECTION",
            CorpusError::MissingIndex(_) => "COINDEX_MISSING_INDEX",
            CorpusError::MalformedIndex { .. } => "COINDEX_MALFORMED_INDEX",
            CorpusError::UnsupportedAttachment { .. } => "COINDEX_UNSUPPORTED_ATTACHMENT",
            CorpusError::DanglingAttachmentTarget { .. } => "COINDEX_DANGLING_ATTACHMENT_TARGET",
            CorpusError::AmbiguousAttachmentTarget { .. } => "COINDEX_AMBIGUOUS_ATTACHMENT_TARGET",
            CorpusError::DuplicateAttachmentKey { .. } => "COINDEX_DUPLICATE_ATTACHMENT_KEY",
            CorpusError::InvalidIdentifier(_) => "COINDEX_INVALID_IDENTIFIER",
            CorpusError::InvalidParentChain { .. } => "COINDEX_INVALID_PARENT_CHAIN",
            CorpusError::Schema(e) => e.code().code(),
            CorpusError::Io { .. } => "COINDEX_IO_ERROR",
            CorpusError::Serialization(_) => "COINDEX_SERIALIZATION_ERROR",
        }
    }

    /// The offending file or directory, when there is one
    pub fn path(&self) -> Option<&Path> {
        match self {
            CorpusError::MissingIndex(path)
            | CorpusError::MalformedIndex { path, .. }
            | CorpusError::UnsupportedAttachment { path, .. }
            | CorpusError::DanglingAttachmentTarget { path, .. }
            | CorpusError::AmbiguousAttachmentTarget { path, .. }
            | CorpusError::DuplicateAttachmentKey { path, .. }
            | CorpusError::Io { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl From<SchemaError> for CorpusError {
    fn from(e: SchemaError) -> Self {
        if e.code() == SchemaErrorCode::UnknownKind {
            if let Some(kind) = e.kind() {
                return CorpusError::UnknownKind(kind.to_string());
            }
        }
        CorpusError::Schema(e)
    }
}

impl From<serde_json::Error> for CorpusError {
    fn from(e: serde_json::Error) -> Self {
        CorpusError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for CorpusError {
    fn from(e: serde_yaml::Error) -> Self {
        CorpusError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_kind_from_schema_error() {
        let err: CorpusError = SchemaError::unknown_kind("coin").into();
        assert!(matches!(err, CorpusError::UnknownKind(ref k) if k == "coin"));
        assert_eq!(err.code(), "COINDEX_UNKNOWN_KIND");
    }

    #[test]
    fn test_other_schema_errors_are_wrapped() {
        let err: CorpusError = SchemaError::taxonomy_mismatch("no schema").into();
        assert_eq!(err.code(), "COINDEX_TAXONOMY_MISMATCH");
        assert!(err.path().is_none());
    }

    #[test]
    fn test_fatal_errors_carry_paths() {
        let err = CorpusError::MissingIndex(PathBuf::from("assets/btc/asset.yaml"));
        assert_eq!(err.path(), Some(Path::new("assets/btc/asset.yaml")));
        assert!(err.to_string().contains("assets/btc/asset.yaml"));

        let err = CorpusError::DuplicateAttachmentKey {
            path: PathBuf::from("assets/btc/logo_small.png"),
            category: "images".into(),
            key: "logo_small".into(),
            owner: "assets/btc".into(),
        };
        assert!(err.to_string().contains("logo_small"));
        assert_eq!(err.code(), "COINDEX_DUPLICATE_ATTACHMENT_KEY");
    }

    #[test]
    fn test_io_error_wrapping() {
        let err = CorpusError::io(
            Path::new("/data/assets"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/data/assets"));
        assert!(err.to_string().contains("denied"));
    }
}
