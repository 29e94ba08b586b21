//! # Attachment Classifier
//!
//! Every file beside an index document is an attachment. Its extension
//! decides the category; an unknown extension aborts the load so that a
//! stray file never disappears silently.
//!
//! A file named `<childKind>-<childId>-<base>.<ext>` belongs to a descendant
//! entity rather than to the entity whose directory holds it, e.g.
//! `network-mainnet-logo.svg` in `assets/btc/`. Ids may contain hyphens
//! themselves, so every `<childId>-<base>` reading is kept and the
//! materializer picks the one that names an existing descendant.

use std::fs;
use std::path::{Path, PathBuf};

use super::errors::{CorpusError, CorpusResult};
use super::layout::is_hidden;
use crate::schema::SchemaRegistry;

/// Attachment category, derived from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttachmentCategory {
    /// Embedded inline as base64
    Image,
    /// Published as a URL
    Document,
}

impl AttachmentCategory {
    /// Category for a lowercase extension, `None` if unsupported
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "svg" | "png" => Some(AttachmentCategory::Image),
            "pdf" => Some(AttachmentCategory::Document),
            _ => None,
        }
    }

    /// Field of the materialized document the category lands in
    pub fn field_name(&self) -> &'static str {
        match self {
            AttachmentCategory::Image => "images",
            AttachmentCategory::Document => "whitepaper",
        }
    }
}

/// One reading of `<childId>-<base>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSplit {
    pub id: String,
    pub base: String,
}

impl TargetSplit {
    /// Attachment key under this reading
    pub fn key(&self) -> String {
        attachment_key(&self.base)
    }
}

/// Descendant entity an attachment may be addressed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedTarget {
    pub kind: String,
    /// Every non-empty `<id>-<base>` reading, longest id first
    pub splits: Vec<TargetSplit>,
}

impl NestedTarget {
    /// Reading with the longest id
    pub fn longest(&self) -> Option<&TargetSplit> {
        self.splits.first()
    }

    /// Candidate ids, longest first
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.splits.iter().map(|s| s.id.as_str())
    }
}

/// One loose file beside an index document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name on disk, prefix included
    pub file_name: String,
    /// Full path on disk
    pub path: PathBuf,
    pub category: AttachmentCategory,
    /// Lowercase extension without the dot
    pub extension: String,
    /// File name without the extension
    pub stem: String,
    pub target: Option<NestedTarget>,
}

impl Attachment {
    /// Key of the untargeted reading: stem with hyphens as underscores
    pub fn key(&self) -> String {
        attachment_key(&self.stem)
    }
}

fn attachment_key(base: &str) -> String {
    base.replace('-', "_")
}

/// Classifies the loose files of entity directories.
pub struct AttachmentClassifier {
    /// Known kinds, longest first so the longest prefix wins
    kinds: Vec<String>,
}

impl AttachmentClassifier {
    /// Classifier that decodes nested targets for the registry's kinds
    pub fn new(registry: &SchemaRegistry) -> Self {
        Self::with_kinds(registry.kinds())
    }

    pub fn with_kinds<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut kinds: Vec<String> = kinds.into_iter().map(Into::into).collect();
        kinds.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        Self { kinds }
    }

    /// Classifies every file in `dir` except the index document.
    ///
    /// Subdirectories and hidden files are skipped. Result is sorted by file name.
    pub fn classify_dir(&self, dir: &Path, index_file_name: &str) -> CorpusResult<Vec<Attachment>> {
        let entries = fs::read_dir(dir).map_err(|e| CorpusError::io(dir, e))?;

        let mut attachments = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CorpusError::io(dir, e))?;
            let file_type = entry.file_type().map_err(|e| CorpusError::io(&entry.path(), e))?;
            if file_type.is_dir() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                return Err(CorpusError::UnsupportedAttachment {
                    path: entry.path(),
                    extension: String::new(),
                });
            };
            if file_name == index_file_name || is_hidden(&file_name) {
                continue;
            }
            attachments.push(self.classify(dir, &file_name)?);
        }

        attachments.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(attachments)
    }

    /// Classifies one file name found in `dir`.
    pub fn classify(&self, dir: &Path, file_name: &str) -> CorpusResult<Attachment> {
        let path = dir.join(file_name);
        let (stem, extension) = match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, ext.to_ascii_lowercase()),
            _ => (file_name, String::new()),
        };

        let category = AttachmentCategory::from_extension(&extension).ok_or_else(|| {
            CorpusError::UnsupportedAttachment {
                path: path.clone(),
                extension: extension.clone(),
            }
        })?;

        Ok(Attachment {
            file_name: file_name.to_string(),
            path,
            category,
            extension,
            stem: stem.to_string(),
            target: self.decode_target(stem),
        })
    }

    /// Reads `<kind>-<id>-<base>` for the longest known kind that has at
    /// least one reading with a non-empty id and base.
    fn decode_target(&self, stem: &str) -> Option<NestedTarget> {
        self.kinds.iter().find_map(|kind| {
            let rest = stem.strip_prefix(kind.as_str())?.strip_prefix('-')?;
            let splits: Vec<TargetSplit> = rest
                .rmatch_indices('-')
                .map(|(at, _)| (&rest[..at], &rest[at + 1..]))
                .filter(|(id, base)| !id.is_empty() && !base.is_empty())
                .map(|(id, base)| TargetSplit {
                    id: id.to_string(),
                    base: base.to_string(),
                })
                .collect();
            if splits.is_empty() {
                return None;
            }
            Some(NestedTarget {
                kind: kind.clone(),
                splits,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn classifier() -> AttachmentClassifier {
        AttachmentClassifier::with_kinds(["asset", "network", "market", "market-pair"])
    }

    fn split(id: &str, base: &str) -> TargetSplit {
        TargetSplit {
            id: id.into(),
            base: base.into(),
        }
    }

    #[test]
    fn test_untargeted_image() {
        let a = classifier().classify(Path::new("/d"), "logo-small.png").unwrap();
        assert_eq!(a.category, AttachmentCategory::Image);
        assert_eq!(a.extension, "png");
        assert_eq!(a.stem, "logo-small");
        assert_eq!(a.key(), "logo_small");
        assert!(a.target.is_none());
    }

    #[test]
    fn test_document_category() {
        let a = classifier().classify(Path::new("/d"), "whitepaper.PDF").unwrap();
        assert_eq!(a.category, AttachmentCategory::Document);
        assert_eq!(a.extension, "pdf");
        assert_eq!(a.category.field_name(), "whitepaper");
    }

    #[test]
    fn test_unsupported_extension_is_fatal() {
        let err = classifier().classify(Path::new("/d"), "notes.txt").unwrap_err();
        assert!(matches!(
            err,
            CorpusError::UnsupportedAttachment { ref extension, .. } if extension == "txt"
        ));
        assert_eq!(err.path(), Some(Path::new("/d/notes.txt")));

        assert!(classifier().classify(Path::new("/d"), "Makefile").is_err());
    }

    #[test]
    fn test_nested_target_decoded() {
        let a = classifier()
            .classify(Path::new("/d"), "network-mainnet-logo.svg")
            .unwrap();
        assert_eq!(
            a.target,
            Some(NestedTarget {
                kind: "network".into(),
                splits: vec![split("mainnet", "logo")],
            })
        );
        assert_eq!(a.target.unwrap().splits[0].key(), "logo");
        assert_eq!(a.file_name, "network-mainnet-logo.svg");
    }

    #[test]
    fn test_hyphenated_ids_keep_every_reading() {
        let a = classifier()
            .classify(Path::new("/d"), "network-binance-smart-chain-logo-dark.svg")
            .unwrap();
        let target = a.target.unwrap();
        assert_eq!(target.kind, "network");
        assert_eq!(
            target.ids().collect::<Vec<_>>(),
            ["binance-smart-chain-logo", "binance-smart-chain", "binance-smart", "binance"]
        );
        assert_eq!(target.longest(), Some(&split("binance-smart-chain-logo", "dark")));
        assert_eq!(target.splits[3].key(), "smart_chain_logo_dark");
    }

    #[test]
    fn test_longest_kind_wins() {
        let a = classifier()
            .classify(Path::new("/d"), "market-pair-btcusd-icon.png")
            .unwrap();
        let target = a.target.unwrap();
        assert_eq!(target.kind, "market-pair");
        assert_eq!(target.splits, vec![split("btcusd", "icon")]);
    }

    #[test]
    fn test_unknown_kind_prefix_is_untargeted() {
        let a = classifier().classify(Path::new("/d"), "token-usdt-logo.png").unwrap();
        assert!(a.target.is_none());
        assert_eq!(a.key(), "token_usdt_logo");
    }

    #[test]
    fn test_kind_prefix_without_base_is_untargeted() {
        let a = classifier().classify(Path::new("/d"), "network-logo.png").unwrap();
        assert!(a.target.is_none());
        assert_eq!(a.key(), "network_logo");

        let b = classifier().classify(Path::new("/d"), "network--logo.png").unwrap();
        assert!(b.target.is_none());
    }

    #[test]
    fn test_classify_dir_skips_index_hidden_and_subdirs() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("asset.yaml"), "name: x").unwrap();
        fs::write(tmp.path().join(".DS_Store"), "").unwrap();
        fs::write(tmp.path().join("logo.svg"), "<svg/>").unwrap();
        fs::write(tmp.path().join("brand.png"), [0u8, 1, 2]).unwrap();
        fs::create_dir(tmp.path().join("networks")).unwrap();

        let attachments = classifier().classify_dir(tmp.path(), "asset.yaml").unwrap();
        let names: Vec<_> = attachments.iter().map(|a| a.file_name.as_str()).collect();
        assert_eq!(names, ["brand.png", "logo.svg"]);
    }
}
