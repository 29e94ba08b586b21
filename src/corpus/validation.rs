//! # Corpus Validation
//!
//! Runs every materialized node through the strict schema of its kind.
//! Violations never abort the pass; they are gathered into a
//! [`ValidationReport`]. References to the identifier registry are
//! collected along the way and resolved once, after all nodes are checked.

use std::fmt;

use super::errors::CorpusResult;
use super::materializer::Materialized;
use crate::observability::{log_event_with_fields, Event};
use crate::schema::{IdentifierRegistry, Reference, SchemaRegistry, SchemaValidator, ValidationDetails};

/// Schema violations of one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDiagnostic {
    pub collection: String,
    pub kind: String,
    pub id: String,
    pub violations: Vec<ValidationDetails>,
}

/// A reference that is not in the identifier registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    pub collection: String,
    pub kind: String,
    pub id: String,
    pub reference: Reference,
}

/// Aggregate result of one validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Number of entities checked
    pub checked: usize,
    pub failures: Vec<EntityDiagnostic>,
    pub unresolved: Vec<UnresolvedReference>,
}

impl ValidationReport {
    /// No violations and no unresolved references
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.unresolved.is_empty()
    }

    /// Total number of problems reported
    pub fn problem_count(&self) -> usize {
        self.failures.iter().map(|f| f.violations.len()).sum::<usize>() + self.unresolved.len()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for failure in &self.failures {
            writeln!(f, "{}/{} ({}):", failure.collection, failure.id, failure.kind)?;
            for violation in &failure.violations {
                writeln!(f, "  - {}", violation)?;
            }
        }
        for unresolved in &self.unresolved {
            writeln!(
                f,
                "{}/{} ({}): {}",
                unresolved.collection, unresolved.id, unresolved.kind, unresolved.reference
            )?;
        }
        write!(
            f,
            "{} entities checked, {} failed, {} unresolved references",
            self.checked,
            self.failures.len(),
            self.unresolved.len()
        )
    }
}

/// Validates materialized corpora.
pub struct CorpusValidator<'a> {
    registry: &'a SchemaRegistry,
    identifiers: &'a IdentifierRegistry,
}

impl<'a> CorpusValidator<'a> {
    pub fn new(registry: &'a SchemaRegistry, identifiers: &'a IdentifierRegistry) -> Self {
        Self {
            registry,
            identifiers,
        }
    }

    /// Checks every node and reports in aggregate.
    ///
    /// # Errors
    ///
    /// Only a node of a kind without a schema, which the loader never produces.
    pub fn validate(&self, materialized: &Materialized) -> CorpusResult<ValidationReport> {
        let validator = SchemaValidator::new(self.registry);
        let mut report = ValidationReport::default();
        let mut pending = Vec::new();

        for node in materialized.nodes() {
            let check = validator.check(node.kind(), &node.own_document())?;
            report.checked += 1;

            if !check.is_valid() {
                let count = check.violations.len().to_string();
                log_event_with_fields(
                    Event::ValidationFailed,
                    &[
                        ("collection", node.collection()),
                        ("id", node.id()),
                        ("violations", count.as_str()),
                    ],
                );
                report.failures.push(EntityDiagnostic {
                    collection: node.collection().to_string(),
                    kind: node.kind().to_string(),
                    id: node.id().to_string(),
                    violations: check.violations,
                });
            }

            for reference in check.references {
                pending.push((node, reference));
            }
        }

        // Cross-cutting check, once for the whole corpus
        for (node, reference) in pending {
            if self.identifiers.resolves(&reference.namespace, &reference.value) {
                continue;
            }
            log_event_with_fields(
                Event::ReferenceUnresolved,
                &[
                    ("collection", node.collection()),
                    ("id", node.id()),
                    ("field", reference.field.as_str()),
                    ("value", reference.value.as_str()),
                ],
            );
            report.unresolved.push(UnresolvedReference {
                collection: node.collection().to_string(),
                kind: node.kind().to_string(),
                id: node.id().to_string(),
                reference,
            });
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_collections, IndexFormat};
    use crate::corpus::materializer::Materializer;
    use crate::corpus::walker::CollectionWalker;
    use crate::schema::{FieldDef, FieldType, Schema};
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn registry() -> SchemaRegistry {
        let schemas = default_collections()
            .iter()
            .map(|c| {
                let mut fields = BTreeMap::new();
                fields.insert("id".to_string(), FieldDef::required_string());
                fields.insert("name".to_string(), FieldDef::required_string());
                if c.name == "assets" {
                    fields.insert(
                        "explorer".to_string(),
                        FieldDef::optional(FieldType::String {
                            values: None,
                            pattern: None,
                            format: None,
                            registry: Some("explorers".into()),
                        }),
                    );
                }
                Schema::new(c.kind(), c.name.clone(), fields)
            })
            .collect();
        SchemaRegistry::from_schemas(schemas, &default_collections()).unwrap()
    }

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn validate(root: &Path, identifiers: &IdentifierRegistry) -> ValidationReport {
        let registry = registry();
        let forest = CollectionWalker::new(&registry, root, IndexFormat::Yaml)
            .walk()
            .unwrap();
        let materialized = Materializer::new(&registry, root, "https://x/")
            .materialize(&forest)
            .unwrap();
        CorpusValidator::new(&registry, identifiers)
            .validate(&materialized)
            .unwrap()
    }

    #[test]
    fn test_clean_corpus() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("assets/btc/asset.yaml"), "name: Bitcoin\n");
        write(&tmp.path().join("assets/btc/networks/main/network.yaml"), "name: Main\n");

        let report = validate(tmp.path(), &IdentifierRegistry::new());
        assert!(report.is_clean());
        assert_eq!(report.checked, 2);
    }

    #[test]
    fn test_every_bad_entity_is_reported() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("assets/btc/asset.yaml"), "name: Bitcoin\nticker: BTC\n");
        write(&tmp.path().join("assets/eth/asset.yaml"), "{}\n");
        write(&tmp.path().join("exchanges/kraken/exchange.yaml"), "name: 42\n");

        let report = validate(tmp.path(), &IdentifierRegistry::new());
        assert_eq!(report.checked, 3);
        assert_eq!(report.failures.len(), 3);

        let btc = report.failures.iter().find(|f| f.id == "btc").unwrap();
        assert_eq!(btc.violations[0].field, "ticker");
        let text = report.to_string();
        assert!(text.contains("exchanges/kraken"));
        assert!(text.contains("3 failed"));
    }

    #[test]
    fn test_nested_violation_reported_on_child() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("assets/btc/asset.yaml"), "name: Bitcoin\n");
        write(&tmp.path().join("assets/btc/networks/main/network.yaml"), "{}\n");

        let report = validate(tmp.path(), &IdentifierRegistry::new());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, "network");
        assert_eq!(report.failures[0].id, "main");
    }

    #[test]
    fn test_references_resolved_once_for_corpus() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("assets/btc/asset.yaml"), "name: Bitcoin\nexplorer: blockchair\n");
        write(&tmp.path().join("assets/eth/asset.yaml"), "name: Ether\nexplorer: custom:mine\n");
        write(&tmp.path().join("assets/xmr/asset.yaml"), "name: Monero\nexplorer: nowhere\n");

        let mut identifiers = IdentifierRegistry::new();
        identifiers.insert("explorers", "blockchair");

        let report = validate(tmp.path(), &identifiers);
        assert!(report.failures.is_empty());
        assert_eq!(report.unresolved.len(), 1);
        assert_eq!(report.unresolved[0].id, "xmr");
        assert_eq!(report.unresolved[0].reference.value, "nowhere");
        assert_eq!(report.problem_count(), 1);
    }
}
