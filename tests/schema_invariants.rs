//! Schema Invariant Tests
//!
//! Tests for schema registry and validation invariants:
//! - The collection/schema taxonomy is a bijection
//! - Strict derivation closes every object unless explicitly opened
//! - Validation is deterministic
//! - Every violation is reported, not only the first
//! - Type matching is exact, nulls are rejected

use coindex::config::{default_collections, CollectionDef};
use coindex::schema::{
    FieldDef, FieldType, IdentifierRegistry, Schema, SchemaErrorCode, SchemaRegistry,
    SchemaValidator,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const ASSET_SCHEMA: &str = r#"
kind: asset
collection: assets
description: A crypto asset
fields:
  id: { type: string, required: true, pattern: "[a-z0-9-]+" }
  name: { type: string, required: true }
  type: { type: string, values: [coin, token] }
  whitepaper: { type: string, format: url }
  decimals: { type: int }
  images:
    type: map
    value_type:
      type: object
      fields:
        type: { type: string, required: true, values: [svg, png] }
        data: { type: string, required: true }
  links:
    type: object
    fields:
      web: { type: string, format: url }
      explorers:
        type: array
        element_type: { type: string, registry: explorers }
  extra:
    type: object
    additional_properties: true
"#;

fn minimal_schema(kind: &str, collection: &str) -> String {
    format!("kind: {kind}\ncollection: {collection}\nfields:\n  id: {{ type: string, required: true }}\n")
}

/// Schema directory for the default taxonomy, with a rich asset schema.
fn setup_registry() -> (TempDir, SchemaRegistry) {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("asset.yaml"), ASSET_SCHEMA).unwrap();
    for (kind, collection) in [
        ("exchange", "exchanges"),
        ("wallet", "wallets"),
        ("network", "networks"),
        ("market", "markets"),
    ] {
        fs::write(
            tmp.path().join(format!("{kind}.yaml")),
            minimal_schema(kind, collection),
        )
        .unwrap();
    }

    let registry = SchemaRegistry::load(tmp.path(), &default_collections()).unwrap();
    (tmp, registry)
}

fn id_only(kind: &str, collection: &str) -> Schema {
    let mut fields = BTreeMap::new();
    fields.insert("id".to_string(), FieldDef::required_string());
    Schema::new(kind, collection, fields)
}

// =============================================================================
// Taxonomy Tests
// =============================================================================

/// Every collection gets its schema; kinds and chains are indexed.
#[test]
fn test_registry_indexes_default_taxonomy() {
    let (_tmp, registry) = setup_registry();

    assert_eq!(registry.schema_count(), 5);
    assert_eq!(registry.collection_for_kind("market").unwrap().name, "markets");
    assert_eq!(registry.ownership_chain("network").unwrap(), ["network", "asset"]);
    assert_eq!(registry.ownership_chain("asset").unwrap(), ["asset"]);

    let roots: Vec<_> = registry.root_collections().map(|c| c.name.as_str()).collect();
    assert_eq!(roots, ["assets", "exchanges", "wallets"]);
}

/// A declared collection without a schema is fatal at load.
#[test]
fn test_collection_without_schema_fails() {
    let collections = vec![CollectionDef::root("assets"), CollectionDef::root("wallets")];
    let err = SchemaRegistry::from_schemas(vec![id_only("asset", "assets")], &collections).unwrap_err();

    assert_eq!(err.code(), SchemaErrorCode::TaxonomyMismatch);
    assert!(err.is_fatal());
}

/// A schema for an undeclared collection is fatal at load.
#[test]
fn test_schema_without_collection_fails() {
    let collections = vec![CollectionDef::root("assets")];
    let schemas = vec![id_only("asset", "assets"), id_only("token", "tokens")];
    let err = SchemaRegistry::from_schemas(schemas, &collections).unwrap_err();

    assert_eq!(err.code(), SchemaErrorCode::TaxonomyMismatch);
}

/// Unknown kinds are reported as such.
#[test]
fn test_unknown_kind() {
    let (_tmp, registry) = setup_registry();
    let err = registry.schema_for("token").unwrap_err();
    assert_eq!(err.code(), SchemaErrorCode::UnknownKind);
}

/// Kind overrides decouple the kind from the collection name.
#[test]
fn test_kind_override() {
    let collections = vec![CollectionDef::root("people").with_kind("person")];
    let registry = SchemaRegistry::from_schemas(vec![id_only("person", "people")], &collections).unwrap();
    assert!(registry.is_known_kind("person"));
    assert_eq!(collections[0].index_file_name(Default::default()), "person.yaml");
}

// =============================================================================
// Strict Derivation Tests
// =============================================================================

/// Undeclared fields fail at the root and in nested objects.
#[test]
fn test_undeclared_fields_rejected_everywhere() {
    let (_tmp, registry) = setup_registry();
    let validator = SchemaValidator::new(&registry);

    let doc = json!({
        "id": "btc",
        "name": "Bitcoin",
        "ticker": "BTC",
        "links": { "web": "https://bitcoin.org", "forum": "https://x" },
        "images": { "logo": { "type": "svg", "data": "PHN2Zy8+", "size": 3 } }
    });

    let check = validator.check("asset", &doc).unwrap();
    let fields: Vec<_> = check.violations.iter().map(|v| v.field.as_str()).collect();
    assert!(fields.contains(&"ticker"));
    assert!(fields.contains(&"links.forum"));
    assert!(fields.contains(&"images.logo.size"));
    assert_eq!(check.violations.len(), 3);
}

/// An explicit `additional_properties: true` survives strict derivation.
#[test]
fn test_explicit_openness_preserved() {
    let (_tmp, registry) = setup_registry();
    let validator = SchemaValidator::new(&registry);

    let doc = json!({ "id": "btc", "name": "Bitcoin", "extra": { "anything": [1, 2, 3] } });
    assert!(validator.validate_document("asset", &doc).is_ok());
}

// =============================================================================
// Validation Determinism Tests
// =============================================================================

/// Same document validates the same way every time.
#[test]
fn test_validation_is_deterministic() {
    let (_tmp, registry) = setup_registry();
    let validator = SchemaValidator::new(&registry);

    let doc = json!({ "id": "btc", "name": 1, "type": "stablecoin", "decimals": 1.5 });
    let first = validator.check("asset", &doc).unwrap();
    for _ in 0..50 {
        assert_eq!(validator.check("asset", &doc).unwrap(), first);
    }
}

// =============================================================================
// Type Matching Tests
// =============================================================================

/// Every violation is collected with path, expectation and actual value.
#[test]
fn test_all_violations_reported() {
    let (_tmp, registry) = setup_registry();
    let validator = SchemaValidator::new(&registry);

    let doc = json!({
        "id": "BTC!",
        "type": "stablecoin",
        "decimals": "8",
        "whitepaper": "bitcoin.pdf"
    });

    let err = validator.validate_document("asset", &doc).unwrap_err();
    assert_eq!(err.code(), SchemaErrorCode::ValidationFailed);
    assert!(!err.is_fatal());

    let fields: Vec<_> = err.details().iter().map(|d| d.field.as_str()).collect();
    for expected in ["id", "name", "type", "decimals", "whitepaper"] {
        assert!(fields.contains(&expected), "missing violation for {expected}");
    }
}

/// Null is never a value.
#[test]
fn test_null_rejected() {
    let (_tmp, registry) = setup_registry();
    let validator = SchemaValidator::new(&registry);

    let doc = json!({ "id": "btc", "name": "Bitcoin", "decimals": null });
    let check = validator.check("asset", &doc).unwrap();
    assert_eq!(check.violations.len(), 1);
    assert_eq!(check.violations[0].field, "decimals");
    assert_eq!(check.violations[0].actual, "null");
}

/// Integers are not strings, strings are not integers.
#[test]
fn test_no_coercion() {
    let (_tmp, registry) = setup_registry();
    let validator = SchemaValidator::new(&registry);

    let ok = json!({ "id": "btc", "name": "Bitcoin", "decimals": 8 });
    assert!(validator.validate_document("asset", &ok).is_ok());

    let bad = json!({ "id": "btc", "name": "Bitcoin", "decimals": "8" });
    assert!(validator.validate_document("asset", &bad).is_err());
}

// =============================================================================
// Referential Check Tests
// =============================================================================

/// Registry-bound values are collected and resolved against the registry.
#[test]
fn test_references_resolve_against_registry() {
    let (_tmp, registry) = setup_registry();
    let validator = SchemaValidator::new(&registry);

    let doc = json!({
        "id": "btc",
        "name": "Bitcoin",
        "links": { "explorers": ["blockchair", "custom:home", "nowhere"] }
    });
    let check = validator.check("asset", &doc).unwrap();
    assert!(check.is_valid());
    assert_eq!(check.references.len(), 3);

    let mut identifiers = IdentifierRegistry::new();
    identifiers.insert("explorers", "blockchair");
    let unresolved = identifiers.unresolved(&check.references);
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].value, "nowhere");
    assert_eq!(unresolved[0].field, "links.explorers[2]");
}

/// Schemas can be built in code as well as loaded.
#[test]
fn test_in_code_schema_matches_loaded_behavior() {
    let mut fields = BTreeMap::new();
    fields.insert("id".to_string(), FieldDef::required_string());
    fields.insert("tags".to_string(), FieldDef::optional_array(FieldType::string()));
    let collections = vec![CollectionDef::root("wallets")];
    let registry =
        SchemaRegistry::from_schemas(vec![Schema::new("wallet", "wallets", fields)], &collections).unwrap();
    let validator = SchemaValidator::new(&registry);

    assert!(validator
        .validate_document("wallet", &json!({ "id": "electrum", "tags": ["desktop"] }))
        .is_ok());
    let check = validator
        .check("wallet", &json!({ "id": "electrum", "tags": ["desktop", 7] }))
        .unwrap();
    assert_eq!(check.violations[0].field, "tags[1]");
}
