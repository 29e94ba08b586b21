//! Known-identifier registry
//!
//! Records point at outside identifiers (a `webids.github` key, a market
//! quote currency). Schemas mark such values with `registry` / `key_registry`;
//! the validator collects them while walking documents and resolves the whole
//! batch against this registry once per corpus.
//!
//! The registry file maps a namespace to its known identifiers:
//!
//! ```yaml
//! webids: [github, twitter, coinmarketcap, telegram]
//! currencies: [btc, eth, usd]
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;

use super::errors::{SchemaError, SchemaResult};

/// Identifiers with this prefix are author-defined and always resolve.
pub const CUSTOM_PREFIX: &str = "custom:";

/// One identifier a document refers to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Reference {
    /// Registry namespace
    pub namespace: String,
    /// Referenced identifier
    pub value: String,
    /// Field path the reference was found at
    pub field: String,
}

impl Reference {
    pub fn new(
        namespace: impl Into<String>,
        value: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            value: value.into(),
            field: field.into(),
        }
    }

    /// Whether the identifier lives in the reserved custom namespace
    pub fn is_custom(&self) -> bool {
        self.value.starts_with(CUSTOM_PREFIX)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field '{}': '{}' is not a known {} identifier",
            self.field, self.value, self.namespace
        )
    }
}

/// Known identifiers grouped by namespace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierRegistry {
    namespaces: BTreeMap<String, BTreeSet<String>>,
}

impl IdentifierRegistry {
    /// An empty registry: only custom identifiers resolve.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a YAML or JSON namespace map.
    pub fn load(path: &Path) -> SchemaResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SchemaError::malformed_schema(
                path.display().to_string(),
                format!("Failed to read identifier registry: {}", e),
            )
        })?;

        // YAML is a superset of JSON, one parser covers both.
        let raw: BTreeMap<String, Vec<String>> = serde_yaml::from_str(&content).map_err(|e| {
            SchemaError::malformed_schema(
                path.display().to_string(),
                format!("Invalid identifier registry: {}", e),
            )
        })?;

        let mut registry = Self::new();
        for (namespace, ids) in raw {
            for id in ids {
                registry.insert(&namespace, id);
            }
        }
        Ok(registry)
    }

    /// Adds an identifier to a namespace.
    pub fn insert(&mut self, namespace: &str, id: impl Into<String>) {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(id.into());
    }

    /// Checks an identifier, honouring the custom namespace.
    pub fn resolves(&self, namespace: &str, id: &str) -> bool {
        id.starts_with(CUSTOM_PREFIX)
            || self
                .namespaces
                .get(namespace)
                .is_some_and(|ids| ids.contains(id))
    }

    /// Returns the references that do not resolve, in input order.
    pub fn unresolved<'r>(&self, references: &'r [Reference]) -> Vec<&'r Reference> {
        references
            .iter()
            .filter(|r| !self.resolves(&r.namespace, &r.value))
            .collect()
    }

    /// Total number of known identifiers.
    pub fn len(&self) -> usize {
        self.namespaces.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolves_known_and_custom() {
        let mut registry = IdentifierRegistry::new();
        registry.insert("webids", "github");

        assert!(registry.resolves("webids", "github"));
        assert!(registry.resolves("webids", "custom:forum"));
        assert!(!registry.resolves("webids", "myspace"));
        assert!(!registry.resolves("currencies", "github"));
    }

    #[test]
    fn test_unresolved_keeps_input_order() {
        let mut registry = IdentifierRegistry::new();
        registry.insert("webids", "github");
        let refs = vec![
            Reference::new("webids", "zzz", "webids.zzz"),
            Reference::new("webids", "github", "webids.github"),
            Reference::new("webids", "aaa", "webids.aaa"),
        ];

        let unresolved = registry.unresolved(&refs);
        assert_eq!(unresolved.len(), 2);
        assert_eq!(unresolved[0].value, "zzz");
        assert_eq!(unresolved[1].value, "aaa");
    }

    #[test]
    fn test_load_yaml_registry() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ids.yaml");
        fs::write(&path, "webids: [github, twitter]\ncurrencies:\n  - btc\n").unwrap();

        let registry = IdentifierRegistry::load(&path).unwrap();
        assert_eq!(registry.len(), 3);
        assert!(registry.resolves("currencies", "btc"));
    }

    #[test]
    fn test_load_json_registry() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ids.json");
        fs::write(&path, r#"{"webids": ["github"]}"#).unwrap();

        assert!(IdentifierRegistry::load(&path).unwrap().resolves("webids", "github"));
    }

    #[test]
    fn test_malformed_registry() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ids.yaml");
        fs::write(&path, "webids: github").unwrap();
        assert!(IdentifierRegistry::load(&path).is_err());
    }

    #[test]
    fn test_reference_display() {
        let r = Reference::new("webids", "myspace", "webids.myspace");
        assert!(r.to_string().contains("myspace"));
        assert!(!r.is_custom());
        assert!(Reference::new("webids", "custom:x", "f").is_custom());
    }
}
