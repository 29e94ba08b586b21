//! Observable corpus events
//!
//! Events are explicit and typed; the logger only ever sees their string form.

use std::fmt;

/// Observable events in a coindex pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration file parsed and validated
    ConfigLoaded,
    /// Schema registry built and taxonomy checked
    SchemasLoaded,
    /// Identifier registry loaded
    RegistryLoaded,

    // Load pass
    /// One entity directory loaded
    EntityLoaded,
    /// Empty entity directory skipped
    OrphanDirectorySkipped,
    /// Load pass aborted on a fatal corpus error
    LoadAborted,

    // Validation
    /// An entity failed schema validation
    ValidationFailed,
    /// A reference did not resolve against the identifier registry
    ReferenceUnresolved,

    // Upsert
    /// Identifier had no directory-safe shard, fallback shard used
    ShardKeyFallback,
    /// Upsert target already present, nothing written
    UpsertSkipped,
    /// Upsert wrote a new index document
    UpsertWritten,

    // Build
    /// Produced document written to disk
    BuildWritten,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::SchemasLoaded => "SCHEMAS_LOADED",
            Event::RegistryLoaded => "REGISTRY_LOADED",

            Event::EntityLoaded => "ENTITY_LOADED",
            Event::OrphanDirectorySkipped => "ORPHAN_DIRECTORY_SKIPPED",
            Event::LoadAborted => "LOAD_ABORTED",

            Event::ValidationFailed => "VALIDATION_FAILED",
            Event::ReferenceUnresolved => "REFERENCE_UNRESOLVED",

            Event::ShardKeyFallback => "SHARD_KEY_FALLBACK",
            Event::UpsertSkipped => "UPSERT_SKIPPED",
            Event::UpsertWritten => "UPSERT_WRITTEN",

            Event::BuildWritten => "BUILD_WRITTEN",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::LoadAborted)
    }

    /// Returns true if this event flags something an author should look at
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Event::OrphanDirectorySkipped
                | Event::ValidationFailed
                | Event::ReferenceUnresolved
                | Event::ShardKeyFallback
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
