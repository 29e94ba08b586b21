//! Schema subsystem for coindex
//!
//! Schemas are mandatory: every collection has exactly one, every schema
//! belongs to exactly one collection, and documents are always checked
//! against the strict variant.
//!
//! # Design Principles
//!
//! - Strict by derivation: objects reject undeclared fields unless a schema
//!   explicitly opens them
//! - No nulls, defaults, or coercion
//! - Violations are collected, not short-circuited
//! - Referential checks are batched per corpus
//! - Deterministic validation

mod errors;
mod references;
mod registry;
mod types;
mod validator;

pub use errors::{SchemaError, SchemaErrorCode, SchemaResult, Severity, ValidationDetails};
pub use references::{IdentifierRegistry, Reference, CUSTOM_PREFIX};
pub use registry::SchemaRegistry;
pub use types::{FieldDef, FieldType, Schema, StringFormat, ID_FIELD};
pub use validator::{DocumentCheck, SchemaValidator};
