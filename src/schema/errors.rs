//! Schema error types
//!
//! Error codes:
//! - COINDEX_UNKNOWN_KIND (FATAL)
//! - COINDEX_MALFORMED_SCHEMA (FATAL)
//! - COINDEX_TAXONOMY_MISMATCH (FATAL)
//! - COINDEX_DUPLICATE_KIND (FATAL)
//! - COINDEX_SCHEMA_VALIDATION_FAILED (REJECT)

use std::fmt;

/// Severity levels for schema errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// One document rejected, the pass continues
    Reject,
    /// The corpus or its schemas are inconsistent, the pass aborts
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Schema-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorCode {
    /// No schema governs the requested kind
    UnknownKind,
    /// A schema file could not be read, parsed, or is structurally invalid
    MalformedSchema,
    /// Collections and schemas do not map one-to-one, or parent linkage is broken
    TaxonomyMismatch,
    /// Two schema files govern the same kind
    DuplicateKind,
    /// Document violates schema
    ValidationFailed,
}

impl SchemaErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaErrorCode::UnknownKind => "COINDEX_UNKNOWN_KIND",
            SchemaErrorCode::MalformedSchema => "COINDEX_MALFORMED_SCHEMA",
            SchemaErrorCode::TaxonomyMismatch => "COINDEX_TAXONOMY_MISMATCH",
            SchemaErrorCode::DuplicateKind => "COINDEX_DUPLICATE_KIND",
            SchemaErrorCode::ValidationFailed => "COINDEX_SCHEMA_VALIDATION_FAILED",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            SchemaErrorCode::ValidationFailed => Severity::Reject,
            _ => Severity::Fatal,
        }
    }
}

impl fmt::Display for SchemaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One schema violation inside a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationDetails {
    /// Field path (e.g., "api.docs[2].url")
    pub field: String,
    /// Expected type or condition
    pub expected: String,
    /// Actual value or type found
    pub actual: String,
}

impl ValidationDetails {
    pub fn new(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::new(field, "field to be present", "missing")
    }

    pub fn extra_field(field: impl Into<String>) -> Self {
        Self::new(field, "no undeclared fields", "extra field present")
    }

    pub fn type_mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::new(field, expected, actual)
    }

    pub fn null_value(field: impl Into<String>) -> Self {
        Self::new(field, "non-null value", "null")
    }
}

impl fmt::Display for ValidationDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field '{}': expected {}, got {}",
            self.field, self.expected, self.actual
        )
    }
}

/// Schema error type with full context
#[derive(Debug, Clone)]
pub struct SchemaError {
    code: SchemaErrorCode,
    message: String,
    /// Entity kind if applicable
    kind: Option<String>,
    /// Offending schema file or directory if applicable
    path: Option<String>,
    /// Every violation found, for validation failures
    details: Vec<ValidationDetails>,
}

impl SchemaError {
    fn new(code: SchemaErrorCode, message: String) -> Self {
        Self {
            code,
            message,
            kind: None,
            path: None,
            details: Vec::new(),
        }
    }

    /// Create an unknown kind error
    pub fn unknown_kind(kind: impl Into<String>) -> Self {
        let kind = kind.into();
        let mut err = Self::new(
            SchemaErrorCode::UnknownKind,
            format!("No schema governs kind '{}'", kind),
        );
        err.kind = Some(kind);
        err
    }

    /// Create an error for a malformed schema file
    pub fn malformed_schema(path: impl Into<String>, reason: impl Into<String>) -> Self {
        let path = path.into();
        let mut err = Self::new(
            SchemaErrorCode::MalformedSchema,
            format!("Malformed schema '{}': {}", path, reason.into()),
        );
        err.path = Some(path);
        err
    }

    /// Create a taxonomy mismatch error
    pub fn taxonomy_mismatch(reason: impl Into<String>) -> Self {
        Self::new(SchemaErrorCode::TaxonomyMismatch, reason.into())
    }

    /// Create a duplicate kind error
    pub fn duplicate_kind(kind: impl Into<String>, path: impl Into<String>) -> Self {
        let kind = kind.into();
        let path = path.into();
        let mut err = Self::new(
            SchemaErrorCode::DuplicateKind,
            format!("Kind '{}' is declared again in '{}'", kind, path),
        );
        err.kind = Some(kind);
        err.path = Some(path);
        err
    }

    /// Create a validation failed error carrying every violation
    pub fn validation_failed(kind: impl Into<String>, details: Vec<ValidationDetails>) -> Self {
        let kind = kind.into();
        let summary = details
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        let mut err = Self::new(
            SchemaErrorCode::ValidationFailed,
            format!("Document of kind '{}' failed validation: {}", kind, summary),
        );
        err.kind = Some(kind);
        err.details = details;
        err
    }

    /// Returns the error code
    pub fn code(&self) -> SchemaErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the entity kind if applicable
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// Returns the offending path if applicable
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Returns the violations, empty unless this is a validation failure
    pub fn details(&self) -> &[ValidationDetails] {
        &self.details
    }

    /// Returns whether this is a fatal error
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for SchemaError {}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;
