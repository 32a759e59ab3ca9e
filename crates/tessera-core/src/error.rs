//! Error types for tessera operations.
//!
//! Schema errors are fatal for a whole run; identity errors only fail the
//! instance being built. Merge conflicts are not errors and live in
//! [`crate::merge`].

use thiserror::Error;

/// Result type alias for tessera operations.
pub type TesseraResult<T> = Result<T, TesseraError>;

/// Main error type for all tessera operations.
#[derive(Error, Debug)]
pub enum TesseraError {
    /// Schema description is malformed, ambiguous or contradicted by an instance.
    #[error("Schema error: {message}")]
    Schema {
        message: String,
        code: ErrorCode,
        type_name: Option<String>,
        field: Option<String>,
    },

    /// An instance could not be assigned an identity.
    #[error("Identity error: {message}")]
    Identity {
        message: String,
        code: ErrorCode,
        type_name: String,
        field: Option<String>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Schema (SCH_xxx)
    SchemaUnknownType,
    SchemaInvalidIdentity,
    SchemaCycle,
    SchemaDepthExceeded,
    SchemaInstanceMismatch,
    SchemaIdentityCollision,
    SchemaDuplicateType,
    SchemaInvalidRelationship,

    // Identity (IDN_xxx)
    IdentityMissingField,
    IdentityEmptyField,

    // Configuration (CFG_xxx)
    ConfigInvalid,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::SchemaUnknownType => "SCH_001",
            ErrorCode::SchemaInvalidIdentity => "SCH_002",
            ErrorCode::SchemaCycle => "SCH_003",
            ErrorCode::SchemaDepthExceeded => "SCH_004",
            ErrorCode::SchemaInstanceMismatch => "SCH_005",
            ErrorCode::SchemaIdentityCollision => "SCH_006",
            ErrorCode::SchemaDuplicateType => "SCH_007",
            ErrorCode::SchemaInvalidRelationship => "SCH_008",
            ErrorCode::IdentityMissingField => "IDN_001",
            ErrorCode::IdentityEmptyField => "IDN_002",
            ErrorCode::ConfigInvalid => "CFG_001",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl TesseraError {
    /// A type name was referenced but never registered.
    pub fn unknown_type(type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self::Schema {
            message: format!("type '{}' is not registered", type_name),
            code: ErrorCode::SchemaUnknownType,
            type_name: Some(type_name),
            field: None,
        }
    }

    /// An identity field declaration is unusable.
    pub fn invalid_identity(
        type_name: impl Into<String>,
        field: impl Into<String>,
        reason: &str,
    ) -> Self {
        let type_name = type_name.into();
        let field = field.into();
        Self::Schema {
            message: format!("identity field '{}.{}' {}", type_name, field, reason),
            code: ErrorCode::SchemaInvalidIdentity,
            type_name: Some(type_name),
            field: Some(field),
        }
    }

    /// An instance value does not have the shape its schema declares.
    pub fn instance_mismatch(
        type_name: impl Into<String>,
        field: impl Into<String>,
        expected: &str,
    ) -> Self {
        let type_name = type_name.into();
        let field = field.into();
        Self::Schema {
            message: format!("field '{}.{}' must hold {}", type_name, field, expected),
            code: ErrorCode::SchemaInstanceMismatch,
            type_name: Some(type_name),
            field: Some(field),
        }
    }

    /// The same node id was produced by two different types.
    pub fn identity_collision(node_id: &str, existing: &str, incoming: &str) -> Self {
        Self::Schema {
            message: format!(
                "node '{}' is bound to type '{}' and '{}'",
                node_id, existing, incoming
            ),
            code: ErrorCode::SchemaIdentityCollision,
            type_name: Some(incoming.to_string()),
            field: None,
        }
    }

    /// A required identity field is absent.
    pub fn missing_identity(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        let type_name = type_name.into();
        let field = field.into();
        Self::Identity {
            message: format!("identity field '{}.{}' is missing", type_name, field),
            code: ErrorCode::IdentityMissingField,
            type_name,
            field: Some(field),
        }
    }

    /// A required identity field is present but empty.
    pub fn empty_identity(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        let type_name = type_name.into();
        let field = field.into();
        Self::Identity {
            message: format!("identity field '{}.{}' is empty", type_name, field),
            code: ErrorCode::IdentityEmptyField,
            type_name,
            field: Some(field),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Schema { code, .. } => *code,
            Self::Identity { code, .. } => *code,
            Self::Configuration(_) => ErrorCode::ConfigInvalid,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether this error must abort a whole multi-unit run.
    ///
    /// Identity errors only fail the instance that produced them.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Identity { .. })
    }

    /// The schema type this error names, if any.
    pub fn type_name(&self) -> Option<&str> {
        match self {
            Self::Schema { type_name, .. } => type_name.as_deref(),
            Self::Identity { type_name, .. } => Some(type_name),
            _ => None,
        }
    }

    /// The field this error names, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Schema { field, .. } | Self::Identity { field, .. } => field.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_type_error() {
        let err = TesseraError::unknown_type("Invoice");
        assert_eq!(err.code(), ErrorCode::SchemaUnknownType);
        assert_eq!(err.type_name(), Some("Invoice"));
        assert!(err.is_fatal());
        assert!(err.to_string().contains("Invoice"));
    }

    #[test]
    fn test_identity_error_is_not_fatal() {
        let err = TesseraError::empty_identity("Person", "name");
        assert_eq!(err.code(), ErrorCode::IdentityEmptyField);
        assert_eq!(err.field(), Some("name"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::SchemaCycle.as_str(), "SCH_003");
        assert_eq!(ErrorCode::IdentityMissingField.as_str(), "IDN_001");
        assert_eq!(ErrorCode::ConfigInvalid.as_str(), "CFG_001");
    }

    #[test]
    fn test_collision_names_both_types() {
        let err = TesseraError::identity_collision("x:1", "Person", "Organization");
        let text = err.to_string();
        assert!(text.contains("Person"));
        assert!(text.contains("Organization"));
        assert_eq!(err.code(), ErrorCode::SchemaIdentityCollision);
    }
}
