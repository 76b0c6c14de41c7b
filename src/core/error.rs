//! Typed error handling for the engine
//!
//! This module provides the error hierarchy returned by schema building and
//! query execution, so callers can match on specific failures instead of
//! inspecting strings.
//!
//! # Error Categories
//!
//! - [`SchemaError`]: build-time validation failures, fatal to `complete()`
//! - [`EngineError::NotCompleted`]: execution attempted on an unfinished schema
//! - [`EngineError::FieldNotFound`]: a query references an undeclared field or type
//! - [`ArgumentError`]: argument binding failures, scoped to one field
//! - [`DocumentError`]: problems with the parsed query document itself
//! - [`StoreError`]: opaque backend failures, propagated unmodified
//!
//! # Example
//!
//! ```rust,ignore
//! match executor.execute_str("{ user(id: 1) { nickname } }").await {
//!     Ok(data) => println!("{}", data),
//!     Err(EngineError::FieldNotFound { type_name, field }) => {
//!         eprintln!("{} has no field {}", type_name, field);
//!     }
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use serde::Serialize;
use std::fmt;

use crate::storage::StoreError;

/// The main error type of the engine
#[derive(Debug)]
pub enum EngineError {
    /// Schema declaration or completion errors
    Schema(SchemaError),

    /// The schema has not been completed yet
    NotCompleted,

    /// A selection names a field that the type does not declare
    FieldNotFound { type_name: String, field: String },

    /// A type condition or introspection lookup names an unknown type
    TypeNotFound { type_name: String },

    /// Argument binding failed for a field
    Argument(ArgumentError),

    /// The query document cannot be executed
    Document(DocumentError),

    /// Backend dispatch failed
    Backend(StoreError),

    /// A user-supplied side effect or post field failed
    Resolver {
        field: String,
        source: anyhow::Error,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Schema(e) => write!(f, "{}", e),
            EngineError::NotCompleted => {
                write!(f, "Schema must be completed before executing queries")
            }
            EngineError::FieldNotFound { type_name, field } => {
                write!(f, "Field '{}' not found on type '{}'", field, type_name)
            }
            EngineError::TypeNotFound { type_name } => {
                write!(f, "Type '{}' not found in schema", type_name)
            }
            EngineError::Argument(e) => write!(f, "{}", e),
            EngineError::Document(e) => write!(f, "{}", e),
            EngineError::Backend(e) => write!(f, "Backend execution failed: {}", e),
            EngineError::Resolver { field, source } => {
                write!(f, "Failed to resolve field '{}': {}", field, source)
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Schema(e) => Some(e),
            EngineError::Argument(e) => Some(e),
            EngineError::Document(e) => Some(e),
            EngineError::Backend(e) => Some(e),
            EngineError::Resolver { source, .. } => Some(&**source),
            EngineError::NotCompleted
            | EngineError::FieldNotFound { .. }
            | EngineError::TypeNotFound { .. } => None,
        }
    }
}

/// Serializable error payload for callers that report failures as JSON
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl EngineError {
    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::Schema(e) => e.error_code(),
            EngineError::NotCompleted => "SCHEMA_NOT_COMPLETED",
            EngineError::FieldNotFound { .. } => "SCHEMA_FIELD_NOT_FOUND",
            EngineError::TypeNotFound { .. } => "SCHEMA_TYPE_NOT_FOUND",
            EngineError::Argument(_) => "ARGUMENT_ERROR",
            EngineError::Document(_) => "DOCUMENT_ERROR",
            EngineError::Backend(_) => "BACKEND_EXECUTION_ERROR",
            EngineError::Resolver { .. } => "RESOLVER_ERROR",
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            EngineError::FieldNotFound { type_name, field } => Some(serde_json::json!({
                "type": type_name,
                "field": field
            })),
            EngineError::Argument(e) => Some(serde_json::json!({
                "field": e.field(),
            })),
            _ => None,
        }
    }
}

impl From<SchemaError> for EngineError {
    fn from(err: SchemaError) -> Self {
        EngineError::Schema(err)
    }
}

impl From<ArgumentError> for EngineError {
    fn from(err: ArgumentError) -> Self {
        EngineError::Argument(err)
    }
}

impl From<DocumentError> for EngineError {
    fn from(err: DocumentError) -> Self {
        EngineError::Document(err)
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::Backend(err)
    }
}

// =============================================================================
// Schema Errors
// =============================================================================

/// Build-time schema validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// A type with the same source shape or name is already declared
    DuplicateType { name: String },

    /// The type already declares a field with this name
    DuplicateField { type_name: String, field: String },

    /// Two merged fields share a name but not a type
    FieldTypeConflict {
        type_name: String,
        field: String,
        existing: String,
        conflicting: String,
    },

    /// A field, interface or union member references an undeclared type
    UnknownType { name: String, referenced_by: String },

    /// The source-shape or interface hierarchy contains a cycle
    CyclicHierarchy { type_name: String },

    /// A type, field or argument name is not a valid identifier
    InvalidName { name: String },

    /// A relation between two types is not allowed
    InvalidRelation { message: String },

    /// `complete()` already ran
    AlreadyCompleted,
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::DuplicateType { name } => {
                write!(f, "Type '{}' is already declared", name)
            }
            SchemaError::DuplicateField { type_name, field } => {
                write!(f, "Field '{}' is already declared on '{}'", field, type_name)
            }
            SchemaError::FieldTypeConflict {
                type_name,
                field,
                existing,
                conflicting,
            } => {
                write!(
                    f,
                    "Field '{}' on '{}' has conflicting types '{}' and '{}'",
                    field, type_name, existing, conflicting
                )
            }
            SchemaError::UnknownType {
                name,
                referenced_by,
            } => {
                write!(
                    f,
                    "Unknown type '{}' referenced by '{}'",
                    name, referenced_by
                )
            }
            SchemaError::CyclicHierarchy { type_name } => {
                write!(f, "Type hierarchy of '{}' contains a cycle", type_name)
            }
            SchemaError::InvalidName { name } => {
                write!(f, "'{}' is not a valid name", name)
            }
            SchemaError::InvalidRelation { message } => {
                write!(f, "Invalid type relation: {}", message)
            }
            SchemaError::AlreadyCompleted => write!(f, "Schema is already completed"),
        }
    }
}

impl std::error::Error for SchemaError {}

impl SchemaError {
    pub fn error_code(&self) -> &'static str {
        match self {
            SchemaError::DuplicateType { .. } => "DUPLICATE_TYPE",
            SchemaError::DuplicateField { .. } => "DUPLICATE_FIELD",
            SchemaError::FieldTypeConflict { .. } => "FIELD_TYPE_CONFLICT",
            SchemaError::UnknownType { .. } => "UNKNOWN_TYPE",
            SchemaError::CyclicHierarchy { .. } => "CYCLIC_HIERARCHY",
            SchemaError::InvalidName { .. } => "INVALID_NAME",
            SchemaError::InvalidRelation { .. } => "INVALID_RELATION",
            SchemaError::AlreadyCompleted => "ALREADY_COMPLETED",
        }
    }
}

// =============================================================================
// Argument Errors
// =============================================================================

/// Errors raised while binding a field's arguments
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentError {
    /// A non-null argument has no value
    Missing { field: String, argument: String },

    /// The field does not declare this argument
    Unknown { field: String, argument: String },

    /// A variable reference has no value and no default
    UndefinedVariable { field: String, variable: String },

    /// The value does not satisfy the argument type
    Invalid {
        field: String,
        argument: String,
        message: String,
    },

    /// The argument type is neither a scalar nor an enum
    UnknownType {
        field: String,
        argument: String,
        type_name: String,
    },
}

impl ArgumentError {
    /// Field the error is scoped to
    pub fn field(&self) -> &str {
        match self {
            ArgumentError::Missing { field, .. }
            | ArgumentError::Unknown { field, .. }
            | ArgumentError::UndefinedVariable { field, .. }
            | ArgumentError::Invalid { field, .. }
            | ArgumentError::UnknownType { field, .. } => field,
        }
    }
}

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentError::Missing { field, argument } => {
                write!(f, "Missing required argument '{}' on '{}'", argument, field)
            }
            ArgumentError::Unknown { field, argument } => {
                write!(f, "Unknown argument '{}' on '{}'", argument, field)
            }
            ArgumentError::UndefinedVariable { field, variable } => {
                write!(f, "Variable '${}' used by '{}' is not defined", variable, field)
            }
            ArgumentError::Invalid {
                field,
                argument,
                message,
            } => {
                write!(
                    f,
                    "Invalid value for argument '{}' on '{}': {}",
                    argument, field, message
                )
            }
            ArgumentError::UnknownType {
                field,
                argument,
                type_name,
            } => {
                write!(
                    f,
                    "Argument '{}' on '{}' has unknown input type '{}'",
                    argument, field, type_name
                )
            }
        }
    }
}

impl std::error::Error for ArgumentError {}

// =============================================================================
// Document Errors
// =============================================================================

/// Errors related to the query document
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentError {
    /// Query text could not be parsed
    Parse { message: String },

    /// The document contains no operation
    NoOperation,

    /// No operation with the requested name
    UnknownOperation { name: String },

    /// A fragment spread names an undefined fragment
    UnknownFragment { name: String },

    /// The operation kind is not supported
    Unsupported { operation: String },

    /// Selections nest deeper than the configured limit
    TooDeep { max_depth: usize },
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentError::Parse { message } => {
                write!(f, "Failed to parse query: {}", message)
            }
            DocumentError::NoOperation => write!(f, "No operation found in query"),
            DocumentError::UnknownOperation { name } => {
                write!(f, "Unknown operation named '{}'", name)
            }
            DocumentError::UnknownFragment { name } => {
                write!(f, "Unknown fragment '{}'", name)
            }
            DocumentError::Unsupported { operation } => {
                write!(f, "{} are not supported", operation)
            }
            DocumentError::TooDeep { max_depth } => {
                write!(f, "Query exceeds the maximum depth of {}", max_depth)
            }
        }
    }
}

impl std::error::Error for DocumentError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(EngineError::NotCompleted.error_code(), "SCHEMA_NOT_COMPLETED");
        assert_eq!(
            EngineError::from(SchemaError::AlreadyCompleted).error_code(),
            "ALREADY_COMPLETED"
        );
        assert_eq!(
            EngineError::from(StoreError::UnknownCollection("x".into())).error_code(),
            "BACKEND_EXECUTION_ERROR"
        );
    }

    #[test]
    fn test_field_not_found_response_details() {
        let err = EngineError::FieldNotFound {
            type_name: "User".to_string(),
            field: "nickname".to_string(),
        };
        let response = err.to_response();
        assert_eq!(response.code, "SCHEMA_FIELD_NOT_FOUND");
        assert_eq!(response.message, "Field 'nickname' not found on type 'User'");
        assert_eq!(
            response.details,
            Some(serde_json::json!({"type": "User", "field": "nickname"}))
        );
    }

    #[test]
    fn test_argument_error_is_scoped_to_field() {
        let err = ArgumentError::Missing {
            field: "user".to_string(),
            argument: "id".to_string(),
        };
        assert_eq!(err.field(), "user");
        assert_eq!(err.to_string(), "Missing required argument 'id' on 'user'");
    }

    #[test]
    fn test_backend_error_source_is_preserved() {
        use std::error::Error;

        let err = EngineError::from(StoreError::LockPoisoned("read"));
        let source = err.source().expect("should have a source");
        assert_eq!(source.to_string(), "Failed to acquire read lock");
    }

    #[test]
    fn test_document_error_display() {
        let err = DocumentError::Unsupported {
            operation: "Subscriptions".to_string(),
        };
        assert_eq!(err.to_string(), "Subscriptions are not supported");
    }
}
