use spatial_features_sdk::{GeometryKind, SpatialFeaturesError};

use super::geometry::GeometryViolation;

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Invalid table name '{name}'")]
    InvalidTableName { name: String },

    #[error("Table '{table}' not found")]
    TableNotFound { table: String },

    #[error("Table '{table}' cannot be served: {reason}")]
    UnsupportedTable { table: String, reason: String },

    #[error("Feature {id} not found in table '{table}'")]
    FeatureNotFound { table: String, id: i64 },

    #[error("Unknown query operation '{operation}'")]
    UnknownOperation { operation: String },

    #[error("Table '{table}' already exists")]
    TableAlreadyExists { table: String },

    #[error("Geometry kind mismatch: table expects {expected:?}, got {actual:?}")]
    GeometryKindMismatch {
        expected: GeometryKind,
        actual: GeometryKind,
    },

    #[error("Validation error on field '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("Database error: {0}")]
    Database(anyhow::Error),
}

/// Storage errors may carry a classified [`DomainError`]; everything else is
/// an internal database failure.
impl From<anyhow::Error> for DomainError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<Self>() {
            Ok(domain) => domain,
            Err(err) => Self::Database(err),
        }
    }
}

impl DomainError {
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn table_not_found(table: impl Into<String>) -> Self {
        Self::TableNotFound {
            table: table.into(),
        }
    }
}

impl From<GeometryViolation> for DomainError {
    fn from(v: GeometryViolation) -> Self {
        Self::Validation {
            field: v.field,
            message: v.message,
        }
    }
}

impl From<DomainError> for SpatialFeaturesError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::TableNotFound { .. }
            | DomainError::UnsupportedTable { .. }
            | DomainError::FeatureNotFound { .. }
            | DomainError::UnknownOperation { .. } => Self::not_found(e.to_string()),
            DomainError::TableAlreadyExists { .. } => Self::conflict(e.to_string()),
            DomainError::InvalidTableName { .. } | DomainError::GeometryKindMismatch { .. } => {
                Self::validation(e.to_string())
            }
            DomainError::Validation { field, message } => {
                Self::validation(format!("{field}: {message}"))
            }
            DomainError::Database(_) => Self::internal(),
        }
    }
}
