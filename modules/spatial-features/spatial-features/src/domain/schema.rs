//! Identifier and attribute rules that depend only on a reflected [`TableSchema`].

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use spatial_features_sdk::{Attributes, ColumnInfo, ColumnType, TableSchema};

use super::error::DomainError;

/// Postgres truncates identifiers beyond this length.
pub const MAX_IDENTIFIER_LEN: usize = 63;

#[allow(clippy::expect_used)] // constant pattern
static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("static regex should not panic")
});

#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    name.len() <= MAX_IDENTIFIER_LEN && IDENTIFIER.is_match(name)
}

/// Validate a table name from a request and fold it to lower case, the way
/// Postgres folds unquoted identifiers.
///
/// # Errors
/// Returns [`DomainError::InvalidTableName`] when the name is not a plain identifier.
pub fn normalize_table_name(name: &str) -> Result<String, DomainError> {
    if is_valid_identifier(name) {
        Ok(name.to_ascii_lowercase())
    } else {
        Err(DomainError::InvalidTableName {
            name: name.to_owned(),
        })
    }
}

/// Whether a write supplies every column (create) or replaces the row (update).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Replace,
}

/// A value ready to be bound to one attribute column.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    /// Use the column default.
    Default,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Json(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeBinding {
    pub column: String,
    pub udt_name: String,
    pub value: AttributeValue,
}

/// Check incoming attributes against the table and produce one binding per
/// attribute column, in column order.
///
/// Absent columns become `NULL` on replace (full replacement) and the column
/// default on create when there is one. A required column without default
/// must be supplied.
///
/// # Errors
/// Returns [`DomainError::Validation`] for unknown columns, server-managed
/// columns, type mismatches and missing required values.
pub fn bind_attributes(
    schema: &TableSchema,
    attributes: &Attributes,
    mode: WriteMode,
) -> Result<Vec<AttributeBinding>, DomainError> {
    for key in attributes.keys() {
        if *key == schema.id_column || *key == schema.geometry_column {
            return Err(DomainError::validation(
                key.as_str(),
                "column is managed by the server",
            ));
        }
        if schema.column(key).is_none() {
            return Err(DomainError::validation(
                key.as_str(),
                format!("unknown attribute for table '{}'", schema.name),
            ));
        }
    }

    schema
        .columns
        .iter()
        .map(|column| {
            let value = match attributes.get(&column.name) {
                Some(v) => convert_value(column, v)?,
                None => absent_value(column, mode)?,
            };
            Ok(AttributeBinding {
                column: column.name.clone(),
                udt_name: column.udt_name.clone(),
                value,
            })
        })
        .collect()
}

fn absent_value(column: &ColumnInfo, mode: WriteMode) -> Result<AttributeValue, DomainError> {
    match mode {
        WriteMode::Create if column.has_default => Ok(AttributeValue::Default),
        _ if column.nullable => Ok(AttributeValue::Null),
        WriteMode::Replace if column.has_default => Ok(AttributeValue::Default),
        _ => Err(DomainError::validation(
            column.name.as_str(),
            "value is required",
        )),
    }
}

fn convert_value(column: &ColumnInfo, value: &Value) -> Result<AttributeValue, DomainError> {
    if value.is_null() {
        return if column.nullable {
            Ok(AttributeValue::Null)
        } else {
            Err(DomainError::validation(
                column.name.as_str(),
                "column is not nullable",
            ))
        };
    }

    let converted = match &column.column_type {
        ColumnType::Text | ColumnType::Date | ColumnType::Timestamp | ColumnType::Other(_) => {
            value.as_str().map(|s| AttributeValue::Text(s.to_owned()))
        }
        ColumnType::Integer => match value.as_i64() {
            Some(i) if !fits_integer_column(&column.udt_name, i) => {
                return Err(DomainError::validation(
                    column.name.as_str(),
                    format!("integer {i} is out of range for {}", column.udt_name),
                ));
            }
            other => other.map(AttributeValue::Integer),
        },
        ColumnType::Float => value.as_f64().map(AttributeValue::Float),
        ColumnType::Boolean => value.as_bool().map(AttributeValue::Boolean),
        ColumnType::Json => Some(AttributeValue::Json(value.clone())),
    };

    converted.ok_or_else(|| {
        DomainError::validation(
            column.name.as_str(),
            format!("expected {} value", expected_name(&column.column_type)),
        )
    })
}

/// Width check for `int2`/`int4`; `int8` takes any `i64`.
fn fits_integer_column(udt: &str, value: i64) -> bool {
    match udt {
        "int2" => i16::try_from(value).is_ok(),
        "int4" => i32::try_from(value).is_ok(),
        _ => true,
    }
}

fn expected_name(ty: &ColumnType) -> &'static str {
    match ty {
        ColumnType::Text | ColumnType::Other(_) => "a string",
        ColumnType::Date => "a date string",
        ColumnType::Timestamp => "a timestamp string",
        ColumnType::Integer => "an integer",
        ColumnType::Float => "a numeric",
        ColumnType::Boolean => "a boolean",
        ColumnType::Json => "a JSON",
    }
}

/// Map a catalog `udt_name` to the logical column type.
#[must_use]
pub fn column_type_for_udt(udt: &str) -> ColumnType {
    match udt {
        "text" | "varchar" | "bpchar" | "char" | "name" | "citext" => ColumnType::Text,
        "int2" | "int4" | "int8" => ColumnType::Integer,
        "float4" | "float8" | "numeric" => ColumnType::Float,
        "bool" => ColumnType::Boolean,
        "date" => ColumnType::Date,
        "timestamp" | "timestamptz" => ColumnType::Timestamp,
        "json" | "jsonb" => ColumnType::Json,
        other => ColumnType::Other(other.to_owned()),
    }
}
