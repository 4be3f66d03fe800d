//! Postgres failures that are the caller's fault rather than the server's.

use sea_orm::{DbErr, RuntimeErr};
use tracing::debug;

use crate::domain::error::DomainError;

/// SQLSTATE class 22: bad date, out-of-range number, over-long string, ...
const DATA_EXCEPTION_CLASS: &str = "22";
const DUPLICATE_TABLE: &str = "42P07";
/// Concurrent `CREATE TABLE` of one name can also trip the `pg_type` unique index.
const UNIQUE_VIOLATION: &str = "23505";

/// SQLSTATE and message of the Postgres error behind `err`, if there is one.
fn diagnostics(err: &DbErr) -> Option<(String, String)> {
    let (DbErr::Exec(runtime) | DbErr::Query(runtime)) = err else {
        return None;
    };
    let RuntimeErr::SqlxError(sqlx::Error::Database(db)) = runtime else {
        return None;
    };
    Some((db.code()?.into_owned(), db.message().to_owned()))
}

#[must_use]
pub fn is_data_exception(code: &str) -> bool {
    code.starts_with(DATA_EXCEPTION_CLASS)
}

#[must_use]
pub fn is_duplicate_table(code: &str) -> bool {
    code == DUPLICATE_TABLE || code == UNIQUE_VIOLATION
}

/// Surface attribute values Postgres refused to cast as validation errors.
#[must_use]
pub fn reject_bad_data(err: DbErr) -> anyhow::Error {
    match diagnostics(&err) {
        Some((code, message)) if is_data_exception(&code) => {
            debug!(%code, %message, "Database rejected an attribute value");
            DomainError::validation("attributes", message).into()
        }
        _ => err.into(),
    }
}

/// Surface a lost `CREATE TABLE` race as a name conflict.
#[must_use]
pub fn reject_duplicate_table(err: DbErr, table: &str) -> anyhow::Error {
    match diagnostics(&err) {
        Some((code, _)) if is_duplicate_table(&code) => {
            debug!(%code, table, "Table was created concurrently");
            DomainError::TableAlreadyExists {
                table: table.to_owned(),
            }
            .into()
        }
        _ => err.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_exception_codes() {
        // invalid_datetime_format, numeric_value_out_of_range, string_data_right_truncation
        for code in ["22007", "22003", "22001", "22P02"] {
            assert!(is_data_exception(code), "{code}");
        }
        for code in ["23502", "42P01", "XX000"] {
            assert!(!is_data_exception(code), "{code}");
        }
    }

    #[test]
    fn duplicate_table_codes() {
        assert!(is_duplicate_table("42P07"));
        assert!(is_duplicate_table("23505"));
        assert!(!is_duplicate_table("42P01"));
    }

    #[test]
    fn non_database_errors_pass_through() {
        let err = reject_bad_data(DbErr::Custom("pool closed".to_owned()));
        assert!(err.downcast_ref::<DomainError>().is_none());
        assert!(err.downcast_ref::<DbErr>().is_some());

        let err = reject_duplicate_table(DbErr::Custom("pool closed".to_owned()), "roads");
        assert!(err.downcast_ref::<DomainError>().is_none());
    }
}
