use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;

use super::problem::Problem;
use crate::domain::error::DomainError;
use crate::domain::geometry::GEOMETRY_FIELD;

pub type ApiResult<T> = Result<T, Problem>;

fn current_trace_id() -> Option<String> {
    tracing::Span::current()
        .id()
        .map(|id| id.into_u64().to_string())
}

/// Map a domain error to an RFC 9457 Problem.
pub fn domain_error_to_problem(e: &DomainError, instance: &str) -> Problem {
    let problem = match e {
        DomainError::InvalidTableName { .. } => {
            Problem::bad_request(e.to_string()).with_code("INVALID_TABLE_NAME")
        }
        DomainError::TableNotFound { .. } => {
            Problem::not_found(e.to_string()).with_code("TABLE_NOT_FOUND")
        }
        DomainError::UnsupportedTable { .. } => {
            Problem::not_found(e.to_string()).with_code("UNSUPPORTED_TABLE")
        }
        DomainError::FeatureNotFound { .. } => {
            Problem::not_found(e.to_string()).with_code("FEATURE_NOT_FOUND")
        }
        DomainError::UnknownOperation { .. } => {
            Problem::not_found(e.to_string()).with_code("UNKNOWN_OPERATION")
        }
        DomainError::TableAlreadyExists { .. } => {
            Problem::conflict(e.to_string()).with_code("TABLE_ALREADY_EXISTS")
        }
        DomainError::GeometryKindMismatch { expected, actual } => {
            Problem::unprocessable(e.to_string())
                .with_code("GEOMETRY_KIND_MISMATCH")
                .with_violation(
                    format!("{GEOMETRY_FIELD}.type"),
                    format!(
                        "table accepts {} geometries, got {}",
                        expected.geojson_type(),
                        actual.geojson_type()
                    ),
                )
        }
        DomainError::Validation { field, message } => {
            let code = if field.starts_with(GEOMETRY_FIELD) {
                "INVALID_GEOMETRY"
            } else {
                "VALIDATION_ERROR"
            };
            Problem::unprocessable(format!("Validation error on '{field}': {message}"))
                .with_code(code)
                .with_violation(field.as_str(), message.as_str())
        }
        DomainError::Database(_) => {
            tracing::error!(error = ?e, "Database error occurred");
            Problem::internal_error("An internal database error occurred").with_code("INTERNAL")
        }
    };

    let problem = problem.with_instance(instance);
    match current_trace_id() {
        Some(id) => problem.with_trace_id(id),
        None => problem,
    }
}

/// Attach the request path to a failed domain result.
pub trait ProblemAt<T> {
    /// # Errors
    /// Converts the domain error into a [`Problem`] with `instance` set.
    fn at(self, instance: &str) -> ApiResult<T>;
}

impl<T> ProblemAt<T> for Result<T, DomainError> {
    fn at(self, instance: &str) -> ApiResult<T> {
        self.map_err(|e| domain_error_to_problem(&e, instance))
    }
}

pub fn json_rejection(rejection: &JsonRejection, instance: &str) -> Problem {
    let problem = match rejection {
        JsonRejection::MissingJsonContentType(_) => Problem::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Unsupported Media Type",
            rejection.body_text(),
        ),
        _ => Problem::unprocessable(rejection.body_text()).with_violation("body", "malformed JSON body"),
    };
    problem.with_code("INVALID_BODY").with_instance(instance)
}

pub fn path_rejection(rejection: &PathRejection, instance: &str) -> Problem {
    Problem::bad_request(rejection.body_text())
        .with_code("INVALID_PATH")
        .with_instance(instance)
}

pub fn query_rejection(rejection: &QueryRejection, instance: &str) -> Problem {
    Problem::unprocessable(rejection.body_text())
        .with_code("INVALID_QUERY_STRING")
        .with_instance(instance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spatial_features_sdk::GeometryKind;

    #[test]
    fn status_mapping() {
        let cases = [
            (DomainError::InvalidTableName { name: "bad-name!".to_owned() }, 400),
            (DomainError::table_not_found("does_not_exist"), 404),
            (
                DomainError::UnsupportedTable {
                    table: "t".to_owned(),
                    reason: "composite primary keys are not supported".to_owned(),
                },
                404,
            ),
            (DomainError::FeatureNotFound { table: "t".to_owned(), id: 9 }, 404),
            (DomainError::UnknownOperation { operation: "touches".to_owned() }, 404),
            (DomainError::TableAlreadyExists { table: "t".to_owned() }, 409),
            (
                DomainError::GeometryKindMismatch {
                    expected: GeometryKind::Point,
                    actual: GeometryKind::LineString,
                },
                422,
            ),
            (DomainError::validation("name", "expected a string value"), 422),
            (DomainError::Database(anyhow::anyhow!("boom")), 500),
        ];
        for (err, status) in cases {
            let p = domain_error_to_problem(&err, "/features/t/");
            assert_eq!(p.status.as_u16(), status, "{err}");
            assert_eq!(p.instance, "/features/t/");
        }
    }

    #[test]
    fn geometry_violations_carry_path() {
        let p = domain_error_to_problem(
            &DomainError::validation("geometry.coordinates[0]", "Polygon ring must have at least 4 points"),
            "/",
        );
        assert_eq!(p.code, "INVALID_GEOMETRY");
        let errors = p.errors.unwrap();
        assert_eq!(errors[0].field, "geometry.coordinates[0]");
        assert_eq!(errors[0].message, "Polygon ring must have at least 4 points");
    }

    #[test]
    fn database_detail_is_not_exposed() {
        let err = DomainError::Database(anyhow::anyhow!("password authentication failed for user orata"));
        let p = domain_error_to_problem(&err, "/");
        assert_eq!(p.detail, "An internal database error occurred");
        assert!(!serde_json::to_string(&p).unwrap().contains("orata"));
    }
}
