use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Extension, Router};

use super::handlers;
use crate::domain::service::Service;

/// Feature, query and table-administration routes with the service attached.
///
/// Collection routes answer with and without the trailing slash.
#[must_use]
pub fn router(service: Arc<Service>) -> Router {
    let features = post(handlers::create_feature).get(handlers::list_features);
    let tables = get(handlers::list_tables).post(handlers::create_table);

    Router::new()
        .route("/features/{table}", features.clone())
        .route("/features/{table}/", features)
        .route(
            "/features/{table}/{id}",
            get(handlers::get_feature)
                .put(handlers::update_feature)
                .delete(handlers::delete_feature),
        )
        .route(
            "/features/{table}/query/{operation}",
            post(handlers::query_features),
        )
        .route("/spatial/buffer", post(handlers::buffer_geometry))
        .route("/spatial-tables", tables.clone())
        .route("/spatial-tables/", tables)
        .route(
            "/spatial-tables/{table}",
            get(handlers::describe_table).delete(handlers::drop_table),
        )
        .layer(Extension(service))
}
