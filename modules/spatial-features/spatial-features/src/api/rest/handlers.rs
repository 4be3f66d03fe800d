use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Extension, Path, Query};
use axum::http::{StatusCode, Uri, header};
use axum::response::IntoResponse;
use serde_json::Value;
use spatial_features_sdk::{NewSpatialTable, QueryOperation};
use tracing::instrument;

use super::dto::{
    self, BufferRequest, BufferResponse, CreateTableRequest, FeatureBody, FeatureCollectionDto,
    FeatureDto, ListParams, MessageDto, QueryBody, TableCreatedDto, TableListDto, TableSchemaDto,
};
use super::error::{ApiResult, ProblemAt, json_rejection, path_rejection, query_rejection};
use super::problem::Problem;
use crate::domain::error::DomainError;
use crate::domain::geometry::parse_geometry;
use crate::domain::schema::normalize_table_name;
use crate::domain::service::Service;

fn table_name(raw: &str, instance: &str) -> ApiResult<String> {
    normalize_table_name(raw).at(instance)
}

fn path_params<T>(path: Result<Path<T>, PathRejection>, instance: &str) -> ApiResult<T> {
    path.map(|Path(p)| p)
        .map_err(|r| path_rejection(&r, instance))
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>, instance: &str) -> ApiResult<T> {
    body.map(|Json(b)| b)
        .map_err(|r| json_rejection(&r, instance))
}

#[utoipa::path(
    post,
    path = "/features/{table}/",
    tag = "features",
    params(("table" = String, Path, description = "Spatial table name")),
    request_body = FeatureBody,
    responses(
        (status = 201, description = "Feature created", body = FeatureDto),
        (status = 400, description = "Invalid table name", body = Problem),
        (status = 404, description = "Unknown table", body = Problem),
        (status = 422, description = "Invalid geometry or attributes", body = Problem)
    )
)]
#[instrument(skip_all)]
pub async fn create_feature(
    Extension(svc): Extension<Arc<Service>>,
    uri: Uri,
    path: Result<Path<String>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let instance = uri.path();
    let table = table_name(&path_params(path, instance)?, instance)?;
    let input = dto::feature_input(json_body(body, instance)?).at(instance)?;

    let feature = svc.create_feature(&table, input).await.at(instance)?;
    let location = format!("/features/{table}/{}", feature.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(FeatureDto::from(feature)),
    ))
}

#[utoipa::path(
    get,
    path = "/features/{table}/",
    tag = "features",
    params(("table" = String, Path, description = "Spatial table name"), ListParams),
    responses(
        (status = 200, description = "Features ordered by id", body = [FeatureDto]),
        (status = 404, description = "Unknown table", body = Problem)
    )
)]
#[instrument(skip_all)]
pub async fn list_features(
    Extension(svc): Extension<Arc<Service>>,
    uri: Uri,
    path: Result<Path<String>, PathRejection>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<Vec<FeatureDto>>> {
    let instance = uri.path();
    let table = table_name(&path_params(path, instance)?, instance)?;
    let Query(params) = params.map_err(|r| query_rejection(&r, instance))?;

    let page = svc
        .list_features(&table, params.skip, params.limit)
        .await
        .at(instance)?;
    Ok(Json(page.items.into_iter().map(FeatureDto::from).collect()))
}

#[utoipa::path(
    get,
    path = "/features/{table}/{id}",
    tag = "features",
    params(
        ("table" = String, Path, description = "Spatial table name"),
        ("id" = i64, Path, description = "Feature id")
    ),
    responses(
        (status = 200, description = "Feature", body = FeatureDto),
        (status = 404, description = "Unknown table or feature", body = Problem)
    )
)]
#[instrument(skip_all)]
pub async fn get_feature(
    Extension(svc): Extension<Arc<Service>>,
    uri: Uri,
    path: Result<Path<(String, i64)>, PathRejection>,
) -> ApiResult<Json<FeatureDto>> {
    let instance = uri.path();
    let (table, id) = path_params(path, instance)?;
    let table = table_name(&table, instance)?;

    let feature = svc.get_feature(&table, id).await.at(instance)?;
    Ok(Json(feature.into()))
}

#[utoipa::path(
    put,
    path = "/features/{table}/{id}",
    tag = "features",
    params(
        ("table" = String, Path, description = "Spatial table name"),
        ("id" = i64, Path, description = "Feature id")
    ),
    request_body = FeatureBody,
    responses(
        (status = 200, description = "Feature replaced", body = FeatureDto),
        (status = 404, description = "Unknown table or feature", body = Problem),
        (status = 422, description = "Invalid geometry or attributes", body = Problem)
    )
)]
#[instrument(skip_all)]
pub async fn update_feature(
    Extension(svc): Extension<Arc<Service>>,
    uri: Uri,
    path: Result<Path<(String, i64)>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<FeatureDto>> {
    let instance = uri.path();
    let (table, id) = path_params(path, instance)?;
    let table = table_name(&table, instance)?;
    let input = dto::feature_input(json_body(body, instance)?).at(instance)?;

    let feature = svc.update_feature(&table, id, input).await.at(instance)?;
    Ok(Json(feature.into()))
}

#[utoipa::path(
    delete,
    path = "/features/{table}/{id}",
    tag = "features",
    params(
        ("table" = String, Path, description = "Spatial table name"),
        ("id" = i64, Path, description = "Feature id")
    ),
    responses(
        (status = 204, description = "Feature deleted"),
        (status = 404, description = "Unknown table or feature", body = Problem)
    )
)]
#[instrument(skip_all)]
pub async fn delete_feature(
    Extension(svc): Extension<Arc<Service>>,
    uri: Uri,
    path: Result<Path<(String, i64)>, PathRejection>,
) -> ApiResult<StatusCode> {
    let instance = uri.path();
    let (table, id) = path_params(path, instance)?;
    let table = table_name(&table, instance)?;

    svc.delete_feature(&table, id).await.at(instance)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/features/{table}/query/{operation}",
    tag = "features",
    params(
        ("table" = String, Path, description = "Spatial table name"),
        ("operation" = String, Path, description = "bbox, buffer, intersects, within or distance")
    ),
    request_body = QueryBody,
    responses(
        (status = 200, description = "Matching features", body = FeatureCollectionDto),
        (status = 404, description = "Unknown table or operation", body = Problem),
        (status = 422, description = "Invalid query", body = Problem)
    )
)]
#[instrument(skip_all)]
pub async fn query_features(
    Extension(svc): Extension<Arc<Service>>,
    uri: Uri,
    path: Result<Path<(String, String)>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<FeatureCollectionDto>> {
    let instance = uri.path();
    let (table, operation) = path_params(path, instance)?;
    let table = table_name(&table, instance)?;
    let operation = QueryOperation::parse(&operation)
        .ok_or(DomainError::UnknownOperation { operation })
        .at(instance)?;
    let query = dto::spatial_query(operation, json_body(body, instance)?).at(instance)?;

    let features = svc.query_features(&table, query).await.at(instance)?;
    Ok(Json(features.into_iter().collect()))
}

#[utoipa::path(
    post,
    path = "/spatial/buffer",
    tag = "spatial",
    request_body = BufferRequest,
    responses(
        (status = 200, description = "Buffered geometry", body = BufferResponse),
        (status = 422, description = "Invalid geometry, distance or SRID", body = Problem)
    )
)]
#[instrument(skip_all)]
pub async fn buffer_geometry(
    Extension(svc): Extension<Arc<Service>>,
    uri: Uri,
    body: Result<Json<BufferRequest>, JsonRejection>,
) -> ApiResult<Json<BufferResponse>> {
    let instance = uri.path();
    let req = json_body(body, instance)?;
    let geometry = parse_geometry(&req.geometry)
        .map_err(DomainError::from)
        .at(instance)?;

    let buffered = svc
        .buffer_geometry(geometry, req.buffer, req.srid)
        .await
        .at(instance)?;
    Ok(Json(BufferResponse {
        geometry: buffered.to_geojson(),
    }))
}

#[utoipa::path(
    get,
    path = "/spatial-tables/",
    tag = "spatial-tables",
    responses((status = 200, description = "Spatial tables", body = TableListDto))
)]
#[instrument(skip_all)]
pub async fn list_tables(
    Extension(svc): Extension<Arc<Service>>,
    uri: Uri,
) -> ApiResult<Json<TableListDto>> {
    let tables = svc.list_tables().await.at(uri.path())?;
    Ok(Json(TableListDto { tables }))
}

#[utoipa::path(
    post,
    path = "/spatial-tables/",
    tag = "spatial-tables",
    request_body = CreateTableRequest,
    responses(
        (status = 201, description = "Table created", body = TableCreatedDto),
        (status = 400, description = "Invalid table name", body = Problem),
        (status = 409, description = "Table already exists", body = Problem),
        (status = 422, description = "Invalid definition", body = Problem)
    )
)]
#[instrument(skip_all)]
pub async fn create_table(
    Extension(svc): Extension<Arc<Service>>,
    uri: Uri,
    body: Result<Json<CreateTableRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let instance = uri.path();
    let request = NewSpatialTable::try_from(json_body(body, instance)?).at(instance)?;

    let schema = svc.create_table(request).await.at(instance)?;
    let message = format!("Table '{}' created", schema.name);
    Ok((
        StatusCode::CREATED,
        Json(TableCreatedDto {
            message,
            table: schema.into(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/spatial-tables/{table}",
    tag = "spatial-tables",
    params(("table" = String, Path, description = "Spatial table name")),
    responses(
        (status = 200, description = "Reflected table schema", body = TableSchemaDto),
        (status = 404, description = "Unknown table", body = Problem)
    )
)]
#[instrument(skip_all)]
pub async fn describe_table(
    Extension(svc): Extension<Arc<Service>>,
    uri: Uri,
    path: Result<Path<String>, PathRejection>,
) -> ApiResult<Json<TableSchemaDto>> {
    let instance = uri.path();
    let table = table_name(&path_params(path, instance)?, instance)?;

    let schema = svc.describe_table(&table).await.at(instance)?;
    Ok(Json(schema.into()))
}

#[utoipa::path(
    delete,
    path = "/spatial-tables/{table}",
    tag = "spatial-tables",
    params(("table" = String, Path, description = "Spatial table name")),
    responses(
        (status = 200, description = "Table dropped", body = MessageDto),
        (status = 404, description = "Unknown table", body = Problem)
    )
)]
#[instrument(skip_all)]
pub async fn drop_table(
    Extension(svc): Extension<Arc<Service>>,
    uri: Uri,
    path: Result<Path<String>, PathRejection>,
) -> ApiResult<Json<MessageDto>> {
    let instance = uri.path();
    let table = table_name(&path_params(path, instance)?, instance)?;

    svc.drop_table(&table).await.at(instance)?;
    Ok(Json(MessageDto {
        message: format!("Table '{table}' dropped"),
    }))
}
