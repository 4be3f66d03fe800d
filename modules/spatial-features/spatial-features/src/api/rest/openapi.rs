use utoipa::OpenApi;

use super::dto::{
    BufferRequest, BufferResponse, ColumnDto, CreateTableRequest, FeatureBody,
    FeatureCollectionDto, FeatureDto, FieldDefinitionDto, GeoJsonFeatureDto, MessageDto,
    QueryBody, TableCreatedDto, TableListDto, TableSchemaDto,
};
use super::handlers;
use super::problem::{Problem, ValidationViolation};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Orata Spatial API",
        description = "CRUD and spatial queries over PostGIS tables discovered at request time"
    ),
    paths(
        handlers::create_feature,
        handlers::list_features,
        handlers::get_feature,
        handlers::update_feature,
        handlers::delete_feature,
        handlers::query_features,
        handlers::buffer_geometry,
        handlers::list_tables,
        handlers::create_table,
        handlers::describe_table,
        handlers::drop_table,
    ),
    components(schemas(
        FeatureDto,
        FeatureBody,
        GeoJsonFeatureDto,
        FeatureCollectionDto,
        QueryBody,
        BufferRequest,
        BufferResponse,
        CreateTableRequest,
        FieldDefinitionDto,
        TableSchemaDto,
        ColumnDto,
        TableListDto,
        TableCreatedDto,
        MessageDto,
        Problem,
        ValidationViolation,
    )),
    tags(
        (name = "features", description = "Feature CRUD and spatial queries"),
        (name = "spatial", description = "Table-independent geometry operations"),
        (name = "spatial-tables", description = "Spatial table administration")
    )
)]
pub struct ApiDoc;
