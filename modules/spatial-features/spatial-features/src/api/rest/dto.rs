use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use spatial_features_sdk::{
    Attributes, BoundingBox, ColumnInfo, Feature, FeatureInput, FieldDefinition, FieldType,
    Geometry, GeometryKind, NewSpatialTable, QueryOperation, SpatialQuery, TableSchema,
};
use utoipa::{IntoParams, ToSchema};

use crate::domain::error::DomainError;
use crate::domain::geometry::{GEOMETRY_FIELD, parse_geometry, parse_geometry_at};

/// SRID used by table creation requests that do not name one.
pub const DEFAULT_TABLE_SRID: i32 = 4326;

/// A stored feature: `id`, `geometry` and the attribute columns side by side.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FeatureDto {
    pub id: i64,
    /// GeoJSON geometry object.
    #[schema(value_type = Object)]
    pub geometry: Value,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub attributes: Attributes,
}

impl From<Feature> for FeatureDto {
    fn from(f: Feature) -> Self {
        Self {
            id: f.id,
            geometry: f.geometry.to_geojson(),
            attributes: f.attributes,
        }
    }
}

/// GeoJSON `Feature` as returned by spatial queries.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GeoJsonFeatureDto {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: i64,
    #[schema(value_type = Object)]
    pub geometry: Value,
    #[schema(value_type = Object)]
    pub properties: Attributes,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FeatureCollectionDto {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<GeoJsonFeatureDto>,
}

impl FromIterator<Feature> for FeatureCollectionDto {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self {
            kind: "FeatureCollection".to_owned(),
            features: iter
                .into_iter()
                .map(|f| GeoJsonFeatureDto {
                    kind: "Feature".to_owned(),
                    id: f.id,
                    geometry: f.geometry.to_geojson(),
                    properties: f.attributes,
                })
                .collect(),
        }
    }
}

/// Create/replace body. Documentation schema; handlers decode with [`feature_input`].
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FeatureBody {
    #[schema(value_type = Object)]
    pub geometry: Value,
    /// Attribute columns of the table, by name.
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub attributes: Attributes,
}

/// Spatial query body; which members are required depends on the operation.
/// Documentation schema; handlers decode with [`spatial_query`].
#[derive(Debug, Clone, ToSchema)]
pub struct QueryBody {
    /// `bbox`: `[minX, minY, maxX, maxY]`.
    pub bbox: Option<[f64; 4]>,
    /// `buffer`, `distance`, `intersects`, `within`: source geometry.
    #[schema(value_type = Option<Object>)]
    pub geometry: Option<Value>,
    /// `buffer`: distance in the table's linear unit.
    pub buffer: Option<f64>,
    /// `distance`: meters.
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// Number of features to skip.
    pub skip: Option<u64>,
    /// Page size; clamped to the configured maximum.
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BufferRequest {
    #[schema(value_type = Object)]
    pub geometry: Value,
    /// Buffer distance in the units of `srid`.
    pub buffer: f64,
    pub srid: Option<i32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BufferResponse {
    #[schema(value_type = Object)]
    pub geometry: Value,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct FieldDefinitionDto {
    pub name: String,
    /// SQL type, e.g. `TEXT`, `VARCHAR(80)`, `DOUBLE PRECISION`.
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
}

fn default_true() -> bool {
    true
}

fn default_srid() -> i32 {
    DEFAULT_TABLE_SRID
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateTableRequest {
    pub table_name: String,
    /// One of POINT, LINESTRING, POLYGON, MULTIPOINT, MULTILINESTRING, MULTIPOLYGON.
    pub geometry_type: String,
    #[serde(default = "default_srid")]
    pub srid: i32,
    #[serde(default)]
    pub fields: Vec<FieldDefinitionDto>,
}

impl TryFrom<CreateTableRequest> for NewSpatialTable {
    type Error = DomainError;

    fn try_from(req: CreateTableRequest) -> Result<Self, Self::Error> {
        let geometry_kind = GeometryKind::from_postgis_type(&req.geometry_type).ok_or_else(|| {
            DomainError::validation(
                "geometry_type",
                format!("unsupported geometry type '{}'", req.geometry_type),
            )
        })?;
        let fields = req
            .fields
            .into_iter()
            .enumerate()
            .map(|(i, f)| {
                let field_type = FieldType::parse(&f.field_type).ok_or_else(|| {
                    DomainError::validation(
                        format!("fields[{i}].type"),
                        format!("unsupported column type '{}'", f.field_type),
                    )
                })?;
                Ok(FieldDefinition {
                    name: f.name,
                    field_type,
                    nullable: f.nullable,
                })
            })
            .collect::<Result<_, DomainError>>()?;
        Ok(NewSpatialTable {
            table_name: req.table_name,
            geometry_kind,
            srid: req.srid,
            fields,
        })
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ColumnDto {
    pub name: String,
    /// Native column type as reported by the database.
    #[serde(rename = "type")]
    pub udt_name: String,
    pub nullable: bool,
    pub has_default: bool,
}

impl From<ColumnInfo> for ColumnDto {
    fn from(c: ColumnInfo) -> Self {
        Self {
            name: c.name,
            udt_name: c.udt_name,
            nullable: c.nullable,
            has_default: c.has_default,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TableSchemaDto {
    pub name: String,
    pub schema: String,
    pub id_column: String,
    pub geometry_column: String,
    /// `GEOMETRY` when the column accepts every kind.
    pub geometry_type: String,
    pub srid: i32,
    pub columns: Vec<ColumnDto>,
}

impl From<TableSchema> for TableSchemaDto {
    fn from(t: TableSchema) -> Self {
        Self {
            name: t.name,
            schema: t.schema,
            id_column: t.id_column,
            geometry_column: t.geometry_column,
            geometry_type: t
                .geometry_kind
                .map_or("GEOMETRY", GeometryKind::postgis_type)
                .to_owned(),
            srid: t.srid,
            columns: t.columns.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TableListDto {
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TableCreatedDto {
    pub message: String,
    pub table: TableSchemaDto,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MessageDto {
    pub message: String,
}

fn into_object(body: Value, field: &str) -> Result<Map<String, Value>, DomainError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(DomainError::validation(field, "request body must be a JSON object")),
    }
}

/// Split a `{geometry, <attr>: value, ...}` body into geometry and attributes.
///
/// # Errors
/// Non-object body, missing or invalid geometry.
pub fn feature_input(body: Value) -> Result<FeatureInput, DomainError> {
    let mut attributes = into_object(body, "body")?;
    let raw = attributes
        .remove(GEOMETRY_FIELD)
        .ok_or_else(|| DomainError::validation(GEOMETRY_FIELD, "geometry is required"))?;
    let geometry = parse_geometry(&raw)?;
    Ok(FeatureInput {
        geometry,
        attributes,
    })
}

/// Source geometry of a query body: `{geometry: ...}`, a GeoJSON Feature, or
/// a bare geometry object.
fn source_geometry(body: &Map<String, Value>) -> Result<Geometry, DomainError> {
    if let Some(g) = body.get(GEOMETRY_FIELD) {
        return Ok(parse_geometry(g)?);
    }
    if body.contains_key("coordinates") {
        return Ok(parse_geometry_at(&Value::Object(body.clone()), GEOMETRY_FIELD)?);
    }
    Err(DomainError::validation(GEOMETRY_FIELD, "geometry is required"))
}

fn number(body: &Map<String, Value>, keys: &[&str]) -> Result<f64, DomainError> {
    let Some((key, value)) = keys.iter().find_map(|k| body.get(*k).map(|v| (*k, v))) else {
        return Err(DomainError::validation(keys[0], "value is required"));
    };
    value
        .as_f64()
        .ok_or_else(|| DomainError::validation(key, "must be a number"))
}

fn bounding_box(body: &Map<String, Value>) -> Result<BoundingBox, DomainError> {
    let values: Vec<f64> = if let Some(raw) = body.get("bbox") {
        raw.as_array()
            .ok_or_else(|| DomainError::validation("bbox", "expected an array of 4 numbers"))?
            .iter()
            .map(|v| {
                v.as_f64()
                    .ok_or_else(|| DomainError::validation("bbox", "expected an array of 4 numbers"))
            })
            .collect::<Result<_, _>>()?
    } else {
        ["minx", "miny", "maxx", "maxy"]
            .iter()
            .map(|k| number(body, &[*k]))
            .collect::<Result<_, _>>()?
    };
    let array: [f64; 4] = values.try_into().map_err(|v: Vec<f64>| {
        DomainError::validation("bbox", format!("expected 4 numbers, got {}", v.len()))
    })?;
    Ok(BoundingBox::from_array(array))
}

/// Decode the body of `POST /features/{table}/query/{operation}`.
///
/// # Errors
/// Missing or malformed members for the chosen operation.
pub fn spatial_query(operation: QueryOperation, body: Value) -> Result<SpatialQuery, DomainError> {
    let body = into_object(body, "body")?;
    let query = match operation {
        QueryOperation::BoundingBox => SpatialQuery::BoundingBox(bounding_box(&body)?),
        QueryOperation::Buffer => SpatialQuery::Buffer {
            geometry: source_geometry(&body)?,
            distance: number(&body, &["buffer", "distance"])?,
        },
        QueryOperation::Distance => SpatialQuery::Distance {
            geometry: source_geometry(&body)?,
            meters: number(&body, &["distance"])?,
        },
        QueryOperation::Intersects => SpatialQuery::Intersects(source_geometry(&body)?),
        QueryOperation::Within => SpatialQuery::Within(source_geometry(&body)?),
    };
    Ok(query)
}
