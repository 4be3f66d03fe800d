//! Public models for the spatial-features module.
//!
//! These are transport-agnostic data structures that define the contract
//! between the module and its consumers. Wire shapes (GeoJSON, DTOs) live in
//! the REST layer of the implementation crate.

use serde_json::{Map, Value, json};

/// A single `[x, y]` coordinate pair.
pub type Position = [f64; 2];

/// Non-geometry, non-identifier column values of a feature, keyed by column name.
pub type Attributes = Map<String, Value>;

/// The six OGC simple-feature kinds accepted by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
}

impl GeometryKind {
    pub const ALL: [GeometryKind; 6] = [
        GeometryKind::Point,
        GeometryKind::LineString,
        GeometryKind::Polygon,
        GeometryKind::MultiPoint,
        GeometryKind::MultiLineString,
        GeometryKind::MultiPolygon,
    ];

    /// GeoJSON `type` tag, e.g. `"MultiPolygon"`.
    #[must_use]
    pub fn geojson_type(self) -> &'static str {
        match self {
            GeometryKind::Point => "Point",
            GeometryKind::LineString => "LineString",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::MultiPoint => "MultiPoint",
            GeometryKind::MultiLineString => "MultiLineString",
            GeometryKind::MultiPolygon => "MultiPolygon",
        }
    }

    /// PostGIS type modifier name, e.g. `"MULTIPOLYGON"`.
    #[must_use]
    pub fn postgis_type(self) -> &'static str {
        match self {
            GeometryKind::Point => "POINT",
            GeometryKind::LineString => "LINESTRING",
            GeometryKind::Polygon => "POLYGON",
            GeometryKind::MultiPoint => "MULTIPOINT",
            GeometryKind::MultiLineString => "MULTILINESTRING",
            GeometryKind::MultiPolygon => "MULTIPOLYGON",
        }
    }

    /// Exact (case-sensitive) GeoJSON tag lookup.
    #[must_use]
    pub fn from_geojson_type(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.geojson_type() == tag)
    }

    /// Case-insensitive PostGIS type lookup.
    #[must_use]
    pub fn from_postgis_type(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.postgis_type().eq_ignore_ascii_case(name))
    }
}

/// A parsed geometry. Construction does not imply validity; the module's
/// validator decides that.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Position),
    LineString(Vec<Position>),
    Polygon(Vec<Vec<Position>>),
    MultiPoint(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    #[must_use]
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) => GeometryKind::Point,
            Geometry::LineString(_) => GeometryKind::LineString,
            Geometry::Polygon(_) => GeometryKind::Polygon,
            Geometry::MultiPoint(_) => GeometryKind::MultiPoint,
            Geometry::MultiLineString(_) => GeometryKind::MultiLineString,
            Geometry::MultiPolygon(_) => GeometryKind::MultiPolygon,
        }
    }

    /// Render as a GeoJSON geometry object.
    #[must_use]
    pub fn to_geojson(&self) -> Value {
        let coordinates = match self {
            Geometry::Point(p) => json!(p),
            Geometry::LineString(line) | Geometry::MultiPoint(line) => json!(line),
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => json!(rings),
            Geometry::MultiPolygon(polygons) => json!(polygons),
        };
        json!({
            "type": self.kind().geojson_type(),
            "coordinates": coordinates,
        })
    }
}

/// A stored feature.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: i64,
    pub geometry: Geometry,
    pub attributes: Attributes,
}

/// Payload for create and full-replacement update.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureInput {
    pub geometry: Geometry,
    pub attributes: Attributes,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub offset: u64,
    pub limit: u64,
}

/// Axis-aligned envelope `[min_x, min_y, max_x, max_y]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    #[must_use]
    pub fn from_array(values: [f64; 4]) -> Self {
        let [min_x, min_y, max_x, max_y] = values;
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }
}

/// Spatial predicates that can be evaluated against a table.
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialQuery {
    /// Features whose geometry intersects the envelope.
    BoundingBox(BoundingBox),
    /// Features intersecting `geometry` buffered by `distance` (table units).
    Buffer { geometry: Geometry, distance: f64 },
    /// Features intersecting `geometry`.
    Intersects(Geometry),
    /// Features completely inside `geometry`.
    Within(Geometry),
    /// Features within `meters` of `geometry`, measured on the spheroid.
    Distance { geometry: Geometry, meters: f64 },
}

impl SpatialQuery {
    #[must_use]
    pub fn operation(&self) -> QueryOperation {
        match self {
            SpatialQuery::BoundingBox(_) => QueryOperation::BoundingBox,
            SpatialQuery::Buffer { .. } => QueryOperation::Buffer,
            SpatialQuery::Intersects(_) => QueryOperation::Intersects,
            SpatialQuery::Within(_) => QueryOperation::Within,
            SpatialQuery::Distance { .. } => QueryOperation::Distance,
        }
    }
}

/// Name of a spatial query operation as it appears in request paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOperation {
    BoundingBox,
    Buffer,
    Intersects,
    Within,
    Distance,
}

impl QueryOperation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QueryOperation::BoundingBox => "bbox",
            QueryOperation::Buffer => "buffer",
            QueryOperation::Intersects => "intersects",
            QueryOperation::Within => "within",
            QueryOperation::Distance => "distance",
        }
    }

    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        [
            QueryOperation::BoundingBox,
            QueryOperation::Buffer,
            QueryOperation::Intersects,
            QueryOperation::Within,
            QueryOperation::Distance,
        ]
        .into_iter()
        .find(|op| op.as_str() == name)
    }
}

/// Logical type of an attribute column, derived from its native type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    Timestamp,
    Json,
    /// Anything else; values travel as strings and are cast by the database.
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: ColumnType,
    /// Native type name as reported by the catalog (`int4`, `varchar`, ...).
    pub udt_name: String,
    pub nullable: bool,
    pub has_default: bool,
}

/// Reflected description of a spatial table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub schema: String,
    pub id_column: String,
    pub geometry_column: String,
    /// `None` for a generic `geometry` column that accepts every kind.
    pub geometry_kind: Option<GeometryKind>,
    pub srid: i32,
    /// Attribute columns in ordinal order; excludes id and geometry.
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Column types accepted when creating a spatial table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Varchar(u32),
    SmallInt,
    Integer,
    BigInt,
    Real,
    DoublePrecision,
    Numeric,
    Boolean,
    Date,
    Timestamp,
    TimestampTz,
    Jsonb,
}

impl FieldType {
    /// Parse a SQL type name such as `"varchar(80)"` or `"DOUBLE PRECISION"`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let upper = normalized.to_ascii_uppercase();
        if let Some(len) = upper
            .strip_prefix("VARCHAR(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return len
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .map(FieldType::Varchar);
        }
        let ty = match upper.as_str() {
            "TEXT" | "VARCHAR" => FieldType::Text,
            "SMALLINT" | "INT2" => FieldType::SmallInt,
            "INTEGER" | "INT" | "INT4" => FieldType::Integer,
            "BIGINT" | "INT8" => FieldType::BigInt,
            "REAL" | "FLOAT4" => FieldType::Real,
            "DOUBLE PRECISION" | "FLOAT8" | "FLOAT" => FieldType::DoublePrecision,
            "NUMERIC" | "DECIMAL" => FieldType::Numeric,
            "BOOLEAN" | "BOOL" => FieldType::Boolean,
            "DATE" => FieldType::Date,
            "TIMESTAMP" => FieldType::Timestamp,
            "TIMESTAMPTZ" => FieldType::TimestampTz,
            "JSONB" | "JSON" => FieldType::Jsonb,
            _ => return None,
        };
        Some(ty)
    }

    /// DDL spelling of the type.
    #[must_use]
    pub fn sql(self) -> String {
        match self {
            FieldType::Text => "TEXT".to_owned(),
            FieldType::Varchar(n) => format!("VARCHAR({n})"),
            FieldType::SmallInt => "SMALLINT".to_owned(),
            FieldType::Integer => "INTEGER".to_owned(),
            FieldType::BigInt => "BIGINT".to_owned(),
            FieldType::Real => "REAL".to_owned(),
            FieldType::DoublePrecision => "DOUBLE PRECISION".to_owned(),
            FieldType::Numeric => "NUMERIC".to_owned(),
            FieldType::Boolean => "BOOLEAN".to_owned(),
            FieldType::Date => "DATE".to_owned(),
            FieldType::Timestamp => "TIMESTAMP".to_owned(),
            FieldType::TimestampTz => "TIMESTAMPTZ".to_owned(),
            FieldType::Jsonb => "JSONB".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
}

/// Request to create a new spatial table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSpatialTable {
    pub table_name: String,
    pub geometry_kind: GeometryKind,
    pub srid: i32,
    pub fields: Vec<FieldDefinition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_kind_tags_round_trip() {
        for kind in GeometryKind::ALL {
            assert_eq!(GeometryKind::from_geojson_type(kind.geojson_type()), Some(kind));
            assert_eq!(GeometryKind::from_postgis_type(kind.postgis_type()), Some(kind));
        }
        assert_eq!(GeometryKind::from_geojson_type("point"), None);
        assert_eq!(
            GeometryKind::from_postgis_type("multipolygon"),
            Some(GeometryKind::MultiPolygon)
        );
        assert_eq!(GeometryKind::from_postgis_type("GEOMETRY"), None);
    }

    #[test]
    fn to_geojson_renders_type_and_coordinates() {
        let line = Geometry::LineString(vec![[0.0, 0.0], [1.5, 2.0]]);
        assert_eq!(
            line.to_geojson(),
            json!({"type": "LineString", "coordinates": [[0.0, 0.0], [1.5, 2.0]]})
        );
    }

    #[test]
    fn query_operation_names() {
        assert_eq!(QueryOperation::parse("bbox"), Some(QueryOperation::BoundingBox));
        assert_eq!(QueryOperation::parse("distance"), Some(QueryOperation::Distance));
        assert_eq!(QueryOperation::parse("nearest"), None);
        let q = SpatialQuery::Within(Geometry::Point([0.0, 0.0]));
        assert_eq!(q.operation().as_str(), "within");
    }

    #[test]
    fn field_type_parsing() {
        assert_eq!(FieldType::parse("text"), Some(FieldType::Text));
        assert_eq!(FieldType::parse("VARCHAR(80)"), Some(FieldType::Varchar(80)));
        assert_eq!(FieldType::parse("varchar(0)"), None);
        assert_eq!(
            FieldType::parse("double   precision"),
            Some(FieldType::DoublePrecision)
        );
        assert_eq!(FieldType::parse("geometry"), None);
        assert_eq!(FieldType::parse("text; drop table x"), None);
        assert_eq!(FieldType::Varchar(12).sql(), "VARCHAR(12)");
    }
}
