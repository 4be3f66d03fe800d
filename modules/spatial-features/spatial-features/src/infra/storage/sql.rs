//! Parameterised statement builders for reflected tables.
//!
//! Identifiers come from the catalog (or from validated requests) and are
//! always double-quoted; every value travels as a bind parameter. Feature rows
//! are read back as three text columns: the id, the geometry as GeoJSON and
//! the remaining columns as a JSON object.

use sea_orm::{DbBackend, Statement, Value};
use spatial_features_sdk::{Geometry, NewSpatialTable, SpatialQuery, TableSchema};

use crate::domain::schema::{AttributeBinding, AttributeValue};

/// Row alias; unlikely to shadow a real column in `to_jsonb(<alias>)`.
const ROW: &str = "_orata_row";

pub const COL_ID: &str = "feature_id";
pub const COL_GEOMETRY: &str = "geometry_json";
pub const COL_PROPERTIES: &str = "properties_json";

/// `maxdecimaldigits` for `ST_AsGeoJSON`; PostGIS defaults to 9 and caps at 15.
const GEOJSON_DECIMALS: i32 = 15;

/// SRID the geography casts go through for metre distances.
const GEOGRAPHY_SRID: i32 = 4326;

#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[must_use]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Positional bind parameters (`$1`, `$2`, ...).
#[derive(Default)]
struct Params {
    values: Vec<Value>,
}

impl Params {
    fn push(&mut self, value: impl Into<Value>) -> String {
        self.values.push(value.into());
        format!("${}", self.values.len())
    }

    fn into_statement(self, sql: String) -> Statement {
        Statement::from_sql_and_values(DbBackend::Postgres, sql, self.values)
    }

    /// `ST_SetSRID(ST_GeomFromGeoJSON($n), $m)`
    fn geometry(&mut self, geometry: &Geometry, srid: i32) -> String {
        let json = self.push(geometry.to_geojson().to_string());
        let srid = self.push(srid);
        format!("ST_SetSRID(ST_GeomFromGeoJSON({json}), {srid})")
    }

    fn attribute(&mut self, binding: &AttributeBinding) -> String {
        let cast = quote_ident(&binding.udt_name);
        let placeholder = match &binding.value {
            AttributeValue::Null => return "NULL".to_owned(),
            AttributeValue::Default => return "DEFAULT".to_owned(),
            AttributeValue::Text(s) => self.push(s.clone()),
            AttributeValue::Integer(i) => self.push(*i),
            AttributeValue::Float(f) => self.push(*f),
            AttributeValue::Boolean(b) => self.push(*b),
            AttributeValue::Json(v) => self.push(v.to_string()),
        };
        format!("{placeholder}::{cast}")
    }
}

fn returning_columns(table: &TableSchema) -> String {
    let id = quote_ident(&table.id_column);
    let geom = quote_ident(&table.geometry_column);
    format!(
        "{ROW}.{id}::bigint AS {COL_ID}, \
         ST_AsGeoJSON(ST_Force2D({ROW}.{geom}), {GEOJSON_DECIMALS})::text AS {COL_GEOMETRY}, \
         (to_jsonb({ROW}) - {id_lit} - {geom_lit})::text AS {COL_PROPERTIES}",
        id_lit = quote_literal(&table.id_column),
        geom_lit = quote_literal(&table.geometry_column),
    )
}

fn select_from(table: &TableSchema) -> String {
    format!(
        "SELECT {} FROM {} AS {ROW}",
        returning_columns(table),
        qualified(&table.schema, &table.name)
    )
}

fn order_by_id(table: &TableSchema) -> String {
    format!("ORDER BY {ROW}.{}", quote_ident(&table.id_column))
}

#[must_use]
pub fn select_by_id(table: &TableSchema, id: i64) -> Statement {
    let mut p = Params::default();
    let sql = format!(
        "{} WHERE {ROW}.{} = {}",
        select_from(table),
        quote_ident(&table.id_column),
        p.push(id)
    );
    p.into_statement(sql)
}

#[must_use]
pub fn select_page(table: &TableSchema, offset: i64, limit: i64) -> Statement {
    let mut p = Params::default();
    let sql = format!(
        "{} {} LIMIT {} OFFSET {}",
        select_from(table),
        order_by_id(table),
        p.push(limit),
        p.push(offset)
    );
    p.into_statement(sql)
}

#[must_use]
pub fn select_matching(table: &TableSchema, query: &SpatialQuery) -> Statement {
    let mut p = Params::default();
    let geom = format!("{ROW}.{}", quote_ident(&table.geometry_column));
    let predicate = match query {
        SpatialQuery::BoundingBox(b) => format!(
            "ST_Intersects({geom}, ST_MakeEnvelope({}, {}, {}, {}, {}))",
            p.push(b.min_x),
            p.push(b.min_y),
            p.push(b.max_x),
            p.push(b.max_y),
            p.push(table.srid)
        ),
        SpatialQuery::Buffer { geometry, distance } => {
            let source = p.geometry(geometry, table.srid);
            format!("ST_Intersects({geom}, ST_Buffer({source}, {}))", p.push(*distance))
        }
        SpatialQuery::Intersects(geometry) => {
            format!("ST_Intersects({geom}, {})", p.geometry(geometry, table.srid))
        }
        SpatialQuery::Within(geometry) => {
            format!("ST_Within({geom}, {})", p.geometry(geometry, table.srid))
        }
        SpatialQuery::Distance { geometry, meters } => {
            let source = p.geometry(geometry, table.srid);
            format!(
                "ST_DWithin(ST_Transform({geom}, {GEOGRAPHY_SRID})::geography, \
                 ST_Transform({source}, {GEOGRAPHY_SRID})::geography, {})",
                p.push(*meters)
            )
        }
    };
    let sql = format!(
        "{} WHERE {predicate} {}",
        select_from(table),
        order_by_id(table)
    );
    p.into_statement(sql)
}

#[must_use]
pub fn insert(table: &TableSchema, geometry: &Geometry, attributes: &[AttributeBinding]) -> Statement {
    let mut p = Params::default();
    let mut columns: Vec<String> = attributes.iter().map(|b| quote_ident(&b.column)).collect();
    let mut values: Vec<String> = attributes.iter().map(|b| p.attribute(b)).collect();
    columns.push(quote_ident(&table.geometry_column));
    values.push(p.geometry(geometry, table.srid));

    let sql = format!(
        "INSERT INTO {} AS {ROW} ({}) VALUES ({}) RETURNING {}",
        qualified(&table.schema, &table.name),
        columns.join(", "),
        values.join(", "),
        returning_columns(table)
    );
    p.into_statement(sql)
}

#[must_use]
pub fn replace(
    table: &TableSchema,
    id: i64,
    geometry: &Geometry,
    attributes: &[AttributeBinding],
) -> Statement {
    let mut p = Params::default();
    let mut assignments: Vec<String> = attributes
        .iter()
        .map(|b| format!("{} = {}", quote_ident(&b.column), p.attribute(b)))
        .collect();
    assignments.push(format!(
        "{} = {}",
        quote_ident(&table.geometry_column),
        p.geometry(geometry, table.srid)
    ));

    let sql = format!(
        "UPDATE {} AS {ROW} SET {} WHERE {ROW}.{} = {} RETURNING {}",
        qualified(&table.schema, &table.name),
        assignments.join(", "),
        quote_ident(&table.id_column),
        p.push(id),
        returning_columns(table)
    );
    p.into_statement(sql)
}

#[must_use]
pub fn delete(table: &TableSchema, id: i64) -> Statement {
    let mut p = Params::default();
    let sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        qualified(&table.schema, &table.name),
        quote_ident(&table.id_column),
        p.push(id)
    );
    p.into_statement(sql)
}

#[must_use]
pub fn buffer(geometry: &Geometry, srid: i32, distance: f64) -> Statement {
    let mut p = Params::default();
    let source = p.geometry(geometry, srid);
    let sql = format!(
        "SELECT ST_AsGeoJSON(ST_Force2D(ST_Buffer({source}, {})), {GEOJSON_DECIMALS})::text AS {COL_GEOMETRY}",
        p.push(distance)
    );
    p.into_statement(sql)
}

/// `CREATE TABLE` plus its GiST index, in execution order.
#[must_use]
pub fn create_table(schema: &str, request: &NewSpatialTable) -> Vec<String> {
    let mut columns = vec![format!("{} SERIAL PRIMARY KEY", quote_ident("id"))];
    columns.extend(request.fields.iter().map(|f| {
        let not_null = if f.nullable { "" } else { " NOT NULL" };
        format!("{} {}{not_null}", quote_ident(&f.name), f.field_type.sql())
    }));
    columns.push(format!(
        "{} geometry({}, {}) NOT NULL",
        quote_ident("geometry"),
        request.geometry_kind.postgis_type(),
        request.srid
    ));

    let table = qualified(schema, &request.table_name);
    vec![
        format!("CREATE TABLE {table} ({})", columns.join(", ")),
        format!(
            "CREATE INDEX {} ON {table} USING GIST ({})",
            quote_ident(&format!("{}_geometry_gist", request.table_name)),
            quote_ident("geometry")
        ),
    ]
}

#[must_use]
pub fn drop_table(table: &TableSchema) -> String {
    format!("DROP TABLE {} CASCADE", qualified(&table.schema, &table.name))
}
