//! In-memory catalog and repository used by service and handler tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use spatial_features_sdk::{
    Attributes, ColumnInfo, Feature, Geometry, GeometryKind, NewSpatialTable, Position,
    SpatialQuery, TableSchema,
};

use crate::domain::error::DomainError;
use crate::domain::repo::{FeatureRepository, TableCatalog, TableLookup};
use crate::domain::schema::{AttributeBinding, AttributeValue, column_type_for_udt};

/// Every position of the geometry, in document order.
pub fn positions(geometry: &Geometry) -> Box<dyn Iterator<Item = &Position> + '_> {
    match geometry {
        Geometry::Point(p) => Box::new(std::iter::once(p)),
        Geometry::LineString(line) | Geometry::MultiPoint(line) => Box::new(line.iter()),
        Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
            Box::new(rings.iter().flatten())
        }
        Geometry::MultiPolygon(polygons) => Box::new(polygons.iter().flatten().flatten()),
    }
}

pub fn column(name: &str, udt: &str, nullable: bool) -> ColumnInfo {
    ColumnInfo {
        name: name.to_owned(),
        column_type: column_type_for_udt(udt),
        udt_name: udt.to_owned(),
        nullable,
        has_default: false,
    }
}

pub fn table(name: &str, kind: Option<GeometryKind>, columns: Vec<ColumnInfo>) -> TableSchema {
    TableSchema {
        name: name.to_owned(),
        schema: "public".to_owned(),
        id_column: "id".to_owned(),
        geometry_column: "geometry".to_owned(),
        geometry_kind: kind,
        srid: 4326,
        columns,
    }
}

/// `{name, description}` text attributes, like the sample layers.
pub fn named_table(name: &str, kind: Option<GeometryKind>) -> TableSchema {
    table(
        name,
        kind,
        vec![column("name", "varchar", true), column("description", "text", true)],
    )
}

#[derive(Default)]
pub struct MockCatalog {
    tables: Mutex<HashMap<String, TableLookup>>,
    pub resolve_calls: AtomicUsize,
    pub dropped: Mutex<Vec<String>>,
    /// Another writer creates the table between the existence check and the DDL.
    pub lose_create_race: AtomicBool,
}

impl MockCatalog {
    pub fn with_tables(tables: impl IntoIterator<Item = TableSchema>) -> Self {
        let catalog = Self::default();
        for t in tables {
            catalog.insert(t.name.clone(), TableLookup::Found(t));
        }
        catalog
    }

    pub fn insert(&self, name: impl Into<String>, lookup: TableLookup) {
        self.tables.lock().unwrap().insert(name.into(), lookup);
    }
}

#[async_trait]
impl TableCatalog for MockCatalog {
    async fn resolve(&self, table: &str) -> anyhow::Result<TableLookup> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or(TableLookup::Missing))
    }

    async fn list_tables(&self) -> anyhow::Result<Vec<String>> {
        let mut names: Vec<String> = self
            .tables
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, lookup)| matches!(lookup, TableLookup::Found(_)))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn table_exists(&self, table: &str) -> anyhow::Result<bool> {
        if self.lose_create_race.load(Ordering::SeqCst) {
            return Ok(false);
        }
        Ok(self.tables.lock().unwrap().contains_key(table))
    }

    async fn srid_exists(&self, srid: i32) -> anyhow::Result<bool> {
        Ok(matches!(srid, 4326 | 3857))
    }

    async fn create_table(&self, request: &NewSpatialTable) -> anyhow::Result<()> {
        if self.lose_create_race.load(Ordering::SeqCst) {
            return Err(DomainError::TableAlreadyExists {
                table: request.table_name.clone(),
            }
            .into());
        }
        let columns = request
            .fields
            .iter()
            .map(|f| {
                let udt = match f.field_type.sql().as_str() {
                    "INTEGER" => "int4".to_owned(),
                    "DOUBLE PRECISION" => "float8".to_owned(),
                    "BOOLEAN" => "bool".to_owned(),
                    _ => "text".to_owned(),
                };
                column(&f.name, &udt, f.nullable)
            })
            .collect();
        let mut schema = table(&request.table_name, Some(request.geometry_kind), columns);
        schema.srid = request.srid;
        self.insert(request.table_name.clone(), TableLookup::Found(schema));
        Ok(())
    }

    async fn drop_table(&self, table: &TableSchema) -> anyhow::Result<()> {
        self.tables.lock().unwrap().remove(&table.name);
        self.dropped.lock().unwrap().push(table.name.clone());
        Ok(())
    }
}

pub struct MockRepository {
    rows: Mutex<HashMap<String, BTreeMap<i64, Feature>>>,
    next_id: AtomicI64,
    pub calls: AtomicUsize,
    pub fail: bool,
    /// Writes fail the way Postgres rejects an uncastable attribute value.
    pub reject_data: bool,
}

impl Default for MockRepository {
    fn default() -> Self {
        Self {
            rows: Mutex::default(),
            next_id: AtomicI64::new(1),
            calls: AtomicUsize::new(0),
            fail: false,
            reject_data: false,
        }
    }
}

impl MockRepository {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn rejecting_data() -> Self {
        Self {
            reject_data: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("connection refused: postgres://orata:secret@db/gis");
        }
        Ok(())
    }

    fn write(&self) -> anyhow::Result<()> {
        self.enter()?;
        if self.reject_data {
            return Err(DomainError::validation(
                "attributes",
                "invalid input syntax for type date: \"not-a-date\"",
            )
            .into());
        }
        Ok(())
    }
}

fn to_attributes(bindings: &[AttributeBinding]) -> Attributes {
    bindings
        .iter()
        .map(|b| {
            let value = match &b.value {
                AttributeValue::Null | AttributeValue::Default => Value::Null,
                AttributeValue::Text(s) => json!(s),
                AttributeValue::Integer(i) => json!(i),
                AttributeValue::Float(f) => json!(f),
                AttributeValue::Boolean(v) => json!(v),
                AttributeValue::Json(v) => v.clone(),
            };
            (b.column.clone(), value)
        })
        .collect()
}

#[async_trait]
impl FeatureRepository for MockRepository {
    async fn insert(
        &self,
        table: &TableSchema,
        geometry: &Geometry,
        attributes: &[AttributeBinding],
    ) -> anyhow::Result<Feature> {
        self.write()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let feature = Feature {
            id,
            geometry: geometry.clone(),
            attributes: to_attributes(attributes),
        };
        self.rows
            .lock()
            .unwrap()
            .entry(table.name.clone())
            .or_default()
            .insert(id, feature.clone());
        Ok(feature)
    }

    async fn find(&self, table: &TableSchema, id: i64) -> anyhow::Result<Option<Feature>> {
        self.enter()?;
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&table.name)
            .and_then(|rows| rows.get(&id).cloned()))
    }

    async fn list(
        &self,
        table: &TableSchema,
        offset: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<Feature>> {
        self.enter()?;
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&table.name)
            .map(|rows| {
                rows.values()
                    .skip(usize::try_from(offset).unwrap())
                    .take(usize::try_from(limit).unwrap())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn replace(
        &self,
        table: &TableSchema,
        id: i64,
        geometry: &Geometry,
        attributes: &[AttributeBinding],
    ) -> anyhow::Result<Option<Feature>> {
        self.write()?;
        let mut rows = self.rows.lock().unwrap();
        let Some(slot) = rows.get_mut(&table.name).and_then(|r| r.get_mut(&id)) else {
            return Ok(None);
        };
        *slot = Feature {
            id,
            geometry: geometry.clone(),
            attributes: to_attributes(attributes),
        };
        Ok(Some(slot.clone()))
    }

    async fn delete(&self, table: &TableSchema, id: i64) -> anyhow::Result<bool> {
        self.enter()?;
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get_mut(&table.name)
            .is_some_and(|rows| rows.remove(&id).is_some()))
    }

    async fn query(
        &self,
        table: &TableSchema,
        query: &SpatialQuery,
    ) -> anyhow::Result<Vec<Feature>> {
        self.enter()?;
        let rows = self.rows.lock().unwrap();
        let Some(rows) = rows.get(&table.name) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .values()
            .filter(|f| match query {
                SpatialQuery::BoundingBox(b) => positions(&f.geometry).any(|[x, y]| {
                    *x >= b.min_x && *x <= b.max_x && *y >= b.min_y && *y <= b.max_y
                }),
                _ => true,
            })
            .cloned()
            .collect())
    }

    async fn buffer(
        &self,
        geometry: &Geometry,
        _srid: i32,
        distance: f64,
    ) -> anyhow::Result<Geometry> {
        self.enter()?;
        let [x, y] = *positions(geometry).next().unwrap();
        Ok(Geometry::Polygon(vec![vec![
            [x - distance, y - distance],
            [x + distance, y - distance],
            [x + distance, y + distance],
            [x - distance, y + distance],
            [x - distance, y - distance],
        ]]))
    }
}

#[test]
fn positions_walk_nested_geometries() {
    let mp = Geometry::MultiPolygon(vec![vec![vec![[0.0, 0.0], [1.0, 1.0]]], vec![vec![[
        2.0, 2.0,
    ]]]]);
    assert_eq!(positions(&mp).count(), 3);
    assert_eq!(positions(&Geometry::Point([4.0, 5.0])).next(), Some(&[4.0, 5.0]));
}
