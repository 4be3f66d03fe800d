use async_trait::async_trait;
use spatial_features_sdk::{Feature, Geometry, NewSpatialTable, SpatialQuery, TableSchema};

use super::schema::AttributeBinding;

/// Outcome of reflecting a table name against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableLookup {
    Found(TableSchema),
    /// No relation with a geometry column under that name.
    Missing,
    /// The relation exists but cannot be served (reason attached).
    Unsupported(String),
}

/// Live view of the spatial tables in the configured database schema.
///
/// Table names passed here are already validated identifiers.
#[async_trait]
pub trait TableCatalog: Send + Sync {
    async fn resolve(&self, table: &str) -> anyhow::Result<TableLookup>;

    /// Names of every table with a geometry column, sorted.
    async fn list_tables(&self) -> anyhow::Result<Vec<String>>;

    /// Whether any relation (spatial or not) already uses the name.
    async fn table_exists(&self, table: &str) -> anyhow::Result<bool>;

    async fn srid_exists(&self, srid: i32) -> anyhow::Result<bool>;

    /// Create the table and its spatial index in one transaction.
    async fn create_table(&self, request: &NewSpatialTable) -> anyhow::Result<()>;

    async fn drop_table(&self, table: &TableSchema) -> anyhow::Result<()>;
}

/// Feature persistence for a resolved table. Every mutation runs in its own
/// transaction.
#[async_trait]
pub trait FeatureRepository: Send + Sync {
    async fn insert(
        &self,
        table: &TableSchema,
        geometry: &Geometry,
        attributes: &[AttributeBinding],
    ) -> anyhow::Result<Feature>;

    async fn find(&self, table: &TableSchema, id: i64) -> anyhow::Result<Option<Feature>>;

    /// Features ordered by id ascending.
    async fn list(&self, table: &TableSchema, offset: i64, limit: i64)
    -> anyhow::Result<Vec<Feature>>;

    /// `None` when no row has that id.
    async fn replace(
        &self,
        table: &TableSchema,
        id: i64,
        geometry: &Geometry,
        attributes: &[AttributeBinding],
    ) -> anyhow::Result<Option<Feature>>;

    /// `false` when no row had that id.
    async fn delete(&self, table: &TableSchema, id: i64) -> anyhow::Result<bool>;

    async fn query(&self, table: &TableSchema, query: &SpatialQuery)
    -> anyhow::Result<Vec<Feature>>;

    /// Buffer a free-standing geometry; no table is involved.
    async fn buffer(&self, geometry: &Geometry, srid: i32, distance: f64)
    -> anyhow::Result<Geometry>;
}
