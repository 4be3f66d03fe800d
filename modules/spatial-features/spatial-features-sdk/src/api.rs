//! `SpatialFeaturesClientV1` trait definition.
//!
//! In-process consumers use this trait instead of going through HTTP. Every
//! table-scoped call resolves the table against the live database catalog.

use async_trait::async_trait;

use crate::errors::SpatialFeaturesError;
use crate::models::{
    Feature, FeatureInput, Geometry, NewSpatialTable, Page, SpatialQuery, TableSchema,
};

/// Public API trait for the spatial-features module.
#[async_trait]
pub trait SpatialFeaturesClientV1: Send + Sync {
    /// Insert a feature; geometry and attributes are validated against the table first.
    async fn create_feature(
        &self,
        table: &str,
        input: FeatureInput,
    ) -> Result<Feature, SpatialFeaturesError>;

    async fn get_feature(&self, table: &str, id: i64) -> Result<Feature, SpatialFeaturesError>;

    /// Page through a table ordered by identifier. `None` selects the configured defaults.
    async fn list_features(
        &self,
        table: &str,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Page<Feature>, SpatialFeaturesError>;

    /// Full replacement: attributes not present in `input` are cleared.
    async fn update_feature(
        &self,
        table: &str,
        id: i64,
        input: FeatureInput,
    ) -> Result<Feature, SpatialFeaturesError>;

    async fn delete_feature(&self, table: &str, id: i64) -> Result<(), SpatialFeaturesError>;

    async fn query_features(
        &self,
        table: &str,
        query: SpatialQuery,
    ) -> Result<Vec<Feature>, SpatialFeaturesError>;

    /// Buffer a geometry without touching any table.
    async fn buffer_geometry(
        &self,
        geometry: Geometry,
        distance: f64,
        srid: Option<i32>,
    ) -> Result<Geometry, SpatialFeaturesError>;

    async fn list_tables(&self) -> Result<Vec<String>, SpatialFeaturesError>;

    async fn describe_table(&self, table: &str) -> Result<TableSchema, SpatialFeaturesError>;

    async fn create_table(
        &self,
        request: NewSpatialTable,
    ) -> Result<TableSchema, SpatialFeaturesError>;

    async fn drop_table(&self, table: &str) -> Result<(), SpatialFeaturesError>;
}
