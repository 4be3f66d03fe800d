use std::sync::Arc;

use async_trait::async_trait;
use spatial_features_sdk::{
    Feature, FeatureInput, Geometry, NewSpatialTable, Page, SpatialFeaturesClientV1,
    SpatialFeaturesError, SpatialQuery, TableSchema,
};

use crate::domain::service::Service;

/// In-process implementation of [`SpatialFeaturesClientV1`].
pub struct LocalClient {
    service: Arc<Service>,
}

impl LocalClient {
    #[must_use]
    pub fn new(service: Arc<Service>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl SpatialFeaturesClientV1 for LocalClient {
    async fn create_feature(
        &self,
        table: &str,
        input: FeatureInput,
    ) -> Result<Feature, SpatialFeaturesError> {
        self.service
            .create_feature(table, input)
            .await
            .map_err(Into::into)
    }

    async fn get_feature(&self, table: &str, id: i64) -> Result<Feature, SpatialFeaturesError> {
        self.service.get_feature(table, id).await.map_err(Into::into)
    }

    async fn list_features(
        &self,
        table: &str,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Page<Feature>, SpatialFeaturesError> {
        self.service
            .list_features(table, offset, limit)
            .await
            .map_err(Into::into)
    }

    async fn update_feature(
        &self,
        table: &str,
        id: i64,
        input: FeatureInput,
    ) -> Result<Feature, SpatialFeaturesError> {
        self.service
            .update_feature(table, id, input)
            .await
            .map_err(Into::into)
    }

    async fn delete_feature(&self, table: &str, id: i64) -> Result<(), SpatialFeaturesError> {
        self.service
            .delete_feature(table, id)
            .await
            .map_err(Into::into)
    }

    async fn query_features(
        &self,
        table: &str,
        query: SpatialQuery,
    ) -> Result<Vec<Feature>, SpatialFeaturesError> {
        self.service
            .query_features(table, query)
            .await
            .map_err(Into::into)
    }

    async fn buffer_geometry(
        &self,
        geometry: Geometry,
        distance: f64,
        srid: Option<i32>,
    ) -> Result<Geometry, SpatialFeaturesError> {
        self.service
            .buffer_geometry(geometry, distance, srid)
            .await
            .map_err(Into::into)
    }

    async fn list_tables(&self) -> Result<Vec<String>, SpatialFeaturesError> {
        self.service.list_tables().await.map_err(Into::into)
    }

    async fn describe_table(&self, table: &str) -> Result<TableSchema, SpatialFeaturesError> {
        self.service.describe_table(table).await.map_err(Into::into)
    }

    async fn create_table(
        &self,
        request: NewSpatialTable,
    ) -> Result<TableSchema, SpatialFeaturesError> {
        self.service.create_table(request).await.map_err(Into::into)
    }

    async fn drop_table(&self, table: &str) -> Result<(), SpatialFeaturesError> {
        self.service.drop_table(table).await.map_err(Into::into)
    }
}
