use std::sync::Arc;

use axum::Router;
use spatial_features_sdk::SpatialFeaturesClientV1;
use tracing::info;
use utoipa::OpenApi;

use crate::api::rest::{openapi::ApiDoc, routes};
use crate::config::{DatabaseConfig, SpatialFeaturesConfig};
use crate::domain::repo::{FeatureRepository, TableCatalog};
use crate::domain::service::{Service, ServiceConfig};
use crate::infra::storage::{self, CachedCatalog, PgFeatureRepository, PgTableCatalog};
use crate::local_client::LocalClient;

impl From<&SpatialFeaturesConfig> for ServiceConfig {
    fn from(cfg: &SpatialFeaturesConfig) -> Self {
        Self {
            default_page_size: cfg.default_page_size,
            max_page_size: cfg.max_page_size,
            default_srid: cfg.default_srid,
        }
    }
}

/// The spatial-features module: owns the service and hands out its REST
/// router and in-process client.
pub struct SpatialFeatures {
    service: Arc<Service>,
}

impl SpatialFeatures {
    /// Connect to Postgres and wire the catalog, repository and service.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable.
    pub async fn connect(
        db: &DatabaseConfig,
        cfg: &SpatialFeaturesConfig,
    ) -> anyhow::Result<Self> {
        info!(schema = %cfg.schema, "Initializing spatial-features module");
        let conn = storage::connect(db).await?;

        let pg_catalog: Arc<dyn TableCatalog> = Arc::new(PgTableCatalog::new(
            conn.clone(),
            cfg.schema.clone(),
            cfg.default_srid,
        ));
        let catalog = match cfg.schema_cache_ttl {
            Some(ttl) => {
                info!(ttl = ?ttl, "Table schema cache enabled");
                Arc::new(CachedCatalog::new(pg_catalog, ttl)) as Arc<dyn TableCatalog>
            }
            None => pg_catalog,
        };
        let repo: Arc<dyn FeatureRepository> = Arc::new(PgFeatureRepository::new(conn));

        Ok(Self::from_parts(catalog, repo, cfg))
    }

    /// Build the module over explicit storage implementations.
    #[must_use]
    pub fn from_parts(
        catalog: Arc<dyn TableCatalog>,
        repo: Arc<dyn FeatureRepository>,
        cfg: &SpatialFeaturesConfig,
    ) -> Self {
        let service = Arc::new(Service::new(catalog, repo, cfg.into()));
        Self { service }
    }

    #[must_use]
    pub fn router(&self) -> Router {
        routes::router(self.service.clone())
    }

    #[must_use]
    pub fn client(&self) -> Arc<dyn SpatialFeaturesClientV1> {
        Arc::new(LocalClient::new(self.service.clone()))
    }

    #[must_use]
    pub fn openapi() -> utoipa::openapi::OpenApi {
        ApiDoc::openapi()
    }
}
