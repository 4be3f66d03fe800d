//! TTL cache in front of a [`TableCatalog`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use spatial_features_sdk::{NewSpatialTable, TableSchema};
use tracing::debug;

use crate::domain::repo::{TableCatalog, TableLookup};

struct Entry {
    schema: TableSchema,
    cached_at: Instant,
}

/// Caches successful resolutions for `ttl`. Misses and unsupported tables are
/// never cached, so a table created out of band becomes visible immediately.
/// Create and drop through this catalog evict the affected entry.
pub struct CachedCatalog {
    inner: Arc<dyn TableCatalog>,
    ttl: Duration,
    entries: DashMap<String, Entry>,
}

impl CachedCatalog {
    #[must_use]
    pub fn new(inner: Arc<dyn TableCatalog>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn invalidate(&self, table: &str) {
        if self.entries.remove(table).is_some() {
            debug!(table, "Evicted cached table schema");
        }
    }

    fn fresh(&self, table: &str) -> Option<TableSchema> {
        let entry = self.entries.get(table)?;
        (entry.cached_at.elapsed() < self.ttl).then(|| entry.schema.clone())
    }
}

#[async_trait]
impl TableCatalog for CachedCatalog {
    async fn resolve(&self, table: &str) -> anyhow::Result<TableLookup> {
        if let Some(schema) = self.fresh(table) {
            return Ok(TableLookup::Found(schema));
        }
        let lookup = self.inner.resolve(table).await?;
        match &lookup {
            TableLookup::Found(schema) => {
                self.entries.insert(
                    table.to_owned(),
                    Entry {
                        schema: schema.clone(),
                        cached_at: Instant::now(),
                    },
                );
            }
            TableLookup::Missing | TableLookup::Unsupported(_) => self.invalidate(table),
        }
        Ok(lookup)
    }

    async fn list_tables(&self) -> anyhow::Result<Vec<String>> {
        self.inner.list_tables().await
    }

    async fn table_exists(&self, table: &str) -> anyhow::Result<bool> {
        self.inner.table_exists(table).await
    }

    async fn srid_exists(&self, srid: i32) -> anyhow::Result<bool> {
        self.inner.srid_exists(srid).await
    }

    async fn create_table(&self, request: &NewSpatialTable) -> anyhow::Result<()> {
        self.invalidate(&request.table_name);
        self.inner.create_table(request).await
    }

    async fn drop_table(&self, table: &TableSchema) -> anyhow::Result<()> {
        let result = self.inner.drop_table(table).await;
        self.invalidate(&table.name);
        result
    }
}
