use anyhow::{Context, anyhow};
use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, QueryResult, TransactionTrait};
use serde_json::Value;
use spatial_features_sdk::{Attributes, Feature, Geometry, SpatialQuery, TableSchema};
use tracing::{debug, instrument, warn};

use super::errors::reject_bad_data;
use super::sql;
use crate::domain::geometry::parse_geometry;
use crate::domain::repo::FeatureRepository;
use crate::domain::schema::AttributeBinding;

/// [`FeatureRepository`] over a sea-orm Postgres connection pool.
pub struct PgFeatureRepository {
    db: DatabaseConnection,
}

impl PgFeatureRepository {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn decode_geometry(raw: Option<String>) -> anyhow::Result<Geometry> {
    let raw = raw.ok_or_else(|| anyhow!("row has a NULL geometry"))?;
    let value: Value = serde_json::from_str(&raw).context("ST_AsGeoJSON returned invalid JSON")?;
    parse_geometry(&value)
        .map_err(|v| anyhow!("stored geometry rejected at {}: {}", v.field, v.message))
}

fn decode_feature(row: &QueryResult) -> anyhow::Result<Feature> {
    let id: i64 = row.try_get("", sql::COL_ID)?;
    let geometry = decode_geometry(row.try_get("", sql::COL_GEOMETRY)?)
        .with_context(|| format!("feature {id}"))?;
    let properties: String = row.try_get("", sql::COL_PROPERTIES)?;
    let attributes: Attributes =
        serde_json::from_str(&properties).context("row properties are not a JSON object")?;
    Ok(Feature {
        id,
        geometry,
        attributes,
    })
}

/// Rows written outside the API may hold NULL, empty or collection
/// geometries; they are left out of reads instead of failing the whole page.
fn readable(decoded: anyhow::Result<Feature>, table: &TableSchema) -> Option<Feature> {
    match decoded {
        Ok(feature) => Some(feature),
        Err(e) => {
            warn!(table = %table.name, error = %format!("{e:#}"), "Skipping unreadable feature row");
            None
        }
    }
}

#[async_trait]
impl FeatureRepository for PgFeatureRepository {
    #[instrument(skip_all, fields(table = %table.name))]
    async fn insert(
        &self,
        table: &TableSchema,
        geometry: &Geometry,
        attributes: &[AttributeBinding],
    ) -> anyhow::Result<Feature> {
        let txn = self.db.begin().await?;
        let row = txn
            .query_one(sql::insert(table, geometry, attributes))
            .await
            .map_err(reject_bad_data)?
            .context("INSERT ... RETURNING produced no row")?;
        txn.commit().await?;
        decode_feature(&row)
    }

    async fn find(&self, table: &TableSchema, id: i64) -> anyhow::Result<Option<Feature>> {
        let row = self.db.query_one(sql::select_by_id(table, id)).await?;
        Ok(row.and_then(|r| readable(decode_feature(&r), table)))
    }

    async fn list(
        &self,
        table: &TableSchema,
        offset: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<Feature>> {
        let rows = self.db.query_all(sql::select_page(table, offset, limit)).await?;
        Ok(rows.iter().filter_map(|r| readable(decode_feature(r), table)).collect())
    }

    #[instrument(skip_all, fields(table = %table.name, id))]
    async fn replace(
        &self,
        table: &TableSchema,
        id: i64,
        geometry: &Geometry,
        attributes: &[AttributeBinding],
    ) -> anyhow::Result<Option<Feature>> {
        let txn = self.db.begin().await?;
        let row = txn
            .query_one(sql::replace(table, id, geometry, attributes))
            .await
            .map_err(reject_bad_data)?;
        txn.commit().await?;
        row.as_ref().map(decode_feature).transpose()
    }

    #[instrument(skip_all, fields(table = %table.name, id))]
    async fn delete(&self, table: &TableSchema, id: i64) -> anyhow::Result<bool> {
        let txn = self.db.begin().await?;
        let result = txn.execute(sql::delete(table, id)).await?;
        txn.commit().await?;
        debug!(rows = result.rows_affected(), "Delete executed");
        Ok(result.rows_affected() > 0)
    }

    async fn query(&self, table: &TableSchema, query: &SpatialQuery) -> anyhow::Result<Vec<Feature>> {
        let rows = self.db.query_all(sql::select_matching(table, query)).await?;
        Ok(rows.iter().filter_map(|r| readable(decode_feature(r), table)).collect())
    }

    async fn buffer(&self, geometry: &Geometry, srid: i32, distance: f64) -> anyhow::Result<Geometry> {
        let row = self
            .db
            .query_one(sql::buffer(geometry, srid, distance))
            .await?
            .context("buffer query produced no row")?;
        decode_geometry(row.try_get("", sql::COL_GEOMETRY)?)
    }
}
