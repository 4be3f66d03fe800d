use std::collections::HashSet;
use std::sync::Arc;

use spatial_features_sdk::{
    BoundingBox, Feature, FeatureInput, Geometry, NewSpatialTable, Page, SpatialQuery,
    TableSchema,
};
use tracing::{debug, info, instrument};

use super::error::DomainError;
use super::geometry;
use super::repo::{FeatureRepository, TableCatalog, TableLookup};
use super::schema::{self, WriteMode};

/// Column names every table created through the service reserves.
const RESERVED_COLUMNS: [&str; 2] = ["id", "geometry"];

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub default_page_size: u64,
    pub max_page_size: u64,
    pub default_srid: i32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_page_size: 100,
            max_page_size: 1000,
            default_srid: 4326,
        }
    }
}

/// Orchestrates validation, table resolution and persistence for every
/// table-scoped operation.
pub struct Service {
    catalog: Arc<dyn TableCatalog>,
    repo: Arc<dyn FeatureRepository>,
    config: ServiceConfig,
}

impl Service {
    #[must_use]
    pub fn new(
        catalog: Arc<dyn TableCatalog>,
        repo: Arc<dyn FeatureRepository>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            catalog,
            repo,
            config,
        }
    }

    /// # Errors
    /// Invalid name, unknown or unsupported table, or a catalog failure.
    #[instrument(skip(self))]
    pub async fn resolve_table(&self, table: &str) -> Result<TableSchema, DomainError> {
        let name = schema::normalize_table_name(table)?;
        match self.catalog.resolve(&name).await? {
            TableLookup::Found(schema) => {
                debug!(
                    geometry_column = %schema.geometry_column,
                    srid = schema.srid,
                    columns = schema.columns.len(),
                    "Resolved table"
                );
                Ok(schema)
            }
            TableLookup::Missing => Err(DomainError::table_not_found(name)),
            TableLookup::Unsupported(reason) => {
                Err(DomainError::UnsupportedTable { table: name, reason })
            }
        }
    }

    /// # Errors
    /// See [`DomainError`]; validation happens before any database call.
    #[instrument(skip(self, input))]
    pub async fn create_feature(
        &self,
        table: &str,
        input: FeatureInput,
    ) -> Result<Feature, DomainError> {
        schema::normalize_table_name(table)?;
        geometry::validate(&input.geometry)?;

        let schema = self.resolve_table(table).await?;
        geometry::check_kind(schema.geometry_kind, &input.geometry)?;
        let bindings = schema::bind_attributes(&schema, &input.attributes, WriteMode::Create)?;

        let feature = self.repo.insert(&schema, &input.geometry, &bindings).await?;
        info!(id = feature.id, "Created feature");
        Ok(feature)
    }

    /// # Errors
    /// [`DomainError::FeatureNotFound`] when the id is absent.
    #[instrument(skip(self))]
    pub async fn get_feature(&self, table: &str, id: i64) -> Result<Feature, DomainError> {
        let schema = self.resolve_table(table).await?;
        self.repo
            .find(&schema, id)
            .await?
            .ok_or(DomainError::FeatureNotFound {
                table: schema.name,
                id,
            })
    }

    /// `limit` is clamped to the configured maximum.
    ///
    /// # Errors
    /// Zero limit, oversized offset, or table errors.
    #[instrument(skip(self))]
    pub async fn list_features(
        &self,
        table: &str,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Page<Feature>, DomainError> {
        let offset = offset.unwrap_or(0);
        let limit = match limit {
            Some(0) => {
                return Err(DomainError::validation(
                    "limit",
                    "must be greater than zero",
                ));
            }
            Some(n) => n.min(self.config.max_page_size),
            None => self.config.default_page_size.min(self.config.max_page_size),
        };
        let sql_offset = i64::try_from(offset)
            .map_err(|_| DomainError::validation("skip", "offset is too large"))?;
        let sql_limit = i64::try_from(limit)
            .map_err(|_| DomainError::validation("limit", "limit is too large"))?;

        let schema = self.resolve_table(table).await?;
        let items = self.repo.list(&schema, sql_offset, sql_limit).await?;
        debug!(count = items.len(), offset, limit, "Listed features");
        Ok(Page {
            items,
            offset,
            limit,
        })
    }

    /// Full replacement of geometry and attributes; last writer wins.
    ///
    /// # Errors
    /// Validation errors, or [`DomainError::FeatureNotFound`].
    #[instrument(skip(self, input))]
    pub async fn update_feature(
        &self,
        table: &str,
        id: i64,
        input: FeatureInput,
    ) -> Result<Feature, DomainError> {
        schema::normalize_table_name(table)?;
        geometry::validate(&input.geometry)?;

        let schema = self.resolve_table(table).await?;
        geometry::check_kind(schema.geometry_kind, &input.geometry)?;
        let bindings = schema::bind_attributes(&schema, &input.attributes, WriteMode::Replace)?;

        let feature = self
            .repo
            .replace(&schema, id, &input.geometry, &bindings)
            .await?
            .ok_or_else(|| DomainError::FeatureNotFound {
                table: schema.name.clone(),
                id,
            })?;
        info!(id, "Replaced feature");
        Ok(feature)
    }

    /// # Errors
    /// [`DomainError::FeatureNotFound`] when nothing was deleted.
    #[instrument(skip(self))]
    pub async fn delete_feature(&self, table: &str, id: i64) -> Result<(), DomainError> {
        let schema = self.resolve_table(table).await?;
        if self.repo.delete(&schema, id).await? {
            info!(id, "Deleted feature");
            Ok(())
        } else {
            Err(DomainError::FeatureNotFound {
                table: schema.name,
                id,
            })
        }
    }

    /// # Errors
    /// Invalid query parameters, or table errors.
    #[instrument(skip(self, query), fields(operation = query.operation().as_str()))]
    pub async fn query_features(
        &self,
        table: &str,
        query: SpatialQuery,
    ) -> Result<Vec<Feature>, DomainError> {
        schema::normalize_table_name(table)?;
        validate_query(&query)?;

        let schema = self.resolve_table(table).await?;
        let features = self.repo.query(&schema, &query).await?;
        debug!(count = features.len(), "Spatial query matched");
        Ok(features)
    }

    /// Buffer a geometry on its own. `srid` defaults to the configured one.
    ///
    /// # Errors
    /// Invalid geometry, distance or SRID.
    #[instrument(skip(self, geometry))]
    pub async fn buffer_geometry(
        &self,
        geometry: Geometry,
        distance: f64,
        srid: Option<i32>,
    ) -> Result<Geometry, DomainError> {
        geometry::validate(&geometry)?;
        check_distance("buffer", distance)?;
        let srid = srid.unwrap_or(self.config.default_srid);
        if srid <= 0 {
            return Err(DomainError::validation("srid", "must be a positive SRID"));
        }
        Ok(self.repo.buffer(&geometry, srid, distance).await?)
    }

    /// # Errors
    /// Catalog failures.
    #[instrument(skip(self))]
    pub async fn list_tables(&self) -> Result<Vec<String>, DomainError> {
        Ok(self.catalog.list_tables().await?)
    }

    /// # Errors
    /// Invalid name, unknown or unsupported table.
    pub async fn describe_table(&self, table: &str) -> Result<TableSchema, DomainError> {
        self.resolve_table(table).await
    }

    /// Create a spatial table with a serial `id` and a `geometry` column.
    ///
    /// # Errors
    /// Invalid definition, unknown SRID, or [`DomainError::TableAlreadyExists`].
    #[instrument(skip(self, request), fields(table = %request.table_name))]
    pub async fn create_table(
        &self,
        mut request: NewSpatialTable,
    ) -> Result<TableSchema, DomainError> {
        request.table_name = schema::normalize_table_name(&request.table_name)?;
        normalize_fields(&mut request)?;
        if request.srid <= 0 {
            return Err(DomainError::validation("srid", "must be a positive SRID"));
        }

        if !self.catalog.srid_exists(request.srid).await? {
            return Err(DomainError::validation(
                "srid",
                format!("unknown SRID {}", request.srid),
            ));
        }
        if self.catalog.table_exists(&request.table_name).await? {
            return Err(DomainError::TableAlreadyExists {
                table: request.table_name,
            });
        }

        self.catalog.create_table(&request).await?;
        info!(
            geometry_type = request.geometry_kind.postgis_type(),
            srid = request.srid,
            fields = request.fields.len(),
            "Created spatial table"
        );

        match self.catalog.resolve(&request.table_name).await? {
            TableLookup::Found(schema) => Ok(schema),
            other => Err(DomainError::Database(anyhow::anyhow!(
                "table '{}' not resolvable after creation: {other:?}",
                request.table_name
            ))),
        }
    }

    /// Drop a spatial table and everything depending on it.
    ///
    /// # Errors
    /// Invalid name, unknown or unsupported table.
    #[instrument(skip(self))]
    pub async fn drop_table(&self, table: &str) -> Result<(), DomainError> {
        let schema = self.resolve_table(table).await?;
        self.catalog.drop_table(&schema).await?;
        info!(table = %schema.name, "Dropped spatial table");
        Ok(())
    }
}

fn normalize_fields(request: &mut NewSpatialTable) -> Result<(), DomainError> {
    let mut seen = HashSet::new();
    for (i, field) in request.fields.iter_mut().enumerate() {
        let path = format!("fields[{i}].name");
        if !schema::is_valid_identifier(&field.name) {
            return Err(DomainError::validation(
                path,
                format!("invalid field name '{}'", field.name),
            ));
        }
        field.name = field.name.to_ascii_lowercase();
        if RESERVED_COLUMNS.contains(&field.name.as_str()) {
            return Err(DomainError::validation(
                path,
                format!("'{}' is reserved", field.name),
            ));
        }
        if !seen.insert(field.name.clone()) {
            return Err(DomainError::validation(
                path,
                format!("duplicate field '{}'", field.name),
            ));
        }
    }
    Ok(())
}

fn validate_query(query: &SpatialQuery) -> Result<(), DomainError> {
    match query {
        SpatialQuery::BoundingBox(bbox) => check_bbox(bbox),
        SpatialQuery::Intersects(g) | SpatialQuery::Within(g) => Ok(geometry::validate(g)?),
        SpatialQuery::Buffer { geometry, distance } => {
            geometry::validate(geometry)?;
            check_distance("buffer", *distance)
        }
        SpatialQuery::Distance { geometry, meters } => {
            geometry::validate(geometry)?;
            check_distance("distance", *meters)
        }
    }
}

fn check_bbox(bbox: &BoundingBox) -> Result<(), DomainError> {
    let values = [bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y];
    if !values.iter().all(|v| v.is_finite()) {
        return Err(DomainError::validation("bbox", "values must be finite numbers"));
    }
    if bbox.min_x > bbox.max_x || bbox.min_y > bbox.max_y {
        return Err(DomainError::validation(
            "bbox",
            "expected [minX, minY, maxX, maxY] with min <= max",
        ));
    }
    Ok(())
}

fn check_distance(field: &str, distance: f64) -> Result<(), DomainError> {
    if distance.is_finite() && distance > 0.0 {
        Ok(())
    } else {
        Err(DomainError::validation(
            field,
            "must be a finite number greater than zero",
        ))
    }
}
