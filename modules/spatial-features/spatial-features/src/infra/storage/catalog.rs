//! Live table reflection against the PostGIS catalog.

use anyhow::Context;
use async_trait::async_trait;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, FromQueryResult, Statement, TransactionTrait,
};
use spatial_features_sdk::{ColumnInfo, GeometryKind, NewSpatialTable, TableSchema};
use tracing::{debug, instrument};

use super::errors::reject_duplicate_table;
use super::sql;
use crate::domain::repo::{TableCatalog, TableLookup};
use crate::domain::schema::column_type_for_udt;

const GEOMETRY_COLUMNS_SQL: &str = r"
SELECT f_geometry_column::text AS column_name,
       type::text AS geometry_type,
       srid
  FROM geometry_columns
 WHERE f_table_schema = $1 AND f_table_name = $2
 ORDER BY f_geometry_column";

const PRIMARY_KEY_SQL: &str = r"
SELECT a.attname::text AS column_name,
       t.typname::text AS udt_name
  FROM pg_index i
  JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
  JOIN pg_type t ON t.oid = a.atttypid
 WHERE i.indrelid = to_regclass(format('%I.%I', $1::text, $2::text))
   AND i.indisprimary";

const COLUMNS_SQL: &str = r"
SELECT column_name::text AS column_name,
       udt_name::text AS udt_name,
       (is_nullable = 'YES') AS nullable,
       (column_default IS NOT NULL OR is_identity = 'YES') AS has_default
  FROM information_schema.columns
 WHERE table_schema = $1 AND table_name = $2
 ORDER BY ordinal_position";

const LIST_TABLES_SQL: &str = r"
SELECT DISTINCT f_table_name::text AS table_name
  FROM geometry_columns
 WHERE f_table_schema = $1
 ORDER BY 1";

const TABLE_EXISTS_SQL: &str =
    "SELECT to_regclass(format('%I.%I', $1::text, $2::text)) IS NOT NULL AS present";

const SRID_EXISTS_SQL: &str =
    "SELECT EXISTS (SELECT 1 FROM spatial_ref_sys WHERE srid = $1) AS present";

const INTEGER_KEY_TYPES: [&str; 3] = ["int2", "int4", "int8"];

#[derive(Debug, Clone, FromQueryResult)]
struct GeometryColumnRow {
    column_name: String,
    geometry_type: String,
    srid: i32,
}

#[derive(Debug, Clone, FromQueryResult)]
struct KeyColumnRow {
    column_name: String,
    udt_name: String,
}

#[derive(Debug, Clone, FromQueryResult)]
struct ColumnRow {
    column_name: String,
    udt_name: String,
    nullable: bool,
    has_default: bool,
}

#[derive(Debug, FromQueryResult)]
struct TableNameRow {
    table_name: String,
}

#[derive(Debug, FromQueryResult)]
struct PresenceRow {
    present: bool,
}

/// [`TableCatalog`] backed by `geometry_columns`, `pg_index` and
/// `information_schema`. Every call reflects; see
/// [`CachedCatalog`](super::schema_cache::CachedCatalog) for caching.
pub struct PgTableCatalog {
    db: DatabaseConnection,
    schema: String,
    default_srid: i32,
}

impl PgTableCatalog {
    #[must_use]
    pub fn new(db: DatabaseConnection, schema: impl Into<String>, default_srid: i32) -> Self {
        Self {
            db,
            schema: schema.into(),
            default_srid,
        }
    }

    fn statement(&self, sql: &str, table: &str) -> Statement {
        Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            [self.schema.clone().into(), table.into()],
        )
    }

    async fn presence(&self, stmt: Statement) -> anyhow::Result<bool> {
        let row = PresenceRow::find_by_statement(stmt).one(&self.db).await?;
        Ok(row.is_some_and(|r| r.present))
    }
}

#[async_trait]
impl TableCatalog for PgTableCatalog {
    #[instrument(skip(self), fields(schema = %self.schema))]
    async fn resolve(&self, table: &str) -> anyhow::Result<TableLookup> {
        let geometry =
            GeometryColumnRow::find_by_statement(self.statement(GEOMETRY_COLUMNS_SQL, table))
                .all(&self.db)
                .await
                .context("failed to read geometry_columns")?;
        if geometry.is_empty() {
            debug!("No geometry column registered");
            return Ok(TableLookup::Missing);
        }

        let keys = KeyColumnRow::find_by_statement(self.statement(PRIMARY_KEY_SQL, table))
            .all(&self.db)
            .await
            .context("failed to read primary key")?;
        let columns = ColumnRow::find_by_statement(self.statement(COLUMNS_SQL, table))
            .all(&self.db)
            .await
            .context("failed to read columns")?;

        Ok(assemble(
            table,
            &self.schema,
            self.default_srid,
            &geometry,
            &keys,
            &columns,
        ))
    }

    async fn list_tables(&self) -> anyhow::Result<Vec<String>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            LIST_TABLES_SQL,
            [self.schema.clone().into()],
        );
        let rows = TableNameRow::find_by_statement(stmt)
            .all(&self.db)
            .await
            .context("failed to list spatial tables")?;
        Ok(rows.into_iter().map(|r| r.table_name).collect())
    }

    async fn table_exists(&self, table: &str) -> anyhow::Result<bool> {
        self.presence(self.statement(TABLE_EXISTS_SQL, table)).await
    }

    async fn srid_exists(&self, srid: i32) -> anyhow::Result<bool> {
        self.presence(Statement::from_sql_and_values(
            DbBackend::Postgres,
            SRID_EXISTS_SQL,
            [srid.into()],
        ))
        .await
    }

    #[instrument(skip(self, request), fields(table = %request.table_name))]
    async fn create_table(&self, request: &NewSpatialTable) -> anyhow::Result<()> {
        let txn = self.db.begin().await?;
        for ddl in sql::create_table(&self.schema, request) {
            debug!(sql = %ddl, "Executing DDL");
            txn.execute_unprepared(&ddl)
                .await
                .map_err(|e| reject_duplicate_table(e, &request.table_name))?;
        }
        txn.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, table), fields(table = %table.name))]
    async fn drop_table(&self, table: &TableSchema) -> anyhow::Result<()> {
        let txn = self.db.begin().await?;
        txn.execute_unprepared(&sql::drop_table(table)).await?;
        txn.commit().await?;
        Ok(())
    }
}

/// Turn raw catalog rows into a [`TableLookup`].
fn assemble(
    table: &str,
    schema: &str,
    default_srid: i32,
    geometry: &[GeometryColumnRow],
    keys: &[KeyColumnRow],
    columns: &[ColumnRow],
) -> TableLookup {
    let geom = match geometry {
        [] => return TableLookup::Missing,
        [only] => only,
        many => {
            return TableLookup::Unsupported(format!(
                "table has {} geometry columns; exactly one is supported",
                many.len()
            ));
        }
    };

    let geometry_kind = if geom.geometry_type.eq_ignore_ascii_case("GEOMETRY") {
        None
    } else if let Some(kind) = GeometryKind::from_postgis_type(&geom.geometry_type) {
        Some(kind)
    } else {
        return TableLookup::Unsupported(format!(
            "unsupported geometry type '{}'",
            geom.geometry_type
        ));
    };

    // No primary key: fall back to a column literally named `id`.
    let (id_column, id_udt) = match keys {
        [key] => (key.column_name.as_str(), key.udt_name.as_str()),
        [] => match columns.iter().find(|c| c.column_name == "id") {
            Some(c) => (c.column_name.as_str(), c.udt_name.as_str()),
            None => {
                return TableLookup::Unsupported(
                    "table has no primary key and no 'id' column".to_owned(),
                );
            }
        },
        _ => {
            return TableLookup::Unsupported(
                "composite primary keys are not supported".to_owned(),
            );
        }
    };
    if !INTEGER_KEY_TYPES.contains(&id_udt) {
        return TableLookup::Unsupported(format!(
            "identifier column '{id_column}' has non-integer type '{id_udt}'"
        ));
    }

    let attributes = columns
        .iter()
        .filter(|c| c.column_name != id_column && c.column_name != geom.column_name)
        .map(|c| ColumnInfo {
            name: c.column_name.clone(),
            column_type: column_type_for_udt(&c.udt_name),
            udt_name: c.udt_name.clone(),
            nullable: c.nullable,
            has_default: c.has_default,
        })
        .collect();

    TableLookup::Found(TableSchema {
        name: table.to_owned(),
        schema: schema.to_owned(),
        id_column: id_column.to_owned(),
        geometry_column: geom.column_name.clone(),
        geometry_kind,
        srid: if geom.srid > 0 { geom.srid } else { default_srid },
        columns: attributes,
    })
}
