pub mod catalog;
pub mod db;
pub mod errors;
pub mod feature_repo;
pub mod schema_cache;
pub mod sql;

pub use catalog::PgTableCatalog;
pub use db::connect;
pub use feature_repo::PgFeatureRepository;
pub use schema_cache::CachedCatalog;
