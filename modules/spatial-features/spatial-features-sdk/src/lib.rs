//! Spatial Features SDK
//!
//! Client trait, models, and errors for the spatial-features module.

pub mod api;
pub mod errors;
pub mod models;

pub use api::SpatialFeaturesClientV1;
pub use errors::SpatialFeaturesError;
pub use models::{
    Attributes, BoundingBox, ColumnInfo, ColumnType, Feature, FeatureInput, FieldDefinition,
    FieldType, Geometry, GeometryKind, NewSpatialTable, Page, Position, QueryOperation,
    SpatialQuery, TableSchema,
};
