//! Spatial Features Module Implementation
//!
//! CRUD and spatial queries over PostGIS tables that are discovered from the
//! database catalog at request time. The public API is defined in
//! `spatial-features-sdk` and re-exported here.

pub use spatial_features_sdk::{
    Feature, FeatureInput, Geometry, GeometryKind, NewSpatialTable, SpatialFeaturesClientV1,
    SpatialFeaturesError, SpatialQuery, TableSchema,
};

pub mod config;
pub mod local_client;
pub mod module;
pub use module::SpatialFeatures;

#[doc(hidden)]
pub mod api;
#[doc(hidden)]
pub mod domain;
#[doc(hidden)]
pub mod infra;

#[cfg(test)]
mod test_support;
