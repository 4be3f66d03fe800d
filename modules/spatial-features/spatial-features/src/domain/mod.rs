pub mod error;
pub mod geometry;
pub mod repo;
pub mod schema;
pub mod service;

#[cfg(test)]
mod service_test;
