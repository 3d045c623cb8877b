//! The registries and coordinator that implement the data model's operations

pub mod chunks;
pub mod db;
pub mod jobs;
pub mod pipelines;
pub mod schema;
pub mod setup;
pub mod streams;
