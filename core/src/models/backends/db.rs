//! The raw scylla/redis query layer the registries and coordinator build on

pub mod chunks;
pub mod helpers;
pub mod jobs;
pub mod pipelines;
