//! The persistence and coordination core for a data-pipeline orchestrator
//!
//! This crate owns the durable state of pipelines, jobs, and chunks and the
//! concurrent coordination around them (atomic chunk claims, change-feed
//! subscriptions, blocking state waits). It does not speak any wire
//! protocol; an RPC layer, the pod scheduler, and the workers themselves
//! are all external collaborators that consume this crate.

#[macro_use]
extern crate serde_derive;

pub mod conf;
pub mod models;
pub mod utils;

pub use conf::Conf;
pub use utils::errors::CoreError;

/// Connect to the backing stores
///
/// Callers embedding this crate should follow this with
/// [`models::backends::schema::initialize`] and
/// [`models::backends::schema::check`] before serving any requests, the way
/// `main.rs` does for the boot-sequence smoke test.
///
/// # Arguments
///
/// * `config` - The core's configuration
///
/// # Panics
///
/// Will panic if we cannot connect to Scylla or Redis.
pub async fn connect(config: Conf) -> std::sync::Arc<utils::Shared> {
    // setup shared object (scylla session + prepared statements + redis pool)
    let shared = utils::Shared::new(config).await;
    std::sync::Arc::new(shared)
}
