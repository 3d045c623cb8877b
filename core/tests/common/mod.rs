//! Shared setup for the integration tests: connect to a local Scylla + Redis
//! pair, make sure the schema is ready, and mint collision-free names.
//!
//! Tests all share one keyspace (`tests/weft.yml`'s namespace) rather than
//! each getting its own, and rely on unique per-test names instead of
//! isolating via a fresh keyspace.

use std::sync::Arc;
use uuid::Uuid;

use weft_core::models::backends::schema;
use weft_core::utils::Shared;
use weft_core::Conf;

lazy_static::lazy_static! {
    /// The config every integration test connects with, loaded once per test binary
    static ref CONF: Conf = Conf::new("tests/weft.yml").expect("failed to load tests/weft.yml");
}

/// Connect to the test Scylla + Redis pair and make sure the schema exists
pub async fn shared() -> Arc<Shared> {
    let shared = weft_core::connect(CONF.clone()).await;
    schema::initialize(&shared)
        .await
        .expect("failed to initialize schema");
    schema::check(&shared).await.expect("schema is not ready");
    shared
}

/// Mint a unique name for a pipeline/job/chunk/pod under test, so concurrent
/// test runs against the shared namespace don't collide
pub fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}
