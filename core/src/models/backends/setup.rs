//! Sets up the connection pools for scylla and redis

pub mod redis_setup;
pub(crate) mod scylla_setup;

pub use redis_setup::redis;
pub use scylla_setup::Scylla;
