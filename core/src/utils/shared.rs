//! Objects shared across every registry/coordinator call
use bb8_redis::{bb8::Pool, RedisConnectionManager};

use crate::conf::Conf;
use crate::error;
use crate::info;
use crate::models::backends::setup::{self, Scylla};

/// Tries to execute a future 10 times with a custom timeout
///
/// # Arguments
///
/// * `future` - The future to try to complete
/// * `timeout` - How long to wait for each attempt to complete
macro_rules! retry {
    ($future:expr, $timeout:expr, $name:expr, $config:expr) => {{
        let mut i = 0;
        loop {
            match tokio::time::timeout(std::time::Duration::from_secs($timeout), $future).await {
                Ok(res) => break res,
                Err(err) => {
                    error!(
                        $config.weft.tracing.local.level,
                        format!(
                            "Future {} failed to complete in {} seconds. Restarting!",
                            $name, $timeout
                        )
                    );
                    if i == 9 {
                        panic!("{:#?}", err)
                    } else {
                        i += 1;
                        continue;
                    }
                }
            }
        }
    }};
}

/// The objects shared by every job/pipeline/chunk operation
pub struct Shared {
    /// The core's config
    pub config: Conf,
    /// A connection pool for the change-feed streams in redis
    pub redis: Pool<RedisConnectionManager>,
    /// A session (plus prepared statements) for talking to scylla
    pub scylla: Scylla,
}

impl Shared {
    /// Sets up the shared object
    ///
    /// # Arguments
    ///
    /// * `config` - The core's config to use
    pub async fn new(config: Conf) -> Self {
        // log the namespace we will be using
        info!(
            config.weft.tracing.local.level,
            format!("Using namespace {}", config.weft.namespace)
        );
        // setup redis connection pool
        let redis = retry!(setup::redis(&config), 2, "Redis setup", config);
        // setup scylla session and prepared statements
        let scylla = Scylla::new(&config).await;
        Shared {
            config,
            redis,
            scylla,
        }
    }
}
