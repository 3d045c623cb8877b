//! Sets up Scylla: the keyspace, the three collections' tables/materialized
//! views, and their prepared statements.

use chrono::prelude::*;
use chrono::Duration;
use futures::{poll, task::Poll};
use scylla::transport::session_builder::GenericSessionBuilder;
use scylla::{Session, SessionBuilder};
use std::time::Duration as StdDuration;

pub mod chunks;
pub mod job_infos;
pub mod pipeline_infos;

use chunks::ChunksPreparedStatements;
use job_infos::JobInfosPreparedStatements;
use pipeline_infos::PipelineInfosPreparedStatements;

use crate::utils::CoreError;
use crate::{setup, Conf};

/// The prepared statements for all three collections
pub struct ScyllaPreparedStatements {
    /// The job infos related prepared statements
    pub job_infos: JobInfosPreparedStatements,
    /// The pipeline infos related prepared statements
    pub pipeline_infos: PipelineInfosPreparedStatements,
    /// The chunks related prepared statements
    pub chunks: ChunksPreparedStatements,
}

impl ScyllaPreparedStatements {
    /// Create our scylla prepared statements
    ///
    /// # Arguments
    ///
    /// * `session` - A scylla session
    /// * `config` - The core's config
    pub async fn new(session: &Session, config: &Conf) -> Result<Self, CoreError> {
        let job_infos = JobInfosPreparedStatements::new(session, config).await?;
        let pipeline_infos = PipelineInfosPreparedStatements::new(session, config).await?;
        let chunks = ChunksPreparedStatements::new(session, config).await?;
        Ok(ScyllaPreparedStatements {
            job_infos,
            pipeline_infos,
            chunks,
        })
    }
}

/// The scylla client and prepared statements
pub struct Scylla {
    /// The scylla session object
    pub session: Session,
    /// prepared statements for scylla
    pub prep: ScyllaPreparedStatements,
}

impl Scylla {
    /// Create a new scylla client
    ///
    /// # Arguments
    ///
    /// * `config` - The core's config
    pub async fn new(config: &Conf) -> Self {
        // loop and try to complete this future
        for _ in 0..4 {
            // get the correct timeout for scylla
            let timeout = Utc::now() + Duration::seconds(i64::from(config.scylla.setup_time));
            // get a clone of our config and log
            let config_clone = config.clone();
            // build the future for our setup
            let mut future = tokio::spawn(async move { build(config_clone).await });
            // timeout appears to just hang so were going to check it manually
            loop {
                // check if this future has completed yet
                if let Poll::Ready(join_result) = poll!(&mut future) {
                    // if this future has errored out then panic with that error
                    match join_result {
                        Ok(client) => return client,
                        // there was an error so print it and try again
                        Err(err) => {
                            // print our error and try again
                            setup!(
                                config.weft.tracing.local.level,
                                format!("Scylla setup error {:#?}", err)
                            );
                            // try to connect to scylla again
                            break;
                        }
                    }
                }
                // check if we are past our timeout yet
                if Utc::now() > timeout {
                    setup!(
                        config.weft.tracing.local.level,
                        format!(
                            "Failed to connect to scylla in {} seconds",
                            config.scylla.setup_time
                        )
                    );
                    break;
                }
                // sleep for 100 milliseconds
                tokio::time::sleep(StdDuration::from_millis(100)).await;
            }
        }
        // panic if we fail to connect
        panic!("Failed to connect/setup Scylla");
    }
}

/// Create a new session to scylla
///
/// Arguments
///
/// * `config` - The core's config
pub async fn new_session(config: &Conf) -> Session {
    // connecting to scylla
    setup!(
        config.weft.tracing.local.level,
        format!("Connecting to scylla at {}", config.scylla.nodes.join(", "))
    );
    // start building our scylla client
    let mut session = SessionBuilder::new();
    // if we have auth info for scylla then add that
    if let Some(creds) = &config.scylla.auth {
        setup!(
            config.weft.tracing.local.level,
            format!("Authenticating to Scylla as {}", creds.username)
        );
        // inject our creds
        session = session.user(&creds.username, &creds.password);
    }
    // set our request timeout
    let session =
        session.connection_timeout(StdDuration::from_secs(u64::from(config.scylla.setup_time)));
    // build our session
    config
        .scylla
        .nodes
        .iter()
        .fold(session, GenericSessionBuilder::known_node)
        .build()
        .await
        .expect("Failed to build scylla session")
}

/// Setup the keyspace for this core
///
/// Treats "keyspace already exists" as success, so the schema manager's
/// `Initialize` is safe to call on every boot.
///
/// # Arguments
///
/// * `session` - The scylla session to use
/// * `config` - The core's config
pub async fn setup_keyspace(session: &Session, config: &Conf) -> Result<(), CoreError> {
    // build keyspace create command
    let keyspace_cmd = format!(
        "CREATE KEYSPACE IF NOT EXISTS {ns} WITH REPLICATION = \
            {{'class' : 'NetworkTopologyStrategy', 'replication_factor': {repl_factor}}}",
        ns = &config.weft.namespace,
        repl_factor = &config.scylla.replication
    );
    session.query_unpaged(keyspace_cmd, &()).await?;
    Ok(())
}

/// Build a session and setup tables/materialized views/prepared statements
async fn build(config: Conf) -> Scylla {
    // Create a new session for scylla
    let session = new_session(&config).await;
    // setup our keyspace if it doesn't already exist
    setup_keyspace(&session, &config)
        .await
        .expect("Failed to setup keyspace");
    // get our tables/materialized views and prepared statements
    let prep = ScyllaPreparedStatements::new(&session, &config)
        .await
        .expect("Failed to setup tables/prepared statements");
    // build our scylla client
    Scylla { session, prep }
}
