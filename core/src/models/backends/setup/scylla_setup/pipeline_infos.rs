//! Setup the `pipeline_infos` table and its shard-filtered materialized view

use scylla::prepared_statement::PreparedStatement;
use scylla::Session;

use crate::utils::CoreError;
use crate::Conf;

/// The prepared statements for pipeline infos
pub struct PipelineInfosPreparedStatements {
    /// Insert a brand new pipeline, failing if one with this name already exists
    pub insert: PreparedStatement,
    /// Get a pipeline by its primary key
    pub get: PreparedStatement,
    /// Upsert a pipeline, preserving `created_at`
    pub upsert: PreparedStatement,
    /// Upsert a pipeline's state
    pub set_state: PreparedStatement,
    /// Upsert a pipeline's stopped flag
    pub set_stopped: PreparedStatement,
    /// List every pipeline
    pub scan: PreparedStatement,
    /// List pipelines by shard
    pub list_by_shard: PreparedStatement,
    /// Delete a pipeline by its primary key
    pub delete: PreparedStatement,
    /// Truncate every pipeline, used by `DeleteAll`
    pub truncate: PreparedStatement,
}

impl PipelineInfosPreparedStatements {
    /// Build the pipeline infos table/view and prepare its statements
    ///
    /// # Arguments
    ///
    /// * `session` - The scylla session to use
    /// * `config` - The core's config
    pub async fn new(session: &Session, config: &Conf) -> Result<Self, CoreError> {
        setup_table(session, config).await?;
        setup_by_shard_mat_view(session, config).await?;
        Ok(PipelineInfosPreparedStatements {
            insert: insert(session, config).await?,
            get: get(session, config).await?,
            upsert: upsert(session, config).await?,
            set_state: set_state(session, config).await?,
            set_stopped: set_stopped(session, config).await?,
            scan: scan(session, config).await?,
            list_by_shard: list_by_shard(session, config).await?,
            delete: delete(session, config).await?,
            truncate: truncate(session, config).await?,
        })
    }
}

/// Create the `pipeline_infos` table
async fn setup_table(session: &Session, config: &Conf) -> Result<(), CoreError> {
    let cmd = format!(
        "CREATE TABLE IF NOT EXISTS {ns}.pipeline_infos (\
            pipeline_name TEXT, \
            shard INT, \
            state TEXT, \
            stopped BOOLEAN, \
            created_at TIMESTAMP, \
            PRIMARY KEY (pipeline_name))",
        ns = &config.weft.namespace,
    );
    session.query_unpaged(cmd, &()).await?;
    Ok(())
}

/// Create the `pipeline_infos_by_shard` materialized view
async fn setup_by_shard_mat_view(session: &Session, config: &Conf) -> Result<(), CoreError> {
    let cmd = format!(
        "CREATE MATERIALIZED VIEW IF NOT EXISTS {ns}.pipeline_infos_by_shard AS \
            SELECT shard, pipeline_name, state, stopped, created_at \
            FROM {ns}.pipeline_infos \
            WHERE shard IS NOT NULL AND pipeline_name IS NOT NULL \
            PRIMARY KEY (shard, pipeline_name)",
        ns = &config.weft.namespace,
    );
    session.query_unpaged(cmd, &()).await?;
    Ok(())
}

/// Insert a new pipeline, failing with a store-level conflict if the name is already taken
async fn insert(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "INSERT INTO {}.pipeline_infos (pipeline_name, shard, state, stopped, created_at) \
            VALUES (?, ?, ?, ?, ?) IF NOT EXISTS",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// Get a pipeline by its primary key
async fn get(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "SELECT pipeline_name, shard, state, stopped, created_at FROM {}.pipeline_infos \
            WHERE pipeline_name = ?",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// Upsert a pipeline's `shard`/`state`/`stopped`, leaving `created_at` untouched
async fn upsert(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "UPDATE {}.pipeline_infos SET shard = ?, state = ?, stopped = ? WHERE pipeline_name = ?",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// Upsert a pipeline's state
async fn set_state(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "UPDATE {}.pipeline_infos SET state = ? WHERE pipeline_name = ?",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// Upsert a pipeline's stopped flag
async fn set_stopped(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "UPDATE {}.pipeline_infos SET stopped = ? WHERE pipeline_name = ?",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// List every pipeline
async fn scan(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "SELECT pipeline_name, shard, state, stopped, created_at FROM {}.pipeline_infos",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// List pipelines by shard
async fn list_by_shard(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "SELECT pipeline_name, shard, state, stopped, created_at \
            FROM {}.pipeline_infos_by_shard WHERE shard = ?",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// Delete a pipeline by its primary key
async fn delete(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "DELETE FROM {}.pipeline_infos WHERE pipeline_name = ?",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// Truncate every pipeline row, used by `DeleteAll`
async fn truncate(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!("TRUNCATE {}.pipeline_infos", &config.weft.namespace);
    Ok(session.prepare(stmt).await?)
}
