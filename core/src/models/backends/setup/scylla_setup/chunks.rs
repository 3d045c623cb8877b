//! Setup the `chunks` table and its by-job materialized view

use scylla::prepared_statement::PreparedStatement;
use scylla::Session;

use crate::utils::CoreError;
use crate::Conf;

/// The prepared statements for chunks
pub struct ChunksPreparedStatements {
    /// Bulk insert a batch of brand new, unassigned chunks
    pub insert: PreparedStatement,
    /// Get a chunk by its primary key
    pub get: PreparedStatement,
    /// List a job's chunks
    pub list_by_job: PreparedStatement,
    /// List a job's chunks, filtered to `UNASSIGNED`
    pub list_unassigned_by_job: PreparedStatement,
    /// Conditionally claim an `UNASSIGNED` chunk
    pub claim: PreparedStatement,
    /// Conditionally finish an `ASSIGNED` chunk owned by a given pod
    pub finish: PreparedStatement,
    /// Conditionally set an `ASSIGNED` chunk owned by a given pod to a new state
    pub revoke: PreparedStatement,
    /// Truncate every chunk, used by `DeleteAll` callers that also want chunks wiped
    pub truncate: PreparedStatement,
}

impl ChunksPreparedStatements {
    /// Build the chunks table/view and prepare its statements
    ///
    /// # Arguments
    ///
    /// * `session` - The scylla session to use
    /// * `config` - The core's config
    pub async fn new(session: &Session, config: &Conf) -> Result<Self, CoreError> {
        setup_table(session, config).await?;
        setup_by_job_mat_view(session, config).await?;
        Ok(ChunksPreparedStatements {
            insert: insert(session, config).await?,
            get: get(session, config).await?,
            list_by_job: list_by_job(session, config).await?,
            list_unassigned_by_job: list_unassigned_by_job(session, config).await?,
            claim: claim(session, config).await?,
            finish: finish(session, config).await?,
            revoke: revoke(session, config).await?,
            truncate: truncate(session, config).await?,
        })
    }
}

/// Create the `chunks` table
async fn setup_table(session: &Session, config: &Conf) -> Result<(), CoreError> {
    let cmd = format!(
        "CREATE TABLE IF NOT EXISTS {ns}.chunks (\
            id TEXT, \
            job_id TEXT, \
            state TEXT, \
            owner TEXT, \
            pods TEXT, \
            time_touched BIGINT, \
            PRIMARY KEY (id))",
        ns = &config.weft.namespace,
    );
    session.query_unpaged(cmd, &()).await?;
    Ok(())
}

/// Create the `chunks_by_job` materialized view
///
/// `ClaimChunk` takes its initial-replay snapshot from this view.
async fn setup_by_job_mat_view(session: &Session, config: &Conf) -> Result<(), CoreError> {
    let cmd = format!(
        "CREATE MATERIALIZED VIEW IF NOT EXISTS {ns}.chunks_by_job AS \
            SELECT job_id, id, state, owner, pods, time_touched \
            FROM {ns}.chunks \
            WHERE job_id IS NOT NULL AND id IS NOT NULL \
            PRIMARY KEY (job_id, id)",
        ns = &config.weft.namespace,
    );
    session.query_unpaged(cmd, &()).await?;
    Ok(())
}

/// Insert a new chunk
async fn insert(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "INSERT INTO {}.chunks (id, job_id, state, owner, pods, time_touched) \
            VALUES (?, ?, ?, ?, ?, ?)",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// Get a chunk by its primary key
async fn get(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "SELECT id, job_id, state, owner, pods, time_touched FROM {}.chunks WHERE id = ?",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// List a job's chunks
async fn list_by_job(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "SELECT id, job_id, state, owner, pods, time_touched \
            FROM {}.chunks_by_job WHERE job_id = ?",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// List a job's chunks, filtered to `UNASSIGNED` server-side
async fn list_unassigned_by_job(
    session: &Session,
    config: &Conf,
) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "SELECT id, job_id, state, owner, pods, time_touched \
            FROM {}.chunks_by_job WHERE job_id = ? AND state = ? ALLOW FILTERING",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// Conditionally claim a chunk: set owner/state/pods/time_touched if it's still `UNASSIGNED`
async fn claim(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "UPDATE {}.chunks SET owner = ?, state = ?, pods = ?, time_touched = ? \
            WHERE id = ? IF state = ?",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// Conditionally finish a chunk: set state = SUCCESS if owned and ASSIGNED
async fn finish(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "UPDATE {}.chunks SET state = ? WHERE id = ? IF owner = ? AND state = ?",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// Conditionally revoke a chunk: set state = UNASSIGNED/FAILED if owned and ASSIGNED
async fn revoke(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "UPDATE {}.chunks SET state = ? WHERE id = ? IF owner = ? AND state = ?",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// Truncate every chunk row
async fn truncate(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!("TRUNCATE {}.chunks", &config.weft.namespace);
    Ok(session.prepare(stmt).await?)
}
