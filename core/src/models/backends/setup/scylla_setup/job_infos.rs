//! Setup the `job_infos` table and its secondary-index materialized views

use scylla::prepared_statement::PreparedStatement;
use scylla::Session;

use crate::utils::CoreError;
use crate::Conf;

/// The prepared statements for job infos
pub struct JobInfosPreparedStatements {
    /// Insert a brand new job, failing if one with this `job_id` already exists
    pub insert: PreparedStatement,
    /// Get a job by its primary key
    pub get: PreparedStatement,
    /// List jobs by owning pipeline
    pub list_by_pipeline: PreparedStatement,
    /// List jobs by commit index
    pub list_by_commit_index: PreparedStatement,
    /// List jobs by the compound (pipeline, commit index) view
    pub list_by_pipeline_and_commit_index: PreparedStatement,
    /// Full table scan, used when `ListJobInfos` has no filters
    pub scan: PreparedStatement,
    /// Delete a job by its primary key
    pub delete: PreparedStatement,
    /// Delete every job belonging to a pipeline
    pub delete_for_pipeline: PreparedStatement,
    /// Upsert a job's state (and optionally `finished`)
    pub set_state: PreparedStatement,
    /// Upsert a job's output
    pub set_output: PreparedStatement,
    /// Conditionally transition `PULLING -> RUNNING`
    pub start: PreparedStatement,
    /// Count jobs for a pipeline grouped by state
    pub counts_for_pipeline: PreparedStatement,
    /// Truncate every job row, used by `DeleteAll`
    pub truncate: PreparedStatement,
}

impl JobInfosPreparedStatements {
    /// Build the job infos table/views and prepare its statements
    ///
    /// # Arguments
    ///
    /// * `session` - The scylla session to use
    /// * `config` - The core's config
    pub async fn new(session: &Session, config: &Conf) -> Result<Self, CoreError> {
        setup_table(session, config).await?;
        setup_by_pipeline_mat_view(session, config).await?;
        setup_by_commit_index_mat_view(session, config).await?;
        setup_by_pipeline_and_commit_index_mat_view(session, config).await?;
        Ok(JobInfosPreparedStatements {
            insert: insert(session, config).await?,
            get: get(session, config).await?,
            list_by_pipeline: list_by_pipeline(session, config).await?,
            list_by_commit_index: list_by_commit_index(session, config).await?,
            list_by_pipeline_and_commit_index: list_by_pipeline_and_commit_index(session, config)
                .await?,
            scan: scan(session, config).await?,
            delete: delete(session, config).await?,
            delete_for_pipeline: delete_for_pipeline(session, config).await?,
            set_state: set_state(session, config).await?,
            set_output: set_output(session, config).await?,
            start: start(session, config).await?,
            counts_for_pipeline: counts_for_pipeline(session, config).await?,
            truncate: truncate(session, config).await?,
        })
    }
}

/// Create the `job_infos` table
///
/// This is the ground truth for every job. `pipeline_commit_index` is a
/// denormalized, write-time column: the synthetic fingerprint
/// [`crate::models::backends::db::jobs::pipeline_commit_key`] derives from
/// `pipeline_name`/`commit_index`, carried as its own column so the compound
/// lookup view below only has to promote a single non-base-PK column.
async fn setup_table(session: &Session, config: &Conf) -> Result<(), CoreError> {
    let cmd = format!(
        "CREATE TABLE IF NOT EXISTS {ns}.job_infos (\
            job_id TEXT, \
            pipeline_name TEXT, \
            inputs TEXT, \
            commit_index TEXT, \
            pipeline_commit_index TEXT, \
            state TEXT, \
            started TIMESTAMP, \
            finished TIMESTAMP, \
            output TEXT, \
            PRIMARY KEY (job_id))",
        ns = &config.weft.namespace,
    );
    session.query_unpaged(cmd, &()).await?;
    Ok(())
}

/// Create the `job_infos_by_pipeline` materialized view
///
/// Lets `ListJobInfos` select by `PipelineName` alone
async fn setup_by_pipeline_mat_view(session: &Session, config: &Conf) -> Result<(), CoreError> {
    let cmd = format!(
        "CREATE MATERIALIZED VIEW IF NOT EXISTS {ns}.job_infos_by_pipeline AS \
            SELECT pipeline_name, job_id, inputs, commit_index, state, started, finished, output \
            FROM {ns}.job_infos \
            WHERE pipeline_name IS NOT NULL AND job_id IS NOT NULL \
            PRIMARY KEY (pipeline_name, job_id)",
        ns = &config.weft.namespace,
    );
    session.query_unpaged(cmd, &()).await?;
    Ok(())
}

/// Create the `job_infos_by_commit_index` materialized view
///
/// Lets `ListJobInfos` select by `CommitIndex` alone
async fn setup_by_commit_index_mat_view(session: &Session, config: &Conf) -> Result<(), CoreError> {
    let cmd = format!(
        "CREATE MATERIALIZED VIEW IF NOT EXISTS {ns}.job_infos_by_commit_index AS \
            SELECT commit_index, job_id, pipeline_name, inputs, state, started, finished, output \
            FROM {ns}.job_infos \
            WHERE commit_index IS NOT NULL AND job_id IS NOT NULL \
            PRIMARY KEY (commit_index, job_id)",
        ns = &config.weft.namespace,
    );
    session.query_unpaged(cmd, &()).await?;
    Ok(())
}

/// Create the compound `job_infos_by_pipeline_and_commit_index` materialized view
///
/// The most selective index, used when `ListJobInfos` is given both a
/// pipeline and a commit set. A materialized view's key may only promote a
/// single column that isn't already part of the base table's primary key
/// (here, `job_id`); `pipeline_name` and `commit_index` together would be
/// two, which Scylla/Cassandra rejects at `CREATE MATERIALIZED VIEW` time.
/// So this view keys on the single denormalized `pipeline_commit_index`
/// column instead, the same way the teacher promotes exactly one non-base-PK
/// column per view.
async fn setup_by_pipeline_and_commit_index_mat_view(
    session: &Session,
    config: &Conf,
) -> Result<(), CoreError> {
    let cmd = format!(
        "CREATE MATERIALIZED VIEW IF NOT EXISTS {ns}.job_infos_by_pipeline_and_commit_index AS \
            SELECT pipeline_commit_index, job_id, pipeline_name, commit_index, inputs, state, started, finished, output \
            FROM {ns}.job_infos \
            WHERE pipeline_commit_index IS NOT NULL AND job_id IS NOT NULL \
            PRIMARY KEY (pipeline_commit_index, job_id)",
        ns = &config.weft.namespace,
    );
    session.query_unpaged(cmd, &()).await?;
    Ok(())
}

/// Insert a new job, failing with a store-level conflict if `job_id` is already taken
async fn insert(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "INSERT INTO {}.job_infos \
            (job_id, pipeline_name, inputs, commit_index, pipeline_commit_index, state, started, finished, output) \
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) IF NOT EXISTS",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// Get a job by its primary key
async fn get(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "SELECT job_id, pipeline_name, inputs, commit_index, state, started, finished, output \
            FROM {}.job_infos WHERE job_id = ?",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// List jobs by pipeline
async fn list_by_pipeline(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "SELECT job_id, pipeline_name, inputs, commit_index, state, started, finished, output \
            FROM {}.job_infos_by_pipeline WHERE pipeline_name = ?",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// List jobs by commit index
async fn list_by_commit_index(
    session: &Session,
    config: &Conf,
) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "SELECT job_id, pipeline_name, inputs, commit_index, state, started, finished, output \
            FROM {}.job_infos_by_commit_index WHERE commit_index = ?",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// List jobs by the denormalized `pipeline_commit_index` key
async fn list_by_pipeline_and_commit_index(
    session: &Session,
    config: &Conf,
) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "SELECT job_id, pipeline_name, inputs, commit_index, state, started, finished, output \
            FROM {}.job_infos_by_pipeline_and_commit_index \
            WHERE pipeline_commit_index = ?",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// A full table scan, for `ListJobInfos` with neither filter set
async fn scan(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "SELECT job_id, pipeline_name, inputs, commit_index, state, started, finished, output \
            FROM {}.job_infos",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// Delete a job by its primary key
async fn delete(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "DELETE FROM {}.job_infos WHERE job_id = ?",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// Delete every job belonging to a pipeline
async fn delete_for_pipeline(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "SELECT job_id FROM {}.job_infos_by_pipeline WHERE pipeline_name = ?",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// Upsert a job's state, and optionally `finished`
async fn set_state(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "UPDATE {}.job_infos SET state = ?, finished = ? WHERE job_id = ?",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// Upsert a job's output
async fn set_output(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "UPDATE {}.job_infos SET output = ? WHERE job_id = ?",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// Conditionally transition a job from `PULLING` to `RUNNING`
async fn start(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "UPDATE {}.job_infos SET state = ? WHERE job_id = ? IF state = ?",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// Count a pipeline's jobs grouped by state
///
/// Scylla has no native `GROUP BY` aggregate across partitions here, so this
/// pulls every (job_id, state) row for the pipeline via the by-pipeline view
/// and the grouping is done in-process; see
/// [`crate::models::backends::pipelines::job_counts`].
async fn counts_for_pipeline(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!(
        "SELECT state FROM {}.job_infos_by_pipeline WHERE pipeline_name = ?",
        &config.weft.namespace
    );
    Ok(session.prepare(stmt).await?)
}

/// Truncate every job row
async fn truncate(session: &Session, config: &Conf) -> Result<PreparedStatement, CoreError> {
    let stmt = format!("TRUNCATE {}.job_infos", &config.weft.namespace);
    Ok(session.prepare(stmt).await?)
}
