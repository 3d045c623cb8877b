//! Creates the three logical collections and their indexes on first use,
//! and gates startup on them being ready.

use crate::models::backends::setup::scylla_setup::{chunks, job_infos, pipeline_infos, setup_keyspace};
use crate::utils::{CoreError, Shared};

/// Create the database (keyspace) if it doesn't already exist, then create
/// the three collections and their indexes
///
/// Every `CREATE ... IF NOT EXISTS` here is idempotent, so this is safe to
/// run on every boot. If the keyspace and tables already exist, this
/// returns successfully without making further changes. This mirrors the
/// table/view setup `Scylla::new` already runs at connect time; calling it
/// again here is what makes `Initialize` an explicit, independently callable
/// operation rather than an implicit side effect of connecting.
///
/// # Arguments
///
/// * `shared` - Shared objects (scylla session + redis pool)
pub async fn initialize(shared: &Shared) -> Result<(), CoreError> {
    let session = &shared.scylla.session;
    let config = &shared.config;
    setup_keyspace(session, config).await?;
    job_infos::JobInfosPreparedStatements::new(session, config).await?;
    pipeline_infos::PipelineInfosPreparedStatements::new(session, config).await?;
    chunks::ChunksPreparedStatements::new(session, config).await?;
    Ok(())
}

/// Wait for all tables and all indexes to become ready, failing if any is missing
///
/// Used as a startup gate by dependent services.
///
/// # Arguments
///
/// * `shared` - Shared objects (scylla session + redis pool)
pub async fn check(shared: &Shared) -> Result<(), CoreError> {
    let ns = &shared.config.weft.namespace;
    let tables = [
        "job_infos",
        "job_infos_by_pipeline",
        "job_infos_by_commit_index",
        "job_infos_by_pipeline_and_commit_index",
        "pipeline_infos",
        "pipeline_infos_by_shard",
        "chunks",
        "chunks_by_job",
    ];
    for table in tables {
        let query = format!("SELECT * FROM {ns}.{table} LIMIT 1");
        shared.scylla.session.query_unpaged(query, &()).await?;
    }
    Ok(())
}
