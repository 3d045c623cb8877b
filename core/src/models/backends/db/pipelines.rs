//! The raw scylla query layer for `PipelineInfo`s

use chrono::prelude::*;
use std::collections::HashMap;

use super::helpers::lwt_applied;
use crate::models::backends::db::jobs::counts_for_pipeline;
use crate::models::{JobState, PipelineInfo, PipelineState, Shard};
use crate::utils::{CoreError, Shared};

/// One `pipeline_infos` row, in column order
type PipelineRow = (String, i32, PipelineState, bool, Option<DateTime<Utc>>);

/// Cast a raw row into a [`PipelineInfo`]
///
/// `job_counts` is never stored; callers that need it fetch it separately
/// with [`job_counts`] and attach it themselves.
fn row_to_pipeline_info(row: PipelineRow) -> PipelineInfo {
    let (pipeline_name, shard, state, stopped, created_at) = row;
    PipelineInfo {
        pipeline_name,
        shard: Shard { number: shard },
        state,
        stopped,
        created_at,
        job_counts: HashMap::new(),
    }
}

/// Insert a brand new pipeline
///
/// Returns `true` if the insert applied, `false` if `pipeline_name` was already taken.
pub async fn insert(pipeline: &PipelineInfo, shared: &Shared) -> Result<bool, CoreError> {
    let values = (
        &pipeline.pipeline_name,
        pipeline.shard.number,
        pipeline.state,
        pipeline.stopped,
        pipeline.created_at,
    );
    let result = shared
        .scylla
        .session
        .execute_unpaged(&shared.scylla.prep.pipeline_infos.insert, values)
        .await?;
    lwt_applied(result)
}

/// Get a pipeline by its primary key
pub async fn get(pipeline_name: &str, shared: &Shared) -> Result<Option<PipelineInfo>, CoreError> {
    let result = shared
        .scylla
        .session
        .execute_unpaged(&shared.scylla.prep.pipeline_infos.get, (pipeline_name,))
        .await?;
    let row = result
        .into_rows_result()?
        .maybe_first_row::<PipelineRow>()?;
    Ok(row.map(row_to_pipeline_info))
}

/// Upsert a pipeline's `shard`/`state`/`stopped`, leaving `created_at` untouched
pub async fn upsert(pipeline: &PipelineInfo, shared: &Shared) -> Result<(), CoreError> {
    shared
        .scylla
        .session
        .execute_unpaged(
            &shared.scylla.prep.pipeline_infos.upsert,
            (
                pipeline.shard.number,
                pipeline.state,
                pipeline.stopped,
                &pipeline.pipeline_name,
            ),
        )
        .await?;
    Ok(())
}

/// Upsert a pipeline's state
pub async fn set_state(
    pipeline_name: &str,
    state: PipelineState,
    shared: &Shared,
) -> Result<(), CoreError> {
    shared
        .scylla
        .session
        .execute_unpaged(
            &shared.scylla.prep.pipeline_infos.set_state,
            (state, pipeline_name),
        )
        .await?;
    Ok(())
}

/// Upsert a pipeline's stopped flag
pub async fn set_stopped(
    pipeline_name: &str,
    stopped: bool,
    shared: &Shared,
) -> Result<(), CoreError> {
    shared
        .scylla
        .session
        .execute_unpaged(
            &shared.scylla.prep.pipeline_infos.set_stopped,
            (stopped, pipeline_name),
        )
        .await?;
    Ok(())
}

/// List every pipeline
pub async fn scan(shared: &Shared) -> Result<Vec<PipelineInfo>, CoreError> {
    let result = shared
        .scylla
        .session
        .execute_unpaged(&shared.scylla.prep.pipeline_infos.scan, ())
        .await?;
    let rows = result.into_rows_result()?.rows::<PipelineRow>()?;
    Ok(rows
        .filter_map(|row| crate::log_scylla_err!(row))
        .map(row_to_pipeline_info)
        .collect())
}

/// List pipelines by shard
pub async fn list_by_shard(shard: i32, shared: &Shared) -> Result<Vec<PipelineInfo>, CoreError> {
    let result = shared
        .scylla
        .session
        .execute_unpaged(&shared.scylla.prep.pipeline_infos.list_by_shard, (shard,))
        .await?;
    let rows = result.into_rows_result()?.rows::<PipelineRow>()?;
    Ok(rows
        .filter_map(|row| crate::log_scylla_err!(row))
        .map(row_to_pipeline_info)
        .collect())
}

/// Delete a pipeline by its primary key
///
/// Does not touch the pipeline's jobs or chunks; callers that want those gone
/// too call `delete_for_pipeline` on the job registry first.
pub async fn delete(pipeline_name: &str, shared: &Shared) -> Result<(), CoreError> {
    shared
        .scylla
        .session
        .execute_unpaged(&shared.scylla.prep.pipeline_infos.delete, (pipeline_name,))
        .await?;
    Ok(())
}

/// Truncate every pipeline row
pub async fn truncate(shared: &Shared) -> Result<(), CoreError> {
    shared
        .scylla
        .session
        .execute_unpaged(&shared.scylla.prep.pipeline_infos.truncate, ())
        .await?;
    Ok(())
}

/// Derive a pipeline's per-state job counts
///
/// Thin re-export of the job registry's aggregation so callers that only
/// import the pipeline db layer don't need to reach across modules.
pub async fn job_counts(
    pipeline_name: &str,
    shared: &Shared,
) -> Result<HashMap<JobState, u64>, CoreError> {
    counts_for_pipeline(pipeline_name, shared).await
}
