//! The raw scylla query layer for `JobInfo`s

use chrono::prelude::*;
use std::collections::HashMap;

use super::helpers::lwt_applied;
use crate::models::{Inputs, JobInfo, JobOutputCommit, JobState, PipelineRef};
use crate::utils::{CoreError, Shared};

/// One `job_infos` row, in column order
type JobRow = (
    String,
    Option<String>,
    Inputs,
    Option<String>,
    JobState,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    Option<JobOutputCommit>,
);

/// Cast a raw row into a [`JobInfo`]
fn row_to_job_info(row: JobRow) -> JobInfo {
    let (job_id, pipeline_name, inputs, commit_index, state, started, finished, output) = row;
    JobInfo {
        job_id,
        pipeline: PipelineRef {
            name: pipeline_name,
        },
        inputs,
        commit_index,
        state,
        started,
        finished,
        output,
    }
}

/// Derive the denormalized key the `job_infos_by_pipeline_and_commit_index`
/// materialized view is partitioned on
///
/// A materialized view may only promote one column that isn't already part
/// of the base table's primary key, so `pipeline_name` and `commit_index`
/// can't both be view-key columns directly; this collapses them into a
/// single `pipeline_name\0commit_index` column instead, written alongside
/// the base row on [`insert`] and never shown back to callers.
fn pipeline_commit_key(pipeline: &str, commit_index: &str) -> String {
    format!("{pipeline}\0{commit_index}")
}

/// Insert a brand new job
///
/// # Arguments
///
/// * `job` - The job to insert
/// * `shared` - Shared objects (scylla session + redis pool)
///
/// Returns `true` if the insert applied, `false` if `job_id` was already taken.
pub async fn insert(job: &JobInfo, shared: &Shared) -> Result<bool, CoreError> {
    let pipeline_commit_index = match (&job.pipeline.name, &job.commit_index) {
        (Some(pipeline), Some(commit_index)) => Some(pipeline_commit_key(pipeline, commit_index)),
        _ => None,
    };
    let values = (
        &job.job_id,
        job.pipeline.name.as_ref(),
        &job.inputs,
        job.commit_index.as_ref(),
        pipeline_commit_index,
        job.state,
        job.started,
        job.finished,
        job.output.as_ref(),
    );
    let result = shared
        .scylla
        .session
        .execute_unpaged(&shared.scylla.prep.job_infos.insert, values)
        .await?;
    lwt_applied(result)
}

/// Get a job by its primary key
///
/// # Arguments
///
/// * `job_id` - The job to get
/// * `shared` - Shared objects (scylla session + redis pool)
pub async fn get(job_id: &str, shared: &Shared) -> Result<Option<JobInfo>, CoreError> {
    let result = shared
        .scylla
        .session
        .execute_unpaged(&shared.scylla.prep.job_infos.get, (job_id,))
        .await?;
    let row = result.into_rows_result()?.maybe_first_row::<JobRow>()?;
    Ok(row.map(row_to_job_info))
}

/// List jobs by owning pipeline
pub async fn list_by_pipeline(pipeline: &str, shared: &Shared) -> Result<Vec<JobInfo>, CoreError> {
    let result = shared
        .scylla
        .session
        .execute_unpaged(&shared.scylla.prep.job_infos.list_by_pipeline, (pipeline,))
        .await?;
    let rows = result.into_rows_result()?.rows::<JobRow>()?;
    Ok(rows
        .filter_map(|row| crate::log_scylla_err!(row))
        .map(row_to_job_info)
        .collect())
}

/// List jobs by commit index
pub async fn list_by_commit_index(
    commit_index: &str,
    shared: &Shared,
) -> Result<Vec<JobInfo>, CoreError> {
    let result = shared
        .scylla
        .session
        .execute_unpaged(
            &shared.scylla.prep.job_infos.list_by_commit_index,
            (commit_index,),
        )
        .await?;
    let rows = result.into_rows_result()?.rows::<JobRow>()?;
    Ok(rows
        .filter_map(|row| crate::log_scylla_err!(row))
        .map(row_to_job_info)
        .collect())
}

/// List jobs by pipeline and commit index (the most selective index)
pub async fn list_by_pipeline_and_commit_index(
    pipeline: &str,
    commit_index: &str,
    shared: &Shared,
) -> Result<Vec<JobInfo>, CoreError> {
    let result = shared
        .scylla
        .session
        .execute_unpaged(
            &shared.scylla.prep.job_infos.list_by_pipeline_and_commit_index,
            (pipeline_commit_key(pipeline, commit_index),),
        )
        .await?;
    let rows = result.into_rows_result()?.rows::<JobRow>()?;
    Ok(rows
        .filter_map(|row| crate::log_scylla_err!(row))
        .map(row_to_job_info)
        .collect())
}

/// Full table scan, used when `ListJobInfos` has neither filter set
pub async fn scan(shared: &Shared) -> Result<Vec<JobInfo>, CoreError> {
    let result = shared
        .scylla
        .session
        .execute_unpaged(&shared.scylla.prep.job_infos.scan, ())
        .await?;
    let rows = result.into_rows_result()?.rows::<JobRow>()?;
    Ok(rows
        .filter_map(|row| crate::log_scylla_err!(row))
        .map(row_to_job_info)
        .collect())
}

/// Delete a job by its primary key
pub async fn delete(job_id: &str, shared: &Shared) -> Result<(), CoreError> {
    shared
        .scylla
        .session
        .execute_unpaged(&shared.scylla.prep.job_infos.delete, (job_id,))
        .await?;
    Ok(())
}

/// Delete every job belonging to a pipeline
///
/// Scylla has no `DELETE ... WHERE pipeline_name = ?` on the base table
/// (pipeline_name isn't the partition key there), so this reads the job ids
/// out of the by-pipeline view first and deletes each by primary key.
pub async fn delete_for_pipeline(pipeline: &str, shared: &Shared) -> Result<(), CoreError> {
    let result = shared
        .scylla
        .session
        .execute_unpaged(&shared.scylla.prep.job_infos.delete_for_pipeline, (pipeline,))
        .await?;
    let rows = result.into_rows_result()?.rows::<(String,)>()?;
    for row in rows {
        let (job_id,) = row?;
        delete(&job_id, shared).await?;
    }
    Ok(())
}

/// Upsert a job's state, stamping `finished` if the new state is terminal
pub async fn set_state(
    job_id: &str,
    state: JobState,
    finished: Option<DateTime<Utc>>,
    shared: &Shared,
) -> Result<(), CoreError> {
    shared
        .scylla
        .session
        .execute_unpaged(
            &shared.scylla.prep.job_infos.set_state,
            (state, finished, job_id),
        )
        .await?;
    Ok(())
}

/// Upsert a job's output
pub async fn set_output(
    job_id: &str,
    output: &JobOutputCommit,
    shared: &Shared,
) -> Result<(), CoreError> {
    shared
        .scylla
        .session
        .execute_unpaged(&shared.scylla.prep.job_infos.set_output, (output, job_id))
        .await?;
    Ok(())
}

/// Conditionally transition a job from `PULLING` to `RUNNING`
///
/// Returns `true` if the transition applied.
pub async fn start(job_id: &str, shared: &Shared) -> Result<bool, CoreError> {
    let result = shared
        .scylla
        .session
        .execute_unpaged(
            &shared.scylla.prep.job_infos.start,
            (JobState::Running, job_id, JobState::Pulling),
        )
        .await?;
    lwt_applied(result)
}

/// Truncate every job row
pub async fn truncate(shared: &Shared) -> Result<(), CoreError> {
    shared
        .scylla
        .session
        .execute_unpaged(&shared.scylla.prep.job_infos.truncate, ())
        .await?;
    Ok(())
}

/// Count a pipeline's jobs grouped by state
pub async fn counts_for_pipeline(
    pipeline: &str,
    shared: &Shared,
) -> Result<HashMap<JobState, u64>, CoreError> {
    let result = shared
        .scylla
        .session
        .execute_unpaged(&shared.scylla.prep.job_infos.counts_for_pipeline, (pipeline,))
        .await?;
    let rows = result.into_rows_result()?.rows::<(JobState,)>()?;
    let mut counts = HashMap::new();
    for row in rows {
        let (state,) = match crate::log_scylla_err!(row) {
            Some(row) => row,
            None => continue,
        };
        *counts.entry(state).or_insert(0u64) += 1;
    }
    Ok(counts)
}
