//! Job registry: descriptors, the commit-index fingerprint, and blocking waits

use chrono::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::models::backends::db::jobs as db;
use crate::models::backends::streams::{publish, ChangeFeed};
use crate::models::{Inputs, JobInfo, JobListOpts, JobOutputUpdate, JobState, JobStateUpdate};
use crate::utils::{CoreError, Shared};
use crate::{bad, conflict, not_found};

/// The change-feed collection name jobs publish to
const COLLECTION: &str = "job_infos";

/// Derive a job's `CommitIndex`: the sorted, separator-free concatenation of
/// `"Repo.Name/ID"` across every input commit
///
/// The empty input list yields the empty string. Fails if any commit has an
/// empty `ID`.
pub fn commit_index(inputs: &Inputs) -> Result<String, CoreError> {
    let mut fingerprints = Vec::with_capacity(inputs.0.len());
    for input in &inputs.0 {
        if input.commit.id.is_empty() {
            return bad!(format!(
                "Commit id for {}/{} is empty",
                input.commit.repo.name, input.commit.id
            ));
        }
        fingerprints.push(format!("{}/{}", input.commit.repo.name, input.commit.id));
    }
    fingerprints.sort_unstable();
    Ok(fingerprints.concat())
}

/// Create a new job
///
/// Rejects if `job_id` is empty or `started`/`commit_index` are already set.
/// Stamps `started = now()`, derives `commit_index` from `inputs`, then
/// inserts, failing with a conflict on a duplicate `job_id`.
#[instrument(skip_all, err(Debug))]
pub async fn create(mut job: JobInfo, shared: &Shared) -> Result<JobInfo, CoreError> {
    if job.job_id.is_empty() {
        return bad!("job_id must not be empty".to_owned());
    }
    if job.started.is_some() {
        return bad!("started is server-assigned and must not be set by the caller".to_owned());
    }
    if job.commit_index.is_some() {
        return bad!("commit_index is derived and must not be set by the caller".to_owned());
    }
    job.started = Some(Utc::now());
    job.commit_index = Some(commit_index(&job.inputs)?);
    job.finished = None;
    if !db::insert(&job, shared).await? {
        return conflict!(format!("Job {} already exists", job.job_id));
    }
    publish(shared, COLLECTION, None, Some(&job)).await?;
    Ok(job)
}

/// Look up a job by id, optionally blocking until it reaches a terminal state
///
/// With `block = false`, returns the current record or fails with `NotFound`.
/// With `block = true`, fails immediately with `NotFound` if the job doesn't
/// exist yet (never hangs waiting for a job that was never created), returns
/// immediately if it's already in `EMPTY`/`SUCCESS`/`FAILURE`, and otherwise
/// waits on the job's change-feed for the first update landing in one of
/// those states. Honors `cancel`.
#[instrument(skip_all, err(Debug))]
pub async fn inspect(
    job_id: &str,
    block: bool,
    cancel: &CancellationToken,
    shared: &Shared,
) -> Result<JobInfo, CoreError> {
    // Open the cursor before taking the snapshot: if it opened after, a
    // terminal transition published in between would be missed by both the
    // snapshot (still reads non-terminal) and the feed (cursor starts past it).
    let mut feed = ChangeFeed::open(shared, COLLECTION).await?;
    let current = match db::get(job_id, shared).await? {
        Some(job) => job,
        None => return not_found!(format!("Job {job_id} not found")),
    };
    if !block || current.state.is_blockable_terminal() {
        return Ok(current);
    }
    let job_id = job_id.to_owned();
    feed.wait_for(shared, cancel, move |job: &JobInfo| {
        job.job_id == job_id && job.state.is_blockable_terminal()
    })
    .await
}

/// List jobs, choosing the most selective index available
///
/// Both a pipeline and an input commit set selects the compound
/// `(pipeline, commit_index)` view; either alone selects its own view;
/// neither falls back to a full table scan.
#[instrument(skip_all, err(Debug))]
pub async fn list(opts: &JobListOpts, shared: &Shared) -> Result<Vec<JobInfo>, CoreError> {
    match (&opts.pipeline, &opts.inputs) {
        (Some(pipeline), Some(inputs)) => {
            let index = commit_index(inputs)?;
            db::list_by_pipeline_and_commit_index(pipeline, &index, shared).await
        }
        (Some(pipeline), None) => db::list_by_pipeline(pipeline, shared).await,
        (None, Some(inputs)) => {
            let index = commit_index(inputs)?;
            db::list_by_commit_index(&index, shared).await
        }
        (None, None) => db::scan(shared).await,
    }
}

/// Delete a single job by id
///
/// Succeeds even if `job_id` matches nothing.
#[instrument(skip_all, err(Debug))]
pub async fn delete(job_id: &str, shared: &Shared) -> Result<(), CoreError> {
    let before = db::get(job_id, shared).await?;
    db::delete(job_id, shared).await?;
    if let Some(before) = before {
        publish::<JobInfo>(shared, COLLECTION, Some(&before), None).await?;
    }
    Ok(())
}

/// Delete every job belonging to a pipeline
///
/// Succeeds even if the pipeline has no jobs.
#[instrument(skip_all, err(Debug))]
pub async fn delete_for_pipeline(pipeline: &str, shared: &Shared) -> Result<(), CoreError> {
    db::delete_for_pipeline(pipeline, shared).await
}

/// Upsert a job's state
///
/// Stamps `finished = now()` when the new state is `SUCCESS`/`FAILURE`;
/// leaves it unset otherwise. Fails with `NotFound` if the job doesn't exist.
#[instrument(skip_all, err(Debug))]
pub async fn set_state(update: JobStateUpdate, shared: &Shared) -> Result<JobInfo, CoreError> {
    let before = match db::get(&update.job_id, shared).await? {
        Some(job) => job,
        None => return not_found!(format!("Job {} not found", update.job_id)),
    };
    let finished = if matches!(update.state, JobState::Success | JobState::Failure) {
        Some(Utc::now())
    } else {
        None
    };
    db::set_state(&update.job_id, update.state, finished, shared).await?;
    let mut after = before.clone();
    after.state = update.state;
    after.finished = finished;
    publish(shared, COLLECTION, Some(&before), Some(&after)).await?;
    Ok(after)
}

/// Upsert a job's output commit, leaving every other field untouched
///
/// Fails with `NotFound` if the job doesn't exist.
#[instrument(skip_all, err(Debug))]
pub async fn set_output(update: JobOutputUpdate, shared: &Shared) -> Result<JobInfo, CoreError> {
    let before = match db::get(&update.job_id, shared).await? {
        Some(job) => job,
        None => return not_found!(format!("Job {} not found", update.job_id)),
    };
    db::set_output(&update.job_id, &update.output, shared).await?;
    let mut after = before.clone();
    after.output = Some(update.output);
    publish(shared, COLLECTION, Some(&before), Some(&after)).await?;
    Ok(after)
}

/// Atomically transition a job from `PULLING` to `RUNNING`
///
/// Leaves the job untouched if it isn't currently `PULLING`. Returns the
/// post-attempt record either way; callers distinguish success by inspecting
/// `state`. Fails with `NotFound` if the job doesn't exist.
#[instrument(skip_all, err(Debug))]
pub async fn start(job_id: &str, shared: &Shared) -> Result<JobInfo, CoreError> {
    let before = match db::get(job_id, shared).await? {
        Some(job) => job,
        None => return not_found!(format!("Job {job_id} not found")),
    };
    let applied = db::start(job_id, shared).await?;
    if !applied {
        return Ok(before);
    }
    let mut after = before.clone();
    after.state = JobState::Running;
    publish(shared, COLLECTION, Some(&before), Some(&after)).await?;
    Ok(after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Commit, Input, Repo};

    fn input(repo: &str, id: &str) -> Input {
        Input {
            commit: Commit {
                repo: Repo {
                    name: repo.to_owned(),
                },
                id: id.to_owned(),
            },
        }
    }

    #[test]
    fn empty_inputs_yield_empty_index() {
        assert_eq!(commit_index(&Inputs(vec![])).unwrap(), "");
    }

    #[test]
    fn index_is_order_insensitive() {
        let forward = Inputs(vec![input("r1", "c1"), input("r2", "c2")]);
        let backward = Inputs(vec![input("r2", "c2"), input("r1", "c1")]);
        assert_eq!(commit_index(&forward).unwrap(), commit_index(&backward).unwrap());
        assert_eq!(commit_index(&forward).unwrap(), "r1/c1r2/c2");
    }

    #[test]
    fn empty_commit_id_fails() {
        let inputs = Inputs(vec![input("r1", "")]);
        assert!(commit_index(&inputs).is_err());
    }
}
