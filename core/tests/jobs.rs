//! Tests the job registry: creation, the `CommitIndex` fingerprint,
//! point/filtered lookups, blocking waits, and state/output updates.

mod common;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use weft_core::models::backends::jobs;
use weft_core::models::{
    Commit, Input, Inputs, JobInfo, JobListOpts, JobOutputCommit, JobOutputUpdate, JobState,
    JobStateUpdate, PipelineRef, Repo,
};
use weft_core::utils::errors::ErrorKind;

fn input(repo: &str, id: &str) -> Input {
    Input {
        commit: Commit {
            repo: Repo { name: repo.to_owned() },
            id: id.to_owned(),
        },
    }
}

fn new_job(job_id: &str, pipeline: Option<&str>, inputs: Vec<Input>) -> JobInfo {
    JobInfo {
        job_id: job_id.to_owned(),
        pipeline: PipelineRef { name: pipeline.map(str::to_owned) },
        inputs: Inputs(inputs),
        commit_index: None,
        state: JobState::Creating,
        started: None,
        finished: None,
        output: None,
    }
}

#[tokio::test]
async fn create_stamps_started_and_commit_index() {
    let shared = common::shared().await;
    let job_id = common::unique("job");
    let job = new_job(&job_id, None, vec![input("r1", "c1"), input("r2", "c2")]);
    let created = jobs::create(job, &shared).await.expect("create should succeed");
    assert!(created.started.is_some());
    assert_eq!(created.commit_index.as_deref(), Some("r1/c1r2/c2"));
    assert!(created.finished.is_none());
}

#[tokio::test]
async fn commit_index_is_order_insensitive_end_to_end() {
    let shared = common::shared().await;
    let forward_id = common::unique("job");
    let backward_id = common::unique("job");
    let forward = jobs::create(
        new_job(&forward_id, None, vec![input("r1", "c1"), input("r2", "c2")]),
        &shared,
    )
    .await
    .unwrap();
    let backward = jobs::create(
        new_job(&backward_id, None, vec![input("r2", "c2"), input("r1", "c1")]),
        &shared,
    )
    .await
    .unwrap();
    assert_eq!(forward.commit_index, backward.commit_index);
}

#[tokio::test]
async fn create_rejects_empty_job_id() {
    let shared = common::shared().await;
    let err = jobs::create(new_job("", None, vec![]), &shared).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn create_rejects_preset_server_fields() {
    let shared = common::shared().await;
    let mut job = new_job(&common::unique("job"), None, vec![]);
    job.started = Some(chrono::Utc::now());
    let err = jobs::create(job, &shared).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);

    let mut job = new_job(&common::unique("job"), None, vec![]);
    job.commit_index = Some("preset".to_owned());
    let err = jobs::create(job, &shared).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn create_rejects_empty_commit_id() {
    let shared = common::shared().await;
    let job = new_job(&common::unique("job"), None, vec![input("r1", "")]);
    let err = jobs::create(job, &shared).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn create_duplicate_job_id_conflicts() {
    let shared = common::shared().await;
    let job_id = common::unique("job");
    jobs::create(new_job(&job_id, None, vec![]), &shared).await.unwrap();
    let err = jobs::create(new_job(&job_id, None, vec![]), &shared)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
}

#[tokio::test]
async fn inspect_round_trips_the_create_response() {
    let shared = common::shared().await;
    let job_id = common::unique("job");
    let created = jobs::create(new_job(&job_id, None, vec![]), &shared).await.unwrap();
    let cancel = CancellationToken::new();
    let fetched = jobs::inspect(&job_id, false, &cancel, &shared).await.unwrap();
    assert_eq!(created, fetched);
}

#[tokio::test]
async fn inspect_nonblocking_missing_job_is_not_found() {
    let shared = common::shared().await;
    let cancel = CancellationToken::new();
    let err = jobs::inspect(&common::unique("missing-job"), false, &cancel, &shared)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn inspect_blocking_missing_job_fails_fast() {
    let shared = common::shared().await;
    let cancel = CancellationToken::new();
    let result = tokio::time::timeout(
        Duration::from_secs(2),
        jobs::inspect(&common::unique("missing-job"), true, &cancel, &shared),
    )
    .await
    .expect("blocking inspect on a missing job must not hang");
    assert_eq!(result.unwrap_err().kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn inspect_blocking_unblocks_on_terminal_state() {
    let shared = common::shared().await;
    let job_id = common::unique("job");
    let mut job = new_job(&job_id, None, vec![]);
    job.state = JobState::Running;
    jobs::create(job, &shared).await.unwrap();

    let waiter_shared = shared.clone();
    let waiter_job_id = job_id.clone();
    let waiter = tokio::spawn(async move {
        let cancel = CancellationToken::new();
        jobs::inspect(&waiter_job_id, true, &cancel, &waiter_shared).await
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    jobs::set_state(
        JobStateUpdate { job_id: job_id.clone(), state: JobState::Success },
        &shared,
    )
    .await
    .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("inspect should unblock once the job reaches SUCCESS")
        .unwrap()
        .unwrap();
    assert_eq!(result.state, JobState::Success);
    assert!(result.finished.is_some());
}

#[tokio::test]
async fn inspect_blocking_honors_cancellation() {
    let shared = common::shared().await;
    let job_id = common::unique("job");
    let mut job = new_job(&job_id, None, vec![]);
    job.state = JobState::Running;
    jobs::create(job, &shared).await.unwrap();

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel_clone.cancel();
    });
    let err = jobs::inspect(&job_id, true, &cancel, &shared).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Canceled);
}

#[tokio::test]
async fn list_selects_the_most_selective_index() {
    let shared = common::shared().await;
    let pipeline = common::unique("pipeline");
    let inputs = vec![input("r1", "c1")];

    let matching_id = common::unique("job");
    jobs::create(
        new_job(&matching_id, Some(&pipeline), inputs.clone()),
        &shared,
    )
    .await
    .unwrap();
    let other_pipeline_id = common::unique("job");
    jobs::create(
        new_job(&other_pipeline_id, Some(&common::unique("other-pipeline")), inputs.clone()),
        &shared,
    )
    .await
    .unwrap();
    let other_inputs_id = common::unique("job");
    jobs::create(
        new_job(&other_inputs_id, Some(&pipeline), vec![input("r9", "c9")]),
        &shared,
    )
    .await
    .unwrap();

    // pipeline + inputs: only the matching job
    let by_both = jobs::list(
        &JobListOpts { pipeline: Some(pipeline.clone()), inputs: Some(Inputs(inputs.clone())) },
        &shared,
    )
    .await
    .unwrap();
    assert!(by_both.iter().any(|j| j.job_id == matching_id));
    assert!(!by_both.iter().any(|j| j.job_id == other_pipeline_id));
    assert!(!by_both.iter().any(|j| j.job_id == other_inputs_id));

    // pipeline only: matching job and other-inputs job, not other-pipeline job
    let by_pipeline = jobs::list(
        &JobListOpts { pipeline: Some(pipeline.clone()), inputs: None },
        &shared,
    )
    .await
    .unwrap();
    assert!(by_pipeline.iter().any(|j| j.job_id == matching_id));
    assert!(by_pipeline.iter().any(|j| j.job_id == other_inputs_id));
    assert!(!by_pipeline.iter().any(|j| j.job_id == other_pipeline_id));

    // inputs only
    let by_inputs = jobs::list(&JobListOpts { pipeline: None, inputs: Some(Inputs(inputs)) }, &shared)
        .await
        .unwrap();
    assert!(by_inputs.iter().any(|j| j.job_id == matching_id));
    assert!(by_inputs.iter().any(|j| j.job_id == other_pipeline_id));
    assert!(!by_inputs.iter().any(|j| j.job_id == other_inputs_id));

    // neither: full scan, everything is present
    let scanned = jobs::list(&JobListOpts::default(), &shared).await.unwrap();
    assert!(scanned.iter().any(|j| j.job_id == matching_id));
    assert!(scanned.iter().any(|j| j.job_id == other_pipeline_id));
    assert!(scanned.iter().any(|j| j.job_id == other_inputs_id));
}

#[tokio::test]
async fn delete_job_info_is_a_no_op_on_a_miss() {
    let shared = common::shared().await;
    jobs::delete(&common::unique("never-existed"), &shared).await.unwrap();
}

#[tokio::test]
async fn delete_for_pipeline_removes_every_job() {
    let shared = common::shared().await;
    let pipeline = common::unique("pipeline");
    let first = common::unique("job");
    let second = common::unique("job");
    jobs::create(new_job(&first, Some(&pipeline), vec![]), &shared).await.unwrap();
    jobs::create(new_job(&second, Some(&pipeline), vec![]), &shared).await.unwrap();

    jobs::delete_for_pipeline(&pipeline, &shared).await.unwrap();

    let cancel = CancellationToken::new();
    assert_eq!(
        jobs::inspect(&first, false, &cancel, &shared).await.unwrap_err().kind,
        ErrorKind::NotFound
    );
    assert_eq!(
        jobs::inspect(&second, false, &cancel, &shared).await.unwrap_err().kind,
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn set_state_stamps_finished_only_on_terminal_states() {
    let shared = common::shared().await;
    let job_id = common::unique("job");
    jobs::create(new_job(&job_id, None, vec![]), &shared).await.unwrap();

    let running = jobs::set_state(
        JobStateUpdate { job_id: job_id.clone(), state: JobState::Running },
        &shared,
    )
    .await
    .unwrap();
    assert!(running.finished.is_none());

    let failed = jobs::set_state(
        JobStateUpdate { job_id: job_id.clone(), state: JobState::Failure },
        &shared,
    )
    .await
    .unwrap();
    assert!(failed.finished.is_some());
}

#[tokio::test]
async fn set_output_leaves_other_fields_untouched() {
    let shared = common::shared().await;
    let job_id = common::unique("job");
    let created = jobs::create(new_job(&job_id, None, vec![input("r1", "c1")]), &shared)
        .await
        .unwrap();

    let output = JobOutputCommit {
        commit: Commit { repo: Repo { name: "out-repo".to_owned() }, id: "out-id".to_owned() },
    };
    let updated = jobs::set_output(
        JobOutputUpdate { job_id: job_id.clone(), output: output.clone() },
        &shared,
    )
    .await
    .unwrap();
    assert_eq!(updated.output, Some(output));
    assert_eq!(updated.commit_index, created.commit_index);
    assert_eq!(updated.started, created.started);
}

#[tokio::test]
async fn start_transitions_pulling_to_running_and_is_a_no_op_otherwise() {
    let shared = common::shared().await;
    let job_id = common::unique("job");
    let mut job = new_job(&job_id, None, vec![]);
    job.state = JobState::Pulling;
    jobs::create(job, &shared).await.unwrap();

    let started = jobs::start(&job_id, &shared).await.unwrap();
    assert_eq!(started.state, JobState::Running);

    // calling start again is a no-op since the job is no longer PULLING
    let unchanged = jobs::start(&job_id, &shared).await.unwrap();
    assert_eq!(unchanged.state, JobState::Running);
}
