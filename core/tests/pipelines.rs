//! Tests the pipeline registry: creation, `CreatedAt` preservation across
//! updates, the derived `JobCounts` aggregate, shard-filtered listing,
//! `BlockPipelineState`, and `SubscribePipelineInfos`.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use weft_core::models::backends::{jobs, pipelines};
use weft_core::models::{
    Inputs, JobInfo, JobState, JobStateUpdate, PipelineInfo, PipelineInfoChange, PipelineRef,
    PipelineState, Shard,
};
use weft_core::utils::errors::ErrorKind;

fn new_pipeline(name: &str, shard: i32) -> PipelineInfo {
    PipelineInfo {
        pipeline_name: name.to_owned(),
        shard: Shard { number: shard },
        state: PipelineState::Starting,
        stopped: false,
        created_at: None,
        job_counts: HashMap::new(),
    }
}

fn new_job(job_id: &str, pipeline: &str, state: JobState) -> JobInfo {
    JobInfo {
        job_id: job_id.to_owned(),
        pipeline: PipelineRef { name: Some(pipeline.to_owned()) },
        inputs: Inputs(vec![]),
        commit_index: None,
        state,
        started: None,
        finished: None,
        output: None,
    }
}

#[tokio::test]
async fn create_stamps_created_at_and_rejects_preset() {
    let shared = common::shared().await;
    let name = common::unique("pipeline");
    let created = pipelines::create(new_pipeline(&name, 0), &shared).await.unwrap();
    assert!(created.created_at.is_some());

    let mut preset = new_pipeline(&common::unique("pipeline"), 0);
    preset.created_at = Some(chrono::Utc::now());
    let err = pipelines::create(preset, &shared).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn create_duplicate_name_conflicts() {
    let shared = common::shared().await;
    let name = common::unique("pipeline");
    pipelines::create(new_pipeline(&name, 0), &shared).await.unwrap();
    let err = pipelines::create(new_pipeline(&name, 0), &shared).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
}

#[tokio::test]
async fn update_preserves_created_at_and_rejects_preset() {
    let shared = common::shared().await;
    let name = common::unique("pipeline");
    let created = pipelines::create(new_pipeline(&name, 0), &shared).await.unwrap();
    let t0 = created.created_at;

    let mut update = new_pipeline(&name, 5);
    update.state = PipelineState::Running;
    update.stopped = true;
    let updated = pipelines::update(update, &shared).await.unwrap();
    assert_eq!(updated.created_at, t0);
    assert_eq!(updated.shard.number, 5);
    assert_eq!(updated.state, PipelineState::Running);
    assert!(updated.stopped);

    let mut preset = new_pipeline(&name, 5);
    preset.created_at = Some(chrono::Utc::now());
    let err = pipelines::update(preset, &shared).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn set_state_and_set_stopped_upsert() {
    let shared = common::shared().await;
    let name = common::unique("pipeline");
    pipelines::create(new_pipeline(&name, 0), &shared).await.unwrap();

    let after_state = pipelines::set_state(&name, PipelineState::Failure, &shared).await.unwrap();
    assert_eq!(after_state.state, PipelineState::Failure);

    let after_stopped = pipelines::set_stopped(&name, true, &shared).await.unwrap();
    assert!(after_stopped.stopped);
    // state set above must not have been clobbered by the stopped-only upsert
    assert_eq!(after_stopped.state, PipelineState::Failure);
}

#[tokio::test]
async fn get_attaches_job_counts() {
    let shared = common::shared().await;
    let name = common::unique("pipeline");
    pipelines::create(new_pipeline(&name, 0), &shared).await.unwrap();

    jobs::create(new_job(&common::unique("job"), &name, JobState::Running), &shared)
        .await
        .unwrap();
    jobs::create(new_job(&common::unique("job"), &name, JobState::Running), &shared)
        .await
        .unwrap();
    let done_id = common::unique("job");
    jobs::create(new_job(&done_id, &name, JobState::Creating), &shared).await.unwrap();
    jobs::set_state(JobStateUpdate { job_id: done_id, state: JobState::Success }, &shared)
        .await
        .unwrap();

    let pipeline = pipelines::get(&name, &shared).await.unwrap();
    assert_eq!(pipeline.job_counts.get(&JobState::Running), Some(&2));
    assert_eq!(pipeline.job_counts.get(&JobState::Success), Some(&1));
}

#[tokio::test]
async fn get_missing_pipeline_is_not_found() {
    let shared = common::shared().await;
    let err = pipelines::get(&common::unique("missing-pipeline"), &shared)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn list_filters_by_shard() {
    let shared = common::shared().await;
    let shard = rand_shard();
    let on_shard = common::unique("pipeline");
    let off_shard = common::unique("pipeline");
    pipelines::create(new_pipeline(&on_shard, shard), &shared).await.unwrap();
    pipelines::create(new_pipeline(&off_shard, shard + 1), &shared).await.unwrap();

    let listed = pipelines::list(Some(shard), &shared).await.unwrap();
    assert!(listed.iter().any(|p| p.pipeline_name == on_shard));
    assert!(!listed.iter().any(|p| p.pipeline_name == off_shard));
}

#[tokio::test]
async fn delete_is_a_no_op_on_a_miss() {
    let shared = common::shared().await;
    pipelines::delete(&common::unique("never-existed"), &shared).await.unwrap();
}

#[tokio::test]
async fn block_state_missing_pipeline_fails_fast() {
    let shared = common::shared().await;
    let cancel = CancellationToken::new();
    let result = tokio::time::timeout(
        Duration::from_secs(2),
        pipelines::block_state(&common::unique("missing-pipeline"), PipelineState::Running, &cancel, &shared),
    )
    .await
    .expect("blocking on a missing pipeline must not hang");
    assert_eq!(result.unwrap_err().kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn block_state_unblocks_on_concurrent_update() {
    let shared = common::shared().await;
    let name = common::unique("pipeline");
    pipelines::create(new_pipeline(&name, 0), &shared).await.unwrap();

    let waiter_shared = shared.clone();
    let waiter_name = name.clone();
    let waiter = tokio::spawn(async move {
        let cancel = CancellationToken::new();
        pipelines::block_state(&waiter_name, PipelineState::Running, &cancel, &waiter_shared).await
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    pipelines::set_state(&name, PipelineState::Running, &shared).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("block_state should unblock once the pipeline reaches RUNNING")
        .unwrap()
        .unwrap();
    assert_eq!(result.state, PipelineState::Running);
}

#[tokio::test]
async fn subscribe_emits_create_update_delete_and_respects_shard_filter() {
    let shared = common::shared().await;
    let shard = rand_shard();
    let name = common::unique("pipeline");
    let created = pipelines::create(new_pipeline(&name, shard), &shared).await.unwrap();

    let other_shard_name = common::unique("pipeline");
    pipelines::create(new_pipeline(&other_shard_name, shard + 1), &shared).await.unwrap();

    let (mut subscription, initial) = pipelines::PipelineSubscription::open(Some(shard), true, &shared)
        .await
        .unwrap();
    assert!(initial.iter().any(
        |change| matches!(change, PipelineInfoChange::Create(p) if p.pipeline_name == name)
    ));
    assert!(!initial.iter().any(
        |change| matches!(change, PipelineInfoChange::Create(p) if p.pipeline_name == other_shard_name)
    ));

    let cancel = CancellationToken::new();

    // a pure state transition must not surface as an UPDATE
    pipelines::set_state(&name, PipelineState::Running, &shared).await.unwrap();

    // a non-state field change must surface as an UPDATE
    let mut update = new_pipeline(&name, shard);
    update.stopped = true;
    pipelines::update(update, &shared).await.unwrap();
    let next = tokio::time::timeout(Duration::from_secs(5), subscription.next(&cancel, &shared))
        .await
        .expect("subscription should deliver the stopped update")
        .unwrap();
    match next {
        PipelineInfoChange::Update { old, new } => {
            assert_eq!(old.pipeline_name, name);
            assert!(!old.stopped);
            assert!(new.stopped);
        }
        other => panic!("expected an Update event, got {other:?}"),
    }

    pipelines::delete(&name, &shared).await.unwrap();
    let next = tokio::time::timeout(Duration::from_secs(5), subscription.next(&cancel, &shared))
        .await
        .expect("subscription should deliver the delete")
        .unwrap();
    match next {
        PipelineInfoChange::Delete(deleted) => assert_eq!(deleted.pipeline_name, name),
        other => panic!("expected a Delete event, got {other:?}"),
    }

    let _ = created;
}

// DeleteAll truncates every row in job_infos/pipeline_infos, so it's tagged
// serial to keep it from racing the other, row-scoped tests in this file.
#[serial_test::serial]
#[tokio::test]
async fn delete_all_wipes_jobs_and_pipelines_only() {
    let shared = common::shared().await;
    let name = common::unique("pipeline");
    pipelines::create(new_pipeline(&name, 0), &shared).await.unwrap();
    let job_id = common::unique("job");
    jobs::create(new_job(&job_id, &name, JobState::Running), &shared).await.unwrap();

    pipelines::delete_all(&shared).await.unwrap();

    let cancel = CancellationToken::new();
    assert_eq!(
        pipelines::get(&name, &shared).await.unwrap_err().kind,
        ErrorKind::NotFound
    );
    assert_eq!(
        jobs::inspect(&job_id, false, &cancel, &shared).await.unwrap_err().kind,
        ErrorKind::NotFound
    );
}

/// A shard number unlikely to collide with another concurrently running test
fn rand_shard() -> i32 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    uuid::Uuid::new_v4().hash(&mut hasher);
    (hasher.finish() % 1_000_000) as i32
}
