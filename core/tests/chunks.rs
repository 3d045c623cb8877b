//! Tests the chunk coordinator: `AddChunk`, the `ClaimChunk`/`FinishChunk`/
//! `RevokeChunk` state machine, claim races, and blocking claims.

mod common;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use weft_core::models::backends::chunks;
use weft_core::models::{Chunk, ChunkState, Pod};

fn pod(name: &str) -> Pod {
    Pod { name: name.to_owned() }
}

#[tokio::test]
async fn happy_path_claim_then_finish() {
    let shared = common::shared().await;
    let job_id = common::unique("job");
    let chunk_id = common::unique("chunk");
    chunks::add(vec![Chunk::new(chunk_id.clone(), job_id.clone())], &shared)
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let claimed = chunks::claim(&job_id, pod("pod-a"), &cancel, &shared).await.unwrap();
    assert_eq!(claimed.state, ChunkState::Assigned);
    assert_eq!(claimed.owner, "pod-a");
    assert_eq!(claimed.pods.last().map(|p| p.name.as_str()), Some("pod-a"));

    let finished = chunks::finish(&chunk_id, "pod-a", &shared).await.unwrap().unwrap();
    assert_eq!(finished.state, ChunkState::Success);
    assert_eq!(finished.owner, "pod-a");
}

#[tokio::test]
async fn finish_guard_fails_for_the_wrong_pod_or_state() {
    let shared = common::shared().await;
    let job_id = common::unique("job");
    let chunk_id = common::unique("chunk");
    chunks::add(vec![Chunk::new(chunk_id.clone(), job_id.clone())], &shared)
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    chunks::claim(&job_id, pod("pod-a"), &cancel, &shared).await.unwrap();

    // a pod that never claimed it can't finish it
    let result = chunks::finish(&chunk_id, "pod-b", &shared).await.unwrap();
    assert!(result.is_none());

    // finishing a chunk that isn't ASSIGNED anymore (already SUCCESS) is also a no-op
    chunks::finish(&chunk_id, "pod-a", &shared).await.unwrap().unwrap();
    let result = chunks::finish(&chunk_id, "pod-a", &shared).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn revoke_returns_to_pool_until_retry_budget_exhausted() {
    let shared = common::shared().await;
    let job_id = common::unique("job");
    let chunk_id = common::unique("chunk");
    chunks::add(vec![Chunk::new(chunk_id.clone(), job_id.clone())], &shared)
        .await
        .unwrap();
    let cancel = CancellationToken::new();
    const MAX_PODS: i32 = 2;

    chunks::claim(&job_id, pod("pod-a"), &cancel, &shared).await.unwrap();
    let revoked = chunks::revoke(&chunk_id, "pod-a", MAX_PODS, &shared)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(revoked.state, ChunkState::Unassigned);
    assert_eq!(revoked.pods.len(), 1);

    let claimed_again = chunks::claim(&job_id, pod("pod-b"), &cancel, &shared).await.unwrap();
    assert_eq!(claimed_again.owner, "pod-b");
    let revoked_again = chunks::revoke(&chunk_id, "pod-b", MAX_PODS, &shared)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(revoked_again.state, ChunkState::Failed);
    assert_eq!(revoked_again.pods.len(), 2);

    // the guard is state-gated, not owner-gated: a stale pod can no longer claim or revoke it
    let result = chunks::revoke(&chunk_id, "pod-b", MAX_PODS, &shared).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn concurrent_claims_race_and_exactly_one_wins() {
    let shared = common::shared().await;
    let job_id = common::unique("job");
    let chunk_id = common::unique("chunk");
    chunks::add(vec![Chunk::new(chunk_id.clone(), job_id.clone())], &shared)
        .await
        .unwrap();

    let shared_a = shared.clone();
    let shared_b = shared.clone();
    let job_a = job_id.clone();
    let job_b = job_id.clone();
    let first = tokio::spawn(async move {
        let cancel = CancellationToken::new();
        chunks::claim(&job_a, pod("pod-a"), &cancel, &shared_a).await
    });
    let second = tokio::spawn(async move {
        let cancel = CancellationToken::new();
        chunks::claim(&job_b, pod("pod-b"), &cancel, &shared_b).await
    });

    // exactly one of the two racers should win the only chunk within a short window
    let (first_result, second_result) = tokio::join!(
        tokio::time::timeout(Duration::from_secs(3), first),
        tokio::time::timeout(Duration::from_secs(1), second),
    );

    let winners: Vec<Chunk> = [first_result, second_result]
        .into_iter()
        .filter_map(|outcome| outcome.ok().and_then(Result::ok).and_then(Result::ok))
        .collect();
    assert_eq!(winners.len(), 1, "exactly one claimer should win the single chunk");
    assert_eq!(winners[0].id, chunk_id);
}

#[tokio::test]
async fn claim_blocks_until_a_chunk_is_added() {
    let shared = common::shared().await;
    let job_id = common::unique("job");

    let waiter_shared = shared.clone();
    let waiter_job_id = job_id.clone();
    let waiter = tokio::spawn(async move {
        let cancel = CancellationToken::new();
        chunks::claim(&waiter_job_id, pod("pod-a"), &cancel, &waiter_shared).await
    });

    // give the waiter a moment to park on the change-feed with nothing to claim
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!waiter.is_finished());

    let chunk_id = common::unique("chunk");
    chunks::add(vec![Chunk::new(chunk_id.clone(), job_id.clone())], &shared)
        .await
        .unwrap();

    let claimed = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("claim should unblock once a chunk is added")
        .unwrap()
        .unwrap();
    assert_eq!(claimed.id, chunk_id);
    assert_eq!(claimed.owner, "pod-a");
}

#[tokio::test]
async fn claim_honors_cancellation_when_nothing_is_available() {
    let shared = common::shared().await;
    let job_id = common::unique("job");
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel_clone.cancel();
    });
    let err = chunks::claim(&job_id, pod("pod-a"), &cancel, &shared)
        .await
        .unwrap_err();
    assert_eq!(err.kind, weft_core::utils::errors::ErrorKind::Canceled);
}
