//! Chunk coordinator: the claim/finish/revoke work-distribution protocol
//!
//! A conditional-transition state machine keyed on `(id, state, owner)`. Every
//! transition is atomic on a single chunk record via Scylla's lightweight
//! transactions; there is no in-process locking, so concurrent claimers race
//! on the conditional update and the loser simply retries against the next
//! candidate.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::canceled;
use crate::models::backends::db::chunks as db;
use crate::models::backends::streams::{publish, ChangeFeed};
use crate::models::{Chunk, ChunkState, Pod};
use crate::utils::{CoreError, Shared};

/// The change-feed collection name chunks publish to
const COLLECTION: &str = "chunks";

/// Bulk insert a batch of brand new, unassigned chunks
///
/// Callers supply `id`, `job_id`, and the initial `state = UNASSIGNED`.
#[instrument(skip_all, err(Debug))]
pub async fn add(chunks: Vec<Chunk>, shared: &Shared) -> Result<(), CoreError> {
    db::insert(&chunks, shared).await?;
    for chunk in &chunks {
        publish(shared, COLLECTION, None, Some(chunk)).await?;
    }
    Ok(())
}

/// Attempt to claim one already-`UNASSIGNED` candidate for `pod`
///
/// Returns `Ok(None)` without error if another claimer won the race.
async fn try_claim(candidate: &Chunk, pod: &Pod, shared: &Shared) -> Result<Option<Chunk>, CoreError> {
    let pods = candidate.pods.clone().pushed(pod.clone());
    let time_touched = Utc::now().timestamp();
    let applied = db::claim(&candidate.id, &pod.name, &pods, time_touched, shared).await?;
    if !applied {
        return Ok(None);
    }
    let mut claimed = candidate.clone();
    claimed.owner = pod.name.clone();
    claimed.state = ChunkState::Assigned;
    claimed.pods = pods;
    claimed.time_touched = time_touched;
    publish(shared, COLLECTION, Some(candidate), Some(&claimed)).await?;
    Ok(Some(claimed))
}

/// Claim the first available `UNASSIGNED` chunk belonging to `job_id`
///
/// Takes a snapshot of already-unassigned chunks first and tries each in
/// turn; if none claim, falls back to the live change-feed so a chunk that's
/// added or revoked back to `UNASSIGNED` after the snapshot is still seen.
/// Blocks until a claim succeeds or `cancel` fires.
#[instrument(skip_all, err(Debug))]
pub async fn claim(
    job_id: &str,
    pod: Pod,
    cancel: &CancellationToken,
    shared: &Shared,
) -> Result<Chunk, CoreError> {
    // Open the cursor before the snapshot: a chunk added or revoked back to
    // UNASSIGNED in between would otherwise be missed by both the snapshot
    // (already taken) and the feed (cursor starts past it).
    let mut feed = ChangeFeed::open(shared, COLLECTION).await?;
    let snapshot = db::list_unassigned_by_job(job_id, shared).await?;
    for candidate in &snapshot {
        if let Some(claimed) = try_claim(candidate, &pod, shared).await? {
            return Ok(claimed);
        }
    }
    loop {
        if cancel.is_cancelled() {
            return canceled!();
        }
        let event = tokio::select! {
            () = cancel.cancelled() => return canceled!(),
            polled = feed.poll::<Chunk>(shared, 5_000) => polled?,
        };
        let Some(event) = event else {
            continue;
        };
        let Some(candidate) = event.new else {
            continue;
        };
        if candidate.job_id != job_id || candidate.state != ChunkState::Unassigned {
            continue;
        }
        if let Some(claimed) = try_claim(&candidate, &pod, shared).await? {
            return Ok(claimed);
        }
    }
}

/// Conditionally finish a chunk owned by `pod_name`, setting it to `SUCCESS`
///
/// Returns `None` if the guard failed, meaning the pod no longer owns it, most
/// often because it was already revoked. Never an error except on store I/O
/// failure.
#[instrument(skip_all, err(Debug))]
pub async fn finish(chunk_id: &str, pod_name: &str, shared: &Shared) -> Result<Option<Chunk>, CoreError> {
    let Some(before) = db::get(chunk_id, shared).await? else {
        return Ok(None);
    };
    if !db::finish(chunk_id, pod_name, shared).await? {
        return Ok(None);
    }
    let mut after = before.clone();
    after.state = ChunkState::Success;
    publish(shared, COLLECTION, Some(&before), Some(&after)).await?;
    Ok(Some(after))
}

/// Conditionally revoke a chunk owned by `pod_name`
///
/// Returns the work to the pool (`UNASSIGNED`) unless its retry budget under
/// `max_pods` is already exhausted, in which case it's marked `FAILED`.
/// `owner` is left as the revoking pod; `state` is the authoritative guard
/// for claim/finish, not `owner`. Returns `None` if the guard failed.
#[instrument(skip_all, err(Debug))]
pub async fn revoke(
    chunk_id: &str,
    pod_name: &str,
    max_pods: i32,
    shared: &Shared,
) -> Result<Option<Chunk>, CoreError> {
    let Some(before) = db::get(chunk_id, shared).await? else {
        return Ok(None);
    };
    let target = if i32::try_from(before.pods.len()).unwrap_or(i32::MAX) >= max_pods {
        ChunkState::Failed
    } else {
        ChunkState::Unassigned
    };
    if !db::revoke(chunk_id, pod_name, target, shared).await? {
        return Ok(None);
    }
    let mut after = before.clone();
    after.state = target;
    publish(shared, COLLECTION, Some(&before), Some(&after)).await?;
    Ok(Some(after))
}
