//! Pipeline registry: descriptors, shard-filtered listing, change-feed
//! subscription, and blocking state waits

use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::models::backends::db::pipelines as db;
use crate::models::backends::streams::{publish, ChangeFeed};
use crate::models::{PipelineInfo, PipelineInfoChange, PipelineState};
use crate::utils::{CoreError, Shared};
use crate::{bad, conflict, internal_bare, not_found};

/// The change-feed collection name pipelines publish to
const COLLECTION: &str = "pipeline_infos";

/// Create a new pipeline
///
/// Rejects if `created_at` is already set. Stamps `created_at = now()` and
/// inserts, failing with a conflict on a duplicate `pipeline_name`.
#[instrument(skip_all, err(Debug))]
pub async fn create(mut pipeline: PipelineInfo, shared: &Shared) -> Result<PipelineInfo, CoreError> {
    if pipeline.created_at.is_some() {
        return bad!("created_at is server-assigned and must not be set by the caller".to_owned());
    }
    pipeline.created_at = Some(chrono::Utc::now());
    pipeline.job_counts = HashMap::new();
    if !db::insert(&pipeline, shared).await? {
        return conflict!(format!("Pipeline {} already exists", pipeline.pipeline_name));
    }
    publish(shared, COLLECTION, None, Some(&pipeline)).await?;
    Ok(pipeline)
}

/// Upsert a pipeline's `shard`/`state`/`stopped`
///
/// Rejects if `created_at` is set on the input. `created_at` is never part of
/// the write, so a pre-existing value is preserved and a brand new row gets
/// none. Callers creating a pipeline for the first time should use
/// [`create`] instead.
#[instrument(skip_all, err(Debug))]
pub async fn update(pipeline: PipelineInfo, shared: &Shared) -> Result<PipelineInfo, CoreError> {
    if pipeline.created_at.is_some() {
        return bad!("created_at must not be set on an update payload".to_owned());
    }
    let before = db::get(&pipeline.pipeline_name, shared).await?;
    db::upsert(&pipeline, shared).await?;
    let after = db::get(&pipeline.pipeline_name, shared)
        .await?
        .ok_or_else(|| internal_bare!(format!("Pipeline {} vanished mid-upsert", pipeline.pipeline_name)))?;
    publish(shared, COLLECTION, before.as_ref(), Some(&after)).await?;
    Ok(after)
}

/// Upsert a pipeline's state
#[instrument(skip_all, err(Debug))]
pub async fn set_state(
    pipeline_name: &str,
    state: PipelineState,
    shared: &Shared,
) -> Result<PipelineInfo, CoreError> {
    let before = db::get(pipeline_name, shared).await?;
    db::set_state(pipeline_name, state, shared).await?;
    let after = db::get(pipeline_name, shared)
        .await?
        .ok_or_else(|| internal_bare!(format!("Pipeline {pipeline_name} vanished mid-upsert")))?;
    publish(shared, COLLECTION, before.as_ref(), Some(&after)).await?;
    Ok(after)
}

/// Upsert a pipeline's stopped flag
#[instrument(skip_all, err(Debug))]
pub async fn set_stopped(
    pipeline_name: &str,
    stopped: bool,
    shared: &Shared,
) -> Result<PipelineInfo, CoreError> {
    let before = db::get(pipeline_name, shared).await?;
    db::set_stopped(pipeline_name, stopped, shared).await?;
    let after = db::get(pipeline_name, shared)
        .await?
        .ok_or_else(|| internal_bare!(format!("Pipeline {pipeline_name} vanished mid-upsert")))?;
    publish(shared, COLLECTION, before.as_ref(), Some(&after)).await?;
    Ok(after)
}

/// Get a pipeline, attaching its derived per-state job counts
///
/// The aggregate is computed fresh on every call; it is not cached and is
/// not guaranteed to be consistent with any particular concurrent job write.
#[instrument(skip_all, err(Debug))]
pub async fn get(pipeline_name: &str, shared: &Shared) -> Result<PipelineInfo, CoreError> {
    let mut pipeline = match db::get(pipeline_name, shared).await? {
        Some(pipeline) => pipeline,
        None => return not_found!(format!("Pipeline {pipeline_name} not found")),
    };
    pipeline.job_counts = db::job_counts(pipeline_name, shared).await?;
    Ok(pipeline)
}

/// List pipelines, optionally filtered by shard
#[instrument(skip_all, err(Debug))]
pub async fn list(shard: Option<i32>, shared: &Shared) -> Result<Vec<PipelineInfo>, CoreError> {
    match shard {
        Some(shard) => db::list_by_shard(shard, shared).await,
        None => db::scan(shared).await,
    }
}

/// Delete a pipeline by name
///
/// Succeeds even if `pipeline_name` matches nothing. Does not touch the
/// pipeline's jobs or chunks; callers that want those gone call the job
/// registry's `delete_for_pipeline` themselves.
#[instrument(skip_all, err(Debug))]
pub async fn delete(pipeline_name: &str, shared: &Shared) -> Result<(), CoreError> {
    let before = db::get(pipeline_name, shared).await?;
    db::delete(pipeline_name, shared).await?;
    if let Some(before) = before {
        publish::<PipelineInfo>(shared, COLLECTION, Some(&before), None).await?;
    }
    Ok(())
}

/// Block until a pipeline reaches the requested state
///
/// Fails immediately with `NotFound` if the pipeline doesn't exist yet,
/// returns immediately if it's already in the requested state, and otherwise
/// waits on the pipeline's change-feed. Honors `cancel`.
#[instrument(skip_all, err(Debug))]
pub async fn block_state(
    pipeline_name: &str,
    state: PipelineState,
    cancel: &CancellationToken,
    shared: &Shared,
) -> Result<PipelineInfo, CoreError> {
    // Open the cursor before taking the snapshot: if it opened after, a
    // transition into `state` published in between would be missed by both
    // the snapshot (still reads the old state) and the feed (cursor starts past it).
    let mut feed = ChangeFeed::open(shared, COLLECTION).await?;
    let current = match db::get(pipeline_name, shared).await? {
        Some(pipeline) => pipeline,
        None => return not_found!(format!("Pipeline {pipeline_name} not found")),
    };
    if current.state == state {
        return Ok(current);
    }
    let pipeline_name = pipeline_name.to_owned();
    feed.wait_for(shared, cancel, move |pipeline: &PipelineInfo| {
        pipeline.pipeline_name == pipeline_name && pipeline.state == state
    })
    .await
}

/// Wipe `JobInfos` then `PipelineInfos`
///
/// Chunks are deliberately not touched; see `DESIGN.md` for why this
/// asymmetry is preserved rather than "fixed".
#[instrument(skip_all, err(Debug))]
pub async fn delete_all(shared: &Shared) -> Result<(), CoreError> {
    crate::models::backends::db::jobs::truncate(shared).await?;
    db::truncate(shared).await?;
    Ok(())
}

/// Strip the fields a pure state transition touches, for
/// [`PipelineSubscription`]'s "don't notify on state-only changes" filter
fn project_out_state(pipeline: &PipelineInfo) -> PipelineInfo {
    let mut projected = pipeline.clone();
    projected.state = PipelineState::Starting;
    projected
}

/// A live cursor over pipeline changes, optionally shard-filtered, that
/// projects out pure state transitions
///
/// Built on the same [`ChangeFeed`] primitive as the rest of the core;
/// `next()` is the pull-based equivalent of a streaming RPC response.
pub struct PipelineSubscription {
    feed: ChangeFeed,
    shard: Option<i32>,
}

impl PipelineSubscription {
    /// Open a subscription, optionally replaying the current matching rows as
    /// synthetic `Create` events first
    ///
    /// # Arguments
    ///
    /// * `shard` - If set, only pipelines on this shard are emitted
    /// * `include_initial` - If set, the current matches are replayed as `Create`s
    /// * `shared` - Shared objects
    pub async fn open(
        shard: Option<i32>,
        include_initial: bool,
        shared: &Shared,
    ) -> Result<(Self, Vec<PipelineInfoChange>), CoreError> {
        // Open the cursor before the initial snapshot so a write landing in
        // between is seen exactly once, by the feed, rather than falling
        // into the gap between a pre-open snapshot and a post-snapshot cursor.
        let feed = ChangeFeed::open(shared, COLLECTION).await?;
        let initial = if include_initial {
            list(shard, shared)
                .await?
                .into_iter()
                .map(PipelineInfoChange::Create)
                .collect()
        } else {
            Vec::new()
        };
        Ok((PipelineSubscription { feed, shard }, initial))
    }

    /// Wait for the next change that isn't a pure state transition and
    /// matches this subscription's shard filter
    ///
    /// Blocks until a qualifying change arrives or `cancel` fires.
    pub async fn next(
        &mut self,
        cancel: &CancellationToken,
        shared: &Shared,
    ) -> Result<PipelineInfoChange, CoreError> {
        loop {
            if cancel.is_cancelled() {
                return crate::canceled!();
            }
            let event = tokio::select! {
                () = cancel.cancelled() => return crate::canceled!(),
                polled = self.feed.poll::<PipelineInfo>(shared, 5_000) => polled?,
            };
            let Some(event) = event else {
                continue;
            };
            if let Some(shard) = self.shard {
                let on_shard = event
                    .new
                    .as_ref()
                    .or(event.old.as_ref())
                    .is_some_and(|pipeline| pipeline.shard.number == shard);
                if !on_shard {
                    continue;
                }
            }
            match (&event.old, &event.new) {
                (None, Some(new)) => return Ok(PipelineInfoChange::Create(new.clone())),
                (Some(old), None) => return Ok(PipelineInfoChange::Delete(old.clone())),
                (Some(old), Some(new)) => {
                    if project_out_state(old) == project_out_state(new) {
                        continue;
                    }
                    return Ok(PipelineInfoChange::Update {
                        old: old.clone(),
                        new: new.clone(),
                    });
                }
                (None, None) => {
                    return crate::protocol_violation!(
                        "Change-feed event had neither an old nor a new value".to_owned()
                    )
                }
            }
        }
    }
}
