//! The raw scylla query layer for `Chunk`s

use super::helpers::lwt_applied;
use crate::models::{Chunk, ChunkState, Pods};
use crate::utils::{CoreError, Shared};

/// One `chunks` row, in column order
type ChunkRow = (String, String, ChunkState, String, Pods, i64);

/// Cast a raw row into a [`Chunk`]
fn row_to_chunk(row: ChunkRow) -> Chunk {
    let (id, job_id, state, owner, pods, time_touched) = row;
    Chunk {
        id,
        job_id,
        state,
        owner,
        pods,
        time_touched,
    }
}

/// Bulk insert a batch of brand new, unassigned chunks
///
/// Each chunk is inserted independently; `AddChunk` is not a single atomic
/// batch because chunk ids are caller-generated and already guaranteed
/// unique, so there's no conflict for a batch to guard against.
pub async fn insert(chunks: &[Chunk], shared: &Shared) -> Result<(), CoreError> {
    for chunk in chunks {
        let values = (
            &chunk.id,
            &chunk.job_id,
            chunk.state,
            &chunk.owner,
            &chunk.pods,
            chunk.time_touched,
        );
        shared
            .scylla
            .session
            .execute_unpaged(&shared.scylla.prep.chunks.insert, values)
            .await?;
    }
    Ok(())
}

/// Get a chunk by its primary key
pub async fn get(id: &str, shared: &Shared) -> Result<Option<Chunk>, CoreError> {
    let result = shared
        .scylla
        .session
        .execute_unpaged(&shared.scylla.prep.chunks.get, (id,))
        .await?;
    let row = result.into_rows_result()?.maybe_first_row::<ChunkRow>()?;
    Ok(row.map(row_to_chunk))
}

/// List a job's chunks
pub async fn list_by_job(job_id: &str, shared: &Shared) -> Result<Vec<Chunk>, CoreError> {
    let result = shared
        .scylla
        .session
        .execute_unpaged(&shared.scylla.prep.chunks.list_by_job, (job_id,))
        .await?;
    let rows = result.into_rows_result()?.rows::<ChunkRow>()?;
    Ok(rows
        .filter_map(|row| crate::log_scylla_err!(row))
        .map(row_to_chunk)
        .collect())
}

/// List a job's chunks, filtered to `UNASSIGNED`
///
/// `ClaimChunk` takes its initial snapshot from this; candidates are tried
/// one at a time against [`claim`] until one applies or the snapshot is
/// exhausted, at which point the caller falls back to the live change-feed.
pub async fn list_unassigned_by_job(job_id: &str, shared: &Shared) -> Result<Vec<Chunk>, CoreError> {
    let result = shared
        .scylla
        .session
        .execute_unpaged(
            &shared.scylla.prep.chunks.list_unassigned_by_job,
            (job_id, ChunkState::Unassigned),
        )
        .await?;
    let rows = result.into_rows_result()?.rows::<ChunkRow>()?;
    Ok(rows
        .filter_map(|row| crate::log_scylla_err!(row))
        .map(row_to_chunk)
        .collect())
}

/// Conditionally claim an `UNASSIGNED` chunk for `owner`
///
/// Returns `true` if the claim applied (the chunk was still `UNASSIGNED`).
pub async fn claim(
    id: &str,
    owner: &str,
    pods: &Pods,
    time_touched: i64,
    shared: &Shared,
) -> Result<bool, CoreError> {
    let result = shared
        .scylla
        .session
        .execute_unpaged(
            &shared.scylla.prep.chunks.claim,
            (
                owner,
                ChunkState::Assigned,
                pods,
                time_touched,
                id,
                ChunkState::Unassigned,
            ),
        )
        .await?;
    lwt_applied(result)
}

/// Conditionally finish a chunk owned by `owner`, setting it to `SUCCESS`
///
/// Returns `true` if the transition applied.
pub async fn finish(id: &str, owner: &str, shared: &Shared) -> Result<bool, CoreError> {
    let result = shared
        .scylla
        .session
        .execute_unpaged(
            &shared.scylla.prep.chunks.finish,
            (ChunkState::Success, id, owner, ChunkState::Assigned),
        )
        .await?;
    lwt_applied(result)
}

/// Conditionally revoke a chunk owned by `owner`, setting it to `target`
///
/// Callers pick `target` (`UNASSIGNED` to let it be re-claimed, `FAILED` once
/// its retry budget under `MaxPods` is exhausted) before calling this.
/// Returns `true` if the transition applied.
pub async fn revoke(
    id: &str,
    owner: &str,
    target: ChunkState,
    shared: &Shared,
) -> Result<bool, CoreError> {
    let result = shared
        .scylla
        .session
        .execute_unpaged(
            &shared.scylla.prep.chunks.revoke,
            (target, id, owner, ChunkState::Assigned),
        )
        .await?;
    lwt_applied(result)
}

/// Truncate every chunk row
pub async fn truncate(shared: &Shared) -> Result<(), CoreError> {
    shared
        .scylla
        .session
        .execute_unpaged(&shared.scylla.prep.chunks.truncate, ())
        .await?;
    Ok(())
}
