//! The redis-backed change-feed primitive shared by the registries and the
//! chunk coordinator: every write to a tracked collection is appended to a
//! Redis stream, and readers combine a snapshot query with a live tail over
//! that stream, de-duplicating by primary key plus the stream's own
//! monotonic entry id.

use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::backends::db::helpers::get_conn;
use crate::utils::{CoreError, Shared};
use crate::{canceled, protocol_violation};

/// One entry read off a collection's change-feed
#[derive(Debug, Clone)]
pub struct ChangeEvent<T> {
    /// The record's value before this write, or `None` on creation
    pub old: Option<T>,
    /// The record's value after this write, or `None` on deletion
    pub new: Option<T>,
}

/// The kind of change a [`ChangeEvent`] represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// `old` is absent, `new` is present
    Create,
    /// Both `old` and `new` are present
    Update,
    /// `old` is present, `new` is absent
    Delete,
}

impl<T> ChangeEvent<T> {
    /// Classify this event, failing if neither side is set
    pub fn kind(&self) -> Result<ChangeKind, CoreError> {
        match (&self.old, &self.new) {
            (None, Some(_)) => Ok(ChangeKind::Create),
            (Some(_), Some(_)) => Ok(ChangeKind::Update),
            (Some(_), None) => Ok(ChangeKind::Delete),
            (None, None) => protocol_violation!(
                "Change-feed event had neither an old nor a new value".to_owned()
            ),
        }
    }
}

/// Build the stream key a collection's change events are appended to
fn stream_key(shared: &Shared, collection: &str) -> String {
    format!("{}:changefeed:{}", shared.config.weft.namespace, collection)
}

/// Append a change event to a collection's change-feed
///
/// # Arguments
///
/// * `shared` - Shared objects (scylla session + redis pool)
/// * `collection` - The name of the collection this change happened in
/// * `old` - The record's value before this write, if any
/// * `new` - The record's value after this write, if any
pub async fn publish<T: Serialize>(
    shared: &Shared,
    collection: &str,
    old: Option<&T>,
    new: Option<&T>,
) -> Result<(), CoreError> {
    let old_json = match old {
        Some(value) => serde_json::to_string(value)?,
        None => String::new(),
    };
    let new_json = match new {
        Some(value) => serde_json::to_string(value)?,
        None => String::new(),
    };
    let mut conn = get_conn(shared).await?;
    let _: String = conn
        .xadd(
            stream_key(shared, collection),
            "*",
            &[("old", old_json), ("new", new_json)],
        )
        .await?;
    Ok(())
}

/// A cursor over a collection's change-feed
///
/// Opened at the current tip of the stream, so only events published after
/// [`ChangeFeed::open`] are ever returned. Callers that want `IncludeInitial`
/// semantics take their own snapshot (via the registry's list/get operation)
/// before opening the cursor, emit the snapshot as synthetic `Create` events,
/// then de-duplicate against whatever the live tail replays by primary key.
pub struct ChangeFeed {
    key: String,
    last_id: String,
}

impl ChangeFeed {
    /// Open a change-feed cursor positioned at the current tip of a collection's stream
    pub async fn open(shared: &Shared, collection: &str) -> Result<Self, CoreError> {
        let key = stream_key(shared, collection);
        let mut conn = get_conn(shared).await?;
        let tip: Vec<(String, Vec<(String, String)>)> =
            redis::cmd("XREVRANGE")
                .arg(&key)
                .arg("+")
                .arg("-")
                .arg("COUNT")
                .arg(1)
                .query_async(&mut *conn)
                .await?;
        let last_id = tip
            .into_iter()
            .next()
            .map_or_else(|| "0-0".to_owned(), |(id, _)| id);
        Ok(ChangeFeed { key, last_id })
    }

    /// Block until the next change event arrives or `block_ms` elapses
    ///
    /// Returns `Ok(None)` on a timeout so callers can re-check cancellation
    /// between polls.
    pub async fn poll<T: DeserializeOwned>(
        &mut self,
        shared: &Shared,
        block_ms: usize,
    ) -> Result<Option<ChangeEvent<T>>, CoreError> {
        let mut conn = get_conn(shared).await?;
        let opts = redis::streams::StreamReadOptions::default()
            .block(block_ms)
            .count(1);
        let reply: redis::streams::StreamReadReply = conn
            .xread_options(&[self.key.as_str()], &[self.last_id.as_str()], &opts)
            .await?;
        for stream_key in reply.keys {
            for stream_id in stream_key.ids {
                self.last_id = stream_id.id.clone();
                let old_json: String = stream_id.get("old").unwrap_or_default();
                let new_json: String = stream_id.get("new").unwrap_or_default();
                let old = if old_json.is_empty() {
                    None
                } else {
                    Some(serde_json::from_str(&old_json)?)
                };
                let new = if new_json.is_empty() {
                    None
                } else {
                    Some(serde_json::from_str(&new_json)?)
                };
                return Ok(Some(ChangeEvent { old, new }));
            }
        }
        Ok(None)
    }

    /// Poll until a value matching `pred` arrives, honoring cancellation
    ///
    /// # Arguments
    ///
    /// * `shared` - Shared objects
    /// * `cancel` - A token that ends the wait early with [`crate::utils::errors::ErrorKind::Canceled`]
    /// * `pred` - Called with each event's `new` value; returns `true` to stop waiting
    pub async fn wait_for<T, F>(
        &mut self,
        shared: &Shared,
        cancel: &tokio_util::sync::CancellationToken,
        mut pred: F,
    ) -> Result<T, CoreError>
    where
        T: DeserializeOwned + Clone,
        F: FnMut(&T) -> bool,
    {
        loop {
            if cancel.is_cancelled() {
                return canceled!();
            }
            tokio::select! {
                () = cancel.cancelled() => return canceled!(),
                polled = self.poll::<T>(shared, 5_000) => {
                    if let Some(event) = polled? {
                        if let Some(new) = event.new {
                            if pred(&new) {
                                return Ok(new);
                            }
                        }
                    }
                }
            }
        }
    }
}
