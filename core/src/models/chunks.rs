//! Chunks: claimable units of work within a job

use std::fmt;
use std::str::FromStr;

use weft_core_derive::{ScyllaStoreAsStr, ScyllaStoreJson};

use crate::models::InvalidEnum;

/// A worker process that claims and executes chunks
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Pod {
    /// The name of this pod
    pub name: String,
}

/// The append-only list of every pod that has ever been assigned a chunk
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, ScyllaStoreJson)]
pub struct Pods(pub Vec<Pod>);

impl Pods {
    /// The number of pods that have ever held this chunk
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Is this list empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The most recently assigned pod, if any
    #[must_use]
    pub fn last(&self) -> Option<&Pod> {
        self.0.last()
    }

    /// Append a pod, returning the new list
    #[must_use]
    pub fn pushed(mut self, pod: Pod) -> Self {
        self.0.push(pod);
        self
    }
}

/// The state machine a chunk moves through: `UNASSIGNED -> ASSIGNED -> {SUCCESS, FAILED}`
///
/// Re-entry `ASSIGNED -> UNASSIGNED` is permitted via `RevokeChunk`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ScyllaStoreAsStr)]
pub enum ChunkState {
    /// No pod currently owns this chunk; it's available to be claimed
    Unassigned,
    /// A pod currently owns this chunk
    Assigned,
    /// This chunk was completed successfully
    Success,
    /// This chunk's retry budget was exhausted
    Failed,
}

impl ChunkState {
    /// Cast this state to its string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkState::Unassigned => "UNASSIGNED",
            ChunkState::Assigned => "ASSIGNED",
            ChunkState::Success => "SUCCESS",
            ChunkState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ChunkState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChunkState {
    type Err = InvalidEnum;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "UNASSIGNED" => Ok(ChunkState::Unassigned),
            "ASSIGNED" => Ok(ChunkState::Assigned),
            "SUCCESS" => Ok(ChunkState::Success),
            "FAILED" => Ok(ChunkState::Failed),
            _ => Err(InvalidEnum(format!("Invalid ChunkState: {raw}"))),
        }
    }
}

impl Default for ChunkState {
    fn default() -> Self {
        ChunkState::Unassigned
    }
}

/// A unit of work within a job, independently claimed by a pod
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The unique id of this chunk
    pub id: String,
    /// The job this chunk belongs to
    pub job_id: String,
    /// The current state of this chunk
    pub state: ChunkState,
    /// The pod currently holding this chunk, or empty if none
    #[serde(default)]
    pub owner: String,
    /// Every pod that has ever been assigned this chunk
    #[serde(default)]
    pub pods: Pods,
    /// Unix-second timestamp of the last ownership change
    #[serde(default)]
    pub time_touched: i64,
}

impl Chunk {
    /// Build a brand new, unassigned chunk
    #[must_use]
    pub fn new(id: impl Into<String>, job_id: impl Into<String>) -> Self {
        Chunk {
            id: id.into(),
            job_id: job_id.into(),
            state: ChunkState::Unassigned,
            owner: String::new(),
            pods: Pods::default(),
            time_touched: 0,
        }
    }
}
