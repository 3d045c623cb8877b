//! Pipeline descriptors: long-lived compute definitions, assigned to shards

use chrono::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use weft_core_derive::ScyllaStoreAsStr;

use crate::models::jobs::JobState;
use crate::models::InvalidEnum;

/// The shard a pipeline is assigned to, used to route it to a control-loop instance
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Shard {
    /// The shard number
    pub number: i32,
}

/// The lifecycle state of a pipeline
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ScyllaStoreAsStr)]
pub enum PipelineState {
    /// The pipeline is starting up
    Starting,
    /// The pipeline is running
    Running,
    /// The pipeline has failed
    Failure,
}

impl PipelineState {
    /// Cast this state to its string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Starting => "STARTING",
            PipelineState::Running => "RUNNING",
            PipelineState::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PipelineState {
    type Err = InvalidEnum;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "STARTING" => Ok(PipelineState::Starting),
            "RUNNING" => Ok(PipelineState::Running),
            "FAILURE" => Ok(PipelineState::Failure),
            _ => Err(InvalidEnum(format!("Invalid PipelineState: {raw}"))),
        }
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        PipelineState::Starting
    }
}

/// Per-state job counts, derived on read by `GetPipelineInfo`
///
/// Not persisted; recomputed from `JobInfos` on every call.
pub type JobCounts = HashMap<JobState, u64>;

/// A pipeline: a durable, repeatable computation assigned to a shard
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PipelineInfo {
    /// The unique name of this pipeline
    pub pipeline_name: String,
    /// The shard this pipeline is assigned to
    #[serde(default)]
    pub shard: Shard,
    /// The lifecycle state of this pipeline
    pub state: PipelineState,
    /// Whether this pipeline has been stopped
    #[serde(default)]
    pub stopped: bool,
    /// When this pipeline was first inserted; never modified by subsequent updates
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Derived per-state job counts; not persisted
    #[serde(skip_serializing, default)]
    pub job_counts: JobCounts,
}

/// A partial update to a pipeline's state, used by `UpdatePipelineState`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PipelineStateUpdate {
    /// The pipeline to update
    pub pipeline_name: String,
    /// The new state to set
    pub state: PipelineState,
}

/// A partial update to a pipeline's stopped flag, used by `UpdatePipelineStopped`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PipelineStoppedUpdate {
    /// The pipeline to update
    pub pipeline_name: String,
    /// The new stopped value to set
    pub stopped: bool,
}

/// A single change event in a `SubscribePipelineInfos` stream
///
/// `State` is projected out of both `old`/`new` payloads; subscribers are not
/// notified of pure state transitions, which flow through `BlockPipelineState`
/// instead.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineInfoChange {
    /// A pipeline was created
    Create(PipelineInfo),
    /// A pipeline was updated
    Update {
        /// The pipeline's value before the update
        old: PipelineInfo,
        /// The pipeline's value after the update
        new: PipelineInfo,
    },
    /// A pipeline was deleted
    Delete(PipelineInfo),
}
