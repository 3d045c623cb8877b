//! Job descriptors: single executions of a pipeline over specific input commits

use chrono::prelude::*;
use std::fmt;
use std::str::FromStr;

use weft_core_derive::{ScyllaStoreAsStr, ScyllaStoreJson};

use crate::models::InvalidEnum;

/// A repo in an external content-addressed file system
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Repo {
    /// The name of the repo this commit belongs to
    pub name: String,
}

/// One input commit, identified by its owning repo and an opaque id
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// The repo this commit belongs to
    pub repo: Repo,
    /// The opaque id of this commit, assigned by the upstream file system service
    pub id: String,
}

/// One entry in a job's ordered input list
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Input {
    /// The commit this input is pinned to
    pub commit: Commit,
}

/// The ordered list of a job's input commits
///
/// Stored as a single JSON column; `CommitIndex` is the derived, order
/// insensitive fingerprint over this list (see
/// [`crate::models::backends::jobs::commit_index`]).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, ScyllaStoreJson)]
pub struct Inputs(pub Vec<Input>);

/// The owning pipeline for a job, nullable for one-off jobs
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineRef {
    /// The name of the owning pipeline
    pub name: Option<String>,
}

/// A job's output commit, written post-completion
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ScyllaStoreJson)]
pub struct JobOutputCommit {
    /// The commit this job's output was written to
    pub commit: Commit,
}

/// The lifecycle state of a job
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, ScyllaStoreAsStr)]
pub enum JobState {
    /// The job has been created but hasn't started pulling inputs yet
    Creating,
    /// The job is pulling its input commits
    Pulling,
    /// The job is actively running
    Running,
    /// The job completed with no chunks to process
    Empty,
    /// The job completed successfully
    Success,
    /// The job failed
    Failure,
}

impl JobState {
    /// Cast this state to its string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Creating => "CREATING",
            JobState::Pulling => "PULLING",
            JobState::Running => "RUNNING",
            JobState::Empty => "EMPTY",
            JobState::Success => "SUCCESS",
            JobState::Failure => "FAILURE",
        }
    }

    /// Is this one of the terminal states `InspectJob` can block on
    #[must_use]
    pub fn is_blockable_terminal(self) -> bool {
        matches!(self, JobState::Empty | JobState::Success | JobState::Failure)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobState {
    type Err = InvalidEnum;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "CREATING" => Ok(JobState::Creating),
            "PULLING" => Ok(JobState::Pulling),
            "RUNNING" => Ok(JobState::Running),
            "EMPTY" => Ok(JobState::Empty),
            "SUCCESS" => Ok(JobState::Success),
            "FAILURE" => Ok(JobState::Failure),
            _ => Err(InvalidEnum(format!("Invalid JobState: {raw}"))),
        }
    }
}

impl Default for JobState {
    fn default() -> Self {
        JobState::Creating
    }
}

/// A job: one execution of a pipeline over a specific set of input commits
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    /// The unique id for this job, assigned by the caller
    pub job_id: String,
    /// The owning pipeline, if any
    #[serde(default)]
    pub pipeline: PipelineRef,
    /// The ordered list of input commits
    #[serde(default)]
    pub inputs: Inputs,
    /// The derived commit-set fingerprint; caller must not set this
    #[serde(default)]
    pub commit_index: Option<String>,
    /// The lifecycle state of this job
    pub state: JobState,
    /// When this job was created; set exactly once, at creation
    #[serde(default)]
    pub started: Option<DateTime<Utc>>,
    /// When this job transitioned to a terminal state
    #[serde(default)]
    pub finished: Option<DateTime<Utc>>,
    /// The job's output commit, once written
    #[serde(default)]
    pub output: Option<JobOutputCommit>,
}

/// A partial update to a job's state, used by `CreateJobState`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JobStateUpdate {
    /// The job to update
    pub job_id: String,
    /// The new state to set
    pub state: JobState,
}

/// A partial update to a job's output, used by `CreateJobOutput`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JobOutputUpdate {
    /// The job to update
    pub job_id: String,
    /// The output commit to set
    pub output: JobOutputCommit,
}

/// Optional filters for `ListJobInfos`
#[derive(Debug, Clone, Default)]
pub struct JobListOpts {
    /// Filter by owning pipeline name
    pub pipeline: Option<String>,
    /// Filter by input commit set (matched via the derived `CommitIndex`)
    pub inputs: Option<Inputs>,
}
