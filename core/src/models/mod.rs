//! The data model for pipelines, jobs, and chunks

pub mod backends;
pub mod chunks;
mod errors;
pub mod jobs;
pub mod pipelines;

pub use chunks::{Chunk, ChunkState, Pod, Pods};
pub use errors::InvalidEnum;
pub use jobs::{
    Commit, Input, Inputs, JobInfo, JobListOpts, JobOutputCommit, JobOutputUpdate, JobState,
    JobStateUpdate, PipelineRef, Repo,
};
pub use pipelines::{
    JobCounts, PipelineInfo, PipelineInfoChange, PipelineState, PipelineStateUpdate,
    PipelineStoppedUpdate, Shard,
};
