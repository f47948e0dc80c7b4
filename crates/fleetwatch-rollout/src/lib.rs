//! Fleetwatch deployment tracking: simulated rollouts and pipeline status.
//!
//! A deployment is recorded `in_progress` and moves to `success` once, after
//! a fixed delay, on a scheduled background task. The tracker owns the
//! process-wide pipeline status and is the only writer of it.
//!
//! # Components
//!
//! - **`pipeline`**: Pipeline status cell shared with readers
//! - **`tracker`**: Deployment state machine (start, complete, history)

pub mod pipeline;
pub mod tracker;

pub use pipeline::PipelineStatus;
pub use tracker::{DEFAULT_COMPLETION_DELAY, DeploymentTracker, TrackerError, TrackerResult};
