//! Stage-based build pipeline.
//!
//! - State machine and transition table (`state`)
//! - Unpack job queue (`queue`)
//! - Status stream to the front-end (`status`)
//! - Single-slot blocking worker (`worker`)
//! - Directory layout (`layout`)
//! - Blocking stage bodies (`stages`)
//! - The controller tying them together (`controller`)

mod controller;
mod layout;
mod queue;
mod stages;
mod state;
mod status;
mod worker;

pub use controller::{Collaborators, PipelineController, StageEvent, SystemController, READY_MESSAGE};
pub use layout::{sealed_output, Layout, PRIMARY_TREE, PRUNE_DIRS, SEAL_DIRS, SEAL_PERCENTS};
pub use queue::{PendingQueue, UnpackJob};
pub use stages::{remove_with_retry, CacheOutcome};
pub use state::PipelineState;
pub use status::{percent_of, StatusEvent, StatusReporter};
pub use worker::WorkerPool;
