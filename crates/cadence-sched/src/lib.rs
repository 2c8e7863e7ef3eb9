//! Timer-driven scheduling for the cadence pipeline core.
//!
//! This crate provides:
//!
//! - **Scheduling domain**: [`SchedulingDomain`], one periodic timer shared by
//!   all cores that wakes a worker thread per core
//! - **Low-latency scheduler**: [`LlScheduler`], ordered per-core task lists
//!   run on every domain wake
//! - **Pipeline tasks**: [`PipelineTask`], one copy tick per period
//! - **Runtime**: [`Runtime`], the context object owning the graph, domain and
//!   scheduler, with an init/teardown lifecycle
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cadence_sched::{Runtime, SchedConfig};
//!
//! let runtime = Runtime::new(graph, SchedConfig::default())?;
//! runtime.trigger(pipeline, host, TriggerCmd::Start)?;
//! std::thread::sleep(std::time::Duration::from_millis(20));
//! runtime.shutdown();
//! ```

mod domain;
mod ll;
mod runtime;
mod task;

pub use domain::{
    CoreStats, Handler, MAX_STATS_WINDOW_LOG2, RegistrationId, SchedConfig, SchedulingDomain,
};
pub use ll::{LlScheduler, Task, TaskId, TaskState};
pub use runtime::{PipelineTasks, Runtime};
pub use task::{PipelineTask, TaskStats};

/// Error types for scheduling operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedError {
    /// The requested core does not exist in this domain.
    #[error("core {core} out of range, domain has {cores} cores")]
    CoreOutOfRange {
        /// Requested core.
        core: u32,
        /// Cores the domain was configured with.
        cores: u32,
    },

    /// Periods must be non-zero.
    #[error("invalid period: {0} us")]
    InvalidPeriod(u32),

    /// No registration with this id.
    #[error("registration {0} not found")]
    RegistrationNotFound(RegistrationId),

    /// No task with this id.
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    /// The domain has been shut down.
    #[error("scheduling domain is shut down")]
    ShutDown,

    /// A worker or timer thread could not be started.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// Error from a pipeline operation.
    #[error(transparent)]
    Core(#[from] cadence_core::Error),
}

impl SchedError {
    /// The core error code this maps to when reported through a pipeline
    /// operation.
    pub fn to_core(&self) -> cadence_core::Error {
        match self {
            Self::Core(err) => *err,
            Self::Spawn(_) => cadence_core::Error::OutOfMemory,
            Self::ShutDown => cadence_core::Error::Busy,
            _ => cadence_core::Error::InvalidArgument,
        }
    }
}

/// Convenience result type for scheduling operations.
pub type Result<T> = std::result::Result<T, SchedError>;
