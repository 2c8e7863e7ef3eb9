//! Pipelines and the operations that walk them.
//!
//! A [`Pipeline`] is a connected, co-scheduled region of the graph. Its
//! configuration (period, priority, core, scheduling component) is fixed when
//! it is created; its boundaries are recorded by [`complete`]; its runtime
//! status, pending xrun and schedule links change under a short lock while
//! walks hold the graph for reading.
//!
//! | Operation | Module |
//! |-----------|--------|
//! | [`complete`], [`params`], [`prepare`], [`reset`] | `lifecycle` |
//! | [`trigger`] | `trigger` |
//! | [`copy`] | `copy` |
//! | [`get_timestamp`] | `timestamp` |
//! | [`report_xrun`] | `xrun` |
//!
//! Registering periodic work is delegated to a [`PipelineScheduler`], so the
//! core stays independent of how ticks are delivered.

mod copy;
mod lifecycle;
mod timestamp;
mod trigger;
mod xrun;

use core::fmt;

use parking_lot::Mutex;

use crate::component::{ComponentId, ComponentState, Direction};
use crate::error::Result;

pub use copy::copy;
pub use lifecycle::{complete, params, prepare, reset};
pub use timestamp::{StreamPosition, get_timestamp};
pub use trigger::trigger;
pub use xrun::report_xrun;

/// Unique identifier for a pipeline in the graph registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(pub u32);

impl PipelineId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PipelineId({})", self.0)
    }
}

/// Static pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Pipeline identifier.
    pub id: PipelineId,
    /// Stream direction; picks the copy walk direction.
    pub direction: Direction,
    /// Copy period in microseconds.
    pub period_us: u32,
    /// Scheduling priority (lower runs first within a core).
    pub priority: u32,
    /// Core the pipeline task runs on.
    pub core: u32,
    /// Scheduling component. Pipelines sharing one form a co-schedule group.
    pub sched_comp: Option<ComponentId>,
}

impl PipelineConfig {
    /// Playback pipeline at 1 ms on core 0.
    pub fn new(id: PipelineId) -> Self {
        Self {
            id,
            direction: Direction::Playback,
            period_us: 1000,
            priority: 0,
            core: 0,
            sched_comp: None,
        }
    }

    /// Sets the stream direction.
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Sets the copy period.
    pub fn period_us(mut self, period_us: u32) -> Self {
        self.period_us = period_us;
        self
    }

    /// Sets the scheduling priority.
    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the core.
    pub fn core(mut self, core: u32) -> Self {
        self.core = core;
        self
    }

    /// Sets the scheduling component.
    pub fn sched_comp(mut self, comp: ComponentId) -> Self {
        self.sched_comp = Some(comp);
        self
    }
}

/// Runtime fields guarded by the pipeline lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PipelineRun {
    status: ComponentState,
    xrun_bytes: u32,
    sched_prev: Option<PipelineId>,
    sched_next: Option<PipelineId>,
}

/// A co-scheduled region of the component graph.
pub struct Pipeline {
    config: PipelineConfig,
    pub(crate) source_comp: Option<ComponentId>,
    pub(crate) sink_comp: Option<ComponentId>,
    run: Mutex<PipelineRun>,
}

impl Pipeline {
    pub(crate) fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            source_comp: None,
            sink_comp: None,
            run: Mutex::new(PipelineRun {
                status: ComponentState::Init,
                xrun_bytes: 0,
                sched_prev: None,
                sched_next: None,
            }),
        }
    }

    /// Pipeline identifier.
    #[inline]
    pub fn id(&self) -> PipelineId {
        self.config.id
    }

    /// Static configuration.
    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stream direction.
    #[inline]
    pub fn direction(&self) -> Direction {
        self.config.direction
    }

    /// Copy period in microseconds.
    #[inline]
    pub fn period_us(&self) -> u32 {
        self.config.period_us
    }

    /// Scheduling priority.
    #[inline]
    pub fn priority(&self) -> u32 {
        self.config.priority
    }

    /// Core the task runs on.
    #[inline]
    pub fn core(&self) -> u32 {
        self.config.core
    }

    /// Scheduling component.
    #[inline]
    pub fn sched_comp(&self) -> Option<ComponentId> {
        self.config.sched_comp
    }

    /// Upstream boundary, once completed.
    #[inline]
    pub fn source_comp(&self) -> Option<ComponentId> {
        self.source_comp
    }

    /// Downstream boundary, once completed.
    #[inline]
    pub fn sink_comp(&self) -> Option<ComponentId> {
        self.sink_comp
    }

    /// Host-facing boundary: the source for playback, the sink for capture.
    ///
    /// This is where host commands and timestamp queries enter.
    pub fn host_comp(&self) -> Option<ComponentId> {
        match self.config.direction {
            Direction::Playback => self.source_comp,
            Direction::Capture => self.sink_comp,
        }
    }

    /// True once [`complete`] has recorded the boundaries.
    pub fn is_complete(&self) -> bool {
        self.source_comp.is_some() && self.sink_comp.is_some()
    }

    /// True if both pipelines are the same or share a scheduling component.
    pub fn same_sched_group(&self, other: &Pipeline) -> bool {
        self.id() == other.id()
            || (self.config.sched_comp.is_some() && self.config.sched_comp == other.config.sched_comp)
    }

    /// Current pipeline status.
    pub fn status(&self) -> ComponentState {
        self.run.lock().status
    }

    pub(crate) fn set_status(&self, status: ComponentState) {
        self.run.lock().status = status;
    }

    /// Non-zero while an xrun is pending resolution.
    pub fn xrun_bytes(&self) -> u32 {
        self.run.lock().xrun_bytes
    }

    pub(crate) fn set_xrun_bytes(&self, bytes: u32) {
        self.run.lock().xrun_bytes = bytes;
    }

    /// Producer this pipeline is scheduled after.
    pub fn sched_prev(&self) -> Option<PipelineId> {
        self.run.lock().sched_prev
    }

    /// Consumer this pipeline is scheduled before.
    pub fn sched_next(&self) -> Option<PipelineId> {
        self.run.lock().sched_next
    }

    pub(crate) fn set_sched_prev(&self, prev: Option<PipelineId>) {
        self.run.lock().sched_prev = prev;
    }

    pub(crate) fn set_sched_next(&self, next: Option<PipelineId>) {
        self.run.lock().sched_next = next;
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let run = *self.run.lock();
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("source_comp", &self.source_comp)
            .field("sink_comp", &self.sink_comp)
            .field("status", &run.status)
            .field("xrun_bytes", &run.xrun_bytes)
            .finish()
    }
}

/// Where a newly scheduled pipeline goes relative to the others on its core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOrder {
    /// Append by priority.
    Any,
    /// Run after the given (producer) pipeline.
    After(PipelineId),
    /// Run before the given (consumer) pipeline.
    Before(PipelineId),
}

/// Registers and cancels the periodic copy work of pipelines.
///
/// Implementations are called while the graph is held for reading, so they
/// must not take the graph lock themselves.
pub trait PipelineScheduler: Send + Sync {
    /// Starts periodic copy ticks for `pipeline`.
    fn schedule(&self, pipeline: &Pipeline, order: ScheduleOrder) -> Result<()>;

    /// Stops future ticks. In-flight ticks are not interrupted.
    fn cancel(&self, pipeline: PipelineId);

    /// True while `pipeline` has periodic work registered.
    fn is_scheduled(&self, pipeline: PipelineId) -> bool;
}
