//! Periodic copy task for one pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cadence_core::{Graph, PipelineId, pipeline};
use parking_lot::RwLock;

use crate::ll::{Task, TaskState};

/// Copy counters of one pipeline task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    /// Copy ticks attempted.
    pub ticks: u64,
    /// Ticks whose copy walk returned an error.
    pub failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    ticks: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    pub(crate) fn snapshot(&self) -> TaskStats {
        TaskStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Runs [`pipeline::copy`] once per period.
///
/// While the pipeline has an xrun pending the task completes without copying;
/// the pipeline is rescheduled by the START or RELEASE that recovers it.
pub struct PipelineTask {
    graph: Arc<RwLock<Graph>>,
    pipeline: PipelineId,
    name: String,
    counters: Arc<Counters>,
}

impl PipelineTask {
    /// Creates a task for `pipeline` with fresh counters.
    pub fn new(graph: Arc<RwLock<Graph>>, pipeline: PipelineId) -> Self {
        Self::with_counters(graph, pipeline, Arc::default())
    }

    pub(crate) fn with_counters(graph: Arc<RwLock<Graph>>, pipeline: PipelineId, counters: Arc<Counters>) -> Self {
        Self {
            graph,
            pipeline,
            name: format!("pipeline {}", pipeline.index()),
            counters,
        }
    }

    /// Pipeline this task copies.
    pub fn pipeline(&self) -> PipelineId {
        self.pipeline
    }

    /// Counters so far.
    pub fn stats(&self) -> TaskStats {
        self.counters.snapshot()
    }
}

impl Task for PipelineTask {
    fn run(&mut self) -> TaskState {
        // Recursive read: a trigger may hold the graph while it waits on this
        // worker, and must not be queued behind a pending writer.
        let graph = self.graph.read_recursive();
        let Some(pipeline) = graph.pipeline(self.pipeline) else {
            tracing::warn!("pipeline_task: {} no longer exists", self.pipeline);
            return TaskState::Completed;
        };
        if pipeline.xrun_bytes() != 0 {
            tracing::debug!("pipeline_task: {} in xrun, not copying", self.pipeline);
            return TaskState::Completed;
        }

        self.counters.ticks.fetch_add(1, Ordering::Relaxed);
        if pipeline::copy(&graph, self.pipeline).is_err() {
            // Already logged by the copy walk.
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
        }
        TaskState::Reschedule
    }

    fn name(&self) -> &str {
        &self.name
    }
}
