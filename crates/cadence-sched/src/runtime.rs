//! The runtime context: graph, scheduling domain and pipeline tasks in one
//! object with an init/teardown lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use cadence_core::{
    ComponentId, Graph, Pipeline, PipelineId, PipelineScheduler, ScheduleOrder, Status, StreamParams,
    StreamPosition, TriggerCmd, pipeline,
};
use parking_lot::{Mutex, RwLock};

use crate::domain::{CoreStats, SchedConfig, SchedulingDomain};
use crate::ll::{LlScheduler, TaskId};
use crate::task::{Counters, PipelineTask, TaskStats};
use crate::{Result, SchedError};

/// [`PipelineScheduler`] backed by an [`LlScheduler`].
///
/// Each scheduled pipeline gets one [`PipelineTask`] on its configured core,
/// placed after its producer or before its consumer when the trigger linked
/// them.
pub struct PipelineTasks {
    graph: Arc<RwLock<Graph>>,
    ll: LlScheduler,
    tasks: Mutex<HashMap<PipelineId, TaskId>>,
    counters: Mutex<HashMap<PipelineId, Arc<Counters>>>,
}

impl PipelineTasks {
    /// Creates an empty task table over `graph`.
    pub fn new(graph: Arc<RwLock<Graph>>, domain: Arc<SchedulingDomain>) -> Self {
        Self {
            graph,
            ll: LlScheduler::new(domain),
            tasks: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying task scheduler.
    pub fn ll(&self) -> &LlScheduler {
        &self.ll
    }

    /// Task currently registered for `pipeline`.
    pub fn task_id(&self, pipeline: PipelineId) -> Option<TaskId> {
        let id = *self.tasks.lock().get(&pipeline)?;
        self.ll.contains(id).then_some(id)
    }

    /// Copy counters for `pipeline`, kept across stop/start.
    pub fn stats(&self, pipeline: PipelineId) -> Option<TaskStats> {
        self.counters.lock().get(&pipeline).map(|c| c.snapshot())
    }

    fn counters_for(&self, pipeline: PipelineId) -> Arc<Counters> {
        Arc::clone(self.counters.lock().entry(pipeline).or_default())
    }

    /// Cancels every task.
    pub fn shutdown(&self) {
        self.tasks.lock().clear();
        self.ll.shutdown();
    }
}

impl PipelineScheduler for PipelineTasks {
    fn schedule(&self, pipeline: &Pipeline, order: ScheduleOrder) -> cadence_core::Result<()> {
        let id = pipeline.id();
        if self.is_scheduled(id) {
            return Ok(());
        }

        let task = Box::new(PipelineTask::with_counters(
            Arc::clone(&self.graph),
            id,
            self.counters_for(id),
        ));
        let (priority, period) = (pipeline.priority(), pipeline.period_us());
        let anchor = match order {
            ScheduleOrder::After(other) | ScheduleOrder::Before(other) => self.task_id(other),
            ScheduleOrder::Any => None,
        };

        let result = match (order, anchor) {
            (ScheduleOrder::After(_), Some(anchor)) => self.ll.schedule_after(anchor, priority, period, task),
            (ScheduleOrder::Before(_), Some(anchor)) => self.ll.schedule_before(anchor, priority, period, task),
            _ => self.ll.schedule(pipeline.core(), priority, period, task),
        };
        let task_id = result.map_err(|err| {
            tracing::error!("pipeline_schedule: {id} failed: {err}");
            err.to_core()
        })?;
        self.tasks.lock().insert(id, task_id);
        tracing::debug!("pipeline_schedule: {id} as {task_id} ({order:?})");
        Ok(())
    }

    fn cancel(&self, pipeline: PipelineId) {
        let Some(task_id) = self.tasks.lock().remove(&pipeline) else {
            return;
        };
        match self.ll.cancel(task_id) {
            Ok(()) | Err(SchedError::TaskNotFound(_)) => {}
            Err(err) => tracing::error!("pipeline_cancel: {pipeline} failed: {err}"),
        }
    }

    fn is_scheduled(&self, pipeline: PipelineId) -> bool {
        self.task_id(pipeline).is_some()
    }
}

/// Owns the component graph and everything that runs it.
///
/// Walks take the graph for reading; topology edits ([`Runtime::complete`],
/// [`Runtime::with_graph_mut`]) take it for writing. Dropping the runtime
/// cancels every task and stops the domain.
pub struct Runtime {
    graph: Arc<RwLock<Graph>>,
    domain: Arc<SchedulingDomain>,
    tasks: PipelineTasks,
}

impl Runtime {
    /// Takes ownership of `graph` and starts the scheduling domain.
    pub fn new(graph: Graph, config: SchedConfig) -> Result<Self> {
        let domain = Arc::new(SchedulingDomain::new(config)?);
        let graph = Arc::new(RwLock::new(graph));
        let tasks = PipelineTasks::new(Arc::clone(&graph), Arc::clone(&domain));
        tracing::info!("runtime: started with {} cores", domain.config().cores);
        Ok(Self { graph, domain, tasks })
    }

    /// Shared handle to the graph.
    pub fn graph(&self) -> &Arc<RwLock<Graph>> {
        &self.graph
    }

    /// The scheduling domain.
    pub fn domain(&self) -> &Arc<SchedulingDomain> {
        &self.domain
    }

    /// Pipeline task table.
    pub fn tasks(&self) -> &PipelineTasks {
        &self.tasks
    }

    /// Runs `f` with the graph held for reading.
    pub fn with_graph<R>(&self, f: impl FnOnce(&Graph) -> R) -> R {
        f(&self.graph.read())
    }

    /// Runs `f` with the graph held for writing.
    pub fn with_graph_mut<R>(&self, f: impl FnOnce(&mut Graph) -> R) -> R {
        f(&mut self.graph.write())
    }

    /// See [`pipeline::complete`].
    pub fn complete(&self, id: PipelineId, source: ComponentId, sink: ComponentId) -> cadence_core::Result<()> {
        pipeline::complete(&mut self.graph.write(), id, source, sink)
    }

    /// See [`pipeline::params`].
    pub fn params(&self, id: PipelineId, entry: ComponentId, stream: &StreamParams) -> cadence_core::Result<Status> {
        pipeline::params(&self.graph.read(), id, entry, stream)
    }

    /// See [`pipeline::prepare`].
    pub fn prepare(&self, id: PipelineId, entry: ComponentId) -> cadence_core::Result<Status> {
        pipeline::prepare(&self.graph.read(), id, entry)
    }

    /// Sends `cmd` from `entry` and updates the pipeline tasks.
    pub fn trigger(&self, id: PipelineId, entry: ComponentId, cmd: TriggerCmd) -> cadence_core::Result<Status> {
        pipeline::trigger(&self.graph.read(), &self.tasks, id, entry, cmd)
    }

    /// See [`pipeline::reset`].
    pub fn reset(&self, id: PipelineId, entry: ComponentId) -> cadence_core::Result<Status> {
        pipeline::reset(&self.graph.read(), &self.tasks, id, entry)
    }

    /// Runs one copy tick by hand, outside the schedule.
    pub fn copy(&self, id: PipelineId) -> cadence_core::Result<Status> {
        pipeline::copy(&self.graph.read(), id)
    }

    /// See [`pipeline::get_timestamp`].
    pub fn timestamp(&self, id: PipelineId, entry: ComponentId) -> cadence_core::Result<StreamPosition> {
        pipeline::get_timestamp(&self.graph.read(), id, entry)
    }

    /// See [`pipeline::report_xrun`].
    pub fn report_xrun(&self, id: PipelineId, bytes: u32) -> cadence_core::Result<()> {
        pipeline::report_xrun(&self.graph.read(), id, bytes)
    }

    /// Per-core worker statistics.
    pub fn stats(&self) -> Vec<CoreStats> {
        self.domain.stats()
    }

    /// Copy counters of one pipeline.
    pub fn task_stats(&self, id: PipelineId) -> Option<TaskStats> {
        self.tasks.stats(id)
    }

    /// Cancels every task and stops the domain. Safe to call twice.
    pub fn shutdown(&self) {
        self.tasks.shutdown();
        self.domain.shutdown();
        tracing::info!("runtime: shut down");
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
