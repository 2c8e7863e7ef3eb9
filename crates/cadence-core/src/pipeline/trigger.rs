//! Trigger propagation.
//!
//! A trigger enters at one component and spreads in that component's
//! direction. Components of the entry's pipeline, and of connected pipelines
//! in the same co-schedule group, receive the command; anything else is a
//! graph boundary. Once the walk succeeds, every pipeline it touched has its
//! periodic work (re)registered or cancelled.
//!
//! Before any component is touched, a capture START/RELEASE runs a preflight
//! walk over the boundaries. A dailess capture pipeline whose remote producer
//! is not running cannot be fed, so the trigger fails with
//! [`Error::NoData`](crate::Error::NoData) with no component transitioned.

use crate::buffer::BufferId;
use crate::component::{ComponentId, ComponentKind, ComponentState, Direction, TriggerCmd};
use crate::error::{Error, Result, Status};
use crate::graph::{ComponentNode, Graph, Visitor, WalkContext, WalkDirection, for_each_connected, walk};

use super::lifecycle::completed;
use super::{Pipeline, PipelineId, PipelineScheduler, ScheduleOrder, xrun};

/// Commands the trigger walk accepts.
fn is_trigger_cmd(cmd: TriggerCmd) -> bool {
    matches!(
        cmd,
        TriggerCmd::Start
            | TriggerCmd::Stop
            | TriggerCmd::Pause
            | TriggerCmd::Release
            | TriggerCmd::Reset
            | TriggerCmd::Xrun
    )
}

/// True if `node` runs together with the pipeline the trigger started in.
fn in_scope(graph: &Graph, start: &Pipeline, node: &ComponentNode) -> Result<bool> {
    match node.pipeline() {
        None => Ok(false),
        Some(pid) if pid == start.id() => Ok(true),
        Some(pid) => Ok(graph.get_pipeline(pid)?.same_sched_group(start)),
    }
}

/// Boundary check for capture START/RELEASE: a pipeline whose own source is
/// not a DAI depends on `remote` to provide data.
fn starves(graph: &Graph, start: &Pipeline, remote: &ComponentNode) -> bool {
    let source_kind = start
        .source_comp()
        .and_then(|c| graph.component(c))
        .map(ComponentNode::kind);
    source_kind != Some(ComponentKind::Dai) && remote.state() != ComponentState::Active
}

/// Walks the trigger scope without touching any driver.
struct Preflight<'a> {
    start: &'a Pipeline,
}

impl Visitor for Preflight<'_> {
    fn visit(
        &mut self,
        ctx: &mut WalkContext<'_>,
        current: ComponentId,
        _calling: Option<BufferId>,
        dir: WalkDirection,
    ) -> Result<Status> {
        let graph = ctx.graph();
        let node = graph.node(current)?;
        if in_scope(graph, self.start, node)? {
            return for_each_connected(self, ctx, current, dir);
        }
        if starves(graph, self.start, node) {
            tracing::warn!(
                "pipeline_trigger: {} has no active source, {current} is {}",
                self.start.id(),
                node.state()
            );
            return Err(Error::NoData);
        }
        Ok(Status::Continue)
    }
}

struct TriggerWalk<'a> {
    start: &'a Pipeline,
    cmd: TriggerCmd,
    aborted: bool,
}

impl Visitor for TriggerWalk<'_> {
    fn visit(
        &mut self,
        ctx: &mut WalkContext<'_>,
        current: ComponentId,
        _calling: Option<BufferId>,
        dir: WalkDirection,
    ) -> Result<Status> {
        let graph = ctx.graph();
        let node = graph.node(current)?;
        if !in_scope(graph, self.start, node)? {
            tracing::debug!("pipeline_comp_trigger: {current} is from another pipeline");
            return Ok(Status::Continue);
        }

        tracing::debug!("pipeline_comp_trigger: {current} {}", self.cmd);
        let status = node.lock().trigger(self.cmd)?;
        if status.is_stop() {
            self.aborted = true;
            return Ok(Status::PathStop);
        }

        if let Some(pid) = node.pipeline() {
            ctx.record_pipeline(pid);
        }
        for_each_connected(self, ctx, current, dir)
    }
}

/// Propagates `cmd` from `entry` and updates the schedule of every touched
/// pipeline.
///
/// Accepted commands are START, STOP, PAUSE, RELEASE, RESET and XRUN.
///
/// While the pipeline has a pending xrun, STOP, PAUSE and XRUN complete
/// immediately with [`Status::PathStop`]. XRUN first climbs from `entry` to the
/// host of the active chain it belongs to.
///
/// The first failing component aborts the walk and its error is returned;
/// components already transitioned stay transitioned and no schedule changes
/// are made.
pub fn trigger(
    graph: &Graph,
    scheduler: &dyn PipelineScheduler,
    id: PipelineId,
    entry: ComponentId,
    cmd: TriggerCmd,
) -> Result<Status> {
    if !is_trigger_cmd(cmd) {
        tracing::error!("pipeline_trigger: {cmd} is not a trigger command");
        return Err(Error::InvalidArgument);
    }
    let pipeline = completed(graph, id)?;
    tracing::info!("pipeline_trigger: {id} cmd {cmd}");

    if pipeline.xrun_bytes() != 0 && xrun::handle_trigger(pipeline, cmd).is_stop() {
        return Ok(Status::PathStop);
    }

    let entry = if cmd == TriggerCmd::Xrun {
        xrun::find_host(graph, entry)?
    } else {
        entry
    };
    let node = graph.node(entry)?;
    let start = match node.pipeline() {
        Some(pid) => graph.get_pipeline(pid)?,
        None => {
            tracing::error!("pipeline_trigger: {entry} is not wired into a pipeline");
            return Err(Error::InvalidArgument);
        }
    };
    let dir: WalkDirection = node.direction().into();

    if dir == WalkDirection::Upstream && matches!(cmd, TriggerCmd::Start | TriggerCmd::Release) {
        let mut ctx = WalkContext::new(graph).skip_incomplete(true);
        walk(&mut Preflight { start }, &mut ctx, entry, dir)?;
    }

    let mut visitor = TriggerWalk {
        start,
        cmd,
        aborted: false,
    };
    let mut ctx = WalkContext::new(graph).skip_incomplete(true);
    let status = walk(&mut visitor, &mut ctx, entry, dir).inspect_err(|err| {
        tracing::error!("pipeline_trigger: {id} entry {entry} cmd {cmd} failed: {err}");
    })?;
    if visitor.aborted {
        tracing::debug!("pipeline_trigger: {id} {cmd} stopped at a component already in that state");
    }

    schedule_triggered(graph, scheduler, ctx.pipelines(), cmd)?;
    Ok(status)
}

/// Links touched pipelines producer-before-consumer, in walk order.
///
/// A playback walk reaches producers first, a capture walk reaches consumers
/// first.
fn link_sched_order(graph: &Graph, pipelines: &[PipelineId]) -> Result<()> {
    let mut previous: Option<&Pipeline> = None;
    for &pid in pipelines {
        let current = graph.get_pipeline(pid)?;
        match current.direction() {
            Direction::Playback => {
                current.set_sched_prev(previous.map(Pipeline::id));
                if let Some(prev) = previous {
                    prev.set_sched_next(Some(pid));
                }
            }
            Direction::Capture => {
                current.set_sched_next(previous.map(Pipeline::id));
                if let Some(prev) = previous {
                    prev.set_sched_prev(Some(pid));
                }
            }
        }
        previous = Some(current);
    }
    Ok(())
}

fn schedule_triggered(
    graph: &Graph,
    scheduler: &dyn PipelineScheduler,
    pipelines: &[PipelineId],
    cmd: TriggerCmd,
) -> Result<()> {
    match cmd {
        TriggerCmd::Start | TriggerCmd::Release => {
            link_sched_order(graph, pipelines)?;
            for &pid in pipelines {
                let pipeline = graph.get_pipeline(pid)?;
                pipeline.set_xrun_bytes(0);
                pipeline.set_status(ComponentState::Active);
                if scheduler.is_scheduled(pid) {
                    continue;
                }
                let order = match (pipeline.sched_prev(), pipeline.sched_next()) {
                    (Some(prev), _) if scheduler.is_scheduled(prev) => ScheduleOrder::After(prev),
                    (_, Some(next)) if scheduler.is_scheduled(next) => ScheduleOrder::Before(next),
                    _ => ScheduleOrder::Any,
                };
                scheduler.schedule(pipeline, order)?;
                tracing::debug!("pipeline_schedule_triggered: {pid} scheduled {order:?}");
            }
        }
        TriggerCmd::Stop | TriggerCmd::Pause => {
            for &pid in pipelines {
                scheduler.cancel(pid);
                graph.get_pipeline(pid)?.set_status(ComponentState::Paused);
            }
        }
        TriggerCmd::Reset => {
            for &pid in pipelines {
                scheduler.cancel(pid);
                let pipeline = graph.get_pipeline(pid)?;
                pipeline.set_xrun_bytes(0);
                pipeline.set_status(ComponentState::Ready);
            }
        }
        TriggerCmd::Xrun => {
            for &pid in pipelines {
                let pipeline = graph.get_pipeline(pid)?;
                if pipeline.xrun_bytes() == 0 {
                    pipeline.set_xrun_bytes(1);
                }
            }
        }
        _ => {}
    }
    Ok(())
}
