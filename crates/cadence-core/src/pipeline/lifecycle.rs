//! Pipeline setup and teardown walks: complete, params, prepare, reset.

use crate::buffer::{BufferId, RingBuffer, StreamParams};
use crate::component::{ComponentId, ComponentKind, ComponentState};
use crate::error::{Error, Result, Status};
use crate::graph::{Graph, Visitor, WalkContext, WalkDirection, for_each_connected, walk};

use super::{PipelineId, PipelineScheduler};

/// Collects same-pipeline members reachable downstream from the source.
struct Members {
    pipeline: PipelineId,
    found: Vec<ComponentId>,
}

impl Visitor for Members {
    fn visit(
        &mut self,
        ctx: &mut WalkContext<'_>,
        current: ComponentId,
        _calling: Option<BufferId>,
        dir: WalkDirection,
    ) -> Result<Status> {
        let node = ctx.graph().node(current)?;
        if node.pipeline_id() != self.pipeline {
            return Ok(Status::Continue);
        }
        if !self.found.contains(&current) {
            self.found.push(current);
        }
        for_each_connected(self, ctx, current, dir)
    }
}

/// Binds every component reachable from `source` in the same pipeline and
/// records the pipeline boundaries. The pipeline moves INIT → READY.
///
/// # Errors
///
/// [`Error::InvalidArgument`] if the pipeline was already completed or if
/// either boundary belongs to another pipeline.
pub fn complete(graph: &mut Graph, id: PipelineId, source: ComponentId, sink: ComponentId) -> Result<()> {
    let pipeline = graph.get_pipeline(id)?;
    if pipeline.status() != ComponentState::Init {
        tracing::error!("pipeline_complete: {id} already completed");
        return Err(Error::InvalidArgument);
    }
    for comp in [source, sink] {
        if graph.node(comp)?.pipeline_id() != id {
            tracing::error!("pipeline_complete: {comp} is not a member of {id}");
            return Err(Error::InvalidArgument);
        }
    }

    let mut members = Members {
        pipeline: id,
        found: Vec::new(),
    };
    let mut ctx = WalkContext::new(graph);
    walk(&mut members, &mut ctx, source, WalkDirection::Downstream)?;

    for comp in &members.found {
        graph.node_mut(*comp)?.pipeline = Some(id);
    }
    let pipeline = graph.pipeline_mut(id)?;
    pipeline.source_comp = Some(source);
    pipeline.sink_comp = Some(sink);
    pipeline.set_status(ComponentState::Ready);

    tracing::info!(
        "pipeline_complete: {id} {source} → {sink}, {} components",
        members.found.len()
    );
    Ok(())
}

/// Whether a connected pipeline ending in `end_kind` lies the right way for a
/// walk in `dir` to continue into it.
fn faces_walk(end_kind: Option<ComponentKind>, dir: WalkDirection) -> bool {
    match dir {
        WalkDirection::Downstream => end_kind == Some(ComponentKind::Dai),
        WalkDirection::Upstream => end_kind == Some(ComponentKind::Host),
    }
}

/// True if `current` belongs to the start pipeline, or to a connected one
/// that the prepare/reset walk should enter.
fn enters(ctx: &WalkContext<'_>, start: PipelineId, current: ComponentId, dir: WalkDirection) -> Result<bool> {
    let graph = ctx.graph();
    let node = graph.node(current)?;
    let Some(pid) = node.pipeline() else {
        return Ok(false);
    };
    if pid == start {
        return Ok(true);
    }
    let other = graph.get_pipeline(pid)?;
    let end_kind = other
        .sink_comp()
        .and_then(|c| graph.component(c))
        .map(|n| n.kind());
    Ok(faces_walk(end_kind, dir))
}

struct Params<'p> {
    params: &'p StreamParams,
    period_bytes: usize,
    start: PipelineId,
    resize: Option<Error>,
}

impl Visitor for Params<'_> {
    fn visit(
        &mut self,
        ctx: &mut WalkContext<'_>,
        current: ComponentId,
        _calling: Option<BufferId>,
        dir: WalkDirection,
    ) -> Result<Status> {
        if let Some(err) = self.resize.take() {
            return Err(err);
        }
        let node = ctx.graph().node(current)?;
        if node.pipeline() != Some(self.start) {
            return Ok(Status::Continue);
        }
        node.lock().params(self.params, self.period_bytes)?;
        for_each_connected(self, ctx, current, dir)
    }

    fn visit_buffer(&mut self, _ctx: &mut WalkContext<'_>, buffer: &RingBuffer, _dir: WalkDirection) {
        buffer.set_params(*self.params);
        let wanted = self.period_bytes * 2;
        if self.period_bytes > 0 && buffer.size() < wanted {
            if let Err(err) = buffer.set_size_range(wanted, self.period_bytes) {
                tracing::error!("pipeline_params: {} can't hold two periods", buffer.id());
                self.resize = Some(err);
            }
        }
    }
}

/// Propagates stream parameters from `entry` across its pipeline.
///
/// Every visited driver learns the params and the per-period byte count at
/// the pipeline period. Buffers crossed by the walk get the params attached
/// and are grown to hold at least two periods.
pub fn params(graph: &Graph, id: PipelineId, entry: ComponentId, stream: &StreamParams) -> Result<Status> {
    let pipeline = completed(graph, id)?;
    let node = graph.node(entry)?;
    let period_bytes = stream.period_bytes(pipeline.period_us());

    let mut visitor = Params {
        params: stream,
        period_bytes,
        start: id,
        resize: None,
    };
    let mut ctx = WalkContext::new(graph).skip_incomplete(true);
    let status = walk(&mut visitor, &mut ctx, entry, node.direction().into()).inspect_err(|err| {
        tracing::error!("pipeline_params: {id} failed: {err}");
    })?;
    if let Some(err) = visitor.resize {
        return Err(err);
    }
    tracing::info!(
        "pipeline_params: {id} rate {} channels {} period {period_bytes} bytes",
        stream.rate,
        stream.channels
    );
    Ok(status)
}

struct Prepare {
    start: PipelineId,
}

impl Visitor for Prepare {
    fn visit(
        &mut self,
        ctx: &mut WalkContext<'_>,
        current: ComponentId,
        _calling: Option<BufferId>,
        dir: WalkDirection,
    ) -> Result<Status> {
        if !enters(ctx, self.start, current, dir)? {
            return Ok(Status::Continue);
        }
        let graph = ctx.graph();
        let node = graph.node(current)?;
        if node.state() == ComponentState::Active {
            tracing::debug!("pipeline_comp_prepare: {current} is already running");
            return Ok(Status::Continue);
        }
        let status = node.lock().prepare_with(&graph.ports(node))?;
        if status.is_stop() {
            return Ok(status);
        }
        if let Some(pid) = node.pipeline() {
            ctx.record_pipeline(pid);
        }
        for_each_connected(self, ctx, current, dir)
    }

    fn visit_buffer(&mut self, _ctx: &mut WalkContext<'_>, buffer: &RingBuffer, _dir: WalkDirection) {
        buffer.reset();
    }
}

/// Prepares every component reachable from `entry` in its direction.
///
/// Connected pipelines whose far endpoint faces the wrong way (a playback
/// walk reaching a pipeline that does not end in a DAI, a capture walk
/// reaching one that does not end in a host) are not entered. Crossed
/// buffers are rewound. Touched pipelines move to PREPARE.
pub fn prepare(graph: &Graph, id: PipelineId, entry: ComponentId) -> Result<Status> {
    completed(graph, id)?;
    let dir: WalkDirection = graph.node(entry)?.direction().into();

    let mut ctx = WalkContext::new(graph).skip_incomplete(true);
    let status = walk(&mut Prepare { start: id }, &mut ctx, entry, dir).inspect_err(|err| {
        tracing::error!("pipeline_prepare: {id} failed: {err}");
    })?;

    for pid in ctx.pipelines() {
        graph.get_pipeline(*pid)?.set_status(ComponentState::Prepare);
    }
    tracing::info!("pipeline_prepare: {id} ({} pipelines)", ctx.pipelines().len());
    Ok(status)
}

struct Reset {
    start: PipelineId,
}

impl Visitor for Reset {
    fn visit(
        &mut self,
        ctx: &mut WalkContext<'_>,
        current: ComponentId,
        _calling: Option<BufferId>,
        dir: WalkDirection,
    ) -> Result<Status> {
        if !enters(ctx, self.start, current, dir)? {
            return Ok(Status::Continue);
        }
        let graph = ctx.graph();
        let node = graph.node(current)?;
        if let Some(pid) = node.pipeline() {
            let start = graph.get_pipeline(self.start)?;
            if pid != self.start && !graph.get_pipeline(pid)?.same_sched_group(start) {
                return Ok(Status::Continue);
            }
            ctx.record_pipeline(pid);
        }
        node.lock().reset()?;
        for_each_connected(self, ctx, current, dir)
    }

    fn visit_buffer(&mut self, _ctx: &mut WalkContext<'_>, buffer: &RingBuffer, _dir: WalkDirection) {
        buffer.reset();
    }
}

/// Resets every component reachable from `entry` back to READY.
///
/// Uses the prepare boundary rule and additionally only enters connected
/// pipelines in the same co-schedule group. Touched pipelines have their
/// periodic work cancelled, their pending xrun cleared and return to READY.
pub fn reset(
    graph: &Graph,
    scheduler: &dyn PipelineScheduler,
    id: PipelineId,
    entry: ComponentId,
) -> Result<Status> {
    completed(graph, id)?;
    let dir: WalkDirection = graph.node(entry)?.direction().into();

    let mut ctx = WalkContext::new(graph).skip_incomplete(true);
    let status = walk(&mut Reset { start: id }, &mut ctx, entry, dir).inspect_err(|err| {
        tracing::error!("pipeline_reset: {id} failed: {err}");
    })?;

    for &pid in ctx.pipelines() {
        scheduler.cancel(pid);
        let pipeline = graph.get_pipeline(pid)?;
        pipeline.set_xrun_bytes(0);
        pipeline.set_status(ComponentState::Ready);
    }
    tracing::info!("pipeline_reset: {id}");
    Ok(status)
}

/// Looks up a pipeline that has been through [`complete`].
pub(crate) fn completed(graph: &Graph, id: PipelineId) -> Result<&super::Pipeline> {
    let pipeline = graph.get_pipeline(id)?;
    if !pipeline.is_complete() {
        tracing::error!("{id} is not complete");
        return Err(Error::InvalidArgument);
    }
    Ok(pipeline)
}
