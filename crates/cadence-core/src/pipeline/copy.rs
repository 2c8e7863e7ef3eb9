//! One period of data movement through a pipeline.

use crate::buffer::BufferId;
use crate::component::{ComponentId, Direction};
use crate::error::{Error, Result, Status};
use crate::graph::{Graph, Visitor, WalkContext, WalkDirection, for_each_connected, walk};

use super::PipelineId;
use super::lifecycle::completed;

struct CopyWalk {
    pipeline: PipelineId,
}

impl CopyWalk {
    fn copy_one(graph: &Graph, current: ComponentId) -> Result<Status> {
        let node = graph.node(current)?;
        let ports = graph.ports(node);
        node.lock().copy(&ports)
    }
}

impl Visitor for CopyWalk {
    fn visit(
        &mut self,
        ctx: &mut WalkContext<'_>,
        current: ComponentId,
        _calling: Option<BufferId>,
        dir: WalkDirection,
    ) -> Result<Status> {
        let graph = ctx.graph();
        let node = graph.node(current)?;
        if node.pipeline() != Some(self.pipeline) {
            tracing::trace!("pipeline_comp_copy: {current} is from another pipeline");
            return Ok(Status::Continue);
        }
        if !node.lock().is_active() {
            tracing::trace!("pipeline_comp_copy: {current} is not active");
            return Ok(Status::Continue);
        }

        if dir == WalkDirection::Downstream {
            let status = Self::copy_one(graph, current)?;
            if status.is_stop() {
                return Ok(status);
            }
        }

        let status = for_each_connected(self, ctx, current, dir)?;
        if status.is_stop() {
            return Ok(status);
        }

        if dir == WalkDirection::Upstream {
            return Self::copy_one(graph, current);
        }
        Ok(Status::Continue)
    }
}

/// Runs one copy tick for `id`.
///
/// Playback pipelines walk upstream from their sink so every producer runs
/// before its consumer; capture pipelines walk downstream from their source,
/// copying on the way down. Components of other pipelines and components
/// that are not ACTIVE are skipped.
///
/// A failing copy ends this tick only. The error is logged and returned; the
/// next tick starts fresh.
pub fn copy(graph: &Graph, id: PipelineId) -> Result<Status> {
    let pipeline = completed(graph, id)?;
    let (start, dir) = match pipeline.direction() {
        Direction::Playback => (pipeline.sink_comp(), WalkDirection::Upstream),
        Direction::Capture => (pipeline.source_comp(), WalkDirection::Downstream),
    };
    let start = start.ok_or(Error::InvalidArgument)?;

    let mut ctx = WalkContext::new(graph).skip_incomplete(true);
    walk(&mut CopyWalk { pipeline: id }, &mut ctx, start, dir).inspect_err(|err| {
        tracing::warn!("pipeline_copy: {id} start {start} {dir:?} failed: {err}");
    })
}
