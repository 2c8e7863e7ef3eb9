//! Stream position reports.

use crate::buffer::BufferId;
use crate::component::{ComponentId, ComponentKind};
use crate::error::{Result, Status};
use crate::graph::{Graph, Visitor, WalkContext, WalkDirection, for_each_connected, walk};

use super::PipelineId;

/// Host and hardware positions of a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamPosition {
    /// Bytes moved by the host endpoint.
    pub host_posn: u64,
    /// Bytes moved by the first DAI found, if any.
    pub dai_posn: u64,
    /// The DAI that reported `dai_posn`.
    pub dai: Option<ComponentId>,
    /// Timestamp resolution in nanoseconds; zero when no DAI was found.
    pub timestamp_ns: u64,
}

struct FindDai(Option<ComponentId>);

impl Visitor for FindDai {
    fn visit(
        &mut self,
        ctx: &mut WalkContext<'_>,
        current: ComponentId,
        _calling: Option<BufferId>,
        dir: WalkDirection,
    ) -> Result<Status> {
        if ctx.graph().node(current)?.kind() == ComponentKind::Dai {
            self.0 = Some(current);
            return Ok(Status::PathStop);
        }
        for_each_connected(self, ctx, current, dir)
    }
}

/// Reads the host position at `entry`, then walks towards the hardware to the
/// first DAI and reads its position.
pub fn get_timestamp(graph: &Graph, id: PipelineId, entry: ComponentId) -> Result<StreamPosition> {
    let pipeline = graph.get_pipeline(id)?;
    let node = graph.node(entry)?;
    let mut posn = StreamPosition {
        host_posn: node.lock().position().unwrap_or(0),
        ..StreamPosition::default()
    };

    let mut finder = FindDai(None);
    let mut ctx = WalkContext::new(graph).skip_incomplete(true);
    walk(&mut finder, &mut ctx, entry, node.direction().into())?;

    let Some(dai) = finder.0 else {
        tracing::debug!("pipeline_get_timestamp: {id} DAI position update failed");
        return Ok(posn);
    };
    posn.dai = Some(dai);
    posn.dai_posn = graph.node(dai)?.lock().position().unwrap_or(0);
    posn.timestamp_ns = u64::from(pipeline.period_us()) * 1000;
    Ok(posn)
}
