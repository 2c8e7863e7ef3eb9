//! Generic directed traversal over the component graph.
//!
//! A walk starts by handing the start component to a [`Visitor`]. A visitor
//! that wants the walk to continue calls [`for_each_connected`], which follows
//! every buffer on the component's downstream (sinks) or upstream (sources)
//! list to the component on its far end and visits that one, recursively.
//!
//! The walk is fail-fast: an `Err` or [`Status::PathStop`] from any visit
//! unwinds the remaining traversal at that point. Components visited before
//! the failure keep whatever the visitor did to them.
//!
//! Cycles are cut with a per-walk stack of buffers currently being traversed:
//! a buffer already on the stack is never followed again. The stack lives in
//! the [`WalkContext`], so concurrent walks over the same graph do not
//! interfere.

use crate::buffer::{BufferId, RingBuffer};
use crate::component::{ComponentId, Direction};
use crate::error::{Error, Result, Status};
use crate::pipeline::PipelineId;

use super::Graph;

/// Which adjacency list a walk follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalkDirection {
    /// Follow produced-to buffers towards consumers.
    Downstream,
    /// Follow consumed-from buffers towards producers.
    Upstream,
}

impl WalkDirection {
    /// The opposite direction.
    pub fn reverse(self) -> Self {
        match self {
            Self::Downstream => Self::Upstream,
            Self::Upstream => Self::Downstream,
        }
    }
}

impl From<Direction> for WalkDirection {
    /// Playback data flows downstream from the host, capture data is pulled
    /// upstream towards the hardware.
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Playback => Self::Downstream,
            Direction::Capture => Self::Upstream,
        }
    }
}

/// Per-walk state shared by every visit.
#[derive(Debug)]
pub struct WalkContext<'g> {
    graph: &'g Graph,
    skip_incomplete: bool,
    pipelines: Vec<PipelineId>,
    walking: Vec<BufferId>,
}

impl<'g> WalkContext<'g> {
    /// Creates a context over `graph`.
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            skip_incomplete: false,
            pipelines: Vec::new(),
            walking: Vec::new(),
        }
    }

    /// Skip buffers whose far end is missing or not bound to a pipeline.
    pub fn skip_incomplete(mut self, skip: bool) -> Self {
        self.skip_incomplete = skip;
        self
    }

    /// The graph being walked.
    #[inline]
    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    /// Adds `pipeline` to the accumulator, once, keeping first-seen order.
    pub fn record_pipeline(&mut self, pipeline: PipelineId) {
        if !self.pipelines.contains(&pipeline) {
            self.pipelines.push(pipeline);
        }
    }

    /// Pipelines recorded so far, in the order they were first touched.
    pub fn pipelines(&self) -> &[PipelineId] {
        &self.pipelines
    }

    /// Consumes the context, returning the recorded pipelines.
    pub fn into_pipelines(self) -> Vec<PipelineId> {
        self.pipelines
    }
}

/// The function a walk applies at each component.
pub trait Visitor {
    /// Visits `current`, reached through `calling` (`None` for the start).
    ///
    /// Call [`for_each_connected`] to continue past this component.
    fn visit(
        &mut self,
        ctx: &mut WalkContext<'_>,
        current: ComponentId,
        calling: Option<BufferId>,
        dir: WalkDirection,
    ) -> Result<Status>;

    /// Called for every buffer the walk is about to cross, before its far
    /// end is checked.
    fn visit_buffer(&mut self, ctx: &mut WalkContext<'_>, buffer: &RingBuffer, dir: WalkDirection) {
        let _ = (ctx, buffer, dir);
    }
}

/// Starts a walk at `start`.
pub fn walk<V: Visitor + ?Sized>(
    visitor: &mut V,
    ctx: &mut WalkContext<'_>,
    start: ComponentId,
    dir: WalkDirection,
) -> Result<Status> {
    visitor.visit(ctx, start, None, dir)
}

/// Visits every component connected to `current` in direction `dir`.
///
/// Buffers already being traversed by this walk are skipped. A buffer whose
/// far end is unwired is skipped when the context skips incomplete branches;
/// otherwise a missing far end is [`Error::InvalidArgument`] and an unbound
/// one is visited anyway.
pub fn for_each_connected<V: Visitor + ?Sized>(
    visitor: &mut V,
    ctx: &mut WalkContext<'_>,
    current: ComponentId,
    dir: WalkDirection,
) -> Result<Status> {
    let graph = ctx.graph;
    let node = graph.node(current)?;
    let list = match dir {
        WalkDirection::Downstream => node.sinks(),
        WalkDirection::Upstream => node.sources(),
    };

    for &buf_id in list {
        if ctx.walking.contains(&buf_id) {
            continue;
        }
        let buffer = graph.get_buffer(buf_id)?;
        visitor.visit_buffer(ctx, buffer, dir);

        let far = match dir {
            WalkDirection::Downstream => buffer.sink(),
            WalkDirection::Upstream => buffer.source(),
        };
        let Some(far) = far else {
            if ctx.skip_incomplete {
                continue;
            }
            tracing::error!("pipeline_for_each_comp: {buf_id} has no far end");
            return Err(Error::InvalidArgument);
        };
        if ctx.skip_incomplete && graph.node(far)?.pipeline().is_none() {
            tracing::trace!("pipeline_for_each_comp: {far} is not wired, skipping");
            continue;
        }

        ctx.walking.push(buf_id);
        let result = visitor.visit(ctx, far, Some(buf_id), dir);
        ctx.walking.pop();

        match result {
            Ok(Status::Continue) => {}
            other => return other,
        }
    }
    Ok(Status::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MemCaps;
    use crate::component::drivers::EffectDriver;
    use crate::component::Component;
    use crate::pipeline::PipelineConfig;

    /// Records visit order and recurses everywhere.
    struct Collect(Vec<ComponentId>);

    impl Visitor for Collect {
        fn visit(
            &mut self,
            ctx: &mut WalkContext<'_>,
            current: ComponentId,
            _calling: Option<BufferId>,
            dir: WalkDirection,
        ) -> Result<Status> {
            self.0.push(current);
            for_each_connected(self, ctx, current, dir)
        }
    }

    fn graph_with(edges: &[(u32, u32, u32)], nodes: u32) -> Graph {
        let mut graph = Graph::new();
        let p = graph.add_pipeline(PipelineConfig::new(PipelineId(1))).unwrap();
        for id in 1..=nodes {
            let comp = Component::new(ComponentId(id), Direction::Playback, Box::new(EffectDriver::new()));
            graph.add_component(p, comp).unwrap();
        }
        for &(from, buf, to) in edges {
            graph.add_buffer(BufferId(buf), 16, MemCaps::RAM, 0).unwrap();
            graph
                .connect(ComponentId(from), BufferId(buf), ComponentId(to))
                .unwrap();
        }
        graph
    }

    fn order(graph: &Graph, start: u32, dir: WalkDirection) -> Vec<u32> {
        let mut visitor = Collect(Vec::new());
        let mut ctx = WalkContext::new(graph);
        walk(&mut visitor, &mut ctx, ComponentId(start), dir).unwrap();
        visitor.0.iter().map(|c| c.0).collect()
    }

    #[test]
    fn linear_chain_both_directions() {
        let graph = graph_with(&[(1, 10, 2), (2, 11, 3)], 3);
        assert_eq!(order(&graph, 1, WalkDirection::Downstream), vec![1, 2, 3]);
        assert_eq!(order(&graph, 3, WalkDirection::Upstream), vec![3, 2, 1]);
    }

    #[test]
    fn fan_out_follows_connection_order() {
        let graph = graph_with(&[(1, 10, 3), (1, 11, 2)], 3);
        assert_eq!(order(&graph, 1, WalkDirection::Downstream), vec![1, 3, 2]);
    }

    #[test]
    fn cycle_is_cut_by_walking_stack() {
        let graph = graph_with(&[(1, 10, 2), (2, 11, 1)], 2);
        assert_eq!(order(&graph, 1, WalkDirection::Downstream), vec![1, 2, 1]);
    }

    #[test]
    fn skip_incomplete_ignores_unbound_far_ends() {
        let graph = graph_with(&[(1, 10, 2)], 2);
        let mut visitor = Collect(Vec::new());
        let mut ctx = WalkContext::new(&graph).skip_incomplete(true);
        walk(&mut visitor, &mut ctx, ComponentId(1), WalkDirection::Downstream).unwrap();
        assert_eq!(visitor.0, vec![ComponentId(1)]);
    }

    #[test]
    fn missing_far_end_is_an_error_unless_skipped() {
        let mut graph = graph_with(&[], 1);
        graph.add_buffer(BufferId(7), 16, MemCaps::RAM, 0).unwrap();
        graph.attach_producer(BufferId(7), ComponentId(1)).unwrap();

        let mut visitor = Collect(Vec::new());
        let mut ctx = WalkContext::new(&graph);
        let result = walk(&mut visitor, &mut ctx, ComponentId(1), WalkDirection::Downstream);
        assert_eq!(result, Err(Error::InvalidArgument));

        let mut ctx = WalkContext::new(&graph).skip_incomplete(true);
        let result = walk(&mut visitor, &mut ctx, ComponentId(1), WalkDirection::Downstream);
        assert_eq!(result, Ok(Status::Continue));
    }

    #[test]
    fn path_stop_unwinds_siblings() {
        struct StopAt(ComponentId, Vec<ComponentId>);
        impl Visitor for StopAt {
            fn visit(
                &mut self,
                ctx: &mut WalkContext<'_>,
                current: ComponentId,
                _calling: Option<BufferId>,
                dir: WalkDirection,
            ) -> Result<Status> {
                self.1.push(current);
                if current == self.0 {
                    return Ok(Status::PathStop);
                }
                for_each_connected(self, ctx, current, dir)
            }
        }

        let graph = graph_with(&[(1, 10, 2), (1, 11, 3)], 3);
        let mut visitor = StopAt(ComponentId(2), Vec::new());
        let mut ctx = WalkContext::new(&graph);
        let status = walk(&mut visitor, &mut ctx, ComponentId(1), WalkDirection::Downstream).unwrap();
        assert_eq!(status, Status::PathStop);
        assert_eq!(visitor.1, vec![ComponentId(1), ComponentId(2)]);
    }

    #[test]
    fn record_pipeline_deduplicates() {
        let graph = Graph::new();
        let mut ctx = WalkContext::new(&graph);
        ctx.record_pipeline(PipelineId(2));
        ctx.record_pipeline(PipelineId(1));
        ctx.record_pipeline(PipelineId(2));
        assert_eq!(ctx.pipelines(), &[PipelineId(2), PipelineId(1)]);
    }
}
