//! Registry entry for a component.
//!
//! A [`ComponentNode`] holds the component behind its own lock plus the
//! identity-based adjacency lists: ids of the buffers it consumes from
//! (`sources`, upstream) and produces to (`sinks`, downstream). The lists
//! only change under the graph's write access; the component state changes
//! under the node lock during walks.

use parking_lot::{Mutex, MutexGuard};

use crate::buffer::BufferId;
use crate::component::{Component, ComponentId, ComponentKind, ComponentState, Direction};
use crate::pipeline::PipelineId;

/// A component plus its graph bookkeeping.
pub struct ComponentNode {
    id: ComponentId,
    kind: ComponentKind,
    direction: Direction,
    pipeline_id: PipelineId,
    /// Set once the owning pipeline is completed. Until then the node counts
    /// as unwired for walks that skip incomplete branches.
    pub(crate) pipeline: Option<PipelineId>,
    /// Buffers this component consumes from.
    pub(crate) sources: Vec<BufferId>,
    /// Buffers this component produces to.
    pub(crate) sinks: Vec<BufferId>,
    component: Mutex<Component>,
}

impl ComponentNode {
    pub(crate) fn new(component: Component, pipeline_id: PipelineId) -> Self {
        Self {
            id: component.id(),
            kind: component.kind(),
            direction: component.direction(),
            pipeline_id,
            pipeline: None,
            sources: Vec::new(),
            sinks: Vec::new(),
            component: Mutex::new(component),
        }
    }

    /// Component identifier.
    #[inline]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Driver capability class.
    #[inline]
    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// Stream direction.
    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Pipeline the component was created in.
    #[inline]
    pub fn pipeline_id(&self) -> PipelineId {
        self.pipeline_id
    }

    /// Pipeline the component is bound to, once completed.
    #[inline]
    pub fn pipeline(&self) -> Option<PipelineId> {
        self.pipeline
    }

    /// Buffers consumed from, in connection order.
    #[inline]
    pub fn sources(&self) -> &[BufferId] {
        &self.sources
    }

    /// Buffers produced to, in connection order.
    #[inline]
    pub fn sinks(&self) -> &[BufferId] {
        &self.sinks
    }

    /// Locks the component for a driver call.
    ///
    /// Never hold the guard across a recursive walk step.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, Component> {
        self.component.lock()
    }

    /// Snapshot of the component state.
    pub fn state(&self) -> ComponentState {
        self.component.lock().state()
    }

    /// Mutable access without locking, for callers holding the graph exclusively.
    pub fn component_mut(&mut self) -> &mut Component {
        self.component.get_mut()
    }
}

impl core::fmt::Debug for ComponentNode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ComponentNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("pipeline_id", &self.pipeline_id)
            .field("pipeline", &self.pipeline)
            .field("sources", &self.sources)
            .field("sinks", &self.sinks)
            .finish_non_exhaustive()
    }
}
