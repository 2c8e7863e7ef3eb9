//! Central registry for components, buffers and pipelines, plus the walker.
//!
//! Components and buffers refer to each other only by id: a buffer records its
//! producing (`source`) and consuming (`sink`) component, a component records
//! the buffers it consumes from and produces to. All lookups go through the
//! [`Graph`], so there is no ownership cycle.
//!
//! Storage is one `BTreeMap` per table keyed by id, so iteration is in id
//! order and any `u32` id is accepted without reserving space for the ids
//! below it.
//!
//! # Sharing
//!
//! Walks only need `&Graph`; component state and buffer accounting have
//! their own locks. Topology edits need `&mut Graph`. A runtime shares the
//! graph as `Arc<RwLock<Graph>>`, taking the read lock for trigger/copy and
//! the write lock for edits, which keeps topology immutable for the duration
//! of any walk.
//!
//! # Example
//!
//! ```rust
//! use cadence_core::component::{Component, ComponentId, Direction};
//! use cadence_core::component::drivers::{DaiDriver, HostDriver};
//! use cadence_core::graph::Graph;
//! use cadence_core::pipeline::{PipelineConfig, PipelineId};
//! use cadence_core::{BufferId, MemCaps};
//!
//! let mut graph = Graph::new();
//! let p = graph.add_pipeline(PipelineConfig::new(PipelineId(1))).unwrap();
//! let host = graph
//!     .add_component(p, Component::new(ComponentId(1), Direction::Playback, Box::new(HostDriver::new(Direction::Playback))))
//!     .unwrap();
//! let dai = graph
//!     .add_component(p, Component::new(ComponentId(2), Direction::Playback, Box::new(DaiDriver::new(Direction::Playback))))
//!     .unwrap();
//! let buf = graph.add_buffer(BufferId(1), 384, MemCaps::RAM, 0).unwrap();
//! graph.connect(host, buf, dai).unwrap();
//!
//! assert_eq!(graph.buffer(buf).unwrap().source(), Some(host));
//! assert_eq!(graph.component(dai).unwrap().sources(), &[buf]);
//! ```

mod node;
pub mod walk;

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use crate::buffer::{BufferId, MemCaps, MemoryPool, RingBuffer, UnboundedPool};
use crate::component::{Component, ComponentId, ComponentState, Ports};
use crate::error::{Error, Result};
use crate::pipeline::{Pipeline, PipelineConfig, PipelineId};

pub use node::ComponentNode;
pub use walk::{Visitor, WalkContext, WalkDirection, for_each_connected, walk};

/// Registry of everything a firmware instance runs.
pub struct Graph {
    components: BTreeMap<ComponentId, ComponentNode>,
    buffers: BTreeMap<BufferId, RingBuffer>,
    pipelines: BTreeMap<PipelineId, Pipeline>,
    pool: Arc<dyn MemoryPool>,
}

impl Graph {
    /// Creates an empty graph whose buffers never run out of memory.
    pub fn new() -> Self {
        Self::with_pool(Arc::new(UnboundedPool))
    }

    /// Creates an empty graph allocating buffers from `pool`.
    pub fn with_pool(pool: Arc<dyn MemoryPool>) -> Self {
        Self {
            components: BTreeMap::new(),
            buffers: BTreeMap::new(),
            pipelines: BTreeMap::new(),
            pool,
        }
    }

    /// The pool buffers are allocated from.
    pub fn pool(&self) -> &Arc<dyn MemoryPool> {
        &self.pool
    }

    // --- Pipelines ---

    /// Registers a pipeline. It stays in INIT until [`complete`](crate::pipeline::complete).
    pub fn add_pipeline(&mut self, config: PipelineConfig) -> Result<PipelineId> {
        let id = config.id;
        if config.period_us == 0 {
            tracing::error!("pipeline_new: {id} has a zero period");
            return Err(Error::InvalidArgument);
        }
        let Entry::Vacant(entry) = self.pipelines.entry(id) else {
            tracing::error!("pipeline_new: {id} already exists");
            return Err(Error::InvalidArgument);
        };
        entry.insert(Pipeline::new(config));
        tracing::debug!("pipeline_new: {id}");
        Ok(id)
    }

    /// Looks up a pipeline.
    pub fn pipeline(&self, id: PipelineId) -> Option<&Pipeline> {
        self.pipelines.get(&id)
    }

    /// Looks up a pipeline, failing with [`Error::PipelineNotFound`].
    pub fn get_pipeline(&self, id: PipelineId) -> Result<&Pipeline> {
        self.pipeline(id).ok_or(Error::PipelineNotFound(id))
    }

    pub(crate) fn pipeline_mut(&mut self, id: PipelineId) -> Result<&mut Pipeline> {
        self.pipelines
            .get_mut(&id)
            .ok_or(Error::PipelineNotFound(id))
    }

    /// All registered pipelines in id order.
    pub fn pipelines(&self) -> impl Iterator<Item = &Pipeline> {
        self.pipelines.values()
    }

    /// Number of registered pipelines.
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Tears a pipeline down: frees its components, then every buffer left
    /// with no endpoint.
    ///
    /// Fails with [`Error::Busy`] while the pipeline is ACTIVE.
    pub fn free_pipeline(&mut self, id: PipelineId) -> Result<()> {
        let status = self.get_pipeline(id)?.status();
        if status == ComponentState::Active {
            tracing::error!("pipeline_free: {id} is still active");
            return Err(Error::Busy);
        }

        let members: Vec<ComponentId> = self
            .components()
            .filter(|node| node.pipeline_id() == id)
            .map(ComponentNode::id)
            .collect();
        for comp in members {
            self.free_component(comp)?;
        }

        let orphans: Vec<BufferId> = self
            .buffers()
            .filter(|buf| buf.source().is_none() && buf.sink().is_none())
            .map(RingBuffer::id)
            .collect();
        for buf in orphans {
            self.free_buffer(buf)?;
        }

        self.pipelines.remove(&id);
        tracing::debug!("pipeline_free: {id}");
        Ok(())
    }

    // --- Components ---

    /// Registers `component` as a member of `pipeline`.
    pub fn add_component(&mut self, pipeline: PipelineId, component: Component) -> Result<ComponentId> {
        self.get_pipeline(pipeline)?;
        let id = component.id();
        let Entry::Vacant(entry) = self.components.entry(id) else {
            tracing::error!("comp_new: {id} already exists");
            return Err(Error::InvalidArgument);
        };
        tracing::debug!("comp_new: {id} ({}) in {pipeline}", component.kind());
        entry.insert(ComponentNode::new(component, pipeline));
        Ok(id)
    }

    /// Looks up a component.
    pub fn component(&self, id: ComponentId) -> Option<&ComponentNode> {
        self.components.get(&id)
    }

    /// Looks up a component, failing with [`Error::ComponentNotFound`].
    pub fn node(&self, id: ComponentId) -> Result<&ComponentNode> {
        self.component(id).ok_or(Error::ComponentNotFound(id))
    }

    /// Mutable component lookup.
    pub fn node_mut(&mut self, id: ComponentId) -> Result<&mut ComponentNode> {
        self.components
            .get_mut(&id)
            .ok_or(Error::ComponentNotFound(id))
    }

    /// All registered components in id order.
    pub fn components(&self) -> impl Iterator<Item = &ComponentNode> {
        self.components.values()
    }

    /// Removes a component, unlinking it from every buffer it touches.
    ///
    /// Fails with [`Error::Busy`] while the component is ACTIVE or PAUSED.
    pub fn free_component(&mut self, id: ComponentId) -> Result<()> {
        let node = self.node(id)?;
        if matches!(node.state(), ComponentState::Active | ComponentState::Paused) {
            tracing::error!("comp_free: {id} is still running");
            return Err(Error::Busy);
        }
        let sources = node.sources.clone();
        let sinks = node.sinks.clone();

        for buf in sources {
            if let Some(buffer) = self.buffer_mut(buf) {
                buffer.sink = None;
            }
        }
        for buf in sinks {
            if let Some(buffer) = self.buffer_mut(buf) {
                buffer.source = None;
            }
        }
        self.components.remove(&id);
        tracing::debug!("comp_free: {id}");
        Ok(())
    }

    /// Ports of `node` for a driver call.
    pub fn ports<'a>(&'a self, node: &'a ComponentNode) -> Ports<'a> {
        Ports::new(self, &node.sources, &node.sinks)
    }

    // --- Buffers ---

    /// Allocates a buffer from the graph's pool and registers it.
    pub fn add_buffer(&mut self, id: BufferId, size: usize, caps: MemCaps, align: usize) -> Result<BufferId> {
        if self.buffer(id).is_some() {
            tracing::error!("buffer_new: {id} already exists");
            return Err(Error::InvalidArgument);
        }
        let buffer = RingBuffer::alloc(id, size, caps, align, Arc::clone(&self.pool))?;
        self.buffers.insert(id, buffer);
        Ok(id)
    }

    /// Registers an already allocated buffer, for instance one from
    /// [`RingBuffer::alloc_range`]. The buffer must be unconnected.
    pub fn insert_buffer(&mut self, buffer: RingBuffer) -> Result<BufferId> {
        let id = buffer.id();
        if buffer.source().is_some() || buffer.sink().is_some() {
            return Err(Error::InvalidArgument);
        }
        let Entry::Vacant(entry) = self.buffers.entry(id) else {
            tracing::error!("buffer_new: {id} already exists");
            return Err(Error::InvalidArgument);
        };
        entry.insert(buffer);
        Ok(id)
    }

    /// Looks up a buffer.
    pub fn buffer(&self, id: BufferId) -> Option<&RingBuffer> {
        self.buffers.get(&id)
    }

    /// Looks up a buffer, failing with [`Error::BufferNotFound`].
    pub fn get_buffer(&self, id: BufferId) -> Result<&RingBuffer> {
        self.buffer(id).ok_or(Error::BufferNotFound(id))
    }

    /// Mutable buffer lookup, for callback and flag registration.
    pub fn buffer_mut(&mut self, id: BufferId) -> Option<&mut RingBuffer> {
        self.buffers.get_mut(&id)
    }

    /// All registered buffers in id order.
    pub fn buffers(&self) -> impl Iterator<Item = &RingBuffer> {
        self.buffers.values()
    }

    /// Makes `comp` the producer of `buffer`.
    ///
    /// Fails with [`Error::Busy`] if the buffer already has a producer.
    pub fn attach_producer(&mut self, buffer: BufferId, comp: ComponentId) -> Result<()> {
        self.node(comp)?;
        let buf = self.buffer_mut(buffer).ok_or(Error::BufferNotFound(buffer))?;
        if buf.source.is_some() {
            tracing::error!("buffer_connect: {buffer} already has a producer");
            return Err(Error::Busy);
        }
        buf.source = Some(comp);
        self.node_mut(comp)?.sinks.push(buffer);
        tracing::debug!("buffer_connect: {comp} → {buffer}");
        Ok(())
    }

    /// Makes `comp` the consumer of `buffer`.
    ///
    /// Fails with [`Error::Busy`] if the buffer already has a consumer.
    pub fn attach_consumer(&mut self, buffer: BufferId, comp: ComponentId) -> Result<()> {
        self.node(comp)?;
        let buf = self.buffer_mut(buffer).ok_or(Error::BufferNotFound(buffer))?;
        if buf.sink.is_some() {
            tracing::error!("buffer_connect: {buffer} already has a consumer");
            return Err(Error::Busy);
        }
        buf.sink = Some(comp);
        self.node_mut(comp)?.sources.push(buffer);
        tracing::debug!("buffer_connect: {buffer} → {comp}");
        Ok(())
    }

    /// Wires `from → buffer → to`.
    pub fn connect(&mut self, from: ComponentId, buffer: BufferId, to: ComponentId) -> Result<()> {
        self.node(to)?;
        self.attach_producer(buffer, from)?;
        self.attach_consumer(buffer, to)
    }

    /// Unlinks `buffer` from both endpoints' membership lists.
    pub fn disconnect(&mut self, buffer: BufferId) -> Result<()> {
        let buf = self.buffer_mut(buffer).ok_or(Error::BufferNotFound(buffer))?;
        let (source, sink) = (buf.source.take(), buf.sink.take());
        if let Some(node) = source.and_then(|id| self.node_mut(id).ok()) {
            node.sinks.retain(|&b| b != buffer);
        }
        if let Some(node) = sink.and_then(|id| self.node_mut(id).ok()) {
            node.sources.retain(|&b| b != buffer);
        }
        tracing::debug!("buffer_disconnect: {buffer}");
        Ok(())
    }

    /// Unlinks and releases a buffer, returning its memory to the pool.
    pub fn free_buffer(&mut self, id: BufferId) -> Result<()> {
        self.disconnect(id)?;
        self.buffers.remove(&id);
        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Graph {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Graph")
            .field("components", &self.components().count())
            .field("buffers", &self.buffers().count())
            .field("pipelines", &self.pipeline_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::HeapPool;
    use crate::component::Direction;
    use crate::component::drivers::EffectDriver;

    fn effect(id: u32) -> Component {
        Component::new(ComponentId(id), Direction::Playback, Box::new(EffectDriver::new()))
    }

    #[test]
    fn extreme_ids_are_sparse() {
        let mut graph = Graph::new();
        let p = graph.add_pipeline(PipelineConfig::new(PipelineId(u32::MAX))).unwrap();
        let comp = graph.add_component(p, effect(u32::MAX - 1)).unwrap();
        let buf = graph.add_buffer(BufferId(u32::MAX), 64, MemCaps::RAM, 0).unwrap();
        graph.attach_producer(buf, comp).unwrap();

        assert_eq!(graph.pipeline_count(), 1);
        assert_eq!(graph.node(comp).unwrap().sinks(), &[buf]);
        assert_eq!(
            graph.add_pipeline(PipelineConfig::new(PipelineId(u32::MAX))),
            Err(Error::InvalidArgument)
        );

        let low = graph.add_pipeline(PipelineConfig::new(PipelineId(0))).unwrap();
        let ids: Vec<PipelineId> = graph.pipelines().map(Pipeline::id).collect();
        assert_eq!(ids, [low, p]);
    }

    fn two_node_graph() -> (Graph, ComponentId, BufferId, ComponentId) {
        let mut graph = Graph::new();
        let p = graph.add_pipeline(PipelineConfig::new(PipelineId(1))).unwrap();
        let a = graph.add_component(p, effect(1)).unwrap();
        let b = graph.add_component(p, effect(2)).unwrap();
        let buf = graph.add_buffer(BufferId(5), 64, MemCaps::RAM, 0).unwrap();
        graph.connect(a, buf, b).unwrap();
        (graph, a, buf, b)
    }

    #[test]
    fn connect_updates_both_sides() {
        let (graph, a, buf, b) = two_node_graph();
        assert_eq!(graph.component(a).unwrap().sinks(), &[buf]);
        assert_eq!(graph.component(b).unwrap().sources(), &[buf]);
        let buffer = graph.buffer(buf).unwrap();
        assert_eq!((buffer.source(), buffer.sink()), (Some(a), Some(b)));
    }

    #[test]
    fn second_producer_is_busy() {
        let (mut graph, _, buf, b) = two_node_graph();
        assert_eq!(graph.attach_producer(buf, b), Err(Error::Busy));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let (mut graph, ..) = two_node_graph();
        assert_eq!(
            graph.add_pipeline(PipelineConfig::new(PipelineId(1))),
            Err(Error::InvalidArgument)
        );
        assert_eq!(graph.add_component(PipelineId(1), effect(1)), Err(Error::InvalidArgument));
        assert_eq!(
            graph.add_buffer(BufferId(5), 8, MemCaps::RAM, 0),
            Err(Error::InvalidArgument)
        );
    }

    #[test]
    fn unknown_pipeline_is_reported() {
        let mut graph = Graph::new();
        assert_eq!(
            graph.add_component(PipelineId(9), effect(1)),
            Err(Error::PipelineNotFound(PipelineId(9)))
        );
    }

    #[test]
    fn free_buffer_unlinks_membership() {
        let (mut graph, a, buf, b) = two_node_graph();
        graph.free_buffer(buf).unwrap();
        assert!(graph.buffer(buf).is_none());
        assert!(graph.component(a).unwrap().sinks().is_empty());
        assert!(graph.component(b).unwrap().sources().is_empty());
    }

    #[test]
    fn free_pipeline_returns_memory() {
        let pool = Arc::new(HeapPool::new().with_zone(MemCaps::RAM, 1 << 16));
        let mut graph = Graph::with_pool(pool.clone());
        let p = graph.add_pipeline(PipelineConfig::new(PipelineId(1))).unwrap();
        let a = graph.add_component(p, effect(1)).unwrap();
        let b = graph.add_component(p, effect(2)).unwrap();
        let buf = graph.add_buffer(BufferId(1), 128, MemCaps::RAM, 0).unwrap();
        graph.connect(a, buf, b).unwrap();
        assert!(pool.used() > 0);

        graph.free_pipeline(p).unwrap();
        assert_eq!(pool.used(), 0);
        assert_eq!(graph.components().count(), 0);
        assert!(graph.pipeline(p).is_none());
    }

    #[test]
    fn zero_period_is_invalid() {
        let mut graph = Graph::new();
        let config = PipelineConfig::new(PipelineId(2)).period_us(0);
        assert_eq!(graph.add_pipeline(config), Err(Error::InvalidArgument));
    }
}
