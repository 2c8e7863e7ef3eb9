//! Turns a validated [`Topology`] into a live [`Graph`].

use std::sync::Arc;

use cadence_core::{
    BufferId, Component, ComponentId, Graph, HeapPool, MemCaps, MemoryPool, PipelineConfig, PipelineId,
    UnboundedPool, pipeline,
};

use crate::drivers::{DriverArgs, DriverRegistry};
use crate::error::ConfigError;
use crate::topology::Topology;
use crate::validation::{ValidationError, validate_topology};

/// Memory pool for the `[memory]` table: unbounded when empty, otherwise one
/// zone per capability.
pub fn memory_pool(topology: &Topology) -> Result<Arc<dyn MemoryPool>, ConfigError> {
    if topology.memory.is_empty() {
        return Ok(Arc::new(UnboundedPool));
    }
    let mut pool = HeapPool::new();
    for (name, &bytes) in &topology.memory {
        let caps = MemCaps::from_name(name).ok_or_else(|| ValidationError::UnknownCaps {
            owner: "memory".to_string(),
            name: name.clone(),
        })?;
        pool = pool.with_zone(caps, bytes);
    }
    Ok(Arc::new(pool))
}

/// Validates `topology` and creates its pipelines, components and buffers.
///
/// Pipelines are left in INIT; see [`complete_pipelines`].
pub fn build_graph(topology: &Topology, drivers: &DriverRegistry) -> Result<Graph, ConfigError> {
    validate_topology(topology, drivers)?;
    let mut graph = Graph::with_pool(memory_pool(topology)?);

    for p in &topology.pipelines {
        let mut config = PipelineConfig::new(PipelineId(p.id))
            .direction(p.direction.into())
            .period_us(p.period_us)
            .priority(p.priority)
            .core(p.core);
        if let Some(comp) = p.sched_comp {
            config = config.sched_comp(ComponentId(comp));
        }
        graph
            .add_pipeline(config)
            .map_err(|e| ConfigError::build(format!("pipeline {}", p.id), e))?;
    }

    for c in &topology.components {
        let what = || format!("component {}", c.id);
        let args = DriverArgs {
            direction: topology.component_direction(c).into(),
            params: &c.params,
        };
        let driver = drivers.create(&c.kind, &args).ok_or_else(|| ValidationError::UnknownDriver {
            component: c.id,
            kind: c.kind.clone(),
        })?;
        let component = Component::new(ComponentId(c.id), args.direction, driver);
        graph
            .add_component(PipelineId(c.pipeline), component)
            .map_err(|e| ConfigError::build(what(), e))?;
    }

    for b in &topology.buffers {
        let what = || format!("buffer {}", b.id);
        let caps = b.mem_caps().unwrap_or_default();
        let id = graph
            .add_buffer(BufferId(b.id), b.size, caps, b.align)
            .map_err(|e| ConfigError::build(what(), e))?;
        graph
            .connect(ComponentId(b.source), id, ComponentId(b.sink))
            .map_err(|e| ConfigError::build(what(), e))?;
    }

    tracing::info!(
        "topology: built {} pipelines, {} components, {} buffers",
        topology.pipelines.len(),
        topology.components.len(),
        topology.buffers.len()
    );
    Ok(graph)
}

/// Records the declared boundaries of every pipeline.
pub fn complete_pipelines(topology: &Topology, graph: &mut Graph) -> Result<(), ConfigError> {
    for p in &topology.pipelines {
        pipeline::complete(graph, PipelineId(p.id), ComponentId(p.source), ComponentId(p.sink))
            .map_err(|e| ConfigError::build(format!("pipeline {}", p.id), e))?;
    }
    Ok(())
}

impl Topology {
    /// Builds and completes the graph with the reference drivers.
    pub fn build(&self) -> Result<Graph, ConfigError> {
        self.build_with(&DriverRegistry::new())
    }

    /// Builds and completes the graph with `drivers`.
    pub fn build_with(&self, drivers: &DriverRegistry) -> Result<Graph, ConfigError> {
        let mut graph = build_graph(self, drivers)?;
        complete_pipelines(self, &mut graph)?;
        Ok(graph)
    }
}
