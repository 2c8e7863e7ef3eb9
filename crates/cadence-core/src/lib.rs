//! Cadence Core - audio pipeline graph for DSP firmware
//!
//! This crate holds the data-plane core of an audio DSP: the ring buffers that
//! connect components, the component graph and its walker, and the pipeline
//! operations that propagate state changes and move one period of audio.
//!
//! # Core Abstractions
//!
//! ## Buffers
//!
//! - [`RingBuffer`] - Fixed-capacity circular byte buffer, one producer, one consumer
//! - [`MemoryPool`] - Zone allocator seam ([`HeapPool`] with byte budgets, [`UnboundedPool`])
//! - [`MemCaps`] - Memory capability flags a buffer is allocated with
//!
//! ## Components
//!
//! - [`Component`] - Lifecycle state plus a boxed [`ComponentDriver`]
//! - [`TriggerCmd`] / [`ComponentState`] - Command set and the fixed transition table
//! - [`component::drivers`] - Reference host, DAI, effect, mixer and tone drivers
//!
//! ## Graph
//!
//! - [`Graph`] - Id-indexed registry of components, buffers and pipelines
//! - [`walk`] / [`Visitor`] - Generic depth-first traversal over buffer edges
//!
//! ## Pipelines
//!
//! - [`pipeline::complete`], [`pipeline::params`], [`pipeline::prepare`], [`pipeline::reset`]
//! - [`pipeline::trigger`] - State-change propagation and schedule bookkeeping
//! - [`pipeline::copy`] - One period's data movement
//! - [`pipeline::get_timestamp`], [`pipeline::report_xrun`]
//!
//! # Results
//!
//! Operations return [`Result<Status>`](Result). [`Status::PathStop`] halts a
//! walk early but is a success; [`Error`] values carry the numeric code handed
//! back to the host via [`Error::errno`].
//!
//! # Example
//!
//! ```rust
//! use cadence_core::component::drivers::{DaiDriver, HostDriver};
//! use cadence_core::pipeline::{self, PipelineConfig, PipelineScheduler, ScheduleOrder};
//! use cadence_core::{
//!     BufferId, Component, ComponentId, Direction, Graph, MemCaps, Pipeline, PipelineId,
//!     Result, StreamParams, TriggerCmd,
//! };
//!
//! struct Manual;
//!
//! impl PipelineScheduler for Manual {
//!     fn schedule(&self, _: &Pipeline, _: ScheduleOrder) -> Result<()> {
//!         Ok(())
//!     }
//!     fn cancel(&self, _: PipelineId) {}
//!     fn is_scheduled(&self, _: PipelineId) -> bool {
//!         false
//!     }
//! }
//!
//! let mut graph = Graph::new();
//! let p = graph.add_pipeline(PipelineConfig::new(PipelineId(1))).unwrap();
//! let host = graph
//!     .add_component(p, Component::new(ComponentId(1), Direction::Playback, Box::new(HostDriver::new(Direction::Playback))))
//!     .unwrap();
//! let dai = graph
//!     .add_component(p, Component::new(ComponentId(2), Direction::Playback, Box::new(DaiDriver::new(Direction::Playback))))
//!     .unwrap();
//! let buf = graph.add_buffer(BufferId(1), 768, MemCaps::RAM, 0).unwrap();
//! graph.connect(host, buf, dai).unwrap();
//!
//! pipeline::complete(&mut graph, p, host, dai).unwrap();
//! pipeline::params(&graph, p, host, &StreamParams::default()).unwrap();
//! pipeline::prepare(&graph, p, host).unwrap();
//! pipeline::trigger(&graph, &Manual, p, host, TriggerCmd::Start).unwrap();
//!
//! // Host fills one period, DAI drains it.
//! pipeline::copy(&graph, p).unwrap();
//! assert_eq!(graph.buffer(buf).unwrap().avail(), 0);
//! ```

pub mod buffer;
pub mod component;
pub mod error;
pub mod graph;
pub mod pipeline;

// Re-export main types at crate root
pub use buffer::{
    BufferId, HeapPool, MAX_BUFFER_SIZE, MemCaps, MemoryPool, RingBuffer, StreamParams,
    UnboundedPool, copy_bytes,
};
pub use component::{
    Component, ComponentDriver, ComponentId, ComponentKind, ComponentState, ControlCmd, Direction,
    Ports, TriggerCmd,
};
pub use error::{Error, Result, Status, status_code};
pub use graph::{Graph, Visitor, WalkContext, WalkDirection, for_each_connected, walk};
pub use pipeline::{
    Pipeline, PipelineConfig, PipelineId, PipelineScheduler, ScheduleOrder, StreamPosition,
};
