//! Topology files for the cadence pipeline core.
//!
//! A topology describes what a firmware instance runs: the scheduling domain,
//! heap budgets, pipelines, components and the buffers between them. This
//! crate reads and writes topology TOML, validates it, and builds a
//! [`Graph`](cadence_core::Graph) from it.
//!
//! # Features
//!
//! - **Topology format**: [`Topology`] with `[scheduler]`, `[memory]`,
//!   `[[pipeline]]`, `[[component]]` and `[[buffer]]` tables
//! - **Validation**: [`validate_topology`] reports every problem at once
//! - **Drivers**: [`DriverRegistry`] maps component kinds to constructors
//! - **Building**: [`build_graph`] and [`Topology::build`]
//!
//! # Example
//!
//! ```rust,no_run
//! use cadence_config::Topology;
//!
//! let topology = Topology::load("playback.toml").unwrap();
//! let graph = topology.build().unwrap();
//! println!("{} pipelines", graph.pipeline_count());
//! ```

mod builder;
mod drivers;
mod error;
mod topology;

/// Topology validation.
pub mod validation;

pub use builder::{build_graph, complete_pipelines, memory_pool};
pub use drivers::{DriverArgs, DriverCtor, DriverDescriptor, DriverRegistry};
pub use error::ConfigError;
pub use topology::{
    BufferEntry, ComponentEntry, PipelineEntry, SchedulerSection, StreamDirection, Topology,
};
pub use validation::{ValidationError, ValidationResult, validate_topology};
