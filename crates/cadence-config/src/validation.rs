//! Topology validation.
//!
//! Checks a [`Topology`] for everything the graph builder would otherwise
//! trip over halfway through: duplicate ids, references to things that do not
//! exist, zero sizes and periods, cores outside the scheduler's range. Every
//! problem is collected so one run reports them all.
//!
//! # Example
//!
//! ```rust
//! use cadence_config::{DriverRegistry, Topology, validate_topology};
//!
//! let topology = Topology::default();
//! validate_topology(&topology, &DriverRegistry::new()).expect("an empty topology is valid");
//! ```

use std::collections::BTreeSet;

use cadence_core::MemCaps;
use cadence_sched::MAX_STATS_WINDOW_LOG2;
use thiserror::Error;

use crate::drivers::DriverRegistry;
use crate::topology::Topology;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Two entries of one table share an id.
    #[error("duplicate {table} id {id}")]
    DuplicateId {
        /// Table name (`pipeline`, `component`, `buffer`).
        table: &'static str,
        /// The repeated id.
        id: u32,
    },

    /// A field refers to a component that is not declared.
    #[error("{owner} {field} refers to unknown component {component}")]
    UnknownComponent {
        /// Entry holding the reference, e.g. `buffer 2`.
        owner: String,
        /// Field name.
        field: &'static str,
        /// Missing component id.
        component: u32,
    },

    /// A component names a pipeline that is not declared.
    #[error("component {component} refers to unknown pipeline {pipeline}")]
    UnknownPipeline {
        /// Component id.
        component: u32,
        /// Missing pipeline id.
        pipeline: u32,
    },

    /// No driver with this name is registered.
    #[error("component {component} has unknown kind '{kind}'")]
    UnknownDriver {
        /// Component id.
        component: u32,
        /// Driver name.
        kind: String,
    },

    /// A pipeline boundary belongs to another pipeline.
    #[error("pipeline {pipeline} {field} component {component} belongs to pipeline {owner}")]
    ForeignBoundary {
        /// Pipeline id.
        pipeline: u32,
        /// `source` or `sink`.
        field: &'static str,
        /// Boundary component.
        component: u32,
        /// Pipeline the component actually belongs to.
        owner: u32,
    },

    /// Pipelines need a non-zero period.
    #[error("pipeline {0} has a zero period")]
    ZeroPeriod(u32),

    /// Pipeline core is not below the scheduler's core count.
    #[error("pipeline {pipeline} runs on core {core}, scheduler has {cores}")]
    CoreOutOfRange {
        /// Pipeline id.
        pipeline: u32,
        /// Requested core.
        core: u32,
        /// Configured cores.
        cores: u32,
    },

    /// The scheduler needs at least one core and a non-zero tick.
    #[error("invalid scheduler section: {0}")]
    Scheduler(&'static str),

    /// Buffers need a non-zero size.
    #[error("buffer {0} has zero size")]
    ZeroSize(u32),

    /// Buffer connects a component to itself.
    #[error("buffer {0} connects a component to itself")]
    SelfLoop(u32),

    /// Unknown capability name.
    #[error("unknown memory capability '{name}' in {owner}")]
    UnknownCaps {
        /// `buffer N` or `memory`.
        owner: String,
        /// The unrecognized name.
        name: String,
    },

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

impl ValidationError {
    /// Folds a list of problems into one error, `None` if the list is empty.
    pub fn collect(mut errors: Vec<ValidationError>) -> Option<ValidationError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(ValidationError::Multiple(errors)),
        }
    }

    /// The individual problems, flattening [`ValidationError::Multiple`].
    pub fn errors(&self) -> Vec<&ValidationError> {
        match self {
            ValidationError::Multiple(all) => all.iter().collect(),
            other => vec![other],
        }
    }
}

fn duplicates(table: &'static str, ids: impl Iterator<Item = u32>, errors: &mut Vec<ValidationError>) {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            errors.push(ValidationError::DuplicateId { table, id });
        }
    }
}

/// Checks `topology` against itself and `drivers`.
pub fn validate_topology(topology: &Topology, drivers: &DriverRegistry) -> ValidationResult<()> {
    let mut errors = Vec::new();

    let sched = &topology.scheduler;
    if sched.cores == 0 {
        errors.push(ValidationError::Scheduler("cores must be at least 1"));
    }
    if sched.tick_us == 0 {
        errors.push(ValidationError::Scheduler("tick_us must be non-zero"));
    }
    if sched.stats_window > MAX_STATS_WINDOW_LOG2 {
        errors.push(ValidationError::Scheduler("stats_window must be at most 31"));
    }
    for name in topology.memory.keys() {
        if MemCaps::from_name(name).is_none() {
            errors.push(ValidationError::UnknownCaps {
                owner: "memory".to_string(),
                name: name.clone(),
            });
        }
    }

    duplicates("pipeline", topology.pipelines.iter().map(|p| p.id), &mut errors);
    duplicates("component", topology.components.iter().map(|c| c.id), &mut errors);
    duplicates("buffer", topology.buffers.iter().map(|b| b.id), &mut errors);

    let component_ref = |owner: String, field: &'static str, component: u32, errors: &mut Vec<_>| {
        let found = topology.component(component);
        if found.is_none() {
            errors.push(ValidationError::UnknownComponent { owner, field, component });
        }
        found
    };

    for p in &topology.pipelines {
        if p.period_us == 0 {
            errors.push(ValidationError::ZeroPeriod(p.id));
        }
        if sched.cores > 0 && p.core >= sched.cores {
            errors.push(ValidationError::CoreOutOfRange {
                pipeline: p.id,
                core: p.core,
                cores: sched.cores,
            });
        }
        for (field, id) in [("source", p.source), ("sink", p.sink)] {
            if let Some(comp) = component_ref(format!("pipeline {}", p.id), field, id, &mut errors)
                && comp.pipeline != p.id
            {
                errors.push(ValidationError::ForeignBoundary {
                    pipeline: p.id,
                    field,
                    component: id,
                    owner: comp.pipeline,
                });
            }
        }
        if let Some(sched_comp) = p.sched_comp {
            component_ref(format!("pipeline {}", p.id), "sched_comp", sched_comp, &mut errors);
        }
    }

    for c in &topology.components {
        if topology.pipeline(c.pipeline).is_none() {
            errors.push(ValidationError::UnknownPipeline {
                component: c.id,
                pipeline: c.pipeline,
            });
        }
        if drivers.get(&c.kind).is_none() {
            errors.push(ValidationError::UnknownDriver {
                component: c.id,
                kind: c.kind.clone(),
            });
        }
    }

    for b in &topology.buffers {
        let owner = format!("buffer {}", b.id);
        if b.size == 0 {
            errors.push(ValidationError::ZeroSize(b.id));
        }
        if b.source == b.sink {
            errors.push(ValidationError::SelfLoop(b.id));
        }
        component_ref(owner.clone(), "source", b.source, &mut errors);
        component_ref(owner.clone(), "sink", b.sink, &mut errors);
        for name in &b.caps {
            if MemCaps::from_name(name).is_none() {
                errors.push(ValidationError::UnknownCaps {
                    owner: owner.clone(),
                    name: name.clone(),
                });
            }
        }
    }

    match ValidationError::collect(errors) {
        None => Ok(()),
        Some(err) => {
            tracing::debug!("topology: {err}");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{BufferEntry, ComponentEntry, PipelineEntry, StreamDirection};
    use std::collections::BTreeMap;

    fn comp(id: u32, pipeline: u32, kind: &str) -> ComponentEntry {
        ComponentEntry {
            id,
            pipeline,
            kind: kind.to_string(),
            direction: None,
            params: BTreeMap::new(),
        }
    }

    fn buffer(id: u32, source: u32, sink: u32) -> BufferEntry {
        BufferEntry {
            id,
            size: 768,
            caps: vec!["ram".to_string()],
            align: 0,
            source,
            sink,
        }
    }

    fn valid() -> Topology {
        Topology {
            pipelines: vec![PipelineEntry {
                id: 1,
                direction: StreamDirection::Playback,
                period_us: 1000,
                priority: 0,
                core: 0,
                sched_comp: None,
                source: 1,
                sink: 2,
            }],
            components: vec![comp(1, 1, "host"), comp(2, 1, "dai")],
            buffers: vec![buffer(1, 1, 2)],
            ..Topology::default()
        }
    }

    fn check(topology: &Topology) -> Vec<ValidationError> {
        match validate_topology(topology, &DriverRegistry::new()) {
            Ok(()) => Vec::new(),
            Err(err) => err.errors().into_iter().cloned().collect(),
        }
    }

    #[test]
    fn valid_topology_passes() {
        assert!(check(&valid()).is_empty());
    }

    #[test]
    fn single_problem_is_not_wrapped() {
        let mut topo = valid();
        topo.pipelines[0].period_us = 0;
        assert_eq!(
            validate_topology(&topo, &DriverRegistry::new()),
            Err(ValidationError::ZeroPeriod(1))
        );
    }

    #[test]
    fn reports_every_problem_at_once() {
        let mut topo = valid();
        topo.components.push(comp(2, 7, "codec"));
        topo.buffers.push(buffer(2, 2, 9));
        topo.buffers[0].caps.push("sram".to_string());
        topo.pipelines[0].core = 3;

        let errors = check(&topo);
        assert!(errors.contains(&ValidationError::DuplicateId { table: "component", id: 2 }));
        assert!(errors.contains(&ValidationError::UnknownPipeline { component: 2, pipeline: 7 }));
        assert!(errors.contains(&ValidationError::UnknownDriver {
            component: 2,
            kind: "codec".to_string()
        }));
        assert!(errors.contains(&ValidationError::UnknownComponent {
            owner: "buffer 2".to_string(),
            field: "sink",
            component: 9
        }));
        assert!(errors.contains(&ValidationError::UnknownCaps {
            owner: "buffer 1".to_string(),
            name: "sram".to_string()
        }));
        assert!(errors.contains(&ValidationError::CoreOutOfRange { pipeline: 1, core: 3, cores: 1 }));
    }

    #[test]
    fn boundary_must_belong_to_its_pipeline() {
        let mut topo = valid();
        topo.pipelines.push(PipelineEntry {
            id: 2,
            source: 1,
            sink: 3,
            ..topo.pipelines[0].clone()
        });
        topo.components.push(comp(3, 2, "dai"));
        assert_eq!(
            check(&topo),
            [ValidationError::ForeignBoundary {
                pipeline: 2,
                field: "source",
                component: 1,
                owner: 1
            }]
        );
    }

    #[test]
    fn buffers_need_size_and_two_ends() {
        let mut topo = valid();
        topo.buffers[0].size = 0;
        topo.buffers[0].sink = 1;
        assert_eq!(check(&topo), [ValidationError::ZeroSize(1), ValidationError::SelfLoop(1)]);
    }

    #[test]
    fn scheduler_section_is_checked() {
        let mut topo = valid();
        topo.scheduler.cores = 0;
        topo.memory.insert("flash".to_string(), 10);
        let errors = check(&topo);
        assert!(errors.contains(&ValidationError::Scheduler("cores must be at least 1")));
        assert!(errors.contains(&ValidationError::UnknownCaps {
            owner: "memory".to_string(),
            name: "flash".to_string()
        }));
    }

    #[test]
    fn stats_window_is_bounded() {
        let mut topo = valid();
        topo.scheduler.stats_window = MAX_STATS_WINDOW_LOG2;
        assert!(check(&topo).is_empty());
        topo.scheduler.stats_window = 32;
        assert_eq!(
            check(&topo),
            [ValidationError::Scheduler("stats_window must be at most 31")]
        );
    }

    #[test]
    fn multiple_display_joins_messages() {
        let err = ValidationError::Multiple(vec![ValidationError::ZeroSize(1), ValidationError::ZeroPeriod(2)]);
        assert_eq!(
            err.to_string(),
            "multiple validation errors: buffer 1 has zero size; pipeline 2 has a zero period"
        );
    }
}
