//! Topology file format.

use std::collections::BTreeMap;
use std::path::Path;

use cadence_core::{Direction, MemCaps};
use cadence_sched::SchedConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A complete firmware topology: scheduler settings, memory budgets,
/// pipelines, components and the buffers connecting them.
///
/// # TOML Format
///
/// ```toml
/// [scheduler]
/// tick_us = 100
/// cores = 2
///
/// [memory]
/// ram = 65536
///
/// [[pipeline]]
/// id = 1
/// direction = "playback"
/// period_us = 1000
/// source = 1
/// sink = 3
///
/// [[component]]
/// id = 1
/// pipeline = 1
/// kind = "host"
///
/// [[component]]
/// id = 2
/// pipeline = 1
/// kind = "effect"
/// [component.params]
/// volume = 50
///
/// [[component]]
/// id = 3
/// pipeline = 1
/// kind = "dai"
///
/// [[buffer]]
/// id = 1
/// size = 768
/// source = 1
/// sink = 2
///
/// [[buffer]]
/// id = 2
/// size = 768
/// source = 2
/// sink = 3
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Topology {
    /// Scheduling domain settings.
    #[serde(default)]
    pub scheduler: SchedulerSection,

    /// Per-capability heap budgets in bytes. Empty means unbounded.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub memory: BTreeMap<String, usize>,

    /// Pipelines, in creation order.
    #[serde(default, rename = "pipeline")]
    pub pipelines: Vec<PipelineEntry>,

    /// Components, in creation order.
    #[serde(default, rename = "component")]
    pub components: Vec<ComponentEntry>,

    /// Buffers, in creation order.
    #[serde(default, rename = "buffer")]
    pub buffers: Vec<BufferEntry>,
}

/// `[scheduler]` table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerSection {
    /// Timer resolution in microseconds.
    #[serde(default = "default_tick_us")]
    pub tick_us: u32,
    /// Early re-arm margin in microseconds.
    #[serde(default = "default_sched_cost_us")]
    pub sched_cost_us: u32,
    /// Number of cores.
    #[serde(default = "default_cores")]
    pub cores: u32,
    /// Statistics are logged every `2^stats_window` runs.
    #[serde(default = "default_stats_window")]
    pub stats_window: u32,
}

fn default_tick_us() -> u32 {
    SchedConfig::default().tick_us
}

fn default_sched_cost_us() -> u32 {
    SchedConfig::default().sched_cost_us
}

fn default_cores() -> u32 {
    SchedConfig::default().cores
}

fn default_stats_window() -> u32 {
    SchedConfig::default().stats_window_log2
}

impl Default for SchedulerSection {
    fn default() -> Self {
        SchedConfig::default().into()
    }
}

impl From<SchedConfig> for SchedulerSection {
    fn from(config: SchedConfig) -> Self {
        Self {
            tick_us: config.tick_us,
            sched_cost_us: config.sched_cost_us,
            cores: config.cores,
            stats_window: config.stats_window_log2,
        }
    }
}

impl From<SchedulerSection> for SchedConfig {
    fn from(section: SchedulerSection) -> Self {
        Self {
            tick_us: section.tick_us,
            sched_cost_us: section.sched_cost_us,
            cores: section.cores,
            stats_window_log2: section.stats_window,
        }
    }
}

/// Stream direction as written in topology files.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamDirection {
    /// Host memory towards hardware.
    #[default]
    Playback,
    /// Hardware towards host memory.
    Capture,
}

impl From<StreamDirection> for Direction {
    fn from(dir: StreamDirection) -> Self {
        match dir {
            StreamDirection::Playback => Direction::Playback,
            StreamDirection::Capture => Direction::Capture,
        }
    }
}

/// `[[pipeline]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineEntry {
    /// Pipeline id.
    pub id: u32,
    /// Stream direction.
    #[serde(default)]
    pub direction: StreamDirection,
    /// Copy period in microseconds.
    #[serde(default = "default_period_us")]
    pub period_us: u32,
    /// Scheduling priority, lower runs first.
    #[serde(default)]
    pub priority: u32,
    /// Core the pipeline task runs on.
    #[serde(default)]
    pub core: u32,
    /// Scheduling component shared by a co-schedule group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sched_comp: Option<u32>,
    /// Upstream boundary component.
    pub source: u32,
    /// Downstream boundary component.
    pub sink: u32,
}

fn default_period_us() -> u32 {
    1000
}

impl PipelineEntry {
    /// The host-facing boundary: source for playback, sink for capture.
    pub fn host(&self) -> u32 {
        match self.direction {
            StreamDirection::Playback => self.source,
            StreamDirection::Capture => self.sink,
        }
    }
}

/// `[[component]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentEntry {
    /// Component id.
    pub id: u32,
    /// Pipeline the component belongs to.
    pub pipeline: u32,
    /// Driver name in the [`DriverRegistry`](crate::DriverRegistry).
    pub kind: String,
    /// Direction; defaults to the pipeline's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<StreamDirection>,
    /// Driver-specific integer parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, i64>,
}

/// `[[buffer]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BufferEntry {
    /// Buffer id.
    pub id: u32,
    /// Size in bytes.
    pub size: usize,
    /// Capability names (`ram`, `dma`, `lp`, `hp`, `cache`).
    #[serde(default = "default_caps")]
    pub caps: Vec<String>,
    /// Storage alignment in bytes, `0` for none.
    #[serde(default)]
    pub align: usize,
    /// Producing component.
    pub source: u32,
    /// Consuming component.
    pub sink: u32,
}

fn default_caps() -> Vec<String> {
    vec!["ram".to_string()]
}

impl BufferEntry {
    /// Union of the named capabilities, or `None` if a name is unknown.
    pub fn mem_caps(&self) -> Option<MemCaps> {
        self.caps
            .iter()
            .try_fold(MemCaps::NONE, |caps, name| Some(caps.union(MemCaps::from_name(name)?)))
    }
}

impl Topology {
    /// Loads a topology from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let topology = Self::from_toml(&content)?;
        tracing::debug!(
            "topology: loaded {} ({} pipelines, {} components, {} buffers)",
            path.display(),
            topology.pipelines.len(),
            topology.components.len(),
            topology.buffers.len()
        );
        Ok(topology)
    }

    /// Parses a topology from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Saves the topology to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
    }

    /// Serializes the topology to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scheduling domain configuration.
    pub fn sched_config(&self) -> SchedConfig {
        self.scheduler.into()
    }

    /// Looks up a pipeline entry.
    pub fn pipeline(&self, id: u32) -> Option<&PipelineEntry> {
        self.pipelines.iter().find(|p| p.id == id)
    }

    /// Looks up a component entry.
    pub fn component(&self, id: u32) -> Option<&ComponentEntry> {
        self.components.iter().find(|c| c.id == id)
    }

    /// Direction of a component: its own, else its pipeline's.
    pub fn component_direction(&self, comp: &ComponentEntry) -> StreamDirection {
        comp.direction
            .or_else(|| self.pipeline(comp.pipeline).map(|p| p.direction))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[[pipeline]]
id = 1
source = 1
sink = 2

[[component]]
id = 1
pipeline = 1
kind = "host"

[[component]]
id = 2
pipeline = 1
kind = "dai"

[[buffer]]
id = 1
size = 768
source = 1
sink = 2
"#;

    #[test]
    fn defaults_fill_omitted_fields() {
        let topo = Topology::from_toml(MINIMAL).unwrap();
        assert_eq!(topo.scheduler, SchedulerSection::default());
        assert_eq!(topo.sched_config(), SchedConfig::default());
        assert!(topo.memory.is_empty());

        let p = &topo.pipelines[0];
        assert_eq!(p.direction, StreamDirection::Playback);
        assert_eq!(p.period_us, 1000);
        assert_eq!((p.priority, p.core, p.sched_comp), (0, 0, None));
        assert_eq!(p.host(), 1);

        assert_eq!(topo.buffers[0].caps, ["ram"]);
        assert_eq!(topo.buffers[0].mem_caps(), Some(MemCaps::RAM));
    }

    #[test]
    fn component_direction_follows_pipeline() {
        let mut topo = Topology::from_toml(MINIMAL).unwrap();
        topo.pipelines[0].direction = StreamDirection::Capture;
        let comp = topo.components[0].clone();
        assert_eq!(topo.component_direction(&comp), StreamDirection::Capture);
        assert_eq!(topo.pipelines[0].host(), 2);
    }

    #[test]
    fn caps_combine_and_reject_unknown_names() {
        let mut buf = Topology::from_toml(MINIMAL).unwrap().buffers.remove(0);
        buf.caps = vec!["ram".into(), "DMA".into()];
        assert_eq!(buf.mem_caps(), Some(MemCaps::RAM.union(MemCaps::DMA)));
        buf.caps.push("sram".into());
        assert_eq!(buf.mem_caps(), None);
    }

    #[test]
    fn scheduler_and_memory_tables_parse() {
        let toml = r#"
[scheduler]
tick_us = 250
cores = 4

[memory]
ram = 4096
dma = 1024
"#;
        let topo = Topology::from_toml(toml).unwrap();
        assert_eq!(topo.scheduler.tick_us, 250);
        assert_eq!(topo.scheduler.cores, 4);
        assert_eq!(topo.scheduler.sched_cost_us, SchedConfig::default().sched_cost_us);
        assert_eq!(topo.memory.get("dma"), Some(&1024));
    }

    #[test]
    fn toml_survives_a_save_and_load() {
        let topo = Topology::from_toml(MINIMAL).unwrap();
        let text = topo.to_toml().unwrap();
        assert!(text.contains("[[pipeline]]"));
        assert!(text.contains("kind = \"dai\""));
        assert_eq!(Topology::from_toml(&text).unwrap(), topo);
    }

    #[test]
    fn bad_direction_is_a_parse_error() {
        let toml = MINIMAL.replace("id = 1\nsource", "id = 1\ndirection = \"sideways\"\nsource");
        assert!(matches!(Topology::from_toml(&toml), Err(ConfigError::TomlParse(_))));
    }
}
