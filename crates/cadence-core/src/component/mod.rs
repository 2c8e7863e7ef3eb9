//! Graph components: state machine, driver capability trait and copy ports.
//!
//! A [`Component`] pairs a lifecycle state with a boxed [`ComponentDriver`].
//! All state changes go through the fixed command table in
//! [`requested_state`]; drivers only ever see commands the table accepted.
//!
//! # Example
//!
//! ```rust
//! use cadence_core::component::{Component, ComponentId, ComponentState, Direction, TriggerCmd};
//! use cadence_core::component::drivers::EffectDriver;
//! use cadence_core::Status;
//!
//! let mut comp = Component::new(ComponentId(1), Direction::Playback, Box::new(EffectDriver::new()));
//! assert_eq!(comp.state(), ComponentState::Ready);
//!
//! comp.prepare().unwrap();
//! assert_eq!(comp.trigger(TriggerCmd::Start).unwrap(), Status::Continue);
//! assert_eq!(comp.state(), ComponentState::Active);
//!
//! // Starting twice is not an error, the walk just stops here.
//! assert_eq!(comp.trigger(TriggerCmd::Start).unwrap(), Status::PathStop);
//! ```

pub mod drivers;

use core::fmt;

use crate::buffer::{BufferId, RingBuffer, StreamParams};
use crate::error::{Error, Result, Status};
use crate::graph::Graph;

/// Unique identifier for a component in the graph registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub u32);

impl ComponentId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self.0)
    }
}

/// Lifecycle state of a component (and, by extension, of a pipeline).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentState {
    /// Allocated but not yet wired into a completed pipeline.
    Init,
    /// Wired and idle.
    Ready,
    /// Parameters negotiated, buffers rewound, ready to start.
    Prepare,
    /// Stopped mid-stream, resumable with RELEASE.
    Paused,
    /// Running: copy ticks move data.
    Active,
    /// Power-managed suspend.
    Suspend,
}

impl ComponentState {
    /// Lowercase name used in logs and CLI output.
    pub fn name(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Ready => "ready",
            Self::Prepare => "prepare",
            Self::Paused => "paused",
            Self::Active => "active",
            Self::Suspend => "suspend",
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State-change command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerCmd {
    /// ACTIVE or PAUSED to PREPARE.
    Stop,
    /// PREPARE to ACTIVE.
    Start,
    /// ACTIVE to PAUSED.
    Pause,
    /// PAUSED to ACTIVE.
    Release,
    /// READY, PREPARE or PAUSED to SUSPEND.
    Suspend,
    /// SUSPEND to READY.
    Resume,
    /// Any state to READY.
    Reset,
    /// READY to PREPARE.
    Prepare,
    /// Any state to READY, after starvation or backlog.
    Xrun,
}

impl TriggerCmd {
    /// Every command, in table order.
    pub const ALL: [Self; 9] = [
        Self::Stop,
        Self::Start,
        Self::Pause,
        Self::Release,
        Self::Suspend,
        Self::Resume,
        Self::Reset,
        Self::Prepare,
        Self::Xrun,
    ];

    /// Lowercase command name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Release => "release",
            Self::Suspend => "suspend",
            Self::Resume => "resume",
            Self::Reset => "reset",
            Self::Prepare => "prepare",
            Self::Xrun => "xrun",
        }
    }

    /// Parses a command name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|cmd| cmd.name().eq_ignore_ascii_case(name))
    }

    /// State a component ends up in when the command is accepted.
    pub fn target_state(self) -> ComponentState {
        match self {
            Self::Start | Self::Release => ComponentState::Active,
            Self::Stop | Self::Prepare => ComponentState::Prepare,
            Self::Pause => ComponentState::Paused,
            Self::Reset | Self::Xrun | Self::Resume => ComponentState::Ready,
            Self::Suspend => ComponentState::Suspend,
        }
    }
}

impl fmt::Display for TriggerCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Checks `cmd` against the transition table.
///
/// Returns the target state when the transition is legal. A command whose
/// target equals `current` reports `Ok(None)` ("already set"); every other
/// illegal transition is [`Error::InvalidArgument`].
pub fn requested_state(current: ComponentState, cmd: TriggerCmd) -> Result<Option<ComponentState>> {
    use ComponentState as S;

    let target = cmd.target_state();
    if target == current {
        return Ok(None);
    }

    let legal = match cmd {
        TriggerCmd::Start => current == S::Prepare,
        TriggerCmd::Release => current == S::Paused,
        TriggerCmd::Stop => matches!(current, S::Active | S::Paused),
        TriggerCmd::Pause => current == S::Active,
        TriggerCmd::Prepare => current == S::Ready,
        TriggerCmd::Reset | TriggerCmd::Xrun => true,
        TriggerCmd::Suspend => matches!(current, S::Ready | S::Prepare | S::Paused),
        TriggerCmd::Resume => current == S::Suspend,
    };

    if legal { Ok(Some(target)) } else { Err(Error::InvalidArgument) }
}

/// Stream direction of a component or pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Host memory towards hardware.
    #[default]
    Playback,
    /// Hardware towards host memory.
    Capture,
}

impl Direction {
    /// Lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Playback => "playback",
            Self::Capture => "capture",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The capability class a driver implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// Host DMA endpoint (host memory side).
    Host,
    /// Hardware digital audio interface endpoint.
    Dai,
    /// Single-input single-output processing stage.
    Effect,
    /// Fan-in stage summing several sources.
    Mixer,
    /// Signal generator with no sources.
    Tone,
}

impl ComponentKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 5] = [Self::Host, Self::Dai, Self::Effect, Self::Mixer, Self::Tone];

    /// Lowercase kind name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Dai => "dai",
            Self::Effect => "effect",
            Self::Mixer => "mixer",
            Self::Tone => "tone",
        }
    }

    /// Parses a kind name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runtime control message for [`ComponentDriver::cmd`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCmd {
    /// Write `value` to control `index`.
    Set {
        /// Control index.
        index: u32,
        /// New value.
        value: i32,
    },
    /// Read control `index`.
    Get {
        /// Control index.
        index: u32,
    },
}

/// Buffers a component reads from and writes to during one driver call.
///
/// Holds only ids plus a graph reference, so building one never allocates.
#[derive(Clone, Copy)]
pub struct Ports<'a> {
    graph: &'a Graph,
    sources: &'a [BufferId],
    sinks: &'a [BufferId],
}

impl<'a> Ports<'a> {
    pub(crate) fn new(graph: &'a Graph, sources: &'a [BufferId], sinks: &'a [BufferId]) -> Self {
        Self {
            graph,
            sources,
            sinks,
        }
    }

    /// Number of upstream buffers.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Number of downstream buffers.
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// The `index`-th upstream buffer.
    pub fn source(&self, index: usize) -> Option<&'a RingBuffer> {
        self.sources.get(index).and_then(|&id| self.graph.buffer(id))
    }

    /// The `index`-th downstream buffer.
    pub fn sink(&self, index: usize) -> Option<&'a RingBuffer> {
        self.sinks.get(index).and_then(|&id| self.graph.buffer(id))
    }

    /// All upstream buffers.
    pub fn sources(&self) -> impl Iterator<Item = &'a RingBuffer> + 'a {
        let graph = self.graph;
        self.sources.iter().filter_map(move |&id| graph.buffer(id))
    }

    /// All downstream buffers.
    pub fn sinks(&self) -> impl Iterator<Item = &'a RingBuffer> + 'a {
        let graph = self.graph;
        self.sinks.iter().filter_map(move |&id| graph.buffer(id))
    }
}

/// Capability interface every component kind implements.
///
/// Only [`kind`](Self::kind) and [`copy`](Self::copy) are required; the other
/// hooks default to accepting silently.
pub trait ComponentDriver: Send {
    /// Which capability class this driver belongs to.
    fn kind(&self) -> ComponentKind;

    /// Accepts negotiated stream parameters. `period_bytes` is the amount of
    /// data one copy tick moves at the pipeline period.
    fn params(&mut self, params: &StreamParams, period_bytes: usize) -> Result<()> {
        let _ = (params, period_bytes);
        Ok(())
    }

    /// Called once before the first START after params.
    fn prepare(&mut self, ports: &Ports<'_>) -> Result<()> {
        let _ = ports;
        Ok(())
    }

    /// Reacts to an accepted state-change command.
    ///
    /// Returning [`Status::PathStop`] halts propagation past this component.
    fn trigger(&mut self, cmd: TriggerCmd) -> Result<Status> {
        let _ = cmd;
        Ok(Status::Continue)
    }

    /// Moves one period's worth of data between `ports`.
    fn copy(&mut self, ports: &Ports<'_>) -> Result<Status>;

    /// Drops all runtime state back to post-construction values.
    fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    /// Runtime control. Drivers without controls reject every message.
    fn cmd(&mut self, cmd: ControlCmd) -> Result<i32> {
        let _ = cmd;
        Err(Error::InvalidArgument)
    }

    /// Byte position of an endpoint, for timestamp reports.
    fn position(&self) -> Option<u64> {
        None
    }
}

/// A graph node's state plus its driver.
pub struct Component {
    id: ComponentId,
    direction: Direction,
    state: ComponentState,
    driver: Box<dyn ComponentDriver>,
}

impl Component {
    /// Wraps `driver`. New components start in [`ComponentState::Ready`].
    pub fn new(id: ComponentId, direction: Direction, driver: Box<dyn ComponentDriver>) -> Self {
        Self {
            id,
            direction,
            state: ComponentState::Ready,
            driver,
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
        self.driver.kind()
    }

    /// Stream direction.
    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> ComponentState {
        self.state
    }

    /// True while copy ticks should run this component.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state == ComponentState::Active
    }

    /// Applies a state-change command.
    ///
    /// The table is checked first, the driver is told second, and the new
    /// state is committed only if the driver succeeded. A command whose target
    /// is the current state returns [`Status::PathStop`] without reaching the
    /// driver.
    pub fn trigger(&mut self, cmd: TriggerCmd) -> Result<Status> {
        let Some(target) = requested_state(self.state, cmd).inspect_err(|_| {
            tracing::error!(
                "comp_set_state: {} invalid state transition {} -> {cmd}",
                self.id,
                self.state
            );
        })?
        else {
            tracing::debug!("comp_set_state: {} already {}", self.id, self.state);
            return Ok(Status::PathStop);
        };

        let status = self.driver.trigger(cmd)?;
        tracing::debug!("comp_set_state: {} {} -> {target} ({cmd})", self.id, self.state);
        self.state = target;
        Ok(status)
    }

    /// Runs the PREPARE command and the driver's prepare hook.
    pub fn prepare_with(&mut self, ports: &Ports<'_>) -> Result<Status> {
        let Some(target) = requested_state(self.state, TriggerCmd::Prepare)? else {
            return Ok(Status::PathStop);
        };
        self.driver.prepare(ports)?;
        self.state = target;
        Ok(Status::Continue)
    }

    /// Runs the PREPARE command for a component with no buffers.
    pub fn prepare(&mut self) -> Result<Status> {
        let Some(target) = requested_state(self.state, TriggerCmd::Prepare)? else {
            return Ok(Status::PathStop);
        };
        self.state = target;
        Ok(Status::Continue)
    }

    /// Resets the driver and returns to [`ComponentState::Ready`].
    pub fn reset(&mut self) -> Result<()> {
        self.driver.reset()?;
        self.state = ComponentState::Ready;
        Ok(())
    }

    /// Forwards negotiated params to the driver.
    pub fn params(&mut self, params: &StreamParams, period_bytes: usize) -> Result<()> {
        self.driver.params(params, period_bytes)
    }

    /// Runs one copy step.
    pub fn copy(&mut self, ports: &Ports<'_>) -> Result<Status> {
        self.driver.copy(ports)
    }

    /// Forwards a control message.
    pub fn cmd(&mut self, cmd: ControlCmd) -> Result<i32> {
        self.driver.cmd(cmd)
    }

    /// Endpoint byte position, if the driver tracks one.
    pub fn position(&self) -> Option<u64> {
        self.driver.position()
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("direction", &self.direction)
            .field("state", &self.state)
            .finish()
    }
}
