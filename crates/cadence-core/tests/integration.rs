//! Integration tests for cadence-core pipeline operations.
//!
//! Builds small graphs through the public API and checks the ordering and
//! failure behavior of trigger, copy, prepare and reset walks, xrun handling
//! and timestamp reports. Drivers that record their calls into a shared log
//! stand in for real components.

use std::collections::HashSet;
use std::sync::Arc;

use cadence_core::component::drivers::{DaiDriver, EffectDriver, HostDriver};
use cadence_core::pipeline::{self, PipelineConfig};
use cadence_core::{
    BufferId, Component, ComponentDriver, ComponentId, ComponentKind, ComponentState, Direction,
    Error, Graph, MemCaps, Pipeline, PipelineId, PipelineScheduler, Ports, Result, ScheduleOrder,
    Status, StreamParams, TriggerCmd,
};
use parking_lot::Mutex;

type Log = Arc<Mutex<Vec<String>>>;

/// Driver that records every trigger and copy call by name.
struct Recording {
    name: &'static str,
    kind: ComponentKind,
    log: Log,
    fail_on: Option<(TriggerCmd, Error)>,
}

impl Recording {
    fn boxed(name: &'static str, kind: ComponentKind, log: &Log) -> Box<dyn ComponentDriver> {
        Box::new(Self {
            name,
            kind,
            log: Arc::clone(log),
            fail_on: None,
        })
    }

    fn failing(name: &'static str, kind: ComponentKind, log: &Log, cmd: TriggerCmd, err: Error) -> Box<dyn ComponentDriver> {
        Box::new(Self {
            name,
            kind,
            log: Arc::clone(log),
            fail_on: Some((cmd, err)),
        })
    }
}

impl ComponentDriver for Recording {
    fn kind(&self) -> ComponentKind {
        self.kind
    }

    fn trigger(&mut self, cmd: TriggerCmd) -> Result<Status> {
        self.log.lock().push(format!("trigger:{}:{cmd}", self.name));
        match self.fail_on {
            Some((fail, err)) if fail == cmd => Err(err),
            _ => Ok(Status::Continue),
        }
    }

    fn copy(&mut self, _ports: &Ports<'_>) -> Result<Status> {
        self.log.lock().push(format!("copy:{}", self.name));
        Ok(Status::Continue)
    }
}

/// Scheduler that records registrations instead of running anything.
#[derive(Default)]
struct RecordingScheduler {
    scheduled: Mutex<Vec<(PipelineId, ScheduleOrder)>>,
    cancelled: Mutex<Vec<PipelineId>>,
    live: Mutex<HashSet<PipelineId>>,
}

impl PipelineScheduler for RecordingScheduler {
    fn schedule(&self, pipeline: &Pipeline, order: ScheduleOrder) -> Result<()> {
        self.scheduled.lock().push((pipeline.id(), order));
        self.live.lock().insert(pipeline.id());
        Ok(())
    }

    fn cancel(&self, pipeline: PipelineId) {
        self.cancelled.lock().push(pipeline);
        self.live.lock().remove(&pipeline);
    }

    fn is_scheduled(&self, pipeline: PipelineId) -> bool {
        self.live.lock().contains(&pipeline)
    }
}

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log, prefix: &str) -> Vec<String> {
    log.lock()
        .iter()
        .filter(|e| e.starts_with(prefix))
        .cloned()
        .collect()
}

fn add(graph: &mut Graph, pipeline: PipelineId, id: u32, direction: Direction, driver: Box<dyn ComponentDriver>) -> ComponentId {
    graph
        .add_component(pipeline, Component::new(ComponentId(id), direction, driver))
        .unwrap()
}

fn link(graph: &mut Graph, from: ComponentId, buf: u32, to: ComponentId) -> BufferId {
    let id = graph.add_buffer(BufferId(buf), 768, MemCaps::RAM, 0).unwrap();
    graph.connect(from, id, to).unwrap();
    id
}

fn state(graph: &Graph, comp: ComponentId) -> ComponentState {
    graph.node(comp).unwrap().state()
}

/// `A → B → C` playback pipeline with recording drivers, completed and
/// prepared. Returns the component ids in connectivity order.
fn three_node(graph: &mut Graph, log: &Log, b_driver: Box<dyn ComponentDriver>) -> [ComponentId; 3] {
    let p = graph.add_pipeline(PipelineConfig::new(PipelineId(1))).unwrap();
    let a = add(graph, p, 1, Direction::Playback, Recording::boxed("A", ComponentKind::Host, log));
    let b = add(graph, p, 2, Direction::Playback, b_driver);
    let c = add(graph, p, 3, Direction::Playback, Recording::boxed("C", ComponentKind::Dai, log));
    link(graph, a, 1, b);
    link(graph, b, 2, c);
    pipeline::complete(graph, p, a, c).unwrap();
    pipeline::prepare(graph, p, a).unwrap();
    [a, b, c]
}

// ============================================================================
// Trigger
// ============================================================================

#[test]
fn start_reaches_components_in_connectivity_order() {
    let log = new_log();
    let mut graph = Graph::new();
    let [a, b, c] = three_node(&mut graph, &log, Recording::boxed("B", ComponentKind::Effect, &log));
    let sched = RecordingScheduler::default();

    let status = pipeline::trigger(&graph, &sched, PipelineId(1), a, TriggerCmd::Start).unwrap();

    assert_eq!(status, Status::Continue);
    assert_eq!(
        entries(&log, "trigger"),
        ["trigger:A:start", "trigger:B:start", "trigger:C:start"]
    );
    for comp in [a, b, c] {
        assert_eq!(state(&graph, comp), ComponentState::Active);
    }
    let pipeline = graph.get_pipeline(PipelineId(1)).unwrap();
    assert_eq!(pipeline.status(), ComponentState::Active);
    assert_eq!(*sched.scheduled.lock(), [(PipelineId(1), ScheduleOrder::Any)]);
}

#[test]
fn failing_component_stops_the_walk() {
    let log = new_log();
    let mut graph = Graph::new();
    let failing = Recording::failing("B", ComponentKind::Effect, &log, TriggerCmd::Start, Error::Device(-5));
    let [a, b, c] = three_node(&mut graph, &log, failing);
    let sched = RecordingScheduler::default();

    let err = pipeline::trigger(&graph, &sched, PipelineId(1), a, TriggerCmd::Start).unwrap_err();

    assert_eq!(err, Error::Device(-5));
    assert_eq!(err.errno(), -5);
    assert_eq!(entries(&log, "trigger"), ["trigger:A:start", "trigger:B:start"]);
    // No compensation: A stays started, B and C never moved.
    assert_eq!(state(&graph, a), ComponentState::Active);
    assert_eq!(state(&graph, b), ComponentState::Prepare);
    assert_eq!(state(&graph, c), ComponentState::Prepare);
    // No schedule changes after a failed walk.
    assert!(sched.scheduled.lock().is_empty());
    assert_ne!(graph.get_pipeline(PipelineId(1)).unwrap().status(), ComponentState::Active);
}

#[test]
fn repeated_start_is_a_path_stop() {
    let log = new_log();
    let mut graph = Graph::new();
    let [a, ..] = three_node(&mut graph, &log, Recording::boxed("B", ComponentKind::Effect, &log));
    let sched = RecordingScheduler::default();

    pipeline::trigger(&graph, &sched, PipelineId(1), a, TriggerCmd::Start).unwrap();
    log.lock().clear();

    let status = pipeline::trigger(&graph, &sched, PipelineId(1), a, TriggerCmd::Start).unwrap();
    assert_eq!(status, Status::PathStop);
    assert!(entries(&log, "trigger").is_empty());
    assert_eq!(sched.scheduled.lock().len(), 1);
}

#[test]
fn illegal_transition_is_invalid_argument() {
    let log = new_log();
    let mut graph = Graph::new();
    let [a, ..] = three_node(&mut graph, &log, Recording::boxed("B", ComponentKind::Effect, &log));
    let sched = RecordingScheduler::default();

    // RELEASE needs PAUSED.
    let err = pipeline::trigger(&graph, &sched, PipelineId(1), a, TriggerCmd::Release).unwrap_err();
    assert_eq!(err, Error::InvalidArgument);
    assert!(entries(&log, "trigger").is_empty());
}

#[test]
fn non_trigger_commands_are_rejected() {
    let log = new_log();
    let mut graph = Graph::new();
    let [a, ..] = three_node(&mut graph, &log, Recording::boxed("B", ComponentKind::Effect, &log));
    let sched = RecordingScheduler::default();

    for cmd in [TriggerCmd::Prepare, TriggerCmd::Suspend, TriggerCmd::Resume] {
        let err = pipeline::trigger(&graph, &sched, PipelineId(1), a, cmd).unwrap_err();
        assert_eq!(err, Error::InvalidArgument);
    }
}

#[test]
fn stop_and_pause_cancel_the_task() {
    let log = new_log();
    let mut graph = Graph::new();
    let [a, b, _] = three_node(&mut graph, &log, Recording::boxed("B", ComponentKind::Effect, &log));
    let sched = RecordingScheduler::default();
    let id = PipelineId(1);

    pipeline::trigger(&graph, &sched, id, a, TriggerCmd::Start).unwrap();
    pipeline::trigger(&graph, &sched, id, a, TriggerCmd::Pause).unwrap();
    assert_eq!(state(&graph, b), ComponentState::Paused);
    assert_eq!(graph.get_pipeline(id).unwrap().status(), ComponentState::Paused);
    assert!(!sched.is_scheduled(id));

    pipeline::trigger(&graph, &sched, id, a, TriggerCmd::Release).unwrap();
    assert_eq!(state(&graph, b), ComponentState::Active);
    assert!(sched.is_scheduled(id));

    pipeline::trigger(&graph, &sched, id, a, TriggerCmd::Stop).unwrap();
    assert_eq!(state(&graph, b), ComponentState::Prepare);
    assert_eq!(*sched.cancelled.lock(), [id, id]);
}

#[test]
fn co_scheduled_pipelines_are_linked_producer_first() {
    let log = new_log();
    let mut graph = Graph::new();
    let dai_id = ComponentId(4);
    let p1 = graph
        .add_pipeline(PipelineConfig::new(PipelineId(1)).sched_comp(dai_id))
        .unwrap();
    let p2 = graph
        .add_pipeline(PipelineConfig::new(PipelineId(2)).sched_comp(dai_id))
        .unwrap();
    let host = add(&mut graph, p1, 1, Direction::Playback, Recording::boxed("host", ComponentKind::Host, &log));
    let e1 = add(&mut graph, p1, 2, Direction::Playback, Recording::boxed("e1", ComponentKind::Effect, &log));
    let e2 = add(&mut graph, p2, 3, Direction::Playback, Recording::boxed("e2", ComponentKind::Effect, &log));
    let dai = add(&mut graph, p2, 4, Direction::Playback, Recording::boxed("dai", ComponentKind::Dai, &log));
    link(&mut graph, host, 1, e1);
    link(&mut graph, e1, 2, e2);
    link(&mut graph, e2, 3, dai);
    pipeline::complete(&mut graph, p1, host, e1).unwrap();
    pipeline::complete(&mut graph, p2, e2, dai).unwrap();

    // P2 ends in a DAI, so a downstream prepare from P1 enters it.
    pipeline::prepare(&graph, p1, host).unwrap();
    assert_eq!(state(&graph, dai), ComponentState::Prepare);

    let sched = RecordingScheduler::default();
    pipeline::trigger(&graph, &sched, p1, host, TriggerCmd::Start).unwrap();

    assert_eq!(
        entries(&log, "trigger"),
        ["trigger:host:start", "trigger:e1:start", "trigger:e2:start", "trigger:dai:start"]
    );
    assert_eq!(graph.get_pipeline(p2).unwrap().sched_prev(), Some(p1));
    assert_eq!(graph.get_pipeline(p1).unwrap().sched_next(), Some(p2));
    assert_eq!(
        *sched.scheduled.lock(),
        [(p1, ScheduleOrder::Any), (p2, ScheduleOrder::After(p1))]
    );
}

#[test]
fn other_groups_are_boundaries() {
    let log = new_log();
    let mut graph = Graph::new();
    let p1 = graph.add_pipeline(PipelineConfig::new(PipelineId(1))).unwrap();
    let p2 = graph.add_pipeline(PipelineConfig::new(PipelineId(2))).unwrap();
    let host = add(&mut graph, p1, 1, Direction::Playback, Recording::boxed("host", ComponentKind::Host, &log));
    let e1 = add(&mut graph, p1, 2, Direction::Playback, Recording::boxed("e1", ComponentKind::Effect, &log));
    let e2 = add(&mut graph, p2, 3, Direction::Playback, Recording::boxed("e2", ComponentKind::Effect, &log));
    let dai = add(&mut graph, p2, 4, Direction::Playback, Recording::boxed("dai", ComponentKind::Dai, &log));
    link(&mut graph, host, 1, e1);
    link(&mut graph, e1, 2, e2);
    link(&mut graph, e2, 3, dai);
    pipeline::complete(&mut graph, p1, host, e1).unwrap();
    pipeline::complete(&mut graph, p2, e2, dai).unwrap();
    pipeline::prepare(&graph, p1, host).unwrap();

    let sched = RecordingScheduler::default();
    pipeline::trigger(&graph, &sched, p1, host, TriggerCmd::Start).unwrap();

    assert_eq!(entries(&log, "trigger"), ["trigger:host:start", "trigger:e1:start"]);
    assert_eq!(state(&graph, e2), ComponentState::Prepare);
    assert_eq!(*sched.scheduled.lock(), [(p1, ScheduleOrder::Any)]);
}

// ============================================================================
// Dailess capture
// ============================================================================

/// Playback P1 (`H1 → X`) feeds capture P2 (`E → H2`), which has no DAI.
struct Dailess {
    graph: Graph,
    log: Log,
    h1: ComponentId,
    e: ComponentId,
    h2: ComponentId,
}

fn dailess() -> Dailess {
    let log = new_log();
    let mut graph = Graph::new();
    let p1 = graph.add_pipeline(PipelineConfig::new(PipelineId(1))).unwrap();
    let p2 = graph
        .add_pipeline(PipelineConfig::new(PipelineId(2)).direction(Direction::Capture))
        .unwrap();
    let h1 = add(&mut graph, p1, 1, Direction::Playback, Recording::boxed("h1", ComponentKind::Host, &log));
    let x = add(&mut graph, p1, 2, Direction::Playback, Recording::boxed("x", ComponentKind::Effect, &log));
    let e = add(&mut graph, p2, 3, Direction::Capture, Recording::boxed("e", ComponentKind::Effect, &log));
    let h2 = add(&mut graph, p2, 4, Direction::Capture, Recording::boxed("h2", ComponentKind::Host, &log));
    link(&mut graph, h1, 1, x);
    link(&mut graph, x, 2, e);
    link(&mut graph, e, 3, h2);
    pipeline::complete(&mut graph, p1, h1, x).unwrap();
    pipeline::complete(&mut graph, p2, e, h2).unwrap();
    pipeline::prepare(&graph, p2, h2).unwrap();

    Dailess { graph, log, h1, e, h2 }
}

#[test]
fn dailess_capture_without_running_producer_is_no_data() {
    let t = dailess();
    let sched = RecordingScheduler::default();

    let err = pipeline::trigger(&t.graph, &sched, PipelineId(2), t.h2, TriggerCmd::Start).unwrap_err();

    assert_eq!(err, Error::NoData);
    assert_eq!(err.errno(), -61);
    assert!(entries(&t.log, "trigger").is_empty());
    assert_eq!(state(&t.graph, t.e), ComponentState::Prepare);
    assert_eq!(state(&t.graph, t.h2), ComponentState::Prepare);
    assert!(sched.scheduled.lock().is_empty());
}

#[test]
fn dailess_capture_starts_once_producer_runs() {
    let t = dailess();
    let sched = RecordingScheduler::default();

    pipeline::prepare(&t.graph, PipelineId(1), t.h1).unwrap();
    pipeline::trigger(&t.graph, &sched, PipelineId(1), t.h1, TriggerCmd::Start).unwrap();
    pipeline::trigger(&t.graph, &sched, PipelineId(2), t.h2, TriggerCmd::Start).unwrap();

    assert_eq!(state(&t.graph, t.e), ComponentState::Active);
    assert_eq!(state(&t.graph, t.h2), ComponentState::Active);
}

// ============================================================================
// Copy
// ============================================================================

#[test]
fn playback_copy_runs_producers_first() {
    let log = new_log();
    let mut graph = Graph::new();
    let [a, ..] = three_node(&mut graph, &log, Recording::boxed("B", ComponentKind::Effect, &log));
    let sched = RecordingScheduler::default();
    pipeline::trigger(&graph, &sched, PipelineId(1), a, TriggerCmd::Start).unwrap();

    pipeline::copy(&graph, PipelineId(1)).unwrap();

    assert_eq!(entries(&log, "copy"), ["copy:A", "copy:B", "copy:C"]);
}

#[test]
fn capture_copy_runs_hardware_first() {
    let log = new_log();
    let mut graph = Graph::new();
    let p = graph
        .add_pipeline(PipelineConfig::new(PipelineId(1)).direction(Direction::Capture))
        .unwrap();
    let dai = add(&mut graph, p, 1, Direction::Capture, Recording::boxed("dai", ComponentKind::Dai, &log));
    let host = add(&mut graph, p, 2, Direction::Capture, Recording::boxed("host", ComponentKind::Host, &log));
    link(&mut graph, dai, 1, host);
    pipeline::complete(&mut graph, p, dai, host).unwrap();
    pipeline::prepare(&graph, p, host).unwrap();
    let sched = RecordingScheduler::default();
    pipeline::trigger(&graph, &sched, p, host, TriggerCmd::Start).unwrap();

    pipeline::copy(&graph, p).unwrap();

    assert_eq!(entries(&log, "copy"), ["copy:dai", "copy:host"]);
}

#[test]
fn copy_skips_inactive_components() {
    let log = new_log();
    let mut graph = Graph::new();
    three_node(&mut graph, &log, Recording::boxed("B", ComponentKind::Effect, &log));

    pipeline::copy(&graph, PipelineId(1)).unwrap();
    assert!(entries(&log, "copy").is_empty());
}

#[test]
fn copy_of_incomplete_pipeline_is_invalid() {
    let mut graph = Graph::new();
    let p = graph.add_pipeline(PipelineConfig::new(PipelineId(7))).unwrap();
    assert_eq!(pipeline::copy(&graph, p), Err(Error::InvalidArgument));
    assert_eq!(
        pipeline::copy(&graph, PipelineId(8)),
        Err(Error::PipelineNotFound(PipelineId(8)))
    );
}

/// Host → volume → DAI with the reference drivers, started.
fn reference_playback(graph: &mut Graph) -> (ComponentId, ComponentId, ComponentId) {
    let p = graph.add_pipeline(PipelineConfig::new(PipelineId(1))).unwrap();
    let host = add(graph, p, 1, Direction::Playback, Box::new(HostDriver::new(Direction::Playback)));
    let vol = add(graph, p, 2, Direction::Playback, Box::new(EffectDriver::new()));
    let dai = add(graph, p, 3, Direction::Playback, Box::new(DaiDriver::new(Direction::Playback)));
    link(graph, host, 1, vol);
    link(graph, vol, 2, dai);
    pipeline::complete(graph, p, host, dai).unwrap();
    pipeline::params(graph, p, host, &StreamParams::default()).unwrap();
    pipeline::prepare(graph, p, host).unwrap();
    (host, vol, dai)
}

#[test]
fn reference_drivers_move_one_period_per_tick() {
    let mut graph = Graph::new();
    let (host, _, _) = reference_playback(&mut graph);
    let sched = RecordingScheduler::default();
    pipeline::trigger(&graph, &sched, PipelineId(1), host, TriggerCmd::Start).unwrap();

    for _ in 0..4 {
        pipeline::copy(&graph, PipelineId(1)).unwrap();
    }

    let posn = pipeline::get_timestamp(&graph, PipelineId(1), host).unwrap();
    assert_eq!(posn.host_posn, 4 * 384);
    assert_eq!(posn.dai_posn, 4 * 384);
    assert_eq!(posn.dai, Some(ComponentId(3)));
    assert_eq!(posn.timestamp_ns, 1_000_000);
    for buf in graph.buffers() {
        assert_eq!(buf.avail() + buf.free(), buf.size());
        assert_eq!(buf.avail(), 0);
    }
}

#[test]
fn timestamp_without_dai_reports_host_only() {
    let log = new_log();
    let mut graph = Graph::new();
    let p = graph.add_pipeline(PipelineConfig::new(PipelineId(1))).unwrap();
    let host = add(&mut graph, p, 1, Direction::Playback, Box::new(HostDriver::new(Direction::Playback)));
    let e = add(&mut graph, p, 2, Direction::Playback, Recording::boxed("e", ComponentKind::Effect, &log));
    link(&mut graph, host, 1, e);
    pipeline::complete(&mut graph, p, host, e).unwrap();

    let posn = pipeline::get_timestamp(&graph, p, host).unwrap();
    assert_eq!(posn.dai, None);
    assert_eq!(posn.timestamp_ns, 0);
    assert_eq!(posn.host_posn, 0);
}

// ============================================================================
// Params, prepare, reset
// ============================================================================

#[test]
fn params_grows_buffers_to_two_periods() {
    let log = new_log();
    let mut graph = Graph::new();
    let p = graph.add_pipeline(PipelineConfig::new(PipelineId(1)).period_us(2000)).unwrap();
    let host = add(&mut graph, p, 1, Direction::Playback, Box::new(HostDriver::new(Direction::Playback)));
    let dai = add(&mut graph, p, 2, Direction::Playback, Recording::boxed("dai", ComponentKind::Dai, &log));
    let buf = graph.add_buffer(BufferId(1), 64, MemCaps::RAM, 0).unwrap();
    graph.connect(host, buf, dai).unwrap();
    pipeline::complete(&mut graph, p, host, dai).unwrap();

    pipeline::params(&graph, p, host, &StreamParams::default()).unwrap();

    let buffer = graph.buffer(buf).unwrap();
    assert_eq!(buffer.size(), 2 * 768);
    assert_eq!(buffer.params(), Some(StreamParams::default()));
}

#[test]
fn complete_twice_is_invalid() {
    let log = new_log();
    let mut graph = Graph::new();
    let [a, _, c] = three_node(&mut graph, &log, Recording::boxed("B", ComponentKind::Effect, &log));
    assert_eq!(
        pipeline::complete(&mut graph, PipelineId(1), a, c),
        Err(Error::InvalidArgument)
    );
}

#[test]
fn reset_returns_everything_to_ready() {
    let mut graph = Graph::new();
    let (host, vol, dai) = reference_playback(&mut graph);
    let sched = RecordingScheduler::default();
    let id = PipelineId(1);
    pipeline::trigger(&graph, &sched, id, host, TriggerCmd::Start).unwrap();
    pipeline::copy(&graph, id).unwrap();
    pipeline::trigger(&graph, &sched, id, host, TriggerCmd::Stop).unwrap();

    pipeline::reset(&graph, &sched, id, host).unwrap();

    for comp in [host, vol, dai] {
        assert_eq!(state(&graph, comp), ComponentState::Ready);
    }
    assert_eq!(graph.get_pipeline(id).unwrap().status(), ComponentState::Ready);
    assert!(!sched.is_scheduled(id));
    let posn = pipeline::get_timestamp(&graph, id, host).unwrap();
    assert_eq!(posn.host_posn, 0);
}

#[test]
fn active_pipeline_cannot_be_freed() {
    let mut graph = Graph::new();
    let (host, ..) = reference_playback(&mut graph);
    let sched = RecordingScheduler::default();
    pipeline::trigger(&graph, &sched, PipelineId(1), host, TriggerCmd::Start).unwrap();

    assert_eq!(graph.free_pipeline(PipelineId(1)), Err(Error::Busy));

    pipeline::trigger(&graph, &sched, PipelineId(1), host, TriggerCmd::Stop).unwrap();
    graph.free_pipeline(PipelineId(1)).unwrap();
    assert_eq!(graph.components().count(), 0);
    assert_eq!(graph.buffers().count(), 0);
}

// ============================================================================
// Xrun
// ============================================================================

#[test]
fn stop_during_xrun_is_a_no_op() {
    let mut graph = Graph::new();
    let (host, vol, _) = reference_playback(&mut graph);
    let sched = RecordingScheduler::default();
    let id = PipelineId(1);
    pipeline::trigger(&graph, &sched, id, host, TriggerCmd::Start).unwrap();

    pipeline::report_xrun(&graph, id, 96).unwrap();
    pipeline::report_xrun(&graph, id, 500).unwrap();
    assert_eq!(graph.get_pipeline(id).unwrap().xrun_bytes(), 96);

    for cmd in [TriggerCmd::Stop, TriggerCmd::Pause, TriggerCmd::Xrun] {
        let status = pipeline::trigger(&graph, &sched, id, host, cmd).unwrap();
        assert_eq!(status, Status::PathStop);
    }
    assert_eq!(state(&graph, vol), ComponentState::Active);

    pipeline::trigger(&graph, &sched, id, host, TriggerCmd::Reset).unwrap();
    assert_eq!(state(&graph, vol), ComponentState::Ready);
    assert_eq!(graph.get_pipeline(id).unwrap().xrun_bytes(), 0);
    assert_eq!(graph.get_pipeline(id).unwrap().status(), ComponentState::Ready);
}

#[test]
fn xrun_trigger_climbs_to_the_host() {
    let mut graph = Graph::new();
    let (host, vol, dai) = reference_playback(&mut graph);
    let sched = RecordingScheduler::default();
    let id = PipelineId(1);
    pipeline::trigger(&graph, &sched, id, host, TriggerCmd::Start).unwrap();

    // Entering at the DAI still walks the whole chain from the host.
    pipeline::trigger(&graph, &sched, id, dai, TriggerCmd::Xrun).unwrap();

    for comp in [host, vol, dai] {
        assert_eq!(state(&graph, comp), ComponentState::Ready);
    }
    assert_ne!(graph.get_pipeline(id).unwrap().xrun_bytes(), 0);
}

#[test]
fn underrun_surfaces_from_copy_as_no_data() {
    let mut graph = Graph::new();
    let p = graph.add_pipeline(PipelineConfig::new(PipelineId(1))).unwrap();
    let log = new_log();
    let src = add(&mut graph, p, 1, Direction::Playback, Recording::boxed("src", ComponentKind::Host, &log));
    let dai = add(&mut graph, p, 2, Direction::Playback, Box::new(DaiDriver::new(Direction::Playback)));
    link(&mut graph, src, 1, dai);
    pipeline::complete(&mut graph, p, src, dai).unwrap();
    pipeline::params(&graph, p, src, &StreamParams::default()).unwrap();
    pipeline::prepare(&graph, p, src).unwrap();
    let sched = RecordingScheduler::default();
    pipeline::trigger(&graph, &sched, p, src, TriggerCmd::Start).unwrap();

    // The recording source never produces, so the DAI starves.
    assert_eq!(pipeline::copy(&graph, p), Err(Error::NoData));
    // The next tick is a fresh attempt.
    assert_eq!(pipeline::copy(&graph, p), Err(Error::NoData));
    assert_eq!(entries(&log, "copy").len(), 2);
}
