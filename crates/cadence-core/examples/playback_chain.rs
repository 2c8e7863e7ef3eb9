//! Playback chain demo: host → volume → DAI, driven by hand for a few ticks.
//!
//! Run with: cargo run -p cadence-core --example playback_chain

use cadence_core::component::drivers::{DaiDriver, EffectDriver, HostDriver};
use cadence_core::pipeline::{self, PipelineConfig};
use cadence_core::{
    BufferId, Component, ComponentId, ControlCmd, Direction, Graph, MemCaps, Pipeline, PipelineId,
    PipelineScheduler, Result, ScheduleOrder, StreamParams, TriggerCmd,
};

/// Ticks are driven from `main`, so nothing is registered anywhere.
struct Manual;

impl PipelineScheduler for Manual {
    fn schedule(&self, pipeline: &Pipeline, order: ScheduleOrder) -> Result<()> {
        println!("schedule {} {order:?}", pipeline.id());
        Ok(())
    }

    fn cancel(&self, pipeline: PipelineId) {
        println!("cancel {pipeline}");
    }

    fn is_scheduled(&self, _pipeline: PipelineId) -> bool {
        false
    }
}

fn main() -> Result<()> {
    let mut graph = Graph::new();
    let p = graph.add_pipeline(PipelineConfig::new(PipelineId(1)).period_us(1000))?;

    let host = graph.add_component(
        p,
        Component::new(ComponentId(1), Direction::Playback, Box::new(HostDriver::new(Direction::Playback))),
    )?;
    let vol = graph.add_component(p, Component::new(ComponentId(2), Direction::Playback, Box::new(EffectDriver::new())))?;
    let dai = graph.add_component(
        p,
        Component::new(ComponentId(3), Direction::Playback, Box::new(DaiDriver::new(Direction::Playback))),
    )?;

    let b1 = graph.add_buffer(BufferId(1), 768, MemCaps::RAM, 0)?;
    let b2 = graph.add_buffer(BufferId(2), 768, MemCaps::RAM.union(MemCaps::DMA), 0)?;
    graph.connect(host, b1, vol)?;
    graph.connect(vol, b2, dai)?;

    pipeline::complete(&mut graph, p, host, dai)?;
    pipeline::params(&graph, p, host, &StreamParams::default())?;
    pipeline::prepare(&graph, p, host)?;
    graph.node(vol)?.lock().cmd(ControlCmd::Set { index: 0, value: 50 })?;

    pipeline::trigger(&graph, &Manual, p, host, TriggerCmd::Start)?;
    for tick in 1..=4 {
        pipeline::copy(&graph, p)?;
        let posn = pipeline::get_timestamp(&graph, p, host)?;
        println!(
            "tick {tick}: host {} bytes, dai {} bytes",
            posn.host_posn, posn.dai_posn
        );
    }
    pipeline::trigger(&graph, &Manual, p, host, TriggerCmd::Stop)?;
    pipeline::reset(&graph, &Manual, p, host)?;
    Ok(())
}
