//! Topology validation and summary.

use std::path::PathBuf;

use cadence_core::PipelineId;
use clap::Args;

use super::common::{format_bytes, load_graph};

/// Validate a topology file.
#[derive(Args)]
pub struct CheckArgs {
    /// Path to the topology TOML file
    pub topology: PathBuf,
}

/// Run the check command.
pub fn run(args: CheckArgs) -> anyhow::Result<()> {
    let (topology, graph) = load_graph(&args.topology)?;
    let sched = topology.sched_config();

    println!("Topology:   {}", args.topology.display());
    println!(
        "Scheduler:  {} core(s), tick {} us, cost margin {} us",
        sched.cores, sched.tick_us, sched.sched_cost_us
    );
    if topology.memory.is_empty() {
        println!("Memory:     unbounded");
    } else {
        let zones: Vec<String> = topology
            .memory
            .iter()
            .map(|(caps, bytes)| format!("{caps} {}", format_bytes(*bytes)))
            .collect();
        println!("Memory:     {}", zones.join(", "));
    }
    println!();

    println!("Pipelines ({}):", graph.pipeline_count());
    for entry in &topology.pipelines {
        let pipeline = graph.get_pipeline(PipelineId(entry.id))?;
        let members = graph
            .components()
            .filter(|c| c.pipeline() == Some(pipeline.id()))
            .count();
        println!(
            "  {:3}  {:8}  {:6} us  prio {:2}  core {}  {} -> {}  ({members} components)",
            entry.id,
            pipeline.direction().name(),
            pipeline.period_us(),
            pipeline.priority(),
            pipeline.core(),
            entry.source,
            entry.sink,
        );
    }

    let total: usize = graph.buffers().map(|b| b.size()).sum();
    println!();
    println!("Buffers:    {} ({})", graph.buffers().count(), format_bytes(total));
    println!();
    println!("OK");
    Ok(())
}
