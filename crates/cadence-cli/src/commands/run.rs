//! Run a topology on the scheduler for a fixed time.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use cadence_core::{ComponentId, PipelineId, StreamParams, TriggerCmd};
use cadence_sched::Runtime;
use clap::Args;
use serde::Serialize;

use super::common::load_graph;

/// Start every pipeline, let the scheduler drive it, then stop.
#[derive(Args)]
pub struct RunArgs {
    /// Path to the topology TOML file
    pub topology: PathBuf,

    /// How long to run before stopping
    #[arg(long, default_value = "50", value_name = "MS")]
    pub duration_ms: u64,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct PipelineReport {
    id: u32,
    direction: &'static str,
    status: &'static str,
    host_posn: u64,
    dai_posn: u64,
    ticks: u64,
    failures: u64,
}

#[derive(Serialize)]
struct CoreReport {
    core: u32,
    runs: u64,
    overruns: u64,
    avg_us: u64,
    max_us: u64,
}

#[derive(Serialize)]
struct RunReport {
    duration_ms: u64,
    pipelines: Vec<PipelineReport>,
    cores: Vec<CoreReport>,
}

/// Run the run command.
pub fn run(args: RunArgs) -> anyhow::Result<()> {
    let (topology, graph) = load_graph(&args.topology)?;
    let hosts: Vec<(PipelineId, ComponentId)> = topology
        .pipelines
        .iter()
        .map(|p| (PipelineId(p.id), ComponentId(p.host())))
        .collect();

    let runtime = Runtime::new(graph, topology.sched_config())?;
    let stream = StreamParams::default();

    for &(id, host) in &hosts {
        runtime
            .params(id, host, &stream)
            .with_context(|| format!("pipeline {id}: params failed"))?;
        runtime
            .prepare(id, host)
            .with_context(|| format!("pipeline {id}: prepare failed"))?;
        runtime
            .trigger(id, host, TriggerCmd::Start)
            .with_context(|| format!("pipeline {id}: start failed"))?;
        tracing::info!(pipeline = id.index(), "started");
    }

    thread::sleep(Duration::from_millis(args.duration_ms));

    let report = collect_report(&runtime, &hosts, args.duration_ms)?;

    for &(id, host) in &hosts {
        // A pipeline stopped by an xrun is already paused.
        if let Err(e) = runtime.trigger(id, host, TriggerCmd::Stop) {
            tracing::warn!(pipeline = id.index(), error = %e, "stop failed");
        }
        runtime.reset(id, host)?;
    }
    runtime.shutdown();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn collect_report(
    runtime: &Runtime,
    hosts: &[(PipelineId, ComponentId)],
    duration_ms: u64,
) -> anyhow::Result<RunReport> {
    let mut pipelines = Vec::with_capacity(hosts.len());
    for &(id, host) in hosts {
        let posn = runtime.timestamp(id, host)?;
        let (direction, status) = runtime.with_graph(|graph| {
            graph
                .get_pipeline(id)
                .map(|p| (p.direction().name(), p.status().name()))
        })?;
        let stats = runtime.task_stats(id).unwrap_or_default();
        pipelines.push(PipelineReport {
            id: id.index(),
            direction,
            status,
            host_posn: posn.host_posn,
            dai_posn: posn.dai_posn,
            ticks: stats.ticks,
            failures: stats.failures,
        });
    }

    let cores = runtime
        .stats()
        .into_iter()
        .map(|s| CoreReport {
            core: s.core,
            runs: s.runs,
            overruns: s.overruns,
            avg_us: s.avg.as_micros() as u64,
            max_us: s.max.as_micros() as u64,
        })
        .collect();

    Ok(RunReport {
        duration_ms,
        pipelines,
        cores,
    })
}

#[allow(clippy::print_literal)]
fn print_report(report: &RunReport) {
    println!("Ran for {} ms", report.duration_ms);
    println!();
    println!(
        "  {:>3}  {:8}  {:8}  {:>10}  {:>10}  {:>6}  {:>5}",
        "id", "dir", "status", "host", "dai", "ticks", "fail"
    );
    for p in &report.pipelines {
        println!(
            "  {:>3}  {:8}  {:8}  {:>10}  {:>10}  {:>6}  {:>5}",
            p.id, p.direction, p.status, p.host_posn, p.dai_posn, p.ticks, p.failures
        );
    }
    println!();
    for c in &report.cores {
        println!(
            "  core {}: {} runs, {} overruns, avg {} us, max {} us",
            c.core, c.runs, c.overruns, c.avg_us, c.max_us
        );
    }
}
