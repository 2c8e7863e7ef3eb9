//! Print the visit order of a graph walk.

use std::path::PathBuf;

use cadence_core::{
    BufferId, ComponentId, Result, Status, Visitor, WalkContext, WalkDirection, for_each_connected,
    walk,
};
use clap::Args;

use super::common::load_graph;

/// Walk a topology's graph from one component.
#[derive(Args)]
pub struct WalkArgs {
    /// Path to the topology TOML file
    pub topology: PathBuf,

    /// Component id to start from
    #[arg(long, value_name = "COMPONENT")]
    pub from: u32,

    /// Follow sources towards producers instead of sinks towards consumers
    #[arg(long)]
    pub upstream: bool,
}

/// One visited component.
struct Step {
    depth: usize,
    component: ComponentId,
    via: Option<BufferId>,
}

#[derive(Default)]
struct Trace {
    depth: usize,
    steps: Vec<Step>,
}

impl Visitor for Trace {
    fn visit(
        &mut self,
        ctx: &mut WalkContext<'_>,
        current: ComponentId,
        calling: Option<BufferId>,
        dir: WalkDirection,
    ) -> Result<Status> {
        self.steps.push(Step {
            depth: self.depth,
            component: current,
            via: calling,
        });
        self.depth += 1;
        let status = for_each_connected(self, ctx, current, dir);
        self.depth -= 1;
        status
    }
}

/// Run the walk command.
pub fn run(args: WalkArgs) -> anyhow::Result<()> {
    let (_, graph) = load_graph(&args.topology)?;
    let start = ComponentId(args.from);
    graph.node(start)?;
    let dir = if args.upstream {
        WalkDirection::Upstream
    } else {
        WalkDirection::Downstream
    };

    let mut trace = Trace::default();
    let mut ctx = WalkContext::new(&graph).skip_incomplete(true);
    walk(&mut trace, &mut ctx, start, dir)?;

    println!("Walk from component {} ({dir:?}):", args.from);
    for step in &trace.steps {
        let node = graph.node(step.component)?;
        let via = step
            .via
            .map(|b| format!("  via buffer {}", b.index()))
            .unwrap_or_default();
        println!(
            "{}{:3}  {:6}  pipeline {}  {}{via}",
            "  ".repeat(step.depth + 1),
            step.component.index(),
            node.kind().name(),
            node.pipeline_id().index(),
            node.state().name(),
        );
    }
    Ok(())
}
