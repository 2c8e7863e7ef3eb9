//! Xrun bookkeeping.
//!
//! A pipeline with a non-zero `xrun_bytes` has a starvation or backlog
//! condition pending. Its periodic task stops copying, and triggers go through
//! [`handle_trigger`] before touching any component.

use crate::component::{ComponentId, ComponentState, Direction, TriggerCmd};
use crate::error::{Result, Status};
use crate::graph::Graph;

use super::{Pipeline, PipelineId};

/// Marks `id` as being in xrun. A second report while one is pending is
/// ignored.
pub fn report_xrun(graph: &Graph, id: PipelineId, bytes: u32) -> Result<()> {
    let pipeline = graph.get_pipeline(id)?;
    if pipeline.xrun_bytes() != 0 {
        tracing::debug!("pipeline_xrun: {id} already in xrun");
        return Ok(());
    }
    pipeline.set_xrun_bytes(bytes.max(1));
    tracing::warn!("pipeline_xrun: {id} {bytes} bytes");
    Ok(())
}

/// Decides what a trigger does while an xrun is pending.
///
/// STOP, PAUSE and XRUN have nothing left to do and report
/// [`Status::PathStop`]. START, RELEASE and RESET go ahead; they clear the
/// xrun once the walk succeeds.
pub(crate) fn handle_trigger(pipeline: &Pipeline, cmd: TriggerCmd) -> Status {
    match cmd {
        TriggerCmd::Stop | TriggerCmd::Pause | TriggerCmd::Xrun => {
            tracing::debug!("pipeline_xrun_handle_trigger: {} in xrun, {cmd} is a no-op", pipeline.id());
            Status::PathStop
        }
        _ => Status::Continue,
    }
}

/// Climbs from `entry` against the stream direction to the host of the
/// active chain it belongs to.
///
/// An xrun can surface on a pipeline that is not attached to the host. Each
/// step follows the first upstream (playback) or downstream (capture) buffer
/// leading to an ACTIVE or PREPARE pipeline and jumps to that pipeline's host
/// end. The climb ends at a component with nothing on that side.
pub(crate) fn find_host(graph: &Graph, entry: ComponentId) -> Result<ComponentId> {
    let mut host = entry;
    for _ in 0..=graph.pipeline_count() {
        let node = graph.node(host)?;
        let direction = node.direction();
        let list = match direction {
            Direction::Playback => node.sources(),
            Direction::Capture => node.sinks(),
        };
        if list.is_empty() {
            return Ok(host);
        }

        let mut next = None;
        for &buf in list {
            let buffer = graph.get_buffer(buf)?;
            let far = match direction {
                Direction::Playback => buffer.source(),
                Direction::Capture => buffer.sink(),
            };
            let Some(pid) = far.and_then(|c| graph.component(c)).and_then(|n| n.pipeline()) else {
                continue;
            };
            let pipeline = graph.get_pipeline(pid)?;
            if matches!(pipeline.status(), ComponentState::Active | ComponentState::Prepare) {
                next = match direction {
                    Direction::Playback => pipeline.source_comp(),
                    Direction::Capture => pipeline.sink_comp(),
                };
                break;
            }
        }

        match next {
            Some(comp) if comp != host => host = comp,
            Some(_) => return Ok(host),
            None => {
                tracing::error!("pipeline_trigger_xrun: no active pipeline found to link to {host}");
                return Ok(host);
            }
        }
    }
    Ok(host)
}
