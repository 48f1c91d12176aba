use std::sync::Arc;
use std::time::Instant;

use bsp_graph::{Gid, PGraph};
use bsp_net::Transport;
use log::info;

use crate::backend::ComputeBackend;
use crate::sync::GhostSync;
use crate::Error;

/// Round and termination parameters.
#[derive(Clone, Copy, Debug)]
pub struct SsspConfig {
    /// Global id of the vertex to compute distances from.
    pub src_node: Gid,
    /// Round cap. Hitting it is the documented early stop, not an error.
    pub max_iterations: usize,
}

impl Default for SsspConfig {
    fn default() -> Self {
        Self {
            src_node: 0,
            max_iterations: 4,
        }
    }
}

impl SsspConfig {
    pub fn new(src_node: Gid, max_iterations: usize) -> Self {
        Self {
            src_node,
            max_iterations,
        }
    }
}

/// What the driver observed at termination.
#[derive(Clone, Copy, Debug)]
pub struct RunStats {
    /// Rounds executed. Rounds are counted from zero, so a run that detects
    /// the fixed point in round `r` reports `r + 1` here.
    pub rounds: usize,
    /// Whether the cluster reached a fixed point within the round cap.
    pub converged: bool,
}

/// Runs the bulk-synchronous driver to termination.
///
/// Per round: exchange ghost cells, barrier, compute and commit, broadcast
/// the local changed flag, barrier, OR-reduce. All hosts leave the loop at
/// the same round boundary. A final exchange after the last vote leaves
/// every replica at the owner's finalized value.
pub fn run(
    graph: Arc<PGraph>,
    backend: Arc<dyn ComputeBackend>,
    net: Arc<dyn Transport>,
    config: SsspConfig,
) -> Result<RunStats, Error> {
    let sync = GhostSync::new(Arc::clone(&graph), Arc::clone(&backend));
    GhostSync::register(&sync, net.as_ref());

    backend.init();
    if graph.host_of(config.src_node)? == graph.host_id() {
        info!(
            "host {}: initialized source {} to zero",
            graph.host_id(),
            config.src_node
        );
        backend.set_node_value(graph.g2l(config.src_node)?, 0);
    }
    net.barrier()?;

    sync.bootstrap(net.as_ref())?;
    net.barrier()?;
    sync.check_fatal()?;

    let mut rounds = 0;
    let mut converged = false;

    for round in 0..config.max_iterations {
        sync.send_ghost_cells(net.as_ref())?;
        net.barrier()?;
        sync.check_fatal()?;

        let start = Instant::now();
        let local_changed = backend.relax_round();
        info!(
            "host {}: round {} computed in {:?}",
            graph.host_id(),
            round,
            start.elapsed()
        );

        sync.broadcast_changed(net.as_ref(), local_changed)?;
        net.barrier()?;
        sync.check_fatal()?;

        let remote_changed = sync.take_remote_changed();
        rounds = round + 1;

        if !(local_changed || remote_changed) {
            info!("host {}: terminating after {} steps", graph.host_id(), round);
            converged = true;
            break;
        }
    }

    if !converged {
        info!(
            "host {}: terminating after max={} steps",
            graph.host_id(),
            config.max_iterations
        );
    }

    // Final exchange so replicas reflect the finalized owner distances.
    sync.send_ghost_cells(net.as_ref())?;
    net.barrier()?;
    sync.check_fatal()?;

    Ok(RunStats { rounds, converged })
}
