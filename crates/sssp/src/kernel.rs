use std::sync::atomic::{AtomicBool, Ordering};

use bsp_graph::PGraph;
use rayon::prelude::*;

use crate::state::{Dist, NodeState, DIST_FIELD, INF};

/// One push relaxation pass over the owned prefix.
///
/// For every owned source the committed distance is combined with each
/// outgoing edge weight and raced into the target's write slot under a
/// `new < old` compare-and-swap, so the slot only ever decreases. Candidates
/// reaching the sentinel are clamped away instead of relaxed.
pub(crate) fn relax(graph: &PGraph, nodes: &[NodeState]) -> bool {
    let changed = AtomicBool::new(false);

    (0..graph.num_owned() as usize)
        .into_par_iter()
        .for_each(|src| {
            let src_dist = nodes[src].current(DIST_FIELD).load(Ordering::Acquire);
            for edge in graph.edges(src as u32) {
                let candidate = src_dist as i64 + edge.weight as i64;
                if candidate >= INF as i64 {
                    continue;
                }
                let candidate = candidate as Dist;

                let slot = nodes[edge.target as usize].next(DIST_FIELD);
                let mut old_dist = slot.load(Ordering::Acquire);
                while candidate < old_dist {
                    match slot.compare_exchange_weak(
                        old_dist,
                        candidate,
                        Ordering::Release,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => {
                            changed.store(true, Ordering::Relaxed);
                            break;
                        }
                        // CAX failed -> retry against the new minimum
                        Err(min_dist) => old_dist = min_dist,
                    }
                }
            }
        });

    changed.load(Ordering::Relaxed)
}

/// Closes the round: collapse both slots of every local vertex, owned and
/// ghost, and flip the version bit. Runs without concurrent relaxation.
pub(crate) fn commit(nodes: &[NodeState]) {
    nodes.par_iter().for_each(|node| node.commit(DIST_FIELD));
}
