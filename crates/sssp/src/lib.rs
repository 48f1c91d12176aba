//! Bulk-synchronous single-source shortest paths over partitioned graphs.
//!
//! Each host owns a contiguous range of vertices of a sharded transpose
//! graph and keeps ghost copies of the remote vertices its edges point at.
//! Computation proceeds in rounds separated by global barriers: boundary
//! distances are exchanged, the push relaxation kernel races candidate
//! distances into double-buffered vertex state under compare-and-swap, the
//! round commits by collapsing the two buffers, and the hosts vote on an
//! OR-reduced changed flag to decide termination.
//!
//! # Running on a single host
//!
//! ```
//! use std::sync::Arc;
//!
//! use bsp_graph::prelude::*;
//! use bsp_net::LocalCluster;
//! use bsp_sssp::{BackendKind, ComputeBackend, SsspConfig};
//!
//! let shard = Shard {
//!     num_hosts: 1,
//!     id: 0,
//!     part_offsets: vec![0, 4],
//!     edges: vec![(0, 1, 1), (1, 2, 1), (2, 3, 1)],
//! };
//! let graph = Arc::new(PGraph::from_shard(shard).unwrap());
//! let backend = BackendKind::Cpu.create(Arc::clone(&graph)).unwrap();
//! let net = Arc::new(LocalCluster::new(1).pop().unwrap());
//!
//! let stats = bsp_sssp::run(
//!     Arc::clone(&graph),
//!     Arc::clone(&backend),
//!     net,
//!     SsspConfig::new(0, 5),
//! )
//! .unwrap();
//!
//! assert!(stats.converged);
//! let distances: Vec<_> = (0..4).map(|node| backend.node_value(node)).collect();
//! assert_eq!(distances, vec![0, 1, 2, 3]);
//! ```
//!
//! Multi-host runs hand each host thread its own shard, back-end and
//! [`bsp_net::Transport`] endpoint; see the `sssp` binary.

pub mod backend;
pub mod driver;
mod kernel;
pub mod state;
pub mod sync;

pub use crate::backend::{BackendKind, ComputeBackend, CpuBackend};
pub use crate::driver::{run, RunStats, SsspConfig};
pub use crate::state::{Dist, NodeState, DIST_FIELD, INF};

use bsp_graph::HostId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Graph(#[from] bsp_graph::Error),
    #[error(transparent)]
    Net(#[from] bsp_net::Error),
    #[error("message codec error")]
    Codec(#[from] bincode::Error),
    #[error("{kind} backend initialization failed: {reason}")]
    BackendInit {
        kind: &'static str,
        reason: String,
    },
    /// The replica registry recorded a different number of ghosts than the
    /// replicating host announced. Fatal after the bootstrap barrier.
    #[error("replica registry mismatch: host {host} announced {expected} replicas, {actual} recorded")]
    BootstrapInconsistency {
        host: HostId,
        expected: u64,
        actual: u64,
    },
    #[error("no valid graph handle for host {host}")]
    BadGraphHandle { host: HostId },
}
