//! Partitioned graphs for distributed bulk-synchronous computation.
//!
//! A graph is split into one shard per host. Each host stores the vertices it
//! owns as a contiguous prefix of its local index space, followed by *ghost*
//! vertices: local copies of remote vertices that appear as targets of owned
//! edges. The topology of the owned vertices is kept in a
//! Compressed-Sparse-Row structure tailored for concurrent reads.
//!
//! # Building a partitioned graph
//!
//! A [`PGraph`] is built from a [`Shard`], which can be constructed
//! programmatically or read from a shard file with [`read_shard`]:
//!
//! ```
//! use bsp_graph::prelude::*;
//!
//! // Host 0 of 2 owns global vertices 0 and 1. The edge 1 -> 2 crosses the
//! // partition boundary, so vertex 2 becomes a ghost on this host.
//! let shard = Shard {
//!     num_hosts: 2,
//!     id: 0,
//!     part_offsets: vec![0, 2, 4],
//!     edges: vec![(0, 1, 5), (1, 2, 2)],
//! };
//!
//! let graph = PGraph::from_shard(shard).unwrap();
//!
//! assert_eq!(graph.num_nodes(), 3);
//! assert_eq!(graph.num_owned(), 2);
//! assert_eq!(graph.ghost_nodes(), 2..3);
//!
//! assert_eq!(graph.g2l(2).unwrap(), 2);
//! assert_eq!(graph.l2g(2), 2);
//! assert_eq!(graph.host_of(2).unwrap(), 1);
//!
//! assert_eq!(graph.edges(1), &[Target::new(2, 2)]);
//! ```

pub mod csr;
pub mod input;
pub mod marshal;
pub mod pgraph;
pub mod prelude;

pub use crate::csr::Target;
pub use crate::input::shard::{read_shard, Shard};
pub use crate::marshal::MarshalGraph;
pub use crate::pgraph::PGraph;

use thiserror::Error;

/// Global vertex identifier, unique across the whole graph.
pub type Gid = u32;

/// Local vertex index on a single host. Owned vertices occupy the prefix
/// `[0, num_owned)`, ghost vertices the suffix `[num_owned, num_nodes)`.
pub type Lid = u32;

/// Identifier of a host within the cluster, in `[0, num_hosts)`.
pub type HostId = u32;

/// Non-negative edge weight.
pub type Weight = u32;

#[derive(Error, Debug)]
pub enum Error {
    /// The global identifier is neither owned by nor replicated on this host.
    #[error("unknown vertex {gid} on host {host}")]
    UnknownVertex { gid: Gid, host: HostId },
    #[error("error while reading shard")]
    IoError {
        #[from]
        source: std::io::Error,
    },
    #[error("invalid shard: {0}")]
    InvalidShard(String),
}
