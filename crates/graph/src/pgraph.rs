use std::ops::Range;
use std::time::Instant;

use fxhash::FxHashMap;
use log::info;

use crate::csr::{Csr, Target};
use crate::input::shard::Shard;
use crate::{Error, Gid, HostId, Lid};

/// One host's share of a partitioned graph.
///
/// Local indices are laid out as an owned prefix `[0, num_owned)` followed by
/// a ghost suffix `[num_owned, num_nodes)`. Owned vertices map onto the
/// contiguous global range `[g_offset, g_offset + num_owned)`; ghost vertices
/// are exactly the targets of owned edges whose owner is another host,
/// assigned local indices in ascending global order.
///
/// Edges are stored in CSR form keyed by owned source index. Edge targets are
/// local indices and may point into the ghost suffix.
#[derive(Debug)]
pub struct PGraph {
    id: HostId,
    g_offset: Gid,
    csr: Csr,
    l2g: Box<[Gid]>,
    ghost_lids: FxHashMap<Gid, Lid>,
    part_offsets: Box<[Gid]>,
}

impl PGraph {
    /// Builds the local graph from a shard.
    ///
    /// The shard must carry edges whose sources are all owned by the shard's
    /// host; the partition offsets must start at zero and be non-decreasing.
    pub fn from_shard(shard: Shard) -> Result<Self, Error> {
        let start = Instant::now();

        let Shard {
            num_hosts,
            id,
            part_offsets,
            edges,
        } = shard;

        if num_hosts == 0 || id >= num_hosts {
            return Err(Error::InvalidShard(format!(
                "host id {id} out of range for {num_hosts} hosts"
            )));
        }
        if part_offsets.len() != num_hosts as usize + 1 {
            return Err(Error::InvalidShard(format!(
                "expected {} partition offsets, got {}",
                num_hosts + 1,
                part_offsets.len()
            )));
        }
        if part_offsets[0] != 0 || part_offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::InvalidShard(
                "partition offsets must start at 0 and be non-decreasing".to_string(),
            ));
        }

        let g_offset = part_offsets[id as usize];
        let num_owned = part_offsets[id as usize + 1] - g_offset;
        let num_global = part_offsets[num_hosts as usize];
        let owned = g_offset..g_offset + num_owned;

        for &(src, dst, _) in &edges {
            if !owned.contains(&src) {
                return Err(Error::InvalidShard(format!(
                    "edge source {src} is not owned by host {id}"
                )));
            }
            if dst >= num_global {
                return Err(Error::InvalidShard(format!(
                    "edge target {dst} exceeds the global vertex count {num_global}"
                )));
            }
        }

        let mut ghosts: Vec<Gid> = edges
            .iter()
            .map(|&(_, dst, _)| dst)
            .filter(|dst| !owned.contains(dst))
            .collect();
        ghosts.sort_unstable();
        ghosts.dedup();

        let mut l2g = Vec::with_capacity(num_owned as usize + ghosts.len());
        l2g.extend(owned.clone());
        l2g.extend_from_slice(&ghosts);

        let mut ghost_lids =
            FxHashMap::with_capacity_and_hasher(ghosts.len(), Default::default());
        for (i, &gid) in ghosts.iter().enumerate() {
            ghost_lids.insert(gid, num_owned + i as u32);
        }

        let to_lid = |gid: Gid| -> Lid {
            if owned.contains(&gid) {
                gid - g_offset
            } else {
                ghost_lids[&gid]
            }
        };

        let mut offsets = vec![0u32; num_owned as usize + 1];
        for &(src, _, _) in &edges {
            offsets[(src - g_offset) as usize + 1] += 1;
        }
        for i in 1..offsets.len() {
            offsets[i] += offsets[i - 1];
        }

        let mut cursor = offsets.clone();
        let mut targets = vec![Target::new(0, 0); edges.len()];
        for &(src, dst, weight) in &edges {
            let slot = &mut cursor[(src - g_offset) as usize];
            targets[*slot as usize] = Target::new(to_lid(dst), weight);
            *slot += 1;
        }

        let graph = Self {
            id,
            g_offset,
            csr: Csr::new(offsets.into_boxed_slice(), targets.into_boxed_slice()),
            l2g: l2g.into_boxed_slice(),
            ghost_lids,
            part_offsets: part_offsets.into_boxed_slice(),
        };

        info!(
            "host {}: built local graph ({} owned, {} ghosts, {} edges) in {:?}",
            graph.id,
            graph.num_owned(),
            graph.num_nodes() - graph.num_owned(),
            graph.num_edges(),
            start.elapsed()
        );

        Ok(graph)
    }

    #[inline]
    pub fn host_id(&self) -> HostId {
        self.id
    }

    #[inline]
    pub fn num_hosts(&self) -> u32 {
        self.part_offsets.len() as u32 - 1
    }

    /// Total local vertices, owned and ghost.
    #[inline]
    pub fn num_nodes(&self) -> u32 {
        self.l2g.len() as u32
    }

    /// Owned vertices, exactly the CSR rows.
    #[inline]
    pub fn num_owned(&self) -> u32 {
        self.csr.node_count()
    }

    /// Number of edges stored on this host, all with owned sources.
    #[inline]
    pub fn num_edges(&self) -> u32 {
        self.csr.edge_count()
    }

    /// Global identifier of the first owned vertex.
    #[inline]
    pub fn g_offset(&self) -> Gid {
        self.g_offset
    }

    /// The owned prefix of the local index space.
    #[inline]
    pub fn owned_nodes(&self) -> Range<Lid> {
        0..self.num_owned()
    }

    /// The ghost suffix of the local index space.
    #[inline]
    pub fn ghost_nodes(&self) -> Range<Lid> {
        self.num_owned()..self.num_nodes()
    }

    /// Resolves a global identifier to its local index.
    pub fn g2l(&self, gid: Gid) -> Result<Lid, Error> {
        if gid >= self.g_offset && gid < self.g_offset + self.num_owned() {
            return Ok(gid - self.g_offset);
        }
        self.ghost_lids
            .get(&gid)
            .copied()
            .ok_or(Error::UnknownVertex {
                gid,
                host: self.id,
            })
    }

    /// Global identifier of a local vertex. Total over `[0, num_nodes)`.
    #[inline]
    pub fn l2g(&self, node: Lid) -> Gid {
        self.l2g[node as usize]
    }

    /// The host owning a global identifier.
    pub fn host_of(&self, gid: Gid) -> Result<HostId, Error> {
        if gid >= self.part_offsets[self.part_offsets.len() - 1] {
            return Err(Error::UnknownVertex {
                gid,
                host: self.id,
            });
        }
        Ok(self.part_offsets.partition_point(|&offset| offset <= gid) as HostId - 1)
    }

    /// Outgoing edges of a local vertex. Ghost vertices have no stored edges.
    #[inline]
    pub fn edges(&self, node: Lid) -> &[Target] {
        if node < self.num_owned() {
            self.csr.targets(node)
        } else {
            &[]
        }
    }
}
