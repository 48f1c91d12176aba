use crate::pgraph::PGraph;
use crate::{Gid, HostId, Lid};

/// Contiguous hand-off format consumed by accelerator back-ends.
///
/// `row_start` has `nnodes + 1` entries covering owned and ghost rows alike
/// (ghost rows are empty), `edge_dst` has `nedges` entries. Destinations
/// outside the local index range are dropped at marshal time, and `nedges`
/// reflects the count after dropping.
#[derive(Debug)]
pub struct MarshalGraph {
    pub nnodes: u32,
    pub nedges: u32,
    pub nowned: u32,
    pub g_offset: Gid,
    pub id: HostId,
    pub row_start: Box<[u32]>,
    pub edge_dst: Box<[Lid]>,
}

impl From<&PGraph> for MarshalGraph {
    fn from(graph: &PGraph) -> Self {
        let nnodes = graph.num_nodes();

        let mut row_start = Vec::with_capacity(nnodes as usize + 1);
        let mut edge_dst = Vec::with_capacity(graph.num_edges() as usize);

        for node in 0..nnodes {
            row_start.push(edge_dst.len() as u32);
            for edge in graph.edges(node) {
                if edge.target < nnodes {
                    edge_dst.push(edge.target);
                }
            }
        }
        row_start.push(edge_dst.len() as u32);

        Self {
            nnodes,
            nedges: edge_dst.len() as u32,
            nowned: graph.num_owned(),
            g_offset: graph.g_offset(),
            id: graph.host_id(),
            row_start: row_start.into_boxed_slice(),
            edge_dst: edge_dst.into_boxed_slice(),
        }
    }
}
