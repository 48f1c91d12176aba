use std::sync::atomic::Ordering;
use std::sync::Arc;

use bsp_graph::{Lid, PGraph};

use crate::kernel;
use crate::state::{Dist, NodeState, DIST_FIELD, INF};
use crate::Error;

/// The contract a compute back-end must honor.
///
/// The driver initializes the back-end once, runs one relaxation round per
/// BSP round and reads or writes per-vertex distances by local index; ghost
/// receives and result extraction go through the same read/write pair.
/// Accelerator back-ends initialize from the marshaled form of the local
/// graph ([`bsp_graph::MarshalGraph`]); the CPU back-end reads the
/// [`PGraph`] directly.
pub trait ComputeBackend: Send + Sync {
    /// Resets every local vertex to the unreachable sentinel.
    fn init(&self);

    /// One relaxation round (kernel plus commit) over the owned prefix.
    /// Returns whether any tentative distance was lowered.
    fn relax_round(&self) -> bool;

    /// The committed distance of a local vertex.
    fn node_value(&self, node: Lid) -> Dist;

    /// Lowers the committed distance of a local vertex to
    /// `min(current, value)`.
    fn set_node_value(&self, node: Lid, value: Dist);
}

/// Shared-memory back-end running the relaxation kernel on the rayon pool.
pub struct CpuBackend {
    graph: Arc<PGraph>,
    nodes: Box<[NodeState]>,
}

impl CpuBackend {
    pub fn new(graph: Arc<PGraph>) -> Self {
        let mut nodes = Vec::with_capacity(graph.num_nodes() as usize);
        nodes.resize_with(graph.num_nodes() as usize, || NodeState::new(INF));
        Self {
            graph,
            nodes: nodes.into_boxed_slice(),
        }
    }
}

impl ComputeBackend for CpuBackend {
    fn init(&self) {
        for node in self.nodes.iter() {
            node.reset(INF);
        }
    }

    fn relax_round(&self) -> bool {
        let changed = kernel::relax(&self.graph, &self.nodes);
        kernel::commit(&self.nodes);
        changed
    }

    fn node_value(&self, node: Lid) -> Dist {
        self.nodes[node as usize]
            .current(DIST_FIELD)
            .load(Ordering::Acquire)
    }

    fn set_node_value(&self, node: Lid, value: Dist) {
        self.nodes[node as usize]
            .current(DIST_FIELD)
            .fetch_min(value, Ordering::AcqRel);
    }
}

/// Per-host back-end personality, selected by the pset letters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BackendKind {
    Cpu,
    Cuda,
    OpenCl,
}

impl BackendKind {
    /// Maps a pset letter; unrecognized letters mean CPU.
    pub fn from_pset(letter: char) -> Self {
        match letter {
            'g' => Self::Cuda,
            'o' => Self::OpenCl,
            _ => Self::Cpu,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "gpu_cuda",
            Self::OpenCl => "gpu_opencl",
        }
    }

    /// Instantiates the back-end for a local graph.
    ///
    /// This build carries only the CPU implementation; selecting an
    /// accelerator personality fails and the host exits.
    pub fn create(self, graph: Arc<PGraph>) -> Result<Arc<dyn ComputeBackend>, Error> {
        match self {
            Self::Cpu => Ok(Arc::new(CpuBackend::new(graph))),
            Self::Cuda | Self::OpenCl => Err(Error::BackendInit {
                kind: self.name(),
                reason: "accelerator support is not compiled in".to_string(),
            }),
        }
    }
}
