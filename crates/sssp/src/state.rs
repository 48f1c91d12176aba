use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

/// Tentative shortest-path distance.
pub type Dist = i32;

/// The unreachable sentinel: large enough to dominate every real distance,
/// small enough that `INF + weight` cannot overflow the distance type when
/// computed in a wider intermediate.
pub const INF: Dist = i32::MAX / 4;

/// Bit index of the distance field in the per-vertex version word.
pub const DIST_FIELD: u32 = 0;

/// Per-vertex double-buffered state.
///
/// Each field owns two slots and one bit of the version word. During a round
/// the slot selected by the bit is read-only input; the opposite slot is the
/// only write target. Committing flips the bit, turning the written slot
/// into the next round's input. The version word leaves room for further
/// double-buffered fields next to the distance.
#[derive(Debug)]
pub struct NodeState {
    version: AtomicU32,
    dist: [AtomicI32; 2],
}

impl NodeState {
    pub fn new(dist: Dist) -> Self {
        Self {
            version: AtomicU32::new(0),
            dist: [AtomicI32::new(dist), AtomicI32::new(dist)],
        }
    }

    #[inline]
    pub fn current_version(&self, field: u32) -> usize {
        ((self.version.load(Ordering::Relaxed) >> field) & 1) as usize
    }

    #[inline]
    pub fn next_version(&self, field: u32) -> usize {
        self.current_version(field) ^ 1
    }

    /// The committed slot; read-only while a round computes.
    #[inline]
    pub fn current(&self, field: u32) -> &AtomicI32 {
        &self.dist[self.current_version(field)]
    }

    /// The write target of the running round.
    #[inline]
    pub fn next(&self, field: u32) -> &AtomicI32 {
        &self.dist[self.next_version(field)]
    }

    /// Flips the version bit. Never runs concurrently with slot access.
    #[inline]
    pub fn swap_version(&self, field: u32) {
        self.version.fetch_xor(1 << field, Ordering::AcqRel);
    }

    /// Collapses both slots to their minimum and flips the version bit.
    pub fn commit(&self, field: u32) {
        let committed = Dist::min(
            self.dist[0].load(Ordering::Relaxed),
            self.dist[1].load(Ordering::Relaxed),
        );
        self.dist[0].store(committed, Ordering::Relaxed);
        self.dist[1].store(committed, Ordering::Relaxed);
        self.swap_version(field);
    }

    /// Resets both slots and the version word. Init-time only.
    pub fn reset(&self, dist: Dist) {
        self.dist[0].store(dist, Ordering::Relaxed);
        self.dist[1].store(dist, Ordering::Relaxed);
        self.version.store(0, Ordering::Relaxed);
    }
}
