use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bsp_graph::{Gid, HostId, PGraph};
use bsp_net::{HandlerId, Transport};
use log::info;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::backend::ComputeBackend;
use crate::state::Dist;
use crate::Error;

/// Handler ids, stable across all hosts.
pub const SET_REMOTE_HANDLE: HandlerId = HandlerId(0x10);
pub const RECORD_REPLICA: HandlerId = HandlerId(0x11);
pub const REPLICA_COUNT: HandlerId = HandlerId(0x12);
pub const SET_NODE_VALUE: HandlerId = HandlerId(0x13);
pub const CHANGED_FLAG: HandlerId = HandlerId(0x14);

#[derive(Debug, Serialize, Deserialize)]
struct RemoteHandle {
    token: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ReplicaRequest {
    gid: Gid,
}

#[derive(Debug, Serialize, Deserialize)]
struct ReplicaCount {
    expected: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeUpdate {
    token: u64,
    gid: Gid,
    dist: Dist,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChangedFlag {
    changed: bool,
}

/// Exchanges boundary-vertex distances between hosts at round boundaries.
///
/// Bootstrap publishes an opaque graph handle per host and fills the replica
/// registry: for every other host, the owned GIDs that host keeps a ghost
/// copy of. Each round the committed distance of every boundary vertex then
/// crosses the wire in both directions (owner out to replicas, ghost copies
/// back to their owner) and receives fold in under `min`, so a completed
/// exchange leaves every copy of a vertex with the same value.
///
/// Receive routines run on the transport's progress context, strictly
/// outside kernel execution windows; failures they cannot return are parked
/// in a fatal slot and surfaced at the next barrier.
pub struct GhostSync {
    graph: Arc<PGraph>,
    backend: Arc<dyn ComputeBackend>,
    token: u64,
    handles: Mutex<Vec<Option<u64>>>,
    replicas: Mutex<Vec<Vec<Gid>>>,
    remote_changed: AtomicBool,
    fatal: Mutex<Option<Error>>,
}

impl GhostSync {
    pub fn new(graph: Arc<PGraph>, backend: Arc<dyn ComputeBackend>) -> Arc<Self> {
        let num_hosts = graph.num_hosts() as usize;
        Arc::new(Self {
            token: graph_token(graph.host_id()),
            handles: Mutex::new(vec![None; num_hosts]),
            replicas: Mutex::new(vec![Vec::new(); num_hosts]),
            remote_changed: AtomicBool::new(false),
            fatal: Mutex::new(None),
            graph,
            backend,
        })
    }

    /// Registers the receive routines on the transport.
    pub fn register(sync: &Arc<Self>, net: &dyn Transport) {
        let this = Arc::clone(sync);
        net.register(
            SET_REMOTE_HANDLE,
            Arc::new(move |src: HostId, payload: &[u8]| this.on_remote_handle(src, payload)),
        );
        let this = Arc::clone(sync);
        net.register(
            RECORD_REPLICA,
            Arc::new(move |src: HostId, payload: &[u8]| this.on_replica_request(src, payload)),
        );
        let this = Arc::clone(sync);
        net.register(
            REPLICA_COUNT,
            Arc::new(move |src: HostId, payload: &[u8]| this.on_replica_count(src, payload)),
        );
        let this = Arc::clone(sync);
        net.register(
            SET_NODE_VALUE,
            Arc::new(move |src: HostId, payload: &[u8]| this.on_node_value(src, payload)),
        );
        let this = Arc::clone(sync);
        net.register(
            CHANGED_FLAG,
            Arc::new(move |src: HostId, payload: &[u8]| this.on_changed_flag(src, payload)),
        );
    }

    /// Publishes this host's graph handle to every host, asks the owner of
    /// every local ghost to record the replica, and announces per-owner
    /// replica counts for the bootstrap cross-check. The caller barriers
    /// afterwards and then checks [`check_fatal`](Self::check_fatal).
    pub fn bootstrap(&self, net: &dyn Transport) -> Result<(), Error> {
        let handle = bincode::serialize(&RemoteHandle { token: self.token })?;
        for host in 0..self.graph.num_hosts() {
            net.send(host, SET_REMOTE_HANDLE, handle.clone())?;
        }

        let mut announced = vec![0_u64; self.graph.num_hosts() as usize];
        for node in self.graph.ghost_nodes() {
            let gid = self.graph.l2g(node);
            let owner = self.graph.host_of(gid)?;
            net.send(owner, RECORD_REPLICA, bincode::serialize(&ReplicaRequest { gid })?)?;
            announced[owner as usize] += 1;
        }

        // Counts trail the requests on each FIFO link, so every owner can
        // verify its registry slice as soon as the count arrives.
        for (host, &expected) in announced.iter().enumerate() {
            net.send(
                host as HostId,
                REPLICA_COUNT,
                bincode::serialize(&ReplicaCount { expected })?,
            )?;
        }

        info!(
            "host {}: bootstrap sent, {} ghost cells to register",
            self.graph.host_id(),
            self.graph.ghost_nodes().len()
        );
        Ok(())
    }

    /// One exchange step: owned boundary values out to every replica holder,
    /// ghost copies back to their owners.
    pub fn send_ghost_cells(&self, net: &dyn Transport) -> Result<(), Error> {
        let handles = self.handles.lock();
        let replicas = self.replicas.lock();

        for (host, gids) in replicas.iter().enumerate() {
            if gids.is_empty() {
                continue;
            }
            let token = handles[host].ok_or(Error::BadGraphHandle {
                host: host as HostId,
            })?;
            for &gid in gids {
                let dist = self.backend.node_value(gid - self.graph.g_offset());
                net.send(
                    host as HostId,
                    SET_NODE_VALUE,
                    bincode::serialize(&NodeUpdate { token, gid, dist })?,
                )?;
            }
        }

        for node in self.graph.ghost_nodes() {
            let gid = self.graph.l2g(node);
            let owner = self.graph.host_of(gid)?;
            let token = handles[owner as usize].ok_or(Error::BadGraphHandle { host: owner })?;
            let dist = self.backend.node_value(node);
            net.send(
                owner,
                SET_NODE_VALUE,
                bincode::serialize(&NodeUpdate { token, gid, dist })?,
            )?;
        }

        Ok(())
    }

    /// Broadcasts the local changed flag; the caller barriers, then reads
    /// the OR-reduction with [`take_remote_changed`](Self::take_remote_changed).
    pub fn broadcast_changed(&self, net: &dyn Transport, changed: bool) -> Result<(), Error> {
        let payload = bincode::serialize(&ChangedFlag { changed })?;
        net.broadcast(CHANGED_FLAG, payload, false)?;
        Ok(())
    }

    /// Reads and resets the OR of remotely reported changed flags.
    pub fn take_remote_changed(&self) -> bool {
        self.remote_changed.swap(false, Ordering::Relaxed)
    }

    /// Surfaces the first failure recorded by a receive routine. Call after
    /// every barrier.
    pub fn check_fatal(&self) -> Result<(), Error> {
        match self.fatal.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn on_remote_handle(&self, src: HostId, payload: &[u8]) {
        match bincode::deserialize::<RemoteHandle>(payload) {
            Ok(handle) => self.handles.lock()[src as usize] = Some(handle.token),
            Err(error) => self.record_fatal(Error::Codec(error)),
        }
    }

    fn on_replica_request(&self, src: HostId, payload: &[u8]) {
        match bincode::deserialize::<ReplicaRequest>(payload) {
            Ok(request) => self.replicas.lock()[src as usize].push(request.gid),
            Err(error) => self.record_fatal(Error::Codec(error)),
        }
    }

    fn on_replica_count(&self, src: HostId, payload: &[u8]) {
        match bincode::deserialize::<ReplicaCount>(payload) {
            Ok(count) => {
                let actual = self.replicas.lock()[src as usize].len() as u64;
                if actual != count.expected {
                    self.record_fatal(Error::BootstrapInconsistency {
                        host: src,
                        expected: count.expected,
                        actual,
                    });
                }
            }
            Err(error) => self.record_fatal(Error::Codec(error)),
        }
    }

    fn on_node_value(&self, src: HostId, payload: &[u8]) {
        match bincode::deserialize::<NodeUpdate>(payload) {
            Ok(update) => {
                if update.token != self.token {
                    self.record_fatal(Error::BadGraphHandle { host: src });
                    return;
                }
                match self.graph.g2l(update.gid) {
                    Ok(node) => self.backend.set_node_value(node, update.dist),
                    Err(error) => self.record_fatal(error.into()),
                }
            }
            Err(error) => self.record_fatal(Error::Codec(error)),
        }
    }

    fn on_changed_flag(&self, _src: HostId, payload: &[u8]) {
        match bincode::deserialize::<ChangedFlag>(payload) {
            Ok(flag) => {
                if flag.changed {
                    self.remote_changed.store(true, Ordering::Relaxed);
                }
            }
            Err(error) => self.record_fatal(Error::Codec(error)),
        }
    }

    fn record_fatal(&self, error: Error) {
        let mut fatal = self.fatal.lock();
        if fatal.is_none() {
            *fatal = Some(error);
        }
    }
}

/// Opaque per-host graph handle. A raw pointer means nothing across process
/// boundaries, so the handle is a mixed host id instead.
fn graph_token(host: HostId) -> u64 {
    let mut token = host as u64 ^ 0x9e37_79b9_7f4a_7c15;
    token = (token ^ (token >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    token = (token ^ (token >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    token ^ (token >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_differ_per_host() {
        assert_ne!(graph_token(0), graph_token(1));
        assert_eq!(graph_token(3), graph_token(3));
    }
}
