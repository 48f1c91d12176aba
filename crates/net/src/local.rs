use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::warn;
use parking_lot::RwLock;

use crate::{Error, Handler, HandlerId, HostId, Transport};

/// Fan-out of the broadcast tree.
const BROADCAST_WIDTH: u32 = 2;

const DEFAULT_BARRIER_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_micros(200);

enum Packet {
    Direct {
        src: HostId,
        handler: HandlerId,
        payload: Vec<u8>,
    },
    Broadcast {
        origin: HostId,
        handler: HandlerId,
        payload: Vec<u8>,
    },
}

struct Shared {
    num_hosts: u32,
    /// Messages handed to a channel, cluster-wide.
    sent: AtomicU64,
    /// Messages whose handler has returned, cluster-wide.
    handled: AtomicU64,
    /// Monotonic barrier arrivals; barrier `k` completes at `(k + 1) * num_hosts`.
    arrivals: AtomicU64,
    barrier_timeout: Duration,
}

/// Builds the endpoints of an in-process cluster.
///
/// Hosts are threads; each endpoint owns the host's inbox and a sender to
/// every peer. Messages are handled on the receiving host's own thread while
/// it waits at a barrier, so handlers never interleave with the phase code
/// running between barriers.
pub struct LocalCluster;

impl LocalCluster {
    /// One endpoint per host, with the default barrier timeout.
    pub fn new(num_hosts: u32) -> Vec<LocalTransport> {
        Self::with_barrier_timeout(num_hosts, DEFAULT_BARRIER_TIMEOUT)
    }

    /// A barrier that outlives the timeout reports [`Error::BarrierTimeout`],
    /// which is how the remaining hosts observe a crashed peer.
    pub fn with_barrier_timeout(num_hosts: u32, timeout: Duration) -> Vec<LocalTransport> {
        assert!(num_hosts > 0, "a cluster needs at least one host");

        let shared = Arc::new(Shared {
            num_hosts,
            sent: AtomicU64::new(0),
            handled: AtomicU64::new(0),
            arrivals: AtomicU64::new(0),
            barrier_timeout: timeout,
        });

        let (outboxes, inboxes): (Vec<Sender<Packet>>, Vec<Receiver<Packet>>) =
            (0..num_hosts).map(|_| unbounded()).unzip();

        inboxes
            .into_iter()
            .enumerate()
            .map(|(id, inbox)| LocalTransport {
                id: id as HostId,
                shared: Arc::clone(&shared),
                outboxes: outboxes.clone(),
                inbox,
                handlers: RwLock::new(HashMap::new()),
                barriers_done: AtomicU64::new(0),
            })
            .collect()
    }
}

/// One host's endpoint of a [`LocalCluster`].
pub struct LocalTransport {
    id: HostId,
    shared: Arc<Shared>,
    outboxes: Vec<Sender<Packet>>,
    inbox: Receiver<Packet>,
    handlers: RwLock<HashMap<HandlerId, Arc<dyn Handler>>>,
    barriers_done: AtomicU64,
}

impl LocalTransport {
    fn post(&self, dest: HostId, packet: Packet) -> Result<(), Error> {
        self.shared.sent.fetch_add(1, Ordering::AcqRel);
        if self.outboxes[dest as usize].send(packet).is_err() {
            self.shared.sent.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::Disconnected { dest });
        }
        Ok(())
    }

    fn dispatch(&self, packet: Packet) {
        match packet {
            Packet::Direct {
                src,
                handler,
                payload,
            } => self.deliver(src, handler, &payload),
            Packet::Broadcast {
                origin,
                handler,
                payload,
            } => {
                // Forward first, then deliver locally.
                if let Err(error) = self.forward(origin, handler, &payload) {
                    warn!("host {}: dropping broadcast forward: {}", self.id, error);
                }
                self.deliver(origin, handler, &payload);
            }
        }
        self.shared.handled.fetch_add(1, Ordering::AcqRel);
    }

    fn deliver(&self, src: HostId, handler: HandlerId, payload: &[u8]) {
        let routine = self.handlers.read().get(&handler).cloned();
        match routine {
            Some(routine) => routine.handle(src, payload),
            None => warn!(
                "host {}: no handler registered for id {}, dropping message from host {}",
                self.id, handler.0, src
            ),
        }
    }

    /// Posts the broadcast to this host's children in the tree rooted at
    /// `origin`, remapping real ids into the tree through the effective id.
    fn forward(&self, origin: HostId, handler: HandlerId, payload: &[u8]) -> Result<(), Error> {
        let num_hosts = self.shared.num_hosts;
        let eid = effective_id(self.id, origin, num_hosts);
        for child in 0..BROADCAST_WIDTH {
            let child_eid = eid * BROADCAST_WIDTH + child + 1;
            if child_eid < num_hosts {
                self.post(
                    real_id(child_eid, origin, num_hosts),
                    Packet::Broadcast {
                        origin,
                        handler,
                        payload: payload.to_vec(),
                    },
                )?;
            }
        }
        Ok(())
    }

    fn drain(&self) {
        while let Ok(packet) = self.inbox.try_recv() {
            self.dispatch(packet);
        }
    }
}

impl Transport for LocalTransport {
    fn host_id(&self) -> HostId {
        self.id
    }

    fn num_hosts(&self) -> u32 {
        self.shared.num_hosts
    }

    fn register(&self, id: HandlerId, handler: Arc<dyn Handler>) {
        self.handlers.write().insert(id, handler);
    }

    fn send(&self, dest: HostId, handler: HandlerId, payload: Vec<u8>) -> Result<(), Error> {
        self.post(
            dest,
            Packet::Direct {
                src: self.id,
                handler,
                payload,
            },
        )
    }

    fn broadcast(
        &self,
        handler: HandlerId,
        payload: Vec<u8>,
        include_self: bool,
    ) -> Result<(), Error> {
        self.forward(self.id, handler, &payload)?;
        if include_self {
            self.deliver(self.id, handler, &payload);
        }
        Ok(())
    }

    fn barrier(&self) -> Result<(), Error> {
        let target = (self.barriers_done.load(Ordering::Relaxed) + 1) * self.shared.num_hosts as u64;
        self.shared.arrivals.fetch_add(1, Ordering::AcqRel);

        let start = Instant::now();
        loop {
            self.drain();

            // Release once every host has arrived and the cluster is
            // quiescent: a handled count matching the sent count means no
            // pre-barrier message (or broadcast forward) is still in flight.
            if self.shared.arrivals.load(Ordering::Acquire) >= target
                && self.shared.sent.load(Ordering::Acquire)
                    == self.shared.handled.load(Ordering::Acquire)
            {
                break;
            }

            if start.elapsed() > self.shared.barrier_timeout {
                return Err(Error::BarrierTimeout {
                    timeout: self.shared.barrier_timeout,
                });
            }

            match self.inbox.recv_timeout(POLL_INTERVAL) {
                Ok(packet) => self.dispatch(packet),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        self.barriers_done.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Real id -> position in the broadcast tree rooted at `origin`.
fn effective_id(real: HostId, origin: HostId, num_hosts: u32) -> u32 {
    (real + num_hosts - origin) % num_hosts
}

/// Position in the broadcast tree rooted at `origin` -> real id.
fn real_id(eid: u32, origin: HostId, num_hosts: u32) -> HostId {
    (eid + origin) % num_hosts
}
