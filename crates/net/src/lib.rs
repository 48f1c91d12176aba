//! The network contract a bulk-synchronous driver consumes.
//!
//! A transport connects a fixed set of hosts and offers three operations:
//! reliable point-to-point [`send`](Transport::send), a
//! [`broadcast`](Transport::broadcast) delivered to every host exactly once,
//! and a global [`barrier`](Transport::barrier). Receipt is implicit: the
//! transport invokes the [`Handler`] registered under the message's
//! [`HandlerId`] on the receiving host.
//!
//! Guarantees the driver relies on:
//!
//! - sends between a `(source, dest)` pair are delivered reliably and in
//!   order;
//! - handlers never run concurrently with each other on the same host; they
//!   execute on the host's progress context, which only runs while the host
//!   waits at a barrier;
//! - a barrier returns only after every host has reached it *and* every
//!   message sent before its sender entered the barrier has been handled at
//!   its destination.
//!
//! [`LocalCluster`] provides the in-process reference implementation used by
//! the `sssp` binary and the engine tests.

pub mod local;

pub use local::{LocalCluster, LocalTransport};

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Identifier of a host within the cluster, in `[0, num_hosts)`.
pub type HostId = u32;

/// Names a receive routine. Handler ids must be stable across all hosts;
/// raw function pointers mean nothing across process boundaries.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct HandlerId(pub u16);

/// A receive routine invoked by the transport with the originating host and
/// the message payload.
pub trait Handler: Send + Sync {
    fn handle(&self, src: HostId, payload: &[u8]);
}

impl<F> Handler for F
where
    F: Fn(HostId, &[u8]) + Send + Sync,
{
    fn handle(&self, src: HostId, payload: &[u8]) {
        self(src, payload)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("send to host {dest} failed: peer disconnected")]
    Disconnected { dest: HostId },
    #[error("barrier timed out after {timeout:?}")]
    BarrierTimeout { timeout: Duration },
}

/// Point-to-point send, broadcast and barrier over a fixed host set.
pub trait Transport: Send + Sync {
    fn host_id(&self) -> HostId;

    fn num_hosts(&self) -> u32;

    /// Registers the receive routine for a handler id on this host.
    fn register(&self, id: HandlerId, handler: Arc<dyn Handler>);

    /// Reliable FIFO point-to-point send. Sending to the own host is
    /// allowed; the message is handled at the next barrier like any other.
    fn send(&self, dest: HostId, handler: HandlerId, payload: Vec<u8>) -> Result<(), Error>;

    /// Delivers the payload to every host exactly once, forwarded along a
    /// binary tree rooted at the caller. With `include_self` the handler
    /// also runs on the calling host, synchronously.
    fn broadcast(&self, handler: HandlerId, payload: Vec<u8>, include_self: bool)
        -> Result<(), Error>;

    /// Global barrier. Returns once every host has arrived and all messages
    /// sent beforehand have been handled.
    fn barrier(&self) -> Result<(), Error>;
}
