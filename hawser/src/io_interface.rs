//! Non-owning handle to an I/O handler, and the callback types exchanged
//! with the application.

use crate::error::{Error, Result};
use crate::queue::OutputQueueStats;
use bytes::Bytes;
use std::cmp::Ordering;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

/// Application callback fired when an I/O handler becomes ready
/// (`starting = true`) or, for a UDP entity, is being torn down
/// (`starting = false`). The count is 1 for connectors and UDP entities and
/// the current live-handler count for acceptors.
pub type IoStateChangeCb<H> = Arc<dyn Fn(IoInterface<H>, usize, bool) + Send + Sync>;

/// Application callback fired on any terminal failure or shutdown of a
/// handler or entity. The interface may already be invalid.
pub type ErrorCb<H> = Arc<dyn Fn(IoInterface<H>, Error, usize) + Send + Sync>;

/// Application handler for a complete inbound message. Returning `false`
/// terminates the handler with [`Error::MessageHandlerTerminated`].
pub type MsgHandler<H> = Box<dyn FnMut(&[u8], IoInterface<H>, SocketAddr) -> bool + Send>;

/// Operations every I/O handler exposes through [`IoInterface`] regardless
/// of protocol.
pub trait IoBase: Send + Sync + 'static {
    /// Whether `start_io` has been called and `stop_io` has not.
    fn is_io_started(&self) -> bool;
    /// Begins handler shutdown; false if I/O was never started.
    fn stop_io(&self) -> bool;
    /// Queues an outbound buffer; returns whether the handler accepted it.
    fn send(&self, buf: Bytes) -> bool;
    /// Queues an outbound buffer for a specific destination (UDP); TCP
    /// handlers ignore the endpoint.
    fn send_to(&self, buf: Bytes, endp: SocketAddr) -> bool;
    /// Snapshot of the pending-write queue.
    fn output_queue_stats(&self) -> OutputQueueStats;
}

/// Lightweight non-owning handle to an I/O handler.
///
/// An `IoInterface` never keeps its handler alive: dropping every interface
/// has no effect on the connection. Operations upgrade the internal weak
/// reference for the duration of the call and fail with
/// [`Error::WeakPtrExpired`] once the handler is gone.
///
/// Interfaces compare by handler identity so they can key maps and sets:
/// two invalid interfaces are equal, an invalid one is unequal to (and
/// orders before) any valid one, and two valid ones are equal when they
/// refer to the same handler.
pub struct IoInterface<H> {
    handler: Weak<H>,
}

impl<H> IoInterface<H> {
    pub(crate) fn new(handler: Weak<H>) -> Self {
        Self { handler }
    }

    /// An interface not associated with any handler, as delivered to error
    /// callbacks whose handler is already destroyed.
    pub fn invalid() -> Self {
        Self {
            handler: Weak::new(),
        }
    }

    /// Whether the referenced handler is still alive.
    pub fn is_valid(&self) -> bool {
        self.handler.strong_count() > 0
    }

    pub(crate) fn upgrade(&self) -> Result<Arc<H>> {
        self.handler.upgrade().ok_or(Error::WeakPtrExpired)
    }
}

impl<H: IoBase> IoInterface<H> {
    /// Whether I/O processing is active on the handler.
    pub fn is_io_started(&self) -> Result<bool> {
        Ok(self.upgrade()?.is_io_started())
    }

    /// Begins handler shutdown. `Ok(false)` when I/O was never started.
    pub fn stop_io(&self) -> Result<bool> {
        Ok(self.upgrade()?.stop_io())
    }

    /// Queues an outbound buffer. Safe to call from any thread; the write is
    /// posted onto the handler's executor. `Ok(false)` when the handler is
    /// not accepting writes.
    pub fn send(&self, buf: Bytes) -> Result<bool> {
        Ok(self.upgrade()?.send(buf))
    }

    /// Queues an outbound buffer for an explicit destination endpoint.
    pub fn send_to(&self, buf: Bytes, endp: SocketAddr) -> Result<bool> {
        Ok(self.upgrade()?.send_to(buf, endp))
    }

    /// Snapshot of the handler's pending-write queue.
    pub fn output_queue_stats(&self) -> Result<OutputQueueStats> {
        Ok(self.upgrade()?.output_queue_stats())
    }
}

impl<H> Clone for IoInterface<H> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

impl<H> Default for IoInterface<H> {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<H> std::fmt::Debug for IoInterface<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoInterface")
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl<H> PartialEq for IoInterface<H> {
    fn eq(&self, other: &Self) -> bool {
        match (self.handler.upgrade(), other.handler.upgrade()) {
            (Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<H> Eq for IoInterface<H> {}

impl<H> PartialOrd for IoInterface<H> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<H> Ord for IoInterface<H> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.handler.upgrade(), other.handler.upgrade()) {
            (Some(a), Some(b)) => (Arc::as_ptr(&a) as usize).cmp(&(Arc::as_ptr(&b) as usize)),
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
        }
    }
}
