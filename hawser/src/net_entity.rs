//! Non-owning handle to a network entity.

use crate::error::{Error, Result};
use crate::io_interface::{ErrorCb, IoBase, IoStateChangeCb};
use std::cmp::Ordering;
use std::sync::{Arc, Weak};

/// A long-lived network object with a started/stopped lifecycle: a TCP
/// acceptor, a TCP connector, or a UDP entity.
pub trait Entity: Send + Sync + 'static {
    /// The I/O handler type this entity hands to the io-state-change
    /// callback.
    type Handler: IoBase;
    /// The socket owned by the entity itself: a listener for acceptors, a
    /// connected stream for connectors, a datagram socket for UDP.
    type Socket;

    /// Whether `start` has been called and `stop` has not.
    fn is_started(&self) -> bool;
    /// Begins entity processing (listen, connect, bind) with the two
    /// application callbacks. False if already started.
    fn start(&self, io_cb: IoStateChangeCb<Self::Handler>, err_cb: ErrorCb<Self::Handler>)
        -> bool;
    /// Shuts the entity down, tearing down every live handler and firing the
    /// final error callback. False if already stopped.
    fn stop(&self) -> bool;
    /// The entity's current socket, if one exists at this point of the
    /// lifecycle (a connector has none until a connect succeeds).
    fn socket(&self) -> Option<Arc<Self::Socket>>;
}

/// Lightweight non-owning handle to a network entity.
///
/// A `NetEntity` is a value type designed to be cheap to copy and store; it
/// refers to the actual entity through a weak reference and never keeps it
/// alive. Operations upgrade the reference for the duration of the call and
/// fail with [`Error::WeakPtrExpired`] once the entity is gone.
///
/// All methods are safe to call from multiple threads. Concurrent `start`
/// and `stop` on the same entity are permitted but logically undefined: the
/// last writer wins on the started flag.
///
/// Comparison follows handler-identity semantics so handles can key maps and
/// sets: invalid handles are all equal and order before valid ones; valid
/// handles compare by entity identity.
pub struct NetEntity<E> {
    entity: Weak<E>,
}

impl<E> NetEntity<E> {
    pub(crate) fn new(entity: Weak<E>) -> Self {
        Self { entity }
    }

    /// Creates a handle to an entity owned elsewhere, e.g. one constructed
    /// directly rather than through a [`Net`](crate::Net) registry.
    pub fn from_entity(entity: &Arc<E>) -> Self {
        Self {
            entity: Arc::downgrade(entity),
        }
    }

    /// A handle not associated with any entity.
    pub fn invalid() -> Self {
        Self {
            entity: Weak::new(),
        }
    }

    /// Whether the referenced entity is still alive.
    pub fn is_valid(&self) -> bool {
        self.entity.strong_count() > 0
    }

    fn upgrade(&self) -> Result<Arc<E>> {
        self.entity.upgrade().ok_or(Error::WeakPtrExpired)
    }
}

impl<E: Entity> NetEntity<E> {
    /// Whether the entity has been started.
    pub fn is_started(&self) -> Result<bool> {
        Ok(self.upgrade()?.is_started())
    }

    /// Starts the entity. `Ok(false)` is the idempotent double-start no-op.
    ///
    /// The io-state-change callback fires on the executor each time an I/O
    /// handler becomes ready; the error callback fires on any terminal
    /// failure or shutdown, and once more with the entity's own stop code
    /// when the entity stops.
    pub fn start(
        &self,
        io_cb: IoStateChangeCb<E::Handler>,
        err_cb: ErrorCb<E::Handler>,
    ) -> Result<bool> {
        Ok(self.upgrade()?.start(io_cb, err_cb))
    }

    /// Stops the entity. `Ok(false)` is the idempotent double-stop no-op.
    pub fn stop(&self) -> Result<bool> {
        Ok(self.upgrade()?.stop())
    }

    /// The entity's current socket, for querying or setting socket options.
    /// `Ok(None)` when no socket exists at this point of the lifecycle.
    pub fn socket(&self) -> Result<Option<Arc<E::Socket>>> {
        Ok(self.upgrade()?.socket())
    }
}

impl<E> Clone for NetEntity<E> {
    fn clone(&self) -> Self {
        Self {
            entity: self.entity.clone(),
        }
    }
}

impl<E> Default for NetEntity<E> {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<E> std::fmt::Debug for NetEntity<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetEntity")
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl<E> PartialEq for NetEntity<E> {
    fn eq(&self, other: &Self) -> bool {
        match (self.entity.upgrade(), other.entity.upgrade()) {
            (Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<E> Eq for NetEntity<E> {}

impl<E> PartialOrd for NetEntity<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for NetEntity<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.entity.upgrade(), other.entity.upgrade()) {
            (Some(a), Some(b)) => (Arc::as_ptr(&a) as usize).cmp(&(Arc::as_ptr(&b) as usize)),
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
        }
    }
}
