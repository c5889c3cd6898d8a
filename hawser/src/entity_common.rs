//! Concurrency-safe per-entity state: the started flag, the application
//! callbacks, and the set of live I/O handlers.

use crate::error::Error;
use crate::io_interface::{ErrorCb, IoBase, IoInterface, IoStateChangeCb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

struct Callbacks<H> {
    io_state_change: Option<IoStateChangeCb<H>>,
    error: Option<ErrorCb<H>>,
}

/// State shared by the TCP acceptor, TCP connector, and UDP entity.
///
/// The started flag transitions by CAS so concurrent `start`/`stop` calls
/// resolve to exactly one winner; callbacks and the handler set live behind
/// a mutex that is never held across a callback invocation.
pub(crate) struct EntityCommon<H> {
    started: AtomicBool,
    callbacks: Mutex<Callbacks<H>>,
    handlers: Mutex<Vec<Arc<H>>>,
}

impl<H> EntityCommon<H> {
    pub(crate) fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
            callbacks: Mutex::new(Callbacks {
                io_state_change: None,
                error: None,
            }),
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Transitions idle -> started and installs the callbacks. False if
    /// already started.
    pub(crate) fn start(&self, io_cb: IoStateChangeCb<H>, err_cb: ErrorCb<H>) -> bool {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let mut cbs = self.callbacks.lock().unwrap();
        cbs.io_state_change = Some(io_cb);
        cbs.error = Some(err_cb);
        true
    }

    /// Transitions started -> idle. False if already stopped. Callbacks stay
    /// installed until [`release_callbacks`](Self::release_callbacks) so the
    /// teardown path can still report.
    pub(crate) fn stop(&self) -> bool {
        self.started
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Drops the installed callbacks; the final step of entity teardown.
    pub(crate) fn release_callbacks(&self) {
        let mut cbs = self.callbacks.lock().unwrap();
        cbs.io_state_change = None;
        cbs.error = None;
    }

    pub(crate) fn add_handler(&self, handler: Arc<H>) {
        self.handlers.lock().unwrap().push(handler);
    }

    /// Removes by identity; unknown handlers are ignored.
    pub(crate) fn remove_handler(&self, handler: &Arc<H>) {
        self.handlers
            .lock()
            .unwrap()
            .retain(|h| !Arc::ptr_eq(h, handler));
    }

    pub(crate) fn handler_count(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }

    pub(crate) fn clear_handlers(&self) {
        self.handlers.lock().unwrap().clear();
    }

    pub(crate) fn call_io_state_change(&self, handler: &Arc<H>, count: usize, starting: bool) {
        let cb = self.callbacks.lock().unwrap().io_state_change.clone();
        if let Some(cb) = cb {
            cb(IoInterface::new(Arc::downgrade(handler)), count, starting);
        }
    }

    pub(crate) fn call_error(&self, io: IoInterface<H>, err: Error, count: usize) {
        let cb = self.callbacks.lock().unwrap().error.clone();
        if let Some(cb) = cb {
            cb(io, err, count);
        }
    }
}

impl<H: IoBase> EntityCommon<H> {
    /// Fans `stop_io` out to a snapshot of the live handlers, outside the
    /// lock: each handler's termination path re-enters this entity to remove
    /// itself.
    pub(crate) fn stop_io_all(&self) {
        let snapshot: Vec<Arc<H>> = self.handlers.lock().unwrap().clone();
        for handler in snapshot {
            handler.stop_io();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct FakeHandler;

    fn no_io_cb() -> IoStateChangeCb<FakeHandler> {
        Arc::new(|_, _, _| {})
    }

    fn no_err_cb() -> ErrorCb<FakeHandler> {
        Arc::new(|_, _, _| {})
    }

    #[test]
    fn double_start_and_double_stop_are_guarded() {
        let e: EntityCommon<FakeHandler> = EntityCommon::new();
        assert!(e.start(no_io_cb(), no_err_cb()));
        assert!(!e.start(no_io_cb(), no_err_cb()));
        assert!(e.is_started());
        assert!(e.stop());
        assert!(!e.stop());
        assert!(!e.is_started());
    }

    #[test]
    fn handler_set_tracks_identity() {
        let e: EntityCommon<FakeHandler> = EntityCommon::new();
        let h1 = Arc::new(FakeHandler);
        let h2 = Arc::new(FakeHandler);
        e.add_handler(h1.clone());
        e.add_handler(h2.clone());
        assert_eq!(e.handler_count(), 2);
        e.remove_handler(&h1);
        assert_eq!(e.handler_count(), 1);
        // removing twice is harmless
        e.remove_handler(&h1);
        assert_eq!(e.handler_count(), 1);
        e.clear_handlers();
        assert_eq!(e.handler_count(), 0);
    }

    #[test]
    fn callbacks_fire_while_installed_and_not_after_release() {
        let e: EntityCommon<FakeHandler> = EntityCommon::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        assert!(e.start(
            no_io_cb(),
            Arc::new(move |_, _, _| {
                fired2.fetch_add(1, Ordering::SeqCst);
            }),
        ));

        e.call_error(IoInterface::invalid(), Error::TcpAcceptorStopped, 0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        e.stop();
        // still installed through teardown reporting
        e.call_error(IoInterface::invalid(), Error::TcpAcceptorStopped, 0);
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        e.release_callbacks();
        e.call_error(IoInterface::invalid(), Error::TcpAcceptorStopped, 0);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
