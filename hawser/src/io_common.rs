//! Concurrency-safe per-handler I/O state: the io-started flag, the pending
//! write queue, and the write-in-flight ticket.

use crate::queue::{OutputQueue, OutputQueueStats};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

struct WriteState {
    write_in_flight: bool,
    queue: OutputQueue,
}

/// State shared between a handler's senders (any thread) and its drain task.
///
/// `start_write_setup` returning `true` is the single ticket to begin a
/// write drain; the flag stays set until `get_next_element` finds the queue
/// empty. That guarantees at most one outstanding write per handler no
/// matter how many threads call `send` concurrently.
pub(crate) struct IoCommon {
    io_started: AtomicBool,
    write_state: Mutex<WriteState>,
}

impl IoCommon {
    pub(crate) fn new() -> Self {
        Self {
            io_started: AtomicBool::new(false),
            write_state: Mutex::new(WriteState {
                write_in_flight: false,
                queue: OutputQueue::new(),
            }),
        }
    }

    pub(crate) fn is_io_started(&self) -> bool {
        self.io_started.load(Ordering::Acquire)
    }

    /// Transitions idle -> io-started. False if already started.
    pub(crate) fn set_io_started(&self) -> bool {
        self.io_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Transitions io-started -> stopped and discards queued writes.
    /// False if already stopped.
    pub(crate) fn stop(&self) -> bool {
        if self
            .io_started
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.write_state.lock().unwrap().queue.clear();
        true
    }

    /// Queues `buf` for writing. Returns true when the caller now holds the
    /// write ticket and must begin draining; false when the buffer was merely
    /// queued behind an active drain, or dropped because I/O is not started.
    pub(crate) fn start_write_setup(&self, buf: Bytes, endp: Option<SocketAddr>) -> bool {
        if !self.is_io_started() {
            return false;
        }
        let mut state = self.write_state.lock().unwrap();
        state.queue.push(buf, endp);
        if state.write_in_flight {
            return false;
        }
        state.write_in_flight = true;
        true
    }

    /// Called by the drain after each write completion. Returns the next
    /// element to write, or releases the write ticket and returns `None` when
    /// the queue is empty or the handler has stopped.
    pub(crate) fn get_next_element(&self) -> Option<(Bytes, Option<SocketAddr>)> {
        let mut state = self.write_state.lock().unwrap();
        if !self.is_io_started() {
            state.write_in_flight = false;
            return None;
        }
        match state.queue.pop() {
            Some(elem) => Some(elem),
            None => {
                state.write_in_flight = false;
                None
            }
        }
    }

    pub(crate) fn output_queue_stats(&self) -> OutputQueueStats {
        self.write_state.lock().unwrap().queue.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_stop_transitions() {
        let c = IoCommon::new();
        assert!(!c.is_io_started());
        assert!(c.set_io_started());
        assert!(!c.set_io_started());
        assert!(c.is_io_started());
        assert!(c.stop());
        assert!(!c.stop());
        assert!(!c.is_io_started());
    }

    #[test]
    fn write_ticket_is_exclusive() {
        let c = IoCommon::new();
        // not started: buffers are dropped
        assert!(!c.start_write_setup(Bytes::from_static(b"x"), None));
        assert_eq!(c.output_queue_stats().output_queue_size, 0);

        assert!(c.set_io_started());
        // first send takes the ticket, later sends only enqueue
        assert!(c.start_write_setup(Bytes::from_static(b"a"), None));
        assert!(!c.start_write_setup(Bytes::from_static(b"b"), None));
        assert!(!c.start_write_setup(Bytes::from_static(b"c"), None));
        assert_eq!(c.output_queue_stats().output_queue_size, 3);

        // the drain pops in order and releases the ticket at the end
        assert_eq!(&c.get_next_element().unwrap().0[..], b"a");
        assert_eq!(&c.get_next_element().unwrap().0[..], b"b");
        assert_eq!(&c.get_next_element().unwrap().0[..], b"c");
        assert!(c.get_next_element().is_none());

        // ticket is available again
        assert!(c.start_write_setup(Bytes::from_static(b"d"), None));
    }

    #[test]
    fn stop_discards_pending_writes() {
        let c = IoCommon::new();
        assert!(c.set_io_started());
        assert!(c.start_write_setup(Bytes::from_static(b"a"), None));
        assert!(!c.start_write_setup(Bytes::from_static(b"b"), None));
        assert!(c.stop());
        assert_eq!(c.output_queue_stats().output_queue_size, 0);
        // a drain waking up after stop becomes a no-op
        assert!(c.get_next_element().is_none());
    }
}
