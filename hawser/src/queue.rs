//! Pending-write FIFO shared by the TCP and UDP I/O handlers.

use bytes::Bytes;
use std::collections::VecDeque;
use std::net::SocketAddr;

/// Snapshot of an I/O handler's output queue, taken at a single instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputQueueStats {
    /// Number of buffers waiting to be written.
    pub output_queue_size: usize,
    /// Sum of the waiting buffers' lengths.
    pub bytes_in_output_queue: usize,
}

/// FIFO of outbound buffers, each with an optional UDP destination.
///
/// No internal locking; the I/O common state serializes access.
pub(crate) struct OutputQueue {
    queue: VecDeque<(Bytes, Option<SocketAddr>)>,
    queued_bytes: usize,
}

impl OutputQueue {
    pub(crate) fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            queued_bytes: 0,
        }
    }

    pub(crate) fn push(&mut self, buf: Bytes, endp: Option<SocketAddr>) {
        self.queued_bytes += buf.len();
        self.queue.push_back((buf, endp));
    }

    pub(crate) fn pop(&mut self) -> Option<(Bytes, Option<SocketAddr>)> {
        let elem = self.queue.pop_front();
        if let Some((buf, _)) = &elem {
            self.queued_bytes -= buf.len();
        }
        elem
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
        self.queued_bytes = 0;
    }

    pub(crate) fn stats(&self) -> OutputQueueStats {
        OutputQueueStats {
            output_queue_size: self.queue.len(),
            bytes_in_output_queue: self.queued_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_and_stats() {
        let mut q = OutputQueue::new();
        q.push(Bytes::from_static(b"aaa"), None);
        q.push(Bytes::from_static(b"bb"), Some(([127, 0, 0, 1], 9000).into()));
        assert_eq!(
            q.stats(),
            OutputQueueStats {
                output_queue_size: 2,
                bytes_in_output_queue: 5
            }
        );

        let (buf, endp) = q.pop().unwrap();
        assert_eq!(&buf[..], b"aaa");
        assert!(endp.is_none());

        let (buf, endp) = q.pop().unwrap();
        assert_eq!(&buf[..], b"bb");
        assert!(endp.is_some());

        assert!(q.pop().is_none());
        assert_eq!(q.stats(), OutputQueueStats::default());
    }

    #[test]
    fn clear_resets_stats() {
        let mut q = OutputQueue::new();
        q.push(Bytes::from_static(b"xyz"), None);
        q.clear();
        assert_eq!(q.stats(), OutputQueueStats::default());
        assert!(q.pop().is_none());
    }
}
