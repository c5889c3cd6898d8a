//! Per-connection TCP I/O handler: framed reads, serialized writes.

use crate::error::Error;
use crate::io_common::IoCommon;
use crate::io_interface::{IoBase, IoInterface, MsgHandler};
use crate::queue::OutputQueueStats;
use bytes::{Bytes, BytesMut};
use hawser_codec::{Framer, Framing};
use log::{trace, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use wg::AsyncWaitGroup;

const READ_CHUNK_SIZE: usize = 4096;

/// Back-channel from an I/O handler to its owning entity, fired exactly once
/// when the handler terminates. The entity closes the handler, removes it
/// from its live set, and reports through the error callback.
pub(crate) trait IoTermination: Send + Sync {
    fn handler_terminated(&self, err: Error, handler: Arc<TcpIo>);
}

/// I/O handler for one connected TCP socket.
///
/// Reading is a single task that accumulates bytes and extracts messages
/// with the framing policy chosen at `start_io`; writing is serialized by
/// the write-in-flight ticket so at most one write drain is ever active.
/// Applications interact with it through [`IoInterface<TcpIo>`].
pub struct TcpIo {
    weak_self: Weak<TcpIo>,
    socket: Arc<TcpStream>,
    remote_endp: SocketAddr,
    io_common: IoCommon,
    // upgraded transiently at termination, never owned
    notifier: Weak<dyn IoTermination>,
    terminated: AtomicBool,
    rt: tokio::runtime::Handle,
    close_tx: broadcast::Sender<()>,
    wg: AsyncWaitGroup,
}

impl TcpIo {
    pub(crate) fn new(
        stream: TcpStream,
        remote_endp: SocketAddr,
        notifier: Weak<dyn IoTermination>,
        rt: tokio::runtime::Handle,
        wg: AsyncWaitGroup,
    ) -> Arc<Self> {
        let (close_tx, _) = broadcast::channel(1);
        Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            socket: Arc::new(stream),
            remote_endp,
            io_common: IoCommon::new(),
            notifier,
            terminated: AtomicBool::new(false),
            rt,
            close_tx,
            wg,
        })
    }

    /// The connected socket, for querying or setting socket options.
    pub fn socket(&self) -> Arc<TcpStream> {
        self.socket.clone()
    }

    /// The peer endpoint of the connection.
    pub fn remote_endpoint(&self) -> SocketAddr {
        self.remote_endp
    }

    /// Begins the read loop with the given framing policy and message
    /// handler. False if I/O was already started.
    pub fn start_io(&self, framing: Framing, msg_handler: MsgHandler<TcpIo>) -> bool {
        if !self.io_common.set_io_started() {
            return false;
        }
        let Some(this) = self.weak_self.upgrade() else {
            return false;
        };
        let close_rx = self.close_tx.subscribe();
        let worker = self.wg.add(1);
        self.rt.spawn(async move {
            this.read_loop(framing, msg_handler, close_rx).await;
            worker.done();
        });
        true
    }

    /// Begins a discard read loop: one-byte reads, data ignored. Keeps the
    /// connection open and its termination detectable without delivering
    /// messages.
    pub fn start_sink_io(&self) -> bool {
        self.start_io(Framing::sink(), Box::new(|_, _, _| true))
    }

    /// Closes the handler from the entity side: flips the io-started flag,
    /// attempts a graceful both-direction shutdown, and signals the read
    /// loop. Shutdown errors are swallowed; the termination cause has
    /// already been reported.
    pub(crate) fn close(&self) {
        if !self.io_common.stop() {
            return;
        }
        let sock = socket2::SockRef::from(&*self.socket);
        let _ = sock.shutdown(std::net::Shutdown::Both);
        let _ = self.close_tx.send(());
    }

    // Fires the entity notifier at most once per handler lifetime.
    fn notify(&self, err: Error) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        if let (Some(entity), Some(this)) = (self.notifier.upgrade(), self.weak_self.upgrade()) {
            entity.handler_terminated(err, this);
        }
    }

    async fn read_loop(
        self: Arc<Self>,
        framing: Framing,
        mut msg_handler: MsgHandler<TcpIo>,
        mut close_rx: broadcast::Receiver<()>,
    ) {
        let mut framer = Framer::new(framing);
        let mut acc = BytesMut::with_capacity(READ_CHUNK_SIZE);
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            tokio::select! {
                biased;

                _ = close_rx.recv() => {
                    trace!("tcp read loop exit on close, peer {}", self.remote_endp);
                    return;
                }
                res = self.read_some(&mut chunk) => {
                    match res {
                        Ok(0) => {
                            self.notify(Error::Io(io::ErrorKind::UnexpectedEof.into()));
                            return;
                        }
                        Ok(n) => {
                            trace!("stream read {} bytes", n);
                            acc.extend_from_slice(&chunk[..n]);
                            if !self.deliver_messages(&mut framer, &mut acc, &mut msg_handler) {
                                return;
                            }
                        }
                        Err(err) => {
                            warn!("stream read error {}", err);
                            self.notify(Error::Io(err));
                            return;
                        }
                    }
                }
            }
        }
    }

    // Extracts and delivers every complete message; false ends the read loop.
    fn deliver_messages(
        self: &Arc<Self>,
        framer: &mut Framer,
        acc: &mut BytesMut,
        msg_handler: &mut MsgHandler<TcpIo>,
    ) -> bool {
        loop {
            match framer.next_message(acc) {
                Ok(Some(msg)) => {
                    let io = IoInterface::new(self.weak_self.clone());
                    if !msg_handler(&msg, io, self.remote_endp) {
                        self.notify(Error::MessageHandlerTerminated);
                        return false;
                    }
                }
                Ok(None) => return true,
                Err(err) => {
                    warn!("framing error from {}: {}", self.remote_endp, err);
                    self.notify(Error::MessageHandlerTerminated);
                    return false;
                }
            }
        }
    }

    async fn read_some(&self, chunk: &mut [u8]) -> io::Result<usize> {
        loop {
            self.socket.readable().await?;
            match self.socket.try_read(chunk) {
                Ok(n) => return Ok(n),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }
    }

    async fn drain_writes(self: Arc<Self>) {
        while let Some((buf, _)) = self.io_common.get_next_element() {
            if let Err(err) = self.write_all(&buf).await {
                // the read side reports the failure; the ticket stays taken
                // so no further writes are attempted on a broken stream
                warn!("stream write error {}", err);
                return;
            }
            trace!("stream wrote {} bytes", buf.len());
        }
    }

    async fn write_all(&self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            self.socket.writable().await?;
            match self.socket.try_write(data) {
                Ok(n) => data = &data[n..],
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl IoBase for TcpIo {
    fn is_io_started(&self) -> bool {
        self.io_common.is_io_started()
    }

    /// Signals the owning entity with [`Error::TcpIoHandlerStopped`]; the
    /// entity then closes this handler. False if I/O was never started.
    fn stop_io(&self) -> bool {
        if !self.is_io_started() {
            return false;
        }
        self.notify(Error::TcpIoHandlerStopped);
        true
    }

    /// Posts the buffer onto the handler's executor; safe from any thread.
    /// Returns whether the handler is accepting writes.
    fn send(&self, buf: Bytes) -> bool {
        if self.io_common.start_write_setup(buf, None) {
            if let Some(this) = self.weak_self.upgrade() {
                let worker = self.wg.add(1);
                self.rt.spawn(async move {
                    this.drain_writes().await;
                    worker.done();
                });
            }
        }
        self.is_io_started()
    }

    fn send_to(&self, buf: Bytes, _endp: SocketAddr) -> bool {
        self.send(buf)
    }

    fn output_queue_stats(&self) -> OutputQueueStats {
        self.io_common.output_queue_stats()
    }
}

impl IoInterface<TcpIo> {
    /// Begins framed I/O processing on the connection.
    ///
    /// See [`Framing`] for the four policies: fixed header + variable body,
    /// delimiter, fixed size, and sink. The message handler receives each
    /// complete message, an interface for replies, and the peer endpoint;
    /// returning `false` tears the handler down with
    /// [`Error::MessageHandlerTerminated`].
    pub fn start_io(
        &self,
        framing: Framing,
        msg_handler: MsgHandler<TcpIo>,
    ) -> crate::error::Result<bool> {
        Ok(self.upgrade()?.start_io(framing, msg_handler))
    }

    /// Begins a discard read loop; see [`TcpIo::start_sink_io`].
    pub fn start_sink_io(&self) -> crate::error::Result<bool> {
        Ok(self.upgrade()?.start_sink_io())
    }

    /// The peer endpoint of the connection.
    pub fn remote_endpoint(&self) -> crate::error::Result<SocketAddr> {
        Ok(self.upgrade()?.remote_endpoint())
    }

    /// The connected socket, for querying or setting socket options.
    pub fn socket(&self) -> crate::error::Result<Arc<TcpStream>> {
        Ok(self.upgrade()?.socket())
    }
}
