//! TCP acceptor entity: listens, accepts connections, spawns I/O handlers.

use crate::entity_common::EntityCommon;
use crate::error::Error;
use crate::io_interface::{ErrorCb, IoInterface, IoStateChangeCb};
use crate::net_entity::Entity;
use crate::tcp::io::{IoTermination, TcpIo};
use log::{trace, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Weak};
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::broadcast;
use wg::AsyncWaitGroup;

const DEFAULT_BACKLOG: u32 = 1024;

/// Network entity that listens on a local endpoint and wraps every accepted
/// connection in a [`TcpIo`] handler.
///
/// Each time a connection is accepted the io-state-change callback fires
/// with an [`IoInterface`] and the current live-handler count; each time a
/// handler terminates the error callback fires with the terminating code.
/// Stopping the acceptor tears down every live connection and fires one
/// final error callback with [`Error::TcpAcceptorStopped`].
pub struct TcpAcceptor {
    weak_self: Weak<TcpAcceptor>,
    entity: EntityCommon<TcpIo>,
    local_endp: SocketAddr,
    reuse_addr: bool,
    listener: Mutex<Option<Arc<TcpListener>>>,
    close_tx: Mutex<Option<broadcast::Sender<()>>>,
    wg: Mutex<Option<AsyncWaitGroup>>,
    rt: tokio::runtime::Handle,
}

impl TcpAcceptor {
    /// Creates an acceptor for the given local endpoint. `reuse_addr`
    /// applies `SO_REUSEADDR` before binding.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime; the acceptor captures the
    /// ambient runtime as its executor.
    pub fn new(local_endp: SocketAddr, reuse_addr: bool) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            entity: EntityCommon::new(),
            local_endp,
            reuse_addr,
            listener: Mutex::new(None),
            close_tx: Mutex::new(None),
            wg: Mutex::new(None),
            rt: tokio::runtime::Handle::current(),
        })
    }

    /// The bound endpoint while started; useful after binding port 0.
    pub fn local_endpoint(&self) -> Option<SocketAddr> {
        let listener = self.listener.lock().unwrap().clone();
        listener.and_then(|l| l.local_addr().ok())
    }

    /// Resolves once every task spawned since `start` has exited.
    pub async fn wait_for_stop(&self) {
        let wg = self.wg.lock().unwrap().take();
        if let Some(wg) = wg {
            wg.wait().await;
        }
    }

    /// [`stop`](Entity::stop) followed by [`wait_for_stop`](Self::wait_for_stop).
    pub async fn graceful_stop(&self) {
        self.stop();
        self.wait_for_stop().await;
    }

    fn bind_listener(&self) -> io::Result<TcpListener> {
        let socket = if self.local_endp.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        if self.reuse_addr {
            socket.set_reuseaddr(true)?;
        }
        socket.bind(self.local_endp)?;
        socket.listen(DEFAULT_BACKLOG)
    }

    async fn accept_loop(
        self: Arc<Self>,
        listener: Arc<TcpListener>,
        mut close_rx: broadcast::Receiver<()>,
        wg: AsyncWaitGroup,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = close_rx.recv() => {
                    trace!("acceptor exit loop");
                    break;
                }
                res = listener.accept() => {
                    match res {
                        Ok((stream, peer_addr)) => {
                            if !self.entity.is_started() {
                                // accept raced with stop; the connection is
                                // dropped, never tracked
                                drop(stream);
                                break;
                            }
                            let notifier: Arc<dyn IoTermination> = self.clone();
                            let iop = TcpIo::new(
                                stream,
                                peer_addr,
                                Arc::downgrade(&notifier),
                                self.rt.clone(),
                                wg.clone(),
                            );
                            self.entity.add_handler(iop.clone());
                            let count = self.entity.handler_count();
                            trace!("accepted connection from {}, {} live", peer_addr, count);
                            self.entity.call_io_state_change(&iop, count, true);
                        }
                        Err(err) => {
                            warn!("listener accept error {}", err);
                            let count = self.entity.handler_count();
                            self.entity.call_error(IoInterface::invalid(), Error::Io(err), count);
                            break;
                        }
                    }
                }
            }
        }
    }
}

impl Entity for TcpAcceptor {
    type Handler = TcpIo;
    type Socket = TcpListener;

    fn is_started(&self) -> bool {
        self.entity.is_started()
    }

    fn start(&self, io_cb: IoStateChangeCb<TcpIo>, err_cb: ErrorCb<TcpIo>) -> bool {
        if !self.entity.start(io_cb, err_cb) {
            return false;
        }
        let listener = match self.bind_listener() {
            Ok(listener) => Arc::new(listener),
            Err(err) => {
                warn!("bind to {} failed: {}", self.local_endp, err);
                self.entity
                    .call_error(IoInterface::invalid(), Error::Io(err), 0);
                self.entity.stop();
                self.entity.release_callbacks();
                return false;
            }
        };
        *self.listener.lock().unwrap() = Some(listener.clone());

        let (close_tx, close_rx) = broadcast::channel(1);
        *self.close_tx.lock().unwrap() = Some(close_tx);
        let wait_group = AsyncWaitGroup::new();
        *self.wg.lock().unwrap() = Some(wait_group.clone());

        let Some(this) = self.weak_self.upgrade() else {
            return false;
        };
        let worker = wait_group.add(1);
        self.rt.spawn(async move {
            this.accept_loop(listener, close_rx, wait_group).await;
            worker.done();
        });
        true
    }

    fn stop(&self) -> bool {
        if !self.entity.stop() {
            return false;
        }
        if let Some(tx) = self.close_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
        *self.listener.lock().unwrap() = None;
        self.entity.stop_io_all();
        self.entity.clear_handlers();
        self.entity
            .call_error(IoInterface::invalid(), Error::TcpAcceptorStopped, 0);
        self.entity.release_callbacks();
        true
    }

    fn socket(&self) -> Option<Arc<TcpListener>> {
        self.listener.lock().unwrap().clone()
    }
}

impl IoTermination for TcpAcceptor {
    fn handler_terminated(&self, err: Error, handler: Arc<TcpIo>) {
        handler.close();
        self.entity.remove_handler(&handler);
        let count = self.entity.handler_count();
        trace!(
            "handler for {} terminated ({}), {} live",
            handler.remote_endpoint(),
            err,
            count
        );
        self.entity
            .call_error(IoInterface::new(Arc::downgrade(&handler)), err, count);
    }
}
