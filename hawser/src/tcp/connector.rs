//! TCP connector entity: resolves, connects, reconnects on failure.

use crate::entity_common::EntityCommon;
use crate::error::Error;
use crate::io_interface::{ErrorCb, IoInterface, IoStateChangeCb};
use crate::net_entity::Entity;
use crate::tcp::io::{IoTermination, TcpIo};
use log::{trace, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Notify};
use wg::AsyncWaitGroup;

/// Network entity that maintains one outbound TCP connection.
///
/// The connector drives the cycle
/// *resolve → connect → connected → waiting-reconnect → connect → …*:
/// endpoints are tried in order until one connects, the connected socket is
/// wrapped in a [`TcpIo`] handler and announced through the io-state-change
/// callback, and any connect failure or handler termination while the
/// entity is started schedules a retry after the reconnect interval.
/// `stop` cancels whichever step is in flight and fires one final error
/// callback with [`Error::TcpConnectorStopped`].
pub struct TcpConnector {
    weak_self: Weak<TcpConnector>,
    entity: EntityCommon<TcpIo>,
    remote_host: String,
    remote_port: u16,
    // empty until a resolve completes; a pre-resolved list skips resolution
    endpoints: Mutex<Vec<SocketAddr>>,
    reconnect_interval: Duration,
    socket: Mutex<Option<Arc<TcpStream>>>,
    close_tx: Mutex<Option<broadcast::Sender<()>>>,
    wg: Mutex<Option<AsyncWaitGroup>>,
    terminated: Notify,
    rt: tokio::runtime::Handle,
}

impl TcpConnector {
    /// Creates a connector that resolves `remote_host:remote_port` when
    /// started.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime; the connector captures
    /// the ambient runtime as its executor.
    pub fn new(remote_host: &str, remote_port: u16, reconnect_interval: Duration) -> Arc<Self> {
        Self::build(
            remote_host.to_owned(),
            remote_port,
            Vec::new(),
            reconnect_interval,
        )
    }

    /// Creates a connector over a pre-resolved endpoint list, tried in
    /// order on every connect attempt.
    pub fn with_endpoints(endpoints: Vec<SocketAddr>, reconnect_interval: Duration) -> Arc<Self> {
        Self::build(String::new(), 0, endpoints, reconnect_interval)
    }

    fn build(
        remote_host: String,
        remote_port: u16,
        endpoints: Vec<SocketAddr>,
        reconnect_interval: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            entity: EntityCommon::new(),
            remote_host,
            remote_port,
            endpoints: Mutex::new(endpoints),
            reconnect_interval,
            socket: Mutex::new(None),
            close_tx: Mutex::new(None),
            wg: Mutex::new(None),
            terminated: Notify::new(),
            rt: tokio::runtime::Handle::current(),
        })
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

    async fn connect_driver(
        self: Arc<Self>,
        mut close_rx: broadcast::Receiver<()>,
        wg: AsyncWaitGroup,
    ) {
        'reconnect: loop {
            if !self.entity.is_started() {
                return;
            }

            let mut endpoints = self.endpoints.lock().unwrap().clone();
            if endpoints.is_empty() {
                match self.resolve(&mut close_rx).await {
                    Some(Ok(resolved)) => {
                        *self.endpoints.lock().unwrap() = resolved.clone();
                        endpoints = resolved;
                    }
                    Some(Err(err)) => {
                        self.entity
                            .call_error(IoInterface::invalid(), Error::Io(err), 0);
                        if !self.sleep_reconnect(&mut close_rx).await {
                            return;
                        }
                        continue 'reconnect;
                    }
                    None => return,
                }
            }

            let mut connected = None;
            let mut last_err = io::Error::from(io::ErrorKind::AddrNotAvailable);
            for endp in &endpoints {
                let res = tokio::select! {
                    biased;
                    _ = close_rx.recv() => return,
                    res = TcpStream::connect(*endp) => res,
                };
                match res {
                    Ok(stream) => {
                        connected = Some((stream, *endp));
                        break;
                    }
                    Err(err) => {
                        trace!("connect to {} failed: {}", endp, err);
                        last_err = err;
                    }
                }
            }

            let Some((stream, endp)) = connected else {
                self.entity
                    .call_error(IoInterface::invalid(), Error::Io(last_err), 0);
                if !self.sleep_reconnect(&mut close_rx).await {
                    return;
                }
                continue 'reconnect;
            };

            let peer_addr = stream.peer_addr().unwrap_or(endp);
            let notifier: Arc<dyn IoTermination> = self.clone();
            let iop = TcpIo::new(
                stream,
                peer_addr,
                Arc::downgrade(&notifier),
                self.rt.clone(),
                wg.clone(),
            );
            *self.socket.lock().unwrap() = Some(iop.socket());
            self.entity.add_handler(iop.clone());
            trace!("connected to {}", peer_addr);
            self.entity.call_io_state_change(&iop, 1, true);

            // park until the handler terminates or the entity stops; a
            // notification from a previous cycle is stale while the handler
            // is still live
            loop {
                tokio::select! {
                    biased;
                    _ = close_rx.recv() => return,
                    _ = self.terminated.notified() => {
                        if self.entity.handler_count() == 0 {
                            break;
                        }
                    }
                }
            }
            *self.socket.lock().unwrap() = None;
            if !self.entity.is_started() {
                return;
            }
            if !self.sleep_reconnect(&mut close_rx).await {
                return;
            }
        }
    }

    // None = entity shut down mid-resolve
    async fn resolve(
        &self,
        close_rx: &mut broadcast::Receiver<()>,
    ) -> Option<io::Result<Vec<SocketAddr>>> {
        let res = tokio::select! {
            biased;
            _ = close_rx.recv() => return None,
            res = tokio::net::lookup_host((self.remote_host.as_str(), self.remote_port)) => res,
        };
        Some(match res {
            Ok(addrs) => {
                let resolved: Vec<SocketAddr> = addrs.collect();
                if resolved.is_empty() {
                    warn!(
                        "resolve of {}:{} yielded no endpoints",
                        self.remote_host, self.remote_port
                    );
                    Err(io::ErrorKind::NotFound.into())
                } else {
                    Ok(resolved)
                }
            }
            Err(err) => {
                warn!(
                    "resolve of {}:{} failed: {}",
                    self.remote_host, self.remote_port, err
                );
                Err(err)
            }
        })
    }

    async fn sleep_reconnect(&self, close_rx: &mut broadcast::Receiver<()>) -> bool {
        trace!("reconnect in {:?}", self.reconnect_interval);
        tokio::select! {
            biased;
            _ = close_rx.recv() => false,
            _ = tokio::time::sleep(self.reconnect_interval) => true,
        }
    }
}

impl Entity for TcpConnector {
    type Handler = TcpIo;
    type Socket = TcpStream;

    fn is_started(&self) -> bool {
        self.entity.is_started()
    }

    fn start(&self, io_cb: IoStateChangeCb<TcpIo>, err_cb: ErrorCb<TcpIo>) -> bool {
        if !self.entity.start(io_cb, err_cb) {
            return false;
        }
        let (close_tx, close_rx) = broadcast::channel(1);
        *self.close_tx.lock().unwrap() = Some(close_tx);
        let wait_group = AsyncWaitGroup::new();
        *self.wg.lock().unwrap() = Some(wait_group.clone());

        let Some(this) = self.weak_self.upgrade() else {
            return false;
        };
        let worker = wait_group.add(1);
        self.rt.spawn(async move {
            this.connect_driver(close_rx, wait_group).await;
            worker.done();
        });
        true
    }

    fn stop(&self) -> bool {
        if !self.entity.stop() {
            return false;
        }
        // cancels whichever of resolve, connect, or the reconnect timer is
        // in flight
        if let Some(tx) = self.close_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
        self.entity.stop_io_all();
        self.entity.clear_handlers();
        *self.socket.lock().unwrap() = None;
        self.entity
            .call_error(IoInterface::invalid(), Error::TcpConnectorStopped, 0);
        self.entity.release_callbacks();
        true
    }

    fn socket(&self) -> Option<Arc<TcpStream>> {
        self.socket.lock().unwrap().clone()
    }
}

impl IoTermination for TcpConnector {
    fn handler_terminated(&self, err: Error, handler: Arc<TcpIo>) {
        handler.close();
        self.entity.remove_handler(&handler);
        *self.socket.lock().unwrap() = None;
        trace!("connection to {} terminated ({})", handler.remote_endpoint(), err);
        self.entity
            .call_error(IoInterface::new(Arc::downgrade(&handler)), err, 0);
        self.terminated.notify_one();
    }
}
