//! Combined UDP entity and I/O handler for a single datagram socket.

use crate::entity_common::EntityCommon;
use crate::error::Error;
use crate::io_common::IoCommon;
use crate::io_interface::{ErrorCb, IoBase, IoInterface, IoStateChangeCb, MsgHandler};
use crate::net_entity::Entity;
use crate::queue::OutputQueueStats;
use bytes::Bytes;
use log::{trace, warn};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, Weak};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use wg::AsyncWaitGroup;

/// One object playing both the entity and I/O-handler roles, since UDP has
/// no connection lifecycle.
///
/// `start` opens the socket — bound to the configured local endpoint, or to
/// an ephemeral wildcard address for send-only use — and announces readiness
/// through the io-state-change callback with a count of 1. The `start_io`
/// family then activates the receive loop and/or selects a default
/// destination; `send` and `send_to` follow the same serialized-write
/// discipline as the TCP handler, with a per-datagram destination.
pub struct UdpEntityIo {
    weak_self: Weak<UdpEntityIo>,
    io_common: IoCommon,
    entity: EntityCommon<UdpEntityIo>,
    local_endp: Option<SocketAddr>,
    default_dest: Mutex<Option<SocketAddr>>,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    close_tx: Mutex<Option<broadcast::Sender<()>>>,
    wg: Mutex<Option<AsyncWaitGroup>>,
    rt: tokio::runtime::Handle,
}

impl UdpEntityIo {
    /// Creates a UDP entity. `None` binds an ephemeral wildcard address,
    /// the send-only configuration.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime; the entity captures the
    /// ambient runtime as its executor.
    pub fn new(local_endp: Option<SocketAddr>) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            io_common: IoCommon::new(),
            entity: EntityCommon::new(),
            local_endp,
            default_dest: Mutex::new(None),
            socket: Mutex::new(None),
            close_tx: Mutex::new(None),
            wg: Mutex::new(None),
            rt: tokio::runtime::Handle::current(),
        })
    }

    /// The bound endpoint while the socket is open; useful after binding
    /// port 0.
    pub fn local_endpoint(&self) -> Option<SocketAddr> {
        let socket = self.socket.lock().unwrap().clone();
        socket.and_then(|s| s.local_addr().ok())
    }

    /// Activates the receive loop: datagrams up to `max_size` bytes are
    /// passed to the message handler along with the sender endpoint. False
    /// if I/O was already started or the socket is not open.
    pub fn start_io(&self, max_size: usize, msg_handler: MsgHandler<UdpEntityIo>) -> bool {
        self.begin_io(None, Some((max_size, msg_handler)))
    }

    /// Like [`start_io`](Self::start_io), additionally selecting the default
    /// destination for endpoint-less sends.
    pub fn start_io_with_default(
        &self,
        default_dest: SocketAddr,
        max_size: usize,
        msg_handler: MsgHandler<UdpEntityIo>,
    ) -> bool {
        self.begin_io(Some(default_dest), Some((max_size, msg_handler)))
    }

    /// Marks I/O started without a receive loop, for send-only use with
    /// per-send destinations.
    pub fn start_send_only(&self) -> bool {
        self.begin_io(None, None)
    }

    /// Send-only with a default destination for endpoint-less sends.
    pub fn start_send_only_to(&self, default_dest: SocketAddr) -> bool {
        self.begin_io(Some(default_dest), None)
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

    fn begin_io(
        &self,
        default_dest: Option<SocketAddr>,
        receive: Option<(usize, MsgHandler<UdpEntityIo>)>,
    ) -> bool {
        let Some(socket) = self.socket.lock().unwrap().clone() else {
            return false;
        };
        if !self.io_common.set_io_started() {
            return false;
        }
        if let Some(endp) = default_dest {
            *self.default_dest.lock().unwrap() = Some(endp);
        }
        if let Some((max_size, msg_handler)) = receive {
            let close_rx = {
                let close_tx = self.close_tx.lock().unwrap();
                match close_tx.as_ref() {
                    Some(tx) => tx.subscribe(),
                    None => return false,
                }
            };
            let wg = self.wg.lock().unwrap().clone();
            let (Some(this), Some(wg)) = (self.weak_self.upgrade(), wg) else {
                return false;
            };
            let worker = wg.add(1);
            self.rt.spawn(async move {
                this.recv_loop(socket, max_size, msg_handler, close_rx).await;
                worker.done();
            });
        }
        true
    }

    async fn open_socket(self: Arc<Self>) {
        let bind_addr = self
            .local_endp
            .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)));
        match UdpSocket::bind(bind_addr).await {
            Ok(socket) => {
                if !self.entity.is_started() {
                    return;
                }
                *self.socket.lock().unwrap() = Some(Arc::new(socket));
                trace!("udp socket open on {:?}", self.local_endpoint());
                self.entity.call_io_state_change(&self, 1, true);
            }
            Err(err) => {
                warn!("udp bind to {} failed: {}", bind_addr, err);
                self.err_notify(Error::Io(err));
                self.stop();
            }
        }
    }

    async fn recv_loop(
        self: Arc<Self>,
        socket: Arc<UdpSocket>,
        max_size: usize,
        mut msg_handler: MsgHandler<UdpEntityIo>,
        mut close_rx: broadcast::Receiver<()>,
    ) {
        let mut buf = vec![0u8; max_size];
        loop {
            tokio::select! {
                biased;

                _ = close_rx.recv() => {
                    trace!("udp recv loop exit on close");
                    return;
                }
                res = socket.recv_from(&mut buf) => {
                    match res {
                        Ok((n, sender)) => {
                            trace!("socket read {} bytes from {}", n, sender);
                            let io = IoInterface::new(self.weak_self.clone());
                            if !msg_handler(&buf[..n], io, sender) {
                                self.err_notify(Error::MessageHandlerTerminated);
                                self.stop();
                                return;
                            }
                        }
                        Err(err) => {
                            warn!("socket read error {}", err);
                            self.err_notify(Error::Io(err));
                            self.stop();
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn drain_datagrams(self: Arc<Self>, socket: Arc<UdpSocket>) {
        while let Some((buf, endp)) = self.io_common.get_next_element() {
            let dest = endp.or_else(|| *self.default_dest.lock().unwrap());
            let Some(dest) = dest else {
                warn!("dropping {} queued bytes with no destination", buf.len());
                continue;
            };
            match socket.send_to(&buf, dest).await {
                Ok(n) => trace!("socket wrote {} bytes to {}", n, dest),
                Err(err) => {
                    warn!("socket write error {}", err);
                    self.err_notify(Error::Io(err));
                    self.stop();
                    return;
                }
            }
        }
    }

    fn err_notify(&self, err: Error) {
        self.entity
            .call_error(IoInterface::new(self.weak_self.clone()), err, 0);
    }
}

impl Entity for UdpEntityIo {
    type Handler = UdpEntityIo;
    type Socket = UdpSocket;

    fn is_started(&self) -> bool {
        self.entity.is_started()
    }

    fn start(&self, io_cb: IoStateChangeCb<UdpEntityIo>, err_cb: ErrorCb<UdpEntityIo>) -> bool {
        if !self.entity.start(io_cb, err_cb) {
            return false;
        }
        let (close_tx, _) = broadcast::channel(1);
        *self.close_tx.lock().unwrap() = Some(close_tx);
        let wait_group = AsyncWaitGroup::new();
        *self.wg.lock().unwrap() = Some(wait_group.clone());

        let Some(this) = self.weak_self.upgrade() else {
            return false;
        };
        let worker = wait_group.add(1);
        self.rt.spawn(async move {
            this.open_socket().await;
            worker.done();
        });
        true
    }

    fn stop(&self) -> bool {
        if !self.entity.stop() {
            return false;
        }
        self.stop_io();
        // stop_io is a no-op when I/O was never started; the socket still
        // closes on entity stop
        if let Some(tx) = self.close_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
        *self.socket.lock().unwrap() = None;
        self.err_notify(Error::UdpEntityStopped);
        self.entity.release_callbacks();
        true
    }

    fn socket(&self) -> Option<Arc<UdpSocket>> {
        self.socket.lock().unwrap().clone()
    }
}

impl IoBase for UdpEntityIo {
    fn is_io_started(&self) -> bool {
        self.io_common.is_io_started()
    }

    /// Closes the socket, reports [`Error::UdpIoHandlerStopped`], then fires
    /// the io-state-change callback with `starting = false`. False if I/O
    /// was never started.
    fn stop_io(&self) -> bool {
        if !self.io_common.stop() {
            return false;
        }
        if let Some(tx) = self.close_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
        // the socket closes as the receive and drain tasks drop their
        // references
        *self.socket.lock().unwrap() = None;
        self.err_notify(Error::UdpIoHandlerStopped);
        if let Some(this) = self.weak_self.upgrade() {
            self.entity.call_io_state_change(&this, 0, false);
        }
        true
    }

    /// Queues a datagram for the default destination; dropped with a warning
    /// when none was selected.
    fn send(&self, buf: Bytes) -> bool {
        let dest = *self.default_dest.lock().unwrap();
        match dest {
            Some(endp) => self.send_to(buf, endp),
            None => {
                warn!("udp send with no default destination, dropping {} bytes", buf.len());
                false
            }
        }
    }

    /// Queues a datagram for an explicit destination. Safe from any thread.
    fn send_to(&self, buf: Bytes, endp: SocketAddr) -> bool {
        let Some(socket) = self.socket.lock().unwrap().clone() else {
            return false;
        };
        if self.io_common.start_write_setup(buf, Some(endp)) {
            if let Some(this) = self.weak_self.upgrade() {
                let wg = self.wg.lock().unwrap().clone();
                if let Some(wg) = wg {
                    let worker = wg.add(1);
                    self.rt.spawn(async move {
                        this.drain_datagrams(socket).await;
                        worker.done();
                    });
                }
            }
        }
        self.is_io_started()
    }

    fn output_queue_stats(&self) -> OutputQueueStats {
        self.io_common.output_queue_stats()
    }
}

impl IoInterface<UdpEntityIo> {
    /// Activates the receive loop; see [`UdpEntityIo::start_io`].
    pub fn start_io(
        &self,
        max_size: usize,
        msg_handler: MsgHandler<UdpEntityIo>,
    ) -> crate::error::Result<bool> {
        Ok(self.upgrade()?.start_io(max_size, msg_handler))
    }

    /// Receive loop plus a default destination; see
    /// [`UdpEntityIo::start_io_with_default`].
    pub fn start_io_with_default(
        &self,
        default_dest: SocketAddr,
        max_size: usize,
        msg_handler: MsgHandler<UdpEntityIo>,
    ) -> crate::error::Result<bool> {
        Ok(self
            .upgrade()?
            .start_io_with_default(default_dest, max_size, msg_handler))
    }

    /// Send-only activation; see [`UdpEntityIo::start_send_only`].
    pub fn start_send_only(&self) -> crate::error::Result<bool> {
        Ok(self.upgrade()?.start_send_only())
    }

    /// Send-only with a default destination; see
    /// [`UdpEntityIo::start_send_only_to`].
    pub fn start_send_only_to(&self, default_dest: SocketAddr) -> crate::error::Result<bool> {
        Ok(self.upgrade()?.start_send_only_to(default_dest))
    }

    /// The bound endpoint while the socket is open.
    pub fn local_endpoint(&self) -> crate::error::Result<Option<SocketAddr>> {
        Ok(self.upgrade()?.local_endpoint())
    }
}
