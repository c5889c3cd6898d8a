//! Channel-based delivery of io-state changes and errors.
//!
//! When all I/O processing happens inside the message handler there is no
//! need to keep a separate [`IoInterface`] around. When there is — sends not
//! driven by received messages, test synchronization, connection accounting
//! — these helpers package the common wiring: they start an entity with
//! callbacks that forward every state change or error into a tokio channel.
//!
//! One-shot delivery ([`io_interface_future`],
//! [`io_interface_future_pair`]) fits connectors and UDP entities, which go
//! through a single ready/terminated cycle per start. An acceptor goes
//! through one cycle per accepted connection, so its state changes arrive
//! over the unbounded channel of [`start_with_io_channel`] instead.

use crate::error::{Error, Result};
use crate::io_interface::{ErrorCb, IoInterface};
use crate::net_entity::{Entity, NetEntity};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

/// One io-state-change callback invocation, as delivered over a channel.
#[derive(Debug)]
pub struct IoStateEvent<H> {
    /// Interface to the handler that changed state.
    pub io: IoInterface<H>,
    /// Live-handler count at the time of the change.
    pub count: usize,
    /// True when the handler became ready, false when it is going away.
    pub starting: bool,
}

/// One error callback invocation, as delivered over a channel.
#[derive(Debug)]
pub struct ErrorEvent<H> {
    /// Interface to the affected handler; may be invalid.
    pub io: IoInterface<H>,
    /// The reported code.
    pub err: Error,
    /// Live-handler count at the time of the report.
    pub count: usize,
}

/// An error callback that discards every report.
pub fn empty_error_cb<H>() -> ErrorCb<H> {
    Arc::new(|_, _, _| {})
}

/// An error callback paired with a receiver of everything it is given.
pub fn error_channel<H: Send + Sync + 'static>() -> (ErrorCb<H>, mpsc::UnboundedReceiver<ErrorEvent<H>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cb: ErrorCb<H> = Arc::new(move |io, err, count| {
        let _ = tx.send(ErrorEvent { io, err, count });
    });
    (cb, rx)
}

/// Starts the entity and delivers every io-state change over an unbounded
/// channel. Suits acceptors, whose handlers come and go for the lifetime of
/// the entity.
pub fn start_with_io_channel<E: Entity>(
    entity: &NetEntity<E>,
    err_cb: ErrorCb<E::Handler>,
) -> Result<mpsc::UnboundedReceiver<IoStateEvent<E::Handler>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    entity.start(
        Arc::new(move |io, count, starting| {
            let _ = tx.send(IoStateEvent {
                io,
                count,
                starting,
            });
        }),
        err_cb,
    )?;
    Ok(rx)
}

/// Starts the entity and resolves with the first ready [`IoInterface`].
///
/// The state change after the first is dropped, so this suits connectors
/// and UDP entities, not acceptors.
pub fn io_interface_future<E: Entity>(
    entity: &NetEntity<E>,
    err_cb: ErrorCb<E::Handler>,
) -> Result<oneshot::Receiver<IoInterface<E::Handler>>> {
    let (tx, rx) = oneshot::channel();
    let tx = Mutex::new(Some(tx));
    entity.start(
        Arc::new(move |io, _count, starting| {
            if starting {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(io);
                }
            }
        }),
        err_cb,
    )?;
    Ok(rx)
}

/// Receivers for the first ready and first terminated state change of an
/// entity's handler.
pub struct IoFuturePair<H> {
    /// Resolves when the handler becomes ready.
    pub ready: oneshot::Receiver<IoInterface<H>>,
    /// Resolves when that readiness is withdrawn (UDP `stop_io`) or, for a
    /// connector, when the terminal error for the handler is reported.
    pub terminated: oneshot::Receiver<IoInterface<H>>,
}

/// Starts the entity and resolves both the first ready interface and the
/// matching termination.
///
/// Termination surfaces through the error callback for TCP handlers and
/// through the io-state-change callback for UDP entities; both paths are
/// wired here, whichever fires first wins, and the application's own error
/// callback still sees every report.
pub fn io_interface_future_pair<E: Entity>(
    entity: &NetEntity<E>,
    err_cb: ErrorCb<E::Handler>,
) -> Result<IoFuturePair<E::Handler>> {
    let (ready_tx, ready_rx) = oneshot::channel();
    let (term_tx, term_rx) = oneshot::channel();
    let ready_tx = Mutex::new(Some(ready_tx));
    let term_tx = Arc::new(Mutex::new(Some(term_tx)));

    let term_from_err = term_tx.clone();
    let wrapped_err: ErrorCb<E::Handler> = Arc::new(move |io: IoInterface<E::Handler>, err, count| {
        // entity-stop codes are not handler terminations; everything else is
        let entity_stop = matches!(
            err,
            Error::TcpAcceptorStopped | Error::TcpConnectorStopped | Error::UdpEntityStopped
        );
        if !entity_stop {
            if let Some(tx) = term_from_err.lock().unwrap().take() {
                let _ = tx.send(io.clone());
            }
        }
        err_cb(io, err, count);
    });

    entity.start(
        Arc::new(move |io, _count, starting| {
            if starting {
                if let Some(tx) = ready_tx.lock().unwrap().take() {
                    let _ = tx.send(io);
                }
            } else if let Some(tx) = term_tx.lock().unwrap().take() {
                let _ = tx.send(io);
            }
        }),
        wrapped_err,
    )?;
    Ok(IoFuturePair {
        ready: ready_rx,
        terminated: term_rx,
    })
}
