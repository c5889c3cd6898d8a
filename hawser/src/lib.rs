//! # Hawser - Callback-Driven Async Networking
//!
//! `hawser` abstracts the repetitive parts of stream- and datagram-oriented
//! socket programming — connection establishment and teardown, message
//! framing, backpressure, concurrent-safe sending, and lifecycle
//! notification — behind a small set of composable entities driven by
//! application-supplied callbacks.
//!
//! ## Core Concepts
//!
//! ### Network entities
//!
//! An entity is a long-lived object with a started/stopped lifecycle:
//!
//! - **[`TcpAcceptor`]**: listens on a local endpoint and spawns an I/O
//!   handler for every accepted connection
//! - **[`TcpConnector`]**: maintains one outbound connection, resolving the
//!   remote name if needed and reconnecting on failure after a configurable
//!   interval
//! - **[`UdpEntityIo`]**: a single UDP socket, bound or send-only, playing
//!   the entity and I/O-handler roles at once
//!
//! Entities are owned by a [`Net`] registry (or any `Arc` holder);
//! applications work through two kinds of lightweight weak handles:
//! [`NetEntity`] for the entity lifecycle and [`IoInterface`] for a single
//! handler's I/O. Dropping handles never keeps a connection alive, and using
//! a handle whose object is gone fails with [`Error::WeakPtrExpired`].
//!
//! ### Callbacks
//!
//! `start` installs two application callbacks:
//!
//! - the **io-state-change callback** fires with an [`IoInterface`] each
//!   time an I/O handler becomes ready (and, for UDP, when readiness is
//!   withdrawn)
//! - the **error callback** fires on any terminal failure or shutdown, with
//!   a stable [`Error`] code and the affected interface
//!
//! Inside the io-state-change callback the application calls `start_io`,
//! choosing a [`Framing`] policy and supplying a message handler; the
//! handler receives each complete inbound message and may `send` replies
//! from any thread.
//!
//! ## Event Flow
//!
//! ```text
//!    application                      hawser                       peer
//!        |                              |                            |
//!        |-- start(io_cb, err_cb) ----->|                            |
//!        |                              |-- listen/connect/bind ---->|
//!        |<------ io_cb(io, n, true) ---|        (per handler)       |
//!        |-- io.start_io(framing, mh) ->|                            |
//!        |                              |<========= bytes ==========>|
//!        |<-- mh(msg, io, endp) --------|   framed reads, serialized |
//!        |        io.send(reply) ------>|   writes, one in flight    |
//!        |                              |                            |
//!        |<-- err_cb(io, code, n) ------|   on error or shutdown     |
//! ```
//!
//! ## Example: echo server
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use hawser::{Framing, Net, start_with_io_channel, error_channel};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let net = Net::new();
//!     let acceptor = net.make_tcp_acceptor("127.0.0.1:5000".parse()?, true);
//!
//!     let (err_cb, _errors) = error_channel();
//!     let mut io_events = start_with_io_channel(&acceptor, err_cb)?;
//!
//!     while let Some(event) = io_events.recv().await {
//!         if event.starting {
//!             event.io.start_io(
//!                 Framing::delimiter(&b"\r\n"[..]),
//!                 Box::new(|msg, io, _endp| {
//!                     let _ = io.send(Bytes::copy_from_slice(msg));
//!                     true
//!                 }),
//!             )?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency model
//!
//! All socket completions run on the tokio runtime the entity was created
//! in; user callbacks are invoked on executor threads. Within one handler,
//! reads complete in order and writes complete in enqueue order — a
//! write-in-flight ticket serializes them, and the bounded-by-backpressure
//! output queue is the only flow control. Across handlers there are no
//! ordering guarantees. `send` may be called from any thread; it posts the
//! write onto the handler's executor.

#![warn(rust_2018_idioms)]
#![warn(missing_docs)]

pub(crate) mod delivery;
pub(crate) mod entity_common;
pub(crate) mod error;
pub(crate) mod io_common;
pub(crate) mod io_interface;
pub(crate) mod net;
pub(crate) mod net_entity;
pub(crate) mod queue;
pub(crate) mod tcp;
pub(crate) mod udp;

pub use delivery::{
    empty_error_cb, error_channel, io_interface_future, io_interface_future_pair,
    start_with_io_channel, ErrorEvent, IoFuturePair, IoStateEvent,
};
pub use error::{Error, Result};
pub use io_interface::{ErrorCb, IoBase, IoInterface, IoStateChangeCb, MsgHandler};
pub use net::{Net, Registry};
pub use net_entity::{Entity, NetEntity};
pub use queue::OutputQueueStats;
pub use tcp::{TcpAcceptor, TcpConnector, TcpIo};
pub use udp::UdpEntityIo;

// the framing surface is part of start_io's signature
pub use hawser_codec::{FrameFn, Framing};
