//! Shared fixtures for the loopback test scenarios.

#![allow(dead_code)]

use bytes::{BufMut, Bytes, BytesMut};
use hawser::{
    error_channel, ErrorEvent, Framing, IoInterface, IoStateChangeCb, NetEntity, Result,
    TcpAcceptor, TcpIo,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Body length in a 2-byte big-endian header, the wire format used by the
/// variable-length scenarios.
pub fn make_variable_len_msg(body: &[u8]) -> Bytes {
    assert!(body.len() <= u16::MAX as usize);
    let mut buf = BytesMut::with_capacity(body.len() + 2);
    buf.put_u16(body.len() as u16);
    buf.put_slice(body);
    buf.freeze()
}

/// Messages of increasing size: `base` followed by 0..count fill bytes.
pub fn make_msg_set(
    make: impl Fn(&[u8]) -> Bytes,
    base: &str,
    fill: u8,
    count: usize,
) -> Vec<Bytes> {
    (0..count)
        .map(|i| {
            let mut body = base.as_bytes().to_vec();
            body.extend(std::iter::repeat(fill).take(i));
            make(&body)
        })
        .collect()
}

pub fn make_cr_lf_msg(body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(body.len() + 2);
    buf.put_slice(body);
    buf.put_slice(b"\r\n");
    buf.freeze()
}

pub fn variable_len_framing() -> Framing {
    Framing::header(
        2,
        Box::new(|hdr: &mut [u8]| u16::from_be_bytes([hdr[0], hdr[1]]) as usize),
    )
}

pub fn cr_lf_framing() -> Framing {
    Framing::delimiter(&b"\r\n"[..])
}

/// io-state-change callback that starts framed I/O on every ready handler,
/// counting received messages and echoing them back when `reply` is set.
pub fn counting_io_cb(
    framing: impl Fn() -> Framing + Send + Sync + 'static,
    reply: bool,
    count: Arc<AtomicUsize>,
) -> IoStateChangeCb<TcpIo> {
    Arc::new(move |io: IoInterface<TcpIo>, _count, starting| {
        if starting {
            let count = count.clone();
            let _ = io.start_io(
                framing(),
                Box::new(move |msg, io, _endp| {
                    count.fetch_add(1, Ordering::SeqCst);
                    if reply {
                        let _ = io.send(Bytes::copy_from_slice(msg));
                    }
                    true
                }),
            );
        }
    })
}

/// Binds an acceptor on an ephemeral loopback port with the given framing
/// and echo behavior. Returns its handle, the bound address, the receive
/// counter, and the error event stream.
pub fn start_counting_acceptor(
    framing: impl Fn() -> Framing + Send + Sync + 'static,
    reply: bool,
) -> Result<(
    Arc<TcpAcceptor>,
    std::net::SocketAddr,
    Arc<AtomicUsize>,
    UnboundedReceiver<ErrorEvent<TcpIo>>,
)> {
    let acceptor = TcpAcceptor::new("127.0.0.1:0".parse().unwrap(), true);
    let handle = NetEntity::from_entity(&acceptor);
    let count = Arc::new(AtomicUsize::new(0));
    let (err_cb, err_rx) = error_channel();
    assert!(handle.start(counting_io_cb(framing, reply, count.clone()), err_cb)?);
    let addr = acceptor
        .local_endpoint()
        .expect("acceptor must be bound after start");
    Ok((acceptor, addr, count, err_rx))
}

/// Polls `cond` until it holds or the deadline passes.
pub async fn wait_for(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
