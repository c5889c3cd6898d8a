//! Graceful shutdown under load and teardown reporting.

mod common;

use bytes::Bytes;
use common::*;
use hawser::{error_channel, io_interface_future, Error, NetEntity, TcpConnector};
use std::sync::Arc;
use std::time::Duration;

const RECONN_TIME: Duration = Duration::from_millis(100);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_during_heavy_send_reports_shutdown_exactly_once() {
    init_logging();

    // sink acceptor: drains whatever arrives without delivering messages
    let acceptor = hawser::TcpAcceptor::new("127.0.0.1:0".parse().unwrap(), true);
    let acc_handle = NetEntity::from_entity(&acceptor);
    let (acc_err_cb, _acc_errs) = error_channel();
    assert!(acc_handle
        .start(
            Arc::new(|io, _count, starting| {
                if starting {
                    let _ = io.start_sink_io();
                }
            }),
            acc_err_cb,
        )
        .unwrap());
    let addr = acceptor.local_endpoint().unwrap();

    let connector = TcpConnector::with_endpoints(vec![addr], RECONN_TIME);
    let conn_handle = NetEntity::from_entity(&connector);
    let (err_cb, mut err_rx) = error_channel();
    let ready = io_interface_future(&conn_handle, err_cb).unwrap();
    let io = tokio::time::timeout(Duration::from_secs(10), ready)
        .await
        .expect("connect timed out")
        .expect("connector dropped before connecting");
    assert!(io.start_sink_io().unwrap());

    // pile up writes, then pull the plug mid-flight
    let buf = Bytes::from(vec![0x5a; 1024]);
    for _ in 0..10_000 {
        let _ = io.send(buf.clone());
    }
    assert!(conn_handle.stop().unwrap());
    connector.wait_for_stop().await;

    let mut io_handler_stopped = 0;
    let mut connector_stopped = 0;
    while let Ok(event) = err_rx.try_recv() {
        match event.err {
            Error::TcpIoHandlerStopped => io_handler_stopped += 1,
            Error::TcpConnectorStopped => connector_stopped += 1,
            _ => {}
        }
    }
    assert_eq!(io_handler_stopped, 1, "handler shutdown reported once");
    assert_eq!(connector_stopped, 1, "connector shutdown reported once");

    // the handler is gone: the interface expired with it
    assert!(!io.is_valid());
    assert!(matches!(io.send(buf), Err(Error::WeakPtrExpired)));

    acceptor.graceful_stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn message_handler_returning_false_tears_down_the_handler() {
    init_logging();

    // acceptor-side handler rejects every message
    let acceptor = hawser::TcpAcceptor::new("127.0.0.1:0".parse().unwrap(), true);
    let acc_handle = NetEntity::from_entity(&acceptor);
    let (acc_err_cb, mut acc_errs) = error_channel();
    assert!(acc_handle
        .start(
            Arc::new(|io, _count, starting| {
                if starting {
                    let _ = io.start_io(variable_len_framing(), Box::new(|_, _, _| false));
                }
            }),
            acc_err_cb,
        )
        .unwrap());
    let addr = acceptor.local_endpoint().unwrap();

    let connector = TcpConnector::with_endpoints(vec![addr], RECONN_TIME);
    let conn_handle = NetEntity::from_entity(&connector);
    let ready = io_interface_future(&conn_handle, hawser::empty_error_cb()).unwrap();
    let io = tokio::time::timeout(Duration::from_secs(10), ready)
        .await
        .expect("connect timed out")
        .expect("connector dropped before connecting");
    assert!(io.start_sink_io().unwrap());
    let _ = io.send(make_variable_len_msg(b"rejected"));

    let event = tokio::time::timeout(Duration::from_secs(5), acc_errs.recv())
        .await
        .expect("no teardown reported")
        .expect("error channel closed");
    assert!(matches!(event.err, Error::MessageHandlerTerminated));

    connector.graceful_stop().await;
    acceptor.graceful_stop().await;
}
