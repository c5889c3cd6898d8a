//! Loopback scenarios for the UDP entity.

mod common;

use bytes::Bytes;
use common::*;
use hawser::{error_channel, io_interface_future, Error, NetEntity, UdpEntityIo};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_hundred_datagrams_arrive_with_sender_endpoint() {
    init_logging();

    // receiver bound to loopback
    let receiver = UdpEntityIo::new(Some("127.0.0.1:0".parse().unwrap()));
    let recv_handle = NetEntity::from_entity(&receiver);
    let (recv_err_cb, _recv_errs) = error_channel();
    let ready = io_interface_future(&recv_handle, recv_err_cb).unwrap();
    let recv_io = tokio::time::timeout(Duration::from_secs(5), ready)
        .await
        .expect("receiver never became ready")
        .expect("receiver dropped");

    let count = Arc::new(AtomicUsize::new(0));
    let senders: Arc<Mutex<Vec<SocketAddr>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let count = count.clone();
        let senders = senders.clone();
        assert!(recv_io
            .start_io(
                2048,
                Box::new(move |msg, _io, sender| {
                    assert!(!msg.is_empty());
                    senders.lock().unwrap().push(sender);
                    count.fetch_add(1, Ordering::SeqCst);
                    true
                }),
            )
            .unwrap());
    }
    let recv_addr = recv_io.local_endpoint().unwrap().expect("receiver bound");

    // loopback-bound entity targeting the receiver by default
    let sender = UdpEntityIo::new(Some("127.0.0.1:0".parse().unwrap()));
    let send_handle = NetEntity::from_entity(&sender);
    let (send_err_cb, _send_errs) = error_channel();
    let ready = io_interface_future(&send_handle, send_err_cb).unwrap();
    let send_io = tokio::time::timeout(Duration::from_secs(5), ready)
        .await
        .expect("sender never became ready")
        .expect("sender dropped");
    assert!(send_io.start_send_only_to(recv_addr).unwrap());
    let send_addr = send_io.local_endpoint().unwrap().expect("sender bound");

    for i in 0..100u32 {
        let msg = format!("datagram {}", i);
        assert!(send_io.send(Bytes::from(msg)).unwrap());
        if i % 10 == 9 {
            // pace the burst so loopback buffering never drops
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    assert!(
        wait_for(Duration::from_secs(10), || count.load(Ordering::SeqCst) >= 100).await,
        "received {} of 100 datagrams",
        count.load(Ordering::SeqCst)
    );
    let senders = senders.lock().unwrap();
    assert!(senders.iter().all(|addr| *addr == send_addr));

    sender.graceful_stop().await;
    receiver.graceful_stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_reports_io_then_entity_codes() {
    init_logging();

    let udp = UdpEntityIo::new(Some("127.0.0.1:0".parse().unwrap()));
    let handle = NetEntity::from_entity(&udp);
    let (err_cb, mut err_rx) = error_channel();
    let ready = io_interface_future(&handle, err_cb).unwrap();
    let io = tokio::time::timeout(Duration::from_secs(5), ready)
        .await
        .expect("entity never became ready")
        .expect("entity dropped");
    assert!(io.start_io(1024, Box::new(|_, _, _| true)).unwrap());

    assert!(handle.stop().unwrap());
    assert!(!handle.stop().unwrap());
    udp.wait_for_stop().await;

    let first = err_rx.try_recv().expect("missing io handler report");
    assert!(matches!(first.err, Error::UdpIoHandlerStopped));
    let second = err_rx.try_recv().expect("missing entity report");
    assert!(matches!(second.err, Error::UdpEntityStopped));
    assert!(err_rx.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn explicit_destination_overrides_default() {
    init_logging();

    let make_receiver = || async {
        let udp = UdpEntityIo::new(Some("127.0.0.1:0".parse().unwrap()));
        let handle = NetEntity::from_entity(&udp);
        let ready = io_interface_future(&handle, hawser::empty_error_cb()).unwrap();
        let io = tokio::time::timeout(Duration::from_secs(5), ready)
            .await
            .expect("receiver never became ready")
            .expect("receiver dropped");
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        assert!(io
            .start_io(
                1024,
                Box::new(move |_, _, _| {
                    c.fetch_add(1, Ordering::SeqCst);
                    true
                }),
            )
            .unwrap());
        let addr = io.local_endpoint().unwrap().unwrap();
        (udp, addr, count)
    };

    let (recv_a, addr_a, count_a) = make_receiver().await;
    let (recv_b, addr_b, count_b) = make_receiver().await;

    let sender = UdpEntityIo::new(None);
    let handle = NetEntity::from_entity(&sender);
    let ready = io_interface_future(&handle, hawser::empty_error_cb()).unwrap();
    let io = tokio::time::timeout(Duration::from_secs(5), ready)
        .await
        .expect("sender never became ready")
        .expect("sender dropped");
    assert!(io.start_send_only_to(addr_a).unwrap());

    assert!(io.send(Bytes::from_static(b"to default")).unwrap());
    assert!(io.send_to(Bytes::from_static(b"to override"), addr_b).unwrap());

    assert!(wait_for(Duration::from_secs(5), || count_a.load(Ordering::SeqCst) == 1).await);
    assert!(wait_for(Duration::from_secs(5), || count_b.load(Ordering::SeqCst) == 1).await);

    sender.graceful_stop().await;
    recv_a.graceful_stop().await;
    recv_b.graceful_stop().await;
}
