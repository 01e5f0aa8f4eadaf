//! Integration tests for the one-byte control transport over loopback TCP

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use airsales_core::{ControlCode, ControlSendError, ControlSender};
use airsales_ipc::{ControlClient, ControlHandler, ControlLink, ControlServer};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Forwards every received code to a channel the test can await.
fn forwarding_handler() -> (Arc<dyn ControlHandler>, mpsc::UnboundedReceiver<ControlCode>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler: Arc<dyn ControlHandler> = Arc::new(move |code: ControlCode| {
        let _ = tx.send(code);
    });
    (handler, rx)
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<ControlCode>) -> Option<ControlCode> {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .ok()
        .flatten()
}

#[tokio::test]
async fn codes_travel_both_ways() {
    let server = ControlServer::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let (seller_handler, mut seller_rx) = forwarding_handler();
    let server = server.spawn(seller_handler);

    let (manager_handler, mut manager_rx) = forwarding_handler();
    let connection = ControlClient::connect(&addr, manager_handler).await.unwrap();

    server.link().wait_connected().await;
    connection.link().send(ControlCode::Departure).unwrap();
    assert_eq!(recv(&mut seller_rx).await, Some(ControlCode::Departure));

    server.link().send(ControlCode::AllFlightsSoldOut).unwrap();
    assert_eq!(recv(&mut manager_rx).await, Some(ControlCode::AllFlightsSoldOut));

    connection.close(Duration::from_secs(1)).await;
    server.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn malformed_payloads_are_ignored() {
    let server = ControlServer::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    let (handler, mut rx) = forwarding_handler();
    let server = server.spawn(handler);

    let mut raw = TcpStream::connect(addr).await.unwrap();
    raw.set_nodelay(true).unwrap();

    raw.write_all(&[0x5D, 0x7A]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    raw.write_all(&[0x01]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    raw.write_all(&[0x7A]).await.unwrap();

    assert_eq!(recv(&mut rx).await, Some(ControlCode::WeAreTooRichNow));
    assert!(rx.try_recv().is_err());

    server.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn queued_code_is_flushed_on_close() {
    let server = ControlServer::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let (seller_handler, mut seller_rx) = forwarding_handler();
    let server = server.spawn(seller_handler);

    let (manager_handler, _manager_rx) = forwarding_handler();
    let connection = ControlClient::connect(&addr, manager_handler).await.unwrap();
    let link = connection.link();

    link.send(ControlCode::WeAreTooRichNow).unwrap();
    connection.close(Duration::from_secs(1)).await;

    assert_eq!(recv(&mut seller_rx).await, Some(ControlCode::WeAreTooRichNow));
    assert_eq!(
        link.send(ControlCode::Departure),
        Err(ControlSendError::NotConnected)
    );

    server.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn connect_without_listener_fails() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let (handler, _rx) = forwarding_handler();
    assert!(ControlClient::connect(&addr, handler).await.is_err());
}

#[tokio::test]
async fn send_after_peer_vanishes_settles_to_connection_closed() {
    let server = ControlServer::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    let (handler, _rx) = forwarding_handler();
    let server = server.spawn(handler);
    let link = server.link();

    let raw = TcpStream::connect(addr).await.unwrap();
    link.wait_connected().await;
    drop(raw);

    // The kernel may accept a write or two before the reset reaches the
    // writer task; after that the link reports the connection as closed.
    let mut results = Vec::new();
    for _ in 0..100 {
        let result = link.send(ControlCode::AllFlightsSoldOut);
        results.push(result.clone());
        if result.is_err() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(
        results.iter().all(|r| matches!(r, Ok(()) | Err(ControlSendError::ConnectionClosed))),
        "unexpected send results: {results:?}"
    );
    assert_eq!(results.last(), Some(&Err(ControlSendError::ConnectionClosed)));
    assert_eq!(
        link.send(ControlCode::AllFlightsSoldOut),
        Err(ControlSendError::ConnectionClosed)
    );

    server.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn link_created_before_connect_reaches_the_server() {
    let server = ControlServer::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let (seller_handler, mut seller_rx) = forwarding_handler();
    let server = server.spawn(seller_handler);

    let link = ControlLink::new();
    assert_eq!(link.send(ControlCode::Departure), Err(ControlSendError::NotConnected));

    let (manager_handler, _manager_rx) = forwarding_handler();
    let connection = ControlClient::connect_with_link(&addr, link.clone(), manager_handler)
        .await
        .unwrap();

    assert!(link.is_connected());
    link.send(ControlCode::Departure).unwrap();
    assert_eq!(recv(&mut seller_rx).await, Some(ControlCode::Departure));

    connection.close(Duration::from_secs(1)).await;
    server.shutdown(Duration::from_secs(1)).await;
}
