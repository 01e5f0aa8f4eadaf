//! One-byte control transport over a loopback TCP connection.
//!
//! The Seller binds a [`ControlServer`]; the Manager connects with
//! [`ControlClient::connect`]. Both ends end up with the same shape:
//!
//! - a reader task that hands every received chunk to [`dispatch`]
//! - a writer task draining an unbounded queue of [`ControlCode`]s
//! - a [`ControlLink`] that other components use to queue codes
//!
//! Sending never blocks and never fails the caller: without a live peer
//! [`ControlLink::send`] returns an error the caller logs.

use crate::error::IpcError;
use airsales_core::{ControlCode, ControlCodeError, ControlSendError, ControlSender};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

const READ_BUFFER: usize = 64;

/// Receives control codes decoded from the peer.
///
/// Called on the reader task; implementations must not block.
pub trait ControlHandler: Send + Sync {
    /// React to `code`.
    fn on_code(&self, code: ControlCode);
}

impl<F> ControlHandler for F
where
    F: Fn(ControlCode) + Send + Sync,
{
    fn on_code(&self, code: ControlCode) {
        self(code);
    }
}

/// Decode one received payload and pass it to `handler`.
///
/// Payloads that are not exactly one byte, and unknown bytes, are logged and
/// dropped.
pub fn dispatch(payload: &[u8], handler: &dyn ControlHandler) {
    match ControlCode::decode(payload) {
        Ok(code) => {
            debug!(%code, "Received control code");
            handler.on_code(code);
        }
        Err(ControlCodeError::InvalidLength(len)) => {
            warn!(len, "Ignoring control payload with invalid length");
        }
        Err(e @ ControlCodeError::Unknown(_)) => {
            warn!(error = %e, "Ignoring unknown control code");
        }
    }
}

struct Peer {
    addr: SocketAddr,
    outbound: mpsc::UnboundedSender<ControlCode>,
    writer: JoinHandle<()>,
}

struct LinkInner {
    peer: Mutex<Option<Peer>>,
    connected: watch::Sender<bool>,
}

/// Sending side of the control connection, shared by every component that
/// needs to notify the peer.
///
/// The most recently attached connection is the peer.
#[derive(Clone)]
pub struct ControlLink {
    inner: Arc<LinkInner>,
}

impl ControlLink {
    /// A link with no peer yet.
    #[must_use]
    pub fn new() -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            inner: Arc::new(LinkInner {
                peer: Mutex::new(None),
                connected,
            }),
        }
    }

    /// True while a peer is attached.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    /// Address of the attached peer.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.lock().as_ref().map(|peer| peer.addr)
    }

    /// Wait until a peer has attached at least once.
    pub async fn wait_connected(&self) {
        let mut rx = self.inner.connected.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|connected| *connected).await;
    }

    /// Stop accepting codes, deliver what is queued, and wait up to
    /// `timeout` for the writer to finish.
    pub async fn close(&self, timeout: Duration) {
        let peer = self.lock().take();
        let Some(peer) = peer else {
            return;
        };
        let Peer {
            addr,
            outbound,
            writer,
        } = peer;
        drop(outbound);

        if tokio::time::timeout(timeout, writer).await.is_err() {
            warn!(peer = %addr, "Control writer did not drain in time");
        }
    }

    fn attach(&self, addr: SocketAddr, write_half: OwnedWriteHalf) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(write_half, rx, addr));

        let previous = self.lock().replace(Peer {
            addr,
            outbound,
            writer,
        });
        if let Some(previous) = previous {
            info!(previous = %previous.addr, peer = %addr, "Replacing control peer");
        }
        self.inner.connected.send_replace(true);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Peer>> {
        self.inner.peer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ControlLink {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ControlLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlLink")
            .field("peer", &self.peer_addr())
            .finish()
    }
}

impl ControlSender for ControlLink {
    fn send(&self, code: ControlCode) -> Result<(), ControlSendError> {
        let guard = self.lock();
        let peer = guard.as_ref().ok_or(IpcError::NotConnected)?;
        peer.outbound
            .send(code)
            .map_err(|_| IpcError::ConnectionClosed)?;
        Ok(())
    }
}

/// Seller side: accepts Manager connections.
#[derive(Debug)]
pub struct ControlServer {
    listener: TcpListener,
    link: ControlLink,
}

impl ControlServer {
    /// Bind the control listener on `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::Io`] if the address cannot be bound.
    pub async fn bind(addr: &str) -> Result<Self, IpcError> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "Control listener bound");

        Ok(Self {
            listener,
            link: ControlLink::new(),
        })
    }

    /// Bound address.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::Io`] if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr, IpcError> {
        Ok(self.listener.local_addr()?)
    }

    /// Link to whichever Manager is connected.
    #[must_use]
    pub fn link(&self) -> ControlLink {
        self.link.clone()
    }

    /// Start accepting connections, routing received codes to `handler`.
    #[must_use]
    pub fn spawn(self, handler: Arc<dyn ControlHandler>) -> ControlServerHandle {
        let link = self.link.clone();
        let accept = tokio::spawn(accept_loop(self.listener, self.link, handler));

        ControlServerHandle { accept, link }
    }
}

/// Running [`ControlServer`].
#[derive(Debug)]
pub struct ControlServerHandle {
    accept: JoinHandle<()>,
    link: ControlLink,
}

impl ControlServerHandle {
    /// Link to whichever Manager is connected.
    #[must_use]
    pub fn link(&self) -> ControlLink {
        self.link.clone()
    }

    /// Flush queued codes and stop accepting and reading.
    pub async fn shutdown(self, timeout: Duration) {
        self.link.close(timeout).await;
        self.accept.abort();
    }
}

async fn accept_loop(listener: TcpListener, link: ControlLink, handler: Arc<dyn ControlHandler>) {
    // Dropping the set when this task is aborted aborts every reader.
    let mut readers = JoinSet::new();

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!(peer = %addr, "Manager connected");
                let read_half = split_and_attach(stream, addr, &link);
                readers.spawn(read_loop(read_half, Arc::clone(&handler), addr));
            }
            Err(e) => {
                warn!(error = %e, "Failed to accept control connection");
            }
        }
    }
}

/// Manager side: connects to the Seller.
#[derive(Debug)]
pub struct ControlClient;

impl ControlClient {
    /// Connect to the Seller's listener at `addr`, routing received codes
    /// to `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::Io`] if the connection cannot be established.
    pub async fn connect(
        addr: &str,
        handler: Arc<dyn ControlHandler>,
    ) -> Result<ControlConnection, IpcError> {
        Self::connect_with_link(addr, ControlLink::new(), handler).await
    }

    /// Like [`Self::connect`], attaching the connection to an existing
    /// `link` so senders created before connecting reach the Seller.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::Io`] if the connection cannot be established.
    pub async fn connect_with_link(
        addr: &str,
        link: ControlLink,
        handler: Arc<dyn ControlHandler>,
    ) -> Result<ControlConnection, IpcError> {
        let stream = TcpStream::connect(addr).await?;
        let peer = stream.peer_addr()?;
        info!(peer = %peer, "Connected to seller");

        let read_half = split_and_attach(stream, peer, &link);
        let reader = tokio::spawn(read_loop(read_half, handler, peer));

        Ok(ControlConnection { link, reader })
    }
}

/// Established Manager connection.
#[derive(Debug)]
pub struct ControlConnection {
    link: ControlLink,
    reader: JoinHandle<()>,
}

impl ControlConnection {
    /// Link to the Seller.
    #[must_use]
    pub fn link(&self) -> ControlLink {
        self.link.clone()
    }

    /// Flush queued codes and stop reading.
    pub async fn close(self, timeout: Duration) {
        self.link.close(timeout).await;
        self.reader.abort();
    }
}

fn split_and_attach(stream: TcpStream, addr: SocketAddr, link: &ControlLink) -> OwnedReadHalf {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(peer = %addr, error = %e, "Could not disable Nagle on control socket");
    }
    let (read_half, write_half) = stream.into_split();
    link.attach(addr, write_half);
    read_half
}

async fn read_loop(mut reader: OwnedReadHalf, handler: Arc<dyn ControlHandler>, peer: SocketAddr) {
    let mut buf = [0u8; READ_BUFFER];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                info!(%peer, "Control peer disconnected");
                break;
            }
            Ok(n) => dispatch(&buf[..n], handler.as_ref()),
            Err(e) => {
                warn!(%peer, error = %e, "Control read failed");
                break;
            }
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<ControlCode>,
    peer: SocketAddr,
) {
    while let Some(code) = outbound.recv().await {
        if let Err(e) = writer.write_all(&[code.as_byte()]).await {
            warn!(%peer, %code, error = %e, "Failed to send control code");
            return;
        }
        info!(%peer, %code, "Sent control code");
    }

    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn send_without_peer_is_an_error() {
        let link = ControlLink::new();

        assert!(!link.is_connected());
        assert_eq!(
            link.send(ControlCode::AllFlightsSoldOut),
            Err(ControlSendError::NotConnected)
        );
    }

    #[test]
    fn dispatch_drops_malformed_payloads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler = move |_code: ControlCode| {
            counter.fetch_add(1, Ordering::SeqCst);
        };

        dispatch(&[], &handler);
        dispatch(&[0x5D, 0x7A], &handler);
        dispatch(&[0x00], &handler);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        dispatch(&[0x5D], &handler);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
