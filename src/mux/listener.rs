//! Accept loop and per-protocol virtual listeners

use super::stream::PeekedStream;
use super::{classify, Protocol};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Upper bound on bytes captured by the classification read
const PEEK_BUFFER_SIZE: usize = 512;

/// Classified connections waiting for an engine to pick them up
const ENDPOINT_BACKLOG: usize = 128;

/// Pause after a transient accept failure
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

type Routed<S> = (PeekedStream<S>, SocketAddr);

/// Source of raw connections for the multiplexer
#[async_trait]
pub trait Accept: Send + 'static {
    /// Connection type produced by the listener
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Wait for the next inbound connection
    async fn accept(&mut self) -> io::Result<(Self::Stream, SocketAddr)>;
}

#[async_trait]
impl Accept for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// Virtual listener receiving connections classified for one protocol
#[derive(Debug)]
pub struct MuxListener<S = TcpStream> {
    protocol: Protocol,
    rx: mpsc::Receiver<Routed<S>>,
}

impl<S> MuxListener<S> {
    /// Protocol served by this endpoint
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Wait for the next connection routed to this endpoint.
    ///
    /// Fails with `NotConnected` once the multiplexer has stopped and every
    /// pending connection has been taken.
    pub async fn accept(&mut self) -> io::Result<(PeekedStream<S>, SocketAddr)> {
        self.rx.recv().await.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotConnected,
                format!("{} endpoint closed", self.protocol),
            )
        })
    }
}

/// Splits one listener into a SOCKS5 endpoint and an HTTP endpoint
pub struct Multiplexer<L: Accept> {
    listener: L,
    classify_timeout: Duration,
}

impl<L: Accept> Multiplexer<L> {
    /// Wrap a bound listener
    pub fn new(listener: L, classify_timeout: Duration) -> Self {
        Self {
            listener,
            classify_timeout,
        }
    }

    /// Start the accept loop and return `(socks, http, accept_task)`.
    ///
    /// The loop runs until `shutdown_rx` fires or the listener fails fatally;
    /// both endpoints then report closed after draining.
    pub fn split(
        self,
        shutdown_rx: broadcast::Receiver<bool>,
    ) -> (MuxListener<L::Stream>, MuxListener<L::Stream>, JoinHandle<()>) {
        let (socks_tx, socks_rx) = mpsc::channel(ENDPOINT_BACKLOG);
        let (http_tx, http_rx) = mpsc::channel(ENDPOINT_BACKLOG);

        let handle = tokio::spawn(run_accept_loop(
            self.listener,
            self.classify_timeout,
            socks_tx,
            http_tx,
            shutdown_rx,
        ));

        (
            MuxListener {
                protocol: Protocol::Socks5,
                rx: socks_rx,
            },
            MuxListener {
                protocol: Protocol::Http,
                rx: http_rx,
            },
            handle,
        )
    }
}

async fn run_accept_loop<L: Accept>(
    mut listener: L,
    classify_timeout: Duration,
    socks_tx: mpsc::Sender<Routed<L::Stream>>,
    http_tx: mpsc::Sender<Routed<L::Stream>>,
    mut shutdown_rx: broadcast::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    let socks_tx = socks_tx.clone();
                    let http_tx = http_tx.clone();
                    tokio::spawn(async move {
                        route_connection(stream, peer, classify_timeout, socks_tx, http_tx).await;
                    });
                }
                Err(e) if is_fatal_accept_error(&e) => {
                    error!("Listener failed, stopping accept loop: {}", e);
                    break;
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            },
            _ = shutdown_rx.recv() => {
                info!("Multiplexer received shutdown signal");
                break;
            }
        }
    }
}

/// Errors after which the listener will never yield another connection
fn is_fatal_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotConnected
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

async fn route_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    classify_timeout: Duration,
    socks_tx: mpsc::Sender<Routed<S>>,
    http_tx: mpsc::Sender<Routed<S>>,
) where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; PEEK_BUFFER_SIZE];
    let n = match tokio::time::timeout(classify_timeout, stream.read(&mut buf)).await {
        Ok(Ok(0)) => {
            debug!("{} closed before sending any data", peer);
            return;
        }
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            debug!("Failed to read from {}: {}", peer, e);
            return;
        }
        Err(_) => {
            debug!("{} sent nothing within {:?}, closing", peer, classify_timeout);
            return;
        }
    };
    buf.truncate(n);
    let stream = PeekedStream::new(stream, Bytes::from(buf));

    let protocol = match stream.first_byte().and_then(classify) {
        Some(protocol) => protocol,
        None => {
            debug!(
                "Unrecognized leading bytes {:02x?} from {}, closing",
                &stream.peeked()[..stream.peeked().len().min(4)],
                peer
            );
            return;
        }
    };

    debug!("Routing {} to {} endpoint", peer, protocol);
    let routed = (stream, peer);
    let sent = match protocol {
        Protocol::Socks5 => socks_tx.send(routed).await.is_ok(),
        Protocol::Http => http_tx.send(routed).await.is_ok(),
    };
    if !sent {
        debug!("{} endpoint closed, dropping {}", protocol, peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

    struct MockListener {
        rx: mpsc::Receiver<io::Result<DuplexStream>>,
    }

    #[async_trait]
    impl Accept for MockListener {
        type Stream = DuplexStream;

        async fn accept(&mut self) -> io::Result<(DuplexStream, SocketAddr)> {
            match self.rx.recv().await {
                Some(Ok(stream)) => Ok((stream, "127.0.0.1:40000".parse().unwrap())),
                Some(Err(e)) => Err(e),
                None => Err(io::Error::new(io::ErrorKind::NotConnected, "closed")),
            }
        }
    }

    struct Harness {
        conns: mpsc::Sender<io::Result<DuplexStream>>,
        socks: MuxListener<DuplexStream>,
        http: MuxListener<DuplexStream>,
        shutdown_tx: broadcast::Sender<bool>,
        handle: JoinHandle<()>,
    }

    fn start(classify_timeout: Duration) -> Harness {
        let (conns, rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let mux = Multiplexer::new(MockListener { rx }, classify_timeout);
        let (socks, http, handle) = mux.split(shutdown_rx);
        Harness {
            conns,
            socks,
            http,
            shutdown_tx,
            handle,
        }
    }

    impl Harness {
        async fn connect(&self) -> DuplexStream {
            let (client, server) = duplex(4096);
            self.conns.send(Ok(server)).await.unwrap();
            client
        }
    }

    async fn assert_nothing_routed(listener: &mut MuxListener<DuplexStream>) {
        let result = tokio::time::timeout(Duration::from_millis(100), listener.accept()).await;
        assert!(result.is_err(), "no connection should be routed");
    }

    #[tokio::test]
    async fn test_socks5_routed_with_first_bytes_intact() {
        let mut h = start(Duration::from_secs(5));
        let mut client = h.connect().await;
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();

        let (mut stream, _) = h.socks.accept().await.unwrap();
        let mut buf = [0u8; 3];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x05, 0x01, 0x00]);

        assert_nothing_routed(&mut h.http).await;
    }

    #[tokio::test]
    async fn test_http_routed_with_request_line_intact() {
        let mut h = start(Duration::from_secs(5));
        let mut client = h.connect().await;
        client
            .write_all(b"CONNECT example.com:443 HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        let (mut stream, _) = h.http.accept().await.unwrap();
        let mut buf = [0u8; 7];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"CONNECT");

        assert_nothing_routed(&mut h.socks).await;
    }

    #[tokio::test]
    async fn test_peeked_stream_writes_reach_client() {
        let mut h = start(Duration::from_secs(5));
        let mut client = h.connect().await;
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();

        let (mut stream, _) = h.socks.accept().await.unwrap();
        stream.write_all(&[0x05, 0x00]).await.unwrap();

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00]);
    }

    #[tokio::test]
    async fn test_unknown_first_byte_closed() {
        let mut h = start(Duration::from_secs(5));
        let mut client = h.connect().await;
        client.write_all(&[0x16, 0x03, 0x01]).await.unwrap();

        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(Duration::from_secs(1), client.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);

        assert_nothing_routed(&mut h.socks).await;
        assert_nothing_routed(&mut h.http).await;
    }

    #[tokio::test]
    async fn test_silent_client_closed_after_timeout() {
        let mut h = start(Duration::from_millis(100));
        let mut client = h.connect().await;

        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);

        assert_nothing_routed(&mut h.socks).await;
        assert_nothing_routed(&mut h.http).await;
    }

    #[tokio::test]
    async fn test_silent_client_does_not_block_others() {
        let mut h = start(Duration::from_secs(5));
        let _silent = h.connect().await;

        let mut client = h.connect().await;
        client.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();

        let routed = tokio::time::timeout(Duration::from_secs(1), h.http.accept()).await;
        assert!(routed.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_transient_accept_error_retried() {
        let mut h = start(Duration::from_secs(5));
        h.conns
            .send(Err(io::Error::new(io::ErrorKind::ConnectionAborted, "aborted")))
            .await
            .unwrap();

        let mut client = h.connect().await;
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();

        let routed = tokio::time::timeout(Duration::from_secs(1), h.socks.accept()).await;
        assert!(routed.unwrap().is_ok());
        assert!(!h.handle.is_finished());
    }

    #[tokio::test]
    async fn test_fatal_accept_error_closes_endpoints() {
        let mut h = start(Duration::from_secs(5));
        h.conns
            .send(Err(io::Error::new(io::ErrorKind::NotConnected, "gone")))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), &mut h.handle)
            .await
            .unwrap()
            .unwrap();

        let err = h.socks.accept().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert!(h.http.accept().await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_closes_endpoints() {
        let mut h = start(Duration::from_secs(5));
        h.shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), &mut h.handle)
            .await
            .unwrap()
            .unwrap();

        assert!(h.socks.accept().await.is_err());
        assert!(h.http.accept().await.is_err());
    }

    #[test]
    fn test_fatal_error_kinds() {
        let fatal = io::Error::new(io::ErrorKind::NotConnected, "x");
        assert!(is_fatal_accept_error(&fatal));
        let transient = io::Error::new(io::ErrorKind::ConnectionReset, "x");
        assert!(!is_fatal_accept_error(&transient));
        let exhausted = io::Error::new(io::ErrorKind::Other, "too many open files");
        assert!(!is_fatal_accept_error(&exhausted));
    }

    #[tokio::test]
    async fn test_endpoint_protocols() {
        let h = start(Duration::from_secs(5));
        assert_eq!(h.socks.protocol(), Protocol::Socks5);
        assert_eq!(h.http.protocol(), Protocol::Http);
    }
}
