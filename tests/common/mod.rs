//! Test utilities shared by the integration tests
//!
//! Spawns the proxy on an ephemeral port together with the targets it is
//! pointed at: an echo server and a minimal HTTP origin.

#![allow(dead_code)]

use base64::{engine::general_purpose, Engine as _};
use mixproxy::config::Config;
use mixproxy::serve_listener;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Proxy configuration builder
#[derive(Default)]
pub struct TestConfigBuilder {
    username: Option<String>,
    password: Option<String>,
    allowed_dest_fqdn: Option<String>,
    classify_timeout: Option<u64>,
}

impl TestConfigBuilder {
    /// Create a new test config builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Require these credentials
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    /// Restrict destinations to a glob pattern
    pub fn allowed_dest_fqdn(mut self, pattern: &str) -> Self {
        self.allowed_dest_fqdn = Some(pattern.to_string());
        self
    }

    /// Set the classification timeout in seconds
    pub fn classify_timeout(mut self, secs: u64) -> Self {
        self.classify_timeout = Some(secs);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        let mut config = Config::default();
        config.server.listen_addr = "127.0.0.1".to_string();
        config.server.connect_timeout = 2;
        if let Some(secs) = self.classify_timeout {
            config.server.classify_timeout = secs;
        }
        config.auth.username = self.username;
        config.auth.password = self.password;
        config.filter.allowed_dest_fqdn = self.allowed_dest_fqdn;
        config
    }
}

/// A proxy serving on an ephemeral loopback port
pub struct TestProxy {
    pub addr: SocketAddr,
    shutdown_tx: broadcast::Sender<bool>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestProxy {
    /// Open a client connection to the proxy
    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }

    /// Signal shutdown and wait for the server to stop
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop")
            .unwrap()
    }
}

/// Start the proxy with the given configuration
pub async fn spawn_proxy(config: Config) -> TestProxy {
    let (listener, addr) = create_test_listener().await;
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let handle = tokio::spawn(async move { serve_listener(listener, &config, shutdown_rx).await });

    TestProxy {
        addr,
        shutdown_tx,
        handle,
    }
}

/// Echo server accepting any number of connections
pub async fn spawn_echo_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    addr
}

/// Listener that reports each accepted connection
pub async fn spawn_counting_target() -> (SocketAddr, mpsc::UnboundedReceiver<SocketAddr>) {
    let (listener, addr) = create_test_listener().await;
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((_socket, peer)) = listener.accept().await {
            let _ = tx.send(peer);
        }
    });

    (addr, rx)
}

/// HTTP origin answering every request with `response`, reporting request heads
pub async fn spawn_http_origin(
    response: &'static str,
) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let (listener, addr) = create_test_listener().await;
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let _ = tx.send(head);
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });

    (addr, rx)
}

/// Read bytes up to and including the blank line ending an HTTP head
pub async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        match stream.read_u8().await {
            Ok(byte) => head.push(byte),
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Read one HTTP response framed by `Content-Length` (absent means empty)
pub async fn read_response(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let head = read_head(stream).await;
    let length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).await.unwrap();
    (head, body)
}

/// `Proxy-Authorization` value for the given credentials
pub fn basic_auth(username: &str, password: &str) -> String {
    let encoded = general_purpose::STANDARD.encode(format!("{}:{}", username, password));
    format!("Basic {}", encoded)
}

/// Assert that a peer closes the connection within `secs` seconds
pub async fn assert_closed(stream: &mut TcpStream, secs: u64) {
    let mut buf = [0u8; 64];
    let result = tokio::time::timeout(Duration::from_secs(secs), stream.read(&mut buf))
        .await
        .expect("connection was not closed in time");
    match result {
        Ok(n) => assert_eq!(n, 0, "expected EOF"),
        Err(e) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset),
    }
}

/// Raw SOCKS5 client messages
pub mod socks5_mock {
    use mixproxy::socks::*;

    /// Create a no-auth method selection request
    pub fn create_auth_request_no_auth() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE]
    }

    /// Create a password auth method selection request
    pub fn create_auth_request_password() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_PASSWORD]
    }

    /// Create an RFC 1929 username/password request
    pub fn create_password_request(username: &str, password: &str) -> Vec<u8> {
        let mut request = vec![SOCKS5_AUTH_VERSION, username.len() as u8];
        request.extend_from_slice(username.as_bytes());
        request.push(password.len() as u8);
        request.extend_from_slice(password.as_bytes());
        request
    }

    /// Create a command to an IPv4 address
    pub fn create_command_ipv4(command: u8, ip: [u8; 4], port: u16) -> Vec<u8> {
        let mut cmd = vec![SOCKS5_VERSION, command, SOCKS5_RESERVED, SOCKS5_ADDR_TYPE_IPV4];
        cmd.extend_from_slice(&ip);
        cmd.extend_from_slice(&port.to_be_bytes());
        cmd
    }

    /// Create a connect command to domain
    pub fn create_connect_domain(domain: &str, port: u16) -> Vec<u8> {
        let mut cmd = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_DOMAIN,
            domain.len() as u8,
        ];
        cmd.extend_from_slice(domain.as_bytes());
        cmd.extend_from_slice(&port.to_be_bytes());
        cmd
    }
}
