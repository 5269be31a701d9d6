//! Protocol multiplexing on the shared port

mod common;

use common::socks5_mock::*;
use common::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn test_socks5_and_http_share_one_port() {
    let echo = spawn_echo_server().await;
    let proxy = spawn_proxy(TestConfigBuilder::new().build()).await;

    let mut socks = proxy.connect().await;
    async_socks5::connect(&mut socks, echo, None).await.unwrap();

    let mut http = proxy.connect().await;
    async_http_proxy::http_connect_tokio(&mut http, "127.0.0.1", echo.port())
        .await
        .unwrap();

    socks.write_all(b"via socks").await.unwrap();
    http.write_all(b"via http!").await.unwrap();

    let mut buf = [0u8; 9];
    socks.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"via socks");
    http.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"via http!");

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_first_byte_is_closed() {
    let proxy = spawn_proxy(TestConfigBuilder::new().build()).await;

    for first in [0x04u8, 0x16, b'1', b' '] {
        let mut stream = proxy.connect().await;
        stream.write_all(&[first, 0x01, 0x00]).await.unwrap();
        assert_closed(&mut stream, 2).await;
    }
}

#[tokio::test]
async fn test_silent_client_closed_after_classify_timeout() {
    let proxy = spawn_proxy(TestConfigBuilder::new().classify_timeout(1).build()).await;

    let mut silent = proxy.connect().await;

    // Another client is served while the silent one waits
    let mut active = proxy.connect().await;
    active.write_all(&create_auth_request_no_auth()).await.unwrap();
    let mut reply = [0u8; 2];
    active.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x00]);

    assert_closed(&mut silent, 3).await;
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let proxy = spawn_proxy(TestConfigBuilder::new().build()).await;
    let addr = proxy.addr;

    proxy.shutdown().await.unwrap();

    match tokio::net::TcpStream::connect(addr).await {
        Err(_) => {}
        Ok(mut stream) => assert_closed(&mut stream, 2).await,
    }
}
