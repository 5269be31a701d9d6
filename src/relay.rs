//! Bidirectional relay shared by both engines
//!
//! Once a tunnel is established the client and target streams are paired and
//! bytes are copied in both directions. End-of-stream on one side is passed
//! on as a write shutdown to the other while the opposite direction keeps
//! flowing, so a client that half-closes still receives the target's reply.
//! The session ends when both directions have reached end-of-stream, at the
//! first I/O error in either direction, or when the remaining direction stays
//! idle for too long after the first end-of-stream.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

/// Copy buffer per direction
const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Inactivity allowed on the open direction once the other one has ended
const HALF_CLOSE_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Bytes moved by a finished relay session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes copied from the client to the target
    pub client_to_target: u64,
    /// Bytes copied from the target to the client
    pub target_to_client: u64,
}

/// Relay data bidirectionally between client and target.
///
/// Both streams are dropped, and therefore closed, when this returns. Callers
/// treat an error as the normal end of a broken session.
pub async fn relay_tcp<C, T>(client: C, target: T) -> io::Result<RelayStats>
where
    C: AsyncRead + AsyncWrite + Unpin,
    T: AsyncRead + AsyncWrite + Unpin,
{
    relay_with_idle_timeout(client, target, HALF_CLOSE_IDLE_TIMEOUT).await
}

async fn relay_with_idle_timeout<C, T>(
    client: C,
    target: T,
    idle_timeout: Duration,
) -> io::Result<RelayStats>
where
    C: AsyncRead + AsyncWrite + Unpin,
    T: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut target_read, mut target_write) = tokio::io::split(target);
    let (half_closed_tx, half_closed_rx) = watch::channel(false);

    let client_to_target = pipe(
        &mut client_read,
        &mut target_write,
        &half_closed_tx,
        half_closed_rx.clone(),
        idle_timeout,
    );
    let target_to_client = pipe(
        &mut target_read,
        &mut client_write,
        &half_closed_tx,
        half_closed_rx,
        idle_timeout,
    );

    // The first error drops the other direction
    let (client_to_target, target_to_client) =
        tokio::try_join!(client_to_target, target_to_client)?;

    Ok(RelayStats {
        client_to_target,
        target_to_client,
    })
}

/// Copy one direction until EOF, then shut down the writer
async fn pipe<R, W>(
    reader: &mut R,
    writer: &mut W,
    half_closed_tx: &watch::Sender<bool>,
    mut half_closed_rx: watch::Receiver<bool>,
    idle_timeout: Duration,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = tokio::select! {
            result = reader.read(&mut buf) => result?,
            _ = idle_after_half_close(&mut half_closed_rx, idle_timeout) => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "relay idle after half-close",
                ));
            }
        };
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        total += n as u64;
    }

    writer.shutdown().await?;
    half_closed_tx.send_replace(true);

    Ok(total)
}

/// Resolves once the peer direction has ended and `idle_timeout` has passed
async fn idle_after_half_close(rx: &mut watch::Receiver<bool>, idle_timeout: Duration) {
    if rx.wait_for(|closed| *closed).await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(idle_timeout).await;
}
