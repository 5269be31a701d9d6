//! Stream wrapper replaying peeked bytes
//!
//! Classification reads the first bytes of a connection into a buffer. The
//! wrapper hands those bytes back to the first reads of whichever engine takes
//! the connection, then passes through to the socket.

use bytes::{Buf, Bytes};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

/// A connection whose already-read prefix is replayed before fresh reads
#[derive(Debug)]
pub struct PeekedStream<S = TcpStream> {
    inner: S,
    prefix: Bytes,
}

impl<S> PeekedStream<S> {
    /// Wrap `inner`, replaying `prefix` first
    pub fn new(inner: S, prefix: Bytes) -> Self {
        Self { inner, prefix }
    }

    /// Bytes not yet handed to a reader
    pub fn peeked(&self) -> &[u8] {
        &self.prefix
    }

    /// First byte of the connection, if still buffered
    pub fn first_byte(&self) -> Option<u8> {
        self.prefix.first().copied()
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PeekedStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.prefix.has_remaining() {
            let to_copy = self.prefix.len().min(buf.remaining());
            buf.put_slice(&self.prefix[..to_copy]);
            self.prefix.advance(to_copy);
            return Poll::Ready(Ok(()));
        }

        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PeekedStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, data)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}
