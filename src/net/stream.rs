//! Transport stream abstraction for plain TCP and TLS connections.
//!
//! `SessionStream` is a unified type over the two transport paths a session
//! can own. The session and its workers read and write through one contract
//! and never branch on whether encryption is in use; the variant is fixed at
//! construction, after any TLS handshake has already completed upstream.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

/// A session transport: plain TCP or TLS-encrypted.
///
/// The TLS variant is boxed to keep the enum close to `TcpStream` in size.
pub enum SessionStream {
    /// Plain TCP connection.
    Plain(TcpStream),
    /// TLS-encrypted connection (handshake already complete).
    Secure(Box<TlsStream<TcpStream>>),
}

impl SessionStream {
    /// Wrap an accepted plain TCP stream.
    pub fn plain(stream: TcpStream) -> Self {
        SessionStream::Plain(stream)
    }

    /// Wrap a stream whose TLS handshake has completed.
    pub fn secure(stream: TlsStream<TcpStream>) -> Self {
        SessionStream::Secure(Box::new(stream))
    }

    /// True when the transport is TLS-encrypted.
    pub fn is_encrypted(&self) -> bool {
        matches!(self, SessionStream::Secure(_))
    }

    /// Address of the remote peer, if the OS can still resolve it.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            SessionStream::Plain(stream) => stream.peer_addr(),
            SessionStream::Secure(tls) => tls.get_ref().0.peer_addr(),
        }
    }
}

impl std::fmt::Debug for SessionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            SessionStream::Plain(_) => "Plain",
            SessionStream::Secure(_) => "Secure",
        };
        f.debug_struct("SessionStream").field("variant", &variant).finish()
    }
}

impl AsyncRead for SessionStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SessionStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            SessionStream::Secure(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SessionStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            SessionStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            SessionStream::Secure(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SessionStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            SessionStream::Secure(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SessionStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            SessionStream::Secure(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn plain_variant_reports_unencrypted() {
        let (client, _server) = tcp_pair().await;
        let stream = SessionStream::plain(client);
        assert!(!stream.is_encrypted());
        assert!(stream.peer_addr().is_ok());
    }

    #[tokio::test]
    async fn plain_variant_round_trips_bytes() {
        let (client, server) = tcp_pair().await;
        let mut local = SessionStream::plain(client);
        let mut remote = SessionStream::plain(server);

        local.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }
}
