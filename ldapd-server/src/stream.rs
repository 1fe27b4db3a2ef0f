//! Stream abstraction for TLS and plain TCP.

use crate::error::ServerError;
use pin_project_lite::pin_project;
use sha2::{Digest, Sha256};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream as ServerTlsStream;
use tokio_rustls::TlsAcceptor;

pin_project! {
    /// A stream that can be either plain TCP or TLS.
    #[project = MaybeStreamProj]
    pub enum MaybeTlsStream {
        Plain { #[pin] stream: TcpStream },
        Tls { #[pin] stream: ServerTlsStream<TcpStream> },
    }
}

impl MaybeTlsStream {
    /// Returns whether this stream is TLS-encrypted.
    pub fn is_tls(&self) -> bool {
        matches!(self, MaybeTlsStream::Tls { .. })
    }

    /// Runs the server side of a TLS handshake over a plain stream.
    pub async fn upgrade(self, acceptor: &TlsAcceptor) -> Result<Self, ServerError> {
        match self {
            MaybeTlsStream::Plain { stream } => acceptor
                .accept(stream)
                .await
                .map(|stream| MaybeTlsStream::Tls { stream })
                .map_err(|e| ServerError::TlsHandshake(e.to_string())),
            MaybeTlsStream::Tls { .. } => Err(ServerError::TlsHandshake(
                "stream is already TLS protected".to_string(),
            )),
        }
    }

    /// Identity of the verified client certificate: `cert:` followed by the
    /// SHA-256 fingerprint of its DER encoding.
    pub fn client_identity(&self) -> Option<String> {
        let MaybeTlsStream::Tls { stream } = self else {
            return None;
        };
        let (_, connection) = stream.get_ref();
        let certificate = connection.peer_certificates()?.first()?;
        Some(format!(
            "cert:{}",
            hex::encode(Sha256::digest(certificate.as_ref()))
        ))
    }
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            MaybeStreamProj::Plain { stream } => stream.poll_read(cx, buf),
            MaybeStreamProj::Tls { stream } => stream.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            MaybeStreamProj::Plain { stream } => stream.poll_write(cx, buf),
            MaybeStreamProj::Tls { stream } => stream.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            MaybeStreamProj::Plain { stream } => stream.poll_flush(cx),
            MaybeStreamProj::Tls { stream } => stream.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            MaybeStreamProj::Plain { stream } => stream.poll_shutdown(cx),
            MaybeStreamProj::Tls { stream } => stream.poll_shutdown(cx),
        }
    }
}
