//! TCP server implementation.

use crate::error::ServerError;
use crate::handler::{ConnectionAction, RequestHandler};
use crate::metrics::Metrics;
use crate::session::Session;
use crate::stream::MaybeTlsStream;
use ldapd_protocol::extended::notice_of_disconnection;
use ldapd_protocol::{Decoder, Encoder, LdapMessage, ProtocolError, ResultCode, DEFAULT_PORT};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Idle connection timeout.
    pub idle_timeout: Duration,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// TLS acceptor (if TLS is enabled).
    pub tls_acceptor: Option<Arc<TlsAcceptor>>,
    /// Handshake at accept (LDAPS) instead of on StartTLS.
    pub implicit_tls: bool,
    /// Metrics instance (if metrics are enabled).
    pub metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_connections", &self.max_connections)
            .field("tls_enabled", &self.tls_acceptor.is_some())
            .field("implicit_tls", &self.implicit_tls)
            .field("metrics_enabled", &self.metrics.is_some())
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            idle_timeout: Duration::from_secs(300),
            max_connections: 1000,
            tls_acceptor: None,
            implicit_tls: false,
            metrics: None,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Sets the TLS acceptor. `implicit` selects LDAPS; otherwise TLS is
    /// offered through StartTLS.
    pub fn with_tls(mut self, acceptor: TlsAcceptor, implicit: bool) -> Self {
        self.tls_acceptor = Some(Arc::new(acceptor));
        self.implicit_tls = implicit;
        self
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns whether TLS is enabled.
    pub fn tls_enabled(&self) -> bool {
        self.tls_acceptor.is_some()
    }

    /// Returns whether metrics are enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics.is_some()
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// LDAP server.
pub struct Server {
    config: ServerConfig,
    handler: Arc<RequestHandler>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: ServerConfig, handler: RequestHandler) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let handler = match config.metrics {
            Some(ref metrics) if handler.metrics().is_none() => handler.with_metrics(metrics.clone()),
            _ => handler,
        };
        Self {
            config,
            handler: Arc::new(handler),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Binds the configured address and runs the server.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Runs the server on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        self.running.store(true, Ordering::SeqCst);

        let tls_mode = match (&self.config.tls_acceptor, self.config.implicit_tls) {
            (None, _) => "plain",
            (Some(_), true) => "LDAPS",
            (Some(_), false) => "StartTLS",
        };
        tracing::info!(
            "Server listening on {} ({})",
            listener.local_addr()?,
            tls_mode
        );

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((tcp_stream, addr)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.max_connections as u64
                            {
                                tracing::warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            // Update metrics if enabled
                            if let Some(ref metrics) = self.config.metrics {
                                metrics.connections_total.inc();
                                metrics.connections_active.inc();
                            }

                            let handler = self.handler.clone();
                            let stats = self.stats.clone();
                            let config = self.config.clone();
                            let mut conn_shutdown = self.shutdown.subscribe();

                            tokio::spawn(async move {
                                let result = match Self::accept_stream(tcp_stream, &config, addr).await {
                                    Ok(stream) => {
                                        Self::handle_connection(
                                            stream,
                                            addr,
                                            handler,
                                            &config,
                                            &stats,
                                            &mut conn_shutdown,
                                        )
                                        .await
                                    }
                                    Err(e) => Err(e),
                                };

                                match result {
                                    Ok(()) | Err(ServerError::ShuttingDown) => {}
                                    Err(e) => {
                                        tracing::warn!("[{}] Connection error: {}", addr, e);
                                        stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                    }
                                }

                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);

                                // Update metrics if enabled
                                if let Some(ref metrics) = config.metrics {
                                    metrics.connections_active.dec();
                                }

                                tracing::info!("Client disconnected: {}", addr);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Performs the TLS handshake on accept for LDAPS.
    async fn accept_stream(
        tcp_stream: TcpStream,
        config: &ServerConfig,
        addr: SocketAddr,
    ) -> Result<MaybeTlsStream, ServerError> {
        let stream = MaybeTlsStream::Plain { stream: tcp_stream };
        match (&config.tls_acceptor, config.implicit_tls) {
            (Some(acceptor), true) => {
                tracing::debug!("[{}] Performing TLS handshake", addr);
                let stream = stream.upgrade(acceptor).await?;
                tracing::debug!("[{}] TLS handshake complete", addr);
                Ok(stream)
            }
            _ => Ok(stream),
        }
    }

    async fn write_messages<'a>(
        stream: &mut MaybeTlsStream,
        messages: impl IntoIterator<Item = &'a LdapMessage>,
    ) -> Result<(), ServerError> {
        let bytes = Encoder::encode_all(messages);
        if !bytes.is_empty() {
            stream.write_all(&bytes).await?;
            stream.flush().await?;
        }
        Ok(())
    }

    /// Handles a single connection until it closes.
    async fn handle_connection(
        stream: MaybeTlsStream,
        addr: SocketAddr,
        handler: Arc<RequestHandler>,
        config: &ServerConfig,
        stats: &ServerStats,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let tls_status = if stream.is_tls() { " (TLS)" } else { "" };
        tracing::info!("Client connected: {}{}", addr, tls_status);

        let mut session = Session::new(addr);
        if stream.is_tls() {
            session.set_tls_active(stream.client_identity());
        }

        let result = Self::connection_loop(stream, &mut session, &handler, config, stats, shutdown).await;

        let cursors = session.paged_search_count();
        if let (Some(metrics), true) = (&config.metrics, cursors > 0) {
            metrics.paged_cursors_active.sub(cursors as f64);
        }
        tracing::debug!(
            "[{}] Session {} ended after {} requests ({:?})",
            addr,
            session.id,
            session.request_count(),
            session.age()
        );
        result
    }

    async fn connection_loop(
        mut stream: MaybeTlsStream,
        session: &mut Session,
        handler: &RequestHandler,
        config: &ServerConfig,
        stats: &ServerStats,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = session.remote_addr;
        let mut decoder = Decoder::new();
        let mut buf = [0u8; 8192];

        loop {
            tokio::select! {
                // Handle incoming data from client
                result = stream.read(&mut buf) => {
                    match result {
                        Ok(0) => {
                            tracing::debug!("[{}] Connection closed by client", addr);
                            return Ok(());
                        }
                        Ok(n) => {
                            tracing::trace!("[{}] Received {} bytes", addr, n);
                            decoder.extend(&buf[..n]);
                        }
                        Err(e) => {
                            tracing::debug!("[{}] Read error: {}", addr, e);
                            return Err(ServerError::Io(e));
                        }
                    }
                }

                // Handle idle timeout
                _ = tokio::time::sleep(config.idle_timeout) => {
                    if session.idle_duration() > config.idle_timeout {
                        tracing::debug!("[{}] Idle timeout", addr);
                        return Ok(());
                    }
                }

                // Handle shutdown signal
                _ = shutdown.recv() => {
                    tracing::debug!("[{}] Shutdown signal received", addr);
                    let notice = notice_of_disconnection(ResultCode::Unavailable, "server shutting down");
                    // The peer may already be gone
                    let _ = Self::write_messages(&mut stream, [&notice]).await;
                    return Err(ServerError::ShuttingDown);
                }
            }

            // Process any complete requests
            loop {
                let message = match decoder.decode_message() {
                    Ok(Some(message)) => message,
                    Ok(None) => break,
                    Err(ProtocolError::InvalidMessage {
                        message_id,
                        op_tag,
                        reason,
                    }) => {
                        tracing::warn!(
                            "[{}] Dropping invalid message (id {:?}): {}",
                            addr,
                            message_id,
                            reason
                        );
                        stats.errors_total.fetch_add(1, Ordering::Relaxed);
                        if let Some(response) =
                            handler.invalid_message_response(message_id, op_tag, &reason)
                        {
                            Self::write_messages(&mut stream, [&response]).await?;
                        }
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("[{}] Undecodable stream, disconnecting: {}", addr, e);
                        let notice = notice_of_disconnection(ResultCode::ProtocolError, e.to_string());
                        Self::write_messages(&mut stream, [&notice]).await?;
                        return Err(e.into());
                    }
                };

                stats.requests_total.fetch_add(1, Ordering::Relaxed);
                let outcome = handler.handle(session, message);
                Self::write_messages(&mut stream, &outcome.responses).await?;

                match outcome.action {
                    ConnectionAction::Continue => {}
                    ConnectionAction::Close => {
                        tracing::debug!("[{}] Session closing", addr);
                        return Ok(());
                    }
                    ConnectionAction::StartTls => {
                        let acceptor = config.tls_acceptor.clone().ok_or_else(|| {
                            ServerError::TlsConfig("StartTLS without a TLS acceptor".to_string())
                        })?;
                        if decoder.buffered() > 0 {
                            tracing::warn!(
                                "[{}] Discarding {} bytes sent before the TLS handshake",
                                addr,
                                decoder.buffered()
                            );
                            decoder.clear();
                        }
                        // A failed handshake leaves the stream unusable
                        stream = stream.upgrade(&acceptor).await?;
                        session.set_tls_active(stream.client_identity());
                        tracing::info!("[{}] StartTLS complete", addr);
                        break;
                    }
                }
            }
        }
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}
