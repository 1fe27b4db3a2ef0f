//! Prometheus metrics for the ldapd server.
//!
//! This module provides:
//! - Metrics registry with counters, gauges, and histograms
//! - HTTP server to expose metrics at `/metrics` endpoint

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Request duration histogram buckets (in seconds).
const DURATION_BUCKETS: &[f64] = &[0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0];

/// Prometheus metrics for the ldapd server.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Total connections accepted.
    pub connections_total: Counter,
    /// Currently active connections.
    pub connections_active: Gauge,
    /// Total requests by operation.
    pub requests_total: CounterVec,
    /// Final results by result code name.
    pub results_total: CounterVec,
    /// Request duration histogram by operation.
    pub request_duration: HistogramVec,
    /// Search result entries sent.
    pub search_entries_total: Counter,
    /// Paged search cursors held across all connections.
    pub paged_cursors_active: Gauge,
    /// Bind attempts by method and outcome.
    pub binds_total: CounterVec,
}

impl Metrics {
    /// Creates a new Metrics instance with all metrics registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Connections
        let connections_total = Counter::with_opts(Opts::new(
            "ldapd_connections_total",
            "Total number of connections accepted",
        ))?;
        registry.register(Box::new(connections_total.clone()))?;

        let connections_active = Gauge::with_opts(Opts::new(
            "ldapd_connections_active",
            "Number of currently active connections",
        ))?;
        registry.register(Box::new(connections_active.clone()))?;

        // Requests
        let requests_total = CounterVec::new(
            Opts::new("ldapd_requests_total", "Total requests by operation"),
            &["operation"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let results_total = CounterVec::new(
            Opts::new("ldapd_results_total", "Total results by LDAP result code"),
            &["code"],
        )?;
        registry.register(Box::new(results_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "ldapd_request_duration_seconds",
                "Request duration in seconds by operation",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["operation"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        // Search
        let search_entries_total = Counter::with_opts(Opts::new(
            "ldapd_search_entries_total",
            "Total search result entries returned",
        ))?;
        registry.register(Box::new(search_entries_total.clone()))?;

        let paged_cursors_active = Gauge::with_opts(Opts::new(
            "ldapd_paged_cursors_active",
            "Number of suspended paged searches",
        ))?;
        registry.register(Box::new(paged_cursors_active.clone()))?;

        // Binds
        let binds_total = CounterVec::new(
            Opts::new("ldapd_binds_total", "Total bind attempts by method and outcome"),
            &["method", "outcome"],
        )?;
        registry.register(Box::new(binds_total.clone()))?;

        Ok(Self {
            registry,
            connections_total,
            connections_active,
            requests_total,
            results_total,
            request_duration,
            search_entries_total,
            paged_cursors_active,
            binds_total,
        })
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }

    /// Returns a reference to the registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Runs the HTTP metrics server.
///
/// The server listens on the given address and serves metrics at `/metrics`.
pub async fn run_metrics_server(
    addr: SocketAddr,
    metrics: Arc<Metrics>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let metrics = metrics.clone();
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                async move { handle_request(req, metrics).await }
                            });
                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                tracing::debug!("Metrics connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Metrics server accept error: {}", e);
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Metrics server shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn response(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Handles an HTTP request to the metrics server.
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    Ok(route(req.uri().path(), &metrics))
}

fn route(path: &str, metrics: &Metrics) -> Response<Full<Bytes>> {
    match path {
        "/metrics" => match metrics.encode() {
            Ok(body) => response(
                StatusCode::OK,
                "text/plain; version=0.0.4; charset=utf-8",
                body,
            ),
            Err(e) => {
                tracing::error!("Failed to encode metrics: {}", e);
                response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain",
                    "metrics unavailable",
                )
            }
        },
        "/health" | "/healthz" => response(StatusCode::OK, "text/plain", "OK"),
        "/" => response(
            StatusCode::OK,
            "text/html",
            r#"<!DOCTYPE html>
<html>
<head><title>ldapd Metrics</title></head>
<body>
<h1>ldapd Metrics</h1>
<p><a href="/metrics">Metrics</a></p>
</body>
</html>"#,
        ),
        _ => response(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();

        metrics.connections_total.inc();
        metrics.connections_active.inc();
        metrics.requests_total.with_label_values(&["search"]).inc();
        metrics
            .results_total
            .with_label_values(&["noSuchObject"])
            .inc();
        metrics
            .request_duration
            .with_label_values(&["search"])
            .observe(0.001);
        metrics
            .binds_total
            .with_label_values(&["simple", "success"])
            .inc();

        let encoded = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(encoded.contains("ldapd_connections_total"));
        assert!(encoded.contains("ldapd_connections_active"));
        assert!(encoded.contains("ldapd_requests_total"));
        assert!(encoded.contains("ldapd_results_total"));
        assert!(encoded.contains("ldapd_request_duration_seconds"));
        assert!(encoded.contains(r#"ldapd_binds_total{method="simple",outcome="success"} 1"#));
    }

    #[test]
    fn test_gauges() {
        let metrics = Metrics::new().unwrap();
        metrics.paged_cursors_active.set(3.0);
        metrics.search_entries_total.inc_by(42.0);

        let encoded = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(encoded.contains("ldapd_paged_cursors_active 3"));
        assert!(encoded.contains("ldapd_search_entries_total 42"));
    }

    #[test]
    fn test_routes() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(route("/metrics", &metrics).status(), StatusCode::OK);
        assert_eq!(route("/healthz", &metrics).status(), StatusCode::OK);
        assert_eq!(route("/", &metrics).status(), StatusCode::OK);
        assert_eq!(route("/nope", &metrics).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            route("/metrics", &metrics).headers()[CONTENT_TYPE],
            "text/plain; version=0.0.4; charset=utf-8"
        );
    }
}
