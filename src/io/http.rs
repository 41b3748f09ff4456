//! HTTP control/query surface
//!
//! - GET /api/status - full store snapshot plus ingestion link status
//! - POST /api/override - apply an operator override
//! - GET /metrics - Prometheus text format
//! - GET /health - liveness
//!
//! Uses hyper for the HTTP server.

use crate::domain::types::{LinkStatus, UNKNOWN_INTERSECTION};
use crate::infra::metrics::{Metrics, MetricsSummary};
use crate::services::store::AggregationStore;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Largest accepted POST /api/override body
const MAX_OVERRIDE_BODY: usize = 16 * 1024;

/// Shared state for request handlers
pub struct HttpState {
    pub store: Arc<AggregationStore>,
    pub metrics: Arc<Metrics>,
    /// Ingestion link status; `None` when ingestion never started
    pub link: Option<watch::Receiver<LinkStatus>>,
    pub default_issuer: String,
}

impl HttpState {
    fn link_status(&self) -> LinkStatus {
        self.link.as_ref().map(|rx| *rx.borrow()).unwrap_or(LinkStatus::Disconnected)
    }
}

/// Body of POST /api/override
#[derive(Debug, Deserialize)]
struct OverrideRequest {
    #[serde(default)]
    intersection: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    issued_by: Option<String>,
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .expect("static response should not fail")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn status_body(state: &HttpState) -> String {
    let snapshot = state.store.snapshot();
    state.metrics.record_snapshot_served();
    json!({
        "status": "ok",
        "link": state.link_status().as_str(),
        "store": snapshot,
    })
    .to_string()
}

fn apply_override(state: &HttpState, body: &[u8]) -> Response<Full<Bytes>> {
    let request: OverrideRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "override_request_invalid");
            let body = json!({ "result": "error", "error": "invalid_json" }).to_string();
            return json_response(StatusCode::BAD_REQUEST, body);
        }
    };

    let intersection =
        non_empty(request.intersection).unwrap_or_else(|| UNKNOWN_INTERSECTION.to_string());
    let action = non_empty(request.action).unwrap_or_else(|| "none".to_string());
    let issued_by = non_empty(request.issued_by).unwrap_or_else(|| state.default_issuer.clone());

    let ovr = state.store.apply_override(&intersection, &action, &issued_by, request.notes);
    state.metrics.record_override_applied();
    info!(
        intersection = %ovr.intersection_id,
        action = %ovr.action,
        issued_by = %ovr.issued_by,
        "override_applied"
    );

    let body = json!({
        "result": "ok",
        "intersection": ovr.intersection_id,
        "action": ovr.action,
    })
    .to_string();
    json_response(StatusCode::OK, body)
}

/// Write a simple counter metric
fn write_counter(output: &mut String, name: &str, help: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} counter");
    let _ = writeln!(output, "{name} {val}");
}

fn write_gauge(output: &mut String, name: &str, help: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} gauge");
    let _ = writeln!(output, "{name} {val}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(
    summary: &MetricsSummary,
    intersections: usize,
    link: LinkStatus,
) -> String {
    let mut output = String::with_capacity(1024);
    write_counter(
        &mut output,
        "junction_messages_received_total",
        "Inbound channel messages",
        summary.messages_received,
    );
    write_counter(
        &mut output,
        "junction_readings_applied_total",
        "Readings applied to the store",
        summary.readings_applied,
    );
    write_counter(
        &mut output,
        "junction_decode_errors_total",
        "Messages dropped as undecodable",
        summary.decode_errors,
    );
    write_counter(
        &mut output,
        "junction_unknown_topics_total",
        "Messages filed under the unknown intersection",
        summary.unknown_topics,
    );
    write_counter(
        &mut output,
        "junction_overrides_applied_total",
        "Operator overrides applied",
        summary.overrides_applied,
    );
    write_counter(
        &mut output,
        "junction_snapshots_served_total",
        "Status snapshots served",
        summary.snapshots_served,
    );
    write_gauge(
        &mut output,
        "junction_intersections",
        "Intersections known to the store",
        intersections as u64,
    );
    write_gauge(
        &mut output,
        "junction_ingestion_connected",
        "1 when the ingestion link is connected",
        u64::from(link == LinkStatus::Connected),
    );
    output
}

/// Route one request
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<HttpState>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (&method, path.as_str()) {
        (&Method::GET, "/api/status") => Ok(json_response(StatusCode::OK, status_body(&state))),
        (&Method::POST, "/api/override") => {
            let body = match Limited::new(req.into_body(), MAX_OVERRIDE_BODY).collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                    warn!(limit = %MAX_OVERRIDE_BODY, "override_body_too_large");
                    let body =
                        json!({ "result": "error", "error": "body_too_large" }).to_string();
                    return Ok(json_response(StatusCode::PAYLOAD_TOO_LARGE, body));
                }
                Err(e) => {
                    warn!(error = %e, "override_body_read_failed");
                    let body =
                        json!({ "result": "error", "error": "body_read_failed" }).to_string();
                    return Ok(json_response(StatusCode::BAD_REQUEST, body));
                }
            };
            Ok(apply_override(&state, &body))
        }
        (&Method::GET, "/metrics") => {
            let output = format_prometheus_metrics(
                &state.metrics.summary(),
                state.store.len(),
                state.link_status(),
            );
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(output)))
                .expect("static response should not fail"))
        }
        (&Method::GET, "/health") => {
            Ok(json_response(StatusCode::OK, r#"{"ok":true}"#.to_string()))
        }
        // CORS preflight for the API
        (&Method::OPTIONS, p) if p.starts_with("/api/") => Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type")
            .body(Full::new(Bytes::from("")))
            .expect("static response should not fail")),
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

/// Start the HTTP server; runs until shutdown
pub async fn start_http_server(
    port: u16,
    state: Arc<HttpState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = %port, "http_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(req, state).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("http_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
