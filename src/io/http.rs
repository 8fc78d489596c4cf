//! Operator HTTP API
//!
//! Exposes the scan workflow, sessions, history, the rate editor and
//! Prometheus metrics. Uses hyper for the HTTP server.

use crate::domain::types::CapturedImage;
use crate::io::prometheus::format_prometheus_metrics;
use crate::services::rate::RateError;
use crate::services::scanner::{ScanError, ScanPipeline};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Everything a request handler needs
pub struct ApiContext {
    pub pipeline: Arc<ScanPipeline>,
    pub site_id: String,
    pub currency: String,
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body.to_string())))
        .expect("static response should not fail")
}

fn error_response(status: StatusCode, error: &str) -> Response<Full<Bytes>> {
    json_response(status, &json!({ "ok": false, "error": error }))
}

fn rate_json(ctx: &ApiContext) -> serde_json::Value {
    let state = ctx.pipeline.state().lock();
    json!({
        "hourly_rate": state.rate().hourly_rate(),
        "editing": state.rate().is_editing(),
        "currency": ctx.currency,
    })
}

fn sessions_json(ctx: &ApiContext) -> serde_json::Value {
    let state = ctx.pipeline.state().lock();
    let sessions: Vec<_> = state
        .registry()
        .sessions()
        .into_iter()
        .map(|s| {
            json!({
                "plate": s.plate,
                "entry_time": s.entry_time,
                "entry_label": s.entry_label(),
            })
        })
        .collect();
    json!({ "count": sessions.len(), "sessions": sessions })
}

fn history_json(ctx: &ApiContext) -> serde_json::Value {
    let state = ctx.pipeline.state().lock();
    let records: Vec<_> = state
        .ledger()
        .all()
        .map(|r| {
            let mut value = json!(r);
            value["entry_label"] = json!(r.entry_label());
            value["exit_label"] = json!(r.exit_label());
            value["duration_label"] = json!(r.duration_label());
            value["cost_label"] = json!(r.cost_label(&ctx.currency));
            value
        })
        .collect();
    json!({ "count": records.len(), "records": records })
}

async fn read_body(req: Request<hyper::body::Incoming>) -> Option<Bytes> {
    match req.into_body().collect().await {
        Ok(collected) => Some(collected.to_bytes()),
        Err(e) => {
            warn!(error = %e, "api_body_read_failed");
            None
        }
    }
}

async fn handle_scan(req: Request<hyper::body::Incoming>, ctx: &ApiContext) -> Response<Full<Bytes>> {
    let Some(body) = read_body(req).await else {
        return error_response(StatusCode::BAD_REQUEST, "unreadable_body");
    };
    if body.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "empty_image");
    }

    match ctx.pipeline.scan(CapturedImage::new(body)).await {
        Ok(report) => json_response(StatusCode::OK, &json!(report)),
        Err(ScanError::Busy) => error_response(StatusCode::CONFLICT, "scan_in_progress"),
    }
}

async fn handle_rate_input(
    req: Request<hyper::body::Incoming>,
    ctx: &ApiContext,
) -> Response<Full<Bytes>> {
    let Some(body) = read_body(req).await else {
        return error_response(StatusCode::BAD_REQUEST, "unreadable_body");
    };
    let input = String::from_utf8_lossy(&body);

    let result = ctx.pipeline.state().lock().rate_mut().apply_input(&input);
    match result {
        Ok(_) => json_response(StatusCode::OK, &rate_json(ctx)),
        Err(RateError::NotEditing) => error_response(StatusCode::CONFLICT, "rate_not_editing"),
        Err(RateError::InvalidInput(_)) => {
            error_response(StatusCode::BAD_REQUEST, "invalid_rate_input")
        }
    }
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    ctx: Arc<ApiContext>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health") => Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail"),
        (&Method::GET, "/metrics") => {
            let body = {
                let state = ctx.pipeline.state().lock();
                format_prometheus_metrics(ctx.pipeline.metrics(), &state, &ctx.site_id)
            };
            Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail")
        }
        (&Method::GET, "/status") => json_response(
            StatusCode::OK,
            &json!({
                "status": ctx.pipeline.status(),
                "plate": ctx.pipeline.last_plate(),
            }),
        ),
        (&Method::GET, "/sessions") => json_response(StatusCode::OK, &sessions_json(&ctx)),
        (&Method::GET, "/history") => json_response(StatusCode::OK, &history_json(&ctx)),
        (&Method::GET, "/rate") => json_response(StatusCode::OK, &rate_json(&ctx)),
        (&Method::POST, "/rate/edit") => {
            ctx.pipeline.state().lock().rate_mut().begin_edit();
            json_response(StatusCode::OK, &rate_json(&ctx))
        }
        (&Method::PUT, "/rate") => handle_rate_input(req, &ctx).await,
        (&Method::POST, "/rate/commit") => {
            ctx.pipeline.state().lock().rate_mut().commit();
            json_response(StatusCode::OK, &rate_json(&ctx))
        }
        (&Method::POST, "/scan") => handle_scan(req, &ctx).await,
        (&Method::OPTIONS, _) => Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "GET, POST, PUT, OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type")
            .body(Full::new(Bytes::from("")))
            .expect("static response should not fail"),
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail"),
    };

    info!(method = %method, path = %path, status = %response.status().as_u16(), "api_request");
    Ok(response)
}

/// Start the operator API server
pub async fn start_api_server(
    bind_address: &str,
    port: u16,
    ctx: Arc<ApiContext>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: SocketAddr = format!("{bind_address}:{port}").parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!(addr = %addr, site = %ctx.site_id, "api_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let ctx = ctx.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let ctx = ctx.clone();
                                async move { handle_request(req, ctx).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "api_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "api_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("api_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{clock_label, PlateId, Recognition};
    use crate::infra::metrics::Metrics;
    use crate::io::ocr::{PlateRecognizer, RecognitionError};
    use crate::services::state::ParkingState;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};

    struct FixedRecognizer;

    #[async_trait]
    impl PlateRecognizer for FixedRecognizer {
        async fn recognize(
            &self,
            _image: &CapturedImage,
            _language: &str,
        ) -> Result<Recognition, RecognitionError> {
            Ok(Recognition { text: "AB12".into(), confidence: 90.0 })
        }
    }

    fn context() -> ApiContext {
        let state = Arc::new(parking_lot::Mutex::new(ParkingState::new(10.0)));
        let pipeline =
            ScanPipeline::new(Arc::new(FixedRecognizer), state, Arc::new(Metrics::new()), "eng");
        ApiContext { pipeline: Arc::new(pipeline), site_id: "lot-a".into(), currency: "$".into() }
    }

    #[test]
    fn test_rate_json() {
        let ctx = context();
        let value = rate_json(&ctx);
        assert_eq!(value["hourly_rate"], 10.0);
        assert_eq!(value["editing"], false);
        assert_eq!(value["currency"], "$");
    }

    #[test]
    fn test_sessions_and_history_json() {
        let ctx = context();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 6, 8, 0, 0).unwrap();
        {
            let mut state = ctx.pipeline.state().lock();
            state.apply(PlateId::new("AB12"), t0);
            state.apply(PlateId::new("CD34"), t0);
            state.apply(PlateId::new("AB12"), t0 + Duration::minutes(61));
        }

        let sessions = sessions_json(&ctx);
        assert_eq!(sessions["count"], 1);
        assert_eq!(sessions["sessions"][0]["plate"], "CD34");

        let history = history_json(&ctx);
        assert_eq!(history["count"], 1);
        assert_eq!(history["records"][0]["plate"], "AB12");
        assert_eq!(history["records"][0]["status"], "Exited");
        assert_eq!(history["records"][0]["duration_label"], "2h");
        assert_eq!(history["records"][0]["cost_label"], "$20");
        assert_eq!(history["records"][0]["entry_label"], clock_label(t0));
        assert_eq!(history["records"][0]["exit_label"], clock_label(t0 + Duration::minutes(61)));
    }

    #[test]
    fn test_error_response_shape() {
        let response = error_response(StatusCode::CONFLICT, "scan_in_progress");
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(response.headers()["Access-Control-Allow-Origin"], "*");
    }
}
