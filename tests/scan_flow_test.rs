//! End-to-end scan flow: frame file -> HTTP recognition engine -> sessions,
//! billing and the operator API

use bytes::Bytes;
use chrono::{Duration, TimeZone, Utc};
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_console::domain::types::PlateId;
use parking_console::infra::Metrics;
use parking_console::io::{
    start_api_server, ApiContext, FileFrameSource, FrameSource, HttpOcrEngine,
};
use parking_console::services::plate::FALLBACK_PLATE;
use parking_console::services::{ParkingState, ScanPipeline, ScanStatus, Transition};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{watch, Notify};

/// Canned engine replies: (status, body)
type Script = Arc<parking_lot::Mutex<VecDeque<(u16, String)>>>;

fn reply(text: &str, confidence: f64) -> (u16, String) {
    (200, serde_json::json!({ "text": text, "confidence": confidence }).to_string())
}

/// Start a mock recognition engine on an ephemeral port, returns its URL
async fn start_mock_engine(replies: Vec<(u16, String)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let script: Script = Arc::new(parking_lot::Mutex::new(replies.into()));

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let script = script.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let script = script.clone();
                    async move {
                        let body = req.into_body().collect().await.unwrap().to_bytes();
                        let request: serde_json::Value = serde_json::from_slice(&body).unwrap();
                        assert_eq!(request["language"], "eng");
                        assert!(!request["image"].as_str().unwrap().is_empty());

                        let (status, body) =
                            script.lock().pop_front().unwrap_or_else(|| (500, String::new()));
                        Ok::<_, Infallible>(
                            Response::builder()
                                .status(status)
                                .header("Content-Type", "application/json")
                                .body(Full::new(Bytes::from(body)))
                                .unwrap(),
                        )
                    }
                });
                let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await;
            });
        }
    });

    format!("http://{addr}/recognize")
}

fn create_pipeline(url: &str, hourly_rate: f64) -> ScanPipeline {
    let engine = HttpOcrEngine::new(url).unwrap();
    let state = Arc::new(parking_lot::Mutex::new(ParkingState::new(hourly_rate)));
    ScanPipeline::new(Arc::new(engine), state, Arc::new(Metrics::new()), "eng")
}

fn frame_source(dir: &tempfile::TempDir) -> FileFrameSource {
    let path = dir.path().join("latest.jpg");
    std::fs::write(&path, b"\xff\xd8\xff\xe0frame").unwrap();
    FileFrameSource::new(path)
}

#[tokio::test]
async fn test_entry_then_exit_through_http_engine() {
    let url = start_mock_engine(vec![
        reply("KA 01 AB 1234\n", 92.0),
        reply("ka01ab1234", 88.0),
    ])
    .await;
    let pipeline = create_pipeline(&url, 10.0);
    let dir = tempfile::tempdir().unwrap();
    let frames = frame_source(&dir);
    let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();

    let entry = pipeline.scan_at(frames.capture().unwrap(), t0).await.unwrap();
    assert_eq!(entry.plate.as_str(), "KA01AB1234");
    assert!(matches!(entry.transition, Transition::Entry { .. }));

    let exit = pipeline
        .scan_at(frames.capture().unwrap(), t0 + Duration::hours(2) + Duration::minutes(1))
        .await
        .unwrap();
    let Transition::Exit { record } = exit.transition else {
        panic!("expected exit");
    };
    assert_eq!(record.duration_hours(), 3);
    assert_eq!(record.cost(), 30.0);

    let state = pipeline.state().lock();
    assert!(!state.registry().is_parked(&PlateId::new("KA01AB1234")));
    assert_eq!(state.ledger().latest().map(|r| r.plate().as_str()), Some("KA01AB1234"));
}

#[tokio::test]
async fn test_engine_errors_resolve_to_fallback_plate() {
    let url = start_mock_engine(vec![(503, String::new()), (200, "not json".to_string())]).await;
    let pipeline = create_pipeline(&url, 10.0);
    let dir = tempfile::tempdir().unwrap();
    let frames = frame_source(&dir);

    let first = pipeline.scan(frames.capture().unwrap()).await.unwrap();
    let second = pipeline.scan(frames.capture().unwrap()).await.unwrap();

    assert_eq!(first.plate.as_str(), FALLBACK_PLATE);
    assert!(first.used_fallback);
    assert!(matches!(first.transition, Transition::Entry { .. }));
    assert_eq!(second.plate.as_str(), FALLBACK_PLATE);
    assert!(matches!(second.transition, Transition::Exit { .. }));
    assert_eq!(pipeline.status(), ScanStatus::Success);
    assert_eq!(pipeline.metrics().fallback_total(), 2);
}

#[tokio::test]
async fn test_rate_change_applies_to_open_session() {
    let url = start_mock_engine(vec![reply("MH12PQ9999", 90.0), reply("MH12PQ9999", 90.0)]).await;
    let pipeline = create_pipeline(&url, 10.0);
    let dir = tempfile::tempdir().unwrap();
    let frames = frame_source(&dir);
    let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();

    pipeline.scan_at(frames.capture().unwrap(), t0).await.unwrap();
    {
        let mut state = pipeline.state().lock();
        state.rate_mut().begin_edit();
        state.rate_mut().apply_input("20").unwrap();
        state.rate_mut().commit();
    }
    let exit = pipeline
        .scan_at(frames.capture().unwrap(), t0 + Duration::minutes(45))
        .await
        .unwrap();

    let Transition::Exit { record } = exit.transition else {
        panic!("expected exit");
    };
    assert_eq!(record.cost(), 20.0);
}

/// Reserve a free loopback port for the API server
fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Running operator API: base URL, shutdown sender and server task
struct TestApi {
    base: String,
    shutdown: watch::Sender<bool>,
    server: tokio::task::JoinHandle<Result<(), Box<dyn std::error::Error + Send + Sync>>>,
}

async fn start_api(ctx: Arc<ApiContext>, client: &reqwest::Client) -> TestApi {
    let port = free_port();
    let (shutdown, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(start_api_server("127.0.0.1", port, ctx, shutdown_rx));
    let base = format!("http://127.0.0.1:{port}");

    // server may still be binding
    let mut ready = false;
    for _ in 0..50 {
        if client.get(format!("{base}/health")).send().await.is_ok() {
            ready = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(ready);

    TestApi { base, shutdown, server }
}

impl TestApi {
    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        self.server.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_operator_api_scan_and_rate() {
    let url = start_mock_engine(vec![reply("DL8CNB5678", 95.0)]).await;
    let ctx = Arc::new(ApiContext {
        pipeline: Arc::new(create_pipeline(&url, 10.0)),
        site_id: "lot-test".to_string(),
        currency: "$".to_string(),
    });
    let client = reqwest::Client::new();
    let api = start_api(ctx.clone(), &client).await;
    let base = api.base.clone();

    let response = client.post(format!("{base}/scan")).body("jpeg").send().await.unwrap();
    assert_eq!(response.status().as_u16(), StatusCode::OK.as_u16());
    let report: serde_json::Value = response.json().await.unwrap();
    assert_eq!(report["plate"], "DL8CNB5678");
    assert_eq!(report["transition"]["kind"], "entry");

    let empty = client.post(format!("{base}/scan")).send().await.unwrap();
    assert_eq!(empty.status().as_u16(), 400);

    let sessions: serde_json::Value =
        client.get(format!("{base}/sessions")).send().await.unwrap().json().await.unwrap();
    assert_eq!(sessions["count"], 1);

    // rate input is refused outside edit mode
    let refused = client.put(format!("{base}/rate")).body("25").send().await.unwrap();
    assert_eq!(refused.status().as_u16(), 409);

    client.post(format!("{base}/rate/edit")).send().await.unwrap();
    let invalid = client.put(format!("{base}/rate")).body("abc").send().await.unwrap();
    assert_eq!(invalid.status().as_u16(), 400);
    let accepted: serde_json::Value =
        client.put(format!("{base}/rate")).body("25").send().await.unwrap().json().await.unwrap();
    assert_eq!(accepted["hourly_rate"], 25.0);
    assert_eq!(accepted["editing"], true);
    let committed: serde_json::Value =
        client.post(format!("{base}/rate/commit")).send().await.unwrap().json().await.unwrap();
    assert_eq!(committed["editing"], false);
    assert_eq!(ctx.pipeline.state().lock().rate().hourly_rate(), 25.0);

    let metrics = client.get(format!("{base}/metrics")).send().await.unwrap().text().await.unwrap();
    assert!(metrics.contains("parking_active_sessions{site=\"lot-test\"} 1"));

    api.stop().await;
}

/// Mock engine that answers only after `release` is notified
async fn start_held_engine(entered: Arc<Notify>, release: Arc<Notify>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let entered = entered.clone();
            let release = release.clone();
            tokio::spawn(async move {
                let service = service_fn(move |_req: Request<hyper::body::Incoming>| {
                    let entered = entered.clone();
                    let release = release.clone();
                    async move {
                        entered.notify_one();
                        release.notified().await;
                        let (status, body) = reply("KA01AB1234", 90.0);
                        Ok::<_, Infallible>(
                            Response::builder()
                                .status(status)
                                .header("Content-Type", "application/json")
                                .body(Full::new(Bytes::from(body)))
                                .unwrap(),
                        )
                    }
                });
                let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await;
            });
        }
    });

    format!("http://{addr}/recognize")
}

#[tokio::test]
async fn test_operator_api_refuses_scan_while_one_is_in_flight() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let url = start_held_engine(entered.clone(), release.clone()).await;
    let ctx = Arc::new(ApiContext {
        pipeline: Arc::new(create_pipeline(&url, 10.0)),
        site_id: "lot-test".to_string(),
        currency: "$".to_string(),
    });
    let client = reqwest::Client::new();
    let api = start_api(ctx.clone(), &client).await;

    let first = {
        let client = client.clone();
        let url = format!("{}/scan", api.base);
        tokio::spawn(async move { client.post(url).body("jpeg").send().await })
    };
    entered.notified().await;

    let refused = client.post(format!("{}/scan", api.base)).body("jpeg").send().await.unwrap();
    assert_eq!(refused.status().as_u16(), StatusCode::CONFLICT.as_u16());
    let body: serde_json::Value = refused.json().await.unwrap();
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "scan_in_progress");

    let status: serde_json::Value =
        client.get(format!("{}/status", api.base)).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["status"], "scanning");

    release.notify_one();
    let admitted = first.await.unwrap().unwrap();
    assert_eq!(admitted.status().as_u16(), 200);
    let report: serde_json::Value = admitted.json().await.unwrap();
    assert_eq!(report["plate"], "KA01AB1234");

    // only the admitted scan reached the state
    assert_eq!(ctx.pipeline.state().lock().registry().len(), 1);
    assert_eq!(ctx.pipeline.metrics().busy_rejections_total(), 1);

    api.stop().await;
}
