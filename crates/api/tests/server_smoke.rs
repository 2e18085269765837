//! In-process router tests against a mock ledger and a temp-file mirror.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use tempfile::NamedTempFile;
use tower::ServiceExt;

use vigil_core::content_hash;
use vigil_ledger::mock::MockLedger;
use vigil_service::Storage;

const CAPTURED_AT: u64 = 1_699_999_000; // safely before the mock clock

struct TestApp {
    ledger: Arc<MockLedger>,
    router: Router,
    _db: NamedTempFile,
}

async fn test_app() -> TestApp {
    let temp_db = NamedTempFile::new().unwrap();
    let storage = Storage::new_with_path(temp_db.path()).await.unwrap();
    storage.run_migrations().await.unwrap();

    let ledger = Arc::new(MockLedger::new());
    let router = vigil_api::app(ledger.clone(), storage);
    TestApp {
        ledger,
        router,
        _db: temp_db,
    }
}

const BOUNDARY: &str = "vigil-test-boundary";

fn multipart_record_body(video: &[u8], camera_id: Option<&str>, captured_at: Option<u64>) -> Vec<u8> {
    let mut body = Vec::new();

    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"video\"; filename=\"clip.mp4\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: video/mp4\r\n\r\n");
    body.extend_from_slice(video);
    body.extend_from_slice(b"\r\n");

    if let Some(camera_id) = camera_id {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"cameraId\"\r\n\r\n");
        body.extend_from_slice(camera_id.as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    if let Some(captured_at) = captured_at {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"capturedAt\"\r\n\r\n");
        body.extend_from_slice(captured_at.to_string().as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn record_request(video: &[u8], camera_id: Option<&str>, captured_at: Option<u64>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/record")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_record_body(
            video,
            camera_id,
            captured_at,
        )))
        .unwrap()
}

fn verify_json_request(video_hash: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/verify")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(format!("{{\"videoHash\":\"{}\"}}", video_hash)))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_ok() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn record_then_verify_then_list() {
    let app = test_app().await;
    let video = b"dashcam-footage-bytes";

    let response = app
        .router
        .clone()
        .oneshot(record_request(video, Some("CAM-001"), Some(CAPTURED_AT)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let hash = content_hash(video).to_string();
    assert_eq!(body["videoHash"], hash);
    assert_eq!(body["cameraId"], "CAM-001");
    assert_eq!(body["capturedAt"], CAPTURED_AT);
    assert_eq!(body["sequenceNumber"], 0);
    assert!(body["transactionHash"].as_str().unwrap().starts_with("0x"));

    let response = app
        .router
        .clone()
        .oneshot(verify_json_request(&hash))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["verified"], true);
    assert_eq!(body["source"], "cache+ledger");
    assert_eq!(body["evidence"]["cameraId"], "CAM-001");
    assert!(body.get("warning").is_none());

    let response = app
        .router
        .oneshot(Request::get("/api/logs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["source"], "ledger");
    assert_eq!(body["records"][0]["videoHash"], hash);
    assert_eq!(body["records"][0]["status"], "confirmed");
}

#[tokio::test]
async fn record_missing_camera_id_is_rejected() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(record_request(b"clip", None, Some(CAPTURED_AT)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "invalid_request");
}

#[tokio::test]
async fn record_future_capture_time_is_rejected() {
    let app = test_app().await;
    let future = app.ledger.clock().await + 86_400;

    let response = app
        .router
        .oneshot(record_request(b"clip", Some("CAM-001"), Some(future)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "invalid_request");
}

#[tokio::test]
async fn duplicate_record_conflicts() {
    let app = test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(record_request(b"clip", Some("CAM-001"), Some(CAPTURED_AT)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .router
        .oneshot(record_request(b"clip", Some("CAM-002"), Some(CAPTURED_AT)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "already_recorded");
    assert_eq!(body["error"]["details"]["status"], "confirmed");
    assert_eq!(app.ledger.submit_calls().await, 1);
}

#[tokio::test]
async fn read_only_service_refuses_record() {
    let app = test_app().await;
    app.ledger.set_read_only(true);

    // Rebuild the router so the read-only flag is observed at construction.
    let temp_db = NamedTempFile::new().unwrap();
    let storage = Storage::new_with_path(temp_db.path()).await.unwrap();
    storage.run_migrations().await.unwrap();
    let router = vigil_api::app(app.ledger.clone(), storage);

    let response = router
        .oneshot(record_request(b"clip", Some("CAM-001"), Some(CAPTURED_AT)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "ledger_unavailable");
}

#[tokio::test]
async fn verify_unknown_hash() {
    let app = test_app().await;
    let hash = content_hash(b"never recorded").to_string();

    let response = app.router.oneshot(verify_json_request(&hash)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["verified"], false);
    assert_eq!(body["reason"], "never_recorded");
    assert!(body.get("evidence").is_none());
}

#[tokio::test]
async fn verify_accepts_multipart_upload() {
    let app = test_app().await;
    let video = b"uploaded-for-verification";

    app.router
        .clone()
        .oneshot(record_request(video, Some("CAM-001"), Some(CAPTURED_AT)))
        .await
        .unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/api/verify")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_record_body(video, None, None)))
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["verified"], true);
    assert_eq!(body["videoHash"], content_hash(video).to_string());
}

#[tokio::test]
async fn verify_malformed_hash_is_rejected() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(verify_json_request("not-a-hash"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "invalid_request");
}

#[tokio::test]
async fn verify_during_outage_without_mirror_hit_is_unavailable() {
    let app = test_app().await;
    let hash = content_hash(b"clip").to_string();

    app.ledger.set_unavailable(true).await;

    let response = app.router.oneshot(verify_json_request(&hash)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "ledger_unavailable");
}

#[tokio::test]
async fn verify_during_outage_serves_degraded_answer_from_mirror() {
    let app = test_app().await;
    let video = b"clip";

    app.router
        .clone()
        .oneshot(record_request(video, Some("CAM-001"), Some(CAPTURED_AT)))
        .await
        .unwrap();

    app.ledger.set_unavailable(true).await;

    let response = app
        .router
        .oneshot(verify_json_request(&content_hash(video).to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["verified"], true);
    assert_eq!(body["source"], "cache-only");
    assert!(body["warning"].as_str().is_some());
}

#[tokio::test]
async fn logs_during_outage_fall_back_to_mirror() {
    let app = test_app().await;

    app.router
        .clone()
        .oneshot(record_request(b"clip", Some("CAM-001"), Some(CAPTURED_AT)))
        .await
        .unwrap();

    app.ledger.set_unavailable(true).await;

    let response = app
        .router
        .oneshot(Request::get("/api/logs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["source"], "cache");
    assert!(body["warning"].as_str().is_some());
}
