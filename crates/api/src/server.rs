use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State},
    http::{header, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::info;

use vigil_core::{Address, CameraId, EvidenceRecord, LedgerError, SourceTag, VideoHash};
use vigil_ledger::LedgerClient;
use vigil_service::{
    EnumerationService, ListError, RecordError, Storage, Synchronizer, VerificationEngine,
    VerificationOutcome, VerifyError,
};

/// Largest accepted upload. Matches the sort of clip sizes the cameras
/// produce; anything bigger should be hashed client-side.
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    /// Absent when the service runs without a signing identity; reads keep
    /// working, `/api/record` answers 503.
    synchronizer: Option<Arc<Synchronizer>>,
    verifier: Arc<VerificationEngine>,
    lister: Arc<EnumerationService>,
}

impl AppState {
    pub fn new(ledger: Arc<dyn LedgerClient>, storage: Storage) -> Self {
        let synchronizer = ledger
            .can_submit()
            .then(|| Arc::new(Synchronizer::new(ledger.clone(), storage.clone())));

        Self {
            synchronizer,
            verifier: Arc::new(VerificationEngine::new(ledger.clone(), storage.clone())),
            lister: Arc::new(EnumerationService::new(ledger, storage)),
        }
    }
}

/// Build the API router for the given ledger and mirror.
pub fn app(ledger: Arc<dyn LedgerClient>, storage: Storage) -> Router {
    router_for_state(AppState::new(ledger, storage))
}

fn router_for_state(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/record", post(record))
        .route("/api/verify", post(verify))
        .route("/api/logs", get(logs))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on the given port until a shutdown signal arrives.
pub async fn serve(
    ledger: Arc<dyn LedgerClient>,
    storage: Storage,
    port: u16,
) -> anyhow::Result<()> {
    let app = app(ledger, storage.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("API server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    storage.close().await;
    info!("API server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            eprintln!("Failed to install Ctrl+C handler: {}", err);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                eprintln!("Failed to install SIGTERM handler: {}", err);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

async fn health() -> &'static str {
    "OK"
}

const ERROR_CODE_INVALID_REQUEST: &str = "invalid_request";
const ERROR_CODE_ALREADY_RECORDED: &str = "already_recorded";
const ERROR_CODE_LEDGER_UNAVAILABLE: &str = "ledger_unavailable";
const ERROR_CODE_INTERNAL_ERROR: &str = "internal_error";

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorInfo,
}

#[derive(Serialize)]
struct ErrorInfo {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: ErrorInfo {
                code,
                message: message.into(),
                details: None,
            },
        }),
    )
}

fn api_error_details(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
    details: serde_json::Value,
) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: ErrorInfo {
                code,
                message: message.into(),
                details: Some(details),
            },
        }),
    )
}

fn bad_request(msg: impl Into<String>) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, ERROR_CODE_INVALID_REQUEST, msg)
}

fn ledger_unavailable(msg: impl Into<String>) -> ApiError {
    api_error(
        StatusCode::SERVICE_UNAVAILABLE,
        ERROR_CODE_LEDGER_UNAVAILABLE,
        msg,
    )
}

fn internal_error<E: std::fmt::Display>(err: E) -> ApiError {
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        ERROR_CODE_INTERNAL_ERROR,
        format!("Internal error: {}", err),
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordResponse {
    video_hash: VideoHash,
    transaction_hash: String,
    sequence_number: u64,
    commit_time: u64,
    camera_id: CameraId,
    captured_at: u64,
    submitter: Address,
}

struct RecordUpload {
    video: Vec<u8>,
    camera_id: CameraId,
    captured_at: Option<u64>,
}

async fn read_record_upload(mut multipart: Multipart) -> Result<RecordUpload, ApiError> {
    let mut video: Option<Vec<u8>> = None;
    let mut camera_id: Option<String> = None;
    let mut captured_at: Option<u64> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("video") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("Could not read video part: {}", e)))?;
                video = Some(bytes.to_vec());
            }
            Some("cameraId") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("Could not read cameraId field: {}", e)))?;
                camera_id = Some(text);
            }
            Some("capturedAt") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("Could not read capturedAt field: {}", e)))?;
                let parsed = text
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| bad_request("capturedAt must be a unix timestamp in seconds"))?;
                captured_at = Some(parsed);
            }
            _ => {}
        }
    }

    let video = video.ok_or_else(|| bad_request("Missing required part: video"))?;
    if video.is_empty() {
        return Err(bad_request("Video file is empty"));
    }
    let camera_id = camera_id.ok_or_else(|| bad_request("Missing required field: cameraId"))?;
    let camera_id =
        CameraId::new(&camera_id).map_err(|e| bad_request(format!("Invalid cameraId: {}", e)))?;

    Ok(RecordUpload {
        video,
        camera_id,
        captured_at,
    })
}

async fn record(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<RecordResponse>, ApiError> {
    let Some(synchronizer) = &state.synchronizer else {
        return Err(ledger_unavailable(
            "service is running without a signing identity; recording is disabled",
        ));
    };

    let upload = read_record_upload(multipart).await?;

    let receipt = synchronizer
        .record(&upload.video, &upload.camera_id, upload.captured_at)
        .await
        .map_err(record_error_response)?;

    Ok(Json(RecordResponse {
        video_hash: receipt.hash,
        transaction_hash: receipt.tx_ref,
        sequence_number: receipt.sequence_number,
        commit_time: receipt.commit_time,
        camera_id: receipt.camera_id,
        captured_at: receipt.captured_at,
        submitter: receipt.submitter,
    }))
}

fn record_error_response(err: RecordError) -> ApiError {
    match err {
        RecordError::AlreadyRecorded { hash, status } => api_error_details(
            StatusCode::CONFLICT,
            ERROR_CODE_ALREADY_RECORDED,
            format!("Evidence {} is already recorded", hash),
            serde_json::json!({ "status": status.as_str() }),
        ),
        RecordError::ConfirmationPending { tx_ref, .. } => ledger_unavailable(format!(
            "submission {} sent; confirmation still pending, re-verify later",
            tx_ref
        )),
        RecordError::Ledger(LedgerError::DuplicateKey { hash }) => api_error_details(
            StatusCode::CONFLICT,
            ERROR_CODE_ALREADY_RECORDED,
            format!("Evidence {} is already recorded on the ledger", hash),
            serde_json::json!({ "status": "confirmed" }),
        ),
        RecordError::Ledger(LedgerError::InvalidArgument(msg)) => bad_request(msg),
        RecordError::Ledger(e) if e.is_unreachable() => ledger_unavailable(e.to_string()),
        RecordError::Ledger(e) => internal_error(e),
        RecordError::Storage(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyBody {
    video_hash: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    verified: bool,
    video_hash: VideoHash,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<SourceTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    evidence: Option<EvidenceRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

/// Accepts either a multipart `video` part (the file is hashed here) or a
/// JSON body carrying a pre-computed `videoHash`.
async fn verify(State(state): State<AppState>, req: Request<Body>) -> Result<Json<VerifyResponse>, ApiError> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let hash = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| bad_request(format!("Malformed multipart body: {}", e)))?;
        hash_from_multipart(multipart).await?
    } else {
        let bytes = axum::body::to_bytes(req.into_body(), MAX_UPLOAD_BYTES)
            .await
            .map_err(|e| bad_request(format!("Could not read request body: {}", e)))?;
        let body: VerifyBody = serde_json::from_slice(&bytes)
            .map_err(|e| bad_request(format!("Expected JSON with videoHash: {}", e)))?;
        VideoHash::from_str(&body.video_hash)
            .map_err(|e| bad_request(format!("Invalid videoHash: {}", e)))?
    };

    let outcome = state
        .verifier
        .verify_hash(hash)
        .await
        .map_err(|e| match e {
            VerifyError::Unavailable { cause } => ledger_unavailable(cause),
            VerifyError::Storage(e) => internal_error(e),
        })?;

    Ok(Json(match outcome {
        VerificationOutcome::Verified {
            evidence,
            source,
            degraded,
        } => VerifyResponse {
            verified: true,
            video_hash: hash,
            warning: degraded.then(|| {
                "ledger unreachable; verification served from the local mirror".to_string()
            }),
            source: Some(source),
            evidence: Some(evidence),
            reason: None,
        },
        VerificationOutcome::NotVerified { reason } => VerifyResponse {
            verified: false,
            video_hash: hash,
            source: None,
            warning: None,
            evidence: None,
            reason: Some(reason.as_str()),
        },
    }))
}

async fn hash_from_multipart(mut multipart: Multipart) -> Result<VideoHash, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() == Some("video") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| bad_request(format!("Could not read video part: {}", e)))?;
            if bytes.is_empty() {
                return Err(bad_request("Video file is empty"));
            }
            return Ok(vigil_core::content_hash(&bytes));
        }
    }
    Err(bad_request("Missing required part: video"))
}

async fn logs(
    State(state): State<AppState>,
) -> Result<Json<vigil_service::EvidenceListing>, ApiError> {
    let listing = state.lister.list_all().await.map_err(|e| match e {
        ListError::Storage(e) => internal_error(e),
    })?;
    Ok(Json(listing))
}
