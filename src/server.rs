//! # HTTP API
//!
//! | Method | Path            | Description                                    |
//! |--------|-----------------|------------------------------------------------|
//! | GET    | `/health`       | Liveness probe                                 |
//! | POST   | `/sign`         | Sign the raw request body, reply with hex      |
//! | POST   | `/store`        | Persist `{reportNo, payload, signatureHex}`    |
//! | GET    | `/verify/:id`   | Verify a stored report                         |
//! | POST   | `/reports`      | Calculate, sign and store a report             |
//!
//! RSA signing and store access are blocking, so handlers move that work
//! onto the blocking pool with [`run_blocking`] and keep the async workers
//! free for I/O.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::bundle;
use crate::error::{AttestError, ErrorKind, Result};
use crate::intake::RawRow;
use crate::issue::{self, IssueRequest};
use crate::signing::{self, PublicKeyMaterial, Signer};
use crate::store::ReportStore;
use crate::verify::{self, VerificationStatus};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared state for all handlers.  Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub signer: Arc<dyn Signer>,
    pub public_key: Arc<PublicKeyMaterial>,
    pub store: Arc<dyn ReportStore>,
    pub verify_base_url: String,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/sign", post(sign_handler))
        .route("/store", post(store_handler))
        .route("/verify/:id", get(verify_handler))
        .route("/reports", post(reports_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `listen` and serve until Ctrl-C.
pub async fn serve(listen: &str, state: AppState) -> Result<()> {
    let addr: SocketAddr = listen
        .parse()
        .map_err(|e| AttestError::Config(format!("invalid listen address {listen:?}: {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AttestError::Other(format!("bind {addr}: {e}")))?;
    info!(%addr, key_id = %state.signer.descriptor().key_id, "HTTP API listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
        })
        .await
        .map_err(|e| AttestError::Other(format!("HTTP server: {e}")))
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Crypto | ErrorKind::Storage | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

struct ApiError(AttestError);

impl From<AttestError> for ApiError {
    fn from(e: AttestError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind());
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        } else {
            warn!(error = %self.0, "request rejected");
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Run a synchronous core call on tokio's blocking pool.
async fn run_blocking<T, F>(f: F) -> std::result::Result<T, ApiError>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AttestError::Other(format!("blocking task failed: {e}")))?
        .map_err(ApiError::from)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `POST /sign`: signs the request body bytes exactly as received.
async fn sign_handler(
    State(state): State<AppState>,
    body: String,
) -> std::result::Result<String, ApiError> {
    run_blocking(move || signing::sign_hex(state.signer.as_ref(), body.as_bytes())).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreRequest {
    report_no: String,
    payload: String,
    signature_hex: String,
}

/// `POST /store`
async fn store_handler(
    State(state): State<AppState>,
    Json(req): Json<StoreRequest>,
) -> std::result::Result<&'static str, ApiError> {
    crate::util::validate_report_no(&req.report_no)?;
    run_blocking(move || {
        state
            .store
            .put(&req.report_no, &req.payload, &req.signature_hex)
    })
    .await?;
    Ok("OK")
}

/// `GET /verify/:id`: 404 with a `not_found` verdict for unknown ids.
async fn verify_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> std::result::Result<Response, ApiError> {
    let verdict =
        run_blocking(move || verify::verify_stored(state.store.as_ref(), &id, &state.public_key))
            .await?;
    let status = match verdict.status {
        VerificationStatus::NotFound => StatusCode::NOT_FOUND,
        VerificationStatus::Valid | VerificationStatus::Invalid => StatusCode::OK,
    };
    Ok((status, Json(verdict)).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportsRequest {
    company: String,
    #[serde(default)]
    report_no: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    account: Option<String>,
    #[serde(default)]
    signer_name: Option<String>,
    #[serde(default)]
    signer_position: Option<String>,
    rows: Vec<RawRow>,
}

/// `POST /reports`: the full issuing pipeline.
async fn reports_handler(
    State(state): State<AppState>,
    Json(req): Json<ReportsRequest>,
) -> std::result::Result<Json<Value>, ApiError> {
    let issue_req = IssueRequest {
        company: req.company,
        report_no: req.report_no,
        date: req.date,
        account: req.account,
        signer_name: req.signer_name,
        signer_position: req.signer_position,
        rows: req.rows.iter().map(RawRow::normalize).collect(),
    };
    let worker = state.clone();
    let issued = run_blocking(move || {
        issue::issue_report(issue_req, worker.signer.as_ref(), worker.store.as_ref())
    })
    .await?;
    let verify_url = bundle::verify_url(&state.verify_base_url, issued.signed.report_no());

    let mut body = serde_json::to_value(&issued)
        .map_err(|e| AttestError::Report(format!("serialize issued report: {e}")))?;
    if let Value::Object(map) = &mut body {
        map.insert("verifyUrl".into(), Value::String(verify_url));
    }
    Ok(Json(body))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
