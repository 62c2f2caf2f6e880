#![forbid(unsafe_code)]

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use roi_engines::anomaly::{
    parse_outbound_timeout_ms, AnomalyDetectorConfig, AzureAnomalyDetectorClient,
};
use roi_kernel_contracts::roi::RoiCalculationRequest;
use roi_os::{RoiOpError, RoiRuntime};
use roi_storage::azure_blob::AzureBlobStore;
use roi_storage::connection_string::parse_connection_string;
use roi_storage::{BlobStore, HistoryStore, LocalFsBlobStore, UnconfiguredBlobStore};
use tracing::Instrument;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1:7071";

pub const CORS_ALLOW_METHODS: &str = "POST, GET, OPTIONS";
pub const CORS_ALLOW_HEADERS: &str = "Content-Type, Authorization";

pub type SharedRuntime = Arc<RoiRuntime>;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
    pub detector_configured: bool,
}

/// Where the history blob lives.
#[derive(Clone, PartialEq, Eq)]
pub enum StorageSelection {
    ConnectionString(String),
    LocalDir(PathBuf),
    Unset,
}

impl fmt::Debug for StorageSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageSelection::ConnectionString(_) => f.write_str("ConnectionString(<redacted>)"),
            StorageSelection::LocalDir(dir) => f.debug_tuple("LocalDir").field(dir).finish(),
            StorageSelection::Unset => f.write_str("Unset"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub bind: String,
    pub storage: StorageSelection,
    pub detector: AnomalyDetectorConfig,
    pub outbound_timeout_ms: u32,
}

impl AdapterConfig {
    /// Reads the environment. Nothing is validated here; a missing or broken
    /// setting surfaces on the first request that needs it.
    pub fn from_env() -> Self {
        Self::from_env_var_map(|key| env::var(key).ok())
    }

    pub fn from_env_var_map<F>(mut env_getter: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let bind = env_getter("ROI_HTTP_BIND")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_HTTP_BIND.to_string());
        let storage = match env_getter("AzureWebJobsStorage")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        {
            Some(conn) => StorageSelection::ConnectionString(conn),
            None => env_getter("ROI_LOCAL_STORE_DIR")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(|dir| StorageSelection::LocalDir(PathBuf::from(dir)))
                .unwrap_or(StorageSelection::Unset),
        };
        let outbound_timeout_ms = parse_outbound_timeout_ms(env_getter("ROI_OUTBOUND_TIMEOUT_MS"));
        let detector = AnomalyDetectorConfig::from_env_var_map(&mut env_getter);
        Self {
            bind,
            storage,
            detector,
            outbound_timeout_ms,
        }
    }
}

pub fn build_blob_store(selection: &StorageSelection, timeout_ms: u32) -> Arc<dyn BlobStore> {
    match selection {
        StorageSelection::ConnectionString(raw) => match parse_connection_string(raw) {
            Ok(connection) => Arc::new(AzureBlobStore::new(connection, timeout_ms)),
            Err(err) => {
                tracing::warn!(error = %err, "storage connection string rejected");
                Arc::new(UnconfiguredBlobStore::new(err.to_string()))
            }
        },
        StorageSelection::LocalDir(dir) => Arc::new(LocalFsBlobStore::new(dir.clone())),
        StorageSelection::Unset => Arc::new(UnconfiguredBlobStore::new(
            "AzureWebJobsStorage is not set",
        )),
    }
}

pub fn build_runtime(config: &AdapterConfig) -> RoiRuntime {
    let history = HistoryStore::new(build_blob_store(
        &config.storage,
        config.outbound_timeout_ms,
    ));
    let detector = AzureAnomalyDetectorClient::new(config.detector.clone());
    RoiRuntime::new(history, Arc::new(detector))
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("roi_adapter=info,info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

pub fn build_router(runtime: SharedRuntime) -> Router {
    Router::new()
        .route(
            "/calculateROI",
            post(calculate_roi).fallback(method_not_allowed),
        )
        .route("/getROI", get(get_roi).fallback(method_not_allowed))
        .route(
            "/detectAnomalies",
            get(detect_anomalies).fallback(method_not_allowed),
        )
        .route("/healthz", get(healthz).fallback(method_not_allowed))
        .fallback(not_found)
        .layer(middleware::from_fn(cors_middleware))
        .layer(middleware::from_fn(request_tracing_middleware))
        .with_state(runtime)
}

/// Answers every preflight itself and stamps the allow-origin header on
/// everything else, errors included.
async fn cors_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return preflight_response();
    }
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

fn preflight_response() -> Response {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, CORS_ALLOW_METHODS),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, CORS_ALLOW_HEADERS),
            (header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true"),
        ],
        (),
    )
        .into_response()
}

async fn request_tracing_middleware(request: Request, next: Next) -> Response {
    let span = tracing::info_span!(
        "http.request",
        method = %request.method(),
        route = %request.uri().path(),
    );
    let started = Instant::now();
    let response = next.run(request).instrument(span.clone()).await;
    span.in_scope(|| {
        tracing::info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request complete"
        )
    });
    response
}

async fn calculate_roi(State(runtime): State<SharedRuntime>, body: Bytes) -> Response {
    let request: RoiCalculationRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("invalid JSON body: {err}"),
            )
        }
    };
    run_blocking(runtime, move |runtime| runtime.calculate_roi(request)).await
}

async fn get_roi(State(runtime): State<SharedRuntime>) -> Response {
    run_blocking(runtime, |runtime| runtime.get_roi_data()).await
}

async fn detect_anomalies(State(runtime): State<SharedRuntime>) -> Response {
    run_blocking(runtime, |runtime| runtime.detect_anomalies()).await
}

async fn healthz(State(runtime): State<SharedRuntime>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            store: runtime.history().describe(),
            detector_configured: runtime.detector_configured(),
        }),
    )
}

async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "not found".to_string())
}

async fn method_not_allowed(method: Method) -> Response {
    error_response(
        StatusCode::METHOD_NOT_ALLOWED,
        format!("method {method} not allowed"),
    )
}

/// Store and detector calls block; keep them off the async workers.
async fn run_blocking<T, F>(runtime: SharedRuntime, op: F) -> Response
where
    T: serde::Serialize + Send + 'static,
    F: FnOnce(&RoiRuntime) -> Result<T, RoiOpError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || op(runtime.as_ref())).await {
        Ok(Ok(body)) => (StatusCode::OK, Json(body)).into_response(),
        Ok(Err(err)) => error_response(
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            err.public_message(),
        ),
        Err(join_err) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("request worker failed: {join_err}"),
        ),
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}
