//! HTTP boundary for the pipeline: bundle generation, transfer, export,
//! job polling, debounced diagram saves, and the SSE change feed.
//! Response codes: 200 full success, 207 partial transfer success, 400
//! malformed request, 404 missing service/diagram, 500 everything else.

use crate::core::blob::BlobStore;
use crate::core::bundle::{Bundle, BundleBuilder};
use crate::core::config::BridgeConfig;
use crate::core::error::AppError;
use crate::core::export::{ExportPackager, ExportResult};
use crate::core::forms::TemplateEngine;
use crate::core::notify::{ChangeHub, DebouncedSaver, DEFAULT_DEBOUNCE};
use crate::core::store::{JobStatusRow, ServiceStore};
use crate::core::transfer::{TransferEngine, TransferResult};
use crate::core::types::{ErrorCategory, JobState, TransferStatus};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderValue, Response, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_stream::wrappers::BroadcastStream;
use tower::util::MapResponseLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

/// Diagrams with embedded DI can get big; cap request bodies generously.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared state behind the router. Templates and exports live in separate
/// blob roots: templates next to the workspace data, exports under the
/// configured storage root.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn ServiceStore>,
    template_blob: Arc<dyn BlobStore>,
    storage_blob: Arc<dyn BlobStore>,
    config: Arc<BridgeConfig>,
    /// Process-scoped so the OAuth token cache survives across requests.
    transfer: Arc<TransferEngine>,
    hub: ChangeHub,
    saver: Arc<DebouncedSaver>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ServiceStore>,
        template_blob: Arc<dyn BlobStore>,
        storage_blob: Arc<dyn BlobStore>,
        config: BridgeConfig,
    ) -> Result<Self, AppError> {
        let transfer = Arc::new(TransferEngine::new(config.modeler.clone())?);
        let hub = ChangeHub::default();
        let saver = Arc::new(DebouncedSaver::new(
            store.clone(),
            hub.clone(),
            DEFAULT_DEBOUNCE,
        ));
        Ok(AppState {
            store,
            template_blob,
            storage_blob,
            config: Arc::new(config),
            transfer,
            hub,
            saver,
        })
    }

    fn builder(&self) -> BundleBuilder {
        let engine = TemplateEngine::new(self.template_blob.clone(), self.config.templates.clone());
        BundleBuilder::new(self.store.clone(), engine)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/services/{id}/bundle", post(generate_bundle))
        .route("/v1/services/{id}/transfer", post(transfer_bundle))
        .route("/v1/services/{id}/export", post(export_bundle))
        .route("/v1/services/{id}/diagram", put(save_diagram))
        .route("/v1/services/{id}/events", get(service_events))
        .route("/v1/jobs/{id}", get(job_status))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(MapResponseLayer::new(|mut response: Response<Body>| {
            if response.status() == StatusCode::PAYLOAD_TOO_LARGE {
                let body = json!({
                    "error": {
                        "code": "API-413",
                        "message": "payload too large"
                    }
                })
                .to_string();
                *response.body_mut() = Body::from(body);
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
            }
            response
        }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Start the API listener and block until the service terminates.
pub async fn serve(state: AppState, bind: SocketAddr) -> Result<(), AppError> {
    serve_internal(state, bind, None).await
}

/// Start the API listener and notify once the bind address is known
/// (test helper).
pub async fn serve_with_ready_notifier(
    state: AppState,
    bind: SocketAddr,
    ready_notifier: oneshot::Sender<SocketAddr>,
) -> Result<(), AppError> {
    serve_internal(state, bind, Some(ready_notifier)).await
}

async fn serve_internal(
    state: AppState,
    bind: SocketAddr,
    ready_notifier: Option<oneshot::Sender<SocketAddr>>,
) -> Result<(), AppError> {
    let listener = TcpListener::bind(bind).await.map_err(|e| {
        AppError::new(
            ErrorCategory::IoError,
            format!("failed to bind API listener {}: {}", bind, e),
        )
    })?;
    let local_addr = listener.local_addr().map_err(|e| {
        AppError::new(
            ErrorCategory::IoError,
            format!("failed to determine API listener address: {}", e),
        )
    })?;
    if let Some(tx) = ready_notifier {
        let _ = tx.send(local_addr);
    }
    info!("modelbridge API listening on {}", local_addr);
    axum::serve(listener, router(state).into_make_service())
        .await
        .map_err(|e| {
            AppError::new(
                ErrorCategory::InternalError,
                format!("API server terminated: {}", e),
            )
        })
}

async fn generate_bundle(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Bundle>, ApiRejection> {
    let bundle = state.builder().build(&id).await?;
    Ok(Json(bundle))
}

#[derive(Debug, Serialize)]
struct TransferResponse {
    job_id: Uuid,
    result: TransferResult,
}

async fn transfer_bundle(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiRejection> {
    let mut job = JobStatusRow::new("transfer");
    let job_id = job.id;
    job.state = JobState::Running;
    state.store.upsert_job_status(job.clone()).await?;

    let outcome = run_transfer(&state, &id).await;
    match outcome {
        Ok(result) => {
            let (job_state, http_status) = match result.status {
                TransferStatus::Complete => (JobState::Completed, StatusCode::OK),
                TransferStatus::Partial => (JobState::PartiallyFailed, StatusCode::MULTI_STATUS),
            };
            let message = (!result.failed.is_empty()).then(|| {
                format!(
                    "{} of {} files failed",
                    result.failed.len(),
                    result.failed.len() + result.uploaded.len()
                )
            });
            state
                .store
                .upsert_job_status(job.advance(job_state, message))
                .await?;
            Ok((http_status, Json(TransferResponse { job_id, result })))
        }
        Err(e) => {
            let _ = state
                .store
                .upsert_job_status(job.advance(JobState::Failed, Some(e.to_string())))
                .await;
            Err(e.into())
        }
    }
}

async fn run_transfer(state: &AppState, service_id: &str) -> Result<TransferResult, AppError> {
    let bundle = state.builder().build(service_id).await?;
    state.transfer.transfer(&bundle).await
}

#[derive(Debug, Serialize)]
struct ExportResponse {
    job_id: Uuid,
    #[serde(flatten)]
    result: ExportResult,
}

async fn export_bundle(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ExportResponse>, ApiRejection> {
    let mut job = JobStatusRow::new("export");
    let job_id = job.id;
    job.state = JobState::Running;
    state.store.upsert_job_status(job.clone()).await?;

    let bundle = state.builder().build(&id).await;
    let outcome = match bundle {
        Ok(bundle) => {
            ExportPackager::new(state.storage_blob.clone())
                .package(&bundle)
                .await
        }
        Err(e) => Err(e),
    };

    match outcome {
        Ok(result) => {
            state
                .store
                .upsert_job_status(job.advance(JobState::Completed, None))
                .await?;
            Ok(Json(ExportResponse { job_id, result }))
        }
        Err(e) => {
            let _ = state
                .store
                .upsert_job_status(job.advance(JobState::Failed, Some(e.to_string())))
                .await;
            Err(e.into())
        }
    }
}

#[derive(Debug, Deserialize)]
struct SaveDiagramRequest {
    xml: String,
    #[serde(default)]
    origin: Option<String>,
}

async fn save_diagram(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SaveDiagramRequest>,
) -> Result<impl IntoResponse, ApiRejection> {
    if request.xml.trim().is_empty() {
        return Err(AppError::new(
            ErrorCategory::ValidationError,
            "diagram XML must not be empty",
        )
        .into());
    }
    let origin = request.origin.unwrap_or_else(|| "unknown".to_string());
    state.saver.schedule_save(&id, request.xml, &origin).await;
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "scheduled" }))))
}

async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobStatusRow>, ApiRejection> {
    match state.store.job_status(id).await? {
        Some(row) => Ok(Json(row)),
        None => Err(ApiRejection {
            status: StatusCode::NOT_FOUND,
            code: "JOB-404",
            message: "no such job".to_string(),
        }),
    }
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    /// Self-origin tag; events carrying it are suppressed for this
    /// subscriber.
    origin: Option<String>,
}

async fn service_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.hub.subscribe();
    let stream = BroadcastStream::new(receiver).filter_map(move |change| {
        let service_id = id.clone();
        let own_origin = query.origin.clone();
        async move {
            let change = change.ok()?;
            if change.service_id != service_id {
                return None;
            }
            if own_origin.as_deref() == Some(change.origin.as_str()) {
                return None;
            }
            let event = Event::default()
                .event("diagram-changed")
                .json_data(&change)
                .ok()?;
            Some(Ok(event))
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Error envelope rendered at the boundary. Category decides the status;
/// the full chain is logged exactly once, here.
struct ApiRejection {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl From<AppError> for ApiRejection {
    fn from(e: AppError) -> Self {
        let status = match e.category {
            ErrorCategory::NoDiagram => StatusCode::NOT_FOUND,
            ErrorCategory::ValidationError => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("request failed: {}", e);
        }
        ApiRejection {
            status,
            code: match e.category {
                ErrorCategory::NoDiagram => "API-404",
                ErrorCategory::ValidationError => "API-400",
                _ => "API-500",
            },
            message: e.message,
        }
    }
}

impl IntoResponse for ApiRejection {
    fn into_response(self) -> Response<Body> {
        let mut response = Json(json!({
            "error": {
                "code": self.code,
                "message": self.message
            }
        }))
        .into_response();
        *response.status_mut() = self.status;
        response
    }
}
