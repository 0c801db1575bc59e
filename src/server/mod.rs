//! HTTP surface: job notification webhook, service status, metrics and the
//! administrative routes.
//!
//! The webhook always answers `200 {"message":"success"}` and only enqueues
//! work; completion is handled by the Finish stage. Admin routes answer with
//! the [`AdminResponse`] body, `400` when the operation failed.

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::admin::{AdminResponse, AdminService};
use crate::compute::RemoteJobStatus;
use crate::metrics::metrics_handler;
use crate::pipeline::{ClearReport, CompletionEvent};
use crate::registry::{CacheSingleton, RepertoireCacheEntry, StudyCacheEntry};
use crate::scheduler::{enqueue_stage, StageJob, StageQueue};

/// Shared state for request handlers.
#[derive(Clone)]
pub struct ServerState {
    pub queue: Arc<dyn StageQueue>,
    pub admin: Option<Arc<AdminService>>,
}

impl ServerState {
    pub fn new(queue: Arc<dyn StageQueue>) -> Self {
        Self { queue, admin: None }
    }

    /// Mounts the admin routes under `/admin`.
    pub fn with_admin(mut self, admin: Arc<AdminService>) -> Self {
        self.admin = Some(admin);
        self
    }
}

/// Query parameters the remote platform fills in on each notification.
#[derive(Debug, Default, Deserialize)]
pub struct NotifyParams {
    pub status: Option<String>,
    pub event: Option<String>,
    pub error: Option<String>,
    pub job_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StudyQuery {
    pub repository: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StudyIntent {
    pub should_cache: bool,
    #[serde(default)]
    pub reconcile: bool,
}

#[derive(Debug, Deserialize)]
pub struct RepertoireIntent {
    pub should_cache: bool,
}

pub fn router(state: ServerState) -> Router {
    let mut app = Router::new()
        .route("/stats/notify/:cache_uuid", get(notify).post(notify))
        .route("/status", get(status))
        .route("/metrics", get(metrics_handler));
    if let Some(admin) = state.admin.clone() {
        app = app.nest("/admin", admin_router(admin));
    }
    app.layer(TraceLayer::new_for_http()).with_state(state)
}

fn admin_router<S>(admin: Arc<AdminService>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/enable", post(admin_enable))
        .route("/disable", post(admin_disable))
        .route("/trigger", post(admin_trigger))
        .route("/studies", get(admin_list_studies))
        .route(
            "/studies/:repository_id/:study_id",
            put(admin_set_study).delete(admin_clear_study),
        )
        .route(
            "/repertoires/:repertoire_id",
            put(admin_set_repertoire).delete(admin_clear_repertoire),
        )
        .with_state(admin)
}

/// Binds `addr` and serves until `shutdown` resolves.
pub async fn serve<F>(addr: &str, state: ServerState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Listening for job notifications");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

fn success() -> Json<Value> {
    Json(json!({ "message": "success" }))
}

async fn status() -> Json<Value> {
    success()
}

async fn notify(
    State(state): State<ServerState>,
    Path(cache_uuid): Path<String>,
    Query(params): Query<NotifyParams>,
) -> Json<Value> {
    let Ok(cache_id) = Uuid::parse_str(&cache_uuid) else {
        tracing::warn!(cache_uuid = %cache_uuid, "Notification for malformed cache id");
        return success();
    };

    let status = params
        .status
        .as_deref()
        .map(RemoteJobStatus::parse)
        .unwrap_or(RemoteJobStatus::Other);

    tracing::debug!(
        cache_id = %cache_id,
        status = %status,
        event = ?params.event,
        error = ?params.error,
        "Received job notification"
    );

    if !status.is_terminal() {
        return success();
    }

    let mut event = CompletionEvent::from_webhook(cache_id, status);
    if let Some(job_id) = filled(params.job_id) {
        event = event.with_job_id(job_id);
    }
    if let Some(name) = filled(params.event) {
        event = event.with_event(name);
    }
    if let Some(error) = filled(params.error) {
        event = event.with_error(error);
    }

    if let Err(e) = enqueue_stage(state.queue.as_ref(), StageJob::Finish(event)).await {
        tracing::error!(cache_id = %cache_id, error = %e, "Failed to enqueue job completion");
    }
    success()
}

type AdminReply<T> = (StatusCode, Json<AdminResponse<T>>);

fn reply<T: Serialize>(response: AdminResponse<T>) -> AdminReply<T> {
    let status = if response.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(response))
}

async fn admin_enable(State(admin): State<Arc<AdminService>>) -> AdminReply<CacheSingleton> {
    reply(admin.enable().await)
}

async fn admin_disable(State(admin): State<Arc<AdminService>>) -> AdminReply<CacheSingleton> {
    reply(admin.disable().await)
}

async fn admin_trigger(State(admin): State<Arc<AdminService>>) -> AdminReply<CacheSingleton> {
    reply(admin.trigger().await)
}

async fn admin_list_studies(
    State(admin): State<Arc<AdminService>>,
    Query(query): Query<StudyQuery>,
) -> AdminReply<Vec<StudyCacheEntry>> {
    reply(admin.list_studies(query.repository.as_deref()).await)
}

async fn admin_set_study(
    State(admin): State<Arc<AdminService>>,
    Path((repository_id, study_id)): Path<(String, String)>,
    Json(intent): Json<StudyIntent>,
) -> AdminReply<StudyCacheEntry> {
    reply(
        admin
            .set_study_should_cache(&repository_id, &study_id, intent.should_cache, intent.reconcile)
            .await,
    )
}

async fn admin_clear_study(
    State(admin): State<Arc<AdminService>>,
    Path((repository_id, study_id)): Path<(String, String)>,
) -> AdminReply<ClearReport> {
    reply(admin.clear_study(&repository_id, &study_id).await)
}

async fn admin_set_repertoire(
    State(admin): State<Arc<AdminService>>,
    Path(repertoire_id): Path<String>,
    Json(intent): Json<RepertoireIntent>,
) -> AdminReply<RepertoireCacheEntry> {
    reply(
        admin
            .set_repertoire_should_cache(&repertoire_id, intent.should_cache)
            .await,
    )
}

async fn admin_clear_repertoire(
    State(admin): State<Arc<AdminService>>,
    Path(repertoire_id): Path<String>,
) -> AdminReply<ClearReport> {
    reply(admin.clear_repertoire(&repertoire_id).await)
}

/// Drops empty values and placeholders the platform left unexpanded.
fn filled(value: Option<String>) -> Option<String> {
    value.filter(|v| {
        let v = v.trim();
        !v.is_empty() && !v.starts_with("${")
    })
}
