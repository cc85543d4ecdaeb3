use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Sse,
    },
    Json,
};
use futures_util::stream::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};

use cairn_common::{ExecutionContext, ExecutionResult, Metadata, ToolError};
use cairn_context::{ContextError, EnhanceOptions, ToolSchema};

use crate::error::ApiError;
use crate::state::AppState;

const API_SWITCH_REASON: &str = "requested via api";

fn default_true() -> bool {
    true
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

async fn resolve_context(
    st: &AppState,
    request_id: Option<&str>,
) -> Result<Option<Arc<ExecutionContext>>, ApiError> {
    match request_id {
        None => Ok(None),
        Some(id) => st
            .manager
            .find_context(id)
            .await
            .map(Some)
            .ok_or_else(|| ApiError::UnknownContext(id.to_string())),
    }
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// ── Contexts ─────────────────────────────────────────────────────────

pub async fn list_contexts(State(st): State<AppState>) -> impl IntoResponse {
    Json(st.manager.stack_snapshot().await)
}

pub async fn active_context(State(st): State<AppState>) -> impl IntoResponse {
    Json(st.manager.last_active().await)
}

#[derive(Debug, Deserialize)]
pub struct CreateContextRequest {
    pub tool_name: String,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub parent_request_id: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

pub async fn create_context(
    State(st): State<AppState>,
    Json(req): Json<CreateContextRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let parent = resolve_context(&st, req.parent_request_id.as_deref()).await?;
    let ctx = st
        .manager
        .create_context(
            &req.tool_name,
            req.workspace_id.as_deref(),
            parent.as_ref(),
            req.metadata,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ctx)))
}

#[derive(Debug, Deserialize)]
pub struct SwitchRequest {
    /// Context being switched away from; omitted for a fresh start.
    #[serde(default)]
    pub from_request_id: Option<String>,
    pub to_workspace_id: String,
    #[serde(default = "default_true")]
    pub preserve_auth: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn switch_context(
    State(st): State<AppState>,
    Json(req): Json<SwitchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let current = resolve_context(&st, req.from_request_id.as_deref()).await?;
    let reason = req.reason.as_deref().unwrap_or(API_SWITCH_REASON);
    let ctx = st
        .manager
        .switch_context(current.as_ref(), &req.to_workspace_id, req.preserve_auth, reason)
        .await?;
    Ok((StatusCode::CREATED, Json(ctx)))
}

// ── Tools ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct EnhanceRequest {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default = "empty_object")]
    pub parameters: Value,
    #[serde(default)]
    pub options: EnhanceOptions,
}

pub async fn enhance_parameters(
    State(st): State<AppState>,
    Path(tool_name): Path<String>,
    Json(req): Json<EnhanceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = resolve_context(&st, req.request_id.as_deref()).await?;
    let enhanced = st
        .manager
        .enhance_parameters(ctx.as_deref(), &tool_name, &req.parameters, req.options)
        .await;
    Ok(Json(enhanced))
}

pub async fn list_schemas(State(st): State<AppState>) -> impl IntoResponse {
    Json(st.manager.tool_schemas())
}

pub async fn register_schema(
    State(st): State<AppState>,
    Json(schema): Json<ToolSchema>,
) -> Result<impl IntoResponse, ApiError> {
    if schema.name.trim().is_empty() {
        return Err(ContextError::invalid("name", "must not be empty").into());
    }
    let name = schema.name.clone();
    let replaced = st.manager.register_tool_schema(schema).is_some();
    tracing::info!(tool=%name, replaced, "tool schema registered");
    let status = if replaced { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(json!({"name": name, "replaced": replaced}))))
}

// ── Executions ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ExecutionRequest {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<ToolError>,
    #[serde(default)]
    pub execution_time_ms: u64,
    #[serde(default)]
    pub workspace_changed: bool,
}

pub async fn record_execution(
    State(st): State<AppState>,
    Json(req): Json<ExecutionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let context = st
        .manager
        .find_context(&req.request_id)
        .await
        .ok_or_else(|| ApiError::UnknownContext(req.request_id.clone()))?;
    st.manager
        .record_execution(ExecutionResult {
            success: req.success,
            data: req.data,
            error: req.error,
            context,
            execution_time_ms: req.execution_time_ms,
            workspace_changed: req.workspace_changed,
        })
        .await;
    Ok((StatusCode::ACCEPTED, Json(json!({"recorded": true}))))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

pub async fn history(
    State(st): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> impl IntoResponse {
    Json(st.manager.execution_history(q.limit).await)
}

// ── Introspection ────────────────────────────────────────────────────

pub async fn stats(State(st): State<AppState>) -> impl IntoResponse {
    Json(st.manager.stats().await)
}

pub async fn list_workspaces(State(st): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let workspaces = st.manager.registry().list_workspaces().await.map_err(|e| {
        tracing::warn!(error=%e, "listing workspaces failed");
        ContextError::ConnectionFailed {
            workspace_id: "*".to_string(),
            message: format!("{e:#}"),
        }
    })?;
    let summaries: Vec<_> = workspaces.iter().map(|ws| ws.summary()).collect();
    Ok(Json(summaries))
}

pub async fn event_stream(
    State(st): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = st
        .events
        .subscribe()
        .take_until(st.shutdown.clone().cancelled_owned())
        .map(|ev| {
            let event = Event::default()
                .event(ev.kind.as_str())
                .json_data(&ev)
                .unwrap_or_else(|e| Event::default().comment(format!("unserializable event: {e}")));
            Ok(event)
        });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
