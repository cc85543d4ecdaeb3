mod args;
mod auth;
mod error;
mod handlers;
mod metrics;
mod state;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use cairn_context::{
    spawn_sweeper, BroadcastPublisher, ContextConfig, ContextManager, EventPublisher,
    FanoutPublisher, ToolSchema, TracingPublisher,
};
use cairn_registry::{HttpWorkspaceRegistry, MemoryWorkspaceRegistry, WorkspaceRegistry};

use crate::args::Args;
use crate::handlers::{
    active_context, create_context, enhance_parameters, event_stream, healthz, history,
    list_contexts, list_schemas, list_workspaces, record_execution, register_schema, stats,
    switch_context,
};
use crate::metrics::{metrics_handler, track_requests};
use crate::state::AppState;

async fn build_registry(args: &Args, timeout: Duration) -> anyhow::Result<Arc<dyn WorkspaceRegistry>> {
    if let Some(url) = args.registry_url.as_deref() {
        tracing::info!(registry_url=%url, "using remote workspace registry");
        let registry = HttpWorkspaceRegistry::new(url, args.registry_token.clone(), timeout)?;
        return Ok(Arc::new(registry));
    }
    if let Some(path) = args.workspaces_file.as_deref() {
        return Ok(Arc::new(MemoryWorkspaceRegistry::from_json_file(path).await?));
    }
    tracing::warn!("no workspace source configured, every workspace lookup will miss");
    Ok(Arc::new(MemoryWorkspaceRegistry::new()))
}

async fn load_schemas(path: &Path) -> anyhow::Result<Vec<ToolSchema>> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading schemas file {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parsing schemas file {}", path.display()))
}

async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error=%e, "failed to listen for ctrl-c");
    }
    tracing::info!("shutdown requested");
    token.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let otel = cairn_common::telemetry::init_tracing(
        "cairn-daemon",
        args.otlp_endpoint.as_deref(),
        args.otlp_token.as_deref(),
        &args.log_format,
    );

    let config = ContextConfig::from_env();
    let registry = build_registry(&args, config.registry_timeout).await?;

    let events = BroadcastPublisher::new(args.event_buffer);
    let mut publisher = FanoutPublisher::new().with(Arc::new(events.clone()));
    if args.log_events {
        publisher = publisher.with(Arc::new(TracingPublisher));
    }
    let publisher: Arc<dyn EventPublisher> = Arc::new(publisher);

    let manager = ContextManager::new(config, registry, publisher)?;

    if let Some(path) = args.schemas_file.as_deref() {
        let schemas = load_schemas(path).await?;
        tracing::info!(path=%path.display(), count = schemas.len(), "registering tool schemas");
        for schema in schemas {
            manager.register_tool_schema(schema);
        }
    }

    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(manager.clone(), shutdown.child_token());

    let st = AppState {
        manager,
        events,
        metrics: Arc::new(metrics::Metrics::default()),
        api_token: args.api_token.as_deref().map(Arc::from),
        shutdown: shutdown.clone(),
    };

    let api_routes = Router::new()
        .route("/contexts", get(list_contexts).post(create_context))
        .route("/contexts/active", get(active_context))
        .route("/contexts/switch", post(switch_context))
        .route("/tools/:name/enhance", post(enhance_parameters))
        .route("/executions", post(record_execution))
        .route("/history", get(history))
        .route("/schemas", get(list_schemas).post(register_schema))
        .route("/workspaces", get(list_workspaces))
        .route("/stats", get(stats))
        .route("/events", get(event_stream))
        .layer(middleware::from_fn_with_state(st.clone(), auth::require_token));

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .nest("/v1", api_routes)
        .layer(middleware::from_fn_with_state(st.clone(), track_requests))
        .with_state(st);

    let listener = tokio::net::TcpListener::bind(&args.listen_addr)
        .await
        .with_context(|| format!("binding {}", args.listen_addr))?;
    tracing::info!(listen_addr=%args.listen_addr, "cairn daemon listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    sweeper.shutdown().await;
    if let Some(provider) = otel {
        if let Err(e) = provider.shutdown() {
            eprintln!("failed to flush traces: {e}");
        }
    }
    Ok(())
}
