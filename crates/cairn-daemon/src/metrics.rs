use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use cairn_context::ContextStats;

use crate::state::AppState;

#[derive(Debug, Default)]
pub struct Metrics {
    pub requests_total: AtomicU64,
    pub requests_inflight: AtomicU64,
    pub status_2xx: AtomicU64,
    pub status_4xx: AtomicU64,
    pub status_5xx: AtomicU64,
}

fn metric(body: &mut String, name: &str, kind: &str, help: &str, value: u64) {
    let _ = write!(
        body,
        "# HELP cairn_{name} {help}\n# TYPE cairn_{name} {kind}\ncairn_{name} {value}\n"
    );
}

pub fn render_metrics(metrics: &Metrics, stats: &ContextStats) -> String {
    let mut body = String::new();
    let load = |c: &AtomicU64| c.load(Ordering::Relaxed);

    metric(&mut body, "http_requests_total", "counter", "Total HTTP requests handled.", load(&metrics.requests_total));
    metric(&mut body, "http_requests_inflight", "gauge", "Currently in-flight HTTP requests.", load(&metrics.requests_inflight));
    metric(&mut body, "http_responses_2xx", "counter", "Total 2xx responses.", load(&metrics.status_2xx));
    metric(&mut body, "http_responses_4xx", "counter", "Total 4xx responses.", load(&metrics.status_4xx));
    metric(&mut body, "http_responses_5xx", "counter", "Total 5xx responses.", load(&metrics.status_5xx));

    metric(&mut body, "context_stack_depth", "gauge", "Contexts currently on the stack.", stats.stack_depth as u64);
    metric(&mut body, "context_stack_capacity", "gauge", "Configured stack bound.", stats.stack_capacity as u64);
    metric(&mut body, "execution_history_len", "gauge", "Execution results currently retained.", stats.history_len as u64);
    metric(&mut body, "tool_schemas", "gauge", "Registered tool schemas.", stats.registered_schemas as u64);
    metric(&mut body, "contexts_created_total", "counter", "Contexts created.", stats.created_total);
    metric(&mut body, "contexts_degraded_total", "counter", "Contexts left unbound after a failed workspace lookup.", stats.degraded_total);
    metric(&mut body, "context_switches_total", "counter", "Successful workspace switches.", stats.switched_total);
    metric(&mut body, "context_switch_failures_total", "counter", "Rejected workspace switches.", stats.switch_failures_total);
    metric(&mut body, "contexts_evicted_total", "counter", "Contexts evicted by stack overflow.", stats.evicted_total);
    metric(&mut body, "contexts_evicted_in_flight_total", "counter", "Evictions that hit a context still in flight.", stats.evicted_in_flight_total);
    metric(&mut body, "contexts_expired_total", "counter", "Contexts removed by the sweeper.", stats.expired_total);
    metric(&mut body, "parameter_validations_total", "counter", "Parameter enhancement calls.", stats.validations_total);
    metric(&mut body, "parameter_validation_failures_total", "counter", "Enhancements that reported errors.", stats.validation_failures_total);
    metric(&mut body, "executions_total", "counter", "Execution results recorded.", stats.executions_total);
    metric(&mut body, "execution_failures_total", "counter", "Failed execution results recorded.", stats.execution_failures_total);
    metric(&mut body, "sweeps_total", "counter", "Sweeper cycles run.", stats.sweeps_total);
    metric(&mut body, "sweep_failures_total", "counter", "Sweeper cycles that panicked.", stats.sweep_failures_total);

    body
}

pub async fn metrics_handler(State(st): State<AppState>) -> impl IntoResponse {
    let stats = st.manager.stats().await;
    let body = render_metrics(&st.metrics, &stats);
    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

pub async fn track_requests(
    State(st): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, std::convert::Infallible> {
    st.metrics.requests_inflight.fetch_add(1, Ordering::Relaxed);
    let resp = next.run(req).await;
    st.metrics.requests_inflight.fetch_sub(1, Ordering::Relaxed);
    st.metrics.requests_total.fetch_add(1, Ordering::Relaxed);

    let status = resp.status().as_u16();
    if status >= 500 {
        st.metrics.status_5xx.fetch_add(1, Ordering::Relaxed);
    } else if status >= 400 {
        st.metrics.status_4xx.fetch_add(1, Ordering::Relaxed);
    } else if status >= 200 {
        st.metrics.status_2xx.fetch_add(1, Ordering::Relaxed);
    }

    Ok(resp)
}
