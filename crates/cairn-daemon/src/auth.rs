use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::state::AppState;

fn extract_token(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .or_else(|| req.headers().get("x-api-key").and_then(|v| v.to_str().ok()))
}

/// Bearer-token gate for the API routes. A daemon without a token is open.
pub async fn require_token(
    State(st): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, std::convert::Infallible> {
    let Some(expected) = st.api_token.as_deref() else {
        return Ok(next.run(req).await);
    };
    let rejection = match extract_token(&req) {
        None => Some("missing token"),
        Some(token) if token != expected => Some("invalid token"),
        Some(_) => None,
    };
    if let Some(msg) = rejection {
        tracing::debug!(path=%req.uri().path(), reason = msg, "rejected api request");
        return Ok(ApiError::Unauthorized(msg).into_response());
    }
    Ok(next.run(req).await)
}
