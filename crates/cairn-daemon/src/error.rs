use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use cairn_context::ContextError;

#[derive(Debug)]
pub enum ApiError {
    Context(ContextError),
    UnknownContext(String),
    Unauthorized(&'static str),
}

impl From<ContextError> for ApiError {
    fn from(e: ContextError) -> Self {
        ApiError::Context(e)
    }
}

pub fn status_for(e: &ContextError) -> StatusCode {
    match e {
        ContextError::InvalidConfiguration { .. } => StatusCode::BAD_REQUEST,
        ContextError::WorkspaceNotFound(_) => StatusCode::NOT_FOUND,
        ContextError::WorkspaceUnavailable { .. } => StatusCode::CONFLICT,
        ContextError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        ContextError::ConnectionFailed { .. } => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Context(e) => {
                let mut error = json!({"code": e.code(), "message": e.to_string()});
                if let ContextError::InvalidConfiguration { violations } = &e {
                    error["violations"] = json!(violations);
                }
                (status_for(&e), error)
            }
            ApiError::UnknownContext(id) => (
                StatusCode::NOT_FOUND,
                json!({"code": "CONTEXT_NOT_FOUND", "message": format!("context '{id}' is not on the stack")}),
            ),
            ApiError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                json!({"code": "UNAUTHORIZED", "message": msg}),
            ),
        };
        (status, Json(json!({"error": body}))).into_response()
    }
}
