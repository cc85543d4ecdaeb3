use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    pub code: String,
    pub message: String,
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Outcome of one tool invocation, handed back by the dispatcher.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<ToolError>,
    pub context: Arc<ExecutionContext>,
    pub execution_time_ms: u64,
    pub workspace_changed: bool,
}

impl ExecutionResult {
    pub fn ok(context: Arc<ExecutionContext>, data: serde_json::Value, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context,
            execution_time_ms,
            workspace_changed: false,
        }
    }

    pub fn failed(context: Arc<ExecutionContext>, error: ToolError, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            context,
            execution_time_ms,
            workspace_changed: false,
        }
    }
}
