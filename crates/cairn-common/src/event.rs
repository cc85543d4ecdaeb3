use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextEventKind {
    Created,
    Switched,
    Validated,
    Executed,
    Error,
}

impl ContextEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContextEventKind::Created => "created",
            ContextEventKind::Switched => "switched",
            ContextEventKind::Validated => "validated",
            ContextEventKind::Executed => "executed",
            ContextEventKind::Error => "error",
        }
    }
}

/// Lifecycle record published to observers. Not retained by the manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEvent {
    #[serde(rename = "type")]
    pub kind: ContextEventKind,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub workspace_id: Option<String>,
    pub tool_name: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ContextEvent {
    pub fn new(kind: ContextEventKind, request_id: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            request_id: request_id.into(),
            workspace_id: None,
            tool_name: None,
            data: serde_json::Value::Null,
        }
    }

    pub fn workspace(mut self, workspace_id: Option<&str>) -> Self {
        self.workspace_id = workspace_id.map(str::to_string);
        self
    }

    pub fn tool(mut self, tool_name: &str) -> Self {
        self.tool_name = Some(tool_name.to_string());
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// A jump from one workspace to another. Only lives inside a `switched` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchOperation {
    pub from_workspace_id: Option<String>,
    pub to_workspace_id: String,
    pub preserve_auth: bool,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}
