use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::AuthContext;
use crate::metadata::Metadata;
use crate::workspace::WorkspaceConfig;

/// Per-call bundle of identifiers, optional workspace binding and metadata.
///
/// Contexts are immutable once built and shared as `Arc<ExecutionContext>`.
/// The parent link is weak: a switched context never keeps its predecessor
/// alive, `parent_request_id` records the lineage regardless.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionContext {
    pub request_id: String,
    pub tool_name: String,
    pub workspace_id: Option<String>,
    pub workspace: Option<WorkspaceConfig>,
    pub auth: Option<AuthContext>,
    pub parent_request_id: Option<String>,
    #[serde(skip)]
    pub parent: Weak<ExecutionContext>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn parent(&self) -> Option<Arc<ExecutionContext>> {
        self.parent.upgrade()
    }

    /// A workspace id was requested and a registry snapshot is attached.
    pub fn is_bound(&self) -> bool {
        self.workspace.is_some()
    }

    /// A workspace id was requested but could not be resolved.
    pub fn is_degraded(&self) -> bool {
        self.workspace_id.is_some() && self.workspace.is_none()
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            request_id: self.request_id.clone(),
            tool_name: self.tool_name.clone(),
            workspace_id: self.workspace_id.clone(),
            created_at: self.created_at,
        }
    }
}

/// Small serializable summary used in events and listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSnapshot {
    pub request_id: String,
    pub tool_name: String,
    pub workspace_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
