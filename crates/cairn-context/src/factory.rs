use std::sync::atomic::Ordering;
use std::sync::{Arc, LazyLock, Weak};

use chrono::{SecondsFormat, Utc};
use serde_json::json;

use cairn_common::{
    AuthContext, ContextEvent, ContextEventKind, ExecutionContext, Metadata, MetadataValue,
    WorkspaceConfig,
};

use crate::config::WorkspacePolicy;
use crate::error::{ContextError, Result};
use crate::ids::REQUEST_ID_PATTERN;
use crate::manager::{ContextManager, Lookup};
use crate::validation::{FieldRule, FieldViolation, InputShape};

const MAX_METADATA_KEYS: usize = 64;
const MAX_METADATA_DEPTH: usize = 8;
const MAX_METADATA_TEXT: usize = 4096;

static INPUT_SHAPE: LazyLock<InputShape> = LazyLock::new(|| {
    InputShape::new(vec![
        FieldRule::string("toolName")
            .required()
            .length(Some(1), Some(128))
            .pattern(r"^[A-Za-z0-9_.:\-]+$"),
        FieldRule::string("workspaceId").length(Some(1), Some(128)),
    ])
});

static ENVELOPE_SHAPE: LazyLock<InputShape> = LazyLock::new(|| {
    InputShape::new(vec![
        FieldRule::string("requestId").required().pattern(REQUEST_ID_PATTERN),
        FieldRule::string("timestamp")
            .required()
            .pattern(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+\-]\d{2}:\d{2})$"),
        FieldRule::string("parentRequestId").pattern(REQUEST_ID_PATTERN),
    ])
});

fn longest_text(value: &MetadataValue) -> usize {
    match value {
        MetadataValue::Text(s) => s.chars().count(),
        MetadataValue::List(items) => items.iter().map(longest_text).max().unwrap_or(0),
        MetadataValue::Map(map) => map
            .iter()
            .map(|(k, v)| k.chars().count().max(longest_text(v)))
            .max()
            .unwrap_or(0),
        _ => 0,
    }
}

fn metadata_violations(metadata: &Metadata) -> Vec<FieldViolation> {
    let mut out = Vec::new();
    if metadata.len() > MAX_METADATA_KEYS {
        out.push(FieldViolation::new(
            "metadata",
            format!("has {} keys, at most {MAX_METADATA_KEYS} allowed", metadata.len()),
        ));
    }
    for (key, value) in metadata {
        let field = format!("metadata.{key}");
        let key_ok = !key.is_empty()
            && key.len() <= 64
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !key_ok {
            out.push(FieldViolation::new(&field, "key must be 1-64 characters of [A-Za-z0-9_.-]"));
        }
        if value.depth() > MAX_METADATA_DEPTH {
            out.push(FieldViolation::new(
                &field,
                format!("nested deeper than {MAX_METADATA_DEPTH} levels"),
            ));
        }
        if longest_text(value) > MAX_METADATA_TEXT {
            out.push(FieldViolation::new(
                &field,
                format!("contains text longer than {MAX_METADATA_TEXT} characters"),
            ));
        }
        if let MetadataValue::Float(f) = value {
            if !f.is_finite() {
                out.push(FieldViolation::new(&field, "must be a finite number"));
            }
        }
    }
    out
}

/// Caller-supplied inputs, checked before any registry round trip.
pub(crate) fn validate_inputs(
    tool_name: &str,
    workspace_id: Option<&str>,
    metadata: &Metadata,
) -> Vec<FieldViolation> {
    let input = json!({
        "toolName": tool_name,
        "workspaceId": workspace_id,
    });
    let mut violations = INPUT_SHAPE.validate(&input);
    violations.extend(metadata_violations(metadata));
    violations
}

/// Structural check of everything that goes into a new context.
pub(crate) fn validate_creation(
    request_id: &str,
    tool_name: &str,
    workspace_id: Option<&str>,
    timestamp: &str,
    parent_request_id: Option<&str>,
    metadata: &Metadata,
) -> Vec<FieldViolation> {
    let envelope = json!({
        "requestId": request_id,
        "timestamp": timestamp,
        "parentRequestId": parent_request_id,
    });
    let mut violations = ENVELOPE_SHAPE.validate(&envelope);
    violations.extend(validate_inputs(tool_name, workspace_id, metadata));
    violations
}

/// Everything needed to build a context once the workspace question is settled.
pub(crate) struct ContextDraft<'a> {
    pub tool_name: &'a str,
    pub workspace_id: Option<&'a str>,
    pub workspace: Option<WorkspaceConfig>,
    pub auth: Option<AuthContext>,
    pub parent: Option<&'a Arc<ExecutionContext>>,
    pub metadata: Metadata,
}

impl ContextManager {
    /// Create a context, bind it to `workspace_id` when given, and push it.
    ///
    /// With the default `degrade` policy an unresolvable workspace yields an
    /// unbound context and a warning; with `strict` it is an error.
    pub async fn create_context(
        &self,
        tool_name: &str,
        workspace_id: Option<&str>,
        parent: Option<&Arc<ExecutionContext>>,
        metadata: Metadata,
    ) -> Result<Arc<ExecutionContext>> {
        let violations = validate_inputs(tool_name, workspace_id, &metadata);
        if !violations.is_empty() {
            tracing::warn!(tool = tool_name, count = violations.len(), "rejected context creation");
            return Err(ContextError::InvalidConfiguration { violations });
        }

        let (workspace, auth) = match workspace_id {
            Some(key) => self.bind_workspace(tool_name, key).await?,
            None => (None, None),
        };
        // A bound context carries the canonical id even when the caller used a slug.
        let canonical = workspace.as_ref().map(|ws| ws.id.clone());
        if let (Some(id), Some(key)) = (canonical.as_deref(), workspace_id) {
            if id != key {
                tracing::debug!(workspace_key = key, workspace_id = id, "resolved workspace slug");
            }
        }
        self.build_context(ContextDraft {
            tool_name,
            workspace_id: canonical.as_deref().or(workspace_id),
            workspace,
            auth,
            parent,
            metadata,
        })
        .await
    }

    async fn bind_workspace(
        &self,
        tool_name: &str,
        workspace_id: &str,
    ) -> Result<(Option<WorkspaceConfig>, Option<AuthContext>)> {
        let strict = self.config.unresolved_workspace_policy == WorkspacePolicy::Strict;
        match self.lookup(workspace_id).await {
            Lookup::Found(ws) => {
                if !ws.is_active() {
                    if strict {
                        return Err(ContextError::WorkspaceUnavailable {
                            workspace_id: workspace_id.to_string(),
                            status: ws.status,
                        });
                    }
                    tracing::warn!(
                        workspace_id,
                        tool = tool_name,
                        status=%ws.status,
                        "binding context to a workspace that is not active"
                    );
                }
                let auth = AuthContext::from_workspace(&ws);
                Ok((Some(ws), Some(auth)))
            }
            Lookup::Missing => {
                if strict {
                    return Err(ContextError::WorkspaceNotFound(workspace_id.to_string()));
                }
                self.counters.degraded.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(workspace_id, tool = tool_name, "workspace not found, context left unbound");
                Ok((None, None))
            }
            Lookup::Failed(message) => {
                if strict {
                    return Err(ContextError::ConnectionFailed {
                        workspace_id: workspace_id.to_string(),
                        message,
                    });
                }
                self.counters.degraded.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    workspace_id,
                    tool = tool_name,
                    error=%message,
                    "workspace lookup failed, context left unbound"
                );
                Ok((None, None))
            }
        }
    }

    /// Validate, assemble, push and announce a context.
    pub(crate) async fn build_context(&self, draft: ContextDraft<'_>) -> Result<Arc<ExecutionContext>> {
        let request_id = self.ids.next_id();
        let created_at = Utc::now();
        let parent_request_id = draft.parent.map(|p| p.request_id.clone());

        let violations = validate_creation(
            &request_id,
            draft.tool_name,
            draft.workspace_id,
            &created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            parent_request_id.as_deref(),
            &draft.metadata,
        );
        if !violations.is_empty() {
            tracing::warn!(tool = draft.tool_name, count = violations.len(), "rejected context creation");
            return Err(ContextError::InvalidConfiguration { violations });
        }

        let context = ExecutionContext {
            request_id,
            tool_name: draft.tool_name.to_string(),
            workspace_id: draft.workspace_id.map(str::to_string),
            workspace: draft.workspace,
            auth: draft.auth,
            parent_request_id,
            parent: draft.parent.map(Arc::downgrade).unwrap_or_else(Weak::new),
            metadata: draft.metadata,
            created_at,
        };
        let context = self.insert(context).await;
        self.counters.created.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            request_id=%context.request_id,
            tool=%context.tool_name,
            workspace_id = context.workspace_id.as_deref().unwrap_or("-"),
            bound = context.is_bound(),
            "context created"
        );
        self.emit(
            ContextEvent::new(ContextEventKind::Created, &context.request_id)
                .workspace(context.workspace_id.as_deref())
                .tool(&context.tool_name)
                .data(json!({
                    "bound": context.is_bound(),
                    "degraded": context.is_degraded(),
                    "parent_request_id": context.parent_request_id,
                })),
        );
        Ok(context)
    }
}
