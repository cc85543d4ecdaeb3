use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use cairn_common::{
    AuthContext, ContextEvent, ContextEventKind, ExecutionContext, Metadata, MetadataValue,
    SwitchOperation,
};

use crate::error::{ContextError, Result};
use crate::factory::ContextDraft;
use crate::manager::{ContextManager, Lookup};

const SWITCH_TOOL_NAME: &str = "context_switch";

impl ContextManager {
    /// Derive a context bound to `to_workspace_id` from `current`.
    ///
    /// Failures always come back as typed errors and leave the stack as it was.
    pub async fn switch_context(
        &self,
        current: Option<&Arc<ExecutionContext>>,
        to_workspace_id: &str,
        preserve_auth: bool,
        reason: &str,
    ) -> Result<Arc<ExecutionContext>> {
        let result = self
            .try_switch(current, to_workspace_id, preserve_auth, reason)
            .await;
        if let Err(e) = &result {
            self.counters.switch_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                to_workspace_id,
                from = current.map(|c| c.request_id.as_str()).unwrap_or("-"),
                code = e.code(),
                error=%e,
                "context switch failed"
            );
            let mut event = ContextEvent::new(
                ContextEventKind::Error,
                current.map(|c| c.request_id.as_str()).unwrap_or_default(),
            )
            .workspace(Some(to_workspace_id))
            .data(json!({"operation": "switch", "code": e.code(), "message": e.to_string()}));
            if let Some(c) = current {
                event = event.tool(&c.tool_name);
            }
            self.emit(event);
        }
        result
    }

    async fn try_switch(
        &self,
        current: Option<&Arc<ExecutionContext>>,
        to_workspace_id: &str,
        preserve_auth: bool,
        reason: &str,
    ) -> Result<Arc<ExecutionContext>> {
        if !self.config.enable_context_switching {
            return Err(ContextError::PermissionDenied(
                "context switching is disabled".to_string(),
            ));
        }
        if to_workspace_id.trim().is_empty() {
            return Err(ContextError::invalid("toWorkspaceId", "must not be empty"));
        }

        let target = match self.lookup(to_workspace_id).await {
            Lookup::Found(ws) => ws,
            Lookup::Missing => {
                return Err(ContextError::WorkspaceNotFound(to_workspace_id.to_string()))
            }
            Lookup::Failed(message) => {
                return Err(ContextError::ConnectionFailed {
                    workspace_id: to_workspace_id.to_string(),
                    message,
                })
            }
        };
        if !target.is_active() {
            return Err(ContextError::WorkspaceUnavailable {
                workspace_id: to_workspace_id.to_string(),
                status: target.status,
            });
        }

        let from_workspace_id = current.and_then(|c| c.workspace_id.clone());
        let operation = SwitchOperation {
            from_workspace_id: from_workspace_id.clone(),
            to_workspace_id: target.id.clone(),
            preserve_auth,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        };

        let mut auth = AuthContext::from_workspace(&target);
        if preserve_auth {
            if let Some(prior) = current.and_then(|c| c.auth.as_ref()) {
                auth = auth.carry_over(prior);
            }
        }

        let mut metadata = Metadata::new();
        metadata.insert("switch_reason".to_string(), MetadataValue::from(reason));
        if let Some(from) = &from_workspace_id {
            metadata.insert("switched_from".to_string(), MetadataValue::from(from.as_str()));
        }

        let tool_name = current
            .map(|c| c.tool_name.clone())
            .unwrap_or_else(|| SWITCH_TOOL_NAME.to_string());
        let workspace_id = target.id.clone();
        let context = self
            .build_context(ContextDraft {
                tool_name: &tool_name,
                workspace_id: Some(&workspace_id),
                workspace: Some(target),
                auth: Some(auth),
                parent: current,
                metadata,
            })
            .await?;
        self.counters.switched.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            request_id=%context.request_id,
            from = from_workspace_id.as_deref().unwrap_or("-"),
            to=%workspace_id,
            preserve_auth,
            reason,
            "switched workspace context"
        );
        self.emit(
            ContextEvent::new(ContextEventKind::Switched, &context.request_id)
                .workspace(Some(&workspace_id))
                .tool(&context.tool_name)
                .data(json!({
                    "operation": operation,
                    "previous": current.map(|c| c.snapshot()),
                })),
        );
        Ok(context)
    }
}
