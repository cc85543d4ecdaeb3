use std::sync::atomic::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use cairn_common::{
    AuthContext, ContextEvent, ContextEventKind, ExecutionContext, WorkspaceConfig,
    WorkspaceSummary,
};

use crate::error::ContextError;
use crate::manager::{ContextManager, Lookup};

const DEFAULT_WORKSPACE_PARAMETER: &str = "workspace";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceOptions {
    pub validate_workspace: bool,
    pub require_auth: bool,
    pub preserve_original: bool,
    pub add_workspace_context: bool,
}

impl Default for EnhanceOptions {
    fn default() -> Self {
        Self {
            validate_workspace: true,
            require_auth: false,
            preserve_original: true,
            add_workspace_context: true,
        }
    }
}

/// Workspace named by a call, canonicalized when it was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRef {
    pub id: Option<String>,
    pub slug: Option<String>,
    pub config: Option<WorkspaceSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedParameters {
    pub tool_name: String,
    /// Untouched copy of the caller's parameters.
    pub original: Option<Value>,
    pub parameters: Value,
    pub workspace: Option<WorkspaceRef>,
    pub auth: Option<AuthContext>,
    pub validation: ValidationResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct WorkspaceIdentity {
    id: Option<String>,
    slug: Option<String>,
}

impl WorkspaceIdentity {
    fn key(&self) -> &str {
        self.id.as_deref().or(self.slug.as_deref()).unwrap_or_default()
    }

    fn matches(&self, ws: &WorkspaceConfig) -> bool {
        self.id.as_deref().map_or(true, |id| ws.matches(id))
            && self.slug.as_deref().map_or(true, |slug| ws.slug == slug)
    }
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Nested `{id, slug}` under `key` wins over top-level `workspaceId`/`workspaceSlug`.
fn workspace_identity(params: &Value, key: &str) -> Option<WorkspaceIdentity> {
    let obj = params.as_object()?;
    match obj.get(key) {
        Some(Value::Object(nested)) => {
            let identity = WorkspaceIdentity {
                id: non_empty(nested.get("id")),
                slug: non_empty(nested.get("slug")),
            };
            if identity.id.is_some() || identity.slug.is_some() {
                return Some(identity);
            }
        }
        Some(v @ Value::String(_)) => {
            if let Some(id) = non_empty(Some(v)) {
                return Some(WorkspaceIdentity { id: Some(id), slug: None });
            }
        }
        _ => {}
    }
    let identity = WorkspaceIdentity {
        id: non_empty(obj.get("workspaceId")),
        slug: non_empty(obj.get("workspaceSlug")),
    };
    (identity.id.is_some() || identity.slug.is_some()).then_some(identity)
}

impl ContextManager {
    /// Validate and augment the parameters of one tool call.
    ///
    /// Problems end up in `validation.errors`; this never fails and never
    /// touches `params`.
    pub async fn enhance_parameters(
        &self,
        ctx: Option<&ExecutionContext>,
        tool_name: &str,
        params: &Value,
        options: EnhanceOptions,
    ) -> EnhancedParameters {
        let schema = self.schemas.get(tool_name);
        let param_key = schema
            .as_ref()
            .map(|s| s.workspace_parameter_name.as_str())
            .unwrap_or(DEFAULT_WORKSPACE_PARAMETER);
        let mut errors = Vec::new();
        let mut parameters = params.clone();

        if !params.is_object() {
            errors.push("parameters: expected an object".to_string());
        }

        let identity = workspace_identity(params, param_key);
        let mut resolved: Option<WorkspaceConfig> = None;
        match &identity {
            Some(identity) if options.validate_workspace => {
                let key = identity.key();
                match self.lookup(key).await {
                    Lookup::Found(ws) if !ws.is_active() => {
                        errors.push(
                            ContextError::WorkspaceUnavailable {
                                workspace_id: key.to_string(),
                                status: ws.status,
                            }
                            .to_string(),
                        );
                    }
                    Lookup::Found(ws) if !identity.matches(&ws) => {
                        errors.push(format!(
                            "{param_key}: id '{}' and slug '{}' name different workspaces",
                            identity.id.as_deref().unwrap_or_default(),
                            identity.slug.as_deref().unwrap_or_default(),
                        ));
                    }
                    Lookup::Found(ws) => resolved = Some(ws),
                    Lookup::Missing => {
                        errors.push(ContextError::WorkspaceNotFound(key.to_string()).to_string());
                    }
                    Lookup::Failed(message) => {
                        errors.push(
                            ContextError::ConnectionFailed {
                                workspace_id: key.to_string(),
                                message,
                            }
                            .to_string(),
                        );
                    }
                }
            }
            Some(_) => {}
            None => {
                if schema.as_ref().is_some_and(|s| s.requires_workspace) {
                    errors.push(format!("{param_key}: tool '{tool_name}' requires a workspace"));
                }
            }
        }

        let mut workspace = None;
        if options.add_workspace_context {
            workspace = match (&resolved, &identity) {
                (Some(ws), _) => Some(WorkspaceRef {
                    id: Some(ws.id.clone()),
                    slug: Some(ws.slug.clone()),
                    config: Some(ws.summary()),
                }),
                (None, Some(identity)) if !options.validate_workspace => Some(WorkspaceRef {
                    id: identity.id.clone(),
                    slug: identity.slug.clone(),
                    config: None,
                }),
                _ => None,
            };
            if let (Some(ws), Some(obj)) = (&resolved, parameters.as_object_mut()) {
                let mut canonical = Map::new();
                canonical.insert("id".to_string(), Value::String(ws.id.clone()));
                canonical.insert("slug".to_string(), Value::String(ws.slug.clone()));
                obj.insert(param_key.to_string(), Value::Object(canonical));
            }
        }

        let needs_auth =
            options.require_auth || schema.as_ref().is_some_and(|s| s.authentication_required);
        let mut auth = None;
        if needs_auth {
            auth = match &resolved {
                Some(ws) => Some(AuthContext::from_workspace(ws)),
                None => ctx.and_then(|c| c.auth.clone()).filter(|a| match &identity {
                    Some(identity) => a
                        .workspace_id
                        .as_deref()
                        .is_some_and(|id| identity.id.as_deref() == Some(id)),
                    None => true,
                }),
            };
            if auth.is_none() {
                errors.push(format!(
                    "auth: tool '{tool_name}' requires authentication but no credentials are available"
                ));
            }
        }

        if self.config.validate_parameters && params.is_object() {
            if let Some(schema) = &schema {
                errors.extend(schema.input.validate(params).iter().map(ToString::to_string));
            }
        }

        let valid = errors.is_empty();
        self.counters.validations.fetch_add(1, Ordering::Relaxed);
        if !valid {
            self.counters.validation_failures.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(tool = tool_name, errors = errors.len(), "tool parameters rejected");
        }

        let request_id = ctx.map(|c| c.request_id.as_str()).unwrap_or_default();
        let event_workspace = resolved
            .as_ref()
            .map(|ws| ws.id.as_str())
            .or_else(|| identity.as_ref().and_then(|i| i.id.as_deref()));
        self.emit(
            ContextEvent::new(ContextEventKind::Validated, request_id)
                .workspace(event_workspace)
                .tool(tool_name)
                .data(json!({"valid": valid, "errors": errors})),
        );

        EnhancedParameters {
            tool_name: tool_name.to_string(),
            original: options.preserve_original.then(|| params.clone()),
            parameters,
            workspace,
            auth,
            validation: ValidationResult { valid, errors },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use cairn_common::{Metadata, WorkspaceAuth, WorkspaceStatus};
    use cairn_registry::MemoryWorkspaceRegistry;

    use crate::config::ContextConfig;
    use crate::events::BroadcastPublisher;
    use crate::schema::ToolSchema;
    use crate::validation::{FieldRule, InputShape};

    fn ws(id: &str, status: WorkspaceStatus) -> WorkspaceConfig {
        WorkspaceConfig {
            id: id.to_string(),
            slug: format!("{id}-slug"),
            base_url: format!("https://{id}.example.com"),
            status,
            auth: WorkspaceAuth {
                username: Some("bot".to_string()),
                secret: Some("pw".to_string()),
                ..Default::default()
            },
        }
    }

    async fn manager(config: ContextConfig) -> (Arc<ContextManager>, BroadcastPublisher) {
        let registry = MemoryWorkspaceRegistry::with_workspaces([
            ws("ws1", WorkspaceStatus::Active),
            ws("ws2", WorkspaceStatus::Active),
            ws("ws-suspended", WorkspaceStatus::Suspended),
        ])
        .await;
        let publisher = BroadcastPublisher::new(64);
        let m = ContextManager::new(config, Arc::new(registry), Arc::new(publisher.clone())).unwrap();
        let mut schema = ToolSchema::new(
            "list_pull_requests",
            InputShape::new(vec![
                FieldRule::string("repo_slug").required(),
                FieldRule::string("state").one_of(&["OPEN", "MERGED", "DECLINED"]),
            ]),
        );
        schema.supports_multi_workspace = true;
        m.register_tool_schema(schema);
        (m, publisher)
    }

    #[tokio::test]
    async fn suspended_workspace_is_invalid_without_failing() {
        let (m, _) = manager(ContextConfig::default()).await;
        let params = json!({"workspaceId": "ws-suspended", "repo_slug": "api"});

        let out = m
            .enhance_parameters(None, "list_pull_requests", &params, EnhanceOptions::default())
            .await;

        assert!(!out.validation.valid);
        assert_eq!(out.validation.errors.len(), 1);
        assert!(out.validation.errors[0].contains("unavailable"));
        assert!(out.workspace.is_none());
        let stats = m.stats().await;
        assert_eq!(stats.validations_total, 1);
        assert_eq!(stats.validation_failures_total, 1);
    }

    #[tokio::test]
    async fn resolves_workspace_and_never_touches_caller_params() {
        let (m, publisher) = manager(ContextConfig::default()).await;
        let mut events = publisher.receiver();
        let params = json!({"workspace": {"id": "ws1"}, "repo_slug": "api"});
        let before = params.clone();

        let out = m
            .enhance_parameters(None, "list_pull_requests", &params, EnhanceOptions::default())
            .await;

        assert!(out.validation.valid, "{:?}", out.validation.errors);
        assert_eq!(params, before);
        assert_eq!(out.original, Some(before));
        assert_eq!(out.parameters["workspace"], json!({"id": "ws1", "slug": "ws1-slug"}));
        let summary = out.workspace.unwrap().config.unwrap();
        assert_eq!(summary.base_url, "https://ws1.example.com");

        let ev = events.recv().await.unwrap();
        assert_eq!(ev.kind, ContextEventKind::Validated);
        assert_eq!(ev.data["valid"], true);
    }

    #[tokio::test]
    async fn nested_identity_wins_over_top_level() {
        let (m, _) = manager(ContextConfig::default()).await;
        let params = json!({
            "workspace": {"slug": "ws2-slug"},
            "workspaceId": "ws-suspended",
            "repo_slug": "api",
        });

        let out = m
            .enhance_parameters(None, "list_pull_requests", &params, EnhanceOptions::default())
            .await;

        assert!(out.validation.valid, "{:?}", out.validation.errors);
        assert_eq!(out.workspace.unwrap().id.as_deref(), Some("ws2"));
    }

    #[tokio::test]
    async fn schema_and_workspace_errors_are_merged() {
        let (m, _) = manager(ContextConfig::default()).await;
        let params = json!({"workspaceId": "ghost", "state": "WHATEVER"});

        let out = m
            .enhance_parameters(None, "list_pull_requests", &params, EnhanceOptions::default())
            .await;

        let errors = &out.validation.errors;
        assert_eq!(errors.len(), 3, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("'ghost' not found")));
        assert!(errors.iter().any(|e| e.starts_with("repo_slug:")));
        assert!(errors.iter().any(|e| e.starts_with("state:")));
    }

    #[tokio::test]
    async fn schema_checks_can_be_disabled() {
        let config = ContextConfig {
            validate_parameters: false,
            ..ContextConfig::default()
        };
        let (m, _) = manager(config).await;
        let out = m
            .enhance_parameters(None, "list_pull_requests", &json!({}), EnhanceOptions::default())
            .await;
        assert!(out.validation.valid);
    }

    #[tokio::test]
    async fn mismatched_id_and_slug_are_rejected() {
        let (m, _) = manager(ContextConfig::default()).await;
        let params = json!({"workspace": {"id": "ws1", "slug": "ws2-slug"}, "repo_slug": "api"});

        let out = m
            .enhance_parameters(None, "list_pull_requests", &params, EnhanceOptions::default())
            .await;

        assert!(!out.validation.valid);
        assert!(out.validation.errors[0].contains("different workspaces"));
    }

    #[tokio::test]
    async fn required_workspace_and_auth_are_enforced() {
        let (m, _) = manager(ContextConfig::default()).await;
        let mut schema = ToolSchema::new("merge_pull_request", InputShape::default());
        schema.requires_workspace = true;
        schema.authentication_required = true;
        m.register_tool_schema(schema);

        let out = m
            .enhance_parameters(None, "merge_pull_request", &json!({}), EnhanceOptions::default())
            .await;
        assert_eq!(out.validation.errors.len(), 2, "{:?}", out.validation.errors);

        let out = m
            .enhance_parameters(
                None,
                "merge_pull_request",
                &json!({"workspaceId": "ws1"}),
                EnhanceOptions::default(),
            )
            .await;
        assert!(out.validation.valid, "{:?}", out.validation.errors);
        let auth = out.auth.unwrap();
        assert_eq!(auth.principal.as_deref(), Some("bot"));
        assert_eq!(auth.workspace_id.as_deref(), Some("ws1"));
    }

    #[tokio::test]
    async fn auth_falls_back_to_calling_context() {
        let (m, _) = manager(ContextConfig::default()).await;
        let ctx = m.create_context("whoami", Some("ws1"), None, Metadata::new()).await.unwrap();
        let options = EnhanceOptions {
            require_auth: true,
            ..EnhanceOptions::default()
        };

        let out = m.enhance_parameters(Some(&ctx), "whoami", &json!({}), options).await;

        assert!(out.validation.valid, "{:?}", out.validation.errors);
        assert_eq!(out.auth.unwrap().workspace_id.as_deref(), Some("ws1"));
    }

    #[tokio::test]
    async fn unvalidated_identity_is_passed_through() {
        let (m, _) = manager(ContextConfig::default()).await;
        let options = EnhanceOptions {
            validate_workspace: false,
            preserve_original: false,
            ..EnhanceOptions::default()
        };

        let out = m
            .enhance_parameters(None, "unregistered", &json!({"workspaceId": "ghost"}), options)
            .await;

        assert!(out.validation.valid);
        assert!(out.original.is_none());
        let workspace = out.workspace.unwrap();
        assert_eq!(workspace.id.as_deref(), Some("ghost"));
        assert!(workspace.config.is_none());
    }

    #[tokio::test]
    async fn non_object_parameters_are_reported() {
        let (m, _) = manager(ContextConfig::default()).await;
        let out = m
            .enhance_parameters(None, "list_pull_requests", &json!([1, 2]), EnhanceOptions::default())
            .await;
        assert!(!out.validation.valid);
        assert_eq!(out.parameters, json!([1, 2]));
    }
}
