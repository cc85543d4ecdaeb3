use serde::{Deserialize, Serialize};

use crate::workspace::{AuthMethod, WorkspaceConfig};

// ── AuthContext ──────────────────────────────────────────────────────
// Non-secret view of the credentials backing a call. `base_url` and
// `workspace_id` are bound to the workspace they were derived from; the
// remaining fields describe the caller and may follow it across a switch.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AuthContext {
    pub method: AuthMethod,
    pub principal: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub base_url: Option<String>,
    pub workspace_id: Option<String>,
}

impl AuthContext {
    pub fn from_workspace(cfg: &WorkspaceConfig) -> Self {
        Self {
            method: cfg.auth.method,
            principal: cfg.auth.username.clone(),
            scopes: cfg.auth.scopes.clone(),
            base_url: Some(cfg.base_url.clone()),
            workspace_id: Some(cfg.id.clone()),
        }
    }

    /// Keep the caller-scoped fields of `prior` and take the workspace-bound
    /// ones from `self`.
    pub fn carry_over(self, prior: &AuthContext) -> Self {
        let mut scopes = prior.scopes.clone();
        for scope in self.scopes {
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        Self {
            method: if prior.method == AuthMethod::None {
                self.method
            } else {
                prior.method
            },
            principal: prior.principal.clone().or(self.principal),
            scopes,
            base_url: self.base_url,
            workspace_id: self.workspace_id,
        }
    }
}
