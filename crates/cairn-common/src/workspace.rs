use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WorkspaceStatus {
    Active,
    Suspended,
    Archived,
    Pending,
    Other(String),
}

impl WorkspaceStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, WorkspaceStatus::Active)
    }

    pub fn as_str(&self) -> &str {
        match self {
            WorkspaceStatus::Active => "active",
            WorkspaceStatus::Suspended => "suspended",
            WorkspaceStatus::Archived => "archived",
            WorkspaceStatus::Pending => "pending",
            WorkspaceStatus::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for WorkspaceStatus {
    fn from(raw: String) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "active" => WorkspaceStatus::Active,
            "suspended" => WorkspaceStatus::Suspended,
            "archived" => WorkspaceStatus::Archived,
            "pending" => WorkspaceStatus::Pending,
            _ => WorkspaceStatus::Other(raw),
        }
    }
}

impl From<WorkspaceStatus> for String {
    fn from(status: WorkspaceStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for WorkspaceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    AppPassword,
    Oauth,
    AccessToken,
    #[default]
    None,
}

/// Credentials as the registry stores them. The secret is accepted on input
/// but never serialized back out, and `Debug` redacts it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WorkspaceAuth {
    #[serde(default)]
    pub method: AuthMethod,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for WorkspaceAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceAuth")
            .field("method", &self.method)
            .field("username", &self.username)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Read snapshot of a registry record. The registry owns the live copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub id: String,
    pub slug: String,
    pub base_url: String,
    pub status: WorkspaceStatus,
    #[serde(default)]
    pub auth: WorkspaceAuth,
}

impl WorkspaceConfig {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// True when `key` names this workspace by id or by slug.
    pub fn matches(&self, key: &str) -> bool {
        self.id == key || self.slug == key
    }

    pub fn summary(&self) -> WorkspaceSummary {
        WorkspaceSummary {
            id: self.id.clone(),
            slug: self.slug.clone(),
            base_url: self.base_url.clone(),
            status: self.status.clone(),
        }
    }
}

/// Redacted view of a workspace handed to tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceSummary {
    pub id: String,
    pub slug: String,
    pub base_url: String,
    pub status: WorkspaceStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_known_and_unknown_values() {
        let s: WorkspaceStatus = serde_json::from_str("\"ACTIVE\"").unwrap();
        assert_eq!(s, WorkspaceStatus::Active);
        let s: WorkspaceStatus = serde_json::from_str("\"frozen\"").unwrap();
        assert_eq!(s, WorkspaceStatus::Other("frozen".to_string()));
        assert!(!s.is_active());
        assert_eq!(serde_json::to_string(&WorkspaceStatus::Suspended).unwrap(), "\"suspended\"");
    }

    #[test]
    fn secret_is_never_serialized_or_debug_printed() {
        let cfg: WorkspaceConfig = serde_json::from_value(serde_json::json!({
            "id": "ws1",
            "slug": "team-one",
            "base_url": "https://api.bitbucket.org/2.0",
            "status": "active",
            "auth": {"method": "app_password", "username": "bot", "secret": "hunter2"}
        }))
        .unwrap();

        assert_eq!(cfg.auth.secret.as_deref(), Some("hunter2"));
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!format!("{cfg:?}").contains("hunter2"));
    }
}
