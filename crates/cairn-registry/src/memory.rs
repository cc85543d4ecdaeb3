use std::{collections::BTreeMap, path::Path, sync::Arc};

use anyhow::{Context, Result};
use tokio::sync::{broadcast, RwLock};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

use cairn_common::WorkspaceConfig;

use crate::types::{WorkspaceChange, WorkspaceChangeStream, WorkspaceRegistry};

#[derive(Debug, Clone)]
pub struct MemoryWorkspaceRegistry {
    inner: Arc<RwLock<Inner>>,
    tx: broadcast::Sender<WorkspaceChange>,
}

#[derive(Debug, Default)]
struct Inner {
    revision: u64,
    by_id: BTreeMap<String, WorkspaceConfig>,
    slug_to_id: BTreeMap<String, String>,
}

impl MemoryWorkspaceRegistry {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            tx,
        }
    }

    pub async fn with_workspaces(workspaces: impl IntoIterator<Item = WorkspaceConfig>) -> Self {
        let registry = Self::new();
        for ws in workspaces {
            registry.upsert(ws).await;
        }
        registry
    }

    /// Load a JSON array of workspace records.
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading workspaces file {}", path.display()))?;
        let workspaces: Vec<WorkspaceConfig> = serde_json::from_slice(&raw)
            .with_context(|| format!("parsing workspaces file {}", path.display()))?;
        tracing::info!(path=%path.display(), count = workspaces.len(), "loaded workspaces");
        Ok(Self::with_workspaces(workspaces).await)
    }

    fn next_revision(inner: &mut Inner) -> u64 {
        inner.revision = inner.revision.saturating_add(1);
        inner.revision
    }

    fn emit(&self, change: WorkspaceChange) {
        let _ = self.tx.send(change);
    }

    pub async fn upsert(&self, workspace: WorkspaceConfig) -> u64 {
        let change = {
            let mut inner = self.inner.write().await;
            let rev = Self::next_revision(&mut inner);
            if let Some(old) = inner.by_id.get(&workspace.id) {
                let old_slug = old.slug.clone();
                inner.slug_to_id.remove(&old_slug);
            }
            inner
                .slug_to_id
                .insert(workspace.slug.clone(), workspace.id.clone());
            inner.by_id.insert(workspace.id.clone(), workspace.clone());
            WorkspaceChange {
                id: workspace.id.clone(),
                workspace: Some(workspace),
                revision: rev,
            }
        };
        let rev = change.revision;
        self.emit(change);
        rev
    }

    pub async fn remove(&self, id: &str) -> bool {
        let change = {
            let mut inner = self.inner.write().await;
            let Some(old) = inner.by_id.remove(id) else {
                return false;
            };
            inner.slug_to_id.remove(&old.slug);
            let rev = Self::next_revision(&mut inner);
            WorkspaceChange {
                id: id.to_string(),
                workspace: None,
                revision: rev,
            }
        };
        self.emit(change);
        true
    }

    pub fn watch(&self) -> WorkspaceChangeStream {
        let stream = BroadcastStream::new(self.tx.subscribe()).filter_map(|msg| msg.ok());
        Box::pin(stream)
    }
}

impl Default for MemoryWorkspaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl WorkspaceRegistry for MemoryWorkspaceRegistry {
    async fn get_workspace(&self, id_or_slug: &str) -> Result<Option<WorkspaceConfig>> {
        let inner = self.inner.read().await;
        if let Some(ws) = inner.by_id.get(id_or_slug) {
            return Ok(Some(ws.clone()));
        }
        Ok(inner
            .slug_to_id
            .get(id_or_slug)
            .and_then(|id| inner.by_id.get(id))
            .cloned())
    }

    async fn list_workspaces(&self) -> Result<Vec<WorkspaceConfig>> {
        let inner = self.inner.read().await;
        Ok(inner.by_id.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_common::{WorkspaceAuth, WorkspaceStatus};

    fn ws(id: &str, slug: &str) -> WorkspaceConfig {
        WorkspaceConfig {
            id: id.to_string(),
            slug: slug.to_string(),
            base_url: "https://api.bitbucket.org/2.0".to_string(),
            status: WorkspaceStatus::Active,
            auth: WorkspaceAuth::default(),
        }
    }

    #[tokio::test]
    async fn resolves_by_id_and_slug() {
        let reg = MemoryWorkspaceRegistry::with_workspaces([ws("ws1", "team-one")]).await;

        assert_eq!(reg.get_workspace("ws1").await.unwrap().unwrap().slug, "team-one");
        assert_eq!(reg.get_workspace("team-one").await.unwrap().unwrap().id, "ws1");
        assert!(reg.get_workspace("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_with_new_slug_drops_old_slug() {
        let reg = MemoryWorkspaceRegistry::with_workspaces([ws("ws1", "old")]).await;
        reg.upsert(ws("ws1", "new")).await;

        assert!(reg.get_workspace("old").await.unwrap().is_none());
        assert!(reg.get_workspace("new").await.unwrap().is_some());
        assert_eq!(reg.list_workspaces().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn watch_reports_upserts_and_removals() {
        let reg = MemoryWorkspaceRegistry::new();
        let mut changes = reg.watch();

        reg.upsert(ws("ws1", "one")).await;
        assert!(reg.remove("ws1").await);
        assert!(!reg.remove("ws1").await);

        let first = changes.next().await.unwrap();
        assert_eq!(first.id, "ws1");
        assert!(first.workspace.is_some());
        let second = changes.next().await.unwrap();
        assert!(second.workspace.is_none());
        assert!(second.revision > first.revision);
    }
}
