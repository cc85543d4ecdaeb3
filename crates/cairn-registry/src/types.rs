use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};

use cairn_common::WorkspaceConfig;

/// Change notification from a registry that supports watching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceChange {
    pub id: String,
    /// New record, or `None` when the workspace was removed.
    pub workspace: Option<WorkspaceConfig>,
    pub revision: u64,
}

pub type WorkspaceChangeStream = Pin<Box<dyn Stream<Item = WorkspaceChange> + Send>>;

/// Lookup contract of the workspace registry.
///
/// `Ok(None)` means the registry answered and has no such workspace; `Err`
/// means the registry could not be reached or answered garbage.
#[async_trait]
pub trait WorkspaceRegistry: Send + Sync {
    async fn get_workspace(&self, id_or_slug: &str) -> Result<Option<WorkspaceConfig>>;
    async fn list_workspaces(&self) -> Result<Vec<WorkspaceConfig>>;
}
