use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::validation::InputShape;

fn default_workspace_parameter() -> String {
    "workspace".to_string()
}

/// Declarative contract of one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input: InputShape,
    #[serde(default)]
    pub requires_workspace: bool,
    #[serde(default)]
    pub supports_multi_workspace: bool,
    /// Key of the nested `{id, slug}` object carrying the workspace identity.
    #[serde(default = "default_workspace_parameter")]
    pub workspace_parameter_name: String,
    #[serde(default)]
    pub authentication_required: bool,
}

impl ToolSchema {
    pub fn new(name: &str, input: InputShape) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            input,
            requires_workspace: false,
            supports_multi_workspace: false,
            workspace_parameter_name: default_workspace_parameter(),
            authentication_required: false,
        }
    }
}

/// Tool contracts keyed by name. Registration is last-write-wins.
#[derive(Debug, Default)]
pub struct ToolSchemaRegistry {
    schemas: DashMap<String, Arc<ToolSchema>>,
}

impl ToolSchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the schema this registration replaced, if any.
    pub fn register(&self, schema: ToolSchema) -> Option<Arc<ToolSchema>> {
        let name = schema.name.clone();
        let previous = self.schemas.insert(name.clone(), Arc::new(schema));
        if previous.is_some() {
            tracing::debug!(tool=%name, "tool schema replaced");
        }
        previous
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolSchema>> {
        self.schemas.get(name).map(|s| s.value().clone())
    }

    pub fn supports_workspace_context(&self, name: &str) -> bool {
        self.schemas
            .get(name)
            .map(|s| s.requires_workspace || s.supports_multi_workspace)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn list(&self) -> Vec<Arc<ToolSchema>> {
        let mut out: Vec<_> = self.schemas.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}
