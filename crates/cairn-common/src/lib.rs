pub mod auth;
pub mod context;
pub mod event;
pub mod execution;
pub mod metadata;
pub mod workspace;

pub use auth::AuthContext;
pub use context::{ContextSnapshot, ExecutionContext};
pub use event::{ContextEvent, ContextEventKind, SwitchOperation};
pub use execution::{ExecutionResult, ToolError};
pub use metadata::{metadata_to_json, Metadata, MetadataValue};
pub use workspace::{AuthMethod, WorkspaceAuth, WorkspaceConfig, WorkspaceStatus, WorkspaceSummary};

pub mod telemetry;
