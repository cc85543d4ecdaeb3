//! Workspace-aware execution contexts for tool calls.
//!
//! [`ContextManager`] creates contexts, switches them between workspaces,
//! validates tool parameters against registered schemas and records
//! execution results. A background sweeper expires old entries.

pub mod config;
pub mod enhance;
pub mod error;
pub mod events;
mod factory;
pub mod history;
pub mod ids;
pub mod manager;
pub mod schema;
pub mod stack;
mod switch;
pub mod sweeper;
pub mod validation;

pub use config::{ContextConfig, WorkspacePolicy};
pub use enhance::{EnhanceOptions, EnhancedParameters, ValidationResult, WorkspaceRef};
pub use error::{ContextError, Result};
pub use events::{
    BroadcastPublisher, EventPublisher, EventStream, FanoutPublisher, NoopPublisher,
    TracingPublisher,
};
pub use manager::{ContextManager, ContextStats, SweepReport};
pub use schema::{ToolSchema, ToolSchemaRegistry};
pub use stack::InFlightGuard;
pub use sweeper::{spawn_sweeper, SweeperHandle};
pub use validation::{FieldKind, FieldRule, FieldViolation, InputShape};
