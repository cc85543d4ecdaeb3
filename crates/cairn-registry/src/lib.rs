pub mod http;
pub mod memory;
pub mod types;

pub use http::HttpWorkspaceRegistry;
pub use memory::MemoryWorkspaceRegistry;
pub use types::{WorkspaceChange, WorkspaceChangeStream, WorkspaceRegistry};
