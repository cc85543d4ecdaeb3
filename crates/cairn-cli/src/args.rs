use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "cairn")]
#[command(about = "Operator CLI for the cairn context daemon", long_about = None)]
pub struct Args {
    /// Daemon URL
    #[arg(long, env = "CAIRN_DAEMON_URL", default_value = "http://127.0.0.1:18090")]
    pub daemon_url: String,

    /// Daemon API token (Authorization: Bearer)
    #[arg(long, env = "CAIRN_API_TOKEN")]
    pub token: Option<String>,

    /// Print raw JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Execution contexts on the stack
    Contexts {
        #[command(subcommand)]
        subcommand: ContextCommand,
    },
    /// Validate and augment parameters for a tool call
    Enhance {
        tool: String,
        /// Parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
        /// Calling context
        #[arg(long)]
        request_id: Option<String>,
        /// Skip the workspace lookup
        #[arg(long)]
        no_validate_workspace: bool,
        #[arg(long)]
        require_auth: bool,
    },
    /// Recent execution results
    History {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Tool schemas
    Schemas {
        #[command(subcommand)]
        subcommand: SchemaCommand,
    },
    /// Workspaces known to the daemon's registry
    Workspaces,
    /// Manager counters
    Stats,
    /// Fetch daemon metrics
    Metrics,
}

#[derive(Debug, Subcommand)]
pub enum ContextCommand {
    /// List the stack, oldest first
    List,
    /// Show the last created or switched-to context
    Active,
    /// Create a context
    Create {
        #[arg(long)]
        tool: String,
        #[arg(long)]
        workspace: Option<String>,
        #[arg(long)]
        parent: Option<String>,
        /// key=value metadata (repeatable)
        #[arg(long = "meta", value_parser = parse_key_value)]
        metadata: Vec<(String, String)>,
    },
    /// Switch to another workspace
    Switch {
        /// Target workspace id or slug
        #[arg(long)]
        to: String,
        /// Context being switched away from
        #[arg(long)]
        from: Option<String>,
        /// Do not carry the caller's auth over
        #[arg(long)]
        no_preserve_auth: bool,
        #[arg(long)]
        reason: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum SchemaCommand {
    List,
    /// Register schemas from a JSON file (one object or an array)
    Register { file: PathBuf },
}

pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}
