use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "cairn-daemon")]
#[command(about = "Hosts a workspace-aware context manager over HTTP", long_about = None)]
pub struct Args {
    #[arg(long, env = "CAIRN_LISTEN_ADDR", default_value = "0.0.0.0:18090")]
    pub listen_addr: String,

    /// JSON array of workspace records served from memory.
    #[arg(long, env = "CAIRN_WORKSPACES_FILE", conflicts_with = "registry_url")]
    pub workspaces_file: Option<PathBuf>,

    /// Base URL of a remote workspace registry.
    #[arg(long, env = "CAIRN_REGISTRY_URL")]
    pub registry_url: Option<String>,

    #[arg(long, env = "CAIRN_REGISTRY_TOKEN")]
    pub registry_token: Option<String>,

    /// JSON array of tool schemas registered at startup.
    #[arg(long, env = "CAIRN_SCHEMAS_FILE")]
    pub schemas_file: Option<PathBuf>,

    /// Bearer token required on /v1 routes. Unset means open.
    #[arg(long, env = "CAIRN_API_TOKEN")]
    pub api_token: Option<String>,

    /// Also write every context event to the log.
    #[arg(long, env = "CAIRN_LOG_EVENTS", default_value_t = false)]
    pub log_events: bool,

    #[arg(long, env = "CAIRN_EVENT_BUFFER", default_value_t = 1024)]
    pub event_buffer: usize,

    #[arg(long, env = "CAIRN_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    #[arg(long, env = "CAIRN_OTLP_TOKEN")]
    pub otlp_token: Option<String>,

    /// "text" or "json".
    #[arg(long, env = "CAIRN_LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}
