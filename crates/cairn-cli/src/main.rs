mod args;
mod client;
mod output;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context as _, Result};
use clap::Parser;
use serde_json::{json, Value};

use cairn_common::WorkspaceSummary;
use cairn_context::{EnhanceOptions, ToolSchema};

use crate::args::{Args, Command, ContextCommand, SchemaCommand};
use crate::client::DaemonClient;
use crate::output::{
    print_context, print_contexts, print_enhanced, print_history, print_schemas, print_stats,
    print_workspaces,
};

fn print_json(v: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(v)?);
    Ok(())
}

/// Accepts one schema object or an array of them.
fn read_schemas(path: &Path) -> Result<Vec<ToolSchema>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", path.display()))?;
    let schemas = match value {
        Value::Array(_) => serde_json::from_value(value)?,
        other => vec![serde_json::from_value(other)?],
    };
    Ok(schemas)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    cairn_common::telemetry::init_tracing("cairn-cli", None, None, "text");
    let client = DaemonClient::new(&args.daemon_url, args.token);
    let raw = args.json;

    match args.command {
        Command::Contexts { subcommand } => match subcommand {
            ContextCommand::List => {
                let contexts: Vec<Value> = client.get("/v1/contexts").await?;
                if raw {
                    print_json(&Value::Array(contexts))?;
                } else {
                    print_contexts(&contexts);
                }
            }
            ContextCommand::Active => {
                let ctx: Value = client.get("/v1/contexts/active").await?;
                if raw {
                    print_json(&ctx)?;
                } else {
                    print_context(&ctx);
                }
            }
            ContextCommand::Create {
                tool,
                workspace,
                parent,
                metadata,
            } => {
                let metadata: BTreeMap<String, String> = metadata.into_iter().collect();
                let body = json!({
                    "tool_name": tool,
                    "workspace_id": workspace,
                    "parent_request_id": parent,
                    "metadata": metadata,
                });
                let ctx: Value = client.post("/v1/contexts", &body).await?;
                if raw {
                    print_json(&ctx)?;
                } else {
                    println!("✓ Context created");
                    print_context(&ctx);
                }
            }
            ContextCommand::Switch {
                to,
                from,
                no_preserve_auth,
                reason,
            } => {
                let body = json!({
                    "to_workspace_id": to,
                    "from_request_id": from,
                    "preserve_auth": !no_preserve_auth,
                    "reason": reason,
                });
                let ctx: Value = client.post("/v1/contexts/switch", &body).await?;
                if raw {
                    print_json(&ctx)?;
                } else {
                    println!("✓ Switched to workspace '{to}'");
                    print_context(&ctx);
                }
            }
        },
        Command::Enhance {
            tool,
            params,
            request_id,
            no_validate_workspace,
            require_auth,
        } => {
            let parameters: Value =
                serde_json::from_str(&params).context("--params must be a JSON value")?;
            let options = EnhanceOptions {
                validate_workspace: !no_validate_workspace,
                require_auth,
                ..EnhanceOptions::default()
            };
            let body = json!({
                "request_id": request_id,
                "parameters": parameters,
                "options": options,
            });
            let out: Value = client.post(&format!("/v1/tools/{tool}/enhance"), &body).await?;
            if raw {
                print_json(&out)?;
            } else {
                print_enhanced(&out);
            }
        }
        Command::History { limit } => {
            let path = match limit {
                Some(n) => format!("/v1/history?limit={n}"),
                None => "/v1/history".to_string(),
            };
            let results: Vec<Value> = client.get(&path).await?;
            if raw {
                print_json(&Value::Array(results))?;
            } else {
                print_history(&results);
            }
        }
        Command::Schemas { subcommand } => match subcommand {
            SchemaCommand::List => {
                let schemas: Vec<Value> = client.get("/v1/schemas").await?;
                if raw {
                    print_json(&Value::Array(schemas))?;
                } else {
                    print_schemas(&schemas);
                }
            }
            SchemaCommand::Register { file } => {
                for schema in read_schemas(&file)? {
                    let out: Value = client.post("/v1/schemas", &schema).await?;
                    let replaced = out.get("replaced").and_then(Value::as_bool).unwrap_or(false);
                    println!(
                        "✓ Schema '{}' {}",
                        schema.name,
                        if replaced { "replaced" } else { "registered" }
                    );
                }
            }
        },
        Command::Workspaces => {
            let workspaces: Vec<WorkspaceSummary> = client.get("/v1/workspaces").await?;
            if raw {
                print_json(&serde_json::to_value(&workspaces)?)?;
            } else {
                print_workspaces(&workspaces);
            }
        }
        Command::Stats => {
            let stats: Value = client.get("/v1/stats").await?;
            if raw {
                print_json(&stats)?;
            } else {
                print_stats(&stats);
            }
        }
        Command::Metrics => {
            print!("{}", client.get_text("/metrics").await?);
        }
    }
    Ok(())
}
