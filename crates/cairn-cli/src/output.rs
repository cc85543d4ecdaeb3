use serde_json::Value;

use cairn_common::WorkspaceSummary;

fn s<'a>(v: &'a Value, key: &str) -> &'a str {
    v.get(key).and_then(Value::as_str).unwrap_or("-")
}

pub fn print_contexts(contexts: &[Value]) {
    println!("\n=== Context Stack ({}) ===\n", contexts.len());
    if contexts.is_empty() {
        println!("No contexts.");
        return;
    }
    println!(
        "{:<32} {:<28} {:<16} {:<6} {:<32}",
        "Request ID", "Tool", "Workspace", "Bound", "Parent"
    );
    println!("{:-<118}", "");
    for ctx in contexts {
        let bound = if ctx.get("workspace").is_some_and(|w| !w.is_null()) { "yes" } else { "no" };
        println!(
            "{:<32} {:<28} {:<16} {:<6} {:<32}",
            s(ctx, "request_id"),
            s(ctx, "tool_name"),
            s(ctx, "workspace_id"),
            bound,
            s(ctx, "parent_request_id"),
        );
    }
    println!();
}

pub fn print_context(ctx: &Value) {
    if ctx.is_null() {
        println!("No active context.");
        return;
    }
    println!("Request ID : {}", s(ctx, "request_id"));
    println!("Tool       : {}", s(ctx, "tool_name"));
    println!("Workspace  : {}", s(ctx, "workspace_id"));
    println!("Parent     : {}", s(ctx, "parent_request_id"));
    println!("Created    : {}", s(ctx, "created_at"));
    if let Some(auth) = ctx.get("auth").filter(|a| !a.is_null()) {
        println!("Auth       : {} as {}", s(auth, "method"), s(auth, "principal"));
    }
    if let Some(meta) = ctx.get("metadata").and_then(Value::as_object) {
        for (k, v) in meta {
            println!("  {k} = {v}");
        }
    }
}

pub fn print_enhanced(out: &Value) {
    let validation = out.get("validation").cloned().unwrap_or(Value::Null);
    let valid = validation.get("valid").and_then(Value::as_bool).unwrap_or(false);
    println!("{} {}", if valid { "✓ valid:" } else { "✗ invalid:" }, s(out, "tool_name"));
    if let Some(errors) = validation.get("errors").and_then(Value::as_array) {
        for e in errors {
            println!("  - {}", e.as_str().unwrap_or_default());
        }
    }
    if let Some(ws) = out.get("workspace").filter(|w| !w.is_null()) {
        println!("Workspace  : {} ({})", s(ws, "id"), s(ws, "slug"));
    }
    if let Some(params) = out.get("parameters") {
        println!(
            "Parameters : {}",
            serde_json::to_string_pretty(params).unwrap_or_default()
        );
    }
}

pub fn print_history(results: &[Value]) {
    println!("\n=== Execution History ({}) ===\n", results.len());
    if results.is_empty() {
        println!("No executions recorded.");
        return;
    }
    println!("{:<32} {:<28} {:<8} {:>10}  {:<30}", "Request ID", "Tool", "Result", "Time (ms)", "Error");
    println!("{:-<112}", "");
    for r in results {
        let ctx = r.get("context").cloned().unwrap_or(Value::Null);
        let ok = r.get("success").and_then(Value::as_bool).unwrap_or(false);
        let err = r
            .get("error")
            .filter(|e| !e.is_null())
            .map(|e| format!("{}: {}", s(e, "code"), s(e, "message")))
            .unwrap_or_default();
        println!(
            "{:<32} {:<28} {:<8} {:>10}  {:<30}",
            s(&ctx, "request_id"),
            s(&ctx, "tool_name"),
            if ok { "ok" } else { "failed" },
            r.get("execution_time_ms").and_then(Value::as_u64).unwrap_or(0),
            err,
        );
    }
    println!();
}

pub fn print_schemas(schemas: &[Value]) {
    println!("\n=== Tool Schemas ({}) ===\n", schemas.len());
    if schemas.is_empty() {
        println!("No schemas registered.");
        return;
    }
    println!("{:<32} {:<10} {:<8} {:<6} {:<40}", "Name", "Workspace", "Multi", "Auth", "Description");
    println!("{:-<100}", "");
    let flag = |v: &Value, key: &str| {
        if v.get(key).and_then(Value::as_bool).unwrap_or(false) { "yes" } else { "no" }
    };
    for schema in schemas {
        println!(
            "{:<32} {:<10} {:<8} {:<6} {:<40}",
            s(schema, "name"),
            flag(schema, "requires_workspace"),
            flag(schema, "supports_multi_workspace"),
            flag(schema, "authentication_required"),
            s(schema, "description"),
        );
    }
    println!();
}

pub fn print_workspaces(workspaces: &[WorkspaceSummary]) {
    println!("\n=== Workspaces ({}) ===\n", workspaces.len());
    if workspaces.is_empty() {
        println!("No workspaces.");
        return;
    }
    println!("{:<20} {:<20} {:<10} {:<40}", "ID", "Slug", "Status", "Base URL");
    println!("{:-<92}", "");
    for ws in workspaces {
        println!("{:<20} {:<20} {:<10} {:<40}", ws.id, ws.slug, ws.status, ws.base_url);
    }
    println!();
}

pub fn print_stats(stats: &Value) {
    println!("\n=== Context Manager ===\n");
    if let Some(obj) = stats.as_object() {
        for (k, v) in obj {
            println!("  {:<28} {}", k, v);
        }
    }
    println!();
}
