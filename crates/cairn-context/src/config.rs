use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ContextError, Result};
use crate::validation::FieldViolation;

/// What context creation does when the requested workspace cannot be bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkspacePolicy {
    /// Log a warning and return an unbound context.
    #[default]
    Degrade,
    /// Fail with the typed error, like switching does.
    Strict,
}

impl std::str::FromStr for WorkspacePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "degrade" | "lenient" => Ok(WorkspacePolicy::Degrade),
            "strict" => Ok(WorkspacePolicy::Strict),
            other => Err(format!("unknown workspace policy '{other}', expected degrade|strict")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    pub enable_context_switching: bool,
    pub max_context_stack: usize,
    pub context_timeout: Duration,
    pub validate_parameters: bool,
    pub track_tool_execution: bool,
    pub max_execution_history: usize,
    pub sweep_interval: Duration,
    pub registry_timeout: Duration,
    pub unresolved_workspace_policy: WorkspacePolicy,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            enable_context_switching: true,
            max_context_stack: 50,
            context_timeout: Duration::from_secs(300),
            validate_parameters: true,
            track_tool_execution: true,
            max_execution_history: 1000,
            sweep_interval: Duration::from_secs(60),
            registry_timeout: Duration::from_secs(5),
            unresolved_workspace_policy: WorkspacePolicy::Degrade,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value=%raw, "ignoring unparsable environment value");
            None
        }
    }
}

fn env_bool(key: &str) -> Option<bool> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(key, value=%raw, "ignoring unparsable boolean environment value");
            None
        }
    }
}

impl ContextConfig {
    /// Defaults overridden by `CAIRN_*` environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            enable_context_switching: env_bool("CAIRN_ENABLE_CONTEXT_SWITCHING")
                .unwrap_or(d.enable_context_switching),
            max_context_stack: env_parse("CAIRN_MAX_CONTEXT_STACK").unwrap_or(d.max_context_stack),
            context_timeout: env_parse::<u64>("CAIRN_CONTEXT_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.context_timeout),
            validate_parameters: env_bool("CAIRN_VALIDATE_PARAMETERS")
                .unwrap_or(d.validate_parameters),
            track_tool_execution: env_bool("CAIRN_TRACK_TOOL_EXECUTION")
                .unwrap_or(d.track_tool_execution),
            max_execution_history: env_parse("CAIRN_MAX_EXECUTION_HISTORY")
                .unwrap_or(d.max_execution_history),
            sweep_interval: env_parse::<u64>("CAIRN_SWEEP_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.sweep_interval),
            registry_timeout: env_parse::<u64>("CAIRN_REGISTRY_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.registry_timeout),
            unresolved_workspace_policy: env_parse("CAIRN_UNRESOLVED_WORKSPACE_POLICY")
                .unwrap_or(d.unresolved_workspace_policy),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut violations = Vec::new();
        if self.max_context_stack == 0 {
            violations.push(FieldViolation::new("max_context_stack", "must be greater than 0"));
        }
        if self.context_timeout.is_zero() {
            violations.push(FieldViolation::new("context_timeout", "must be greater than 0"));
        }
        if self.sweep_interval.is_zero() {
            violations.push(FieldViolation::new("sweep_interval", "must be greater than 0"));
        }
        if self.registry_timeout.is_zero() {
            violations.push(FieldViolation::new("registry_timeout", "must be greater than 0"));
        }
        if self.track_tool_execution && self.max_execution_history == 0 {
            violations.push(FieldViolation::new(
                "max_execution_history",
                "must be greater than 0 when execution tracking is on",
            ));
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ContextError::InvalidConfiguration { violations })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ContextConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_collects_all_bad_fields() {
        let cfg = ContextConfig {
            max_context_stack: 0,
            context_timeout: Duration::ZERO,
            ..ContextConfig::default()
        };
        match cfg.validate() {
            Err(ContextError::InvalidConfiguration { violations }) => {
                let fields: Vec<_> = violations.iter().map(|v| v.field.as_str()).collect();
                assert_eq!(fields, vec!["max_context_stack", "context_timeout"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("STRICT".parse::<WorkspacePolicy>(), Ok(WorkspacePolicy::Strict));
        assert!("sometimes".parse::<WorkspacePolicy>().is_err());
    }
}
