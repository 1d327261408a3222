//! Top-level kernel configuration (§10.4): `skill-kernel.toml`, the
//! process-wide manifest for state directories, default timeouts, and the
//! subprocess env allow-list each skill inherits unless it overrides one.
//!
//! `expand_env_vars` is carried over from the teacher's `manifest.rs`
//! unchanged; only the struct it expands into is new.

use crate::errors::{KernelError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// `skill-kernel.toml`'s top-level shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Root directory skills are loaded from.
    pub skills_dir: PathBuf,
    /// State directory for the index store, `feedback.json`, and the audit
    /// log — the kernel's equivalent of the teacher's `~/.skill-engine`.
    pub state_dir: PathBuf,
    /// Default per-dispatch timeout in milliseconds (§4.F).
    pub default_timeout_ms: u64,
    /// Agent Loop step budget (§4.K), overridable per invocation.
    pub step_budget: usize,
    /// Env var names passed through to every subprocess-mode skill unless
    /// that skill's own manifest narrows it.
    pub default_passthrough_vars: Vec<String>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            skills_dir: PathBuf::from("skills"),
            state_dir: default_state_dir(),
            default_timeout_ms: 30_000,
            step_budget: crate::agent_loop::DEFAULT_STEP_BUDGET,
            default_passthrough_vars: vec!["PATH".to_string(), "HOME".to_string()],
        }
    }
}

fn default_state_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".skill-kernel")
}

impl KernelConfig {
    /// Load `skill-kernel.toml` from `path`, expanding `${VAR}` references
    /// in every string value before parsing.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(KernelError::Io)?;
        let expanded = expand_env_vars(&raw).map_err(|e| KernelError::LoadFailed {
            skill: path.as_ref().display().to_string(),
            reason: e.to_string(),
        })?;
        toml::from_str(&expanded).map_err(KernelError::Toml)
    }

    pub fn index_dir(&self) -> PathBuf {
        self.state_dir.join("index")
    }

    pub fn feedback_path(&self) -> PathBuf {
        self.state_dir.join("feedback.json")
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.state_dir.join("audit.log")
    }

    /// The default per-dispatch timeout (§4.F), overridden by
    /// `SUBPROCESS_TIMEOUT_SECONDS` when that env var is set to a valid
    /// integer (§6).
    pub fn default_timeout(&self) -> std::time::Duration {
        if let Ok(seconds) = std::env::var("SUBPROCESS_TIMEOUT_SECONDS") {
            if let Ok(seconds) = seconds.parse::<u64>() {
                return std::time::Duration::from_secs(seconds);
            }
        }
        std::time::Duration::from_millis(self.default_timeout_ms)
    }
}

/// Expand `${VAR}`, `${VAR:-default}`, and `${VAR:?error}` references in
/// `input` against the process environment.
///
/// - `${VAR}` — the variable's value, or an error if unset.
/// - `${VAR:-default}` — the variable's value, or `default` if unset.
/// - `${VAR:?message}` — the variable's value, or an error containing
///   `message` if unset.
pub fn expand_env_vars(input: &str) -> anyhow::Result<String> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut var_expr = String::new();
            let mut depth = 1;
            for c in chars.by_ref() {
                if c == '{' {
                    depth += 1;
                    var_expr.push(c);
                } else if c == '}' {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    var_expr.push(c);
                } else {
                    var_expr.push(c);
                }
            }

            let value = if let Some(pos) = var_expr.find(":-") {
                let var_name = &var_expr[..pos];
                let default_value = &var_expr[pos + 2..];
                std::env::var(var_name).unwrap_or_else(|_| default_value.to_string())
            } else if let Some(pos) = var_expr.find(":?") {
                let var_name = &var_expr[..pos];
                let error_msg = &var_expr[pos + 2..];
                std::env::var(var_name)
                    .with_context(|| format!("environment variable {var_name} not set: {error_msg}"))?
            } else {
                std::env::var(&var_expr)
                    .with_context(|| format!("environment variable {var_expr} not set"))?
            };

            result.push_str(&value);
        } else {
            result.push(c);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_env_vars_supports_default_and_required_forms() {
        std::env::set_var("KERNEL_CONFIG_TEST_VAR", "hello");
        assert_eq!(expand_env_vars("${KERNEL_CONFIG_TEST_VAR}").unwrap(), "hello");
        assert_eq!(expand_env_vars("${KERNEL_CONFIG_TEST_MISSING:-fallback}").unwrap(), "fallback");
        assert!(expand_env_vars("${KERNEL_CONFIG_TEST_MISSING}").is_err());
        assert!(expand_env_vars("${KERNEL_CONFIG_TEST_MISSING:?must be set}").is_err());
        std::env::remove_var("KERNEL_CONFIG_TEST_VAR");
    }

    #[test]
    fn from_file_expands_before_parsing() {
        std::env::set_var("KERNEL_CONFIG_TEST_DIR", "/opt/kernel");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skill-kernel.toml");
        std::fs::write(
            &path,
            "skills_dir = \"${KERNEL_CONFIG_TEST_DIR}/skills\"\nstate_dir = \"state\"\ndefault_timeout_ms = 5000\nstep_budget = 5\ndefault_passthrough_vars = [\"PATH\"]\n",
        )
        .unwrap();

        let config = KernelConfig::from_file(&path).unwrap();
        assert_eq!(config.skills_dir, PathBuf::from("/opt/kernel/skills"));
        std::env::remove_var("KERNEL_CONFIG_TEST_DIR");
    }

    #[test]
    fn defaults_point_at_a_skill_kernel_state_dir() {
        let config = KernelConfig::default();
        assert!(config.state_dir.ends_with(".skill-kernel"));
        assert_eq!(config.index_dir(), config.state_dir.join("index"));
    }

    #[test]
    fn subprocess_timeout_seconds_env_var_overrides_the_configured_default() {
        let config = KernelConfig::default();
        assert_eq!(config.default_timeout(), std::time::Duration::from_millis(30_000));

        std::env::set_var("SUBPROCESS_TIMEOUT_SECONDS", "7");
        assert_eq!(config.default_timeout(), std::time::Duration::from_secs(7));
        std::env::remove_var("SUBPROCESS_TIMEOUT_SECONDS");
    }
}
