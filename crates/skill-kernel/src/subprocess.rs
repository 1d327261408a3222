//! Subprocess Isolator (§4.G): runs a `Subprocess`-mode command in a child
//! process with an explicit environment allow-list.
//!
//! Grounded on the teacher's `docker_runtime.rs` `DockerSecurityPolicy`
//! idiom — build an explicit, auditable policy object up front, validate
//! against it before ever touching `std::process::Command` — generalized
//! here from Docker-specific flags to the env-var allow-list the redesign
//! note in spec §9 calls for ("decorator-based tool registration... global
//! state" replaced by explicit, validated configuration everywhere).
//! Secrets resolution is grounded on `skill-context::secrets`/`environment`,
//! carried over from the teacher unchanged.

use crate::audit::AuditLogger;
use crate::credentials::CredentialStore;
use crate::errors::{KernelError, Result};
use skill_context::environment::{EnvValue, EnvironmentConfig};
use skill_context::secrets::SecretsConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Instance name the kernel passes to `CredentialStore`, which still speaks
/// in the teacher's `(skill, instance, key)` keychain vocabulary even though
/// the kernel itself has no concept of named instances.
const DEFAULT_INSTANCE: &str = "default";

/// The self-healing env marker (§4.G: "a lock file records the
/// materialized environment's build id; a stale or missing lock file
/// triggers an automatic rebuild before the next subprocess call").
const ENV_LOCK_FILE: &str = ".skill-env.lock";

/// Gates concurrent one-shot initializations of the same isolated
/// environment (§4.G: "gated by a lock file to prevent concurrent
/// initializations"). Distinct from [`ENV_LOCK_FILE`]: that one marks a
/// *completed* materialization; this one is held only while init is
/// in-flight, created via an atomic exclusive-create so at most one
/// initializer ever wins it.
const ENV_INIT_LOCK_FILE: &str = ".skill-env.init.lock";

/// Poll interval for callers waiting on another task's in-flight init.
const ENV_INIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct SubprocessResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Executes skill commands declared `execution_mode = "subprocess"`.
pub struct SubprocessIsolator {
    env: EnvironmentConfig,
    secrets: Option<SecretsConfig>,
    credentials: CredentialStore,
    audit: Option<Arc<AuditLogger>>,
    kill_grace: Duration,
}

impl SubprocessIsolator {
    pub fn new(env: EnvironmentConfig) -> Self {
        Self {
            env,
            secrets: None,
            credentials: CredentialStore::new(),
            audit: None,
            kill_grace: Duration::from_secs(5),
        }
    }

    pub fn with_secrets(mut self, secrets: SecretsConfig) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn with_credential_store(mut self, credentials: CredentialStore) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_audit_logger(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// `true` if `name`'s isolated environment is present and its lock file
    /// is fresh (§4.G). A missing or stale lock does not fail `load`
    /// (§4.B edge case) but does disable direct-mode dispatch and should
    /// trigger a rebuild before the next subprocess call. Logged to the
    /// audit trail when an `AuditLogger` is configured (§10.6).
    pub fn is_env_materialized(&self, isolated_env_path: &Path) -> bool {
        let materialized = isolated_env_path.is_dir() && isolated_env_path.join(ENV_LOCK_FILE).exists();
        if let Some(audit) = &self.audit {
            let skill_name = isolated_env_path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .unwrap_or("unknown");
            let _ = audit.log_env_materialization_check(skill_name, DEFAULT_INSTANCE, materialized);
        }
        materialized
    }

    /// Run `command_name` with `json_args` on the command line, in
    /// `working_dir` (the skill's `source_dir`), under the allow-listed
    /// environment, bounded by `timeout` (§4.G).
    ///
    /// If `isolated_env_path` is declared and hasn't been materialized yet,
    /// this performs the one-shot self-healing init (§4.G) before ever
    /// spawning the child, gated so concurrent dispatches of the same
    /// skill's first call don't race each other into double-initializing.
    ///
    /// Argv shape: `<interpreter-or-binary> <command_name> <json_args>`,
    /// where `interpreter_or_binary` is whatever the skill's isolated
    /// environment exposes at `bin/run` (or the directory's own
    /// executable, for a compiled skill).
    pub async fn execute(
        &self,
        skill_name: &str,
        working_dir: &Path,
        isolated_env_path: Option<&Path>,
        command_name: &str,
        json_args: &serde_json::Value,
        timeout: Duration,
    ) -> Result<SubprocessResult> {
        if let Some(env_path) = isolated_env_path {
            match tokio::time::timeout(timeout, self.ensure_env(skill_name, env_path)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(KernelError::Timeout(timeout)),
            }
        }

        let binary = self.resolve_entrypoint(working_dir);
        let args_json = json_args.to_string();

        let mut cmd = Command::new(&binary);
        cmd.arg(command_name)
            .arg(&args_json)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear();

        for (key, value) in self.resolve_env(skill_name)? {
            cmd.env(key, value);
        }

        debug!(skill = skill_name, command = command_name, binary = %binary.display(), "spawning subprocess");

        let mut child = cmd.spawn().map_err(|e| KernelError::SubprocessFailure {
            exit_code: None,
            stderr: format!("failed to spawn {}: {e}", binary.display()),
        })?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let wait = async {
            let status = child.wait().await;
            let mut stdout = String::new();
            let mut stderr = String::new();
            if let Some(mut pipe) = stdout_pipe.take() {
                let _ = pipe.read_to_string(&mut stdout).await;
            }
            if let Some(mut pipe) = stderr_pipe.take() {
                let _ = pipe.read_to_string(&mut stderr).await;
            }
            (status, stdout, stderr)
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok((status, stdout, stderr)) => {
                let status = status.map_err(|e| KernelError::SubprocessFailure {
                    exit_code: None,
                    stderr: e.to_string(),
                })?;
                if status.success() {
                    Ok(SubprocessResult { exit_code: status.code(), stdout, stderr })
                } else {
                    Err(KernelError::SubprocessFailure { exit_code: status.code(), stderr })
                }
            }
            Err(_) => {
                warn!(skill = skill_name, command = command_name, ?timeout, "subprocess timed out, killing");
                let _ = child.start_kill();
                let _ = tokio::time::timeout(self.kill_grace, child.wait()).await;
                Err(KernelError::Timeout(timeout))
            }
        }
    }

    /// Self-healing materialization (§4.G): if `env_path` isn't already
    /// materialized, acquire the per-skill init lock and build it; if
    /// another dispatcher already holds the lock, wait for it to finish
    /// rather than racing it. One-shot per environment — once
    /// [`is_env_materialized`](Self::is_env_materialized) is true, later
    /// calls are a no-op check.
    async fn ensure_env(&self, skill_name: &str, env_path: &Path) -> Result<()> {
        if self.is_env_materialized(env_path) {
            return Ok(());
        }

        tokio::fs::create_dir_all(env_path).await.map_err(|e| KernelError::SubprocessFailure {
            exit_code: None,
            stderr: format!("failed to create isolated environment dir {}: {e}", env_path.display()),
        })?;

        let lock_path = env_path.join(ENV_INIT_LOCK_FILE);
        loop {
            match tokio::fs::OpenOptions::new().write(true).create_new(true).open(&lock_path).await {
                Ok(_lock) => {
                    debug!(skill = skill_name, path = %env_path.display(), "materializing isolated environment");
                    let result = self.materialize_env(env_path).await;
                    let _ = tokio::fs::remove_file(&lock_path).await;
                    return result;
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    // Another dispatcher's init is in flight; wait for it
                    // rather than doing our own, then re-check.
                    if self.is_env_materialized(env_path) {
                        return Ok(());
                    }
                    tokio::time::sleep(ENV_INIT_POLL_INTERVAL).await;
                }
                Err(e) => {
                    return Err(KernelError::SubprocessFailure {
                        exit_code: None,
                        stderr: format!("failed to acquire env init lock {}: {e}", lock_path.display()),
                    });
                }
            }
        }
    }

    /// The actual one-shot build behind the init lock: creates the
    /// environment directory (already done by the caller) and stamps the
    /// completion marker [`ENV_LOCK_FILE`] checked by
    /// [`is_env_materialized`](Self::is_env_materialized). Installing the
    /// skill's declared dependency set is the skill's own `bin/run`
    /// bootstrap concern, not the kernel's (§1: package managers are a
    /// non-goal) — the kernel's responsibility ends at "the environment
    /// exists and is marked ready."
    async fn materialize_env(&self, env_path: &Path) -> Result<()> {
        tokio::fs::write(env_path.join(ENV_LOCK_FILE), "materialized").await.map_err(|e| {
            KernelError::SubprocessFailure {
                exit_code: None,
                stderr: format!("failed to write env lock file in {}: {e}", env_path.display()),
            }
        })
    }

    /// The child's executable: a skill-local `bin/run` script if the
    /// isolated environment defines one, else `working_dir` itself treated
    /// as an executable (native compiled skills).
    fn resolve_entrypoint(&self, working_dir: &Path) -> PathBuf {
        let candidate = working_dir.join("bin").join("run");
        if candidate.exists() {
            candidate
        } else {
            working_dir.join("run")
        }
    }

    /// Build the child's full environment: static variables, host
    /// passthrough restricted to the configured allow-list, and secrets
    /// resolved via `skill-context::secrets` — never the host's full
    /// environment (§4.G: "only variables named in the skill's allow-list
    /// ever reach the child; credentials absent from that list must never
    /// leak into the subprocess even if present in the host environment").
    fn resolve_env(&self, skill_name: &str) -> Result<HashMap<String, String>> {
        let mut resolved = HashMap::new();

        for (key, value) in &self.env.variables {
            match value {
                EnvValue::Plain(v) => {
                    resolved.insert(key.clone(), v.clone());
                }
                EnvValue::Reference(var) => {
                    if let Ok(v) = std::env::var(var) {
                        resolved.insert(key.clone(), v);
                    }
                }
                EnvValue::Secret(secret_ref) => {
                    let value = self.resolve_secret(skill_name, key, secret_ref)?;
                    resolved.insert(key.clone(), value);
                }
                EnvValue::Generated(g) => {
                    resolved.insert(key.clone(), g.generate());
                }
                EnvValue::FromFile(path) => {
                    let contents = std::fs::read_to_string(path).map_err(|e| KernelError::SubprocessFailure {
                        exit_code: None,
                        stderr: format!("failed to read env file value {}: {e}", path.display()),
                    })?;
                    resolved.insert(key.clone(), contents.trim().to_string());
                }
            }
        }

        for var in &self.env.passthrough_vars {
            if let Ok(v) = std::env::var(var) {
                resolved.insert(var.clone(), v);
            }
        }
        for prefix in &self.env.passthrough_prefixes {
            for (key, value) in std::env::vars() {
                if key.starts_with(prefix.as_str()) {
                    resolved.insert(key, value);
                }
            }
        }

        Ok(resolved)
    }

    /// Resolve a `secret://context/key` reference. `SecretsConfig` only
    /// carries *definitions* (provider, injection target), never the value
    /// itself (§4.G). Two providers are understood:
    ///
    /// - unset or `"keychain"` (the default): read from the platform
    ///   keychain via [`CredentialStore`], the same store skills use to
    ///   persist credentials across runs.
    /// - anything else (`"environment_variable"`, an external secret
    ///   manager name, ...): the secret is assumed materialized ahead of
    ///   the kernel into a host env var named by the definition's
    ///   `env_var` (defaulting to the key, upper-cased).
    fn resolve_secret(
        &self,
        skill_name: &str,
        key: &str,
        secret_ref: &skill_context::environment::SecretRef,
    ) -> Result<String> {
        let secrets = self.secrets.as_ref().ok_or_else(|| KernelError::SubprocessFailure {
            exit_code: None,
            stderr: format!("skill {skill_name} requires secret {key} but no secrets provider is configured"),
        })?;
        let definition = secrets.get(&secret_ref.key).ok_or_else(|| KernelError::SubprocessFailure {
            exit_code: None,
            stderr: format!("secret {key} ({}) not declared for skill {skill_name}", secret_ref.to_uri()),
        })?;

        match definition.provider.as_deref() {
            None | Some("keychain") => self
                .credentials
                .get_credential(skill_name, DEFAULT_INSTANCE, &secret_ref.key)
                .map(|z| z.as_str().to_string())
                .map_err(|e| KernelError::SubprocessFailure {
                    exit_code: None,
                    stderr: format!("secret {key} ({}) not in keychain: {e}", secret_ref.to_uri()),
                }),
            Some(_other) => {
                let host_var = definition
                    .env_var
                    .clone()
                    .unwrap_or_else(|| secret_ref.key.to_ascii_uppercase());
                std::env::var(&host_var).map_err(|_| KernelError::SubprocessFailure {
                    exit_code: None,
                    stderr: format!(
                        "secret {key} ({}) not materialized: host var {host_var} unset",
                        secret_ref.to_uri()
                    ),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_executable_script(dir: &Path, body: &str) {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join("run");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "#!/bin/sh\n{body}").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
        }
    }

    #[tokio::test]
    async fn successful_command_captures_stdout() {
        let tmp = tempfile::tempdir().unwrap();
        write_executable_script(tmp.path(), "echo \"$1 $2\"");

        let isolator = SubprocessIsolator::new(EnvironmentConfig::new());
        let result = isolator
            .execute("echo-skill", tmp.path(), None, "greet", &serde_json::json!({"name": "world"}), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(result.stdout.contains("greet"));
    }

    #[tokio::test]
    async fn timeout_kills_child_and_returns_timeout_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_executable_script(tmp.path(), "sleep 5");

        let isolator = SubprocessIsolator::new(EnvironmentConfig::new());
        let err = isolator
            .execute("slow-skill", tmp.path(), None, "slow", &serde_json::json!({}), Duration::from_millis(100))
            .await
            .unwrap_err();

        assert!(matches!(err, KernelError::Timeout(_)));
    }

    #[tokio::test]
    async fn host_env_not_on_allow_list_never_reaches_child() {
        let tmp = tempfile::tempdir().unwrap();
        write_executable_script(tmp.path(), "echo \"SECRET=[$SECRET_TOKEN]\"");
        std::env::set_var("SECRET_TOKEN", "do-not-leak");

        let isolator = SubprocessIsolator::new(EnvironmentConfig::new());
        let result = isolator
            .execute("leaky-skill", tmp.path(), None, "probe", &serde_json::json!({}), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(result.stdout.contains("SECRET=[]"));
        std::env::remove_var("SECRET_TOKEN");
    }

    #[test]
    fn materialized_env_requires_both_dir_and_lock_file() {
        let tmp = tempfile::tempdir().unwrap();
        let isolator = SubprocessIsolator::new(EnvironmentConfig::new());
        assert!(!isolator.is_env_materialized(tmp.path()));

        std::fs::write(tmp.path().join(ENV_LOCK_FILE), "build-1").unwrap();
        assert!(isolator.is_env_materialized(tmp.path()));
    }

    #[tokio::test]
    async fn execute_self_heals_an_unmaterialized_env_before_spawning() {
        let source = tempfile::tempdir().unwrap();
        write_executable_script(source.path(), "echo ready");
        let env_dir = tempfile::tempdir().unwrap();
        let env_path = env_dir.path().join("envs").join("demo");
        assert!(!env_path.exists());

        let isolator = SubprocessIsolator::new(EnvironmentConfig::new());
        let result = isolator
            .execute(
                "demo-skill",
                source.path(),
                Some(env_path.as_path()),
                "run",
                &serde_json::json!({}),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert!(result.stdout.contains("ready"));
        assert!(isolator.is_env_materialized(&env_path));
        assert!(!env_path.join(ENV_INIT_LOCK_FILE).exists());
    }

    #[tokio::test]
    async fn concurrent_dispatches_do_not_double_initialize_the_same_env() {
        let source = tempfile::tempdir().unwrap();
        write_executable_script(source.path(), "echo ready");
        let env_dir = tempfile::tempdir().unwrap();
        let env_path = Arc::new(env_dir.path().join("envs").join("demo"));

        let isolator = Arc::new(SubprocessIsolator::new(EnvironmentConfig::new()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let isolator = isolator.clone();
            let env_path = env_path.clone();
            let source_dir = source.path().to_path_buf();
            handles.push(tokio::spawn(async move {
                isolator
                    .execute(
                        "demo-skill",
                        &source_dir,
                        Some(env_path.as_path()),
                        "run",
                        &serde_json::json!({}),
                        Duration::from_secs(5),
                    )
                    .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(isolator.is_env_materialized(&env_path));
        assert!(!env_path.join(ENV_INIT_LOCK_FILE).exists());
    }
}
