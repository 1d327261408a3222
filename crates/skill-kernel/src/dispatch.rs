//! Dispatch / Swarm (§4.F): the central `execute(skill, command, args,
//! mode, timeout)` entry point. Validates the skill/command exist, invokes
//! the right mode (direct in-process handler or the Subprocess Isolator),
//! enforces the timeout, and fires a non-blocking post-execution feedback
//! hook.
//!
//! Grounded on the teacher's `jobs/worker.rs` pattern of spawning
//! fire-and-forget follow-up work without awaiting it (there: re-enqueuing
//! a job; here: `FeedbackStore.record`), and on `loader.rs`'s
//! `HandlerTable` for resolving a direct-mode handle.

use crate::errors::{KernelError, Result};
use crate::feedback::FeedbackStore;
use crate::loader::ModuleLoader;
use crate::registry::SkillRegistry;
use crate::subprocess::SubprocessIsolator;
use crate::types::{Command, DispatchOutcome, ExecutionMode, Skill};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// `Dispatch.execute`'s central entry point (§4.F).
pub struct Dispatch {
    registry: Arc<SkillRegistry>,
    loader: Arc<ModuleLoader>,
    isolator: Arc<SubprocessIsolator>,
    feedback: Arc<FeedbackStore>,
}

impl Dispatch {
    pub fn new(
        registry: Arc<SkillRegistry>,
        loader: Arc<ModuleLoader>,
        isolator: Arc<SubprocessIsolator>,
        feedback: Arc<FeedbackStore>,
    ) -> Self {
        Self { registry, loader, isolator, feedback }
    }

    /// `execute(skill, command, args, mode, timeout) -> Result` (§4.F).
    /// `query` is the Router's pseudo-query, threaded through purely so the
    /// post-execution hook can record feedback against it; Dispatch itself
    /// has no opinion on routing.
    pub async fn execute(
        &self,
        query: &str,
        skill_name: &str,
        command_name: &str,
        args: serde_json::Value,
        timeout: Duration,
    ) -> DispatchOutcome {
        let outcome = self.execute_inner(skill_name, command_name, args, timeout).await;
        self.record_feedback(query, skill_name, outcome.is_ok());
        outcome
    }

    async fn execute_inner(
        &self,
        skill_name: &str,
        command_name: &str,
        args: serde_json::Value,
        timeout: Duration,
    ) -> DispatchOutcome {
        let skill = match self.registry.get(skill_name).await {
            Some(skill) => skill,
            None => {
                return error_outcome(&KernelError::CommandNotFound(format!(
                    "skill {skill_name:?} is not loaded"
                )))
            }
        };

        let Some(command) = skill.command(command_name) else {
            return error_outcome(&KernelError::CommandNotFound(format!(
                "command {command_name:?} not found in skill {skill_name:?}"
            )));
        };

        if let Err(message) = validate_args(command, &args) {
            return error_outcome(&KernelError::InvalidArgs(message));
        }

        match skill.execution_mode {
            ExecutionMode::Direct => self.dispatch_direct(&skill, command_name, args, timeout).await,
            ExecutionMode::Subprocess => self.dispatch_subprocess(&skill, command_name, args, timeout).await,
        }
    }

    async fn dispatch_direct(
        &self,
        skill: &Skill,
        command_name: &str,
        args: serde_json::Value,
        timeout: Duration,
    ) -> DispatchOutcome {
        let Some(handler) = self.loader.resolve_handler(&skill.name, command_name) else {
            return error_outcome(&KernelError::CommandNotFound(format!(
                "no direct handler registered for {}.{command_name}",
                skill.name
            )));
        };
        let handler = handler.clone();

        match tokio::time::timeout(timeout, handler(args)).await {
            Ok(Ok(payload)) => DispatchOutcome::Ok { payload },
            Ok(Err(e)) => error_outcome(&e),
            Err(_) => error_outcome(&KernelError::Timeout(timeout)),
        }
    }

    async fn dispatch_subprocess(
        &self,
        skill: &Skill,
        command_name: &str,
        args: serde_json::Value,
        timeout: Duration,
    ) -> DispatchOutcome {
        match self
            .isolator
            .execute(
                &skill.name,
                &skill.source_dir,
                skill.isolated_env_path.as_deref(),
                command_name,
                &args,
                timeout,
            )
            .await
        {
            Ok(result) => match serde_json::from_str::<serde_json::Value>(&result.stdout) {
                Ok(payload) => DispatchOutcome::Ok { payload },
                Err(_) => DispatchOutcome::Ok { payload: serde_json::Value::String(result.stdout) },
            },
            Err(e) => error_outcome(&e),
        }
    }

    /// Fire-and-forget: spawned so it never blocks the result returning to
    /// the caller (§4.F "MUST NOT block the result return").
    fn record_feedback(&self, query: &str, skill_name: &str, success: bool) {
        let feedback = self.feedback.clone();
        let query = query.to_string();
        let skill_name = skill_name.to_string();
        tokio::spawn(async move {
            if let Err(e) = feedback.record(&query, &skill_name, success).await {
                warn!(%skill_name, error = %e, "failed to record dispatch feedback");
            }
        });
    }
}

fn error_outcome(err: &KernelError) -> DispatchOutcome {
    DispatchOutcome::Error { kind: err.kind().to_string(), message: err.to_string() }
}

/// Apply `command`'s parameter schema to `args` (§4.F "apply the argument
/// schema", §7 `InvalidArgs` "the command's parameter schema was
/// violated"). `args` is expected to be a JSON object keyed by parameter
/// name; a required parameter absent from it (and without a schema
/// `default`) or present with the wrong JSON type fails validation.
fn validate_args(command: &Command, args: &serde_json::Value) -> std::result::Result<(), String> {
    let obj = args.as_object();
    for param in &command.parameters {
        let value = obj.and_then(|o| o.get(&param.name));
        match value {
            Some(v) => {
                if !type_matches(&param.param_type, v) {
                    return Err(format!(
                        "parameter {:?} expected type {:?}, got {}",
                        param.name,
                        param.param_type,
                        json_type_name(v)
                    ));
                }
            }
            None if param.required && param.default.is_none() => {
                return Err(format!("missing required parameter {:?}", param.name));
            }
            None => {}
        }
    }
    Ok(())
}

/// Whether `value`'s JSON type matches a schema `param_type` string.
/// Unrecognized or empty type names impose no constraint (§3: parameter
/// schema is free-form per-entry; the core only enforces the types it
/// recognizes rather than rejecting skill-defined extensions).
fn type_matches(param_type: &str, value: &serde_json::Value) -> bool {
    match param_type.to_ascii_lowercase().as_str() {
        "" => true,
        "string" | "str" | "text" => value.is_string(),
        "integer" | "int" => value.is_i64() || value.is_u64(),
        "number" | "float" | "double" => value.is_number(),
        "boolean" | "bool" => value.is_boolean(),
        "array" | "list" => value.is_array(),
        "object" | "dict" | "map" | "json" => value.is_object(),
        _ => true,
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::HandlerTable;
    use skill_context::environment::EnvironmentConfig;
    use std::time::Duration;

    fn write_skill(dir: &std::path::Path, name: &str, mode: &str) {
        std::fs::write(
            dir.join("skill.toml"),
            format!("name = \"{name}\"\nversion = 1\ndescription = \"d\"\nexecution_mode = \"{mode}\"\n"),
        )
        .unwrap();
        std::fs::write(
            dir.join("commands.toml"),
            "[[command]]\nname = \"run\"\ndescription = \"do a thing\"\n",
        )
        .unwrap();
    }

    fn write_skill_with_required_int_param(dir: &std::path::Path, name: &str) {
        std::fs::write(
            dir.join("skill.toml"),
            format!("name = \"{name}\"\nversion = 1\ndescription = \"d\"\nexecution_mode = \"direct\"\n"),
        )
        .unwrap();
        std::fs::write(
            dir.join("commands.toml"),
            "[[command]]\n\
             name = \"run\"\n\
             description = \"do a thing\"\n\
             [[command.parameters]]\n\
             name = \"count\"\n\
             type = \"integer\"\n\
             required = true\n",
        )
        .unwrap();
    }

    async fn setup_direct(handler: crate::loader::DirectHandler) -> (Arc<SkillRegistry>, Dispatch, tempfile::TempDir) {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("demo")).unwrap();
        write_skill(&root.path().join("demo"), "demo", "direct");

        let mut table = HandlerTable::new();
        table.register("demo", "run", handler);
        let loader = Arc::new(ModuleLoader::new(Arc::new(table)));
        let registry = Arc::new(SkillRegistry::new(root.path(), loader.clone()));
        registry.load("demo").await.unwrap();

        let isolator = Arc::new(SubprocessIsolator::new(EnvironmentConfig::new()));
        let feedback_path = root.path().join("feedback.json");
        let feedback = Arc::new(FeedbackStore::load(feedback_path).await.unwrap());

        let dispatch = Dispatch::new(registry.clone(), loader, isolator, feedback);
        (registry, dispatch, root)
    }

    #[tokio::test]
    async fn direct_dispatch_returns_handler_payload() {
        let handler: crate::loader::DirectHandler =
            Arc::new(|args| Box::pin(async move { Ok(serde_json::json!({"echo": args})) }));
        let (_registry, dispatch, _root) = setup_direct(handler).await;

        let outcome = dispatch
            .execute("run demo", "demo", "run", serde_json::json!({"x": 1}), Duration::from_secs(5))
            .await;

        match outcome {
            DispatchOutcome::Ok { payload } => assert_eq!(payload["echo"]["x"], 1),
            DispatchOutcome::Error { .. } => panic!("expected ok"),
        }
    }

    #[tokio::test]
    async fn unknown_skill_returns_not_found() {
        let handler: crate::loader::DirectHandler = Arc::new(|_| Box::pin(async { Ok(serde_json::Value::Null) }));
        let (_registry, dispatch, _root) = setup_direct(handler).await;

        let outcome = dispatch
            .execute("q", "nope", "run", serde_json::json!({}), Duration::from_secs(1))
            .await;

        match outcome {
            DispatchOutcome::Error { kind, .. } => assert_eq!(kind, "CommandNotFound"),
            DispatchOutcome::Ok { .. } => panic!("expected error"),
        }
    }

    #[tokio::test]
    async fn handler_exceeding_timeout_returns_timeout_error() {
        let handler: crate::loader::DirectHandler = Arc::new(|_| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(serde_json::Value::Null)
            })
        });
        let (_registry, dispatch, _root) = setup_direct(handler).await;

        let outcome = dispatch
            .execute("q", "demo", "run", serde_json::json!({}), Duration::from_millis(50))
            .await;

        match outcome {
            DispatchOutcome::Error { kind, .. } => assert_eq!(kind, "Timeout"),
            DispatchOutcome::Ok { .. } => panic!("expected timeout error"),
        }
    }

    #[tokio::test]
    async fn missing_required_param_returns_invalid_args() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("demo")).unwrap();
        write_skill_with_required_int_param(&root.path().join("demo"), "demo");

        let handler: crate::loader::DirectHandler =
            Arc::new(|args| Box::pin(async move { Ok(args) }));
        let mut table = HandlerTable::new();
        table.register("demo", "run", handler);
        let loader = Arc::new(ModuleLoader::new(Arc::new(table)));
        let registry = Arc::new(SkillRegistry::new(root.path(), loader.clone()));
        registry.load("demo").await.unwrap();
        let isolator = Arc::new(SubprocessIsolator::new(EnvironmentConfig::new()));
        let feedback = Arc::new(FeedbackStore::load(root.path().join("feedback.json")).await.unwrap());
        let dispatch = Dispatch::new(registry, loader, isolator, feedback);

        let outcome = dispatch
            .execute("q", "demo", "run", serde_json::json!({}), Duration::from_secs(1))
            .await;

        match outcome {
            DispatchOutcome::Error { kind, .. } => assert_eq!(kind, "InvalidArgs"),
            DispatchOutcome::Ok { .. } => panic!("expected invalid args error"),
        }
    }

    #[tokio::test]
    async fn wrong_typed_param_returns_invalid_args() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("demo")).unwrap();
        write_skill_with_required_int_param(&root.path().join("demo"), "demo");

        let handler: crate::loader::DirectHandler =
            Arc::new(|args| Box::pin(async move { Ok(args) }));
        let mut table = HandlerTable::new();
        table.register("demo", "run", handler);
        let loader = Arc::new(ModuleLoader::new(Arc::new(table)));
        let registry = Arc::new(SkillRegistry::new(root.path(), loader.clone()));
        registry.load("demo").await.unwrap();
        let isolator = Arc::new(SubprocessIsolator::new(EnvironmentConfig::new()));
        let feedback = Arc::new(FeedbackStore::load(root.path().join("feedback.json")).await.unwrap());
        let dispatch = Dispatch::new(registry, loader, isolator, feedback);

        let outcome = dispatch
            .execute("q", "demo", "run", serde_json::json!({"count": "not a number"}), Duration::from_secs(1))
            .await;

        match outcome {
            DispatchOutcome::Error { kind, .. } => assert_eq!(kind, "InvalidArgs"),
            DispatchOutcome::Ok { .. } => panic!("expected invalid args error"),
        }
    }

    #[tokio::test]
    async fn valid_args_pass_schema_validation() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("demo")).unwrap();
        write_skill_with_required_int_param(&root.path().join("demo"), "demo");

        let handler: crate::loader::DirectHandler =
            Arc::new(|args| Box::pin(async move { Ok(args) }));
        let mut table = HandlerTable::new();
        table.register("demo", "run", handler);
        let loader = Arc::new(ModuleLoader::new(Arc::new(table)));
        let registry = Arc::new(SkillRegistry::new(root.path(), loader.clone()));
        registry.load("demo").await.unwrap();
        let isolator = Arc::new(SubprocessIsolator::new(EnvironmentConfig::new()));
        let feedback = Arc::new(FeedbackStore::load(root.path().join("feedback.json")).await.unwrap());
        let dispatch = Dispatch::new(registry, loader, isolator, feedback);

        let outcome = dispatch
            .execute("q", "demo", "run", serde_json::json!({"count": 3}), Duration::from_secs(1))
            .await;

        match outcome {
            DispatchOutcome::Ok { payload } => assert_eq!(payload["count"], 3),
            DispatchOutcome::Error { kind, message } => panic!("expected ok, got {kind}: {message}"),
        }
    }

    #[tokio::test]
    async fn successful_dispatch_eventually_records_positive_feedback() {
        let handler: crate::loader::DirectHandler =
            Arc::new(|_| Box::pin(async { Ok(serde_json::Value::Null) }));
        let (_registry, dispatch, _root) = setup_direct(handler).await;

        let feedback = dispatch.feedback.clone();
        dispatch
            .execute("deploy the service", "demo", "run", serde_json::json!({}), Duration::from_secs(5))
            .await;

        // Feedback recording is fire-and-forget; give the spawned task a
        // moment to land before asserting on it.
        for _ in 0..20 {
            let boost = feedback.get_boost("deploy the service", "demo").await.unwrap();
            if boost > 0.0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("feedback was never recorded");
    }
}
