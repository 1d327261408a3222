//! Exercises the command handlers against a hand-wired kernel, the way
//! `skill-kernel`'s own modules test against a temp-dir fixture rather than
//! spawning the `skill` binary.

use async_trait::async_trait;
use serde_json::json;
use skill_cli::commands::{dispatch, exit_code_for_kind, index, skill};
use skill_kernel::{
    loader::{DirectHandler, HandlerTable, ModuleLoader},
    CompletionResponse, Dispatch, EmptyKnowledgeStore, FeedbackStore, HolographicIndex, Inference,
    InMemoryVectorStore, KnowledgeStore, Message, SemanticRouter, SkillRegistry, SubprocessIsolator,
    ToolDescriptor,
};
use skill_context::environment::EnvironmentConfig;
use std::sync::Arc;
use std::time::Duration;

/// Deterministic stand-in for a real model: `embed` hashes text length into
/// a fixed-size vector, `complete` just echoes the last user message.
struct FakeInference;

#[async_trait]
impl Inference for FakeInference {
    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[ToolDescriptor],
        _temperature: Option<f32>,
    ) -> skill_kernel::errors::Result<CompletionResponse> {
        let text = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        Ok(CompletionResponse { text, tool_calls: Vec::new() })
    }

    async fn embed(&self, texts: &[String]) -> skill_kernel::errors::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| vec![t.len() as f32, 0.0, 0.0, 0.0]).collect())
    }

    fn embedding_dimensions(&self) -> Option<usize> {
        Some(4)
    }
}

fn write_git_skill(dir: &std::path::Path) {
    std::fs::write(
        dir.join("skill.toml"),
        "name = \"git\"\nversion = 1\ndescription = \"git operations\"\nkeywords = [\"vcs\"]\nexecution_mode = \"direct\"\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("commands.toml"),
        "[[command]]\nname = \"status\"\ndescription = \"show working tree status\"\ncategory = \"read\"\n",
    )
    .unwrap();
}

fn status_handler() -> DirectHandler {
    Arc::new(|_args| Box::pin(async { Ok(json!({"clean": true})) }))
}

struct Fixture {
    registry: Arc<SkillRegistry>,
    index: Arc<HolographicIndex>,
    feedback: Arc<FeedbackStore>,
    dispatch: Dispatch,
    router: SemanticRouter,
}

async fn build_fixture(skills_dir: &std::path::Path, state_dir: &std::path::Path) -> Fixture {
    let mut table = HandlerTable::new();
    table.register("git", "status", status_handler());
    let loader = Arc::new(ModuleLoader::new(Arc::new(table)));
    let registry = Arc::new(SkillRegistry::new(skills_dir, loader.clone()));

    let inference: Arc<dyn Inference> = Arc::new(FakeInference);
    let vectors = Arc::new(InMemoryVectorStore::new());
    let index = Arc::new(
        HolographicIndex::with_bm25_dir(vectors, inference.clone(), state_dir.join("index")).unwrap(),
    );

    let feedback = Arc::new(FeedbackStore::load(state_dir.join("feedback.json")).await.unwrap());
    let sniffer = Arc::new(skill_kernel::ContextSniffer::new(
        skills_dir.to_path_buf(),
        state_dir.join("SCRATCHPAD.md"),
    ));
    let knowledge: Arc<dyn KnowledgeStore> = Arc::new(EmptyKnowledgeStore);
    let router = SemanticRouter::new(
        registry.clone(),
        index.clone(),
        feedback.clone(),
        sniffer,
        knowledge,
        inference,
    );

    let isolator = Arc::new(SubprocessIsolator::new(EnvironmentConfig::new()));
    let dispatch = Dispatch::new(registry.clone(), loader, isolator, feedback.clone());

    Fixture { registry, index, feedback, dispatch, router }
}

#[tokio::test]
async fn dispatching_an_unknown_skill_is_exit_code_two() {
    let skills = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    let fx = build_fixture(skills.path(), state.path()).await;

    let outcome = fx
        .dispatch
        .execute("probe", "nonexistent", "status", json!({}), Duration::from_secs(1))
        .await;
    let code = match outcome {
        skill_kernel::DispatchOutcome::Ok { .. } => 0,
        skill_kernel::DispatchOutcome::Error { kind, .. } => exit_code_for_kind(&kind),
    };
    assert_eq!(code, 2);
}

#[tokio::test]
async fn loading_then_dispatching_a_direct_skill_succeeds() {
    let skills = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    write_git_skill(skills.path());
    let fx = build_fixture(skills.path(), state.path()).await;

    fx.registry.load("git").await.unwrap();
    let outcome = fx
        .dispatch
        .execute("probe", "git", "status", json!({}), Duration::from_secs(1))
        .await;
    match outcome {
        skill_kernel::DispatchOutcome::Ok { payload } => {
            assert_eq!(payload, json!({"clean": true}));
        }
        skill_kernel::DispatchOutcome::Error { kind, message } => {
            panic!("expected success, got {kind}: {message}")
        }
    }
}

#[tokio::test]
async fn reconcile_indexes_loaded_skills_and_drops_stale_entries() {
    let skills = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    write_git_skill(skills.path());
    let fx = build_fixture(skills.path(), state.path()).await;

    fx.registry.load("git").await.unwrap();
    let mut entries = Vec::new();
    for name in fx.registry.list_loaded().await {
        let s = fx.registry.get(&name).await.unwrap();
        for command in &s.commands {
            entries.push(skill_kernel::ToolEntry::from_skill_command(&s, command));
        }
    }
    let report = fx.index.reconcile(&entries).await.unwrap();
    assert_eq!(report.reindexed, 1);
    assert_eq!(report.removed, 0);

    let report_again = fx.index.reconcile(&entries).await.unwrap();
    assert_eq!(report_again.reindexed, 0);
    assert_eq!(report_again.removed, 0);
}

#[tokio::test]
async fn parse_args_rejects_bare_values() {
    let err = dispatch::parse_args(&["not-a-pair".to_string()]).unwrap_err();
    assert!(err.to_string().contains("key=value"));
}

#[tokio::test]
async fn parse_args_accepts_json_and_plain_values() {
    let parsed = dispatch::parse_args(&["count=3".to_string(), "name=git".to_string()]).unwrap();
    assert_eq!(parsed["count"], json!(3));
    assert_eq!(parsed["name"], json!("git"));
}

#[tokio::test]
async fn skill_list_reports_available_and_loaded_separately() {
    let skills = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    write_git_skill(skills.path());
    let fx = build_fixture(skills.path(), state.path()).await;

    assert_eq!(skill::list(&dummy_app(&fx), false).await, 0);
    fx.registry.load("git").await.unwrap();
    assert_eq!(skill::list(&dummy_app(&fx), true).await, 0);
}

#[tokio::test]
async fn routing_a_loaded_skill_returns_a_non_empty_brief() {
    let skills = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    write_git_skill(skills.path());
    let fx = build_fixture(skills.path(), state.path()).await;
    fx.registry.load("git").await.unwrap();

    let result = fx.router.route("check repository status").await.unwrap();
    assert!(!result.task_brief.is_empty());
}

// `index::reconcile` and `skill::{load,unload,reload}` take `&App`, which
// owns its collaborators outright rather than borrowing them; build a
// minimal one here instead of changing the handler signatures for tests.
fn dummy_app(fx: &Fixture) -> skill_cli::app::App {
    skill_cli::app::App {
        config: skill_kernel::KernelConfig::default(),
        registry: fx.registry.clone(),
        index: fx.index.clone(),
        feedback: fx.feedback.clone(),
        router: SemanticRouter::new(
            fx.registry.clone(),
            fx.index.clone(),
            fx.feedback.clone(),
            Arc::new(skill_kernel::ContextSniffer::new(
                std::env::temp_dir(),
                std::env::temp_dir().join("SCRATCHPAD.md"),
            )),
            Arc::new(EmptyKnowledgeStore),
            Arc::new(FakeInference),
        ),
        dispatch: Dispatch::new(
            fx.registry.clone(),
            Arc::new(ModuleLoader::new(Arc::new(HandlerTable::new()))),
            Arc::new(SubprocessIsolator::new(EnvironmentConfig::new())),
            fx.feedback.clone(),
        ),
    }
}

#[tokio::test]
async fn index_reconcile_via_command_handler_reports_counts() {
    let skills = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    write_git_skill(skills.path());
    let fx = build_fixture(skills.path(), state.path()).await;
    let app = dummy_app(&fx);
    assert_eq!(index::reconcile(&app).await, 0);
}
