//! Wires the kernel's collaborators together for the CLI binary: the one
//! place that turns `skill-kernel.toml` plus CLI flags into a
//! `SkillRegistry` + `HolographicIndex` + `FeedbackStore` + `ContextSniffer`
//! + `SemanticRouter` + `Dispatch` bundle, grounded on the teacher's
//! `embeddings::EmbeddingProviderFactory` "config struct in, trait object
//! out" idiom, generalized here to the whole collaborator graph instead of
//! just the embedder.

use anyhow::{Context, Result};
use skill_context::environment::EnvironmentConfig;
use skill_kernel::{
    embeddings::{create_provider, EmbeddingConfig},
    loader::{HandlerTable, ModuleLoader},
    AuditLogger, CredentialStore, Dispatch, EmptyKnowledgeStore, FeedbackStore, HolographicIndex,
    Inference, InMemoryVectorStore, KernelConfig, SemanticRouter, SkillRegistry, SubprocessIsolator,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Default completion provider when none is named explicitly (§6: no
/// particular provider is required; this CLI defaults to the provider its
/// `default` feature set compiles in).
const DEFAULT_COMPLETION_PROVIDER: &str = "ollama";

/// The fully wired application: every core component (§2) with its
/// collaborators resolved, ready for a command to call into.
pub struct App {
    pub config: KernelConfig,
    pub registry: Arc<SkillRegistry>,
    pub index: Arc<HolographicIndex>,
    pub feedback: Arc<FeedbackStore>,
    pub router: SemanticRouter,
    pub dispatch: Dispatch,
}

impl App {
    /// Build the application from an optional `skill-kernel.toml` path
    /// (auto-detected in the current directory if not given) and an
    /// optional completion-provider override.
    pub async fn build(manifest: Option<&PathBuf>, completion_provider: Option<&str>) -> Result<Self> {
        let config = load_config(manifest)?;
        std::fs::create_dir_all(&config.state_dir)
            .with_context(|| format!("creating state dir {}", config.state_dir.display()))?;

        let handlers = Arc::new(HandlerTable::new());
        let loader = Arc::new(ModuleLoader::new(handlers));
        let registry = Arc::new(SkillRegistry::new(config.skills_dir.clone(), loader.clone()));

        let inference = build_inference(completion_provider.unwrap_or(DEFAULT_COMPLETION_PROVIDER))?;

        let vectors = Arc::new(InMemoryVectorStore::new());
        let index = Arc::new(
            HolographicIndex::with_bm25_dir(vectors, inference.clone(), config.index_dir())
                .context("initializing holographic index")?,
        );

        let feedback = Arc::new(
            FeedbackStore::load(config.feedback_path())
                .await
                .context("loading feedback store")?,
        );

        let sniffer_root = config.skills_dir.clone();
        let scratchpad = config.state_dir.join("SCRATCHPAD.md");
        let sniffer = Arc::new(skill_kernel::ContextSniffer::new(sniffer_root, scratchpad));

        let audit = Arc::new(AuditLogger::new().context("initializing audit logger")?);
        let credentials = CredentialStore::with_audit_logger(audit.clone());
        let mut env = EnvironmentConfig::new();
        for var in &config.default_passthrough_vars {
            env = env.with_passthrough_var(var.clone());
        }
        let isolator = Arc::new(
            SubprocessIsolator::new(env)
                .with_credential_store(credentials)
                .with_audit_logger(audit),
        );

        let router = SemanticRouter::new(
            registry.clone(),
            index.clone(),
            feedback.clone(),
            sniffer,
            Arc::new(EmptyKnowledgeStore),
            inference,
        );

        let dispatch = Dispatch::new(registry.clone(), loader, isolator, feedback.clone());

        Ok(Self { config, registry, index, feedback, router, dispatch })
    }
}

fn load_config(manifest: Option<&PathBuf>) -> Result<KernelConfig> {
    if let Some(path) = manifest {
        return KernelConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()));
    }

    let default_path = PathBuf::from("skill-kernel.toml");
    if default_path.exists() {
        return KernelConfig::from_file(&default_path)
            .with_context(|| format!("loading {}", default_path.display()));
    }

    Ok(KernelConfig::default())
}

fn build_inference(provider: &str) -> Result<Arc<dyn Inference>> {
    let embedder = create_provider(&EmbeddingConfig::default()).context("building embedding provider")?;

    match provider {
        #[cfg(feature = "ollama")]
        "ollama" => {
            let completer = skill_kernel::OllamaCompletionProvider::new();
            Ok(Arc::new(skill_kernel::CompositeInference::new(embedder, completer)))
        }
        #[cfg(feature = "openai")]
        "openai" => {
            let completer = skill_kernel::OpenAICompletionProvider::new();
            Ok(Arc::new(skill_kernel::CompositeInference::new(embedder, completer)))
        }
        other => anyhow::bail!(
            "completion provider {other:?} is not available (not compiled in, or unknown)"
        ),
    }
}
