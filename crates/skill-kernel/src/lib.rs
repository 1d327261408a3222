//! Agentic Skill Kernel - core runtime for loadable, versioned "skills"
//! dispatched either in-process or in an isolated subprocess, discovered
//! through a hybrid dense+sparse index and routed to by a confidence-scored
//! semantic router.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                     SemanticRouter                      │
//! │   (HolographicIndex + FeedbackStore + ContextSniffer    │
//! │              + Inference -> RoutingResult)              │
//! └────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌────────────────────────────────────────────────────────┐
//! │                        AgentLoop                        │
//! │      (Observe/Orient/Act over a bounded step budget)    │
//! └────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌────────────────────────────────────────────────────────┐
//! │                         Dispatch                        │
//! │    (direct in-process handler, or SubprocessIsolator)    │
//! └────────────────────────────────────────────────────────┘
//!                            │
//!                 ┌──────────┴──────────┐
//!                 ▼                     ▼
//!          ┌─────────────┐      ┌───────────────┐
//!          │ SkillRegistry│      │ FeedbackStore │
//!          │ (ModuleLoader)│      │ (reinforcement)│
//!          └─────────────┘      └───────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use skill_kernel::loader::ModuleLoader;
//! use skill_kernel::registry::SkillRegistry;
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let loader = Arc::new(ModuleLoader::new(Arc::new(Default::default())));
//! let registry = SkillRegistry::new("./skills", loader);
//! registry.load("git").await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod agent_loop;
pub mod audit;
pub mod completion;
pub mod config;
pub mod context_builder;
pub mod credentials;
pub mod dispatch;
pub mod embeddings;
pub mod errors;
pub mod feedback;
pub mod index;
pub mod inference;
pub mod knowledge;
pub mod loader;
pub mod manifest;
pub mod metrics;
pub mod registry;
pub mod router;
pub mod search;
pub mod skill_md;
pub mod sniffer;
pub mod subprocess;
pub mod types;
pub mod vector_store;

pub use agent_loop::{AgentLoop, AgentResult, Reviewer, ToolInvocation, DEFAULT_STEP_BUDGET};
pub use audit::{AuditEntry, AuditEventType, AuditLogger};
pub use config::{expand_env_vars, KernelConfig};
pub use context_builder::{build_menu, build_skill_context};
pub use credentials::{parse_keyring_reference, CredentialStore, SecureString};
pub use dispatch::Dispatch;
pub use errors::{KernelError, Result};
pub use feedback::FeedbackStore;
pub use index::{HolographicIndex, HybridSearchResult, ReconcileReport, ALPHA};
pub use inference::{
    CompletionProvider, CompositeInference, CompletionResponse, Inference, Message, Role,
    ToolCall, ToolDescriptor,
};
pub use knowledge::{EmptyKnowledgeStore, KnowledgeEntry, KnowledgeStore, HARVESTED_INSIGHT_DOMAIN};
pub use loader::{DirectHandler, HandlerTable, ModuleLoader};
pub use manifest::{CommandManifest, CommandManifestEntry, SkillManifestFile};
pub use metrics::ExecutionMetrics;
pub use registry::{RegistryObserver, SkillRegistry};
pub use router::{SemanticRouter, DEFAULT_TOP_K};
pub use skill_md::{
    find_skill_md, parse_skill_md, parse_skill_md_content, CodeExample, ParameterDoc,
    SkillMdContent, SkillMdFrontmatter, ToolDocumentation,
};
pub use sniffer::ContextSniffer;
pub use subprocess::{SubprocessIsolator, SubprocessResult};
pub use types::{
    ChangeType, Command, CommandCategory, DispatchOutcome, EnvironmentSnapshot, ExecutionMode,
    ParameterSpec, RoutingResult, Skill, SkillChangeEvent, ToolEntry,
};
pub use vector_store::{
    cosine_similarity, euclidean_distance, DeleteStats, DocumentMetadata, EmbeddedDocument,
    Filter, HealthStatus, InMemoryVectorStore, SearchResult, UpsertStats, VectorStore,
};

#[cfg(feature = "qdrant")]
pub use vector_store::{QdrantConfig, QdrantVectorStore};

pub use embeddings::{
    create_provider, EmbeddingConfig, EmbeddingProvider, EmbeddingProviderFactory,
    EmbeddingProviderType, FastEmbedModel, FastEmbedProvider, OllamaProvider,
    OpenAIEmbedProvider, OpenAIEmbeddingModel,
};

pub use search::{
    reciprocal_rank_fusion, weighted_sum_fusion, BM25Config, BM25Index, BM25SearchResult,
    FusedResult, FusionMethod,
};

#[cfg(feature = "ollama")]
pub use completion::{OllamaCompletionProvider, DEFAULT_OLLAMA_COMPLETION_MODEL};
#[cfg(feature = "openai")]
pub use completion::{OpenAICompletionProvider, DEFAULT_OPENAI_COMPLETION_MODEL};
