//! The `Inference` collaborator (§6): the one abstract capability the core
//! depends on for both completion and embedding. Concrete providers are
//! external collaborators — this module defines the trait and a thin
//! adapter that composes the teacher's already-generic `EmbeddingProvider`
//! (embeddings/) with a completion-only trait grounded on its
//! `LlmProvider` shape (formerly `generation/llm_provider.rs`, folded in
//! here since example-generation itself is out of scope for the core).

use crate::embeddings::EmbeddingProvider;
use crate::errors::{KernelError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Role-tagged message for a completion request.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A tool the model may call, described the way `skill.command` tools are
/// surfaced to it (Dispatch resolves the call; Inference just describes it).
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub id: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

/// A tool call the model requested in its completion response.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub tool_id: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

/// `Inference.complete(messages, tools?, temperature?) -> { text, tool_calls? }`
/// and `Inference.embed(texts[]) -> vectors[]` (§6).
#[async_trait]
pub trait Inference: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        temperature: Option<f32>,
    ) -> Result<CompletionResponse>;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dimensionality is fixed at first use (§6); providers that can report
    /// it ahead of an embed call should override this.
    fn embedding_dimensions(&self) -> Option<usize> {
        None
    }
}

/// Adapts the teacher's `EmbeddingProvider` trait plus any completion
/// backend implementing [`CompletionProvider`] into the single `Inference`
/// collaborator the Router and Agent Loop depend on.
pub struct CompositeInference<C: CompletionProvider> {
    embedder: Arc<dyn EmbeddingProvider>,
    completer: C,
}

impl<C: CompletionProvider> CompositeInference<C> {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, completer: C) -> Self {
        Self { embedder, completer }
    }
}

#[async_trait]
impl<C: CompletionProvider + Send + Sync> Inference for CompositeInference<C> {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        temperature: Option<f32>,
    ) -> Result<CompletionResponse> {
        self.completer
            .complete(messages, tools, temperature)
            .await
            .map_err(|e| KernelError::InferenceFailure(e.to_string()))
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embedder
            .embed_documents_batched(texts.to_vec())
            .await
            .map_err(|e| KernelError::InferenceFailure(e.to_string()))
    }

    fn embedding_dimensions(&self) -> Option<usize> {
        Some(self.embedder.dimensions())
    }
}

/// The completion half of `Inference`, kept separate from embedding so a
/// chat-completion backend (OpenAI, Ollama, ...) can be swapped
/// independently of the embedding backend.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        temperature: Option<f32>,
    ) -> anyhow::Result<CompletionResponse>;
}

#[cfg(test)]
pub mod test_support {
    use super::*;

    /// A deterministic stub used by Router/Agent-loop tests: echoes the
    /// last user message and never emits tool calls.
    pub struct EchoInference {
        pub dims: usize,
    }

    #[async_trait]
    impl Inference for EchoInference {
        async fn complete(
            &self,
            messages: &[Message],
            _tools: &[ToolDescriptor],
            _temperature: Option<f32>,
        ) -> Result<CompletionResponse> {
            let last = messages.iter().rev().find(|m| m.role == Role::User);
            Ok(CompletionResponse {
                text: last.map(|m| m.content.clone()).unwrap_or_default(),
                tool_calls: Vec::new(),
            })
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; self.dims];
                    for (i, b) in t.bytes().enumerate() {
                        v[i % self.dims] += b as f32 / 255.0;
                    }
                    v
                })
                .collect())
        }

        fn embedding_dimensions(&self) -> Option<usize> {
            Some(self.dims)
        }
    }

    /// Wraps an [`EchoInference`] with switches to fail `embed`/`complete`
    /// on demand, for exercising the Router's §7 degradation paths
    /// (`IndexUnavailable`, `InferenceFailure`) without a real backend.
    pub struct FlakyInference {
        pub inner: EchoInference,
        pub fail_embed: std::sync::atomic::AtomicBool,
        pub fail_complete: std::sync::atomic::AtomicBool,
    }

    impl FlakyInference {
        pub fn new(dims: usize) -> Self {
            Self {
                inner: EchoInference { dims },
                fail_embed: std::sync::atomic::AtomicBool::new(false),
                fail_complete: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Inference for FlakyInference {
        async fn complete(
            &self,
            messages: &[Message],
            tools: &[ToolDescriptor],
            temperature: Option<f32>,
        ) -> Result<CompletionResponse> {
            if self.fail_complete.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(KernelError::InferenceFailure("simulated inference outage".to_string()));
            }
            self.inner.complete(messages, tools, temperature).await
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.fail_embed.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(KernelError::IndexUnavailable("simulated embedding backend outage".to_string()));
            }
            self.inner.embed(texts).await
        }

        fn embedding_dimensions(&self) -> Option<usize> {
            self.inner.embedding_dimensions()
        }
    }
}
