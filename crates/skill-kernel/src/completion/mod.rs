//! Concrete `CompletionProvider` adapters (§6, `Inference.complete`).
//!
//! Mirrors `embeddings/`'s per-backend file layout — one file per provider,
//! gated behind the same `ollama`/`openai` feature names the workspace
//! `Cargo.toml` already declares `ollama-rs`/`async-openai` under. The
//! embedding side of `Inference` is backed by `rig-core`; the completion
//! side talks to each provider's own crate directly, since neither is a
//! completion client.

#[cfg(feature = "ollama")]
mod ollama;
#[cfg(feature = "openai")]
mod openai;

#[cfg(feature = "ollama")]
pub use ollama::{OllamaCompletionProvider, DEFAULT_OLLAMA_COMPLETION_MODEL};
#[cfg(feature = "openai")]
pub use openai::{OpenAICompletionProvider, DEFAULT_OPENAI_COMPLETION_MODEL};
