//! Ollama completion provider: chat completion against a local Ollama
//! server, the completion-side counterpart to `embeddings::OllamaProvider`
//! (which embeds via `rig-core` instead; `ollama-rs` is a chat-first
//! client and the more natural fit here).

use crate::inference::{CompletionProvider, CompletionResponse, Message, Role, ToolDescriptor};
use anyhow::Context;
use async_trait::async_trait;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::chat::ChatMessage;
use ollama_rs::generation::options::GenerationOptions;
use ollama_rs::Ollama;

/// Default chat model; distinct from `embeddings::ollama::DEFAULT_OLLAMA_MODEL`,
/// which names an embedding-only model.
pub const DEFAULT_OLLAMA_COMPLETION_MODEL: &str = "llama3.1";

pub struct OllamaCompletionProvider {
    client: Ollama,
    model: String,
}

impl OllamaCompletionProvider {
    pub fn new() -> Self {
        Self::with_model(DEFAULT_OLLAMA_COMPLETION_MODEL)
    }

    pub fn with_model(model: &str) -> Self {
        Self { client: Ollama::default(), model: model.to_string() }
    }

    pub fn with_url(host: &str, port: u16, model: &str) -> Self {
        Self { client: Ollama::new(host.to_string(), port), model: model.to_string() }
    }
}

impl Default for OllamaCompletionProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn to_chat_message(message: &Message) -> ChatMessage {
    match message.role {
        Role::System => ChatMessage::system(message.content.clone()),
        Role::User => ChatMessage::user(message.content.clone()),
        Role::Assistant => ChatMessage::assistant(message.content.clone()),
        // Ollama's chat API has no dedicated tool-result role; fold it into
        // user turns the way a plain transcript would.
        Role::Tool => ChatMessage::user(message.content.clone()),
    }
}

#[async_trait]
impl CompletionProvider for OllamaCompletionProvider {
    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[ToolDescriptor],
        temperature: Option<f32>,
    ) -> anyhow::Result<CompletionResponse> {
        let chat_messages: Vec<ChatMessage> = messages.iter().map(to_chat_message).collect();
        let mut request = ChatMessageRequest::new(self.model.clone(), chat_messages);
        if let Some(temp) = temperature {
            request = request.options(GenerationOptions::default().temperature(temp));
        }

        let response = self
            .client
            .send_chat_messages(request)
            .await
            .context("ollama chat completion request failed; is the server running?")?;

        Ok(CompletionResponse { text: response.message.content, tool_calls: Vec::new() })
    }
}
