//! OpenAI completion provider: chat completion against the OpenAI API,
//! the completion-side counterpart to `embeddings::OpenAIEmbedProvider`.

use crate::inference::{CompletionProvider, CompletionResponse, Message, Role, ToolDescriptor};
use anyhow::Context;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

pub const DEFAULT_OPENAI_COMPLETION_MODEL: &str = "gpt-4o-mini";

pub struct OpenAICompletionProvider {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAICompletionProvider {
    /// Reads `OPENAI_API_KEY` from the environment, same as the embedding provider.
    pub fn new() -> Self {
        Self::with_model(DEFAULT_OPENAI_COMPLETION_MODEL)
    }

    pub fn with_model(model: &str) -> Self {
        Self { client: Client::new(), model: model.to_string() }
    }

    pub fn with_api_key(api_key: &str, model: &str) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self { client: Client::with_config(config), model: model.to_string() }
    }
}

impl Default for OpenAICompletionProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionProvider for OpenAICompletionProvider {
    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[ToolDescriptor],
        temperature: Option<f32>,
    ) -> anyhow::Result<CompletionResponse> {
        let mut chat_messages = Vec::with_capacity(messages.len());
        for message in messages {
            let built = match message.role {
                Role::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(message.content.clone())
                    .build()?
                    .into(),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(message.content.clone())
                    .build()?
                    .into(),
                // OpenAI's tool-result role needs a call id we don't carry
                // through `Message`; fold tool turns into user turns.
                Role::User | Role::Tool => ChatCompletionRequestUserMessageArgs::default()
                    .content(message.content.clone())
                    .build()?
                    .into(),
            };
            chat_messages.push(built);
        }

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(self.model.clone()).messages(chat_messages);
        if let Some(temp) = temperature {
            builder.temperature(temp);
        }
        let request = builder.build().context("failed to build OpenAI chat request")?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .context("OpenAI chat completion request failed")?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        Ok(CompletionResponse { text, tool_calls: Vec::new() })
    }
}
