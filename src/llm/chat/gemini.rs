use async_trait::async_trait;
use log::info;

use super::{ BoxError, ChatClient, CompletionResponse };
use crate::llm::LlmConfig;
use crate::models::chat::{ ConversationMessage, Role };
use rllm::chat::{ ChatMessage, ChatRole, MessageType };
use rllm::builder::{ LLMBackend, LLMBuilder };
use rllm::LLMProvider;

const DEFAULT_MODEL: &str = "gemini-1.5-flash-latest";
const MAX_REPLY_TOKENS: u32 = 2048;

pub struct GeminiChatClient {
    llm: Box<dyn LLMProvider + Send + Sync>,
    model: String,
    base_url: Option<String>,
}

/// rllm only knows user and assistant turns, so instructions travel as a labelled user turn.
fn to_rllm_messages(messages: &[ConversationMessage]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|m| {
            let (role, content) = match m.role {
                Role::System => (ChatRole::User, format!("[Instructions]\n{}", m.content)),
                Role::User => (ChatRole::User, m.content.clone()),
                Role::Assistant => (ChatRole::Assistant, m.content.clone()),
            };
            ChatMessage {
                role,
                content,
                message_type: MessageType::Text,
            }
        })
        .collect()
}

impl GeminiChatClient {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Result<Self, BoxError> {
        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let builder = LLMBuilder::new()
            .backend(LLMBackend::Google)
            .api_key(api_key)
            .model(&model)
            .max_tokens(MAX_REPLY_TOKENS)
            .stream(false);
        let builder = match &base_url {
            Some(url) => builder.base_url(url),
            None => builder,
        };

        Ok(Self { llm: builder.build()?, model, base_url })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, BoxError> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| "Google API key is required for GeminiChatClient".to_string())?;

        Self::new(api_key, config.completion_model.clone(), config.base_url.clone())
    }
}

#[async_trait]
impl ChatClient for GeminiChatClient {
    async fn complete(
        &self,
        messages: &[ConversationMessage]
    ) -> Result<CompletionResponse, BoxError> {
        let messages = to_rllm_messages(messages);
        info!("Gemini completion with {} turns (model {})", messages.len(), self.model);
        let resp = self.llm.chat(&messages).await?;
        let text = resp
            .text()
            .map(|s| s.to_string())
            .unwrap_or_else(|| resp.to_string());
        Ok(CompletionResponse { response: text })
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        self.base_url.clone()
    }
}
