use async_trait::async_trait;
use log::info;
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use std::time::Duration;

use super::{ http_stream_generate, BoxError, ChatClient, StreamLine, TokenStream };
use crate::llm::LlmConfig;
use crate::models::chat::ConversationMessage;

#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    completion_model: String,
    request_timeout: Option<Duration>,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ConversationMessage>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatMessageBody {
    content: String,
}

#[derive(Deserialize)]
struct StreamResponse {
    message: Option<ChatMessageBody>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

pub fn parse_ollama_line(line: &str) -> StreamLine {
    let line = line.trim();
    if line.is_empty() {
        return StreamLine::Skip;
    }
    match serde_json::from_str::<StreamResponse>(line) {
        Ok(StreamResponse { error: Some(err), .. }) => StreamLine::Failed(err),
        Ok(StreamResponse { message: Some(msg), .. }) if !msg.content.is_empty() => {
            StreamLine::Token(msg.content)
        }
        Ok(StreamResponse { done: true, .. }) => StreamLine::Done,
        Ok(_) => StreamLine::Skip,
        Err(e) => {
            info!("JSON parse error: {} for line: {}", e, line);
            StreamLine::Skip
        }
    }
}

impl OllamaClient {
    pub fn new(
        base_url: Option<String>,
        completion_model: Option<String>,
        request_timeout: Option<Duration>
    ) -> Self {
        let model = completion_model.unwrap_or_else(|| "llama3.1".to_string());
        let url = base_url.unwrap_or_else(|| "http://localhost:11434".into());

        Self {
            http: HttpClient::new(),
            base_url: url.trim_end_matches('/').to_string(),
            completion_model: model,
            request_timeout,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, BoxError> {
        if config.llm_type != crate::llm::LlmType::Ollama {
            return Err("Invalid config type for OllamaClient".into());
        }

        Ok(
            Self::new(
                config.base_url.clone(),
                config.completion_model.clone(),
                config.request_timeout
            )
        )
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn stream_completion(
        &self,
        messages: &[ConversationMessage]
    ) -> Result<TokenStream, BoxError> {
        let req = ChatRequest {
            model: self.completion_model.clone(),
            messages: messages.to_vec(),
            stream: true,
        };
        http_stream_generate(
            self.http.clone(),
            self.chat_url(),
            req,
            parse_ollama_line,
            None,
            self.request_timeout
        ).await
    }

    fn get_model(&self) -> String {
        self.completion_model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}
