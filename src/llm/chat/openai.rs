use async_trait::async_trait;
use log::info;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use std::time::Duration;

use super::{ http_stream_generate, BoxError, ChatClient, StreamLine, TokenStream };
use crate::llm::LlmConfig;
use crate::models::chat::ConversationMessage;

/// Chat-completions client for OpenAI and compatible APIs (Groq, xAI, DeepSeek, ...).
pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
    request_timeout: Option<Duration>,
}

#[derive(Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<ConversationMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAIStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    error: Option<OpenAIErrorBody>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIErrorBody {
    message: String,
}

pub fn parse_openai_line(line: &str) -> StreamLine {
    let data = match line.trim().strip_prefix("data:") {
        Some(d) => d.trim(),
        None => {
            return StreamLine::Skip;
        }
    };
    if data == "[DONE]" {
        return StreamLine::Done;
    }
    let resp = match serde_json::from_str::<OpenAIStreamResponse>(data) {
        Ok(r) => r,
        Err(e) => {
            info!("JSON parse error: {} for data: {}", e, data);
            return StreamLine::Skip;
        }
    };
    if let Some(err) = resp.error {
        return StreamLine::Failed(err.message);
    }
    let Some(choice) = resp.choices.into_iter().next() else {
        return StreamLine::Skip;
    };
    match (choice.delta.content, choice.finish_reason) {
        (Some(content), _) if !content.is_empty() => StreamLine::Token(content),
        (_, Some(_)) => StreamLine::Done,
        _ => StreamLine::Skip,
    }
}

impl OpenAIChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        request_timeout: Option<Duration>
    ) -> Result<Self, BoxError> {
        let chat_model = model.unwrap_or_else(|| "gpt-4o".to_string());
        let api_url = base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e|
                format!("Invalid API key format: {}", e)
            )?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Box::new(e) as BoxError)?;

        Ok(Self {
            http,
            model: chat_model,
            base_url: api_url,
            request_timeout,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, BoxError> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| "OpenAI API key is required".to_string())?;

        Self::new(
            api_key,
            config.completion_model.clone(),
            config.base_url.clone(),
            config.request_timeout
        )
    }

    fn completions_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }

    fn streaming_request(&self, messages: &[ConversationMessage]) -> OpenAIChatRequest {
        OpenAIChatRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            temperature: 0.7,
            max_tokens: Some(2048),
            stream: true,
        }
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn stream_completion(
        &self,
        messages: &[ConversationMessage]
    ) -> Result<TokenStream, BoxError> {
        info!("Streaming chat completion from {} (model {})", self.base_url, self.model);
        http_stream_generate(
            self.http.clone(),
            self.completions_url(),
            self.streaming_request(messages),
            parse_openai_line,
            None,
            self.request_timeout
        ).await
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}
