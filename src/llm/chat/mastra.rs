//! Client for a hosted agent runtime exposing Mastra-style agent routes
//! (`POST /api/agents/{agentId}/stream`).

use async_trait::async_trait;
use log::info;
use reqwest::Client as HttpClient;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use super::{ http_stream_generate, BoxError, ChatClient, StreamLine, TokenStream };
use crate::llm::LlmConfig;
use crate::models::chat::ConversationMessage;

const DEFAULT_BASE_URL: &str = "http://localhost:4111";

pub struct MastraAgentClient {
    http: HttpClient,
    base_url: String,
    agent_id: String,
    api_key: Option<String>,
    request_timeout: Option<Duration>,
}

#[derive(Serialize)]
struct AgentStreamRequest {
    messages: Vec<ConversationMessage>,
}

/// Reads one line of an agent stream. Both encodings the runtime has shipped are understood:
/// SSE (`data: {"type":"text-delta",...}`) and the older data stream (`0:"text"`).
pub fn parse_mastra_line(line: &str) -> StreamLine {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return StreamLine::Skip;
    }

    if let Some(data) = line.strip_prefix("data:") {
        let data = data.trim();
        if data == "[DONE]" {
            return StreamLine::Done;
        }
        let event: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(_) => {
                return StreamLine::Skip;
            }
        };
        return match event.get("type").and_then(Value::as_str) {
            Some("text-delta") => {
                let text = event
                    .pointer("/payload/text")
                    .or_else(|| event.get("delta"))
                    .or_else(|| event.get("textDelta"))
                    .and_then(Value::as_str);
                match text {
                    Some(t) => StreamLine::Token(t.to_string()),
                    None => StreamLine::Skip,
                }
            }
            Some("error") => {
                let msg = event
                    .get("errorText")
                    .or_else(|| event.pointer("/payload/error"))
                    .or_else(|| event.get("error"))
                    .map(|v| {
                        match v.as_str() {
                            Some(s) => s.to_string(),
                            None => v.to_string(),
                        }
                    })
                    .unwrap_or_else(|| "agent stream reported an error".to_string());
                StreamLine::Failed(msg)
            }
            Some("finish") => StreamLine::Done,
            _ => StreamLine::Skip,
        };
    }

    match line.split_once(':') {
        Some(("0", text)) =>
            match serde_json::from_str::<String>(text) {
                Ok(t) => StreamLine::Token(t),
                Err(_) => StreamLine::Skip,
            }
        Some(("3", msg)) => {
            let msg = serde_json::from_str::<String>(msg).unwrap_or_else(|_| msg.to_string());
            StreamLine::Failed(msg)
        }
        Some(("d", _)) => StreamLine::Done,
        _ => StreamLine::Skip,
    }
}

impl MastraAgentClient {
    pub fn new(
        base_url: Option<String>,
        agent_id: String,
        api_key: Option<String>,
        request_timeout: Option<Duration>
    ) -> Result<Self, BoxError> {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let parsed = url::Url
            ::parse(&base_url)
            .map_err(|e| format!("Invalid agent base URL '{}': {}", base_url, e))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!("Agent base URL must be http(s): '{}'", base_url).into());
        }
        if agent_id.trim().is_empty() {
            return Err("Remote agent id must not be empty".into());
        }

        Ok(Self {
            http: HttpClient::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            agent_id,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            request_timeout,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, BoxError> {
        let agent_id = config.agent_id
            .clone()
            .ok_or_else(|| "A remote agent id is required for the mastra backend".to_string())?;
        Self::new(config.base_url.clone(), agent_id, config.api_key.clone(), config.request_timeout)
    }

    fn stream_url(&self) -> String {
        format!("{}/api/agents/{}/stream", self.base_url, self.agent_id)
    }

    fn auth_headers(&self) -> Option<Vec<(String, String)>> {
        self.api_key
            .as_ref()
            .map(|key| vec![("Authorization".to_string(), format!("Bearer {}", key))])
    }
}

#[async_trait]
impl ChatClient for MastraAgentClient {
    async fn stream_completion(
        &self,
        messages: &[ConversationMessage]
    ) -> Result<TokenStream, BoxError> {
        info!("Streaming from remote agent '{}' at {}", self.agent_id, self.base_url);
        http_stream_generate(
            self.http.clone(),
            self.stream_url(),
            AgentStreamRequest { messages: messages.to_vec() },
            parse_mastra_line,
            self.auth_headers(),
            self.request_timeout
        ).await
    }

    fn get_model(&self) -> String {
        self.agent_id.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }

    fn hosts_instructions(&self) -> bool {
        true
    }
}
