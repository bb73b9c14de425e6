pub mod gemini;
pub mod mastra;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use futures::{ Future, Stream, StreamExt };
use log::debug;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ LlmConfig, LlmType };
use self::gemini::GeminiChatClient;
use self::mastra::MastraAgentClient;
use self::ollama::OllamaClient;
use self::openai::OpenAIChatClient;
use crate::models::chat::ConversationMessage;

pub type BoxError = Box<dyn StdError + Send + Sync>;
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, BoxError>> + Send>>;

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

/// A backend overrides `stream_completion` when it streams natively, or `complete` when it can
/// only answer in one piece.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        _messages: &[ConversationMessage]
    ) -> Result<CompletionResponse, BoxError> {
        Err(format!("{} only streams; single-shot completion is not available", self.get_model()).into())
    }

    /// Streams the reply. Backends without native streaming deliver the whole reply as one chunk.
    async fn stream_completion(
        &self,
        messages: &[ConversationMessage]
    ) -> Result<TokenStream, BoxError> {
        let resp = self.complete(messages).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(resp.response) })))
    }

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;

    /// True when the remote side already holds the agent's instructions.
    fn hosts_instructions(&self) -> bool {
        false
    }
}

/// What a backend-specific parser made of one line of a streamed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLine {
    Token(String),
    Done,
    Failed(String),
    Skip,
}

pub fn create_streaming_response<F, Fut>(response_fn: F) -> TokenStream
    where
        F: FnOnce(mpsc::Sender<Result<String, BoxError>>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, BoxError> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Mastra => Arc::new(MastraAgentClient::from_config(config)?),
        LlmType::OpenAI => Arc::new(OpenAIChatClient::from_config(config)?),
        LlmType::Ollama => Arc::new(OllamaClient::from_config(config)?),
        LlmType::Gemini => Arc::new(GeminiChatClient::from_config(config)?),
    };
    Ok(client)
}

/// Splits every complete line off the front of `pending`, leaving a trailing partial line in place.
pub fn drain_lines(pending: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
        let raw: Vec<u8> = pending.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&raw);
        lines.push(line.trim_end_matches(['\r', '\n']).to_string());
    }
    lines
}

/// Sends one parsed line downstream. Returns false once the stream should stop.
async fn forward_line(
    tx: &mpsc::Sender<Result<String, BoxError>>,
    line: &str,
    line_parser: fn(&str) -> StreamLine
) -> bool {
    match line_parser(line) {
        StreamLine::Token(tok) => {
            if tok.is_empty() {
                return true;
            }
            tx.send(Ok(tok)).await.is_ok()
        }
        StreamLine::Done => false,
        StreamLine::Failed(msg) => {
            let _ = tx.send(Err(msg.into())).await;
            false
        }
        StreamLine::Skip => true,
    }
}

pub async fn http_stream_generate(
    http: HttpClient,
    url: String,
    payload: impl serde::Serialize + Send + 'static,
    line_parser: fn(&str) -> StreamLine,
    headers: Option<Vec<(String, String)>>,
    request_timeout: Option<Duration>
) -> Result<TokenStream, BoxError> {
    Ok(
        create_streaming_response(move |tx| async move {
            let mut req = http.post(&url).json(&payload);

            if let Some(header_list) = headers {
                for (name, value) in header_list {
                    req = req.header(name, value);
                }
            }

            let sent = match request_timeout {
                Some(limit) =>
                    match tokio::time::timeout(limit, req.send()).await {
                        Ok(result) => result,
                        Err(_) => {
                            let msg = format!("Upstream request to {} timed out after {:?}", url, limit);
                            let _ = tx.send(Err(msg.into())).await;
                            return;
                        }
                    }
                None => req.send().await,
            };

            let resp = match sent {
                Ok(resp) => resp,
                Err(e) => {
                    let _ = tx.send(Err(Box::new(e) as _)).await;
                    return;
                }
            };
            if let Err(e) = resp.error_for_status_ref() {
                let _ = tx.send(Err(Box::new(e) as _)).await;
                return;
            }

            let mut bytes = resp.bytes_stream();
            let mut pending: Vec<u8> = Vec::new();
            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(buf) => {
                        pending.extend_from_slice(&buf);
                        for line in drain_lines(&mut pending) {
                            if !forward_line(&tx, &line, line_parser).await {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(Box::new(e) as _)).await;
                        return;
                    }
                }
            }

            if !pending.is_empty() {
                let tail = String::from_utf8_lossy(&pending).trim_end().to_string();
                forward_line(&tx, &tail, line_parser).await;
            }
            debug!("Upstream stream from {} finished", url);
        })
    )
}
