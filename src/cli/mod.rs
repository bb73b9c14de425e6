use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Agent Backend Args ---
    /// Backend the agents run on (mastra, openai, ollama, gemini)
    #[arg(long, env = "AGENT_BACKEND", default_value = "mastra")]
    pub agent_backend: String,

    /// Base URL of the backend (e.g., http://localhost:4111 for a Mastra server, https://api.groq.com/openai/v1 for an OpenAI-compatible API)
    #[arg(long, env = "AGENT_BASE_URL")] // No default, let adapters handle defaults if None
    pub agent_base_url: Option<String>,

    /// API Key for the backend
    #[arg(long, env = "AGENT_API_KEY", default_value = "")]
    pub agent_api_key: String,

    /// Model name for direct LLM backends (e.g., gpt-4o, llama3.1). Ignored by mastra.
    #[arg(long, env = "AGENT_MODEL")]
    pub agent_model: Option<String>,

    /// Remote id of the general assistant agent
    #[arg(long, env = "GENERAL_AGENT_ID", default_value = "generalAssistant")]
    pub general_agent_id: String,

    /// Remote id of the donor meeting agent
    #[arg(long, env = "DONOR_AGENT_ID", default_value = "donorMeeting")]
    pub donor_agent_id: String,

    /// Optional JSON file overriding agent instructions ({"generalAssistant": "...", "donorMeeting": "..."})
    #[arg(long, env = "INSTRUCTIONS_PATH")]
    pub instructions_path: Option<String>,

    /// Seconds to wait for the backend to accept a request and start replying. 0 waits forever.
    #[arg(long, env = "AGENT_TIMEOUT_SECS", default_value = "60")]
    pub agent_timeout_secs: u64,

    // --- Server Args ---
    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Optional API Key required on the AI routes (X-API-Key header or Bearer token).
    #[arg(long, env = "SERVER_API_KEY")]
    pub server_api_key: Option<String>,

    /// Requests per second accepted on the AI routes across all clients. 0 disables the limit.
    #[arg(long, env = "RATE_LIMIT_PER_SECOND", default_value = "10")]
    pub rate_limit_per_second: u32,

    /// Largest accepted request body, in bytes.
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "1048576")]
    pub max_body_bytes: usize,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl Args {
    pub fn agent_timeout(&self) -> Option<Duration> {
        (self.agent_timeout_secs > 0).then(|| Duration::from_secs(self.agent_timeout_secs))
    }

    pub fn agent_api_key(&self) -> Option<String> {
        Some(self.agent_api_key.clone()).filter(|k| !k.trim().is_empty())
    }
}
