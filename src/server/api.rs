use crate::agent::{ AgentHandle, AgentRegistry };
use crate::cli::Args;
use crate::config::prompt::with_donor_context;
use crate::error::{ Endpoint, GatewayError };
use crate::models::chat::{ parse_chat_request, parse_donor_practice_request };
use crate::server::stream::ui_message_stream;

use std::error::Error;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use axum::{
    body::Bytes,
    extract::{ rejection::BytesRejection, DefaultBodyLimit, Request, State },
    http::header::AUTHORIZATION,
    middleware::{ self, Next },
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use chrono::{ DateTime, Utc };
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };
use serde::Serialize;
use tower_http::cors::{ Any, CorsLayer };
use log::{ debug, info, warn, error };

pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Clone)]
pub struct AppState {
    pub agents: Arc<AgentRegistry>,
    pub api_key: Option<String>,
    pub limiter: Option<Arc<Limiter>>,
    pub max_body_bytes: usize,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(agents: AgentRegistry) -> Self {
        Self {
            agents: Arc::new(agents),
            api_key: None,
            limiter: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            started_at: Utc::now(),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    /// A limit of zero leaves the routes unthrottled.
    pub fn with_rate_limit(mut self, per_second: u32) -> Self {
        self.limiter = NonZeroU32::new(per_second).map(|n|
            Arc::new(RateLimiter::direct(Quota::per_second(n)))
        );
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn from_args(args: &Args, agents: AgentRegistry) -> Self {
        let state = Self::new(agents)
            .with_api_key(args.server_api_key.clone())
            .with_rate_limit(args.rate_limit_per_second)
            .with_max_body_bytes(args.max_body_bytes);

        if state.api_key.is_some() {
            info!("AI routes require an API key.");
        } else {
            warn!("AI routes configured WITHOUT API Key authentication. Anyone who can reach the server can use the agents.");
        }
        match state.limiter {
            Some(_) => info!("AI routes limited to {} requests/second.", args.rate_limit_per_second),
            None => warn!("AI routes are not rate limited."),
        }
        state
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentStatus {
    name: &'static str,
    model: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    agents: Vec<AgentStatus>,
    started_at: DateTime<Utc>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Auth wraps the limiter so rejected callers never spend quota.
    let ai_routes = Router::new()
        .route(Endpoint::Chat.path(), post(chat_handler))
        .route(Endpoint::DonorPractice.path(), post(donor_practice_handler))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/api/health", get(health_handler))
        .merge(ai_routes)
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(cors)
        .with_state(state)
}

pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next
) -> Result<Response, GatewayError> {
    let Some(required) = state.api_key.as_deref() else {
        return Ok(next.run(req).await);
    };

    let headers = req.headers();
    let provided = headers
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
        });

    if provided != Some(required) {
        warn!("{}: bad or missing API key", req.uri().path());
        return Err(GatewayError::Unauthorized);
    }
    Ok(next.run(req).await)
}

pub async fn rate_limit(
    State(state): State<AppState>,
    req: Request,
    next: Next
) -> Result<Response, GatewayError> {
    if let Some(limiter) = &state.limiter {
        if limiter.check().is_err() {
            warn!("Rate limit exceeded for {}", req.uri().path());
            return Err(GatewayError::RateLimited);
        }
    }
    Ok(next.run(req).await)
}

async fn chat_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>
) -> Response {
    match process_chat(&state, body).await {
        Ok(resp) => resp,
        Err(e) => e.into_endpoint_response(Endpoint::Chat),
    }
}

async fn process_chat(
    state: &AppState,
    body: Result<Bytes, BytesRejection>
) -> Result<Response, GatewayError> {
    let request = parse_chat_request(&body?)?;
    let handle = AgentHandle::select(request.agent_type.as_deref());
    debug!("Chat request with {} messages routed to {}", request.messages.len(), handle.name());
    let agent = state.agents.resolve(handle);
    ui_message_stream(agent, request.messages, Endpoint::Chat).await
}

async fn donor_practice_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>
) -> Response {
    match process_donor_practice(&state, body).await {
        Ok(resp) => resp,
        Err(e) => e.into_endpoint_response(Endpoint::DonorPractice),
    }
}

async fn process_donor_practice(
    state: &AppState,
    body: Result<Bytes, BytesRejection>
) -> Result<Response, GatewayError> {
    let request = parse_donor_practice_request(&body?)?;
    let messages = with_donor_context(request);
    debug!("Donor practice request with {} messages (context included)", messages.len());
    let agent = state.agents.resolve(AgentHandle::DonorMeeting);
    ui_message_stream(agent, messages, Endpoint::DonorPractice).await
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let agents = state.agents
        .agents()
        .iter()
        .map(|agent| AgentStatus {
            name: agent.handle().name(),
            model: agent.model(),
        })
        .collect();
    Json(HealthResponse {
        status: "ok",
        agents,
        started_at: state.started_at,
    })
}

pub async fn start_http_server(
    addr: &str,
    state: AppState,
    args: &Args
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = addr.parse::<SocketAddr>()?;
    let app = router(state);

    if args.enable_tls {
        let (cert_path, key_path) = match (&args.tls_cert_path, &args.tls_key_path) {
            (Some(cert_path), Some(key_path)) => (cert_path, key_path),
            (Some(_), None) | (None, Some(_)) => {
                error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                return Err("Missing TLS certificate or key path".into());
            }
            (None, None) => {
                error!("--enable-tls was set but no certificate/key paths provided.");
                return Err("TLS enabled without cert/key".into());
            }
        };
        info!("TLS enabled. Loading certificate from '{}' and key from '{}'", cert_path, key_path);
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            cert_path,
            key_path
        ).await?;

        info!("Starting HTTPS server on: https://{}", addr);
        axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
            e
        })?;
        info!("Starting HTTP server on: http://{}", addr);
        axum::serve(listener, app.into_make_service()).await?;
    }

    Ok(())
}
