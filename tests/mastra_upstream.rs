//! Runs the gateway against a local agent runtime over real HTTP.

use std::convert::Infallible;
use std::sync::{ Arc, Mutex };
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ Path, State };
use axum::http::{ header, HeaderMap, StatusCode };
use axum::response::{ IntoResponse, Response };
use axum::routing::post;
use axum::{ Json, Router };
use donor_agent_gateway::agent::{ Agent, AgentHandle, AgentRegistry };
use donor_agent_gateway::llm::chat::mastra::MastraAgentClient;
use donor_agent_gateway::llm::chat::ChatClient;
use donor_agent_gateway::server::api::{ router, AppState };
use serde_json::{ json, Value };
use tokio::net::TcpListener;

mod common;
use common::{ chunk_types, deltas, send, sse_payloads };

#[derive(Clone)]
enum Reply {
    Stream(Vec<&'static str>),
    Status(StatusCode),
    Stall,
}

#[derive(Debug, Clone, PartialEq)]
struct Received {
    agent_id: String,
    authorization: Option<String>,
    body: Value,
}

#[derive(Clone)]
struct Upstream {
    reply: Reply,
    received: Arc<Mutex<Vec<Received>>>,
}

impl Upstream {
    fn new(reply: Reply) -> Self {
        Self { reply, received: Arc::new(Mutex::new(Vec::new())) }
    }

    fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }
}

async fn agent_stream(
    State(upstream): State<Upstream>,
    Path(agent_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>
) -> Response {
    upstream.received.lock().unwrap().push(Received {
        agent_id,
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });

    match upstream.reply {
        Reply::Stream(chunks) => {
            let body = Body::from_stream(
                futures::stream::iter(chunks.into_iter().map(Ok::<_, Infallible>))
            );
            ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
        }
        Reply::Status(status) => (status, "upstream unavailable").into_response(),
        Reply::Stall => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            StatusCode::OK.into_response()
        }
    }
}

/// Serves the agent routes on an ephemeral port and returns the base URL.
async fn spawn_upstream(upstream: Upstream) -> String {
    let app = Router::new()
        .route("/api/agents/{agent_id}/stream", post(agent_stream))
        .with_state(upstream);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind upstream");
    let addr = listener.local_addr().expect("upstream addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve upstream");
    });
    format!("http://{}", addr)
}

fn gateway(base_url: &str, timeout: Option<Duration>) -> Router {
    let client = |agent_id: &str| -> Arc<dyn ChatClient> {
        Arc::new(
            MastraAgentClient::new(
                Some(base_url.to_string()),
                agent_id.to_string(),
                Some("agent-key".into()),
                timeout
            ).expect("mastra client")
        )
    };
    let registry = AgentRegistry::new(
        Agent::new(AgentHandle::GeneralAssistant, "general", client("generalAssistant")),
        Agent::new(AgentHandle::DonorMeeting, "donor", client("donorMeeting"))
    );
    router(AppState::new(registry))
}

const HI: &str = r#"{"messages":[{"role":"user","content":"hi"}]}"#;

#[tokio::test]
async fn sse_deltas_are_relayed_from_the_agent_runtime() {
    // Lines are split across network chunks on purpose.
    let upstream = Upstream::new(
        Reply::Stream(
            vec![
                "data: {\"type\":\"start\",\"runId\":\"r1\"}\n\n",
                "data: {\"type\":\"text-delta\",\"payload\":{\"text\":\"Hel\"}}\n\nda",
                "ta: {\"type\":\"text-delta\",\"payload\":{\"text\":\"lo\"}}\n",
                "\ndata: {\"type\":\"finish\"}\n\n"
            ]
        )
    );
    let base_url = spawn_upstream(upstream.clone()).await;

    let (status, headers, body) = send(gateway(&base_url, None), "/api/ai/chat", HI, &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-vercel-ai-ui-message-stream"], "v1");
    let payloads = sse_payloads(&body);
    assert_eq!(
        chunk_types(&payloads),
        [
            "start",
            "start-step",
            "text-start",
            "text-delta",
            "text-delta",
            "text-end",
            "finish-step",
            "finish",
            "[DONE]",
        ]
    );
    assert_eq!(deltas(&payloads), ["Hel", "lo"]);

    assert_eq!(
        upstream.received(),
        vec![Received {
            agent_id: "generalAssistant".into(),
            authorization: Some("Bearer agent-key".into()),
            body: json!({ "messages": [{ "role": "user", "content": "hi" }] }),
        }]
    );
}

#[tokio::test]
async fn donor_practice_reaches_the_donor_agent_with_context() {
    let upstream = Upstream::new(
        Reply::Stream(vec!["0:\"Nice \"\n0:\"to meet", " you.\"\nd:{\"finishReason\":\"stop\"}\n"])
    );
    let base_url = spawn_upstream(upstream.clone()).await;
    let body = r#"{"donorType":"Major gift","messages":[{"role":"user","content":"Let's talk"}]}"#;

    let (status, _, sse) = send(gateway(&base_url, None), "/api/ai/donor-practice", body, &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(deltas(&sse_payloads(&sse)), ["Nice ", "to meet you."]);

    let received = upstream.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].agent_id, "donorMeeting");
    let messages = received[0].body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "system");
    let context = messages[0]["content"].as_str().unwrap();
    assert!(context.contains("Donor Type: Major gift\n"), "{}", context);
    assert!(context.contains("Warmth Factor: Neutral\n"), "{}", context);
    assert_eq!(messages[1], json!({ "role": "user", "content": "Let's talk" }));
}

#[tokio::test]
async fn upstream_error_status_is_a_fixed_500() {
    let upstream = Upstream::new(Reply::Status(StatusCode::BAD_GATEWAY));
    let base_url = spawn_upstream(upstream.clone()).await;

    let (status, headers, body) = send(
        gateway(&base_url, None),
        "/api/ai/donor-practice",
        HI,
        &[]
    ).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Error processing donor practice");
    assert!(headers.get("x-vercel-ai-ui-message-stream").is_none());
    assert_eq!(upstream.received().len(), 1);
}

#[tokio::test]
async fn stalled_upstream_times_out_into_a_fixed_500() {
    let base_url = spawn_upstream(Upstream::new(Reply::Stall)).await;
    let app = gateway(&base_url, Some(Duration::from_millis(200)));

    let (status, _, body) = tokio::time::timeout(
        Duration::from_secs(10),
        send(app, "/api/ai/chat", HI, &[])
    ).await.expect("gateway should give up on the stalled agent");

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Error processing chat");
}

#[tokio::test]
async fn upstream_error_event_after_first_delta_is_sent_in_band() {
    let upstream = Upstream::new(
        Reply::Stream(
            vec![
                "data: {\"type\":\"text-delta\",\"payload\":{\"text\":\"Hi\"}}\n\n",
                "data: {\"type\":\"error\",\"errorText\":\"quota exceeded\"}\n\n"
            ]
        )
    );
    let base_url = spawn_upstream(upstream).await;

    let (status, _, body) = send(gateway(&base_url, None), "/api/ai/chat", HI, &[]).await;

    assert_eq!(status, StatusCode::OK);
    let payloads = sse_payloads(&body);
    assert_eq!(
        chunk_types(&payloads),
        ["start", "start-step", "text-start", "text-delta", "error", "[DONE]"]
    );
    let error: Value = serde_json::from_str(&payloads[4]).unwrap();
    assert_eq!(error["errorText"], "Error processing chat");
}
