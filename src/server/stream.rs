use axum::response::sse::{ Event, KeepAlive, Sse };
use axum::response::{ IntoResponse, Response };
use futures::StreamExt;
use log::{ debug, error };
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::agent::Agent;
use crate::error::{ Endpoint, GatewayError };
use crate::llm::chat::TokenStream;
use crate::models::chat::ConversationMessage;
use crate::models::stream::{
    UiMessageChunk,
    UiMessageFrame,
    STREAM_TERMINATOR,
    UI_MESSAGE_STREAM_HEADER,
    UI_MESSAGE_STREAM_VERSION,
};

type EventSender = mpsc::Sender<Result<Event, Infallible>>;

/// Runs `messages` through `agent` and answers with a UI message stream.
///
/// The first upstream chunk is awaited before anything is sent, so a backend that fails to start
/// surfaces as an error here rather than as a truncated 200.
pub async fn ui_message_stream(
    agent: &Agent,
    messages: Vec<ConversationMessage>,
    endpoint: Endpoint
) -> Result<Response, GatewayError> {
    let mut tokens = agent.stream(messages).await.map_err(GatewayError::upstream)?;

    let first = match tokens.next().await {
        Some(Ok(text)) => Some(text),
        Some(Err(e)) => {
            return Err(GatewayError::upstream(e));
        }
        None => None,
    };

    let frame = UiMessageFrame::new(Uuid::new_v4().to_string(), Uuid::new_v4().to_string());
    let (tx, rx) = mpsc::channel(32);
    let handle = agent.handle();
    tokio::spawn(async move {
        relay(tokens, first, frame, tx, endpoint).await;
        debug!("Relay for {} finished", handle.name());
    });

    let sse = Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default());
    Ok(
        (
            [
                (UI_MESSAGE_STREAM_HEADER, UI_MESSAGE_STREAM_VERSION),
                ("x-accel-buffering", "no"),
            ],
            sse,
        ).into_response()
    )
}

async fn send_chunk(tx: &EventSender, chunk: &UiMessageChunk) -> bool {
    match Event::default().json_data(chunk) {
        Ok(event) => tx.send(Ok(event)).await.is_ok(),
        Err(e) => {
            error!("Failed to encode stream chunk {:?}: {}", chunk, e);
            false
        }
    }
}

async fn send_terminator(tx: &EventSender) -> bool {
    tx.send(Ok(Event::default().data(STREAM_TERMINATOR))).await.is_ok()
}

// A failed send means the client went away; returning drops the upstream stream.
async fn relay(
    mut tokens: TokenStream,
    first: Option<String>,
    frame: UiMessageFrame,
    tx: EventSender,
    endpoint: Endpoint
) {
    for chunk in frame.opening() {
        if !send_chunk(&tx, &chunk).await {
            return;
        }
    }

    if let Some(text) = first.filter(|t| !t.is_empty()) {
        if !send_chunk(&tx, &frame.delta(text)).await {
            return;
        }
    }

    while let Some(item) = tokens.next().await {
        match item {
            Ok(text) => {
                if text.is_empty() {
                    continue;
                }
                if !send_chunk(&tx, &frame.delta(text)).await {
                    return;
                }
            }
            Err(e) => {
                error!("{} stream failed mid-response: {}", endpoint.path(), e);
                let chunk = UiMessageChunk::Error {
                    error_text: endpoint.failure_text().to_string(),
                };
                if send_chunk(&tx, &chunk).await {
                    send_terminator(&tx).await;
                }
                return;
            }
        }
    }

    for chunk in frame.closing() {
        if !send_chunk(&tx, &chunk).await {
            return;
        }
    }
    send_terminator(&tx).await;
}
