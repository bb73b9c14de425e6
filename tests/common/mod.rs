//! Helpers shared by the router integration tests.
#![allow(dead_code)]

use axum::body::Body;
use axum::http::{ HeaderMap, Request, StatusCode };
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

pub async fn send(
    app: Router,
    path: &str,
    body: &str,
    headers: &[(&str, &str)]
) -> (StatusCode, HeaderMap, String) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let req = builder.body(Body::from(body.to_string())).unwrap();

    let resp = app.oneshot(req).await.expect("request");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.expect("read body");
    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
}

/// Splits an SSE body into its `data:` payloads.
pub fn sse_payloads(body: &str) -> Vec<String> {
    body.split("\n\n")
        .filter_map(|event| {
            event
                .lines()
                .find_map(|line| line.strip_prefix("data: "))
                .map(str::to_string)
        })
        .collect()
}

pub fn chunk_types(payloads: &[String]) -> Vec<String> {
    payloads
        .iter()
        .map(|p| {
            if p == "[DONE]" {
                return p.clone();
            }
            let v: Value = serde_json::from_str(p).unwrap();
            v["type"].as_str().unwrap().to_string()
        })
        .collect()
}

pub fn deltas(payloads: &[String]) -> Vec<String> {
    payloads
        .iter()
        .filter(|p| p.as_str() != "[DONE]")
        .map(|p| serde_json::from_str::<Value>(p).unwrap())
        .filter(|v| v["type"] == "text-delta")
        .map(|v| v["delta"].as_str().unwrap().to_string())
        .collect()
}
