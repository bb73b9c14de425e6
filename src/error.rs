use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{ IntoResponse, Response };
use log::{ error, warn };
use std::fmt::Display;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Request body too large")]
    BodyTooLarge,

    #[error("Too many requests")]
    RateLimited,

    #[error("Agent stream failed: {0}")]
    Upstream(String),
}

/// The two AI routes. Each owns the fixed text its failures are reported with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Chat,
    DonorPractice,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Chat => "/api/ai/chat",
            Endpoint::DonorPractice => "/api/ai/donor-practice",
        }
    }

    pub fn failure_text(self) -> &'static str {
        match self {
            Endpoint::Chat => "Error processing chat",
            Endpoint::DonorPractice => "Error processing donor practice",
        }
    }
}

impl GatewayError {
    pub fn upstream(err: impl Display) -> Self {
        GatewayError::Upstream(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Converts a pipeline failure into the response for `endpoint`, logging it on the way.
    /// Server-side failures always carry the endpoint's fixed text and nothing else.
    pub fn into_endpoint_response(self, endpoint: Endpoint) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{} failed: {:?}", endpoint.path(), self);
            return (status, endpoint.failure_text()).into_response();
        }
        warn!("{} rejected: {}", endpoint.path(), self);
        (status, self.to_string()).into_response()
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {:?}", self);
            return (status, "Internal server error").into_response();
        }
        (status, self.to_string()).into_response()
    }
}

impl From<BytesRejection> for GatewayError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            GatewayError::BodyTooLarge
        } else {
            GatewayError::Validation(rejection.body_text())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Validation(err.to_string())
    }
}
