//! Wire adapters for the two impersonated APIs
//!
//! Both dialects share resolution, error mapping and SSE framing. What differs
//! between them is kept in a [`DialectProfile`] so the framing code itself has
//! no per-dialect branches.

pub mod anthropic;
pub mod openai;

use crate::conversions::generate_completion_id;
use crate::models::{AnthropicErrorResponse, ErrorResponse};
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use futures::{stream, Stream, StreamExt};
use serde::Serialize;
use services::{Dialect, NormalizedRequest, ResolvedResponse, Resolver};
use std::{convert::Infallible, time::Duration};
use thiserror::Error;
use tracing::{debug, error};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Framing constants of one dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectProfile {
    pub dialect: Dialect,
    /// Emit an `event: <type>` line before each data line
    pub named_events: bool,
    /// Data line sent after the last event, if any
    pub terminal_sentinel: Option<&'static str>,
    pub id_prefix: &'static str,
}

pub static OPENAI: DialectProfile = DialectProfile {
    dialect: Dialect::OpenAi,
    named_events: false,
    terminal_sentinel: Some("[DONE]"),
    id_prefix: "chatcmpl-",
};

pub static ANTHROPIC: DialectProfile = DialectProfile {
    dialect: Dialect::Anthropic,
    named_events: true,
    terminal_sentinel: None,
    id_prefix: "msg_",
};

/// One serialized SSE payload and the event type it represents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: &'static str,
    pub data: String,
}

impl Frame {
    /// Frame carrying `payload` as JSON. A payload that cannot be serialized
    /// is logged and sent as an empty data line so the stream keeps going.
    pub fn json<T: Serialize>(event: &'static str, payload: &T) -> Self {
        let data = serde_json::to_string(payload).unwrap_or_else(|e| {
            error!(event, error = %e, "Failed to serialize stream event");
            String::new()
        });
        Self { event, data }
    }
}

impl DialectProfile {
    pub fn for_dialect(dialect: Dialect) -> &'static DialectProfile {
        match dialect {
            Dialect::OpenAi => &OPENAI,
            Dialect::Anthropic => &ANTHROPIC,
        }
    }

    pub fn new_id(&self) -> String {
        generate_completion_id(self.id_prefix)
    }

    fn event(&self, frame: Frame) -> Event {
        let event = if self.named_events {
            Event::default().event(frame.event)
        } else {
            Event::default()
        };
        event.data(frame.data)
    }

    /// Frame `frames` as an SSE response, closing with the terminal sentinel
    pub fn sse<S>(&'static self, frames: S) -> Response
    where
        S: Stream<Item = Frame> + Send + 'static,
    {
        let sentinel = self
            .terminal_sentinel
            .map(|sentinel| Ok::<_, Infallible>(Event::default().data(sentinel)));

        let events = frames
            .map(move |frame| Ok::<_, Infallible>(self.event(frame)))
            .chain(stream::iter(sentinel));

        Sse::new(events)
            .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
            .into_response()
    }
}

/// Request failure rendered in the envelope of the dialect that was called
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ApiError {
    pub dialect: Dialect,
    pub status: StatusCode,
    pub error_type: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn invalid_request(dialect: Dialect, message: impl Into<String>) -> Self {
        Self {
            dialect,
            status: StatusCode::BAD_REQUEST,
            error_type: "invalid_request_error",
            message: message.into(),
        }
    }

    pub fn not_found(dialect: Dialect, key: &str) -> Self {
        Self {
            dialect,
            status: StatusCode::NOT_FOUND,
            error_type: "not_found_error",
            message: format!("No mock response configured for '{key}'"),
        }
    }

    /// Body that failed to parse: 400 for broken JSON, 422 for schema mismatches
    pub fn from_rejection(dialect: Dialect, rejection: JsonRejection) -> Self {
        Self {
            dialect,
            status: rejection.status(),
            error_type: "invalid_request_error",
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_type = self.error_type.to_string();
        match self.dialect {
            Dialect::OpenAi => {
                (self.status, Json(ErrorResponse::new(self.message, error_type))).into_response()
            }
            Dialect::Anthropic => (
                self.status,
                Json(AnthropicErrorResponse::new(self.message, error_type)),
            )
                .into_response(),
        }
    }
}

/// Resolve against the live snapshot, applying the miss policy and the
/// configured response delay
pub async fn resolve(
    resolver: &Resolver,
    request: &NormalizedRequest,
) -> Result<ResolvedResponse, ApiError> {
    let resolved = resolver.resolve(request);
    if resolved.is_rejected_miss() {
        debug!(dialect = %request.dialect, key = %resolved.source.key(), "Rejecting unmatched request");
        return Err(ApiError::not_found(request.dialect, resolved.source.key()));
    }
    if !resolved.response_delay.is_zero() {
        tokio::time::sleep(resolved.response_delay).await;
    }
    Ok(resolved)
}
