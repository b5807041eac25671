use crate::{
    conversions::mock_key_from_headers,
    dialect::{self, anthropic, ApiError, ANTHROPIC},
    models::*,
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use services::{Dialect, EncodeMode, Encoded};
use tracing::{debug, info};

/// Create a message
///
/// Anthropic Messages API counterpart of `/v1/chat/completions`. Streaming
/// responses use named SSE events and end with `message_stop`.
#[utoipa::path(
    post,
    path = "/v1/messages",
    tag = "Anthropic",
    request_body = MessagesRequest,
    params(
        ("x-mock-key" = Option<String>, Header, description = "Response key to use instead of the last user message")
    ),
    responses(
        (status = 200, description = "Message, or an SSE event stream when `stream` is set", body = MessagesResponse),
        (status = 400, description = "Bad request", body = AnthropicErrorResponse),
        (status = 404, description = "No matching response and misses are rejected", body = AnthropicErrorResponse),
        (status = 422, description = "Request body does not match the schema", body = AnthropicErrorResponse)
    )
)]
pub async fn create_message(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<MessagesRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::from_rejection(Dialect::Anthropic, e))?;
    debug!(
        model = %request.model,
        stream = ?request.stream,
        messages = request.messages.len(),
        "Messages request"
    );
    request
        .validate()
        .map_err(|e| ApiError::invalid_request(Dialect::Anthropic, e))?;

    let normalized = request.to_normalized(mock_key_from_headers(&headers));
    let resolved = dialect::resolve(&app_state.resolver, &normalized).await?;
    let usage = anthropic::usage(&resolved);

    info!(
        dialect = %Dialect::Anthropic,
        key = %resolved.source.key(),
        matched = !resolved.source.is_default(),
        stream = normalized.stream,
        version = resolved.snapshot_version,
        "Serving mock message"
    );

    let response = match app_state.encoder.encode(
        Dialect::Anthropic,
        resolved,
        EncodeMode::from_stream_flag(normalized.stream),
    ) {
        Encoded::Whole(resolved) => {
            Json(anthropic::message_response(&request.model, &resolved)).into_response()
        }
        Encoded::Stream(chunks) => {
            ANTHROPIC.sse(anthropic::stream_frames(&request.model, chunks, usage))
        }
    };
    Ok(response)
}
