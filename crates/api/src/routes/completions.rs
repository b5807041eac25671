use crate::{
    conversions::mock_key_from_headers,
    dialect::{
        self,
        openai::{self, ChunkContext},
        ApiError, OPENAI,
    },
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

/// Create a chat completion
///
/// Answers with the configured mock response for the most recent user
/// message, or for the key named in the `x-mock-key` header.
#[utoipa::path(
    post,
    path = "/v1/chat/completions",
    tag = "OpenAI",
    request_body = ChatCompletionRequest,
    params(
        ("x-mock-key" = Option<String>, Header, description = "Response key to use instead of the last user message")
    ),
    responses(
        (status = 200, description = "Completion, or an SSE stream of chunks when `stream` is set", body = ChatCompletionResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 404, description = "No matching response and misses are rejected", body = ErrorResponse),
        (status = 422, description = "Request body does not match the schema", body = ErrorResponse)
    )
)]
pub async fn chat_completions(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::from_rejection(Dialect::OpenAi, e))?;
    debug!(
        model = %request.model,
        stream = ?request.stream,
        messages = request.messages.len(),
        "Chat completions request"
    );
    request
        .validate()
        .map_err(|e| ApiError::invalid_request(Dialect::OpenAi, e))?;

    let normalized = request.to_normalized(mock_key_from_headers(&headers));
    let resolved = dialect::resolve(&app_state.resolver, &normalized).await?;
    let usage = openai::usage(&resolved);

    info!(
        dialect = %Dialect::OpenAi,
        key = %resolved.source.key(),
        matched = !resolved.source.is_default(),
        stream = normalized.stream,
        version = resolved.snapshot_version,
        "Serving mock completion"
    );

    let response = match app_state.encoder.encode(
        Dialect::OpenAi,
        resolved,
        EncodeMode::from_stream_flag(normalized.stream),
    ) {
        Encoded::Whole(resolved) => {
            Json(openai::completion_response(&request.model, &resolved)).into_response()
        }
        Encoded::Stream(chunks) => {
            let usage = request.include_usage().then_some(usage);
            OPENAI.sse(openai::stream_frames(
                ChunkContext::new(request.model.clone()),
                chunks,
                usage,
            ))
        }
    };
    Ok(response)
}
