use crate::models::*;
use crate::routes::{
    admin::{MockResponseSummary, MockResponsesList, ReloadResponse},
    health::HealthResponse,
};
use utoipa::OpenApi;

/// OpenAPI documentation configuration
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Mock LLM API",
        description = "Deterministic stand-in for the OpenAI Chat Completions and Anthropic Messages APIs.\n\nResponses come from an operator-authored YAML document that is reloaded while the server runs. A request is answered with the entry whose key equals its most recent user message, or the key given in the `x-mock-key` header; anything else gets the default response.",
        version = "1.0.0",
        license(
            name = "MIT",
        )
    ),
    paths(
        crate::routes::completions::chat_completions,
        crate::routes::messages::create_message,
        crate::routes::health::health_check,
        crate::routes::admin::list_responses,
        crate::routes::admin::reload_responses,
    ),
    components(
        schemas(
            // OpenAI models
            ChatCompletionRequest, ChatCompletionResponse, Message, StreamOptions, StopSequences,
            ChatChoice, ResponseMessage, Usage, ErrorResponse, ErrorDetail,
            // Anthropic models
            MessagesRequest, MessagesResponse, AnthropicMessage, TextBlock, AnthropicUsage,
            AnthropicErrorResponse, AnthropicErrorDetail,
            // Operational models
            HealthResponse, MockResponsesList, MockResponseSummary, ReloadResponse,
        ),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_both_dialects() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/v1/chat/completions"));
        assert!(doc.paths.paths.contains_key("/v1/messages"));
        assert!(doc.paths.paths.contains_key("/mock/reload"));
    }
}
