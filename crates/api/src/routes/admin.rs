use crate::{models::ErrorResponse, AppState};
use axum::{extract::State, http::StatusCode, response::Json as ResponseJson};
use serde::{Deserialize, Serialize};
use services::{ConfigSourceError, ReloadOutcome};
use tracing::{debug, error, info};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MockResponseSummary {
    pub key: String,
    pub finish_reason: String,
    /// Length of the body in characters
    pub body_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MockResponsesList {
    pub version: u64,
    /// SHA-256 of the document the snapshot was parsed from
    pub fingerprint: String,
    pub default_response: String,
    pub on_miss: String,
    pub responses: Vec<MockResponseSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReloadResponse {
    /// "reloaded" or "unchanged"
    pub status: String,
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<usize>,
}

/// List configured mock responses
///
/// Shows the snapshot requests are currently resolved against.
#[utoipa::path(
    get,
    path = "/mock/responses",
    tag = "Mock",
    responses(
        (status = 200, description = "Live response snapshot", body = MockResponsesList),
    )
)]
pub async fn list_responses(State(app_state): State<AppState>) -> ResponseJson<MockResponsesList> {
    let store = app_state.resolver.snapshots().current();
    debug!(version = store.version(), entries = store.len(), "Listing mock responses");

    ResponseJson(MockResponsesList {
        version: store.version(),
        fingerprint: store.fingerprint().to_string(),
        default_response: store.default_entry().body.clone(),
        on_miss: store.settings().on_miss.as_str().to_string(),
        responses: store
            .entries()
            .iter()
            .map(|entry| MockResponseSummary {
                key: entry.key.clone(),
                finish_reason: entry.finish_reason.to_string(),
                body_chars: entry.body.chars().count(),
            })
            .collect(),
    })
}

/// Reload the responses document now
///
/// Runs the same reload the background poller performs. A document that
/// fails to parse leaves the previous snapshot in place.
#[utoipa::path(
    post,
    path = "/mock/reload",
    tag = "Mock",
    responses(
        (status = 200, description = "Reload finished", body = ReloadResponse),
        (status = 422, description = "Document is malformed; previous snapshot kept", body = ErrorResponse),
        (status = 500, description = "Document could not be read", body = ErrorResponse),
        (status = 503, description = "Reloading is not available", body = ErrorResponse)
    )
)]
pub async fn reload_responses(
    State(app_state): State<AppState>,
) -> Result<ResponseJson<ReloadResponse>, (StatusCode, ResponseJson<ErrorResponse>)> {
    let Some(trigger) = app_state.reload.as_ref() else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            ResponseJson(ErrorResponse::new(
                "Response reloading is not enabled".to_string(),
                "service_unavailable".to_string(),
            )),
        ));
    };

    match trigger.reload().await {
        Ok(ReloadOutcome::Reloaded { version, entries }) => {
            info!(version, entries, "Reload requested over HTTP");
            Ok(ResponseJson(ReloadResponse {
                status: "reloaded".to_string(),
                version,
                entries: Some(entries),
            }))
        }
        Ok(ReloadOutcome::Unchanged { version }) => Ok(ResponseJson(ReloadResponse {
            status: "unchanged".to_string(),
            version,
            entries: None,
        })),
        Err(e) => {
            error!(error = %e, "Requested reload failed");
            let status = match e {
                ConfigSourceError::Parse { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                ConfigSourceError::Read { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                ConfigSourceError::WatcherStopped => StatusCode::SERVICE_UNAVAILABLE,
            };
            Err((
                status,
                ResponseJson(ErrorResponse::new(
                    e.to_string(),
                    "reload_error".to_string(),
                )),
            ))
        }
    }
}
