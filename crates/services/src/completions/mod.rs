pub mod ports;

use crate::responses::watcher::SnapshotHandle;
use crate::tokenizer::TokenizerRegistry;
use ports::{MatchSource, NormalizedRequest, ResolvedResponse};
use tracing::debug;

/// Picks the mock entry for a request from the current snapshot
///
/// Resolution never fails: unmatched requests get the snapshot's default
/// entry. Only the snapshot `Arc` is cloned from the watcher, so a concurrent
/// reload cannot stall or split a resolution.
#[derive(Clone)]
pub struct Resolver {
    snapshots: SnapshotHandle,
    tokenizers: TokenizerRegistry,
}

impl Resolver {
    pub fn new(snapshots: SnapshotHandle, tokenizers: TokenizerRegistry) -> Self {
        Self {
            snapshots,
            tokenizers,
        }
    }

    pub fn snapshots(&self) -> &SnapshotHandle {
        &self.snapshots
    }

    /// Resolve `request` against the snapshot current at call time, using
    /// the tokenizer of the request's dialect
    pub fn resolve(&self, request: &NormalizedRequest) -> ResolvedResponse {
        let store = self.snapshots.current();
        let key = request.lookup_key();

        let (entry, source) = match store.get(key) {
            Some(entry) => (
                entry,
                MatchSource::Matched {
                    key: key.to_string(),
                },
            ),
            None => (
                store.default_entry(),
                MatchSource::Default {
                    key: key.to_string(),
                },
            ),
        };

        let tokenizer = self.tokenizers.for_dialect(request.dialect);
        let token_count = entry
            .metadata
            .token_count
            .unwrap_or_else(|| tokenizer.count(&entry.body));
        let prompt_tokens = tokenizer.count(&request.prompt_text());

        debug!(
            dialect = %request.dialect,
            key = %key,
            matched = !source.is_default(),
            version = store.version(),
            token_count,
            "Resolved mock response"
        );

        let settings = store.settings();
        ResolvedResponse {
            body: entry.body.clone(),
            finish_reason: entry.finish_reason,
            token_count,
            prompt_tokens,
            source,
            snapshot_version: store.version(),
            miss_policy: settings.on_miss,
            chunk_delay: settings.chunk_delay(entry),
            response_delay: settings.response_delay(),
            granularity: entry.metadata.stream_granularity,
        }
    }
}
