//! Response-resolution engine for the mock LLM server
//!
//! Requests flow leaf-first through:
//!
//! - [`responses::ResponseStore`]: immutable snapshot of the configured mock responses
//! - [`responses::watcher::ConfigWatcher`]: sole writer that reloads and publishes snapshots
//! - [`completions::Resolver`]: picks the entry for a request and counts tokens
//! - [`streaming::StreamEncoder`]: renders a resolved response whole or as lazy chunks
//!
//! Wire shaping for each API dialect lives in the `api` crate.

pub mod common;
pub mod completions;
pub mod responses;
pub mod streaming;
pub mod tokenizer;

pub use common::{Dialect, FinishReason};
pub use completions::{
    ports::{MatchSource, NormalizedRequest, ResolvedResponse, Role, Turn},
    Resolver,
};
pub use responses::{
    watcher::{ConfigWatcher, ReloadOutcome, ReloadTrigger, SnapshotHandle, WatcherHandle},
    ConfigSourceError, DocumentError, MockEntry, ResponseStore,
};
pub use streaming::{ChunkStream, EncodeMode, Encoded, StreamChunk, StreamEncoder};
pub use tokenizer::{Tokenizer, TokenizerError, TokenizerRegistry};
