//! Whole and incremental rendering of resolved responses
//!
//! A [`ChunkStream`] produces one [`StreamChunk`] per poll and only computes
//! the unit after the one it is about to emit (to know whether the current
//! one is final), so emission follows the consumer's read rate. Dropping the
//! stream stops it; nothing outside the stream is touched.

use crate::common::{Dialect, FinishReason};
use crate::completions::ports::ResolvedResponse;
use crate::tokenizer::{word_end, TokenizerRegistry};
use config::{DialectsConfig, StreamGranularity};
use futures::Stream;
use std::future::Future;
use std::ops::Range;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;
use tokio::time::Sleep;
use tracing::debug;

/// One incremental unit of a streamed response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    pub delta_text: String,
    pub index: usize,
    pub is_final: bool,
    /// Present on the final chunk only
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeMode {
    Whole,
    Stream,
}

impl EncodeMode {
    pub fn from_stream_flag(stream: bool) -> Self {
        if stream {
            Self::Stream
        } else {
            Self::Whole
        }
    }
}

pub enum Encoded {
    Whole(ResolvedResponse),
    Stream(ChunkStream),
}

enum Units {
    Words { cursor: usize },
    Characters { cursor: usize },
    Precomputed { start: usize, ends: std::vec::IntoIter<usize> },
}

impl Units {
    fn next(&mut self, text: &str) -> Option<Range<usize>> {
        match self {
            Self::Words { cursor } => {
                if *cursor >= text.len() {
                    return None;
                }
                let start = *cursor;
                *cursor = word_end(text, start);
                Some(start..*cursor)
            }
            Self::Characters { cursor } => {
                let start = *cursor;
                let ch = text[start..].chars().next()?;
                *cursor += ch.len_utf8();
                Some(start..*cursor)
            }
            Self::Precomputed { start, ends } => {
                let end = ends.next()?;
                let range = *start..end;
                *start = end;
                Some(range)
            }
        }
    }
}

/// Lazy, finite, strictly ordered sequence of chunks for one response
pub struct ChunkStream {
    body: String,
    units: Units,
    lookahead: Option<Range<usize>>,
    next_index: usize,
    finish_reason: FinishReason,
    chunk_delay: Duration,
    delay: Option<Pin<Box<Sleep>>>,
    finished: bool,
}

impl ChunkStream {
    fn new(body: String, mut units: Units, finish_reason: FinishReason, chunk_delay: Duration) -> Self {
        let lookahead = units.next(&body);
        Self {
            body,
            units,
            lookahead,
            next_index: 0,
            finish_reason,
            chunk_delay,
            delay: None,
            finished: false,
        }
    }

    fn next_chunk(&mut self) -> Option<StreamChunk> {
        if self.finished {
            return None;
        }
        // An empty body still yields exactly one (empty) final chunk
        let end = self.body.len();
        let range = self.lookahead.take().unwrap_or(end..end);
        self.lookahead = self.units.next(&self.body);

        let is_final = self.lookahead.is_none();
        let chunk = StreamChunk {
            delta_text: self.body[range].to_string(),
            index: self.next_index,
            is_final,
            finish_reason: is_final.then_some(self.finish_reason),
        };
        self.next_index += 1;
        self.finished = is_final;
        Some(chunk)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Stream for ChunkStream {
    type Item = StreamChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.finished {
            return Poll::Ready(None);
        }

        if let Some(delay) = this.delay.as_mut() {
            ready!(delay.as_mut().poll(cx));
            this.delay = None;
        }

        let chunk = this.next_chunk();
        if matches!(&chunk, Some(c) if !c.is_final) && !this.chunk_delay.is_zero() {
            this.delay = Some(Box::pin(tokio::time::sleep(this.chunk_delay)));
        }
        Poll::Ready(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            (0, Some(0))
        } else {
            (1, None)
        }
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        if !self.finished {
            debug!(
                emitted = self.next_index,
                "Stream aborted before final chunk"
            );
        }
    }
}

/// Renders resolved responses per dialect granularity
#[derive(Clone)]
pub struct StreamEncoder {
    openai: StreamGranularity,
    anthropic: StreamGranularity,
    tokenizers: TokenizerRegistry,
}

impl StreamEncoder {
    pub fn new(config: &DialectsConfig, tokenizers: TokenizerRegistry) -> Self {
        Self {
            openai: config.openai.stream_granularity,
            anthropic: config.anthropic.stream_granularity,
            tokenizers,
        }
    }

    /// Same granularity for every dialect
    pub fn uniform(granularity: StreamGranularity, tokenizers: TokenizerRegistry) -> Self {
        Self {
            openai: granularity,
            anthropic: granularity,
            tokenizers,
        }
    }

    pub fn granularity(&self, dialect: Dialect) -> StreamGranularity {
        match dialect {
            Dialect::OpenAi => self.openai,
            Dialect::Anthropic => self.anthropic,
        }
    }

    pub fn encode(&self, dialect: Dialect, resolved: ResolvedResponse, mode: EncodeMode) -> Encoded {
        match mode {
            EncodeMode::Whole => Encoded::Whole(resolved),
            EncodeMode::Stream => Encoded::Stream(self.stream(dialect, &resolved)),
        }
    }

    pub fn stream(&self, dialect: Dialect, resolved: &ResolvedResponse) -> ChunkStream {
        let granularity = resolved
            .granularity
            .unwrap_or_else(|| self.granularity(dialect));

        let units = match granularity {
            StreamGranularity::Word => Units::Words { cursor: 0 },
            StreamGranularity::Character => Units::Characters { cursor: 0 },
            StreamGranularity::Token => {
                let tokenizer = self.tokenizers.for_dialect(dialect);
                match tokenizer.boundaries(&resolved.body) {
                    Some(ends) => Units::Precomputed {
                        start: 0,
                        ends: ends.into_iter(),
                    },
                    None => {
                        debug!(
                            tokenizer = tokenizer.name(),
                            "Token boundaries unavailable, streaming by word"
                        );
                        Units::Words { cursor: 0 }
                    }
                }
            }
        };

        ChunkStream::new(
            resolved.body.clone(),
            units,
            resolved.finish_reason,
            resolved.chunk_delay,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completions::ports::MatchSource;
    use crate::responses::MissPolicy;
    use futures::StreamExt;

    fn resolved(body: &str, finish_reason: FinishReason) -> ResolvedResponse {
        ResolvedResponse {
            body: body.to_string(),
            finish_reason,
            token_count: 0,
            prompt_tokens: 0,
            source: MatchSource::Matched {
                key: "k".to_string(),
            },
            snapshot_version: 1,
            miss_policy: MissPolicy::Default,
            chunk_delay: Duration::ZERO,
            response_delay: Duration::ZERO,
            granularity: None,
        }
    }

    fn encoder(granularity: StreamGranularity) -> StreamEncoder {
        StreamEncoder::uniform(granularity, TokenizerRegistry::whitespace())
    }

    async fn collect(stream: ChunkStream) -> Vec<StreamChunk> {
        stream.collect().await
    }

    fn assert_well_formed(chunks: &[StreamChunk], body: &str) {
        assert!(!chunks.is_empty());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.is_final, i == chunks.len() - 1);
            assert_eq!(chunk.finish_reason.is_some(), chunk.is_final);
        }
        let text: String = chunks.iter().map(|c| c.delta_text.as_str()).collect();
        assert_eq!(text, body);
    }

    #[tokio::test]
    async fn test_word_stream_matches_scenario() {
        let stream = encoder(StreamGranularity::Word)
            .stream(Dialect::OpenAi, &resolved("Hello, world!", FinishReason::Stop));
        let chunks = collect(stream).await;

        let deltas: Vec<_> = chunks.iter().map(|c| c.delta_text.as_str()).collect();
        assert_eq!(deltas, vec!["Hello,", " world!"]);
        assert!(!chunks[0].is_final);
        assert!(chunks[1].is_final);
        assert_eq!(chunks[1].finish_reason, Some(FinishReason::Stop));
    }

    #[tokio::test]
    async fn test_streams_reproduce_body_exactly() {
        let bodies = [
            "Hello, world!",
            "  leading and trailing  ",
            "multi\nline\n\ntext",
            "ünïcödé and emoji 🎉 ok",
            "x",
        ];
        for granularity in [
            StreamGranularity::Word,
            StreamGranularity::Character,
            StreamGranularity::Token,
        ] {
            for body in bodies {
                let chunks = collect(
                    encoder(granularity).stream(Dialect::Anthropic, &resolved(body, FinishReason::Length)),
                )
                .await;
                assert_well_formed(&chunks, body);
                assert_eq!(chunks.last().unwrap().finish_reason, Some(FinishReason::Length));
            }
        }
    }

    #[tokio::test]
    async fn test_character_granularity() {
        let chunks = collect(
            encoder(StreamGranularity::Character)
                .stream(Dialect::OpenAi, &resolved("héy", FinishReason::Stop)),
        )
        .await;
        let deltas: Vec<_> = chunks.iter().map(|c| c.delta_text.as_str()).collect();
        assert_eq!(deltas, vec!["h", "é", "y"]);
    }

    #[tokio::test]
    async fn test_entry_granularity_overrides_dialect() {
        let mut response = resolved("ab cd", FinishReason::Stop);
        response.granularity = Some(StreamGranularity::Character);
        let chunks = collect(encoder(StreamGranularity::Word).stream(Dialect::OpenAi, &response)).await;
        assert_eq!(chunks.len(), 5);
    }

    #[tokio::test]
    async fn test_empty_body_yields_single_final_chunk() {
        let chunks = collect(
            encoder(StreamGranularity::Word).stream(Dialect::OpenAi, &resolved("", FinishReason::Stop)),
        )
        .await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].delta_text, "");
        assert!(chunks[0].is_final);
    }

    #[tokio::test]
    async fn test_nothing_after_final() {
        let mut stream = encoder(StreamGranularity::Word)
            .stream(Dialect::OpenAi, &resolved("one two", FinishReason::Stop));
        assert!(!stream.next().await.unwrap().is_final);
        assert!(stream.next().await.unwrap().is_final);
        assert!(stream.is_finished());
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_early_drop_stops_emission() {
        let mut stream = encoder(StreamGranularity::Word)
            .stream(Dialect::OpenAi, &resolved("a b c d e", FinishReason::Stop));
        let first = stream.next().await.unwrap();
        assert_eq!(first.delta_text, "a");
        assert!(!stream.is_finished());
        drop(stream);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunks_are_paced() {
        let mut response = resolved("a b c", FinishReason::Stop);
        response.chunk_delay = Duration::from_millis(100);
        let start = tokio::time::Instant::now();

        let chunks = collect(encoder(StreamGranularity::Word).stream(Dialect::OpenAi, &response)).await;

        assert_eq!(chunks.len(), 3);
        // Two gaps between three chunks, none after the final one
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(300), "{elapsed:?}");
    }

    #[test]
    fn test_unpaced_chunks_are_ready_on_first_poll() {
        let stream = encoder(StreamGranularity::Word)
            .stream(Dialect::OpenAi, &resolved("one two", FinishReason::Stop));
        let mut task = tokio_test::task::spawn(stream);

        let first = tokio_test::assert_ready!(task.poll_next()).unwrap();
        assert_eq!(first.delta_text, "one");
        let second = tokio_test::assert_ready!(task.poll_next()).unwrap();
        assert!(second.is_final);
        assert!(tokio_test::assert_ready!(task.poll_next()).is_none());
    }

    #[test]
    fn test_whole_mode_passes_resolved_through() {
        let encoded = encoder(StreamGranularity::Word).encode(
            Dialect::OpenAi,
            resolved("Hello, world!", FinishReason::Stop),
            EncodeMode::from_stream_flag(false),
        );
        match encoded {
            Encoded::Whole(response) => assert_eq!(response.body, "Hello, world!"),
            Encoded::Stream(_) => panic!("expected whole payload"),
        }
    }
}
