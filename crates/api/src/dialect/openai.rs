use super::{Frame, OPENAI};
use crate::conversions::current_unix_timestamp;
use crate::models::{
    ChatChoice, ChatCompletionResponse, Delta, ResponseMessage, StreamChoice, StreamChunkResponse,
    Usage,
};
use futures::{stream, Stream, StreamExt};
use services::{ChunkStream, FinishReason, ResolvedResponse, StreamChunk};

const CHUNK_EVENT: &str = "chat.completion.chunk";

pub fn usage(resolved: &ResolvedResponse) -> Usage {
    Usage {
        prompt_tokens: resolved.prompt_tokens,
        completion_tokens: resolved.token_count,
        total_tokens: resolved.total_tokens(),
    }
}

pub fn completion_response(model: &str, resolved: &ResolvedResponse) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: OPENAI.new_id(),
        object: "chat.completion".to_string(),
        created: current_unix_timestamp(),
        model: model.to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message: ResponseMessage {
                role: "assistant".to_string(),
                content: resolved.body.clone(),
            },
            finish_reason: resolved.finish_reason.as_str().to_string(),
        }],
        usage: usage(resolved),
    }
}

/// Parameters common to all chunks in a streaming response
#[derive(Debug, Clone)]
pub struct ChunkContext {
    pub id: String,
    pub model: String,
    pub created: i64,
}

impl ChunkContext {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: OPENAI.new_id(),
            model: model.into(),
            created: current_unix_timestamp(),
        }
    }

    fn build(
        &self,
        choices: Vec<StreamChoice>,
        usage: Option<Usage>,
    ) -> StreamChunkResponse {
        StreamChunkResponse {
            id: self.id.clone(),
            object: CHUNK_EVENT.to_string(),
            created: self.created,
            model: self.model.clone(),
            choices,
            usage,
        }
    }

    fn choice(delta: Delta, finish_reason: Option<FinishReason>) -> Vec<StreamChoice> {
        vec![StreamChoice {
            index: 0,
            delta,
            finish_reason: finish_reason.map(|reason| reason.as_str().to_string()),
        }]
    }

    /// Create a chunk with assistant role (first chunk)
    pub fn role_chunk(&self) -> StreamChunkResponse {
        let delta = Delta {
            role: Some("assistant".to_string()),
            content: Some(String::new()),
        };
        self.build(Self::choice(delta, None), None)
    }

    /// Create a chunk with text content; the final one carries the finish reason
    pub fn text_chunk(&self, chunk: &StreamChunk) -> StreamChunkResponse {
        let delta = Delta {
            role: None,
            content: Some(chunk.delta_text.clone()),
        };
        self.build(Self::choice(delta, chunk.finish_reason), None)
    }

    /// Trailing usage-only chunk requested through `stream_options`
    pub fn usage_chunk(&self, usage: Usage) -> StreamChunkResponse {
        self.build(Vec::new(), Some(usage))
    }
}

/// Role chunk, one chunk per stream unit, then the optional usage chunk.
/// The `[DONE]` sentinel is appended by the profile.
pub fn stream_frames(
    context: ChunkContext,
    chunks: ChunkStream,
    usage: Option<Usage>,
) -> impl Stream<Item = Frame> + Send + 'static {
    let role = Frame::json(CHUNK_EVENT, &context.role_chunk());
    let trailer = usage.map(|usage| Frame::json(CHUNK_EVENT, &context.usage_chunk(usage)));

    stream::iter([role])
        .chain(chunks.map(move |chunk| Frame::json(CHUNK_EVENT, &context.text_chunk(&chunk))))
        .chain(stream::iter(trailer))
}
