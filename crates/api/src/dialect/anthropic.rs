use super::{Frame, ANTHROPIC};
use crate::models::{
    AnthropicStreamEvent, AnthropicUsage, MessageDeltaBody, MessagesResponse, OutputUsage,
    TextBlock, TextDelta,
};
use futures::{stream, Stream, StreamExt};
use services::{ChunkStream, FinishReason, ResolvedResponse, StreamChunk};

pub fn stop_reason(finish_reason: FinishReason) -> &'static str {
    match finish_reason {
        FinishReason::Stop => "end_turn",
        FinishReason::Length => "max_tokens",
        FinishReason::ContentFilter => "refusal",
    }
}

pub fn usage(resolved: &ResolvedResponse) -> AnthropicUsage {
    AnthropicUsage {
        input_tokens: resolved.prompt_tokens,
        output_tokens: resolved.token_count,
    }
}

pub fn message_response(model: &str, resolved: &ResolvedResponse) -> MessagesResponse {
    MessagesResponse {
        id: ANTHROPIC.new_id(),
        r#type: "message".to_string(),
        role: "assistant".to_string(),
        content: vec![TextBlock::new(resolved.body.clone())],
        model: model.to_string(),
        stop_reason: Some(stop_reason(resolved.finish_reason).to_string()),
        stop_sequence: None,
        usage: usage(resolved),
    }
}

fn frame(event: AnthropicStreamEvent) -> Frame {
    Frame::json(event.name(), &event)
}

/// Events for one stream unit. Empty deltas are skipped; the final unit
/// closes the content block and the message.
fn unit_events(chunk: StreamChunk, output_tokens: u32) -> Vec<AnthropicStreamEvent> {
    let mut events = Vec::with_capacity(4);
    if !chunk.delta_text.is_empty() {
        events.push(AnthropicStreamEvent::ContentBlockDelta {
            index: 0,
            delta: TextDelta {
                r#type: "text_delta".to_string(),
                text: chunk.delta_text,
            },
        });
    }
    if let Some(finish_reason) = chunk.finish_reason.filter(|_| chunk.is_final) {
        events.push(AnthropicStreamEvent::ContentBlockStop { index: 0 });
        events.push(AnthropicStreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some(stop_reason(finish_reason).to_string()),
                stop_sequence: None,
            },
            usage: OutputUsage { output_tokens },
        });
        events.push(AnthropicStreamEvent::MessageStop);
    }
    events
}

pub fn stream_frames(
    model: &str,
    chunks: ChunkStream,
    usage: AnthropicUsage,
) -> impl Stream<Item = Frame> + Send + 'static {
    let start = MessagesResponse {
        id: ANTHROPIC.new_id(),
        r#type: "message".to_string(),
        role: "assistant".to_string(),
        content: Vec::new(),
        model: model.to_string(),
        stop_reason: None,
        stop_sequence: None,
        usage: AnthropicUsage {
            input_tokens: usage.input_tokens,
            output_tokens: 0,
        },
    };
    let preamble = [
        AnthropicStreamEvent::MessageStart { message: start },
        AnthropicStreamEvent::ContentBlockStart {
            index: 0,
            content_block: TextBlock::new(""),
        },
        AnthropicStreamEvent::Ping,
    ];

    let output_tokens = usage.output_tokens;
    stream::iter(preamble.map(frame)).chain(
        chunks.flat_map(move |chunk| {
            stream::iter(unit_events(chunk, output_tokens).into_iter().map(frame))
        }),
    )
}
