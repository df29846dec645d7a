//! Pause-marker rewriting for model output streams
//!
//! A paused call returns a [`PauseMarker`] as its tool result. Chat UIs do not
//! know that shape, so the interceptor follows every paused tool-result frame
//! with a synthetic `FAKE_HUMAN_INTERACTION` tool call the UI can render as an
//! approval prompt.
//!
//! Frames are newline-delimited `<code>:<json>` lines: `9:` is a tool call
//! `{toolCallId, toolName, args}`, `a:` a tool result `{toolCallId, result}`.
//! Every other frame passes through untouched.
//!
//! The same vocabulary describes chat history ([`Message`]), which is how
//! a human's answer comes back to
//! [`Toolkit::parse_messages`](crate::toolkit::Toolkit::parse_messages).

use std::sync::Arc;

use async_stream::stream;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::engine::PauseMarker;
use crate::pending::PendingCallStore;

/// Tool name of the synthetic approval call
pub const FAKE_HUMAN_INTERACTION: &str = "FAKE_HUMAN_INTERACTION";

/// Suffix appended to the original tool-call id
pub const HUMAN_INTERVENTION_SUFFIX: &str = "-human-intervention";

const TOOL_CALL_CODE: &str = "9";
const TOOL_RESULT_CODE: &str = "a";

/// A tool call as it appears in a generation step or a `9:` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallPart {
    /// Tool-call id
    pub tool_call_id: String,
    /// Tool name
    pub tool_name: String,
    /// Arguments
    #[serde(default)]
    pub args: Value,
}

/// A tool result as it appears in a generation step or an `a:` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultPart {
    /// Tool-call id the result answers
    pub tool_call_id: String,
    /// Tool name, when the runtime reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Result value
    #[serde(default)]
    pub result: Value,
}

/// Tool calls and results of one completed generation step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStep {
    /// Calls the model made
    #[serde(default)]
    pub tool_calls: Vec<ToolCallPart>,
    /// Results of those calls
    #[serde(default)]
    pub tool_results: Vec<ToolResultPart>,
}

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt
    System,
    /// End user
    User,
    /// The model
    Assistant,
    /// Tool results
    Tool,
}

/// One part of a chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    /// `tool-call`
    ToolCall(ToolCallPart),
    /// `tool-result`
    ToolResult(ToolResultPart),
    /// Text, reasoning and anything else, kept verbatim
    #[serde(untagged)]
    Other(Value),
}

/// A message of the chat history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Author
    pub role: Role,
    /// Content parts
    #[serde(default)]
    pub parts: Vec<MessagePart>,
    /// Remaining message fields, passed through unchanged
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// Message with only `parts`
    #[must_use]
    pub fn new(role: Role, parts: Vec<MessagePart>) -> Self {
        Self {
            role,
            parts,
            extra: Map::new(),
        }
    }

    /// Tool call with this id, if the message holds one
    #[must_use]
    pub fn tool_call(&self, tool_call_id: &str) -> Option<&ToolCallPart> {
        self.parts.iter().find_map(|part| match part {
            MessagePart::ToolCall(call) if call.tool_call_id == tool_call_id => Some(call),
            _ => None,
        })
    }
}

/// `a:` frame for a tool result
///
/// # Errors
///
/// Returns [`crate::Error::Json`] if the result cannot be serialized.
pub fn tool_result_frame(part: &ToolResultPart) -> crate::Result<Bytes> {
    let json = serde_json::to_string(part)?;
    Ok(Bytes::from(format!("{TOOL_RESULT_CODE}:{json}\n")))
}

/// Synthetic approval call for a paused tool call
///
/// `marker_args` keys win over the two `original*` keys when both are present.
#[must_use]
pub fn fake_tool_call(original_id: &str, original_name: &str, marker_args: &Value) -> ToolCallPart {
    let mut args = Map::new();
    args.insert(
        "originalToolCallId".to_string(),
        Value::String(original_id.to_string()),
    );
    args.insert(
        "originalToolName".to_string(),
        Value::String(original_name.to_string()),
    );
    if let Value::Object(extra) = marker_args {
        for (key, value) in extra {
            args.insert(key.clone(), value.clone());
        }
    }
    ToolCallPart {
        tool_call_id: format!("{original_id}{HUMAN_INTERVENTION_SUFFIX}"),
        tool_name: FAKE_HUMAN_INTERACTION.to_string(),
        args: Value::Object(args),
    }
}

/// Return `true` for a synthetic approval call
#[must_use]
pub fn is_human_loop(part: &ToolCallPart) -> bool {
    part.tool_name == FAKE_HUMAN_INTERACTION
}

/// Approval payload of a synthetic call, without the `original*` keys
///
/// Returns `None` for ordinary tool calls.
#[must_use]
pub fn ui_args(part: &ToolCallPart) -> Option<Value> {
    if !is_human_loop(part) {
        return None;
    }
    let mut args = part.args.as_object().cloned().unwrap_or_default();
    args.remove("originalToolCallId");
    args.remove("originalToolName");
    Some(Value::Object(args))
}

/// Replace paused results of a completed step with synthetic approval calls
///
/// Completed results keep their original call. A paused result whose call is
/// missing from the step is dropped.
#[must_use]
pub fn rewrite_step(step: GenerationStep) -> GenerationStep {
    let mut out = GenerationStep::default();
    for result in step.tool_results {
        let call = step
            .tool_calls
            .iter()
            .find(|c| c.tool_call_id == result.tool_call_id);

        match PauseMarker::from_json(&result.result) {
            Some(marker) => {
                if let Some(call) = call {
                    out.tool_calls
                        .push(fake_tool_call(&call.tool_call_id, &call.tool_name, &marker.args));
                }
            }
            None => {
                if let Some(call) = call {
                    out.tool_calls.push(call.clone());
                }
                out.tool_results.push(result);
            }
        }
    }
    out
}

// ── StreamInterceptor ─────────────────────────────────────────────────────────

/// Incremental frame rewriter for one stream
///
/// Feed raw chunks with [`push`](Self::push); call [`finish`](Self::finish)
/// once the input ends. Frames are split on `\n` at the byte level, so chunk
/// boundaries inside multi-byte characters are harmless.
#[derive(Debug)]
pub struct StreamInterceptor {
    buffer: BytesMut,
    /// Prefix of `buffer` already known to hold no `\n`
    scanned: usize,
    pending: Arc<PendingCallStore>,
}

impl StreamInterceptor {
    /// Interceptor checking markers against `pending`
    #[must_use]
    pub fn new(pending: Arc<PendingCallStore>) -> Self {
        Self {
            buffer: BytesMut::new(),
            scanned: 0,
            pending,
        }
    }

    /// Consume a chunk, returning every frame it completed plus any
    /// synthetic frames, in order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let pos = self.scanned + offset;
            self.scanned = 0;
            let frame = self.buffer.split_to(pos + 1).freeze();
            let synthetic = self.synthetic_for(&frame[..pos]);
            out.push(frame);
            if let Some(extra) = synthetic {
                out.push(extra);
            }
        }
        self.scanned = self.buffer.len();
        out
    }

    /// Flush a partial trailing frame unchanged
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.buffer.is_empty() {
            None
        } else {
            trace!(bytes = self.buffer.len(), "Flushing partial trailing frame");
            self.scanned = 0;
            Some(self.buffer.split().freeze())
        }
    }

    fn synthetic_for(&self, line: &[u8]) -> Option<Bytes> {
        let line = std::str::from_utf8(line).ok()?;
        let (code, payload) = line.split_once(':')?;
        if code != TOOL_RESULT_CODE {
            return None;
        }
        let part: ToolResultPart = serde_json::from_str(payload).ok()?;
        let marker = PauseMarker::from_json(&part.result)?;
        let Some(context) = self.pending.get(&part.tool_call_id) else {
            debug!(
                tool_call_id = %part.tool_call_id,
                "Pause marker without a pending context, passing through"
            );
            return None;
        };

        let call = fake_tool_call(&part.tool_call_id, &context.tool_name, &marker.args);
        let json = serde_json::to_string(&call).ok()?;
        debug!(tool_call_id = %part.tool_call_id, "Injected human-interaction tool call");
        Some(Bytes::from(format!("{TOOL_CALL_CODE}:{json}\n")))
    }
}

/// Wrap a byte-chunk stream with a [`StreamInterceptor`]
///
/// Errors from the input are forwarded in place and do not end the output.
pub fn intercept_stream<S, E>(
    input: S,
    pending: Arc<PendingCallStore>,
) -> impl Stream<Item = Result<Bytes, E>>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    stream! {
        let mut interceptor = StreamInterceptor::new(pending);
        let mut input = std::pin::pin!(input);

        while let Some(chunk) = input.next().await {
            match chunk {
                Ok(chunk) => {
                    for frame in interceptor.push(&chunk) {
                        yield Ok(frame);
                    }
                }
                Err(e) => {
                    yield Err(e);
                }
            }
        }
        if let Some(rest) = interceptor.finish() {
            yield Ok(rest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pending::PendingToolContext;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Instant;

    fn store_with(id: &str) -> Arc<PendingCallStore> {
        let store = Arc::new(PendingCallStore::new());
        store.insert(PendingToolContext {
            original_tool_call_id: id.to_string(),
            tool_name: "deletePet".to_string(),
            client_name: "petstore".to_string(),
            operation_id: "deletePet".to_string(),
            original_args: json!({ "path": { "petId": 10 } }),
            created_at: Instant::now(),
        });
        store
    }

    fn paused_result_frame(id: &str) -> String {
        let result = json!({
            "_humanIntervention": true,
            "toolCallId": id,
            "args": { "ui": { "path": { "petId": 10 } }, "originalToolCallId": id, "originalToolName": "deletePet" },
            "metadata": {},
            "auth": {}
        });
        format!("a:{}\n", json!({ "toolCallId": id, "result": result }))
    }

    fn text(frames: &[Bytes]) -> String {
        frames
            .iter()
            .map(|f| String::from_utf8(f.to_vec()).unwrap())
            .collect()
    }

    // ── Framing ─────────────────────────────────────────────────────────────

    #[test]
    fn ordinary_frames_pass_through() {
        let mut interceptor = StreamInterceptor::new(Arc::new(PendingCallStore::new()));
        let input = "0:\"Hello\"\n9:{\"toolCallId\":\"T1\",\"toolName\":\"x\",\"args\":{}}\n";

        let out = interceptor.push(input.as_bytes());

        assert_eq!(out.len(), 2);
        assert_eq!(text(&out), input);
        assert_eq!(interceptor.finish(), None);
    }

    #[test]
    fn paused_result_is_followed_by_synthetic_call() {
        let mut interceptor = StreamInterceptor::new(store_with("T1"));
        let frame = paused_result_frame("T1");

        let out = interceptor.push(frame.as_bytes());

        assert_eq!(out.len(), 2);
        assert_eq!(String::from_utf8(out[0].to_vec()).unwrap(), frame);

        let synthetic = String::from_utf8(out[1].to_vec()).unwrap();
        let payload: ToolCallPart =
            serde_json::from_str(synthetic.strip_prefix("9:").unwrap().trim_end()).unwrap();
        assert_eq!(payload.tool_call_id, "T1-human-intervention");
        assert_eq!(payload.tool_name, FAKE_HUMAN_INTERACTION);
        assert_eq!(payload.args["originalToolCallId"], "T1");
        assert_eq!(payload.args["originalToolName"], "deletePet");
        assert_eq!(payload.args["ui"], json!({ "path": { "petId": 10 } }));
    }

    #[test]
    fn marker_without_pending_context_is_not_rewritten() {
        let mut interceptor = StreamInterceptor::new(Arc::new(PendingCallStore::new()));
        let out = interceptor.push(paused_result_frame("T9").as_bytes());
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn garbage_frames_pass_through() {
        let mut interceptor = StreamInterceptor::new(store_with("T1"));
        let out = interceptor.push(b"a:{not json\nno-colon-here\n");
        assert_eq!(text(&out), "a:{not json\nno-colon-here\n");
    }

    #[test]
    fn partial_frames_carry_over_byte_by_byte() {
        let mut interceptor = StreamInterceptor::new(store_with("T1"));
        let input = format!("0:\"héllo wörld\"\n{}", paused_result_frame("T1"));

        let mut out = Vec::new();
        for byte in input.as_bytes() {
            out.extend(interceptor.push(std::slice::from_ref(byte)));
        }

        assert_eq!(out.len(), 3);
        assert_eq!(String::from_utf8(out[0].to_vec()).unwrap(), "0:\"héllo wörld\"\n");
        assert!(String::from_utf8(out[2].to_vec()).unwrap().starts_with("9:"));
    }

    #[test]
    fn long_frame_is_scanned_once_across_chunks() {
        // GIVEN: one frame split over three chunks
        let mut interceptor = StreamInterceptor::new(Arc::new(PendingCallStore::new()));

        // WHEN: the first two chunks carry no newline
        assert!(interceptor.push(b"0:\"aaaa").is_empty());
        assert_eq!(interceptor.scanned, 7);
        assert!(interceptor.push(b"bbbb").is_empty());
        assert_eq!(interceptor.scanned, 11);

        // THEN: the third completes it; only the next partial frame stays buffered
        let out = interceptor.push(b"\"\n0:\"c");
        assert_eq!(text(&out), "0:\"aaaabbbb\"\n");
        assert_eq!(interceptor.scanned, 4);
        assert_eq!(interceptor.push(b"\"\n").len(), 1);
        assert_eq!(interceptor.scanned, 0);
    }

    #[test]
    fn trailing_partial_frame_is_flushed_unchanged() {
        let mut interceptor = StreamInterceptor::new(Arc::new(PendingCallStore::new()));
        assert!(interceptor.push(b"0:\"a\"\n0:\"unfin").len() == 1);
        assert_eq!(interceptor.finish(), Some(Bytes::from_static(b"0:\"unfin")));
        assert_eq!(interceptor.finish(), None);
    }

    // ── Stream adapter ──────────────────────────────────────────────────────

    #[test]
    fn stream_adapter_rewrites_across_chunks() {
        let frame = paused_result_frame("T1");
        let (head, tail) = frame.split_at(frame.len() / 2);
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from(format!("0:\"hi\"\n{head}"))),
            Ok(Bytes::from(tail.to_string())),
            Ok(Bytes::from_static(b"e:{\"finishReason\":\"tool-calls\"}")),
        ];

        let out: Vec<Bytes> = tokio_test::block_on(
            intercept_stream(futures::stream::iter(chunks), store_with("T1"))
                .map(Result::unwrap)
                .collect(),
        );

        assert_eq!(out.len(), 4);
        assert!(String::from_utf8(out[2].to_vec()).unwrap().contains(FAKE_HUMAN_INTERACTION));
        assert_eq!(out[3], Bytes::from_static(b"e:{\"finishReason\":\"tool-calls\"}"));
    }

    #[test]
    fn stream_adapter_forwards_errors() {
        let chunks: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(b"0:\"a\"\n")),
            Err("boom".to_string()),
            Ok(Bytes::from_static(b"0:\"b\"\n")),
        ];
        let out: Vec<Result<Bytes, String>> = tokio_test::block_on(
            intercept_stream(futures::stream::iter(chunks), Arc::new(PendingCallStore::new())).collect(),
        );
        assert_eq!(out.len(), 3);
        assert_eq!(out[1], Err("boom".to_string()));
    }

    // ── Non-streaming helpers ───────────────────────────────────────────────

    #[test]
    fn rewrite_step_swaps_paused_results_for_approval_calls() {
        let step = GenerationStep {
            tool_calls: vec![
                ToolCallPart {
                    tool_call_id: "T1".to_string(),
                    tool_name: "deletePet".to_string(),
                    args: json!({}),
                },
                ToolCallPart {
                    tool_call_id: "T2".to_string(),
                    tool_name: "listPets".to_string(),
                    args: json!({}),
                },
            ],
            tool_results: vec![
                ToolResultPart {
                    tool_call_id: "T1".to_string(),
                    tool_name: None,
                    result: json!({ "_humanIntervention": true, "toolCallId": "T1", "args": { "ui": 1 } }),
                },
                ToolResultPart {
                    tool_call_id: "T2".to_string(),
                    tool_name: None,
                    result: json!({ "status": 200 }),
                },
            ],
        };

        let rewritten = rewrite_step(step);

        let names: Vec<&str> = rewritten.tool_calls.iter().map(|c| c.tool_name.as_str()).collect();
        assert_eq!(names, vec![FAKE_HUMAN_INTERACTION, "listPets"]);
        assert_eq!(rewritten.tool_results.len(), 1);
        assert_eq!(rewritten.tool_results[0].tool_call_id, "T2");

        let fake = &rewritten.tool_calls[0];
        assert!(is_human_loop(fake));
        assert_eq!(ui_args(fake), Some(json!({ "ui": 1 })));
        assert_eq!(ui_args(&rewritten.tool_calls[1]), None);
    }

    // ── Chat history ────────────────────────────────────────────────────────

    #[test]
    fn message_keeps_unknown_parts_and_fields() {
        let raw = json!({
            "id": "m1",
            "role": "assistant",
            "parts": [
                { "type": "text", "text": "Deleting now" },
                { "type": "tool-call", "toolCallId": "T1", "toolName": "deletePet", "args": {} }
            ]
        });

        let message: Message = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(message.role, Role::Assistant);
        assert!(matches!(message.parts[0], MessagePart::Other(_)));
        assert_eq!(message.tool_call("T1").unwrap().tool_name, "deletePet");
        assert!(message.tool_call("T2").is_none());
        assert_eq!(serde_json::to_value(&message).unwrap(), raw);
    }

    #[test]
    fn tool_result_frame_uses_result_code() {
        let frame = tool_result_frame(&ToolResultPart {
            tool_call_id: "T1".to_string(),
            tool_name: None,
            result: json!({ "status": 200 }),
        })
        .unwrap();

        assert_eq!(
            String::from_utf8(frame.to_vec()).unwrap(),
            "a:{\"toolCallId\":\"T1\",\"result\":{\"status\":200}}\n"
        );
    }
}
