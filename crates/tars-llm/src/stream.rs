//! Streaming completions with transparent restart
//!
//! [`StreamSession`] owns one connection at a time. When a transient error
//! interrupts it, everything accumulated from that connection is discarded
//! and a new one is opened, so the final message only ever reflects a single
//! uninterrupted attempt. Connection attempts and mid-stream restarts draw
//! from one attempt budget.

use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::time::sleep;

use crate::convert::parse_arguments;
use crate::error::LlmError;
use crate::provider::{ChunkStream, Provider};
use crate::recovery;
use crate::retry::{RetryPolicy, next_delay};
use crate::types::{ChatRequest, ContentBlock, LlmResponse, StreamChunk, StreamEvent, ToolCall, Usage, generate_call_id};

/// Folds normalized stream chunks into a response
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    text: String,
    partial_calls: BTreeMap<u32, PartialCall>,
    calls: Vec<ToolCall>,
    usage: Usage,
    finished: bool,
}

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl ResponseAccumulator {
    /// Record a chunk, returning the event to surface for it, if any
    pub fn push(&mut self, chunk: StreamChunk) -> Option<StreamEvent> {
        match chunk {
            StreamChunk::Text(text) => {
                self.text.push_str(&text);
                return Some(StreamEvent::TextDelta(text));
            }
            StreamChunk::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            } => {
                let partial = self.partial_calls.entry(index).or_default();
                if id.is_some() {
                    partial.id = id;
                }
                if name.is_some() {
                    partial.name = name;
                }
                partial.arguments.push_str(&arguments);
            }
            StreamChunk::ToolCall(call) => self.calls.push(call),
            StreamChunk::Usage {
                input_tokens,
                output_tokens,
            } => {
                if let Some(input) = input_tokens {
                    self.usage.input_tokens = input;
                }
                if let Some(output) = output_tokens {
                    self.usage.output_tokens = output;
                }
            }
            StreamChunk::Finished => self.finished = true,
        }

        None
    }

    /// Whether the vendor signalled the end of generation
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Assemble the response: text first, then tool calls
    ///
    /// Fragmented calls are parsed once here, in index order.
    pub fn finish(self) -> LlmResponse {
        let mut content = Vec::with_capacity(self.calls.len() + self.partial_calls.len() + 1);

        if !self.text.is_empty() {
            content.push(ContentBlock::Text { text: self.text });
        }

        content.extend(self.calls.into_iter().map(ContentBlock::ToolCall));

        for (index, partial) in self.partial_calls {
            let Some(name) = partial.name else {
                tracing::warn!(index, "dropping streamed tool call without a name");
                continue;
            };
            let arguments = parse_arguments(&partial.arguments, &name);
            let id = partial.id.unwrap_or_else(generate_call_id);
            content.push(ContentBlock::ToolCall(ToolCall::new(id, name, arguments)));
        }

        LlmResponse::new(content, self.usage)
    }
}

/// One connection and what it has delivered so far
struct AttemptStream {
    chunks: ChunkStream,
    accumulator: ResponseAccumulator,
}

enum State {
    /// No connection open
    Idle,
    /// Connection open and being read
    Live(AttemptStream),
    /// A malformed tool call rejection was recovered
    Recovered {
        response: LlmResponse,
        pending_text: Option<String>,
    },
    /// Iteration finished
    Complete(LlmResponse),
    /// A terminal error was returned
    Failed,
}

enum Step {
    /// Reconnect after `error`; `streamed` is the text already yielded from the failed attempt
    Restart { error: LlmError, streamed: String },
    Complete,
}

/// Scoped handle over one streamed completion
///
/// Dropping the session closes any open connection. There is no built-in
/// deadline; wrap [`StreamSession::next`] in `tokio::time::timeout` to bound
/// waiting.
pub struct StreamSession {
    provider: Arc<dyn Provider>,
    request: ChatRequest,
    policy: RetryPolicy,
    attempts: u32,
    state: State,
}

impl StreamSession {
    /// Create an unopened session
    pub fn new(provider: Arc<dyn Provider>, request: ChatRequest, policy: RetryPolicy) -> Self {
        Self {
            provider,
            request,
            policy,
            attempts: 0,
            state: State::Idle,
        }
    }

    /// Open the underlying stream, retrying transient failures
    ///
    /// Does nothing if the session is already open or finished.
    pub async fn open(&mut self) -> Result<(), LlmError> {
        if matches!(self.state, State::Idle) {
            self.connect().await?;
        }
        Ok(())
    }

    /// Next text delta, or `None` once the stream is complete
    ///
    /// Opens the session first if needed. A transient interruption restarts
    /// the stream from scratch; the caller keeps receiving deltas from the
    /// new connection.
    pub async fn next(&mut self) -> Option<Result<StreamEvent, LlmError>> {
        loop {
            let step = match &mut self.state {
                State::Idle => {
                    if let Err(e) = self.connect().await {
                        return Some(Err(e));
                    }
                    continue;
                }
                State::Live(attempt) => match attempt.chunks.next().await {
                    Some(Ok(chunk)) => match attempt.accumulator.push(chunk) {
                        Some(event) => return Some(Ok(event)),
                        None => continue,
                    },
                    Some(Err(error)) => Step::Restart {
                        error,
                        streamed: mem::take(&mut attempt.accumulator.text),
                    },
                    None if attempt.accumulator.is_finished() => Step::Complete,
                    None => Step::Restart {
                        error: LlmError::Streaming {
                            vendor: self.provider.vendor(),
                            model: self.request.model.clone(),
                            message: "stream ended before the final frame".to_owned(),
                        },
                        streamed: String::new(),
                    },
                },
                State::Recovered { pending_text, .. } => {
                    if let Some(text) = pending_text.take() {
                        return Some(Ok(StreamEvent::TextDelta(text)));
                    }
                    Step::Complete
                }
                State::Complete(_) | State::Failed => return None,
            };

            match step {
                Step::Restart { error, streamed } => {
                    if let Err(e) = self.restart(error, &streamed).await {
                        return Some(Err(e));
                    }
                }
                Step::Complete => {
                    self.state = match mem::replace(&mut self.state, State::Failed) {
                        State::Live(attempt) => State::Complete(attempt.accumulator.finish()),
                        State::Recovered { response, .. } => State::Complete(response),
                        other => other,
                    };
                    return None;
                }
            }
        }
    }

    /// The assembled response, available once iteration has completed
    pub fn final_message(&self) -> Result<&LlmResponse, LlmError> {
        match &self.state {
            State::Complete(response) => Ok(response),
            _ => Err(LlmError::StreamIncomplete),
        }
    }

    /// Consume the remaining events and return the assembled response
    pub async fn finish(mut self) -> Result<LlmResponse, LlmError> {
        while let Some(event) = self.next().await {
            event?;
        }

        match mem::replace(&mut self.state, State::Failed) {
            State::Complete(response) => Ok(response),
            _ => Err(LlmError::StreamIncomplete),
        }
    }

    /// Attempts made so far, counting connections and restarts
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    async fn connect(&mut self) -> Result<(), LlmError> {
        loop {
            self.attempts += 1;

            let error = match self.provider.open_stream(&self.request).await {
                Ok(chunks) => {
                    self.state = State::Live(AttemptStream {
                        chunks,
                        accumulator: ResponseAccumulator::default(),
                    });
                    return Ok(());
                }
                Err(error) => error,
            };

            if self.recover(&error, "") {
                return Ok(());
            }

            let delay = self.delay_after(error)?;
            sleep(delay).await;
        }
    }

    /// Drop the interrupted connection and everything it delivered, then reconnect
    ///
    /// A recoverable malformed tool call ends the session with the recovered
    /// response instead.
    async fn restart(&mut self, error: LlmError, streamed: &str) -> Result<(), LlmError> {
        self.state = State::Idle;
        if self.recover(&error, streamed) {
            return Ok(());
        }
        let delay = self.delay_after(error)?;
        sleep(delay).await;
        self.connect().await
    }

    /// Switch to the response recovered from a malformed tool call, if any
    ///
    /// Leading text the caller already received from the failed attempt is
    /// not yielded again.
    fn recover(&mut self, error: &LlmError, streamed: &str) -> bool {
        if !matches!(error, LlmError::MalformedToolCall { .. }) {
            return false;
        }
        let Some(response) = recovery::recover(error) else {
            return false;
        };

        let text = response.text();
        let streamed = streamed.trim_end();
        let pending = if streamed.starts_with(text.as_str()) {
            ""
        } else {
            text.strip_prefix(streamed).unwrap_or(&text)
        };
        let pending_text = Some(pending.to_owned()).filter(|text| !text.is_empty());

        self.state = State::Recovered { response, pending_text };
        true
    }

    fn delay_after(&mut self, error: LlmError) -> Result<std::time::Duration, LlmError> {
        next_delay(
            &self.policy,
            self.provider.vendor(),
            &self.request.model,
            error,
            self.attempts,
        )
        .inspect_err(|_| self.state = State::Failed)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::provider::Vendor;
    use crate::provider::scripted::{ScriptedProvider, StreamScript, server_error};
    use crate::types::{Message, StopReason};

    const VENDOR: Vendor = Vendor::OpenAiCompatible;

    fn text(t: &str) -> Result<StreamChunk, LlmError> {
        Ok(StreamChunk::Text(t.to_owned()))
    }

    fn session(provider: &Arc<ScriptedProvider>, max_attempts: u32) -> StreamSession {
        StreamSession::new(
            Arc::clone(provider) as Arc<dyn Provider>,
            ChatRequest::new("test-model", 64).with_message(Message::user("hi")),
            RetryPolicy::immediate(max_attempts),
        )
    }

    async fn deltas(session: &mut StreamSession) -> Result<Vec<String>, LlmError> {
        let mut out = Vec::new();
        while let Some(event) = session.next().await {
            let StreamEvent::TextDelta(text) = event?;
            out.push(text);
        }
        Ok(out)
    }

    #[test]
    fn accumulator_joins_text_and_reassembles_calls() {
        let mut acc = ResponseAccumulator::default();
        let chunks = [
            StreamChunk::Text("Hello".to_owned()),
            StreamChunk::Text(" world".to_owned()),
            StreamChunk::ToolCallDelta {
                index: 0,
                id: Some("call_1".to_owned()),
                name: Some("get_weather".to_owned()),
                arguments: String::new(),
            },
            StreamChunk::ToolCallDelta {
                index: 0,
                id: None,
                name: None,
                arguments: "{\"city\":".to_owned(),
            },
            StreamChunk::ToolCallDelta {
                index: 0,
                id: None,
                name: None,
                arguments: "\"Tokyo\"}".to_owned(),
            },
            StreamChunk::Usage {
                input_tokens: Some(10),
                output_tokens: Some(5),
            },
            StreamChunk::Finished,
        ];
        let events: Vec<_> = chunks.into_iter().filter_map(|c| acc.push(c)).collect();
        assert_eq!(events.len(), 2);
        assert!(acc.is_finished());

        let response = acc.finish();
        let mut args = serde_json::Map::new();
        args.insert("city".to_owned(), json!("Tokyo"));
        assert_eq!(
            response.content(),
            &[
                ContentBlock::text("Hello world"),
                ContentBlock::tool_call("call_1", "get_weather", args),
            ]
        );
        assert_eq!(response.stop_reason(), StopReason::ToolCall);
        assert_eq!(response.usage(), Usage::new(10, 5));
    }

    #[test]
    fn accumulator_orders_interleaved_fragments_by_index() {
        let mut acc = ResponseAccumulator::default();
        for (index, name, args) in [(1, Some("b"), "{}"), (0, Some("a"), "{\"x\""), (0, None, ":1}")] {
            acc.push(StreamChunk::ToolCallDelta {
                index,
                id: None,
                name: name.map(str::to_owned),
                arguments: args.to_owned(),
            });
        }

        let response = acc.finish();
        let names: Vec<_> = response.tool_calls().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(response.tool_calls().next().unwrap().arguments["x"], 1);
    }

    #[tokio::test]
    async fn streams_text_then_tool_call() {
        let provider = Arc::new(ScriptedProvider::new(VENDOR).with_streams([StreamScript::Frames(vec![
            text("Hello"),
            text(" world"),
            Ok(StreamChunk::ToolCall(ToolCall::new("call_1", "look", serde_json::Map::new()))),
            Ok(StreamChunk::Finished),
        ])]));
        let mut session = session(&provider, 5);

        session.open().await.unwrap();
        assert!(matches!(session.final_message(), Err(LlmError::StreamIncomplete)));

        assert_eq!(deltas(&mut session).await.unwrap(), ["Hello", " world"]);
        let message = session.final_message().unwrap();
        assert_eq!(message.content()[0], ContentBlock::text("Hello world"));
        assert_eq!(message.stop_reason(), StopReason::ToolCall);
    }

    #[tokio::test]
    async fn mid_stream_failure_restarts_without_partial_content() {
        let provider = Arc::new(ScriptedProvider::new(VENDOR).with_streams([
            StreamScript::Frames(vec![text("Hel"), Err(server_error(VENDOR))]),
            StreamScript::Frames(vec![text("Hello"), text(" world"), Ok(StreamChunk::Finished)]),
        ]));
        let mut session = session(&provider, 5);

        assert_eq!(deltas(&mut session).await.unwrap(), ["Hel", "Hello", " world"]);
        assert_eq!(session.final_message().unwrap().text(), "Hello world");
        assert_eq!(session.attempts(), 2);
        assert_eq!(provider.attempts(), 2);
    }

    #[tokio::test]
    async fn truncated_stream_is_restarted() {
        let provider = Arc::new(ScriptedProvider::new(VENDOR).with_streams([
            StreamScript::Frames(vec![text("partial")]),
            StreamScript::Frames(vec![text("whole"), Ok(StreamChunk::Finished)]),
        ]));

        let response = session(&provider, 5).finish().await.unwrap();
        assert_eq!(response.text(), "whole");
    }

    #[tokio::test]
    async fn open_retries_refused_connections() {
        let provider = Arc::new(ScriptedProvider::new(VENDOR).with_streams([
            StreamScript::Refuse(server_error(VENDOR)),
            StreamScript::Refuse(server_error(VENDOR)),
            StreamScript::Frames(vec![text("ok"), Ok(StreamChunk::Finished)]),
        ]));
        let mut session = session(&provider, 5);

        session.open().await.unwrap();
        assert_eq!(session.attempts(), 3);
        assert_eq!(deltas(&mut session).await.unwrap(), ["ok"]);
    }

    #[tokio::test]
    async fn open_and_restart_share_one_budget() {
        let provider = Arc::new(ScriptedProvider::new(VENDOR).with_streams([
            StreamScript::Refuse(server_error(VENDOR)),
            StreamScript::Frames(vec![text("Hel"), Err(server_error(VENDOR))]),
            StreamScript::Frames(vec![text("never"), Ok(StreamChunk::Finished)]),
        ]));
        let mut session = session(&provider, 2);

        let err = deltas(&mut session).await.unwrap_err();
        assert!(matches!(err, LlmError::RetriesExhausted { attempts: 2, .. }));
        assert_eq!(provider.attempts(), 2);
        assert!(session.next().await.is_none());
    }

    #[tokio::test]
    async fn fatal_mid_stream_error_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(VENDOR).with_streams([StreamScript::Frames(vec![
            text("a"),
            Err(LlmError::Upstream {
                vendor: VENDOR,
                model: "test-model".to_owned(),
                status: 400,
                message: "invalid request".to_owned(),
            }),
        ])]));
        let mut session = session(&provider, 5);

        let err = deltas(&mut session).await.unwrap_err();
        assert!(matches!(err, LlmError::Upstream { status: 400, .. }));
        assert_eq!(provider.attempts(), 1);
    }

    #[tokio::test]
    async fn recovered_rejection_streams_leading_text() {
        let body = json!({"error": {
            "code": "tool_use_failed",
            "failed_generation": "Opening it now. <function=goto{\"url\": \"https://example.com\"}</function>"
        }});
        let provider = Arc::new(
            ScriptedProvider::new(VENDOR).with_streams([StreamScript::Refuse(LlmError::MalformedToolCall {
                vendor: VENDOR,
                model: "test-model".to_owned(),
                raw: body.to_string(),
                body: Some(body),
            })]),
        );
        let mut session = session(&provider, 5);

        assert_eq!(deltas(&mut session).await.unwrap(), ["Opening it now."]);
        let message = session.final_message().unwrap();
        assert_eq!(message.tool_calls().next().unwrap().name, "goto");
        assert_eq!(provider.attempts(), 1);
    }

    fn tool_use_failed(failed_generation: &str) -> LlmError {
        let body = json!({"error": {"code": "tool_use_failed", "failed_generation": failed_generation}});
        LlmError::MalformedToolCall {
            vendor: VENDOR,
            model: "test-model".to_owned(),
            raw: body.to_string(),
            body: Some(body),
        }
    }

    #[tokio::test]
    async fn mid_stream_rejection_is_recovered_without_repeating_text() {
        let provider = Arc::new(ScriptedProvider::new(VENDOR).with_streams([StreamScript::Frames(vec![
            text("Opening"),
            Err(tool_use_failed(
                r#"Opening it now. <function=goto>{"url": "https://example.com"}</function>"#,
            )),
        ])]));
        let mut session = session(&provider, 5);

        assert_eq!(deltas(&mut session).await.unwrap(), ["Opening", " it now."]);
        let message = session.final_message().unwrap();
        assert_eq!(message.text(), "Opening it now.");
        assert_eq!(message.tool_calls().next().unwrap().arguments["url"], "https://example.com");
        assert_eq!(provider.attempts(), 1);
    }

    #[tokio::test]
    async fn mid_stream_rejection_after_full_text_yields_nothing_more() {
        let provider = Arc::new(ScriptedProvider::new(VENDOR).with_streams([StreamScript::Frames(vec![
            text("Opening it now. "),
            Err(tool_use_failed(r#"Opening it now. <function=goto>{"url": "https://a.com"}</function>"#)),
        ])]));
        let mut session = session(&provider, 5);

        assert_eq!(deltas(&mut session).await.unwrap(), ["Opening it now. "]);
        assert_eq!(session.final_message().unwrap().tool_calls().count(), 1);
    }

    #[tokio::test]
    async fn unrecoverable_mid_stream_rejection_restarts() {
        let provider = Arc::new(ScriptedProvider::new(VENDOR).with_streams([
            StreamScript::Frames(vec![text("Hmm"), Err(tool_use_failed("no call in here"))]),
            StreamScript::Frames(vec![text("done"), Ok(StreamChunk::Finished)]),
        ]));
        let mut session = session(&provider, 5);

        assert_eq!(deltas(&mut session).await.unwrap(), ["Hmm", "done"]);
        assert_eq!(session.final_message().unwrap().text(), "done");
        assert_eq!(provider.attempts(), 2);
    }
}
