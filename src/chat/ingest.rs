//! Incremental decoding of a streamed chat response
//!
//! Bytes arrive in arbitrary chunks. They are decoded as UTF-8 (keeping
//! split multi-byte sequences for the next chunk), split into lines, and each
//! `data: ` line is parsed as a [`StreamChunk`]. Text deltas are forwarded as
//! they come; tool-call arguments are accumulated per call and materialized
//! into a [`ContentPlan`] once the model signals `finish_reason: "tool_calls"`
//! or the stream ends.

use std::collections::BTreeMap;

use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use super::frame::StreamChunk;
use crate::plan::{ContentPlan, CONTENT_PLAN_TOOL};

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Assistant text to append
    TextDelta(String),
    /// A tool call with this name began streaming
    ToolCallStarted { name: String },
    PlanReady(ContentPlan),
    /// Tool arguments that could not be turned into a plan
    PlanRejected { raw: String, error: String },
    /// The stream is over
    Done,
}

#[derive(Debug, Default)]
struct PendingCall {
    name: Option<String>,
    arguments: String,
}

enum Line {
    Continue,
    Done,
    Unparsable,
}

#[derive(Debug, Default)]
pub struct StreamIngest {
    /// Trailing bytes of an incomplete UTF-8 sequence
    pending_bytes: Vec<u8>,
    buffer: String,
    /// Frame pushed back after a parse failure, retried once
    retry_line: Option<String>,
    calls: BTreeMap<u32, PendingCall>,
    text: String,
    done: bool,
    finished: bool,
    dropped_frames: usize,
}

impl StreamIngest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `[DONE]` was seen; later input is ignored
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// All assistant text received so far
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Frames dropped because they never parsed
    pub fn dropped_frames(&self) -> usize {
        self.dropped_frames
    }

    /// Feed one chunk of the response body
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done || self.finished {
            return events;
        }

        let decoded = self.decode(bytes);
        self.buffer.push_str(&decoded);

        while let Some(newline) = self.buffer.find('\n') {
            let mut line: String = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }

            match self.process_line(&line, &mut events) {
                Line::Continue => self.retry_line = None,
                Line::Done => {
                    debug!("Stream signalled {}", DONE_SENTINEL);
                    self.done = true;
                    self.buffer.clear();
                    break;
                }
                Line::Unparsable => {
                    if self.retry_line.as_deref() == Some(line.as_str()) {
                        warn!("Dropping unparsable stream frame: {}", truncate(&line));
                        self.dropped_frames += 1;
                        self.retry_line = None;
                        continue;
                    }
                    // wait for more bytes before trying this frame again
                    self.buffer.insert(0, '\n');
                    self.buffer.insert_str(0, &line);
                    self.retry_line = Some(line);
                    break;
                }
            }
        }

        events
    }

    /// End of stream: process whatever is still buffered and flush tool calls
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        self.finished = true;

        if !self.done {
            if !self.pending_bytes.is_empty() {
                let tail = String::from_utf8_lossy(&self.pending_bytes).into_owned();
                self.pending_bytes.clear();
                self.buffer.push_str(&tail);
            }

            let rest = std::mem::take(&mut self.buffer);
            for raw in rest.split('\n') {
                let line = raw.strip_suffix('\r').unwrap_or(raw);
                match self.process_line(line, &mut events) {
                    Line::Continue => {}
                    Line::Done => {
                        self.done = true;
                        break;
                    }
                    Line::Unparsable => {
                        warn!("Dropping unparsable stream frame: {}", truncate(line));
                        self.dropped_frames += 1;
                    }
                }
            }
        }

        self.flush_tool_calls(&mut events);
        events.push(StreamEvent::Done);
        events
    }

    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending_bytes.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending_bytes) {
                Ok(s) => {
                    out.push_str(s);
                    self.pending_bytes.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending_bytes[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending_bytes.drain(..valid + len);
                        }
                        None => {
                            // incomplete sequence at the end, keep it
                            self.pending_bytes.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<StreamEvent>) -> Line {
        if line.trim().is_empty() || line.starts_with(':') {
            return Line::Continue;
        }
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return Line::Continue;
        };
        let payload = payload.trim();
        if payload == DONE_SENTINEL {
            return Line::Done;
        }

        match serde_json::from_str::<StreamChunk>(payload) {
            Ok(chunk) => {
                self.apply_chunk(chunk, events);
                Line::Continue
            }
            Err(_) => Line::Unparsable,
        }
    }

    fn apply_chunk(&mut self, chunk: StreamChunk, events: &mut Vec<StreamEvent>) {
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                self.text.push_str(&content);
                events.push(StreamEvent::TextDelta(content));
            }

            for call in choice.delta.tool_calls.unwrap_or_default() {
                let Some(function) = call.function else {
                    continue;
                };
                let pending = self.calls.entry(call.index.unwrap_or(0)).or_default();

                if let Some(name) = function.name.filter(|n| !n.is_empty()) {
                    if pending.name.as_deref() != Some(name.as_str()) {
                        events.push(StreamEvent::ToolCallStarted { name: name.clone() });
                    }
                    pending.name = Some(name);
                }
                if let Some(arguments) = function.arguments {
                    pending.arguments.push_str(&arguments);
                }
            }

            if choice.finish_reason.as_deref() == Some("tool_calls") {
                self.flush_tool_calls(events);
            }
        }
    }

    fn flush_tool_calls(&mut self, events: &mut Vec<StreamEvent>) {
        for (index, call) in std::mem::take(&mut self.calls) {
            if let Some(name) = call.name.as_deref() {
                if name != CONTENT_PLAN_TOOL {
                    debug!("Ignoring call #{} to tool {}", index, name);
                    continue;
                }
            }
            if call.arguments.trim().is_empty() {
                continue;
            }

            match ContentPlan::from_tool_arguments(&call.arguments) {
                Ok(plan) => {
                    debug!("Materialized plan \"{}\" ({} actions)", plan.title, plan.actions.len());
                    events.push(StreamEvent::PlanReady(plan));
                }
                Err(e) => {
                    warn!("Rejected content plan: {}", e);
                    events.push(StreamEvent::PlanRejected {
                        raw: call.arguments,
                        error: e.to_string(),
                    });
                }
            }
        }
    }
}

fn truncate(line: &str) -> String {
    line.chars().take(120).collect()
}

/// Drive a byte stream through an ingest, handing each event to `on_event`.
///
/// A read error aborts the loop without flushing; events already delivered stand.
pub async fn ingest_stream<S, B, E, F>(mut stream: S, ingest: &mut StreamIngest, mut on_event: F) -> Result<(), E>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    F: FnMut(StreamEvent),
{
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        for event in ingest.push(chunk.as_ref()) {
            on_event(event);
        }
        if ingest.is_done() {
            break;
        }
    }

    for event in ingest.finish() {
        on_event(event);
    }
    Ok(())
}
