//! MessageCollector: accumulates a streamed sequence of tagged
//! messages and pairs each `tool_use` with its matching `tool_result` by
//! `toolUseId`. Single-producer/single-consumer, never blocks; malformed
//! JSON produces a `Malformed` event and parsing continues.

use crate::types::{StructuredOutput, ToolCallRecord, TokenUsage};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamMessage {
    System {
        #[serde(default)]
        subtype: Option<String>,
    },
    Assistant {
        #[serde(default)]
        content: Vec<ContentBlock>,
    },
    User {
        tool_use_id: String,
        content: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
    Result {
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        usage: Option<TokenUsage>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        total_cost_usd: Option<f64>,
        #[serde(default)]
        num_turns: u32,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
}

#[derive(Debug, Clone)]
pub enum CollectorEvent {
    AssistantText(String),
    ToolCallStarted { id: String, name: String },
    ToolCallCompleted(ToolCallRecord),
    ResultReceived(StructuredOutput),
    Malformed(String),
}

struct PendingToolCall {
    name: String,
    input: serde_json::Value,
    started_at: Instant,
}

pub struct MessageCollector {
    pending: HashMap<String, PendingToolCall>,
}

impl MessageCollector {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Parse one line of structured JSON output and return the events it
    /// produces. Never blocks; malformed lines yield a single `Malformed`
    /// event and the collector's state is left unchanged.
    pub fn ingest(&mut self, line: &str) -> Vec<CollectorEvent> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        let message: StreamMessage = match serde_json::from_str(trimmed) {
            Ok(m) => m,
            Err(e) => return vec![CollectorEvent::Malformed(format!("{e}: {trimmed}"))],
        };

        match message {
            StreamMessage::System { .. } => Vec::new(),
            StreamMessage::Assistant { content } => content
                .into_iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(CollectorEvent::AssistantText(text)),
                    ContentBlock::ToolUse { id, name, input } => {
                        self.pending.insert(
                            id.clone(),
                            PendingToolCall {
                                name: name.clone(),
                                input,
                                started_at: Instant::now(),
                            },
                        );
                        Some(CollectorEvent::ToolCallStarted { id, name })
                    }
                })
                .collect(),
            StreamMessage::User {
                tool_use_id,
                content,
                is_error,
            } => match self.pending.remove(&tool_use_id) {
                Some(pending) => vec![CollectorEvent::ToolCallCompleted(ToolCallRecord {
                    tool: pending.name,
                    input: pending.input,
                    output: if is_error { None } else { Some(content.clone()) },
                    error: if is_error {
                        Some(content.to_string())
                    } else {
                        None
                    },
                    duration_ms: pending.started_at.elapsed().as_millis() as u64,
                })],
                None => vec![CollectorEvent::Malformed(format!(
                    "tool_result for unknown tool_use_id {tool_use_id}"
                ))],
            },
            StreamMessage::Result {
                result,
                session_id,
                usage,
                model,
                total_cost_usd,
                num_turns,
            } => vec![CollectorEvent::ResultReceived(StructuredOutput {
                result,
                session_id,
                usage,
                model,
                total_cost_usd,
                tool_calls: Vec::new(),
                turns: num_turns,
            })],
        }
    }
}

impl Default for MessageCollector {
    fn default() -> Self {
        Self::new()
    }
}
