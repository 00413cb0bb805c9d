//! V2 chat adapter (Anthropic-style payloads).
//!
//! Message content is either a plain string or a list of typed blocks;
//! tool invocations appear as `tool_use` blocks. `max_tokens` is a
//! mandatory field on this wire format.

use std::time::Instant;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ProtocolError;
use crate::protocol::{ParsedMessage, ParsedPayload, ProtocolAdapter, as_object, parse_json};
use crate::types::{HistoryEntry, IntentCategory, NormalizedIntent, ProtocolTag, RequestContext};

/// A validated V2 chat request.
#[derive(Debug, Clone)]
pub struct V2ChatRequest {
    pub model: String,
    pub messages: Vec<V2Message>,
    pub max_tokens: u64,
    pub system: Option<String>,
    pub tools: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct V2Message {
    pub role: String,
    pub content: V2Content,
}

/// String shorthand or a list of typed content blocks.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum V2Content {
    Text(String),
    Blocks(Vec<V2Block>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct V2Block {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub input: Option<Value>,
}

pub struct V2Adapter;

impl ProtocolAdapter for V2Adapter {
    fn protocol(&self) -> ProtocolTag {
        ProtocolTag::V2
    }

    fn parse(&self, raw: &[u8]) -> Result<ParsedMessage, ProtocolError> {
        let start = Instant::now();
        let value = parse_json(raw)?;
        let obj = as_object(&value, ProtocolTag::V2)?;

        let model = obj
            .get("model")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::parse("MISSING_MODEL", "'model' is required"))?
            .to_string();

        let messages_value = obj
            .get("messages")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ProtocolError::parse("EMPTY_MESSAGES", "'messages' must be a non-empty array")
            })?;
        if messages_value.is_empty() {
            return Err(ProtocolError::parse(
                "EMPTY_MESSAGES",
                "'messages' must be a non-empty array",
            ));
        }

        let max_tokens = obj
            .get("max_tokens")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                ProtocolError::parse("MISSING_MAX_TOKENS", "'max_tokens' is required")
            })?;

        let messages: Vec<V2Message> =
            serde_json::from_value(Value::Array(messages_value.clone()))
                .map_err(|e| ProtocolError::parse("INVALID_MESSAGES", e.to_string()))?;

        Ok(ParsedMessage {
            protocol: ProtocolTag::V2,
            raw_size: raw.len(),
            parse_time: start.elapsed(),
            payload: ParsedPayload::V2(V2ChatRequest {
                model,
                messages,
                max_tokens,
                system: obj.get("system").and_then(Value::as_str).map(String::from),
                tools: obj
                    .get("tools")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default(),
            }),
            raw: value,
        })
    }

    fn normalize(&self, message: &ParsedMessage) -> Result<NormalizedIntent, ProtocolError> {
        let ParsedPayload::V2(request) = &message.payload else {
            return Err(ProtocolError::normalize(
                "WRONG_PAYLOAD",
                "expected a V2 payload",
            ));
        };

        // The most recent tool_use block wins.
        let tool_use = request
            .messages
            .iter()
            .rev()
            .filter_map(|m| match &m.content {
                V2Content::Blocks(blocks) => blocks.iter().find(|b| b.kind == "tool_use"),
                V2Content::Text(_) => None,
            })
            .next();

        if let Some(block) = tool_use {
            let name = block.name.as_deref().ok_or_else(|| {
                ProtocolError::normalize("MISSING_TOOL_NAME", "tool_use block lacks a name")
            })?;
            let parameters = block
                .input
                .as_ref()
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            return Ok(NormalizedIntent::new(IntentCategory::ToolCall, name)
                .with_target("tool")
                .with_parameters(parameters)
                .with_confidence(1.0));
        }

        let mut intent = NormalizedIntent::new(IntentCategory::Conversation, "chat")
            .with_target(&request.model)
            .with_confidence(0.70);
        if !request.tools.is_empty() {
            intent.push_alternative(
                "tool_call",
                0.5,
                format!("request offers {} tool(s)", request.tools.len()),
            );
        }
        if request.system.is_some() {
            intent.push_alternative(
                "follow_instructions",
                0.3,
                "system prompt constrains the task",
            );
        }
        Ok(intent)
    }

    fn context(&self, message: &ParsedMessage) -> RequestContext {
        let ParsedPayload::V2(request) = &message.payload else {
            return RequestContext::default();
        };
        RequestContext {
            history: request
                .messages
                .iter()
                .map(|m| HistoryEntry {
                    role: m.role.clone(),
                    content: match &m.content {
                        V2Content::Text(text) => text.clone(),
                        V2Content::Blocks(blocks) => blocks
                            .iter()
                            .filter_map(|b| b.text.as_deref())
                            .collect::<Vec<_>>()
                            .join("\n"),
                    },
                })
                .collect(),
            ..RequestContext::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: Value) -> Result<ParsedMessage, ProtocolError> {
        V2Adapter.parse(&serde_json::to_vec(&raw).unwrap())
    }

    #[test]
    fn test_tool_use_block_maps_to_tool_call() {
        let message = parse(serde_json::json!({
            "model": "claude-sonnet",
            "max_tokens": 1024,
            "messages": [
                {"role": "assistant", "content": [
                    {"type": "text", "text": "Let me search."},
                    {"type": "tool_use", "name": "web_search", "input": {"q": "rust"}}
                ]}
            ]
        }))
        .unwrap();

        let intent = V2Adapter.normalize(&message).unwrap();
        assert_eq!(intent.category, IntentCategory::ToolCall);
        assert_eq!(intent.action, "web_search");
        assert_eq!(intent.confidence, 1.0);
        assert_eq!(intent.parameters.get("q"), Some(&serde_json::json!("rust")));
    }

    #[test]
    fn test_string_content_is_conversation() {
        let message = parse(serde_json::json!({
            "model": "claude-sonnet",
            "max_tokens": 256,
            "messages": [{"role": "user", "content": "hello"}]
        }))
        .unwrap();

        let intent = V2Adapter.normalize(&message).unwrap();
        assert_eq!(intent.category, IntentCategory::Conversation);
        assert_eq!(intent.confidence, 0.70);
    }

    #[test]
    fn test_alternatives_seeded_by_tools_and_system() {
        let message = parse(serde_json::json!({
            "model": "claude-sonnet",
            "max_tokens": 256,
            "system": "You are a code reviewer.",
            "tools": [{"name": "grep"}],
            "messages": [{"role": "user", "content": "review this"}]
        }))
        .unwrap();

        let intent = V2Adapter.normalize(&message).unwrap();
        assert_eq!(intent.alternatives.len(), 2);
        assert_eq!(intent.alternatives[0].action, "tool_call");
        assert_eq!(intent.alternatives[1].action, "follow_instructions");
    }

    #[test]
    fn test_missing_max_tokens_is_rejected() {
        let err = parse(serde_json::json!({
            "model": "claude-sonnet",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap_err();
        assert_eq!(err.code(), "MISSING_MAX_TOKENS");
    }

    #[test]
    fn test_tool_use_without_name_fails_normalization() {
        let message = parse(serde_json::json!({
            "model": "claude-sonnet",
            "max_tokens": 64,
            "messages": [
                {"role": "assistant", "content": [
                    {"type": "tool_use", "input": {"q": "x"}}
                ]}
            ]
        }))
        .unwrap();

        let err = V2Adapter.normalize(&message).unwrap_err();
        assert_eq!(err.code(), "MISSING_TOOL_NAME");
    }

    #[test]
    fn test_context_flattens_blocks_to_text() {
        let message = parse(serde_json::json!({
            "model": "claude-sonnet",
            "max_tokens": 64,
            "messages": [
                {"role": "user", "content": [
                    {"type": "text", "text": "part one"},
                    {"type": "text", "text": "part two"}
                ]}
            ]
        }))
        .unwrap();

        let context = V2Adapter.context(&message);
        assert_eq!(context.history[0].content, "part one\npart two");
    }
}
