//! V1 chat-completion adapter (OpenAI-style payloads).
//!
//! Tool invocations ride on assistant messages as `tool_calls`, with the
//! function arguments JSON-encoded inside a string.

use std::time::Instant;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ProtocolError;
use crate::protocol::{ParsedMessage, ParsedPayload, ProtocolAdapter, as_object, parse_json};
use crate::types::{HistoryEntry, IntentCategory, NormalizedIntent, ProtocolTag, RequestContext};

/// A validated V1 chat request.
#[derive(Debug, Clone)]
pub struct V1ChatRequest {
    pub model: String,
    pub messages: Vec<V1Message>,
    pub tools: Vec<Value>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct V1Message {
    pub role: String,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub tool_calls: Vec<V1ToolCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct V1ToolCall {
    #[serde(default)]
    pub id: Option<String>,
    pub function: V1Function,
}

#[derive(Debug, Clone, Deserialize)]
pub struct V1Function {
    pub name: String,
    /// JSON-encoded argument object, per the wire format.
    #[serde(default)]
    pub arguments: Value,
}

pub struct V1Adapter;

impl ProtocolAdapter for V1Adapter {
    fn protocol(&self) -> ProtocolTag {
        ProtocolTag::V1
    }

    fn parse(&self, raw: &[u8]) -> Result<ParsedMessage, ProtocolError> {
        let start = Instant::now();
        let value = parse_json(raw)?;
        let obj = as_object(&value, ProtocolTag::V1)?;

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

        let messages: Vec<V1Message> =
            serde_json::from_value(Value::Array(messages_value.clone()))
                .map_err(|e| ProtocolError::parse("INVALID_MESSAGES", e.to_string()))?;

        Ok(ParsedMessage {
            protocol: ProtocolTag::V1,
            raw_size: raw.len(),
            parse_time: start.elapsed(),
            payload: ParsedPayload::V1(V1ChatRequest {
                model,
                messages,
                tools: obj
                    .get("tools")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default(),
                temperature: obj.get("temperature").and_then(Value::as_f64),
            }),
            raw: value,
        })
    }

    fn normalize(&self, message: &ParsedMessage) -> Result<NormalizedIntent, ProtocolError> {
        let ParsedPayload::V1(request) = &message.payload else {
            return Err(ProtocolError::normalize(
                "WRONG_PAYLOAD",
                "expected a V1 payload",
            ));
        };

        // The most recent assistant tool call wins.
        let tool_call = request
            .messages
            .iter()
            .rev()
            .filter(|m| m.role == "assistant")
            .flat_map(|m| m.tool_calls.first())
            .next();

        if let Some(call) = tool_call {
            let parameters = decode_arguments(&call.function.arguments);
            return Ok(NormalizedIntent::new(IntentCategory::ToolCall, &call.function.name)
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
        if let Some(temperature) = request.temperature
            && temperature <= 0.3
        {
            intent.push_alternative(
                "analysis",
                0.3,
                format!("temperature {temperature} suggests a deterministic task"),
            );
        }
        Ok(intent)
    }

    fn context(&self, message: &ParsedMessage) -> RequestContext {
        let ParsedPayload::V1(request) = &message.payload else {
            return RequestContext::default();
        };
        RequestContext {
            history: request
                .messages
                .iter()
                .map(|m| HistoryEntry {
                    role: m.role.clone(),
                    content: m
                        .content
                        .as_ref()
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                })
                .collect(),
            ..RequestContext::default()
        }
    }
}

/// Arguments arrive either as a JSON-encoded string or as a plain object.
fn decode_arguments(arguments: &Value) -> serde_json::Map<String, Value> {
    match arguments {
        Value::String(s) => serde_json::from_str::<Value>(s)
            .ok()
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_else(|| {
                let mut map = serde_json::Map::new();
                map.insert("raw".to_string(), Value::String(s.clone()));
                map
            }),
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: Value) -> Result<ParsedMessage, ProtocolError> {
        V1Adapter.parse(&serde_json::to_vec(&raw).unwrap())
    }

    #[test]
    fn test_assistant_tool_call_wins() {
        let message = parse(serde_json::json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "user", "content": "look this up"},
                {"role": "assistant", "tool_calls": [
                    {"id": "call_1", "function": {
                        "name": "web_search",
                        "arguments": "{\"q\": \"rust\"}"
                    }}
                ]}
            ]
        }))
        .unwrap();

        let intent = V1Adapter.normalize(&message).unwrap();
        assert_eq!(intent.category, IntentCategory::ToolCall);
        assert_eq!(intent.action, "web_search");
        assert_eq!(intent.confidence, 1.0);
        assert_eq!(
            intent.parameters.get("q"),
            Some(&serde_json::json!("rust"))
        );
    }

    #[test]
    fn test_plain_chat_is_conversation() {
        let message = parse(serde_json::json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hello"}]
        }))
        .unwrap();

        let intent = V1Adapter.normalize(&message).unwrap();
        assert_eq!(intent.category, IntentCategory::Conversation);
        assert_eq!(intent.confidence, 0.70);
        assert!(intent.alternatives.is_empty());
    }

    #[test]
    fn test_alternatives_seeded_by_tools_and_temperature() {
        let message = parse(serde_json::json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "check"}],
            "tools": [{"type": "function", "function": {"name": "search"}}],
            "temperature": 0.1
        }))
        .unwrap();

        let intent = V1Adapter.normalize(&message).unwrap();
        assert_eq!(intent.alternatives.len(), 2);
        assert_eq!(intent.alternatives[0].action, "tool_call");
        assert_eq!(intent.alternatives[0].confidence, 0.5);
        assert_eq!(intent.alternatives[1].action, "analysis");
    }

    #[test]
    fn test_missing_model_is_rejected() {
        let err = parse(serde_json::json!({
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap_err();
        assert_eq!(err.code(), "MISSING_MODEL");
    }

    #[test]
    fn test_empty_messages_is_rejected() {
        let err = parse(serde_json::json!({"model": "gpt-4o", "messages": []})).unwrap_err();
        assert_eq!(err.code(), "EMPTY_MESSAGES");
    }

    #[test]
    fn test_malformed_arguments_kept_raw() {
        let message = parse(serde_json::json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "assistant", "tool_calls": [
                    {"function": {"name": "search", "arguments": "not json"}}
                ]}
            ]
        }))
        .unwrap();

        let intent = V1Adapter.normalize(&message).unwrap();
        assert_eq!(
            intent.parameters.get("raw"),
            Some(&serde_json::json!("not json"))
        );
    }

    #[test]
    fn test_context_captures_history() {
        let message = parse(serde_json::json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "user", "content": "first"},
                {"role": "assistant", "content": "second"}
            ]
        }))
        .unwrap();

        let context = V1Adapter.context(&message);
        assert_eq!(context.history.len(), 2);
        assert_eq!(context.history[1].role, "assistant");
        assert_eq!(context.history[1].content, "second");
    }
}
