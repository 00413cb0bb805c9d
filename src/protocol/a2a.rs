//! A2A (agent-to-agent) adapter.

use std::time::Instant;

use serde_json::Value;

use crate::error::ProtocolError;
use crate::protocol::{ParsedMessage, ParsedPayload, ProtocolAdapter, as_object, parse_json};
use crate::types::{IntentCategory, NormalizedIntent, ProtocolTag, RequestContext};

/// A validated A2A envelope.
#[derive(Debug, Clone)]
pub struct A2aMessage {
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub task: Option<serde_json::Map<String, Value>>,
    pub message: Option<serde_json::Map<String, Value>>,
}

pub struct A2aAdapter;

impl ProtocolAdapter for A2aAdapter {
    fn protocol(&self) -> ProtocolTag {
        ProtocolTag::A2a
    }

    fn parse(&self, raw: &[u8]) -> Result<ParsedMessage, ProtocolError> {
        let start = Instant::now();
        let value = parse_json(raw)?;
        let obj = as_object(&value, ProtocolTag::A2a)?;

        // Envelope ids may be strings or numbers on the wire.
        let id = match obj.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(ProtocolError::parse("MISSING_ID", "'id' is required")),
        };

        let sender = obj
            .get("sender")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::parse("MISSING_SENDER", "'sender' is required"))?
            .to_string();

        let recipient = obj
            .get("recipient")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::parse("MISSING_RECIPIENT", "'recipient' is required"))?
            .to_string();

        Ok(ParsedMessage {
            protocol: ProtocolTag::A2a,
            raw_size: raw.len(),
            parse_time: start.elapsed(),
            payload: ParsedPayload::A2a(A2aMessage {
                id,
                sender,
                recipient,
                task: obj.get("task").and_then(Value::as_object).cloned(),
                message: obj.get("message").and_then(Value::as_object).cloned(),
            }),
            raw: value,
        })
    }

    fn normalize(&self, message: &ParsedMessage) -> Result<NormalizedIntent, ProtocolError> {
        let ParsedPayload::A2a(envelope) = &message.payload else {
            return Err(ProtocolError::normalize(
                "WRONG_PAYLOAD",
                "expected an A2A payload",
            ));
        };

        if let Some(task) = &envelope.task {
            let action = task
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("execute_task");
            return Ok(NormalizedIntent::new(IntentCategory::ActionExecution, action)
                .with_target(&envelope.recipient)
                .with_parameters(task.clone())
                .with_confidence(0.90));
        }

        if let Some(msg) = &envelope.message {
            let is_request = msg.get("type").and_then(Value::as_str) == Some("request");
            let (category, action, confidence) = if is_request {
                (IntentCategory::InformationRequest, "handle_request", 0.90)
            } else {
                (IntentCategory::Conversation, "converse", 0.70)
            };
            return Ok(NormalizedIntent::new(category, action)
                .with_target(&envelope.recipient)
                .with_parameters(msg.clone())
                .with_confidence(confidence));
        }

        let mut intent = NormalizedIntent::new(IntentCategory::Conversation, "converse")
            .with_target(&envelope.recipient)
            .with_confidence(0.70);
        intent.push_alternative("a2a_discovery", 0.3, "envelope carries no task or message");
        Ok(intent)
    }

    fn context(&self, message: &ParsedMessage) -> RequestContext {
        let ParsedPayload::A2a(envelope) = &message.payload else {
            return RequestContext::default();
        };
        RequestContext {
            user_id: Some(envelope.sender.clone()),
            ..RequestContext::default()
        }
    }
}
