//! ACP (agent communication protocol) adapter.

use std::time::Instant;

use serde_json::Value;

use crate::error::ProtocolError;
use crate::protocol::{ParsedMessage, ParsedPayload, ProtocolAdapter, as_object, parse_json};
use crate::types::{IntentCategory, NormalizedIntent, ProtocolTag};

/// A validated ACP message: header envelope plus body.
#[derive(Debug, Clone)]
pub struct AcpMessage {
    pub header: serde_json::Map<String, Value>,
    pub body: serde_json::Map<String, Value>,
}

impl AcpMessage {
    pub fn message_type(&self) -> Option<&str> {
        self.header.get("message_type").and_then(Value::as_str)
    }
}

pub struct AcpAdapter;

impl ProtocolAdapter for AcpAdapter {
    fn protocol(&self) -> ProtocolTag {
        ProtocolTag::Acp
    }

    fn parse(&self, raw: &[u8]) -> Result<ParsedMessage, ProtocolError> {
        let start = Instant::now();
        let value = parse_json(raw)?;
        let obj = as_object(&value, ProtocolTag::Acp)?;

        let header = obj
            .get("header")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| {
                ProtocolError::parse("MISSING_HEADER", "'header' must be an object")
            })?;
        let body = obj
            .get("body")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| ProtocolError::parse("MISSING_BODY", "'body' must be an object"))?;

        Ok(ParsedMessage {
            protocol: ProtocolTag::Acp,
            raw_size: raw.len(),
            parse_time: start.elapsed(),
            payload: ParsedPayload::Acp(AcpMessage { header, body }),
            raw: value,
        })
    }

    fn normalize(&self, message: &ParsedMessage) -> Result<NormalizedIntent, ProtocolError> {
        let ParsedPayload::Acp(acp) = &message.payload else {
            return Err(ProtocolError::normalize(
                "WRONG_PAYLOAD",
                "expected an ACP payload",
            ));
        };

        let target = acp
            .header
            .get("target")
            .and_then(Value::as_str)
            .unwrap_or("acp");

        let intent = match acp.message_type() {
            Some("command") => {
                let action = acp
                    .body
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("execute_command");
                NormalizedIntent::new(IntentCategory::ActionExecution, action)
                    .with_target(target)
                    .with_parameters(acp.body.clone())
                    .with_confidence(0.90)
            }
            Some("query") => NormalizedIntent::new(IntentCategory::InformationRequest, "query")
                .with_target(target)
                .with_parameters(acp.body.clone())
                .with_confidence(0.90),
            _ => NormalizedIntent::new(IntentCategory::Conversation, "converse")
                .with_target(target)
                .with_parameters(acp.body.clone())
                .with_confidence(0.70),
        };

        Ok(intent)
    }
}
