//! MCP (JSON-RPC 2.0) adapter.

use std::time::Instant;

use serde_json::Value;

use crate::error::ProtocolError;
use crate::protocol::{ParsedMessage, ParsedPayload, ProtocolAdapter, as_object, parse_json};
use crate::types::{IntentCategory, NormalizedIntent, ProtocolTag};

/// A validated MCP request.
#[derive(Debug, Clone)]
pub struct McpRequest {
    pub id: Option<Value>,
    pub method: String,
    pub params: serde_json::Map<String, Value>,
}

pub struct McpAdapter;

impl ProtocolAdapter for McpAdapter {
    fn protocol(&self) -> ProtocolTag {
        ProtocolTag::Mcp
    }

    fn parse(&self, raw: &[u8]) -> Result<ParsedMessage, ProtocolError> {
        let start = Instant::now();
        let value = parse_json(raw)?;
        let obj = as_object(&value, ProtocolTag::Mcp)?;

        let version = obj
            .get("jsonrpc")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::parse("MISSING_JSONRPC", "'jsonrpc' is required"))?;
        if version != "2.0" {
            return Err(ProtocolError::parse(
                "INVALID_JSONRPC_VERSION",
                format!("expected jsonrpc \"2.0\", got \"{version}\""),
            ));
        }

        let method = obj
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::parse("MISSING_METHOD", "'method' is required"))?
            .to_string();

        let params = obj
            .get("params")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Ok(ParsedMessage {
            protocol: ProtocolTag::Mcp,
            raw_size: raw.len(),
            parse_time: start.elapsed(),
            payload: ParsedPayload::Mcp(McpRequest {
                id: obj.get("id").cloned(),
                method,
                params,
            }),
            raw: value,
        })
    }

    fn normalize(&self, message: &ParsedMessage) -> Result<NormalizedIntent, ProtocolError> {
        let ParsedPayload::Mcp(request) = &message.payload else {
            return Err(ProtocolError::normalize(
                "WRONG_PAYLOAD",
                "expected an MCP payload",
            ));
        };

        let intent = match request.method.as_str() {
            "tools/call" => {
                let name = request
                    .params
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        ProtocolError::normalize(
                            "MISSING_TOOL_NAME",
                            "tools/call requires params.name",
                        )
                    })?;
                let arguments = request
                    .params
                    .get("arguments")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                NormalizedIntent::new(IntentCategory::ToolCall, name)
                    .with_target("tool")
                    .with_parameters(arguments)
                    .with_confidence(1.0)
            }
            "resources/read" => {
                let uri = request
                    .params
                    .get("uri")
                    .and_then(Value::as_str)
                    .unwrap_or("resource");
                NormalizedIntent::new(IntentCategory::DataRetrieval, "read_resource")
                    .with_target(uri)
                    .with_parameters(request.params.clone())
                    .with_confidence(0.95)
            }
            "prompts/get" => {
                let name = request
                    .params
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("prompt");
                NormalizedIntent::new(IntentCategory::InformationRequest, "get_prompt")
                    .with_target(name)
                    .with_parameters(request.params.clone())
                    .with_confidence(0.95)
            }
            other => {
                let mut intent = NormalizedIntent::new(IntentCategory::Conversation, other)
                    .with_target("assistant")
                    .with_parameters(request.params.clone())
                    .with_confidence(0.70);
                intent.push_alternative("help", 0.2, "method has no explicit mapping");
                intent
            }
        };

        Ok(intent)
    }
}
