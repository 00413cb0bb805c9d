//! UCP (unified context protocol) adapter.

use std::time::Instant;

use serde_json::Value;

use crate::error::ProtocolError;
use crate::protocol::{
    ParsedMessage, ParsedPayload, ProtocolAdapter, as_object, parse_json, require_str,
};
use crate::types::{IntentCategory, NormalizedIntent, ProtocolTag, RequestContext};

/// A validated UCP operation.
#[derive(Debug, Clone)]
pub struct UcpRequest {
    pub context_id: String,
    pub operation: String,
    pub payload: serde_json::Map<String, Value>,
}

pub struct UcpAdapter;

impl ProtocolAdapter for UcpAdapter {
    fn protocol(&self) -> ProtocolTag {
        ProtocolTag::Ucp
    }

    fn parse(&self, raw: &[u8]) -> Result<ParsedMessage, ProtocolError> {
        let start = Instant::now();
        let value = parse_json(raw)?;
        let obj = as_object(&value, ProtocolTag::Ucp)?;

        let context_id = require_str(obj, "context_id", "MISSING_CONTEXT_ID")?.to_string();
        let operation = require_str(obj, "operation", "MISSING_OPERATION")?.to_string();
        let payload = obj
            .get("payload")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Ok(ParsedMessage {
            protocol: ProtocolTag::Ucp,
            raw_size: raw.len(),
            parse_time: start.elapsed(),
            payload: ParsedPayload::Ucp(UcpRequest {
                context_id,
                operation,
                payload,
            }),
            raw: value,
        })
    }

    fn normalize(&self, message: &ParsedMessage) -> Result<NormalizedIntent, ProtocolError> {
        let ParsedPayload::Ucp(request) = &message.payload else {
            return Err(ProtocolError::normalize(
                "WRONG_PAYLOAD",
                "expected a UCP payload",
            ));
        };

        let (category, confidence) = match request.operation.as_str() {
            "read" => (IntentCategory::DataRetrieval, 0.95),
            "write" | "update" | "delete" => (IntentCategory::ActionExecution, 0.95),
            "query" | "search" => (IntentCategory::InformationRequest, 0.95),
            "analyze" => (IntentCategory::Analysis, 0.95),
            "generate" => (IntentCategory::CodeGeneration, 0.95),
            _ => (IntentCategory::Conversation, 0.70),
        };

        let target = request
            .payload
            .get("target")
            .and_then(Value::as_str)
            .unwrap_or("context");

        Ok(NormalizedIntent::new(category, &request.operation)
            .with_target(target)
            .with_parameters(request.payload.clone())
            .with_confidence(confidence))
    }

    fn context(&self, message: &ParsedMessage) -> RequestContext {
        let ParsedPayload::Ucp(request) = &message.payload else {
            return RequestContext::default();
        };
        RequestContext {
            session_id: Some(request.context_id.clone()),
            ..RequestContext::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: Value) -> Result<ParsedMessage, ProtocolError> {
        UcpAdapter.parse(&serde_json::to_vec(&raw).unwrap())
    }

    fn normalize_op(operation: &str) -> NormalizedIntent {
        let message = parse(serde_json::json!({
            "context_id": "ctx-1",
            "operation": operation,
            "payload": {"target": "dataset"}
        }))
        .unwrap();
        UcpAdapter.normalize(&message).unwrap()
    }

    #[test]
    fn test_operation_category_table() {
        let cases = [
            ("read", IntentCategory::DataRetrieval),
            ("write", IntentCategory::ActionExecution),
            ("update", IntentCategory::ActionExecution),
            ("delete", IntentCategory::ActionExecution),
            ("query", IntentCategory::InformationRequest),
            ("search", IntentCategory::InformationRequest),
            ("analyze", IntentCategory::Analysis),
            ("generate", IntentCategory::CodeGeneration),
        ];
        for (op, expected) in cases {
            let intent = normalize_op(op);
            assert_eq!(intent.category, expected, "operation {op}");
            assert_eq!(intent.confidence, 0.95, "operation {op}");
            assert_eq!(intent.action, op);
        }
    }

    #[test]
    fn test_unknown_operation_falls_back() {
        let intent = normalize_op("subscribe");
        assert_eq!(intent.category, IntentCategory::Conversation);
        assert_eq!(intent.confidence, 0.70);
    }

    #[test]
    fn test_missing_context_id_is_rejected() {
        let err = parse(serde_json::json!({"operation": "read"})).unwrap_err();
        assert_eq!(err.code(), "MISSING_CONTEXT_ID");
    }

    #[test]
    fn test_missing_operation_is_rejected() {
        let err = parse(serde_json::json!({"context_id": "ctx-1"})).unwrap_err();
        assert_eq!(err.code(), "MISSING_OPERATION");
    }

    #[test]
    fn test_context_carries_context_id_as_session() {
        let message = parse(serde_json::json!({
            "context_id": "ctx-9",
            "operation": "read"
        }))
        .unwrap();
        let context = UcpAdapter.context(&message);
        assert_eq!(context.session_id.as_deref(), Some("ctx-9"));
    }
}
