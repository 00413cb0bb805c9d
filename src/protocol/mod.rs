//! Protocol normalization layer.
//!
//! Six adapters turn protocol-tagged opaque payloads into the one internal
//! request shape. Each adapter exposes the same two operations: `parse`
//! validates the protocol's mandatory fields and yields a typed payload;
//! `normalize` reduces a successful parse to a [`NormalizedIntent`].
//! Neither panics; failures are discriminated results that the dispatcher
//! converts into typed errors at the boundary.

mod a2a;
mod acp;
mod mcp;
mod ucp;
mod v1;
mod v2;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

pub use a2a::{A2aAdapter, A2aMessage};
pub use acp::{AcpAdapter, AcpMessage};
pub use mcp::{McpAdapter, McpRequest};
pub use ucp::{UcpAdapter, UcpRequest};
pub use v1::{V1Adapter, V1ChatRequest};
pub use v2::{V2Adapter, V2ChatRequest};

use crate::config::AdapterConfig;
use crate::error::ProtocolError;
use crate::types::{
    NormalizedIntent, NormalizedRequest, ProtocolTag, RequestContext, RequestMetadata, new_id,
};

/// Typed output of a successful parse, one variant per protocol.
#[derive(Debug, Clone)]
pub enum ParsedPayload {
    Mcp(McpRequest),
    A2a(A2aMessage),
    Ucp(UcpRequest),
    Acp(AcpMessage),
    V1(V1ChatRequest),
    V2(V2ChatRequest),
}

/// A validated payload plus parse metadata.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub protocol: ProtocolTag,
    /// Size of the raw payload in bytes.
    pub raw_size: usize,
    /// Monotonic parse duration.
    pub parse_time: Duration,
    /// The payload as parsed JSON, kept for audit snapshots.
    pub raw: Value,
    pub payload: ParsedPayload,
}

/// The shared contract every protocol adapter implements.
pub trait ProtocolAdapter: Send + Sync {
    fn protocol(&self) -> ProtocolTag;

    /// Validate mandatory fields and produce a typed payload.
    fn parse(&self, raw: &[u8]) -> Result<ParsedMessage, ProtocolError>;

    /// Reduce a successful parse to a normalized intent.
    fn normalize(&self, message: &ParsedMessage) -> Result<NormalizedIntent, ProtocolError>;

    /// Protocol-specific request context (session, user, history).
    fn context(&self, _message: &ParsedMessage) -> RequestContext {
        RequestContext::default()
    }
}

/// Parse raw bytes as JSON, the first mandatory step of every adapter.
pub(crate) fn parse_json(raw: &[u8]) -> Result<Value, ProtocolError> {
    serde_json::from_slice(raw).map_err(|e| ProtocolError::parse("INVALID_JSON", e.to_string()))
}

/// Interpret a JSON value as the protocol's top-level object.
pub(crate) fn as_object<'a>(
    value: &'a Value,
    protocol: ProtocolTag,
) -> Result<&'a serde_json::Map<String, Value>, ProtocolError> {
    value.as_object().ok_or_else(|| {
        ProtocolError::parse(
            "INVALID_JSON",
            format!("{protocol} payload must be a JSON object"),
        )
    })
}

/// Require a string field, with a stable per-field error code.
pub(crate) fn require_str<'a>(
    obj: &'a serde_json::Map<String, Value>,
    field: &str,
    code: &'static str,
) -> Result<&'a str, ProtocolError> {
    obj.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::parse(code, format!("'{field}' must be a string")))
}

/// Selects an adapter by tag and yields normalized requests.
///
/// Holds the six adapters in fixed registration order; detection probes
/// them in that order and returns the first tag whose parse succeeds.
pub struct AdapterDispatcher {
    adapters: Vec<Arc<dyn ProtocolAdapter>>,
    config: AdapterConfig,
}

impl AdapterDispatcher {
    pub fn new(config: AdapterConfig) -> Self {
        let adapters: Vec<Arc<dyn ProtocolAdapter>> = vec![
            Arc::new(McpAdapter),
            Arc::new(A2aAdapter),
            Arc::new(UcpAdapter),
            Arc::new(AcpAdapter),
            Arc::new(V1Adapter),
            Arc::new(V2Adapter),
        ];
        Self { adapters, config }
    }

    fn adapter_for(&self, tag: ProtocolTag) -> &Arc<dyn ProtocolAdapter> {
        // Registration covers every tag; the expect documents the invariant.
        self.adapters
            .iter()
            .find(|a| a.protocol() == tag)
            .unwrap_or_else(|| unreachable!("adapter registered for every tag"))
    }

    /// Probe each adapter's parse in fixed order; first success wins.
    pub fn detect(&self, raw: &[u8]) -> Option<ProtocolTag> {
        if raw.len() > self.config.max_payload_bytes {
            return None;
        }
        self.adapters
            .iter()
            .find(|adapter| adapter.parse(raw).is_ok())
            .map(|adapter| adapter.protocol())
    }

    /// Convert a tagged payload into a normalized request.
    pub fn convert(
        &self,
        raw: &[u8],
        tag: ProtocolTag,
        trace_id: Option<Uuid>,
    ) -> Result<NormalizedRequest, ProtocolError> {
        if raw.len() > self.config.max_payload_bytes {
            return Err(ProtocolError::PayloadTooLarge {
                size: raw.len(),
                max: self.config.max_payload_bytes,
            });
        }

        let adapter = self.adapter_for(tag);

        let message = adapter.parse(raw)?;

        let normalize_start = Instant::now();
        let intent = adapter.normalize(&message)?;
        let normalize_time = normalize_start.elapsed();

        let total = message.parse_time + normalize_time;
        if total > Duration::from_millis(self.config.budget_ms) {
            tracing::warn!(
                protocol = %tag,
                parse_us = message.parse_time.as_micros() as u64,
                normalize_us = normalize_time.as_micros() as u64,
                budget_ms = self.config.budget_ms,
                "Adapter overhead exceeded budget"
            );
        }

        let context = adapter.context(&message);
        let trace_id = trace_id.unwrap_or_else(new_id);

        tracing::debug!(
            protocol = %tag,
            category = %intent.category,
            action = %intent.action,
            confidence = intent.confidence,
            %trace_id,
            "Request normalized"
        );

        Ok(NormalizedRequest {
            id: new_id(),
            created_at: Utc::now(),
            protocol: tag,
            raw_payload: message.raw,
            raw_size: message.raw_size,
            intent,
            context,
            metadata: RequestMetadata::with_trace(trace_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IntentCategory;

    fn dispatcher() -> AdapterDispatcher {
        AdapterDispatcher::new(AdapterConfig::default())
    }

    #[test]
    fn test_detect_mcp() {
        let raw = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": "search", "arguments": {"q": "hi"}}
        });
        let raw = serde_json::to_vec(&raw).unwrap();
        assert_eq!(dispatcher().detect(&raw), Some(ProtocolTag::Mcp));
    }

    #[test]
    fn test_detect_rejects_garbage() {
        assert_eq!(dispatcher().detect(b"not json at all"), None);
        assert_eq!(dispatcher().detect(b"{\"unrelated\": true}"), None);
    }

    #[test]
    fn test_detect_respects_registration_order() {
        // An Anthropic-style payload also satisfies the v1 mandatory
        // fields (model + messages), and v1 registers first.
        let raw = serde_json::json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": 512
        });
        let raw = serde_json::to_vec(&raw).unwrap();
        assert_eq!(dispatcher().detect(&raw), Some(ProtocolTag::V1));
    }

    #[test]
    fn test_convert_oversized_payload() {
        let dispatcher = AdapterDispatcher::new(AdapterConfig {
            max_payload_bytes: 64,
            budget_ms: 5,
        });
        let raw = vec![b'x'; 128];
        let err = dispatcher
            .convert(&raw, ProtocolTag::Mcp, None)
            .unwrap_err();
        assert_eq!(err.code(), "PAYLOAD_TOO_LARGE");
    }

    #[test]
    fn test_convert_mcp_tool_call_end_to_end() {
        let raw = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": "search", "arguments": {"q": "hi"}}
        });
        let raw = serde_json::to_vec(&raw).unwrap();

        let request = dispatcher()
            .convert(&raw, ProtocolTag::Mcp, None)
            .unwrap();

        assert_eq!(request.protocol, ProtocolTag::Mcp);
        assert_eq!(request.intent.category, IntentCategory::ToolCall);
        assert_eq!(request.intent.action, "search");
        assert_eq!(request.intent.target, "tool");
        assert_eq!(request.intent.confidence, 1.0);
        assert_eq!(
            request.intent.parameters.get("q"),
            Some(&serde_json::json!("hi"))
        );
        assert_eq!(request.raw_size, raw.len());
    }

    #[test]
    fn test_convert_carries_provided_trace_id() {
        let trace = new_id();
        let raw = serde_json::to_vec(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "ping"
        }))
        .unwrap();

        let request = dispatcher()
            .convert(&raw, ProtocolTag::Mcp, Some(trace))
            .unwrap();
        assert_eq!(request.metadata.trace_id, trace);
    }
}
