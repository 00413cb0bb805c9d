//! Shared value types for the gateway pipeline.
//!
//! Everything downstream of the protocol adapters speaks these types:
//! a [`NormalizedRequest`] flows adapter -> router -> sandbox runtime,
//! and a [`RoutingDecision`] carries the router's verdict.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::embedding::Embedding;
use crate::error::ProtocolError;

/// Generate a fresh id for requests, intents, sandboxes and audit entries.
pub fn new_id() -> Uuid {
    Uuid::new_v4()
}

/// The six wire formats the gateway accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolTag {
    Mcp,
    A2a,
    Ucp,
    Acp,
    V1,
    V2,
}

impl ProtocolTag {
    /// All tags in fixed registration order (detection probes in this order).
    pub const ALL: [ProtocolTag; 6] = [
        ProtocolTag::Mcp,
        ProtocolTag::A2a,
        ProtocolTag::Ucp,
        ProtocolTag::Acp,
        ProtocolTag::V1,
        ProtocolTag::V2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolTag::Mcp => "mcp",
            ProtocolTag::A2a => "a2a",
            ProtocolTag::Ucp => "ucp",
            ProtocolTag::Acp => "acp",
            ProtocolTag::V1 => "v1",
            ProtocolTag::V2 => "v2",
        }
    }
}

impl std::fmt::Display for ProtocolTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolTag {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mcp" => Ok(ProtocolTag::Mcp),
            "a2a" => Ok(ProtocolTag::A2a),
            "ucp" => Ok(ProtocolTag::Ucp),
            "acp" => Ok(ProtocolTag::Acp),
            "v1" => Ok(ProtocolTag::V1),
            "v2" => Ok(ProtocolTag::V2),
            other => Err(ProtocolError::UnsupportedProtocol {
                tag: other.to_string(),
            }),
        }
    }
}

/// Closed set of intent categories produced by normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    ToolCall,
    InformationRequest,
    ActionExecution,
    DataRetrieval,
    CodeGeneration,
    Analysis,
    Conversation,
    Escalation,
}

impl IntentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentCategory::ToolCall => "tool_call",
            IntentCategory::InformationRequest => "information_request",
            IntentCategory::ActionExecution => "action_execution",
            IntentCategory::DataRetrieval => "data_retrieval",
            IntentCategory::CodeGeneration => "code_generation",
            IntentCategory::Analysis => "analysis",
            IntentCategory::Conversation => "conversation",
            IntentCategory::Escalation => "escalation",
        }
    }
}

impl std::fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lower-confidence interpretation the adapter also considered.
///
/// Alternatives are data, not control flow; they ride along ordered by
/// non-increasing confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentAlternative {
    pub action: String,
    pub confidence: f64,
    pub reason: String,
}

/// The post-normalization intent shared by every downstream component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedIntent {
    pub id: Uuid,
    pub category: IntentCategory,
    pub action: String,
    pub target: String,
    /// Opaque dynamic parameters, preserved as-is from the source payload.
    pub parameters: serde_json::Map<String, Value>,
    /// Classification confidence in [0, 1].
    pub confidence: f64,
    /// Ordered by non-increasing confidence.
    pub alternatives: Vec<IntentAlternative>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
}

impl NormalizedIntent {
    pub fn new(category: IntentCategory, action: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            category,
            action: action.into(),
            target: String::new(),
            parameters: serde_json::Map::new(),
            confidence: 0.0,
            alternatives: Vec::new(),
            embedding: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Append an alternative, keeping the list ordered by confidence.
    pub fn push_alternative(
        &mut self,
        action: impl Into<String>,
        confidence: f64,
        reason: impl Into<String>,
    ) {
        self.alternatives.push(IntentAlternative {
            action: action.into(),
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
        });
        self.alternatives
            .sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
    }
}

/// One prior exchange carried in the request context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

/// Session-scoped context attached to a normalized request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub available_tools: Vec<String>,
    #[serde(default)]
    pub constraints: serde_json::Map<String, Value>,
    #[serde(default)]
    pub preferences: serde_json::Map<String, Value>,
}

/// Request priority, highest last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// How much audit detail this request should generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Minimal,
    #[default]
    Standard,
    Verbose,
}

/// Processing metadata attached to a normalized request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub priority: RequestPriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_budget: Option<f64>,
    pub require_human_approval: bool,
    pub audit_level: AuditLevel,
    pub trace_id: Uuid,
}

impl RequestMetadata {
    pub fn with_trace(trace_id: Uuid) -> Self {
        Self {
            priority: RequestPriority::Normal,
            max_latency_ms: None,
            max_budget: None,
            require_human_approval: false,
            audit_level: AuditLevel::Standard,
            trace_id,
        }
    }
}

/// The internal request shape every adapter reduces its protocol to.
///
/// Never mutated after construction by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedRequest {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub protocol: ProtocolTag,
    /// The original payload, kept opaque for audit snapshots.
    pub raw_payload: Value,
    pub raw_size: usize,
    pub intent: NormalizedIntent,
    pub context: RequestContext,
    pub metadata: RequestMetadata,
}

/// A tool the router can select. Catalog entries are immutable for the
/// lifetime of a routing call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub protocol: ProtocolTag,
    #[serde(default)]
    pub parameter_schema: Value,
    #[serde(default)]
    pub return_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_estimate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_estimate_ms: Option<u64>,
    #[serde(default)]
    pub required_credentials: Vec<String>,
}

impl ToolDefinition {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: description.into(),
            protocol: ProtocolTag::Mcp,
            parameter_schema: Value::Null,
            return_schema: Value::Null,
            cost_estimate: None,
            latency_estimate_ms: None,
            required_credentials: Vec::new(),
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost_estimate = Some(cost);
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_estimate_ms = Some(latency_ms);
        self
    }

    pub fn with_credentials(mut self, ids: Vec<String>) -> Self {
        self.required_credentials = ids;
        self
    }
}

/// The router's verdict for one request.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub request_id: Uuid,
    pub tool: ToolDefinition,
    /// Adjusted confidence in [0, 1].
    pub confidence: f64,
    pub reasoning: String,
    /// Strictly lower-scored candidates, best first.
    pub fallbacks: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
    pub requires_approval: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_tag_round_trip() {
        for tag in ProtocolTag::ALL {
            let parsed: ProtocolTag = tag.as_str().parse().unwrap();
            assert_eq!(parsed, tag);
        }
    }

    #[test]
    fn test_protocol_tag_unknown_is_unsupported() {
        let err = "grpc".parse::<ProtocolTag>().unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_PROTOCOL");
    }

    #[test]
    fn test_alternatives_stay_ordered() {
        let mut intent = NormalizedIntent::new(IntentCategory::Conversation, "chat");
        intent.push_alternative("help", 0.2, "no explicit method");
        intent.push_alternative("tool_call", 0.5, "tools offered");
        intent.push_alternative("analysis", 0.3, "low temperature");

        let confidences: Vec<f64> = intent.alternatives.iter().map(|a| a.confidence).collect();
        assert_eq!(confidences, vec![0.5, 0.3, 0.2]);
    }

    #[test]
    fn test_confidence_clamped() {
        let intent = NormalizedIntent::new(IntentCategory::ToolCall, "search").with_confidence(1.7);
        assert_eq!(intent.confidence, 1.0);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(RequestPriority::Critical > RequestPriority::Normal);
        assert!(RequestPriority::Normal > RequestPriority::Low);
    }
}
