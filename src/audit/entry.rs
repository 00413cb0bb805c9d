//! Append-only audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::new_id;

/// The eleven consequential event kinds the pipeline records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    RequestReceived,
    IntentClassified,
    RoutingCompleted,
    ToolExecuted,
    ToolFailed,
    SandboxCreated,
    SandboxDestroyed,
    HumanApprovalRequested,
    HumanApprovalResolved,
    CredentialAccessed,
    SecurityAlert,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::RequestReceived => "request_received",
            AuditEventType::IntentClassified => "intent_classified",
            AuditEventType::RoutingCompleted => "routing_completed",
            AuditEventType::ToolExecuted => "tool_executed",
            AuditEventType::ToolFailed => "tool_failed",
            AuditEventType::SandboxCreated => "sandbox_created",
            AuditEventType::SandboxDestroyed => "sandbox_destroyed",
            AuditEventType::HumanApprovalRequested => "human_approval_requested",
            AuditEventType::HumanApprovalResolved => "human_approval_resolved",
            AuditEventType::CredentialAccessed => "credential_accessed",
            AuditEventType::SecurityAlert => "security_alert",
        }
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for AuditSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditSeverity::Info => "info",
            AuditSeverity::Warning => "warning",
            AuditSeverity::Error => "error",
            AuditSeverity::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approved,
    Rejected,
    Modified,
}

/// A reviewer's verdict on an entry. Attached at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanReview {
    pub reviewer_id: String,
    pub decision: ReviewDecision,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifications: Option<Value>,
}

/// One consequential event in the pipeline. Entries are append-only; the
/// only field that ever changes after construction is the one-shot human
/// review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub trace_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub actor: String,
    pub action: String,
    pub target: String,
    #[serde(default)]
    pub details: serde_json::Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    human_review: Option<HumanReview>,
}

impl AuditEntry {
    pub fn new(
        event_type: AuditEventType,
        severity: AuditSeverity,
        actor: impl Into<String>,
        action: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            timestamp: Utc::now(),
            trace_id: new_id(),
            request_id: None,
            event_type,
            severity,
            actor: actor.into(),
            action: action.into(),
            target: target.into(),
            details: serde_json::Map::new(),
            before: None,
            after: None,
            human_review: None,
        }
    }

    pub fn with_trace(mut self, trace_id: Uuid) -> Self {
        self.trace_id = trace_id;
        self
    }

    pub fn with_request(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    pub fn with_snapshots(mut self, before: Value, after: Value) -> Self {
        self.before = Some(before);
        self.after = Some(after);
        self
    }

    pub fn human_review(&self) -> Option<&HumanReview> {
        self.human_review.as_ref()
    }

    /// Attach the one-shot human review. Returns false when a review is
    /// already present; the existing review is never replaced.
    pub fn attach_review(&mut self, review: HumanReview) -> bool {
        if self.human_review.is_some() {
            return false;
        }
        self.human_review = Some(review);
        true
    }
}
