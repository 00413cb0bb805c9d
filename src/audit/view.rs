//! Human-optimized projections of audit entries.
//!
//! A view is built to be understood in five seconds or less: a title, a
//! one-line what/who/when summary, an impact grade, and the actions a
//! reviewer can take. Batch views compress a whole trace into one card.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::entry::{AuditEntry, AuditEventType, AuditSeverity, ReviewDecision};
use crate::embedding::canonical_json;

/// Seconds a reviewer should need to understand a view.
pub const COMPREHENSION_TARGET_SEC: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewStatus {
    Pending,
    Approved,
    Rejected,
    Modified,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViewAction {
    ViewDetails,
    Approve,
    Reject,
    Modify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// One key that differs between the before and after snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct Change {
    pub key: String,
    pub kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewSummary {
    pub what: String,
    pub who: String,
    pub when: String,
    pub impact: ImpactLevel,
    pub status: ViewStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewContext {
    pub trace_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub related_events: usize,
    pub has_human_review: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
    pub changes: Vec<Change>,
    pub context: ViewContext,
    pub related_entries: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewMetadata {
    pub created_at: DateTime<Utc>,
    pub comprehension_target_sec: u32,
    pub estimated_read_time_sec: u32,
    pub complexity: Complexity,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditView {
    pub title: String,
    pub summary: ViewSummary,
    pub details: Option<ViewDetails>,
    pub actions: Vec<ViewAction>,
    pub metadata: ViewMetadata,
}

/// Build the compact view of one entry. `related` holds the other
/// entries sharing the trace, used for context counts only.
pub fn build_view(entry: &AuditEntry, related: &[&AuditEntry]) -> AuditView {
    let title = title_for(entry);
    let what = what_for(entry);
    let impact = impact_for(entry);
    let status = status_for(entry);
    let detail_size = detail_size(entry);

    let word_count = title.split_whitespace().count()
        + what.split_whitespace().count()
        + entry.actor.split_whitespace().count();
    let estimated_read_time_sec = read_time_sec(word_count, detail_size);

    let mut actions = vec![ViewAction::ViewDetails];
    if entry.event_type == AuditEventType::HumanApprovalRequested && entry.human_review().is_none()
    {
        actions.extend([ViewAction::Approve, ViewAction::Reject, ViewAction::Modify]);
    }

    AuditView {
        title,
        summary: ViewSummary {
            what,
            who: entry.actor.clone(),
            when: relative_time(entry.timestamp, Utc::now()),
            impact,
            status,
        },
        details: Some(ViewDetails {
            before: entry.before.clone(),
            after: entry.after.clone(),
            changes: detect_changes(entry.before.as_ref(), entry.after.as_ref()),
            context: ViewContext {
                trace_id: entry.trace_id,
                request_id: entry.request_id,
                event_type: entry.event_type,
                severity: entry.severity,
                timestamp: entry.timestamp,
                actor: entry.actor.clone(),
                related_events: related.len(),
                has_human_review: entry.human_review().is_some(),
            },
            related_entries: related.iter().map(|e| e.id).collect(),
        }),
        actions,
        metadata: ViewMetadata {
            created_at: Utc::now(),
            comprehension_target_sec: COMPREHENSION_TARGET_SEC,
            estimated_read_time_sec,
            complexity: complexity_for(entry, detail_size),
        },
    }
}

/// Compress entries sharing one trace into a single card. Returns `None`
/// below two entries.
pub fn build_batch_view(entries: &[&AuditEntry]) -> Option<AuditView> {
    if entries.len() < 2 {
        return None;
    }
    let trace_id = entries[0].trace_id;
    debug_assert!(entries.iter().all(|e| e.trace_id == trace_id));

    let impact = entries
        .iter()
        .map(|e| impact_for(e))
        .max()
        .unwrap_or(ImpactLevel::Low);

    let pending = entries.iter().any(|e| {
        e.event_type == AuditEventType::HumanApprovalRequested && e.human_review().is_none()
    });
    let rejected = entries.iter().any(|e| {
        e.human_review()
            .is_some_and(|r| r.decision == ReviewDecision::Rejected)
    });
    let status = if pending {
        ViewStatus::Pending
    } else if rejected {
        ViewStatus::Rejected
    } else {
        ViewStatus::Approved
    };

    let newest = entries
        .iter()
        .map(|e| e.timestamp)
        .max()
        .unwrap_or_else(Utc::now);

    Some(AuditView {
        title: format!("Batch: {} events", entries.len()),
        summary: ViewSummary {
            what: format!("{} events in one trace", entries.len()),
            who: entries[0].actor.clone(),
            when: relative_time(newest, Utc::now()),
            impact,
            status,
        },
        details: Some(ViewDetails {
            before: None,
            after: None,
            changes: Vec::new(),
            context: ViewContext {
                trace_id,
                request_id: entries[0].request_id,
                event_type: entries[0].event_type,
                severity: entries
                    .iter()
                    .map(|e| e.severity)
                    .max()
                    .unwrap_or(AuditSeverity::Info),
                timestamp: newest,
                actor: entries[0].actor.clone(),
                related_events: entries.len(),
                has_human_review: entries.iter().any(|e| e.human_review().is_some()),
            },
            related_entries: entries.iter().map(|e| e.id).collect(),
        }),
        actions: vec![ViewAction::ViewDetails],
        metadata: ViewMetadata {
            created_at: Utc::now(),
            comprehension_target_sec: COMPREHENSION_TARGET_SEC,
            estimated_read_time_sec: (entries.len() as u32 * 2).min(30),
            complexity: if entries.len() > 10 {
                Complexity::Complex
            } else {
                Complexity::Moderate
            },
        },
    })
}

fn title_for(entry: &AuditEntry) -> String {
    match entry.event_type {
        AuditEventType::ToolExecuted => {
            let tool = entry
                .details
                .get("tool")
                .and_then(Value::as_str)
                .unwrap_or(&entry.target);
            format!("Tool Executed: {tool}")
        }
        AuditEventType::HumanApprovalRequested => "Approval Required".to_string(),
        AuditEventType::SecurityAlert => "Security Alert".to_string(),
        other => other
            .as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" "),
    }
}

fn what_for(entry: &AuditEntry) -> String {
    let detail_str = |key: &str| {
        entry
            .details
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    match entry.event_type {
        AuditEventType::RequestReceived => format!(
            "Received {} request",
            detail_str("protocol").unwrap_or_else(|| "a".to_string())
        ),
        AuditEventType::IntentClassified => format!(
            "Classified intent as {}",
            detail_str("category").unwrap_or_else(|| entry.action.clone())
        ),
        AuditEventType::RoutingCompleted => format!("Routed to {}", entry.target),
        AuditEventType::ToolExecuted => match entry.details.get("duration_ms") {
            Some(Value::Number(ms)) => format!("Executed {} in {}ms", entry.target, ms),
            _ => format!("Executed {}", entry.target),
        },
        AuditEventType::ToolFailed => format!(
            "{} failed: {}",
            entry.target,
            detail_str("code").unwrap_or_else(|| "error".to_string())
        ),
        AuditEventType::SandboxCreated => format!("Created sandbox for {}", entry.target),
        AuditEventType::SandboxDestroyed => format!("Destroyed sandbox for {}", entry.target),
        AuditEventType::HumanApprovalRequested => format!(
            "Approval requested for {}: {}",
            entry.target,
            detail_str("reason").unwrap_or_else(|| entry.action.clone())
        ),
        AuditEventType::HumanApprovalResolved => format!("Approval resolved for {}", entry.target),
        AuditEventType::CredentialAccessed => format!("Credential resolved for {}", entry.target),
        AuditEventType::SecurityAlert => {
            detail_str("message").unwrap_or_else(|| entry.action.clone())
        }
    }
}

/// First match wins.
fn impact_for(entry: &AuditEntry) -> ImpactLevel {
    match entry.event_type {
        AuditEventType::SecurityAlert => ImpactLevel::Critical,
        AuditEventType::ToolFailed if entry.severity == AuditSeverity::Error => ImpactLevel::High,
        AuditEventType::HumanApprovalRequested => ImpactLevel::High,
        _ if entry.severity == AuditSeverity::Error => ImpactLevel::High,
        AuditEventType::ToolExecuted => ImpactLevel::Medium,
        AuditEventType::IntentClassified => ImpactLevel::Medium,
        _ => ImpactLevel::Low,
    }
}

fn status_for(entry: &AuditEntry) -> ViewStatus {
    match entry.human_review() {
        Some(review) => match review.decision {
            ReviewDecision::Approved => ViewStatus::Approved,
            ReviewDecision::Rejected => ViewStatus::Rejected,
            ReviewDecision::Modified => ViewStatus::Modified,
        },
        None if entry.event_type == AuditEventType::HumanApprovalRequested => ViewStatus::Pending,
        None => ViewStatus::Complete,
    }
}

/// Bytes of serialized detail payload: details plus both snapshots.
fn detail_size(entry: &AuditEntry) -> usize {
    let mut size = canonical_json(&Value::Object(entry.details.clone())).len();
    if let Some(before) = &entry.before {
        size += canonical_json(before).len();
    }
    if let Some(after) = &entry.after {
        size += canonical_json(after).len();
    }
    size
}

fn read_time_sec(word_count: usize, detail_size: usize) -> u32 {
    (word_count as f64 / 3.3 + detail_size as f64 / 100.0 * 0.5).ceil() as u32
}

fn complexity_for(entry: &AuditEntry, detail_size: usize) -> Complexity {
    match entry.event_type {
        AuditEventType::RequestReceived => Complexity::Simple,
        AuditEventType::SecurityAlert => Complexity::Complex,
        _ if detail_size > 5000 => Complexity::Complex,
        _ if detail_size > 1000 => Complexity::Moderate,
        _ => Complexity::Simple,
    }
}

/// "just now", "Nm ago", "Nh ago", or the date.
pub fn relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(timestamp);
    let seconds = elapsed.num_seconds();
    if seconds < 60 {
        "just now".to_string()
    } else if seconds < 3600 {
        format!("{}m ago", seconds / 60)
    } else if seconds < 86_400 {
        format!("{}h ago", seconds / 3600)
    } else {
        timestamp.format("%Y-%m-%d").to_string()
    }
}

/// Key-wise diff of two object snapshots: added, removed, and modified
/// keys, compared by canonical JSON.
pub fn detect_changes(before: Option<&Value>, after: Option<&Value>) -> Vec<Change> {
    let empty = serde_json::Map::new();
    let before_map = before.and_then(Value::as_object).unwrap_or(&empty);
    let after_map = after.and_then(Value::as_object).unwrap_or(&empty);

    let mut changes = Vec::new();
    for (key, after_value) in after_map {
        match before_map.get(key) {
            None => changes.push(Change {
                key: key.clone(),
                kind: ChangeKind::Added,
                before: None,
                after: Some(after_value.clone()),
            }),
            Some(before_value) => {
                if canonical_json(before_value) != canonical_json(after_value) {
                    changes.push(Change {
                        key: key.clone(),
                        kind: ChangeKind::Modified,
                        before: Some(before_value.clone()),
                        after: Some(after_value.clone()),
                    });
                }
            }
        }
    }
    for (key, before_value) in before_map {
        if !after_map.contains_key(key) {
            changes.push(Change {
                key: key.clone(),
                kind: ChangeKind::Removed,
                before: Some(before_value.clone()),
                after: None,
            });
        }
    }
    changes
}

/// Running figures on generated views against the comprehension target.
#[derive(Debug, Default)]
pub struct ViewTelemetry {
    generated: AtomicU64,
    read_time_total_sec: AtomicU64,
    over_target: AtomicU64,
}

impl ViewTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, view: &AuditView) {
        self.generated.fetch_add(1, Ordering::Relaxed);
        self.read_time_total_sec
            .fetch_add(view.metadata.estimated_read_time_sec as u64, Ordering::Relaxed);
        if view.metadata.estimated_read_time_sec > view.metadata.comprehension_target_sec {
            self.over_target.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn generated(&self) -> u64 {
        self.generated.load(Ordering::Relaxed)
    }

    pub fn over_target(&self) -> u64 {
        self.over_target.load(Ordering::Relaxed)
    }

    pub fn average_read_time_sec(&self) -> f64 {
        let generated = self.generated.load(Ordering::Relaxed);
        if generated == 0 {
            return 0.0;
        }
        self.read_time_total_sec.load(Ordering::Relaxed) as f64 / generated as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::entry::HumanReview;
    use chrono::Duration;

    fn entry(event_type: AuditEventType, severity: AuditSeverity) -> AuditEntry {
        AuditEntry::new(event_type, severity, "alice", "act", "web_search")
    }

    #[test]
    fn test_approval_view_scenario() {
        let mut e = entry(
            AuditEventType::HumanApprovalRequested,
            AuditSeverity::Warning,
        );
        e.timestamp = Utc::now() - Duration::seconds(30);

        let view = build_view(&e, &[]);

        assert_eq!(view.title, "Approval Required");
        assert_eq!(view.summary.impact, ImpactLevel::High);
        assert_eq!(view.summary.when, "just now");
        assert_eq!(view.summary.status, ViewStatus::Pending);
        assert_eq!(
            view.actions,
            vec![
                ViewAction::ViewDetails,
                ViewAction::Approve,
                ViewAction::Reject,
                ViewAction::Modify
            ]
        );
    }

    #[test]
    fn test_reviewed_approval_loses_action_buttons() {
        let mut e = entry(
            AuditEventType::HumanApprovalRequested,
            AuditSeverity::Warning,
        );
        e.attach_review(HumanReview {
            reviewer_id: "bob".to_string(),
            decision: ReviewDecision::Approved,
            timestamp: Utc::now(),
            comments: None,
            modifications: None,
        });

        let view = build_view(&e, &[]);
        assert_eq!(view.actions, vec![ViewAction::ViewDetails]);
        assert_eq!(view.summary.status, ViewStatus::Approved);
    }

    #[test]
    fn test_impact_precedence() {
        let cases = [
            (
                AuditEventType::SecurityAlert,
                AuditSeverity::Info,
                ImpactLevel::Critical,
            ),
            (
                AuditEventType::ToolFailed,
                AuditSeverity::Error,
                ImpactLevel::High,
            ),
            (
                AuditEventType::HumanApprovalRequested,
                AuditSeverity::Info,
                ImpactLevel::High,
            ),
            (
                AuditEventType::SandboxCreated,
                AuditSeverity::Error,
                ImpactLevel::High,
            ),
            (
                AuditEventType::ToolExecuted,
                AuditSeverity::Info,
                ImpactLevel::Medium,
            ),
            (
                AuditEventType::IntentClassified,
                AuditSeverity::Info,
                ImpactLevel::Medium,
            ),
            (
                AuditEventType::RequestReceived,
                AuditSeverity::Info,
                ImpactLevel::Low,
            ),
        ];
        for (event_type, severity, expected) in cases {
            assert_eq!(
                impact_for(&entry(event_type, severity)),
                expected,
                "{event_type}"
            );
        }
    }

    #[test]
    fn test_relative_time_buckets() {
        let now = Utc::now();
        assert_eq!(relative_time(now - Duration::seconds(10), now), "just now");
        assert_eq!(relative_time(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(relative_time(now - Duration::hours(3), now), "3h ago");
        let old = now - Duration::days(3);
        assert_eq!(relative_time(old, now), old.format("%Y-%m-%d").to_string());
    }

    #[test]
    fn test_change_detection() {
        let before = serde_json::json!({"kept": 1, "changed": "a", "dropped": true});
        let after = serde_json::json!({"kept": 1, "changed": "b", "added": [1, 2]});

        let changes = detect_changes(Some(&before), Some(&after));

        let find = |key: &str| changes.iter().find(|c| c.key == key).unwrap();
        assert_eq!(find("added").kind, ChangeKind::Added);
        assert_eq!(find("dropped").kind, ChangeKind::Removed);
        assert_eq!(find("changed").kind, ChangeKind::Modified);
        assert!(!changes.iter().any(|c| c.key == "kept"));
    }

    #[test]
    fn test_read_time_formula() {
        // 10 words, no details: ceil(3.03) = 4
        assert_eq!(read_time_sec(10, 0), 4);
        // 0 words, 1000 bytes: ceil(5.0) = 5
        assert_eq!(read_time_sec(0, 1000), 5);
    }

    #[test]
    fn test_complexity_rules() {
        let simple = entry(AuditEventType::ToolExecuted, AuditSeverity::Info);
        assert_eq!(complexity_for(&simple, 100), Complexity::Simple);
        assert_eq!(complexity_for(&simple, 2000), Complexity::Moderate);
        assert_eq!(complexity_for(&simple, 6000), Complexity::Complex);

        let request = entry(AuditEventType::RequestReceived, AuditSeverity::Info);
        assert_eq!(complexity_for(&request, 9000), Complexity::Simple);

        let alert = entry(AuditEventType::SecurityAlert, AuditSeverity::Info);
        assert_eq!(complexity_for(&alert, 10), Complexity::Complex);
    }

    #[test]
    fn test_batch_view_status_precedence() {
        let trace = crate::types::new_id();
        let mut approved = entry(
            AuditEventType::HumanApprovalRequested,
            AuditSeverity::Warning,
        );
        approved = approved.with_trace(trace);
        approved.attach_review(HumanReview {
            reviewer_id: "bob".to_string(),
            decision: ReviewDecision::Approved,
            timestamp: Utc::now(),
            comments: None,
            modifications: None,
        });
        let executed = entry(AuditEventType::ToolExecuted, AuditSeverity::Info).with_trace(trace);

        let view = build_batch_view(&[&approved, &executed]).unwrap();
        assert_eq!(view.title, "Batch: 2 events");
        assert_eq!(view.summary.status, ViewStatus::Approved);
        assert_eq!(view.summary.impact, ImpactLevel::High);
        assert_eq!(view.metadata.estimated_read_time_sec, 4);

        // A pending approval flips the whole batch to pending.
        let pending = entry(
            AuditEventType::HumanApprovalRequested,
            AuditSeverity::Warning,
        )
        .with_trace(trace);
        let view = build_batch_view(&[&approved, &executed, &pending]).unwrap();
        assert_eq!(view.summary.status, ViewStatus::Pending);
    }

    #[test]
    fn test_batch_view_read_time_caps_at_30() {
        let trace = crate::types::new_id();
        let entries: Vec<AuditEntry> = (0..20)
            .map(|_| entry(AuditEventType::ToolExecuted, AuditSeverity::Info).with_trace(trace))
            .collect();
        let refs: Vec<&AuditEntry> = entries.iter().collect();

        let view = build_batch_view(&refs).unwrap();
        assert_eq!(view.metadata.estimated_read_time_sec, 30);
    }

    #[test]
    fn test_batch_view_needs_two_entries() {
        let single = entry(AuditEventType::ToolExecuted, AuditSeverity::Info);
        assert!(build_batch_view(&[&single]).is_none());
    }

    #[test]
    fn test_telemetry_average() {
        let telemetry = ViewTelemetry::new();
        let short = build_view(
            &entry(AuditEventType::ToolExecuted, AuditSeverity::Info),
            &[],
        );
        telemetry.record(&short);
        telemetry.record(&short);

        assert_eq!(telemetry.generated(), 2);
        assert!(telemetry.average_read_time_sec() > 0.0);
    }
}
