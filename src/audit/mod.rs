//! Audit records, compact human views, and the buffered fan-out stream.

mod entry;
mod stream;
mod view;

pub use entry::{AuditEntry, AuditEventType, AuditSeverity, HumanReview, ReviewDecision};
pub use stream::{
    AuditFilter, AuditSink, AuditStream, FlushHandle, MemorySink, SubscriptionHandle,
};
pub use view::{
    AuditView, COMPREHENSION_TARGET_SEC, Change, ChangeKind, Complexity, ImpactLevel, ViewAction,
    ViewContext, ViewDetails, ViewMetadata, ViewStatus, ViewSummary, ViewTelemetry,
    build_batch_view, build_view, detect_changes, relative_time,
};
