//! End-to-end pipeline tests: raw payload in, execution result and audit
//! trail out.

use std::sync::Arc;

use async_trait::async_trait;

use toolgate::audit::{AuditEventType, AuditFilter, MemorySink, ViewAction, build_view};
use toolgate::config::Config;
use toolgate::embedding::EmbeddingProvider;
use toolgate::error::EmbeddingError;
use toolgate::gateway::{Gateway, GatewayDeps, GatewayResponse};
use toolgate::sandbox::InMemoryDriver;
use toolgate::secrets::InMemoryCredentialStore;
use toolgate::types::{IntentCategory, ProtocolTag, ToolDefinition};

/// Keyword-axis embedder: similarity is 1.0 when intent and tool share a
/// vocabulary axis, 0.0 otherwise.
struct KeywordProvider;

#[async_trait]
impl EmbeddingProvider for KeywordProvider {
    fn model(&self) -> &str {
        "keyword-test"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let lower = text.to_lowercase();
        let mut v = vec![0.0f32; 8];
        if ["search", "find", "web", "look"].iter().any(|k| lower.contains(k)) {
            v[0] = 1.0;
        }
        if ["email", "send", "message"].iter().any(|k| lower.contains(k)) {
            v[1] = 1.0;
        }
        if ["deploy", "restart"].iter().any(|k| lower.contains(k)) {
            v[2] = 1.0;
        }
        if v.iter().all(|x| *x == 0.0) {
            v[7] = 1.0;
        }
        Ok(v)
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.embeddings.dimensions = 8;
    config
}

async fn build_gateway() -> Gateway {
    let gateway = Gateway::new(
        test_config(),
        GatewayDeps {
            embedder: Arc::new(KeywordProvider),
            driver: Arc::new(InMemoryDriver::new()),
            credentials: Arc::new(InMemoryCredentialStore::new()),
            sink: Arc::new(MemorySink::new()),
        },
    );
    gateway
        .register_tool(
            ToolDefinition::new("web_search", "search the web")
                .with_cost(2.0)
                .with_latency_ms(300),
        )
        .await;
    gateway
        .register_tool(
            ToolDefinition::new("send_email", "send an email message")
                .with_cost(1.0)
                .with_latency_ms(150),
        )
        .await;
    gateway
}

#[tokio::test]
async fn mcp_tool_call_routes_and_executes() {
    let gateway = build_gateway().await;

    let raw = serde_json::to_vec(&serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {"name": "search the docs", "arguments": {"q": "hi"}}
    }))
    .unwrap();

    assert_eq!(gateway.detect(&raw), Some(ProtocolTag::Mcp));

    let GatewayResponse::Executed {
        request,
        decision,
        result,
    } = gateway.process(&raw, ProtocolTag::Mcp, None).await.unwrap()
    else {
        panic!("expected execution");
    };

    assert_eq!(request.intent.category, IntentCategory::ToolCall);
    assert_eq!(request.intent.confidence, 1.0);
    assert_eq!(decision.tool.id, "web_search");
    assert!(result.success);
    assert_eq!(result.output.as_ref().unwrap()["args"]["q"], "hi");
}

#[tokio::test]
async fn second_request_hits_the_warm_pool() {
    let gateway = build_gateway().await;
    let raw = serde_json::to_vec(&serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {"name": "search again", "arguments": {}}
    }))
    .unwrap();

    let first = gateway.process(&raw, ProtocolTag::Mcp, None).await.unwrap();
    let second = gateway.process(&raw, ProtocolTag::Mcp, None).await.unwrap();

    let (GatewayResponse::Executed { result: first, .. }, GatewayResponse::Executed { result: second, .. }) =
        (first, second)
    else {
        panic!("expected executions");
    };

    assert_eq!(second.metrics.cold_start_ms, 0);
    let stats = gateway.runtime().stats().await;
    assert_eq!(stats.created, 1);
    assert!(stats.hit_rate_ema > 0.0);
    // First call had to create the sandbox.
    assert!(first.success && second.success);
}

#[tokio::test]
async fn v1_and_v2_payloads_normalize_to_the_same_tool() {
    let gateway = build_gateway().await;

    let v1 = serde_json::to_vec(&serde_json::json!({
        "model": "gpt-4o",
        "messages": [
            {"role": "assistant", "tool_calls": [
                {"id": "c1", "function": {"name": "find the web page", "arguments": "{\"q\":\"x\"}"}}
            ]}
        ]
    }))
    .unwrap();

    let v2 = serde_json::to_vec(&serde_json::json!({
        "model": "claude-sonnet",
        "max_tokens": 256,
        "messages": [
            {"role": "assistant", "content": [
                {"type": "tool_use", "name": "find the web page", "input": {"q": "x"}}
            ]}
        ]
    }))
    .unwrap();

    for (raw, tag) in [(v1, ProtocolTag::V1), (v2, ProtocolTag::V2)] {
        let GatewayResponse::Executed { decision, .. } =
            gateway.process(&raw, tag, None).await.unwrap()
        else {
            panic!("expected execution for {tag}");
        };
        assert_eq!(decision.tool.id, "web_search", "{tag}");
    }
}

#[tokio::test]
async fn audit_trail_covers_every_transition() {
    let sink = Arc::new(MemorySink::new());
    let gateway = Gateway::new(
        test_config(),
        GatewayDeps {
            embedder: Arc::new(KeywordProvider),
            driver: Arc::new(InMemoryDriver::new()),
            credentials: Arc::new(InMemoryCredentialStore::new()),
            sink: sink.clone(),
        },
    );
    gateway
        .register_tool(ToolDefinition::new("web_search", "search the web"))
        .await;

    let raw = serde_json::to_vec(&serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {"name": "web lookup", "arguments": {}}
    }))
    .unwrap();

    let GatewayResponse::Executed { request, .. } =
        gateway.process(&raw, ProtocolTag::Mcp, None).await.unwrap()
    else {
        panic!("expected execution");
    };

    let trace = request.metadata.trace_id;
    let trail = gateway.audit().query(&AuditFilter::for_trace(trace)).await;
    let kinds: Vec<AuditEventType> = trail.iter().map(|e| e.event_type).collect();

    for expected in [
        AuditEventType::RequestReceived,
        AuditEventType::IntentClassified,
        AuditEventType::RoutingCompleted,
        AuditEventType::SandboxCreated,
        AuditEventType::ToolExecuted,
    ] {
        assert!(kinds.contains(&expected), "missing {expected}");
    }
    assert!(trail.iter().all(|e| e.trace_id == trace));

    // Flushing hands the batch to the sink and empties the buffer.
    gateway.audit().flush().await;
    assert!(sink.persisted_count().await >= kinds.len());
    assert!(
        gateway
            .audit()
            .query(&AuditFilter::for_trace(trace))
            .await
            .is_empty()
    );
}

#[tokio::test]
async fn a2a_task_flows_to_matching_tool() {
    let gateway = build_gateway().await;

    let raw = serde_json::to_vec(&serde_json::json!({
        "id": "msg-1",
        "sender": "agent-a",
        "recipient": "agent-b",
        "task": {"type": "send the weekly email", "to": "team@example.com"}
    }))
    .unwrap();

    assert_eq!(gateway.detect(&raw), Some(ProtocolTag::A2a));

    let GatewayResponse::Executed { request, decision, .. } =
        gateway.process(&raw, ProtocolTag::A2a, None).await.unwrap()
    else {
        panic!("expected execution");
    };

    assert_eq!(request.intent.category, IntentCategory::ActionExecution);
    assert_eq!(request.context.user_id.as_deref(), Some("agent-a"));
    assert_eq!(decision.tool.id, "send_email");
}

#[tokio::test]
async fn pending_approval_resumes_after_review() {
    // A provider that pins similarity at 0.75: above the (lowered)
    // threshold, below the 0.8 approval bar.
    struct MidProvider;

    #[async_trait]
    impl EmbeddingProvider for MidProvider {
        fn model(&self) -> &str {
            "mid-test"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            if text.starts_with("Action:") {
                Ok(vec![1.0, 0.0])
            } else {
                Ok(vec![0.75, (1.0f32 - 0.75 * 0.75).sqrt()])
            }
        }
    }

    let mut config = test_config();
    config.embeddings.dimensions = 2;
    config.router.similarity_threshold = 0.6;
    config.router.optimize_cost = false;
    config.router.optimize_latency = false;

    let gateway = Gateway::new(
        config,
        GatewayDeps {
            embedder: Arc::new(MidProvider),
            driver: Arc::new(InMemoryDriver::new()),
            credentials: Arc::new(InMemoryCredentialStore::new()),
            sink: Arc::new(MemorySink::new()),
        },
    );
    gateway
        .register_tool(ToolDefinition::new("borderline", "a borderline match"))
        .await;

    let raw = serde_json::to_vec(&serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {"name": "do something", "arguments": {}}
    }))
    .unwrap();

    let GatewayResponse::PendingApproval {
        request,
        decision,
        reason,
    } = gateway.process(&raw, ProtocolTag::Mcp, None).await.unwrap()
    else {
        panic!("expected pending approval");
    };

    assert!(decision.requires_approval);
    assert!(reason.contains("75.0%"));

    // The approval request is on the stream, and its view offers the
    // reviewer actions.
    let pending = gateway
        .audit()
        .query(&AuditFilter {
            event_types: Some(vec![AuditEventType::HumanApprovalRequested]),
            ..AuditFilter::default()
        })
        .await;
    assert_eq!(pending.len(), 1);
    let view = build_view(&pending[0], &[]);
    assert_eq!(view.title, "Approval Required");
    assert!(view.actions.contains(&ViewAction::Approve));
    assert!(view.actions.contains(&ViewAction::Reject));
    assert!(view.actions.contains(&ViewAction::Modify));

    // Reviewer approves; execution proceeds and is audited.
    let result = gateway
        .execute_approved(&request, &decision, "alice")
        .await
        .unwrap();
    assert!(result.success);

    let resolved = gateway
        .audit()
        .query(&AuditFilter {
            event_types: Some(vec![AuditEventType::HumanApprovalResolved]),
            ..AuditFilter::default()
        })
        .await;
    assert_eq!(resolved.len(), 1);
}

#[tokio::test]
async fn malformed_payload_yields_stable_code() {
    let gateway = build_gateway().await;

    let raw = serde_json::to_vec(&serde_json::json!({"jsonrpc": "2.0", "id": 1})).unwrap();
    let err = gateway.process(&raw, ProtocolTag::Mcp, None).await.unwrap_err();
    assert_eq!(err.code(), "MISSING_METHOD");

    let err = gateway
        .process(b"not json", ProtocolTag::Mcp, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_JSON");
}
