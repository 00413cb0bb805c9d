//! The request pipeline: adapters -> router -> sandbox runtime, with an
//! audit entry at every transition.
//!
//! Low-confidence decisions stop at an approval gate and come back as
//! [`GatewayResponse::PendingApproval`]; a reviewer resumes them through
//! [`Gateway::execute_approved`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditEventType, AuditSeverity, AuditSink, AuditStream};
use crate::config::Config;
use crate::embedding::{EmbeddingProvider, EmbeddingService};
use crate::error::Error;
use crate::protocol::AdapterDispatcher;
use crate::router::IntentRouter;
use crate::sandbox::{ExecutionResult, SandboxDriver, SandboxRuntime};
use crate::secrets::CredentialStore;
use crate::types::{NormalizedRequest, ProtocolTag, RoutingDecision, ToolDefinition};

/// External collaborators injected into the gateway.
pub struct GatewayDeps {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub driver: Arc<dyn SandboxDriver>,
    pub credentials: Arc<dyn CredentialStore>,
    pub sink: Arc<dyn AuditSink>,
}

/// Outcome of one request through the pipeline.
#[derive(Debug)]
pub enum GatewayResponse {
    /// Routed and executed.
    Executed {
        request: NormalizedRequest,
        decision: RoutingDecision,
        result: ExecutionResult,
    },
    /// Routed, but held for a human decision.
    PendingApproval {
        request: NormalizedRequest,
        decision: RoutingDecision,
        reason: String,
    },
}

pub struct Gateway {
    dispatcher: AdapterDispatcher,
    router: IntentRouter,
    runtime: Arc<SandboxRuntime>,
    audit: Arc<AuditStream>,
    credentials: Arc<dyn CredentialStore>,
    catalog: RwLock<Vec<ToolDefinition>>,
    execution_timeout: Duration,
    /// Requests admitted so far; the upstream rate limiter reads this
    /// for backpressure.
    requests_total: AtomicU64,
}

impl Gateway {
    pub fn new(config: Config, deps: GatewayDeps) -> Self {
        let embeddings = Arc::new(EmbeddingService::new(deps.embedder, &config.embeddings));
        let execution_timeout = Duration::from_millis(config.sandbox.execution_timeout_ms);
        Self {
            dispatcher: AdapterDispatcher::new(config.adapters),
            router: IntentRouter::new(embeddings, config.router),
            runtime: Arc::new(SandboxRuntime::new(deps.driver, config.sandbox)),
            audit: Arc::new(AuditStream::new(deps.sink, config.audit)),
            credentials: deps.credentials,
            catalog: RwLock::new(Vec::new()),
            execution_timeout,
            requests_total: AtomicU64::new(0),
        }
    }

    /// Requests admitted into the pipeline since startup.
    pub fn request_count(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub async fn register_tool(&self, tool: ToolDefinition) {
        self.catalog.write().await.push(tool);
    }

    pub async fn catalog(&self) -> Vec<ToolDefinition> {
        self.catalog.read().await.clone()
    }

    /// Probe the registered adapters for a payload's protocol.
    pub fn detect(&self, raw: &[u8]) -> Option<ProtocolTag> {
        self.dispatcher.detect(raw)
    }

    pub fn audit(&self) -> &Arc<AuditStream> {
        &self.audit
    }

    pub fn runtime(&self) -> &Arc<SandboxRuntime> {
        &self.runtime
    }

    /// Run one tagged payload through the full pipeline.
    pub async fn process(
        &self,
        raw: &[u8],
        tag: ProtocolTag,
        trace_id: Option<Uuid>,
    ) -> Result<GatewayResponse, Error> {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        let request = self.dispatcher.convert(raw, tag, trace_id)?;
        let trace = request.metadata.trace_id;

        self.audit
            .write(
                AuditEntry::new(
                    AuditEventType::RequestReceived,
                    AuditSeverity::Info,
                    "gateway",
                    "ingest",
                    tag.as_str(),
                )
                .with_trace(trace)
                .with_request(request.id)
                .with_detail("protocol", Value::String(tag.as_str().to_string()))
                .with_detail("bytes", Value::from(request.raw_size)),
            )
            .await;

        self.audit
            .write(
                AuditEntry::new(
                    AuditEventType::IntentClassified,
                    AuditSeverity::Info,
                    format!("adapter:{tag}"),
                    request.intent.action.clone(),
                    request.intent.category.as_str(),
                )
                .with_trace(trace)
                .with_request(request.id)
                .with_detail(
                    "category",
                    Value::String(request.intent.category.as_str().to_string()),
                )
                .with_detail("confidence", Value::from(request.intent.confidence)),
            )
            .await;

        let catalog = self.catalog.read().await.clone();
        let decision = self.router.route(&request, &catalog).await?;

        self.audit
            .write(
                AuditEntry::new(
                    AuditEventType::RoutingCompleted,
                    AuditSeverity::Info,
                    "router",
                    "route",
                    decision.tool.id.clone(),
                )
                .with_trace(trace)
                .with_request(request.id)
                .with_detail("tool", Value::String(decision.tool.id.clone()))
                .with_detail("confidence", Value::from(decision.confidence))
                .with_detail("fallbacks", Value::from(decision.fallbacks.len())),
            )
            .await;

        if decision.requires_approval {
            let reason = decision
                .approval_reason
                .clone()
                .unwrap_or_else(|| "confidence below approval threshold".to_string());
            self.audit
                .write(
                    AuditEntry::new(
                        AuditEventType::HumanApprovalRequested,
                        AuditSeverity::Warning,
                        "router",
                        "request_approval",
                        decision.tool.id.clone(),
                    )
                    .with_trace(trace)
                    .with_request(request.id)
                    .with_detail("reason", Value::String(reason.clone()))
                    .with_detail("confidence", Value::from(decision.confidence)),
                )
                .await;
            return Ok(GatewayResponse::PendingApproval {
                request,
                decision,
                reason,
            });
        }

        let result = self.run_decision(&request, &decision).await?;
        Ok(GatewayResponse::Executed {
            request,
            decision,
            result,
        })
    }

    /// Resume a pending decision after a reviewer approved it.
    pub async fn execute_approved(
        &self,
        request: &NormalizedRequest,
        decision: &RoutingDecision,
        reviewer: &str,
    ) -> Result<ExecutionResult, Error> {
        self.audit
            .write(
                AuditEntry::new(
                    AuditEventType::HumanApprovalResolved,
                    AuditSeverity::Info,
                    reviewer,
                    "approve",
                    decision.tool.id.clone(),
                )
                .with_trace(request.metadata.trace_id)
                .with_request(request.id),
            )
            .await;
        self.run_decision(request, decision).await
    }

    /// Resolve credentials, execute in the sandbox, and audit the outcome.
    async fn run_decision(
        &self,
        request: &NormalizedRequest,
        decision: &RoutingDecision,
    ) -> Result<ExecutionResult, Error> {
        let trace = request.metadata.trace_id;

        for credential_id in &decision.tool.required_credentials {
            // Resolved secrets go straight to the runtime environment;
            // only the id is ever audited.
            let _secret = self.credentials.resolve(credential_id).await?;
            self.audit
                .write(
                    AuditEntry::new(
                        AuditEventType::CredentialAccessed,
                        AuditSeverity::Info,
                        "credential_store",
                        "resolve",
                        decision.tool.id.clone(),
                    )
                    .with_trace(trace)
                    .with_request(request.id)
                    .with_detail("credential_id", Value::String(credential_id.clone())),
                )
                .await;
        }

        // A per-request latency cap tightens the default deadline, never
        // loosens it.
        let timeout = request
            .metadata
            .max_latency_ms
            .map(Duration::from_millis)
            .map(|requested| requested.min(self.execution_timeout))
            .unwrap_or(self.execution_timeout);

        let args = Value::Object(request.intent.parameters.clone());
        let result = self
            .runtime
            .execute_with_timeout(&decision.tool, args, timeout)
            .await?;

        if result.metrics.cold_start_ms > 0 {
            self.audit
                .write(
                    AuditEntry::new(
                        AuditEventType::SandboxCreated,
                        AuditSeverity::Info,
                        "runtime",
                        "create",
                        decision.tool.id.clone(),
                    )
                    .with_trace(trace)
                    .with_request(request.id)
                    .with_detail("cold_start_ms", Value::from(result.metrics.cold_start_ms)),
                )
                .await;
        }

        if result.success {
            self.audit
                .write(
                    AuditEntry::new(
                        AuditEventType::ToolExecuted,
                        AuditSeverity::Info,
                        "runtime",
                        "execute",
                        decision.tool.id.clone(),
                    )
                    .with_trace(trace)
                    .with_request(request.id)
                    .with_detail("tool", Value::String(decision.tool.id.clone()))
                    .with_detail("duration_ms", Value::from(result.metrics.exec_ms))
                    .with_detail("cold_start_ms", Value::from(result.metrics.cold_start_ms)),
                )
                .await;
        } else {
            let code = result
                .error
                .as_ref()
                .map(|e| e.code.clone())
                .unwrap_or_else(|| "UNKNOWN".to_string());
            self.audit
                .write(
                    AuditEntry::new(
                        AuditEventType::ToolFailed,
                        AuditSeverity::Error,
                        "runtime",
                        "execute",
                        decision.tool.id.clone(),
                    )
                    .with_trace(trace)
                    .with_request(request.id)
                    .with_detail("code", Value::String(code)),
                )
                .await;
            // Failed sandboxes are torn down, never repooled.
            self.audit
                .write(
                    AuditEntry::new(
                        AuditEventType::SandboxDestroyed,
                        AuditSeverity::Info,
                        "runtime",
                        "destroy",
                        decision.tool.id.clone(),
                    )
                    .with_trace(trace)
                    .with_request(request.id),
                )
                .await;
        }

        Ok(result)
    }
}
