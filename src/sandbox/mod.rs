//! Sandboxed tool execution.
//!
//! A bounded pool of ready sandboxes amortizes cold starts. Pool state is
//! one critical section; driver work (create, dispatch, destroy) runs
//! outside it. Failed or timed-out sandboxes are destroyed, never reused.

mod driver;
mod instance;
mod pool;
mod runtime;

use serde::Serialize;
use serde_json::Value;

pub use driver::{InMemoryDriver, RunOutput, SandboxDriver};
pub use instance::{NetworkPolicy, Sandbox, SandboxSpec, SandboxState};
pub use pool::{PoolStats, ReleaseOutcome, SandboxPool};
pub use runtime::{MaintenanceHandle, SandboxRuntime};

/// Why an execution failed.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionFailure {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Timing and resource figures for one execution.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ExecutionMetrics {
    /// Sandbox creation time; 0 on a pool hit.
    pub cold_start_ms: u64,
    pub exec_ms: u64,
    pub total_ms: u64,
    pub memory_peak_mb: u64,
    pub cpu_percent: f64,
}

/// Outcome of one tool execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionFailure>,
    pub metrics: ExecutionMetrics,
}

impl ExecutionResult {
    pub fn failed(failure: ExecutionFailure, metrics: ExecutionMetrics) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(failure),
            metrics,
        }
    }
}
