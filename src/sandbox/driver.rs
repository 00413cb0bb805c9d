//! Sandbox driver contract and the in-memory reference driver.
//!
//! The runtime never talks to container primitives directly; everything
//! goes through [`SandboxDriver`] so orchestration backends can be swapped
//! without touching pool or execution logic.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::instance::SandboxSpec;
use crate::error::SandboxError;
use crate::types::{ToolDefinition, new_id};

/// Raw output of one tool run inside a sandbox.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub output: Value,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub exit_code: Option<i32>,
    pub memory_peak_mb: u64,
    pub cpu_percent: f64,
}

/// Pluggable sandbox backend.
#[async_trait]
pub trait SandboxDriver: Send + Sync {
    /// Provision an instance for the spec and return its handle.
    async fn create(&self, spec: &SandboxSpec) -> Result<Uuid, SandboxError>;

    /// Run a tool inside a live instance.
    async fn run(
        &self,
        handle: Uuid,
        tool: &ToolDefinition,
        args: &Value,
        timeout: Duration,
    ) -> Result<RunOutput, SandboxError>;

    /// Tear an instance down. Destroying an unknown handle is a no-op.
    async fn destroy(&self, handle: Uuid);
}

/// In-process driver for tests and the demo binary.
///
/// Echoes the tool invocation back as output. Create and run latency are
/// configurable so cold-start and timeout paths can be exercised; the
/// next run can be scripted to fail.
pub struct InMemoryDriver {
    create_delay: Duration,
    run_delay: Duration,
    live: Mutex<HashSet<Uuid>>,
    fail_next_run: AtomicBool,
}

impl InMemoryDriver {
    pub fn new() -> Self {
        Self {
            create_delay: Duration::ZERO,
            run_delay: Duration::ZERO,
            live: Mutex::new(HashSet::new()),
            fail_next_run: AtomicBool::new(false),
        }
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    pub fn with_run_delay(mut self, delay: Duration) -> Self {
        self.run_delay = delay;
        self
    }

    /// Make the next `run` call fail with an execution error.
    pub fn fail_next_run(&self) {
        self.fail_next_run.store(true, Ordering::SeqCst);
    }

    /// Number of instances currently live in the driver.
    pub async fn live_count(&self) -> usize {
        self.live.lock().await.len()
    }
}

impl Default for InMemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SandboxDriver for InMemoryDriver {
    async fn create(&self, _spec: &SandboxSpec) -> Result<Uuid, SandboxError> {
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        let handle = new_id();
        self.live.lock().await.insert(handle);
        Ok(handle)
    }

    async fn run(
        &self,
        handle: Uuid,
        tool: &ToolDefinition,
        args: &Value,
        _timeout: Duration,
    ) -> Result<RunOutput, SandboxError> {
        if !self.live.lock().await.contains(&handle) {
            return Err(SandboxError::execution(
                "UNKNOWN_HANDLE",
                format!("no live sandbox for handle {handle}"),
            ));
        }
        if self.fail_next_run.swap(false, Ordering::SeqCst) {
            return Err(SandboxError::execution(
                "TOOL_CRASHED",
                format!("tool '{}' crashed", tool.id),
            ));
        }
        if !self.run_delay.is_zero() {
            tokio::time::sleep(self.run_delay).await;
        }
        Ok(RunOutput {
            output: serde_json::json!({
                "tool": tool.id,
                "args": args,
            }),
            stdout: None,
            stderr: None,
            exit_code: Some(0),
            memory_peak_mb: 24,
            cpu_percent: 3.5,
        })
    }

    async fn destroy(&self, handle: Uuid) {
        self.live.lock().await.remove(&handle);
    }
}
