//! Tool execution against the sandbox pool.
//!
//! `execute` amortizes cold starts through the pool: a ready instance is
//! reused when one exists, otherwise a fresh sandbox is created
//! synchronously and its creation time reported as the cold start. A
//! background maintenance loop reaps idle instances and warms the pool
//! back to its floor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::driver::SandboxDriver;
use super::instance::{NetworkPolicy, Sandbox, SandboxSpec, SandboxState};
use super::pool::{PoolStats, ReleaseOutcome, SandboxPool};
use super::{ExecutionFailure, ExecutionMetrics, ExecutionResult};
use crate::config::SandboxConfig;
use crate::error::SandboxError;
use crate::types::ToolDefinition;

/// Cold starts above this are worth a warning.
const COLD_START_WARN_MS: u64 = 500;

pub struct SandboxRuntime {
    driver: Arc<dyn SandboxDriver>,
    pool: Arc<SandboxPool>,
    config: SandboxConfig,
}

impl SandboxRuntime {
    pub fn new(driver: Arc<dyn SandboxDriver>, config: SandboxConfig) -> Self {
        let pool = Arc::new(SandboxPool::new(config.max_instances));
        Self {
            driver,
            pool,
            config,
        }
    }

    /// Execute with the configured default timeout.
    pub async fn execute(
        &self,
        tool: &ToolDefinition,
        args: Value,
    ) -> Result<ExecutionResult, SandboxError> {
        self.execute_with_timeout(
            tool,
            args,
            Duration::from_millis(self.config.execution_timeout_ms),
        )
        .await
    }

    /// Execute a tool in an isolated sandbox.
    ///
    /// Execution-level failures (tool crash, timeout, failed creation)
    /// come back as an unsuccessful [`ExecutionResult`] carrying metrics;
    /// `Err` is reserved for admission failures on a saturated pool.
    pub async fn execute_with_timeout(
        &self,
        tool: &ToolDefinition,
        args: Value,
        timeout: Duration,
    ) -> Result<ExecutionResult, SandboxError> {
        let total_start = Instant::now();

        let (mut sandbox, cold_start_ms) = match self.pool.acquire().await {
            Some(sandbox) => (sandbox, 0),
            None => {
                if !self.pool.can_create().await {
                    return Err(SandboxError::PoolExhausted {
                        max: self.pool.max_instances(),
                    });
                }
                match self.create_for_tool(tool, timeout).await {
                    Ok((sandbox, cold_start_ms)) => (sandbox, cold_start_ms),
                    Err((failure, cold_start_ms)) => {
                        return Ok(ExecutionResult::failed(
                            failure,
                            ExecutionMetrics {
                                cold_start_ms,
                                exec_ms: 0,
                                total_ms: total_start.elapsed().as_millis() as u64,
                                memory_peak_mb: 0,
                                cpu_percent: 0.0,
                            },
                        ));
                    }
                }
            }
        };

        let exec_start = Instant::now();
        let run_result = tokio::time::timeout(
            timeout,
            self.driver.run(sandbox.handle, tool, &args, timeout),
        )
        .await;
        let exec_ms = exec_start.elapsed().as_millis() as u64;

        let metrics = |memory_peak_mb: u64, cpu_percent: f64| ExecutionMetrics {
            cold_start_ms,
            exec_ms,
            total_ms: total_start.elapsed().as_millis() as u64,
            memory_peak_mb,
            cpu_percent,
        };

        match run_result {
            Err(_) => {
                // A timed-out sandbox may still be wedged on the tool;
                // never return it to the pool.
                self.destroy(sandbox).await;
                tracing::warn!(
                    tool = %tool.id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Tool execution timed out"
                );
                Ok(ExecutionResult::failed(
                    ExecutionFailure {
                        code: "TIMEOUT".to_string(),
                        message: format!("tool '{}' exceeded {timeout:?}", tool.id),
                        stdout: None,
                        stderr: None,
                        exit_code: None,
                    },
                    metrics(0, 0.0),
                ))
            }
            Ok(Err(error)) => {
                self.destroy(sandbox).await;
                tracing::debug!(tool = %tool.id, %error, "Tool execution failed");
                let (code, message) = match &error {
                    SandboxError::Execution { code, message } => (code.clone(), message.clone()),
                    other => ("EXECUTION_ERROR".to_string(), other.to_string()),
                };
                Ok(ExecutionResult::failed(
                    ExecutionFailure {
                        code,
                        message,
                        stdout: None,
                        stderr: None,
                        exit_code: None,
                    },
                    metrics(0, 0.0),
                ))
            }
            Ok(Ok(output)) => {
                sandbox
                    .transition(SandboxState::Ready)
                    .map_err(|e| {
                        tracing::error!(sandbox = %sandbox.id, "State bug on return: {e}");
                        e
                    })?;
                sandbox.touch();
                if let ReleaseOutcome::Evicted(oldest) = self.pool.release(sandbox).await {
                    self.destroy(oldest).await;
                }
                Ok(ExecutionResult {
                    success: true,
                    output: Some(output.output),
                    error: None,
                    metrics: metrics(output.memory_peak_mb, output.cpu_percent),
                })
            }
        }
    }

    /// Synchronously create a tool-specific sandbox. The reported cold
    /// start covers creation only; execution time is metered separately.
    async fn create_for_tool(
        &self,
        tool: &ToolDefinition,
        timeout: Duration,
    ) -> Result<(Sandbox, u64), (ExecutionFailure, u64)> {
        let spec = SandboxSpec::for_tool(&tool.id, NetworkPolicy::Full, timeout);
        let create_start = Instant::now();

        let handle = match self.driver.create(&spec).await {
            Ok(handle) => handle,
            Err(error) => {
                let cold_start_ms = create_start.elapsed().as_millis() as u64;
                tracing::warn!(tool = %tool.id, %error, "Sandbox creation failed");
                return Err((
                    ExecutionFailure {
                        code: "SANDBOX_CREATE_FAILED".to_string(),
                        message: error.to_string(),
                        stdout: None,
                        stderr: None,
                        exit_code: None,
                    },
                    cold_start_ms,
                ));
            }
        };

        let cold_start_ms = create_start.elapsed().as_millis() as u64;
        self.pool.record_created(cold_start_ms).await;
        if cold_start_ms > COLD_START_WARN_MS {
            tracing::warn!(
                tool = %tool.id,
                cold_start_ms,
                "Cold start exceeded budget"
            );
        }

        let mut sandbox = Sandbox::new(spec, handle);
        // Creating -> Ready -> Running mirrors the pooled path.
        sandbox
            .transition(SandboxState::Ready)
            .and_then(|_| sandbox.transition(SandboxState::Running))
            .map_err(|e| {
                (
                    ExecutionFailure {
                        code: "ILLEGAL_STATE".to_string(),
                        message: e.to_string(),
                        stdout: None,
                        stderr: None,
                        exit_code: None,
                    },
                    cold_start_ms,
                )
            })?;
        Ok((sandbox, cold_start_ms))
    }

    async fn destroy(&self, mut sandbox: Sandbox) {
        if let Err(e) = sandbox.transition(SandboxState::Destroyed) {
            tracing::error!(sandbox = %sandbox.id, "State bug on destroy: {e}");
        }
        self.driver.destroy(sandbox.handle).await;
        self.pool.record_destroyed(1).await;
    }

    /// One maintenance pass: reap idle instances, then warm to the floor.
    /// Exposed so tests can tick maintenance deterministically.
    pub async fn run_maintenance(&self) {
        let idle_timeout = Duration::from_millis(self.config.idle_timeout_ms);
        let reaped = self.pool.take_idle(idle_timeout).await;
        let reaped_count = reaped.len();
        for sandbox in reaped {
            self.destroy(sandbox).await;
        }
        if reaped_count > 0 {
            tracing::debug!(reaped = reaped_count, "Reaped idle sandboxes");
        }

        let deficit = self.pool.warm_deficit(self.config.min_instances).await;
        for _ in 0..deficit {
            if !self.pool.can_create().await {
                break;
            }
            let spec = SandboxSpec::warm_generic();
            let create_start = Instant::now();
            match self.driver.create(&spec).await {
                Ok(handle) => {
                    self.pool
                        .record_created(create_start.elapsed().as_millis() as u64)
                        .await;
                    let mut sandbox = Sandbox::new(spec, handle);
                    if sandbox.transition(SandboxState::Ready).is_ok() {
                        if let ReleaseOutcome::Evicted(oldest) = self.pool.release(sandbox).await {
                            self.destroy(oldest).await;
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(%error, "Warm sandbox creation failed");
                    break;
                }
            }
        }
    }

    /// Spawn the periodic maintenance task. The returned handle must be
    /// stopped to end the loop.
    pub fn start_maintenance(self: &Arc<Self>) -> MaintenanceHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let runtime = Arc::clone(self);
        let period = Duration::from_millis(self.config.warmup_interval_ms);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick fires immediately; skip it so the loop waits
            // a full period before its first pass.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => runtime.run_maintenance().await,
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
        MaintenanceHandle { stop_tx, task }
    }

    pub async fn stats(&self) -> PoolStats {
        self.pool.stats().await
    }
}

/// Stop contract for the maintenance loop.
pub struct MaintenanceHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
    }
}
