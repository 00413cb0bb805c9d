//! Sandbox instances and their lifecycle state machine.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::error::SandboxError;
use crate::types::new_id;

/// Network access granted to a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkPolicy {
    /// No outbound network.
    None,
    /// Only the listed hosts.
    Allowlist(Vec<String>),
    /// Unrestricted.
    Full,
}

/// Resource and isolation parameters for one sandbox.
#[derive(Debug, Clone)]
pub struct SandboxSpec {
    pub image: String,
    pub cpu_cores: f64,
    pub memory_mb: u64,
    pub disk_mb: u64,
    pub network: NetworkPolicy,
    pub allowed_tools: Vec<String>,
    pub timeout: Duration,
    pub env: HashMap<String, String>,
}

impl SandboxSpec {
    /// Spec for a sandbox dedicated to one tool.
    pub fn for_tool(tool_id: &str, network: NetworkPolicy, timeout: Duration) -> Self {
        Self {
            image: format!("tool-{tool_id}"),
            cpu_cores: 0.5,
            memory_mb: 256,
            disk_mb: 1024,
            network,
            allowed_tools: vec![tool_id.to_string()],
            timeout,
            env: HashMap::new(),
        }
    }

    /// Low-resource spec used when warming the pool to its floor.
    pub fn warm_generic() -> Self {
        Self {
            image: "generic-runtime".to_string(),
            cpu_cores: 0.1,
            memory_mb: 64,
            disk_mb: 256,
            network: NetworkPolicy::None,
            allowed_tools: Vec::new(),
            timeout: Duration::from_secs(30),
            env: HashMap::new(),
        }
    }
}

/// Lifecycle states. The only legal walk is
/// creating -> ready -> (running <-> ready)* -> destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Creating,
    Ready,
    Running,
    Destroyed,
}

impl std::fmt::Display for SandboxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SandboxState::Creating => "creating",
            SandboxState::Ready => "ready",
            SandboxState::Running => "running",
            SandboxState::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// An isolated execution context for a single tool invocation.
#[derive(Debug)]
pub struct Sandbox {
    pub id: Uuid,
    pub spec: SandboxSpec,
    /// Opaque handle issued by the driver at creation.
    pub handle: Uuid,
    state: SandboxState,
    pub created_at: Instant,
    pub last_used_at: Instant,
    pub execution_count: u64,
}

impl Sandbox {
    /// A freshly created instance, still in `Creating`.
    pub fn new(spec: SandboxSpec, handle: Uuid) -> Self {
        let now = Instant::now();
        Self {
            id: new_id(),
            spec,
            handle,
            state: SandboxState::Creating,
            created_at: now,
            last_used_at: now,
            execution_count: 0,
        }
    }

    pub fn state(&self) -> SandboxState {
        self.state
    }

    /// Advance the lifecycle, rejecting anything outside the legal walk.
    /// Once destroyed a sandbox never transitions again.
    pub fn transition(&mut self, next: SandboxState) -> Result<(), SandboxError> {
        let legal = matches!(
            (self.state, next),
            (SandboxState::Creating, SandboxState::Ready)
                | (SandboxState::Ready, SandboxState::Running)
                | (SandboxState::Running, SandboxState::Ready)
                | (SandboxState::Ready, SandboxState::Destroyed)
                | (SandboxState::Running, SandboxState::Destroyed)
                | (SandboxState::Creating, SandboxState::Destroyed)
        );
        if !legal {
            return Err(SandboxError::execution(
                "ILLEGAL_STATE",
                format!("sandbox {} cannot go {} -> {}", self.id, self.state, next),
            ));
        }
        self.state = next;
        Ok(())
    }

    /// Record a successful execution before returning to the pool.
    pub fn touch(&mut self) {
        self.last_used_at = Instant::now();
        self.execution_count += 1;
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used_at.elapsed()
    }
}
