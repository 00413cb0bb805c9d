//! Configuration for toolgate.
//!
//! Settings are loaded with priority: env var > default. `.env` files are
//! picked up via dotenvy early in startup. Each pipeline component gets
//! its own section with a `resolve()` constructor.

pub(crate) mod helpers;

use crate::config::helpers::{parse_bool_env, parse_optional_env, parse_string_env};
use crate::error::ConfigError;

/// Protocol adapter layer settings.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Hard cap on inbound payload size in bytes.
    pub max_payload_bytes: usize,
    /// Soft per-call budget; exceeding it warns but does not abort.
    pub budget_ms: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 10 * 1024 * 1024,
            budget_ms: 5,
        }
    }
}

impl AdapterConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            max_payload_bytes: parse_optional_env("MAX_PAYLOAD_BYTES", defaults.max_payload_bytes)?,
            budget_ms: parse_optional_env("ADAPTER_BUDGET_MS", defaults.budget_ms)?,
        })
    }
}

/// Embedding service settings.
#[derive(Debug, Clone)]
pub struct EmbeddingsConfig {
    /// Model identifier stored with each embedding.
    pub model: String,
    /// Vector dimension D.
    pub dimensions: usize,
    /// Cache entry lifetime in milliseconds.
    pub cache_ttl_ms: u64,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            model: "hash-embedder-v1".to_string(),
            dimensions: 384,
            cache_ttl_ms: 300_000,
        }
    }
}

impl EmbeddingsConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            model: parse_string_env("EMBEDDING_MODEL", &defaults.model)?,
            dimensions: parse_optional_env("EMBEDDING_DIMENSIONS", defaults.dimensions)?,
            cache_ttl_ms: parse_optional_env("CACHE_TTL_MS", defaults.cache_ttl_ms)?,
        })
    }
}

/// Intent router settings.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Minimum cosine similarity for a tool to be considered.
    pub similarity_threshold: f64,
    /// Minimum adjusted confidence for a tool to survive filtering.
    pub min_confidence: f64,
    /// Maximum fallback tools attached to a decision.
    pub max_alternatives: usize,
    /// Decisions below this confidence require human approval.
    pub approval_threshold: f64,
    /// Multiply scores by a cost preference when estimates are present.
    pub optimize_cost: bool,
    /// Multiply scores by a latency preference when estimates are present.
    pub optimize_latency: bool,
    /// Routing deadline in milliseconds.
    pub deadline_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            min_confidence: 0.70,
            max_alternatives: 3,
            approval_threshold: 0.8,
            optimize_cost: true,
            optimize_latency: true,
            deadline_ms: 50,
        }
    }
}

impl RouterConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            similarity_threshold: parse_optional_env(
                "SIMILARITY_THRESHOLD",
                defaults.similarity_threshold,
            )?,
            min_confidence: parse_optional_env("MIN_CONFIDENCE", defaults.min_confidence)?,
            max_alternatives: parse_optional_env("MAX_ALTERNATIVES", defaults.max_alternatives)?,
            approval_threshold: parse_optional_env(
                "APPROVAL_THRESHOLD",
                defaults.approval_threshold,
            )?,
            optimize_cost: parse_bool_env("ROUTER_OPTIMIZE_COST", defaults.optimize_cost)?,
            optimize_latency: parse_bool_env("ROUTER_OPTIMIZE_LATENCY", defaults.optimize_latency)?,
            deadline_ms: parse_optional_env("ROUTER_DEADLINE_MS", defaults.deadline_ms)?,
        };
        for (name, value) in [
            ("SIMILARITY_THRESHOLD", config.similarity_threshold),
            ("MIN_CONFIDENCE", config.min_confidence),
            ("APPROVAL_THRESHOLD", config.approval_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    var: name.to_string(),
                    reason: format!("{value} is outside [0, 1]"),
                });
            }
        }
        Ok(config)
    }
}

/// Sandbox pool settings.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Warm floor maintained by the maintenance loop.
    pub min_instances: usize,
    /// Hard ceiling on concurrently live sandboxes.
    pub max_instances: usize,
    /// Ready sandboxes idle longer than this are reaped.
    pub idle_timeout_ms: u64,
    /// Maintenance loop period.
    pub warmup_interval_ms: u64,
    /// Default per-execution timeout.
    pub execution_timeout_ms: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            min_instances: 2,
            max_instances: 100,
            idle_timeout_ms: 300_000,
            warmup_interval_ms: 60_000,
            execution_timeout_ms: 30_000,
        }
    }
}

impl SandboxConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            min_instances: parse_optional_env("SANDBOX_MIN_INSTANCES", defaults.min_instances)?,
            max_instances: parse_optional_env("SANDBOX_MAX_INSTANCES", defaults.max_instances)?,
            idle_timeout_ms: parse_optional_env(
                "SANDBOX_IDLE_TIMEOUT_MS",
                defaults.idle_timeout_ms,
            )?,
            warmup_interval_ms: parse_optional_env(
                "SANDBOX_WARMUP_INTERVAL_MS",
                defaults.warmup_interval_ms,
            )?,
            execution_timeout_ms: parse_optional_env(
                "EXECUTION_TIMEOUT_MS",
                defaults.execution_timeout_ms,
            )?,
        };
        if config.max_instances == 0 || config.min_instances > config.max_instances {
            return Err(ConfigError::InvalidValue {
                var: "SANDBOX_MIN_INSTANCES".to_string(),
                reason: format!(
                    "min {} must be <= max {} and max must be positive",
                    config.min_instances, config.max_instances
                ),
            });
        }
        Ok(config)
    }
}

/// Audit stream settings.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Buffered entries before a synchronous flush.
    pub buffer_size: usize,
    /// Periodic flush interval.
    pub flush_interval_ms: u64,
    /// Advertised retention horizon, enforced by the sink.
    pub retention_days: u32,
    /// Whether the sink should compress persisted batches.
    pub compression: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            buffer_size: 100,
            flush_interval_ms: 5_000,
            retention_days: 30,
            compression: false,
        }
    }
}

impl AuditConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            buffer_size: parse_optional_env("AUDIT_BUFFER_SIZE", defaults.buffer_size)?,
            flush_interval_ms: parse_optional_env(
                "AUDIT_FLUSH_INTERVAL_MS",
                defaults.flush_interval_ms,
            )?,
            retention_days: parse_optional_env("AUDIT_RETENTION_DAYS", defaults.retention_days)?,
            compression: parse_bool_env("AUDIT_COMPRESSION", defaults.compression)?,
        })
    }
}

/// Main configuration for the gateway.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub adapters: AdapterConfig,
    pub embeddings: EmbeddingsConfig,
    pub router: RouterConfig,
    pub sandbox: SandboxConfig,
    pub audit: AuditConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Ok(Self {
            adapters: AdapterConfig::resolve()?,
            embeddings: EmbeddingsConfig::resolve()?,
            router: RouterConfig::resolve()?,
            sandbox: SandboxConfig::resolve()?,
            audit: AuditConfig::resolve()?,
        })
    }
}
