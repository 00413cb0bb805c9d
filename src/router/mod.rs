//! Semantic intent router.
//!
//! Ranks catalog tools against a normalized intent by cosine similarity,
//! applies cost/latency preference adjustments, and emits a routing
//! decision with fallbacks and an approval flag.

use std::sync::Arc;
use std::time::Duration;

use crate::config::RouterConfig;
use crate::embedding::{EmbeddingService, cosine_similarity};
use crate::error::{RejectedCandidate, RouterError};
use crate::types::{NormalizedRequest, RoutingDecision, ToolDefinition};

/// A catalog tool scored against the intent.
struct ScoredTool {
    tool: ToolDefinition,
    similarity: f64,
    confidence: f64,
    adjusted: bool,
}

pub struct IntentRouter {
    embeddings: Arc<EmbeddingService>,
    config: RouterConfig,
}

impl IntentRouter {
    pub fn new(embeddings: Arc<EmbeddingService>, config: RouterConfig) -> Self {
        Self { embeddings, config }
    }

    /// Route a request against the catalog, within the configured deadline.
    pub async fn route(
        &self,
        request: &NormalizedRequest,
        catalog: &[ToolDefinition],
    ) -> Result<RoutingDecision, RouterError> {
        let deadline = Duration::from_millis(self.config.deadline_ms);
        match tokio::time::timeout(deadline, self.route_inner(request, catalog)).await {
            Ok(result) => result,
            Err(_) => Err(RouterError::Timeout { deadline }),
        }
    }

    async fn route_inner(
        &self,
        request: &NormalizedRequest,
        catalog: &[ToolDefinition],
    ) -> Result<RoutingDecision, RouterError> {
        let intent_embedding = self.embeddings.embed_intent(&request.intent).await?;

        let mut survivors: Vec<ScoredTool> = Vec::new();
        let mut rejected: Vec<RejectedCandidate> = Vec::new();

        for tool in catalog {
            let tool_embedding = self.embeddings.embed_tool(tool).await?;
            let similarity =
                cosine_similarity(&intent_embedding.vector, &tool_embedding.vector)? as f64;

            if similarity < self.config.similarity_threshold {
                rejected.push(RejectedCandidate {
                    tool_id: tool.id.clone(),
                    score: similarity,
                });
                continue;
            }

            let (confidence, adjusted) = self.adjust_confidence(similarity, tool);
            if confidence < self.config.min_confidence {
                rejected.push(RejectedCandidate {
                    tool_id: tool.id.clone(),
                    score: confidence,
                });
                continue;
            }

            survivors.push(ScoredTool {
                tool: tool.clone(),
                similarity,
                confidence,
                adjusted,
            });
        }

        if survivors.is_empty() {
            rejected.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            rejected.truncate(3);
            return Err(RouterError::NoMatch {
                action: request.intent.action.clone(),
                alternatives: rejected,
            });
        }

        // Score descending, then lower latency, lower cost, lexicographic id.
        survivors.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let la = a.tool.latency_estimate_ms.unwrap_or(u64::MAX);
                    let lb = b.tool.latency_estimate_ms.unwrap_or(u64::MAX);
                    la.cmp(&lb)
                })
                .then_with(|| {
                    let ca = a.tool.cost_estimate.unwrap_or(f64::INFINITY);
                    let cb = b.tool.cost_estimate.unwrap_or(f64::INFINITY);
                    ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.tool.id.cmp(&b.tool.id))
        });

        let selected = survivors.remove(0);
        let fallbacks: Vec<ToolDefinition> = survivors
            .into_iter()
            .take(self.config.max_alternatives)
            .map(|s| s.tool)
            .collect();

        let requires_approval = selected.confidence < self.config.approval_threshold;
        let approval_reason = requires_approval.then(|| {
            format!(
                "confidence {:.1}% is below the {:.0}% approval threshold",
                selected.confidence * 100.0,
                self.config.approval_threshold * 100.0
            )
        });

        let decision = RoutingDecision {
            request_id: request.id,
            reasoning: self.compose_reasoning(&selected),
            estimated_latency_ms: selected.tool.latency_estimate_ms,
            estimated_cost: selected.tool.cost_estimate,
            confidence: selected.confidence,
            fallbacks,
            requires_approval,
            approval_reason,
            tool: selected.tool,
        };

        tracing::debug!(
            request_id = %decision.request_id,
            tool = %decision.tool.id,
            confidence = decision.confidence,
            fallbacks = decision.fallbacks.len(),
            requires_approval = decision.requires_approval,
            "Routing decision made"
        );

        Ok(decision)
    }

    /// Start from similarity, multiply in each enabled preference when the
    /// tool carries the matching estimate, and clamp to [0, 1].
    fn adjust_confidence(&self, similarity: f64, tool: &ToolDefinition) -> (f64, bool) {
        let mut confidence = similarity;
        let mut adjusted = false;

        if self.config.optimize_cost
            && let Some(cost) = tool.cost_estimate
        {
            confidence *= 0.9 + 0.1 * (1.0 / (1.0 + cost / 100.0));
            adjusted = true;
        }
        if self.config.optimize_latency
            && let Some(latency_ms) = tool.latency_estimate_ms
        {
            confidence *= 0.9 + 0.1 * (1.0 / (1.0 + latency_ms as f64 / 1000.0));
            adjusted = true;
        }

        (confidence.clamp(0.0, 1.0), adjusted)
    }

    fn compose_reasoning(&self, selected: &ScoredTool) -> String {
        let mut reasoning = format!(
            "matched '{}' with {:.1}% similarity",
            selected.tool.name,
            selected.similarity * 100.0
        );
        if let Some(cost) = selected.tool.cost_estimate {
            reasoning.push_str(&format!("; estimated cost {cost:.2}"));
        }
        if let Some(latency_ms) = selected.tool.latency_estimate_ms {
            reasoning.push_str(&format!("; estimated latency {latency_ms}ms"));
        }
        if selected.adjusted && selected.confidence < selected.similarity {
            reasoning.push_str(&format!(
                "; confidence reduced to {:.1}% by preference adjustments",
                selected.confidence * 100.0
            ));
        }
        reasoning
    }
}
