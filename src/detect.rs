//! Attack detector: proposes candidate edges after each round.
//!
//! Candidate pairs are always cross-agent. The priority gate runs first (no
//! LLM spend on pairs the graph would reject anyway), then the semantic
//! attack check. When the LLM is unreachable the detector falls back to a
//! pure credibility-rank comparison. Every proposal is re-validated by the
//! graph on insertion, so an over-eager model can never violate the
//! priority invariant.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::AttackMode;
use crate::evidence::Evidence;
use crate::graph::{ArgumentationGraph, AttackEdge};
use crate::llm::chains::AttackCheckChain;
use crate::llm::{ChainLog, ChatBackend};

/// Proposes attack edges between evidences of opposing agents.
pub struct AttackDetector {
    chain: AttackCheckChain,
    mode: AttackMode,
    epsilon: f64,
}

impl AttackDetector {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        mode: AttackMode,
        epsilon: f64,
        log: ChainLog,
    ) -> Self {
        Self {
            chain: AttackCheckChain::new(backend, log),
            mode,
            epsilon,
        }
    }

    /// Detect attacks after the additions of `round`.
    ///
    /// Strict mode pairs this round's new nodes against all others; relaxed
    /// mode revisits every cross-agent pair (duplicates become graph
    /// no-ops). Returned edges still pass through graph validation.
    pub fn detect_round(&self, graph: &ArgumentationGraph, round: u32) -> Vec<AttackEdge> {
        let attackers: Vec<&Evidence> = match self.mode {
            AttackMode::Strict => graph.nodes_by_round(round),
            AttackMode::Relaxed => graph.iter_nodes().collect(),
        };
        let all: Vec<&Evidence> = graph.iter_nodes().collect();

        let mut edges = Vec::new();
        for attacker in &attackers {
            for target in &all {
                if attacker.id == target.id || attacker.retrieved_by == target.retrieved_by {
                    continue;
                }

                let diff = attacker.priority() - target.priority();
                if !self.mode.permits(diff, self.epsilon) {
                    continue;
                }

                let (is_attack, rationale) =
                    match self.chain.run(Some(graph.claim()), attacker, target) {
                        Ok(judgment) => (judgment.is_attack, judgment.rationale),
                        Err(e) => {
                            warn!(error = %e, "attack check unavailable, credibility fallback");
                            credibility_fallback(attacker, target)
                        }
                    };

                if !is_attack {
                    debug!(attacker = %attacker.id, target = %target.id, "no attack");
                    continue;
                }

                edges.push(AttackEdge {
                    attacker_id: attacker.id.clone(),
                    target_id: target.id.clone(),
                    strength: self.mode.edge_strength(diff),
                    rationale,
                    round_num: round,
                });
            }
        }

        info!(round, proposals = edges.len(), "attack detection complete");
        edges
    }
}

/// LLM-free fallback: attack iff the attacker's credibility tier strictly
/// outranks the target's.
fn credibility_fallback(attacker: &Evidence, target: &Evidence) -> (bool, String) {
    if attacker.credibility > target.credibility {
        (
            true,
            format!(
                "higher source credibility ({} vs {})",
                attacker.credibility, target.credibility
            ),
        )
    } else {
        (false, String::new())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
