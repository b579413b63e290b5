//! Grounded-extension solver: Dung's semantics over the attack graph.
//!
//! The grounded extension is the least fixed point of the characteristic
//! function `F(S) = { n | every attacker of n is attacked by S }`, computed
//! by iteration from the empty set. The solver is a pure function of the
//! graph's `(nodes, edges)` and is deterministic: nodes are visited in
//! insertion order, and the pass loop stops on quiescence or a hard cap.
//! Priorities never enter here; they only gated which edges exist.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ArgumentationGraph;

/// Hard cap on fixed-point passes; quiescence is normally reached far earlier.
const MAX_PASSES: usize = 100;

/// The accepted/defeated partition produced by the solver.
///
/// Every node id of the input graph ends up in exactly one of the two sets;
/// grounded semantics leaves no undecided remainder (nodes unclassified at
/// termination are rejected).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extension {
    pub accepted: HashSet<String>,
    pub defeated: HashSet<String>,
}

impl Extension {
    pub fn is_accepted(&self, id: &str) -> bool {
        self.accepted.contains(id)
    }
}

/// Compute the grounded extension of the graph.
///
/// Per pass, in node insertion order, an unclassified node is:
/// - accepted when it has no attackers, or when every attacker is already
///   defeated;
/// - defeated when some attacker is already accepted.
///
/// Passes repeat until nothing changes or [`MAX_PASSES`] is hit; whatever
/// remains unclassified is then defeated.
pub fn grounded_extension(graph: &ArgumentationGraph) -> Extension {
    let mut accepted: HashSet<String> = HashSet::new();
    let mut defeated: HashSet<String> = HashSet::new();

    for pass in 0..MAX_PASSES {
        let mut changed = false;

        for id in graph.node_ids() {
            if accepted.contains(id) || defeated.contains(id) {
                continue;
            }

            let attackers = graph.attackers_of(id);

            if attackers.is_empty() || attackers.iter().all(|a| defeated.contains(*a)) {
                accepted.insert(id.clone());
                changed = true;
            } else if attackers.iter().any(|a| accepted.contains(*a)) {
                defeated.insert(id.clone());
                changed = true;
            }
        }

        if !changed {
            debug!(pass, accepted = accepted.len(), defeated = defeated.len(), "fixed point");
            break;
        }
    }

    // Grounded semantics rejects anything the fixed point could not defend.
    for id in graph.node_ids() {
        if !accepted.contains(id) && !defeated.contains(id) {
            defeated.insert(id.clone());
        }
    }

    Extension { accepted, defeated }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttackMode;
    use crate::evidence::{Credibility, Polarity};
    use crate::graph::tests::{edge, evidence};

    fn graph_with(
        nodes: &[(&str, Credibility, f64)],
        edges: &[(&str, &str)],
    ) -> ArgumentationGraph {
        let mut g = ArgumentationGraph::new("claim", AttackMode::Strict, 0.05);
        for (i, (id, cred, quality)) in nodes.iter().enumerate() {
            let polarity = if i % 2 == 0 { Polarity::Pro } else { Polarity::Con };
            g.add_evidence_node(evidence(id, polarity, *cred, *quality));
        }
        for (a, t) in edges {
            assert!(g.add_attack(edge(a, t)), "fixture edge {a}->{t} rejected");
        }
        g
    }

    #[test]
    fn unattacked_nodes_are_accepted() {
        let g = graph_with(
            &[
                ("a", Credibility::High, 1.0),
                ("b", Credibility::Medium, 0.5),
            ],
            &[],
        );
        let ext = grounded_extension(&g);
        assert!(ext.is_accepted("a"));
        assert!(ext.is_accepted("b"));
        assert!(ext.defeated.is_empty());
    }

    #[test]
    fn attacked_node_is_defeated() {
        let g = graph_with(
            &[
                ("winner", Credibility::High, 1.0),
                ("loser", Credibility::Medium, 0.5),
            ],
            &[("winner", "loser")],
        );
        let ext = grounded_extension(&g);
        assert!(ext.is_accepted("winner"));
        assert!(ext.defeated.contains("loser"));
    }

    #[test]
    fn chain_defense_reinstates_the_first_target() {
        // e3 -> e2 -> e1: e3 defeats e2, which reinstates e1.
        let g = graph_with(
            &[
                ("e1", Credibility::Medium, 0.5),
                ("e2", Credibility::High, 0.8),
                ("e3", Credibility::High, 1.0),
            ],
            &[("e2", "e1"), ("e3", "e2")],
        );
        let ext = grounded_extension(&g);
        assert!(ext.is_accepted("e3"));
        assert!(ext.defeated.contains("e2"));
        assert!(ext.is_accepted("e1"));
    }

    #[test]
    fn mutual_attack_cycle_is_wholly_rejected() {
        // Relaxed mode so both directions of a near-peer cycle validate.
        let mut g = ArgumentationGraph::new("claim", AttackMode::Relaxed, 0.05);
        g.add_evidence_node(evidence("a", Polarity::Pro, Credibility::Medium, 0.8));
        g.add_evidence_node(evidence("b", Polarity::Con, Credibility::Medium, 0.8));
        assert!(g.add_attack(edge("a", "b")));
        assert!(g.add_attack(edge("b", "a")));

        let ext = grounded_extension(&g);
        // Neither node is defended by the empty set: grounded rejects both.
        assert!(ext.accepted.is_empty());
        assert_eq!(ext.defeated.len(), 2);
    }

    #[test]
    fn every_node_is_classified_exactly_once() {
        let g = graph_with(
            &[
                ("e1", Credibility::Medium, 0.5),
                ("e2", Credibility::High, 0.8),
                ("e3", Credibility::High, 1.0),
            ],
            &[("e2", "e1"), ("e3", "e2")],
        );
        let ext = grounded_extension(&g);
        for id in g.node_ids() {
            let in_accepted = ext.accepted.contains(id);
            let in_defeated = ext.defeated.contains(id);
            assert!(in_accepted ^ in_defeated, "{id} must be in exactly one set");
        }
    }

    #[test]
    fn solver_is_deterministic() {
        let g = graph_with(
            &[
                ("e1", Credibility::Medium, 0.5),
                ("e2", Credibility::High, 0.8),
                ("e3", Credibility::High, 1.0),
                ("e4", Credibility::Low, 0.9),
            ],
            &[("e2", "e1"), ("e3", "e2")],
        );
        let first = grounded_extension(&g);
        for _ in 0..10 {
            assert_eq!(grounded_extension(&g), first);
        }
    }

    #[test]
    fn empty_graph_yields_empty_extension() {
        let g = ArgumentationGraph::new("claim", AttackMode::Strict, 0.05);
        let ext = grounded_extension(&g);
        assert!(ext.accepted.is_empty());
        assert!(ext.defeated.is_empty());
    }
}
