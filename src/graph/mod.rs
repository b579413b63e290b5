//! Argumentation graph: evidence nodes joined by typed attack edges.
//!
//! The graph is the formal arena of the debate. Nodes are [`Evidence`]
//! records; edges assert that one evidence defeats another. Edge addition is
//! the privileged operation: every proposal is validated against the
//! configured [`AttackMode`] priority relation and against node existence,
//! and rejected proposals are counted but never stored. Agents and the judge
//! only ever read the graph; the orchestrator owns the single writer.
//!
//! # Architecture
//!
//! - [`AttackEdge`]: directed, append-only attack assertion
//! - [`ArgumentationGraph`]: insertion-ordered nodes + validated edges
//! - [`semantics`]: grounded-extension solver over the final graph

pub mod semantics;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AttackMode;
use crate::evidence::{Evidence, Polarity};

pub use semantics::{Extension, grounded_extension};

// ---------------------------------------------------------------------------
// AttackEdge
// ---------------------------------------------------------------------------

/// A directed attack: the attacker evidence defeats the target evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackEdge {
    /// Attacking evidence id.
    pub attacker_id: String,
    /// Attacked evidence id.
    pub target_id: String,
    /// Attack strength in `(0, 1]`, derived from the priority difference.
    pub strength: f64,
    /// Short rationale for the attack.
    pub rationale: String,
    /// Round in which the edge was created.
    pub round_num: u32,
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Summary counts serialized with the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub total_evidences: usize,
    pub total_attacks: usize,
    pub pro_evidences: usize,
    pub con_evidences: usize,
    pub avg_pro_priority: f64,
    pub avg_con_priority: f64,
    /// Proposals dropped for violating the priority rule or referencing
    /// missing nodes.
    pub rejected_edges: usize,
}

// ---------------------------------------------------------------------------
// ArgumentationGraph
// ---------------------------------------------------------------------------

/// The debate graph for one claim.
///
/// Node iteration order is insertion order; the solver and the serializer
/// both rely on it, which keeps runs deterministic for fixed inputs.
#[derive(Debug, Clone)]
pub struct ArgumentationGraph {
    claim: String,
    nodes: HashMap<String, Evidence>,
    /// Node ids in insertion order.
    order: Vec<String>,
    edges: Vec<AttackEdge>,
    attack_mode: AttackMode,
    priority_epsilon: f64,
    rejected_edges: usize,
}

impl ArgumentationGraph {
    /// Create an empty graph for a claim under the given attack mode.
    pub fn new(claim: &str, attack_mode: AttackMode, priority_epsilon: f64) -> Self {
        Self {
            claim: claim.to_string(),
            nodes: HashMap::new(),
            order: Vec::new(),
            edges: Vec::new(),
            attack_mode,
            priority_epsilon,
            rejected_edges: 0,
        }
    }

    /// The claim under debate.
    pub fn claim(&self) -> &str {
        &self.claim
    }

    /// The priority relation this graph validates edges against.
    pub fn attack_mode(&self) -> AttackMode {
        self.attack_mode
    }

    /// Insert an evidence node if absent. Returns whether insertion occurred.
    pub fn add_evidence_node(&mut self, evidence: Evidence) -> bool {
        if self.nodes.contains_key(&evidence.id) {
            return false;
        }
        self.order.push(evidence.id.clone());
        self.nodes.insert(evidence.id.clone(), evidence);
        true
    }

    /// Validate and append an attack edge. Returns whether it was stored.
    ///
    /// Rejections (missing endpoint, self-loop, priority rule violation) are
    /// logged and counted in [`GraphStatistics::rejected_edges`]; a duplicate
    /// `(attacker, target)` pair is a silent no-op.
    pub fn add_attack(&mut self, edge: AttackEdge) -> bool {
        let (Some(attacker), Some(target)) = (
            self.nodes.get(&edge.attacker_id),
            self.nodes.get(&edge.target_id),
        ) else {
            warn!(
                attacker = %edge.attacker_id,
                target = %edge.target_id,
                "attack references a node not in the graph, dropping"
            );
            self.rejected_edges += 1;
            return false;
        };

        if edge.attacker_id == edge.target_id {
            warn!(id = %edge.attacker_id, "self-attack dropped");
            self.rejected_edges += 1;
            return false;
        }

        if self
            .edges
            .iter()
            .any(|e| e.attacker_id == edge.attacker_id && e.target_id == edge.target_id)
        {
            debug!(
                attacker = %edge.attacker_id,
                target = %edge.target_id,
                "duplicate attack, ignoring"
            );
            return false;
        }

        let diff = attacker.priority() - target.priority();
        if !self.attack_mode.permits(diff, self.priority_epsilon) {
            warn!(
                attacker = %edge.attacker_id,
                target = %edge.target_id,
                diff,
                mode = %self.attack_mode,
                "attack violates the priority rule, dropping"
            );
            self.rejected_edges += 1;
            return false;
        }

        debug!(
            attacker = %edge.attacker_id,
            target = %edge.target_id,
            strength = edge.strength,
            "attack stored"
        );
        self.edges.push(edge);
        true
    }

    /// Validate and append a batch of edges; returns how many were stored.
    pub fn add_attacks(&mut self, edges: Vec<AttackEdge>) -> usize {
        edges.into_iter().filter(|e| self.add_attack(e.clone())).count()
    }

    /// Ids of all nodes attacking `target_id`, in edge insertion order.
    pub fn attackers_of(&self, target_id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.target_id == target_id)
            .map(|e| e.attacker_id.as_str())
            .collect()
    }

    /// Ids of all nodes attacked by `attacker_id`, in edge insertion order.
    pub fn targets_of(&self, attacker_id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.attacker_id == attacker_id)
            .map(|e| e.target_id.as_str())
            .collect()
    }

    /// All nodes retrieved by one agent, in insertion order.
    pub fn nodes_by_agent(&self, agent: Polarity) -> Vec<&Evidence> {
        self.iter_nodes().filter(|e| e.retrieved_by == agent).collect()
    }

    /// All nodes added in a given round, in insertion order.
    pub fn nodes_by_round(&self, round: u32) -> Vec<&Evidence> {
        self.iter_nodes().filter(|e| e.round_num == round).collect()
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&Evidence> {
        self.nodes.get(id)
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> &[String] {
        &self.order
    }

    /// Iterate nodes in insertion order.
    pub fn iter_nodes(&self) -> impl Iterator<Item = &Evidence> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// All stored edges in insertion order.
    pub fn edges(&self) -> &[AttackEdge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Summary counts over nodes and edges.
    pub fn statistics(&self) -> GraphStatistics {
        let pro = self.nodes_by_agent(Polarity::Pro);
        let con = self.nodes_by_agent(Polarity::Con);
        let mean = |nodes: &[&Evidence]| {
            if nodes.is_empty() {
                0.0
            } else {
                nodes.iter().map(|e| e.priority()).sum::<f64>() / nodes.len() as f64
            }
        };
        GraphStatistics {
            total_evidences: self.nodes.len(),
            total_attacks: self.edges.len(),
            pro_evidences: pro.len(),
            con_evidences: con.len(),
            avg_pro_priority: mean(&pro),
            avg_con_priority: mean(&con),
            rejected_edges: self.rejected_edges,
        }
    }

    /// Serialize to the stable document shape.
    pub fn to_document(&self) -> GraphDocument {
        GraphDocument {
            claim: self.claim.clone(),
            evidence_nodes: self.iter_nodes().cloned().collect(),
            attack_edges: self.edges.clone(),
            statistics: self.statistics(),
        }
    }

    /// Rebuild a graph from a serialized document.
    ///
    /// Nodes are re-inserted in document order; edges are taken as stored
    /// (they were validated when first added).
    pub fn from_document(doc: GraphDocument, attack_mode: AttackMode, epsilon: f64) -> Self {
        let mut graph = ArgumentationGraph::new(&doc.claim, attack_mode, epsilon);
        for evidence in doc.evidence_nodes {
            graph.add_evidence_node(evidence);
        }
        graph.edges = doc.attack_edges;
        graph
    }
}

/// The externally stable serialization shape of a graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    pub claim: String,
    pub evidence_nodes: Vec<Evidence>,
    pub attack_edges: Vec<AttackEdge>,
    pub statistics: GraphStatistics,
}

// ===========================================================================
// Tests
// ===========================================================================
