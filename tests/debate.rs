//! End-to-end debate scenarios against stubbed LLM and search backends.
//!
//! These exercise the full pipeline — detection, solver, judge, and the
//! orchestrator round loop — with deterministic backends, checking the
//! decision rule outcomes and the engine invariants (priority rule on every
//! stored edge, solver correctness, stance-independent strengths, dedup,
//! deadline behavior).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use elenchus::agents::Judge;
use elenchus::config::{AttackMode, DebateConfig};
use elenchus::detect::AttackDetector;
use elenchus::evidence::{Credibility, Evidence, EvidencePool, Polarity};
use elenchus::graph::{ArgumentationGraph, grounded_extension};
use elenchus::llm::chains::Decision;
use elenchus::llm::{ChainLog, ChatBackend, ChatRequest, LlmResult};
use elenchus::orchestrator::{DEADLINE_MARKER, Orchestrator};
use elenchus::search::{SearchBackend, SearchHit, SearchResult};

// ---------------------------------------------------------------------------
// Stub backends
// ---------------------------------------------------------------------------

/// Deterministic chat backend.
///
/// Stances key off `SUPPORTS`/`REFUTES` markers planted in evidence
/// content; attack checks return a fixed response; query generation emits
/// one fixed query per side.
struct StubLlm {
    attack_response: &'static str,
    delay: Duration,
}

impl StubLlm {
    fn agreeable() -> Self {
        Self {
            attack_response: "Yes | the more authoritative source contradicts it",
            delay: Duration::ZERO,
        }
    }

    fn no_attacks() -> Self {
        Self {
            attack_response: "No | the accounts are consistent",
            delay: Duration::ZERO,
        }
    }
}

impl ChatBackend for StubLlm {
    fn chat(&self, request: &ChatRequest) -> LlmResult<String> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let system = &request.messages[0].content;
        let user = &request.messages[1].content;

        if system.contains("supporting side") {
            Ok("official figures confirming the claim".into())
        } else if system.contains("refuting side") {
            Ok("official figures contradicting the claim".into())
        } else if system.contains("argumentation analysis") {
            Ok(self.attack_response.to_string())
        } else if system.contains("exactly one word") {
            if user.contains("SUPPORTS") {
                Ok("support".into())
            } else if user.contains("REFUTES") {
                Ok("refute".into())
            } else {
                Ok("neutral".into())
            }
        } else {
            Ok("Decision: Supported\nReasoning: the strongest evidence prevails.".into())
        }
    }
}

/// Search stub mapping the Pro and Con stub queries to canned hits.
struct StubSearch {
    pro_hits: Vec<SearchHit>,
    con_hits: Vec<SearchHit>,
}

impl SearchBackend for StubSearch {
    fn search(&self, query: &str) -> SearchResult<Vec<SearchHit>> {
        if query.contains("confirming") {
            Ok(self.pro_hits.clone())
        } else if query.contains("contradicting") {
            Ok(self.con_hits.clone())
        } else {
            // round-1 claim fallback
            Ok(Vec::new())
        }
    }
}

fn hit(url: &str, marker: &str) -> SearchHit {
    SearchHit {
        title: "result".into(),
        url: url.into(),
        // marker first so it survives prompt truncation; padding past the
        // quality saturation length
        content: format!("{marker} {}", "filler text ".repeat(50)),
    }
}

fn evidence(
    id: &str,
    polarity: Polarity,
    credibility: Credibility,
    quality: f64,
    marker: &str,
) -> Evidence {
    Evidence {
        id: id.into(),
        content: format!("{marker} {}", "filler text ".repeat(10)),
        url: "https://example.com/e".into(),
        title: String::new(),
        source: "example.com".into(),
        credibility,
        retrieved_by: polarity,
        round_num: 1,
        search_query: "q".into(),
        timestamp: Utc::now(),
        quality_score: quality,
    }
}

/// Run detection, add edges, and decide, on a manually built fixture.
fn decide(
    llm: Arc<dyn ChatBackend>,
    evidences: Vec<Evidence>,
) -> (ArgumentationGraph, elenchus::agents::Verdict) {
    let mut pool = EvidencePool::default();
    let mut graph = ArgumentationGraph::new("the claim under test", AttackMode::Strict, 0.05);
    for e in evidences {
        pool.add(e.clone());
        graph.add_evidence_node(e);
    }
    let detector = AttackDetector::new(llm.clone(), AttackMode::Strict, 0.05, ChainLog::default());
    let proposals = detector.detect_round(&graph, 1);
    graph.add_attacks(proposals);
    let verdict = Judge::new(llm, ChainLog::default()).decide(&graph, &pool);
    (graph, verdict)
}

/// Every stored edge must satisfy the configured priority relation (P1).
fn assert_priority_rule(graph: &ArgumentationGraph, epsilon: f64) {
    for edge in graph.edges() {
        let attacker = graph.node(&edge.attacker_id).expect("attacker exists");
        let target = graph.node(&edge.target_id).expect("target exists");
        let diff = attacker.priority() - target.priority();
        assert!(
            graph.attack_mode().permits(diff, epsilon),
            "edge {} -> {} violates the {} priority rule (diff {diff})",
            edge.attacker_id,
            edge.target_id,
            graph.attack_mode(),
        );
    }
}

// ---------------------------------------------------------------------------
// Seed scenarios
// ---------------------------------------------------------------------------

#[test]
fn single_uncontested_support() {
    let llm = Arc::new(StubLlm::no_attacks());
    let (graph, verdict) = decide(
        llm,
        vec![evidence("e1", Polarity::Pro, Credibility::High, 1.0, "SUPPORTS")],
    );

    let ext = grounded_extension(&graph);
    assert!(ext.is_accepted("e1"));
    assert_eq!(verdict.decision, Decision::Supported);
    // 0.6 + 0.4 * 1.0, capped at 0.9
    assert!((verdict.confidence - 0.9).abs() < 1e-9);
    assert_eq!(verdict.key_evidence_ids, vec!["e1".to_string()]);
}

#[test]
fn direct_refutation_by_higher_priority() {
    let llm = Arc::new(StubLlm::agreeable());
    let (graph, verdict) = decide(
        llm,
        vec![
            evidence("e1", Polarity::Pro, Credibility::Medium, 0.8, "SUPPORTS"),
            evidence("e2", Polarity::Con, Credibility::High, 1.0, "REFUTES"),
        ],
    );

    assert_eq!(graph.edge_count(), 1);
    assert_eq!(graph.edges()[0].attacker_id, "e2");

    let ext = grounded_extension(&graph);
    assert!(ext.is_accepted("e2"));
    assert!(ext.defeated.contains("e1"));

    assert_eq!(verdict.decision, Decision::Refuted);
    assert!((verdict.confidence - 0.9).abs() < 1e-9);
    assert_eq!(verdict.accepted_evidence_ids, vec!["e2".to_string()]);
}

#[test]
fn equal_priority_standoff_is_nei() {
    // Equal priorities: the strict gate blocks both directions even though
    // the model would assert an attack.
    let llm = Arc::new(StubLlm::agreeable());
    let (graph, verdict) = decide(
        llm,
        vec![
            evidence("e1", Polarity::Pro, Credibility::Medium, 0.8, "SUPPORTS"),
            evidence("e2", Polarity::Con, Credibility::Medium, 0.8, "REFUTES"),
        ],
    );

    assert_eq!(graph.edge_count(), 0);
    let ext = grounded_extension(&graph);
    assert!(ext.is_accepted("e1") && ext.is_accepted("e2"));

    assert_eq!(verdict.decision, Decision::NotEnoughEvidence);
    assert!((verdict.confidence - 0.5).abs() < 1e-9);
    // the rule overrode the model's "Supported" draft
    assert!(verdict.reasoning.starts_with("Note:"));
}

#[test]
fn chain_defense_reinstates_support() {
    let llm = Arc::new(StubLlm::agreeable());
    let (graph, verdict) = decide(
        llm,
        vec![
            evidence("e1", Polarity::Pro, Credibility::Medium, 1.0, "SUPPORTS"),
            evidence("e2", Polarity::Con, Credibility::High, 0.8, "REFUTES"),
            evidence("e3", Polarity::Pro, Credibility::High, 0.95, "SUPPORTS"),
        ],
    );

    // e2 (0.8) -> e1 (0.6), e3 (0.95) -> e2 (0.8)
    let pairs: Vec<(&str, &str)> = graph
        .edges()
        .iter()
        .map(|e| (e.attacker_id.as_str(), e.target_id.as_str()))
        .collect();
    assert!(pairs.contains(&("e2", "e1")));
    assert!(pairs.contains(&("e3", "e2")));

    let ext = grounded_extension(&graph);
    assert!(ext.is_accepted("e3"));
    assert!(ext.is_accepted("e1"));
    assert!(ext.defeated.contains("e2"));

    assert_eq!(verdict.decision, Decision::Supported);
}

#[test]
fn cross_agent_duplicate_shares_one_node() {
    let same = hit("https://example.com/shared", "NEUTRAL");
    let search = StubSearch {
        pro_hits: vec![same.clone()],
        con_hits: vec![same],
    };
    let config = DebateConfig {
        max_rounds: 1,
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(config, Arc::new(StubLlm::agreeable()), Arc::new(search));
    let outcome = orchestrator.check_claim("some claim").unwrap();

    assert_eq!(outcome.pool_statistics.total, 1);
    assert_eq!(outcome.graph.evidence_nodes.len(), 1);
    // a duplicate cannot attack itself
    assert!(outcome.graph.attack_edges.is_empty());
}

#[test]
fn deadline_exceeded_returns_marker() {
    let llm = StubLlm {
        attack_response: "No | n/a",
        delay: Duration::from_millis(50),
    };
    let search = StubSearch {
        pro_hits: vec![hit("https://example.com/a", "SUPPORTS")],
        con_hits: vec![hit("https://example.com/b", "REFUTES")],
    };
    let config = DebateConfig {
        claim_deadline_s: 0.01,
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(config, Arc::new(llm), Arc::new(search));

    let started = std::time::Instant::now();
    let outcome = orchestrator.check_claim("some claim").unwrap();

    assert_eq!(outcome.verdict.decision, Decision::NotEnoughEvidence);
    assert!((outcome.verdict.confidence - 0.3).abs() < 1e-9);
    assert!(outcome.errors.iter().any(|e| e == DEADLINE_MARKER));
    // the run ends promptly once the token fires
    assert!(started.elapsed() < Duration::from_secs(5));
}

// ---------------------------------------------------------------------------
// Invariants
// ---------------------------------------------------------------------------

#[test]
fn stored_edges_satisfy_the_priority_rule() {
    // The model asserts attacks everywhere; only rule-respecting edges may
    // survive, in both modes.
    let evidences = vec![
        evidence("a", Polarity::Pro, Credibility::High, 1.0, "SUPPORTS"),
        evidence("b", Polarity::Con, Credibility::High, 0.9, "REFUTES"),
        evidence("c", Polarity::Pro, Credibility::Medium, 0.8, "SUPPORTS"),
        evidence("d", Polarity::Con, Credibility::Low, 0.9, "REFUTES"),
    ];

    for mode in [AttackMode::Strict, AttackMode::Relaxed] {
        let mut graph = ArgumentationGraph::new("claim", mode, 0.05);
        for e in &evidences {
            graph.add_evidence_node(e.clone());
        }
        let detector =
            AttackDetector::new(Arc::new(StubLlm::agreeable()), mode, 0.05, ChainLog::default());
        graph.add_attacks(detector.detect_round(&graph, 1));

        assert!(graph.edge_count() > 0, "{mode} fixture should produce edges");
        assert_priority_rule(&graph, 0.05);
    }
}

#[test]
fn grounded_extension_matches_its_definition() {
    let llm = Arc::new(StubLlm::agreeable());
    let (graph, _) = decide(
        llm,
        vec![
            evidence("e1", Polarity::Pro, Credibility::Medium, 1.0, "SUPPORTS"),
            evidence("e2", Polarity::Con, Credibility::High, 0.8, "REFUTES"),
            evidence("e3", Polarity::Pro, Credibility::High, 0.95, "SUPPORTS"),
            evidence("e4", Polarity::Con, Credibility::Low, 0.5, "REFUTES"),
        ],
    );

    let ext = grounded_extension(&graph);

    for id in graph.node_ids() {
        let attackers = graph.attackers_of(id);
        let defended = attackers.iter().all(|a| ext.defeated.contains(*a));
        if ext.is_accepted(id) {
            assert!(defended, "{id} is accepted but not defended");
        } else {
            // every rejected node is attacked by something accepted, or sits
            // in an indefensible cycle
            assert!(
                attackers.iter().any(|a| ext.accepted.contains(*a)) || !defended,
                "{id} is defeated yet defended"
            );
        }
    }
}

#[test]
fn strengths_ignore_who_retrieved_the_evidence() {
    let llm: Arc<dyn ChatBackend> = Arc::new(StubLlm::no_attacks());
    let original = vec![
        evidence("e1", Polarity::Pro, Credibility::High, 1.0, "SUPPORTS"),
        evidence("e2", Polarity::Con, Credibility::Medium, 0.8, "REFUTES"),
        evidence("e3", Polarity::Pro, Credibility::Medium, 0.7, "REFUTES"),
    ];
    let flipped: Vec<Evidence> = original
        .iter()
        .map(|e| Evidence {
            retrieved_by: e.retrieved_by.opponent(),
            ..e.clone()
        })
        .collect();

    let (_, verdict_a) = decide(llm.clone(), original);
    let (_, verdict_b) = decide(llm, flipped);

    assert_eq!(verdict_a.pro_strength, verdict_b.pro_strength);
    assert_eq!(verdict_a.con_strength, verdict_b.con_strength);
    assert_eq!(verdict_a.decision, verdict_b.decision);
}

#[test]
fn full_run_produces_a_serializable_log() {
    let search = StubSearch {
        pro_hits: vec![hit("https://data.gov/report", "SUPPORTS")],
        con_hits: vec![hit("https://example.xyz/post", "REFUTES")],
    };
    let config = DebateConfig {
        max_rounds: 2,
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(config, Arc::new(StubLlm::agreeable()), Arc::new(search));
    let outcome = orchestrator.check_claim("The agency confirmed the figure.").unwrap();

    // High-credibility support defeats a low-credibility rebuttal.
    assert_eq!(outcome.verdict.decision, Decision::Supported);
    assert_eq!(outcome.rounds_completed, 2);

    // round-trips through serde as the per-claim log
    let json = serde_json::to_string(&outcome).unwrap();
    let back: elenchus::orchestrator::DebateOutcome = serde_json::from_str(&json).unwrap();
    assert_eq!(back.verdict.decision, Decision::Supported);
    assert_eq!(back.graph.evidence_nodes.len(), outcome.graph.evidence_nodes.len());
}
