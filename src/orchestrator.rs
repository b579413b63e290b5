//! Debate orchestrator: round scheduling, fan-out, deadline, lifecycle.
//!
//! The orchestrator owns every write to the pool and the graph. Per round it
//! runs Pro and Con query generation concurrently, fans the searches out
//! over a bounded worker pool, commits the results single-threaded (all Pro
//! hits in query-completion order, then all Con hits), and then runs attack
//! detection sequentially. After the last round the judge decides.
//!
//! Cancellation is cooperative: a per-claim [`CancelToken`] (deadline or
//! explicit abort) is checked at every suspension point. In-flight HTTP
//! calls are bounded by their own timeouts; once the token fires, no new
//! edges or verdict are produced, but evidence already committed stays.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agents::{Debater, Judge, Verdict};
use crate::config::DebateConfig;
use crate::detect::AttackDetector;
use crate::error::{ElenchusError, ElenchusResult};
use crate::evidence::{Evidence, EvidencePool, Polarity, PoolStatistics};
use crate::graph::{ArgumentationGraph, GraphDocument};
use crate::llm::chains::Decision;
use crate::llm::{ChainLog, ChatBackend};
use crate::search::{SearchBackend, SearchHit};

/// Error marker recorded when the per-claim deadline fires.
pub const DEADLINE_MARKER: &str = "deadline_exceeded";

// ---------------------------------------------------------------------------
// CancelToken
// ---------------------------------------------------------------------------

/// Per-claim cancellation: a hard deadline plus an explicit abort flag.
#[derive(Debug, Clone)]
pub struct CancelToken {
    deadline: Instant,
    aborted: Arc<AtomicBool>,
}

impl CancelToken {
    /// A token that fires after `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signal explicit cancellation; all holders observe it.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    /// Whether the deadline has passed or an abort was signalled.
    pub fn expired(&self) -> bool {
        self.aborted.load(Ordering::Relaxed) || Instant::now() >= self.deadline
    }
}

// ---------------------------------------------------------------------------
// DebateOutcome
// ---------------------------------------------------------------------------

/// The full record of one claim run; serialized as the per-claim log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateOutcome {
    pub claim: String,
    /// Dataset label, filled in by the batch driver.
    pub ground_truth: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub verdict: Verdict,
    /// Serialized graph: evidences, edges, statistics.
    pub graph: GraphDocument,
    pub pool_statistics: PoolStatistics,
    pub rounds_completed: u32,
    /// Error markers such as `deadline_exceeded`.
    pub errors: Vec<String>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs the debate for one claim at a time.
pub struct Orchestrator {
    config: DebateConfig,
    search: Arc<dyn SearchBackend>,
    pro: Debater,
    con: Debater,
    judge: Judge,
    detector: AttackDetector,
    /// Parse incidents from the chains, drained into each claim's log.
    chain_log: ChainLog,
}

impl Orchestrator {
    pub fn new(
        config: DebateConfig,
        llm: Arc<dyn ChatBackend>,
        search: Arc<dyn SearchBackend>,
    ) -> Self {
        let chain_log = ChainLog::default();
        let detector = AttackDetector::new(
            llm.clone(),
            config.attack_mode,
            config.priority_epsilon,
            chain_log.clone(),
        );
        Self {
            pro: Debater::new(llm.clone(), Polarity::Pro),
            con: Debater::new(llm.clone(), Polarity::Con),
            judge: Judge::new(llm, chain_log.clone()),
            detector,
            config,
            search,
            chain_log,
        }
    }

    pub fn config(&self) -> &DebateConfig {
        &self.config
    }

    /// Run the debate under the configured per-claim deadline.
    pub fn check_claim(&self, claim: &str) -> ElenchusResult<DebateOutcome> {
        let token = CancelToken::with_timeout(self.config.claim_deadline());
        self.check_claim_with_token(claim, &token)
    }

    /// Run the debate under an externally supplied cancellation token.
    pub fn check_claim_with_token(
        &self,
        claim: &str,
        token: &CancelToken,
    ) -> ElenchusResult<DebateOutcome> {
        info!(claim, rounds = self.config.max_rounds, "debate start");

        let mut pool = EvidencePool::new(self.config.max_pool_size);
        let mut graph = ArgumentationGraph::new(
            claim,
            self.config.attack_mode,
            self.config.priority_epsilon,
        );
        let mut all_queries: Vec<String> = Vec::new();
        let mut sequence: u32 = 0;
        let mut rounds_completed = 0;

        let mut llm_calls = 0u32;
        let mut llm_failures = 0u32;
        let mut search_calls = 0u32;
        let mut search_failures = 0u32;

        for round in 1..=self.config.max_rounds {
            if token.expired() {
                return Ok(self.deadline_outcome(claim, pool, graph, rounds_completed));
            }
            info!(round, "round start");

            // Pro and Con query generation run concurrently.
            let (pro_result, con_result) = std::thread::scope(|scope| {
                let pro_handle = scope.spawn(|| {
                    self.pro.generate_queries(claim, round, &pool, &all_queries)
                });
                let con_handle = scope.spawn(|| {
                    self.con.generate_queries(claim, round, &pool, &all_queries)
                });
                (join_queries(pro_handle), join_queries(con_handle))
            });

            llm_calls += 2;
            let mut pro_queries = match pro_result {
                Ok(queries) => queries,
                Err(e) => {
                    warn!(round, error = %e, "pro query generation failed");
                    llm_failures += 1;
                    Vec::new()
                }
            };
            let mut con_queries = match con_result {
                Ok(queries) => queries,
                Err(e) => {
                    warn!(round, error = %e, "con query generation failed");
                    llm_failures += 1;
                    Vec::new()
                }
            };

            // First round always searches something: fall back to the claim
            // itself when a side produced no usable query.
            if round == 1 && pro_queries.is_empty() {
                pro_queries.push(claim.to_string());
            }
            if round == 1 && con_queries.is_empty() {
                con_queries.push(claim.to_string());
            }

            all_queries.extend(pro_queries.iter().cloned());
            all_queries.extend(con_queries.iter().cloned());

            if token.expired() {
                return Ok(self.deadline_outcome(claim, pool, graph, rounds_completed));
            }

            // Concurrent searches, bounded fan-out.
            let jobs: Vec<(Polarity, String)> = pro_queries
                .iter()
                .map(|q| (Polarity::Pro, q.clone()))
                .chain(con_queries.iter().map(|q| (Polarity::Con, q.clone())))
                .collect();
            let results = self.fan_out_searches(jobs, token);

            // Commit single-threaded: Pro hits in query-completion order,
            // then Con hits in query-completion order.
            for wanted in [Polarity::Pro, Polarity::Con] {
                for (polarity, query, result) in &results {
                    if *polarity != wanted {
                        continue;
                    }
                    search_calls += 1;
                    let hits = match result {
                        Ok(hits) => hits,
                        Err(e) => {
                            warn!(query = %query, error = %e, "search failed");
                            search_failures += 1;
                            continue;
                        }
                    };
                    for hit in hits.iter().take(self.config.search_top_k) {
                        sequence += 1;
                        let Some(evidence) = Evidence::from_hit(
                            hit,
                            *polarity,
                            round,
                            query,
                            sequence,
                            &self.config.credibility_whitelist,
                        ) else {
                            continue;
                        };
                        if pool.add(evidence.clone()) {
                            graph.add_evidence_node(evidence);
                        }
                    }
                }
            }
            info!(round, evidences = pool.len(), "evidence committed");

            if token.expired() {
                // Partial results stay, but no new edges after cancellation.
                return Ok(self.deadline_outcome(claim, pool, graph, rounds_completed));
            }

            // Attack detection is sequential, after all commits of the round.
            let proposals = self.detector.detect_round(&graph, round);
            let stored = graph.add_attacks(proposals);
            info!(round, stored, "attacks stored");

            rounds_completed = round;

            if llm_calls > 0
                && llm_failures == llm_calls
                && search_calls > 0
                && search_failures == search_calls
            {
                warn!("all LLM and search calls failed, aborting claim");
                return Err(ElenchusError::ExternalUnavailable);
            }
        }

        if token.expired() {
            return Ok(self.deadline_outcome(claim, pool, graph, rounds_completed));
        }

        let verdict = self.judge.decide(&graph, &pool);
        info!(decision = %verdict.decision, confidence = verdict.confidence, "debate complete");

        Ok(DebateOutcome {
            claim: claim.to_string(),
            ground_truth: None,
            timestamp: Utc::now(),
            verdict,
            graph: graph.to_document(),
            pool_statistics: pool.statistics(),
            rounds_completed,
            errors: self.chain_log.drain(),
        })
    }

    /// Run the search jobs over a worker pool capped at
    /// `concurrent_searches`, returning results in completion order.
    fn fan_out_searches(
        &self,
        jobs: Vec<(Polarity, String)>,
        token: &CancelToken,
    ) -> Vec<(Polarity, String, Result<Vec<SearchHit>, crate::search::SearchError>)> {
        if jobs.is_empty() {
            return Vec::new();
        }

        let workers = self.config.concurrent_searches.min(jobs.len());
        let queue: Mutex<VecDeque<(Polarity, String)>> = Mutex::new(jobs.into());
        let (sender, receiver) = mpsc::channel();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let sender = sender.clone();
                let queue = &queue;
                let search = self.search.clone();
                scope.spawn(move || {
                    loop {
                        if token.expired() {
                            break;
                        }
                        let job = queue.lock().ok().and_then(|mut q| q.pop_front());
                        let Some((polarity, query)) = job else { break };
                        let result = search.search(&query);
                        if sender.send((polarity, query, result)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(sender);

        receiver.iter().collect()
    }

    /// The well-defined result of a run that hit its deadline.
    fn deadline_outcome(
        &self,
        claim: &str,
        pool: EvidencePool,
        graph: ArgumentationGraph,
        rounds_completed: u32,
    ) -> DebateOutcome {
        warn!(claim, rounds_completed, "per-claim deadline exceeded");
        let mut errors = vec![DEADLINE_MARKER.to_string()];
        errors.extend(self.chain_log.drain());
        let verdict = Verdict {
            decision: Decision::NotEnoughEvidence,
            confidence: 0.3,
            reasoning: "The per-claim deadline expired before the debate completed.".into(),
            key_evidence_ids: Vec::new(),
            accepted_evidence_ids: Vec::new(),
            pro_strength: 0.0,
            con_strength: 0.0,
            total_evidences: pool.len(),
            accepted_evidences: 0,
        };
        DebateOutcome {
            claim: claim.to_string(),
            ground_truth: None,
            timestamp: Utc::now(),
            verdict,
            graph: graph.to_document(),
            pool_statistics: pool.statistics(),
            rounds_completed,
            errors,
        }
    }
}

/// Collapse a panicked query-generation thread into an empty query list.
fn join_queries(
    handle: std::thread::ScopedJoinHandle<'_, crate::llm::LlmResult<Vec<String>>>,
) -> crate::llm::LlmResult<Vec<String>> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => {
            warn!("query generation thread panicked");
            Ok(Vec::new())
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatRequest, LlmResult};
    use crate::search::SearchResult;

    /// LLM stub: query responses for debaters, "neutral" for everything else.
    struct ScriptedLlm;

    impl ChatBackend for ScriptedLlm {
        fn chat(&self, request: &ChatRequest) -> LlmResult<String> {
            let system = &request.messages[0].content;
            if system.contains("supporting side") {
                Ok("official data confirming the claim\n".into())
            } else if system.contains("refuting side") {
                Ok("official data contradicting the claim\n".into())
            } else if system.contains("argumentation analysis") {
                Ok("No | unrelated".into())
            } else if system.contains("one word") || system.contains("supports or refutes") {
                Ok("neutral".into())
            } else {
                Ok("Decision: NotEnoughEvidence\nReasoning: nothing decisive.".into())
            }
        }
    }

    /// Search stub returning one fixed hit per query.
    struct OneHit;

    impl SearchBackend for OneHit {
        fn search(&self, query: &str) -> SearchResult<Vec<SearchHit>> {
            Ok(vec![SearchHit {
                title: "t".into(),
                url: "https://example.com/a".into(),
                content: format!("result for {query} {}", "pad ".repeat(30)),
            }])
        }
    }

    struct DeadSearch;

    impl SearchBackend for DeadSearch {
        fn search(&self, _query: &str) -> SearchResult<Vec<SearchHit>> {
            Err(crate::search::SearchError::RequestFailed {
                message: "down".into(),
            })
        }
    }

    struct DeadLlm;

    impl ChatBackend for DeadLlm {
        fn chat(&self, _request: &ChatRequest) -> LlmResult<String> {
            Err(crate::llm::LlmError::Unavailable { url: "x".into() })
        }
    }

    fn config() -> DebateConfig {
        DebateConfig {
            max_rounds: 1,
            ..Default::default()
        }
    }

    #[test]
    fn expired_token_yields_deadline_marker() {
        let orchestrator =
            Orchestrator::new(config(), Arc::new(ScriptedLlm), Arc::new(OneHit));
        let token = CancelToken::with_timeout(Duration::ZERO);
        let outcome = orchestrator.check_claim_with_token("claim", &token).unwrap();
        assert_eq!(outcome.verdict.decision, Decision::NotEnoughEvidence);
        assert_eq!(outcome.verdict.confidence, 0.3);
        assert_eq!(outcome.errors, vec![DEADLINE_MARKER.to_string()]);
    }

    #[test]
    fn abort_is_observed_by_clones() {
        let token = CancelToken::with_timeout(Duration::from_secs(600));
        let clone = token.clone();
        assert!(!clone.expired());
        token.abort();
        assert!(clone.expired());
    }

    #[test]
    fn run_with_live_stubs_completes() {
        let orchestrator =
            Orchestrator::new(config(), Arc::new(ScriptedLlm), Arc::new(OneHit));
        let outcome = orchestrator.check_claim("some claim").unwrap();
        assert_eq!(outcome.rounds_completed, 1);
        // one query per side, one hit each, distinct contents
        assert_eq!(outcome.pool_statistics.total, 2);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn duplicate_hits_across_agents_collapse() {
        /// Both sides get the byte-identical hit.
        struct SameHit;
        impl SearchBackend for SameHit {
            fn search(&self, _query: &str) -> SearchResult<Vec<SearchHit>> {
                Ok(vec![SearchHit {
                    title: "t".into(),
                    url: "https://example.com/a".into(),
                    content: format!("identical text {}", "pad ".repeat(30)),
                }])
            }
        }
        let orchestrator =
            Orchestrator::new(config(), Arc::new(ScriptedLlm), Arc::new(SameHit));
        let outcome = orchestrator.check_claim("some claim").unwrap();
        assert_eq!(outcome.pool_statistics.total, 1);
        assert_eq!(outcome.graph.evidence_nodes.len(), 1);
        assert!(outcome.graph.attack_edges.is_empty());
    }

    #[test]
    fn dead_backends_abort_with_external_unavailable() {
        let orchestrator =
            Orchestrator::new(config(), Arc::new(DeadLlm), Arc::new(DeadSearch));
        let result = orchestrator.check_claim("some claim");
        assert!(matches!(result, Err(ElenchusError::ExternalUnavailable)));
    }

    #[test]
    fn dead_llm_alone_still_produces_a_verdict() {
        let orchestrator =
            Orchestrator::new(config(), Arc::new(DeadLlm), Arc::new(OneHit));
        let outcome = orchestrator.check_claim("some claim").unwrap();
        // claim-fallback queries still retrieved evidence
        assert!(outcome.pool_statistics.total > 0);
        // stance checks all failed to neutral: no side has strength
        assert_eq!(outcome.verdict.decision, Decision::NotEnoughEvidence);
    }
}
