//! Pro/Con debater: per-round query generation.
//!
//! The two sides are symmetric; only the query chain's stance wording
//! differs, selected by [`Polarity`]. A debater never touches the pool or
//! graph directly — it reads a snapshot and emits query strings.

use std::sync::Arc;

use tracing::debug;

use crate::evidence::{EvidencePool, Polarity};
use crate::llm::chains::QueryChain;
use crate::llm::{ChatBackend, LlmResult};

/// One side of the debate.
pub struct Debater {
    polarity: Polarity,
    chain: QueryChain,
}

impl Debater {
    pub fn new(backend: Arc<dyn ChatBackend>, polarity: Polarity) -> Self {
        Self {
            polarity,
            chain: QueryChain::new(backend, polarity),
        }
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// Generate this round's queries.
    ///
    /// Summarizes the opponent's most recent evidence (≤3 items), feeds the
    /// full set of previously issued queries to the chain, and filters out
    /// anything already issued. The result may be empty.
    pub fn generate_queries(
        &self,
        claim: &str,
        round: u32,
        pool: &EvidencePool,
        prior_queries: &[String],
    ) -> LlmResult<Vec<String>> {
        let opponent_evidences = pool.get_by_agent(self.polarity.opponent(), None);

        let queries = self
            .chain
            .run(claim, round, &opponent_evidences, prior_queries)?;

        let fresh: Vec<String> = queries
            .into_iter()
            .filter(|q| !prior_queries.contains(q))
            .collect();

        debug!(agent = %self.polarity, round, queries = fresh.len(), "queries generated");
        Ok(fresh)
    }
}
