//! Evidence pool: the deduplicated store shared by both debaters.
//!
//! Insertion is idempotent on id and collapses content duplicates: any two
//! evidences with identical normalized content keep only the first. Writes
//! are serialized by the orchestrator; readers see the pool between rounds.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Credibility, Evidence, Polarity};

/// Default maximum number of evidences retained per claim run.
pub const DEFAULT_POOL_CAPACITY: usize = 100;

/// Aggregate counts over the pool contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStatistics {
    pub total: usize,
    pub pro: usize,
    pub con: usize,
    pub high_quality: usize,
    pub high_credibility: usize,
}

/// Deduplicated evidence store with secondary views by agent and round.
#[derive(Debug, Clone)]
pub struct EvidencePool {
    by_id: HashMap<String, Evidence>,
    /// Insertion order of ids; `get_all` iterates in this order.
    order: Vec<String>,
    content_hashes: HashSet<u64>,
    capacity: usize,
}

impl Default for EvidencePool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

impl EvidencePool {
    /// Create an empty pool bounded to `capacity` evidences.
    pub fn new(capacity: usize) -> Self {
        Self {
            by_id: HashMap::new(),
            order: Vec::new(),
            content_hashes: HashSet::new(),
            capacity,
        }
    }

    /// Insert an evidence. Returns whether insertion occurred.
    ///
    /// No-ops (returning `false`) when the id is already present, when an
    /// existing entry shares the normalized content hash, or when the pool
    /// is at capacity.
    pub fn add(&mut self, evidence: Evidence) -> bool {
        if self.by_id.contains_key(&evidence.id) {
            return false;
        }
        let hash = evidence.content_hash();
        if self.content_hashes.contains(&hash) {
            debug!(id = %evidence.id, "duplicate content, collapsing onto first occurrence");
            return false;
        }
        if self.by_id.len() >= self.capacity {
            debug!(id = %evidence.id, capacity = self.capacity, "pool full, dropping evidence");
            return false;
        }

        self.content_hashes.insert(hash);
        self.order.push(evidence.id.clone());
        self.by_id.insert(evidence.id.clone(), evidence);
        true
    }

    /// Look up one evidence by id.
    pub fn get_by_id(&self, id: &str) -> Option<&Evidence> {
        self.by_id.get(id)
    }

    /// Evidences retrieved by one agent, optionally restricted to a round.
    pub fn get_by_agent(&self, agent: Polarity, round: Option<u32>) -> Vec<&Evidence> {
        self.iter()
            .filter(|e| e.retrieved_by == agent)
            .filter(|e| round.is_none_or(|r| e.round_num == r))
            .collect()
    }

    /// All evidences added in the given round.
    pub fn get_by_round(&self, round: u32) -> Vec<&Evidence> {
        self.iter().filter(|e| e.round_num == round).collect()
    }

    /// All evidences with the given credibility tier.
    pub fn get_by_credibility(&self, credibility: Credibility) -> Vec<&Evidence> {
        self.iter().filter(|e| e.credibility == credibility).collect()
    }

    /// All evidences with quality at or above `min_score`.
    pub fn get_high_quality(&self, min_score: f64) -> Vec<&Evidence> {
        self.iter().filter(|e| e.quality_score >= min_score).collect()
    }

    /// All evidences in insertion order.
    pub fn get_all(&self) -> Vec<&Evidence> {
        self.iter().collect()
    }

    /// Iterate evidences in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Evidence> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Aggregate counts over the pool.
    pub fn statistics(&self) -> PoolStatistics {
        PoolStatistics {
            total: self.len(),
            pro: self.get_by_agent(Polarity::Pro, None).len(),
            con: self.get_by_agent(Polarity::Con, None).len(),
            high_quality: self.get_high_quality(0.6).len(),
            high_credibility: self.get_by_credibility(Credibility::High).len(),
        }
    }
}
