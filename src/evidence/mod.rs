//! Evidence model: immutable retrieval records with credibility and priority.
//!
//! Every search hit that survives the admission filters becomes an
//! [`Evidence`] record. Records are created once by the search adapter and
//! never mutated; the priority derived here is the sole ordering used when
//! validating attack edges.
//!
//! # Architecture
//!
//! - [`Polarity`]: which debater retrieved the evidence (pro or con)
//! - [`Credibility`]: source tier inferred from the retrieval URL's host
//! - [`Evidence`]: the record itself, with `priority()` and content hashing
//! - [`EvidencePool`]: deduplicated shared store (see [`pool`])

pub mod pool;

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::search::SearchHit;

pub use pool::{EvidencePool, PoolStatistics};

/// Minimum content length (chars) for a hit to become evidence.
const MIN_CONTENT_CHARS: usize = 50;

/// Content length (chars) at which the length component of quality saturates.
const QUALITY_SATURATION_CHARS: usize = 500;

// ---------------------------------------------------------------------------
// Polarity
// ---------------------------------------------------------------------------

/// Which side of the debate retrieved a piece of evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    /// The agent searching for evidence supporting the claim.
    Pro,
    /// The agent searching for evidence refuting the claim.
    Con,
}

impl Polarity {
    /// The opposing side.
    pub fn opponent(self) -> Polarity {
        match self {
            Polarity::Pro => Polarity::Con,
            Polarity::Con => Polarity::Pro,
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarity::Pro => write!(f, "pro"),
            Polarity::Con => write!(f, "con"),
        }
    }
}

// ---------------------------------------------------------------------------
// Credibility
// ---------------------------------------------------------------------------

/// Source credibility tier, inferred from the retrieval URL's host.
///
/// Ordered: `High > Medium > Low`. The derived weight feeds both the quality
/// score at creation and the priority used for attack validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Credibility {
    Low,
    Medium,
    High,
}

impl Credibility {
    /// Weight used in priority and quality derivation.
    pub fn weight(self) -> f64 {
        match self {
            Credibility::High => 1.0,
            Credibility::Medium => 0.6,
            Credibility::Low => 0.3,
        }
    }
}

impl fmt::Display for Credibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credibility::High => write!(f, "High"),
            Credibility::Medium => write!(f, "Medium"),
            Credibility::Low => write!(f, "Low"),
        }
    }
}

/// Hosts treated as `High` regardless of TLD.
const AUTHORITATIVE_HOSTS: [&str; 5] = [
    "who.int",
    "un.org",
    "wikipedia.org",
    "nature.com",
    "science.org",
];

/// Extract the host from a URL: scheme and path stripped, lower-cased,
/// leading `www.` removed, port and userinfo dropped.
pub fn host_of(url: &str) -> String {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    let host = authority
        .rsplit('@')
        .next()
        .unwrap_or("")
        .split(':')
        .next()
        .unwrap_or("");
    let host = host.to_ascii_lowercase();
    host.strip_prefix("www.").unwrap_or(&host).to_string()
}

fn host_matches(host: &str, suffix: &str) -> bool {
    host == suffix || host.ends_with(&format!(".{suffix}"))
}

/// Infer credibility from a retrieval URL.
///
/// `High`: government (`*.gov`, `*.gov.*`) and academic (`*.edu`) hosts, a
/// fixed set of authoritative organizations, and any host in the configured
/// `whitelist` (suffix match). `Medium`: other generic `.com/.org/.net`
/// hosts. `Low`: everything else, including unparseable URLs.
pub fn assess_credibility(url: &str, whitelist: &[String]) -> Credibility {
    let host = host_of(url);
    if host.is_empty() {
        return Credibility::Low;
    }

    if host.ends_with(".gov") || host.contains(".gov.") || host.ends_with(".edu") {
        return Credibility::High;
    }
    if AUTHORITATIVE_HOSTS.iter().any(|s| host_matches(&host, s)) {
        return Credibility::High;
    }
    if whitelist.iter().any(|s| host_matches(&host, s)) {
        return Credibility::High;
    }

    if host.ends_with(".com") || host.ends_with(".org") || host.ends_with(".net") {
        return Credibility::Medium;
    }

    Credibility::Low
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

/// An immutable retrieval record: one admitted search hit.
///
/// Constructed only through [`Evidence::from_hit`]; fields are public for
/// reading and serialization but no method mutates a record after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    /// Stable identifier, unique within one claim run.
    pub id: String,
    /// Textual excerpt from the retrieved document.
    pub content: String,
    /// Retrieval URL.
    pub url: String,
    /// Page title, possibly empty.
    #[serde(default)]
    pub title: String,
    /// Human-readable source label (the URL host).
    #[serde(default)]
    pub source: String,
    /// Credibility tier inferred from the host.
    pub credibility: Credibility,
    /// Which debater retrieved this.
    pub retrieved_by: Polarity,
    /// Debate round, 1-indexed.
    pub round_num: u32,
    /// The query string that produced this hit.
    pub search_query: String,
    /// Retrieval time.
    pub timestamp: DateTime<Utc>,
    /// Quality score in `[0, 1]`, derived at creation.
    pub quality_score: f64,
}

impl Evidence {
    /// Admission filter + construction: convert a search hit into evidence.
    ///
    /// Returns `None` when the hit has an empty URL or content shorter than
    /// 50 characters. The id encodes polarity, round, and a per-run sequence
    /// number assigned by the orchestrator.
    pub fn from_hit(
        hit: &SearchHit,
        retrieved_by: Polarity,
        round_num: u32,
        search_query: &str,
        sequence: u32,
        whitelist: &[String],
    ) -> Option<Evidence> {
        if hit.url.trim().is_empty() {
            return None;
        }
        if hit.content.chars().count() < MIN_CONTENT_CHARS {
            return None;
        }

        let credibility = assess_credibility(&hit.url, whitelist);
        let quality_score = derive_quality(&hit.content, credibility);

        Some(Evidence {
            id: format!("e_{retrieved_by}_{round_num}_{sequence:03}"),
            content: hit.content.clone(),
            url: hit.url.clone(),
            title: hit.title.clone(),
            source: host_of(&hit.url),
            credibility,
            retrieved_by,
            round_num,
            search_query: search_query.to_string(),
            timestamp: Utc::now(),
            quality_score,
        })
    }

    /// Priority in `[0, 1]`: `credibility_weight × quality_score`.
    ///
    /// This is the sole ordering used for attack validity.
    pub fn priority(&self) -> f64 {
        self.credibility.weight() * self.quality_score
    }

    /// Hash of the normalized content, used for pool deduplication.
    ///
    /// Normalization: NFKC, case-folded, whitespace collapsed to single
    /// spaces. Two evidences with equal normalized content share one hash.
    pub fn content_hash(&self) -> u64 {
        let normalized: String = self
            .content
            .nfkc()
            .collect::<String>()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let mut hasher = DefaultHasher::new();
        normalized.hash(&mut hasher);
        hasher.finish()
    }

    /// A one-line summary for prompts: `[source] truncated content`.
    pub fn summary(&self, max_chars: usize) -> String {
        let content: String = self.content.chars().take(max_chars).collect();
        let ellipsis = if self.content.chars().count() > max_chars {
            "..."
        } else {
            ""
        };
        format!("[{}] {content}{ellipsis}", self.source)
    }
}

/// Quality at creation: `0.7 × credibility_weight + 0.3 × min(1, chars/500)`.
///
/// Stays in `[0, 1]` and is monotonic in credibility.
fn derive_quality(content: &str, credibility: Credibility) -> f64 {
    let length_score = (content.chars().count() as f64 / QUALITY_SATURATION_CHARS as f64).min(1.0);
    0.7 * credibility.weight() + 0.3 * length_score
}

// ===========================================================================
// Tests
// ===========================================================================
