//! Prompt chains: typed request/response wrappers over the chat backend.
//!
//! Each chain is a long-lived object carrying its prompt template, its call
//! options, and its parser. Parse failures never crash a round: the chain
//! logs the raw response and returns its conservative default (no queries,
//! no attack, `Neutral`, `NotEnoughEvidence`). Transport errors are
//! returned to the caller, which owns the non-LLM fallback.
//!
//! The five chains:
//!
//! | Chain             | Output                                  |
//! |-------------------|-----------------------------------------|
//! | [`QueryChain`]    | 1–2 search query strings                |
//! | [`AttackCheckChain`] | attack? + ≤50-word rationale         |
//! | [`StanceChain`]   | [`Stance`]                              |
//! | [`VerdictChain`]  | decision draft + ≤300-word reasoning    |
//!
//! `QueryChain` serves both Pro and Con; the two named chains differ only
//! in their stance wording, which is selected by [`Polarity`].

use std::fmt;
use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{ChainLog, ChatBackend, ChatRequest, LlmResult};
use crate::evidence::{Evidence, Polarity};

// ── Regex patterns ──────────────────────────────────────────────────────

static RE_LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\s\d\.、）\)\-\*#>]+").unwrap());

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// An evidence's relation to the claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    Support,
    Refute,
    Neutral,
}

/// The final label of a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Supported,
    Refuted,
    NotEnoughEvidence,
}

impl Decision {
    /// Match a free-form dataset or model label against this decision.
    ///
    /// Normalizes to lowercase alphanumerics, so "Not Enough Evidence",
    /// "NotEnoughEvidence", and "NEI" all match [`Decision::NotEnoughEvidence`].
    pub fn matches_label(self, label: &str) -> bool {
        let normalized: String = label
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match self {
            Decision::Supported => normalized == "supported",
            Decision::Refuted => normalized == "refuted",
            Decision::NotEnoughEvidence => {
                normalized == "notenoughevidence" || normalized == "nei"
            }
        }
    }

    fn from_response(text: &str) -> Option<Decision> {
        if text.contains("Supported") {
            Some(Decision::Supported)
        } else if text.contains("Refuted") {
            Some(Decision::Refuted)
        } else if text.contains("NotEnoughEvidence")
            || text.contains("Not Enough Evidence")
            || text.contains("NEI")
        {
            Some(Decision::NotEnoughEvidence)
        } else {
            None
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Supported => write!(f, "Supported"),
            Decision::Refuted => write!(f, "Refuted"),
            Decision::NotEnoughEvidence => write!(f, "NotEnoughEvidence"),
        }
    }
}

/// Outcome of an attack check between two evidences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackJudgment {
    pub is_attack: bool,
    pub rationale: String,
}

impl AttackJudgment {
    fn no_attack() -> Self {
        Self {
            is_attack: false,
            rationale: String::new(),
        }
    }
}

/// What the verdict chain proposed; the judge's decision rule has the last
/// word on the label.
#[derive(Debug, Clone)]
pub struct VerdictDraft {
    pub decision: Option<Decision>,
    pub reasoning: String,
    pub key_evidence_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Whether the claim's dominant script is Chinese (Han characters outnumber
/// ASCII letters). Drives the verdict reasoning language.
pub fn dominant_script_is_chinese(text: &str) -> bool {
    let han = text
        .chars()
        .filter(|c| ('\u{4e00}'..='\u{9fff}').contains(c))
        .count();
    let latin = text.chars().filter(|c| c.is_ascii_alphabetic()).count();
    han > 0 && han >= latin
}

/// Truncate to at most `max` whitespace-separated words.
fn truncate_words(text: &str, max: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max {
        text.trim().to_string()
    } else {
        words[..max].join(" ")
    }
}

/// Bullet list of up to `max` evidences: `n. [source] content...`.
fn summarize_evidences(evidences: &[&Evidence], max: usize) -> String {
    evidences
        .iter()
        .rev()
        .take(max)
        .rev()
        .enumerate()
        .map(|(i, e)| format!("{}. {}", i + 1, e.summary(150)))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// QueryChain (ProQuery / ConQuery)
// ---------------------------------------------------------------------------

/// Generates search queries for one side of the debate.
pub struct QueryChain {
    backend: Arc<dyn ChatBackend>,
    polarity: Polarity,
}

impl QueryChain {
    pub fn new(backend: Arc<dyn ChatBackend>, polarity: Polarity) -> Self {
        Self { backend, polarity }
    }

    fn system_prompt(&self) -> String {
        let (side, goal) = match self.polarity {
            Polarity::Pro => ("supporting", "support"),
            Polarity::Con => ("refuting", "refute"),
        };
        format!(
            "You are the {side} side of a fact-checking debate. Generate precise \
             web search queries that locate authoritative evidence to {goal} the \
             claim: official statistics, government and academic sources, major \
             news agencies. Never invent URLs; only URLs present in actual search \
             results may be cited later."
        )
    }

    /// Generate 1–2 queries for the given round.
    ///
    /// `opponent_evidences` are the opponent's most recent items (≤3 used);
    /// `prior_queries` is everything already issued by either side.
    pub fn run(
        &self,
        claim: &str,
        round: u32,
        opponent_evidences: &[&Evidence],
        prior_queries: &[String],
    ) -> LlmResult<Vec<String>> {
        let opponent_block = if opponent_evidences.is_empty() {
            String::new()
        } else {
            format!(
                "Opponent's latest evidence:\n{}\n\n",
                summarize_evidences(opponent_evidences, 3)
            )
        };
        let prior_block = if prior_queries.is_empty() {
            String::new()
        } else {
            let listed: Vec<String> =
                prior_queries.iter().rev().take(5).rev().map(|q| format!("- {q}")).collect();
            format!("Queries already issued (avoid repeats):\n{}\n\n", listed.join("\n"))
        };

        let user = format!(
            "Claim: {claim}\n\nRound {round} of the debate.\n\n{opponent_block}{prior_block}\
             Requirements:\n\
             1. Queries must be specific and directly searchable.\n\
             2. Target the opponent's latest evidence where a rebuttal is possible.\n\
             3. Do not repeat an already-issued query or topic.\n\n\
             Write 1 or 2 search queries, one per line, nothing else."
        );

        let request = ChatRequest {
            temperature: 0.7,
            ..ChatRequest::with_prompts(&self.system_prompt(), &user)
        };
        let response = self.backend.chat(&request)?;
        Ok(parse_query_lines(&response))
    }
}

/// Extract query strings from a line-per-query response.
fn parse_query_lines(response: &str) -> Vec<String> {
    response
        .lines()
        .map(|line| RE_LIST_MARKER.replace(line.trim(), "").trim().to_string())
        .filter(|q| q.chars().count() > 5)
        .take(2)
        .collect()
}

// ---------------------------------------------------------------------------
// AttackCheckChain
// ---------------------------------------------------------------------------

const ATTACK_SYSTEM: &str = "\
You are an expert in argumentation analysis. Decide whether Evidence 1 attacks \
Evidence 2. An attack exists when any of the following holds:
1. Direct contradiction of facts, numbers, dates, or events.
2. Authority override: a more credible source invalidates the other.
3. Temporal superiority: newer information supersedes outdated claims.
4. Error identification: one explicitly identifies errors in the other.
5. Scope refinement: specific, complete information renders a general claim unreliable.

Answer on one line in the form: Yes | <reason>  or  No | <reason>. \
Keep the reason under 50 words.";

/// Decides whether one evidence semantically attacks another.
pub struct AttackCheckChain {
    backend: Arc<dyn ChatBackend>,
    log: ChainLog,
}

impl AttackCheckChain {
    pub fn new(backend: Arc<dyn ChatBackend>, log: ChainLog) -> Self {
        Self { backend, log }
    }

    /// Ask whether `attacker` attacks `target`.
    ///
    /// A malformed response parses to the conservative default (no attack).
    pub fn run(
        &self,
        claim: Option<&str>,
        attacker: &Evidence,
        target: &Evidence,
    ) -> LlmResult<AttackJudgment> {
        let claim_block = claim.map(|c| format!("Claim under debate: {c}\n\n")).unwrap_or_default();
        let user = format!(
            "{claim_block}\
             Evidence 1 (retrieved by: {}, credibility: {}, priority: {:.2}):\n\
             Source: {}\nContent: {}\n\n\
             Evidence 2 (retrieved by: {}, credibility: {}, priority: {:.2}):\n\
             Source: {}\nContent: {}\n\n\
             Does Evidence 1 attack Evidence 2?",
            attacker.retrieved_by,
            attacker.credibility,
            attacker.priority(),
            attacker.source,
            truncate_words(&attacker.content, 120),
            target.retrieved_by,
            target.credibility,
            target.priority(),
            target.source,
            truncate_words(&target.content, 120),
        );

        let request = ChatRequest {
            temperature: 0.3,
            ..ChatRequest::with_prompts(ATTACK_SYSTEM, &user)
        };
        let response = self.backend.chat(&request)?;
        match parse_attack_response(&response) {
            Some(judgment) => Ok(judgment),
            None => {
                warn!(response = %truncate_words(&response, 30), "unparseable attack check, defaulting to no attack");
                self.log
                    .record(format!("attack check parse failure: {}", truncate_words(&response, 60)));
                Ok(AttackJudgment::no_attack())
            }
        }
    }
}

fn parse_attack_response(response: &str) -> Option<AttackJudgment> {
    let Some((decision, rationale)) = response.split_once('|') else {
        // No separator: accept only an unambiguous leading yes or no.
        let head: String = response.trim().chars().take(10).collect::<String>().to_lowercase();
        if head.starts_with("yes") {
            return Some(AttackJudgment {
                is_attack: true,
                rationale: truncate_words(response, 50),
            });
        }
        if head.starts_with("no") {
            return Some(AttackJudgment::no_attack());
        }
        return None;
    };

    let is_attack = decision.trim().to_lowercase().starts_with("yes");
    Some(AttackJudgment {
        is_attack,
        rationale: truncate_words(rationale, 50),
    })
}

// ---------------------------------------------------------------------------
// StanceChain
// ---------------------------------------------------------------------------

const STANCE_SYSTEM: &str = "\
You are an impartial fact-checking expert. Judge whether the evidence \
supports or refutes the given claim. Answer exactly one word: \
support, refute, or neutral.";

/// Classifies one evidence's stance toward the claim.
pub struct StanceChain {
    backend: Arc<dyn ChatBackend>,
    log: ChainLog,
}

impl StanceChain {
    pub fn new(backend: Arc<dyn ChatBackend>, log: ChainLog) -> Self {
        Self { backend, log }
    }

    /// Classify `evidence` against `claim`. Unrecognized responses parse to
    /// the conservative default, [`Stance::Neutral`].
    pub fn run(&self, claim: &str, evidence: &Evidence) -> LlmResult<Stance> {
        let user = format!(
            "Claim: {claim}\n\nEvidence source: {}\nEvidence content: {}\n\n\
             Does this evidence support, refute, or stay neutral on the claim?\n\
             One word only: support / refute / neutral",
            evidence.source,
            truncate_words(&evidence.content, 200),
        );

        let request = ChatRequest {
            temperature: 0.3,
            ..ChatRequest::with_prompts(STANCE_SYSTEM, &user)
        };
        let response = self.backend.chat(&request)?;
        match parse_stance_response(&response) {
            Some(stance) => Ok(stance),
            None => {
                warn!(response = %truncate_words(&response, 30), "unparseable stance, defaulting to neutral");
                self.log
                    .record(format!("stance parse failure: {}", truncate_words(&response, 60)));
                Ok(Stance::Neutral)
            }
        }
    }
}

fn parse_stance_response(response: &str) -> Option<Stance> {
    let lowered = response.trim().to_lowercase();
    if lowered.contains("support") {
        Some(Stance::Support)
    } else if lowered.contains("refute") {
        Some(Stance::Refute)
    } else if lowered.contains("neutral") {
        Some(Stance::Neutral)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// VerdictChain
// ---------------------------------------------------------------------------

const VERDICT_SYSTEM: &str = "\
You are an impartial fact-checking judge. Weigh the accepted evidence on both \
sides and explain the outcome: which sources were considered, why some carry \
more authority, and how the attack relations shaped the result. Cite only the \
listed evidence; never invent URLs or sources.

Answer in the format:
Decision: Supported | Refuted | NotEnoughEvidence
Key evidence: <comma-separated evidence ids, at most 3>
Reasoning: <a flowing explanation of at most 300 words>";

/// Produces the natural-language verdict reasoning.
pub struct VerdictChain {
    backend: Arc<dyn ChatBackend>,
    log: ChainLog,
}

impl VerdictChain {
    pub fn new(backend: Arc<dyn ChatBackend>, log: ChainLog) -> Self {
        Self { backend, log }
    }

    /// Draft a verdict from the stance-partitioned accepted evidence.
    pub fn run(
        &self,
        claim: &str,
        supporting: &[&Evidence],
        refuting: &[&Evidence],
        support_strength: f64,
        refute_strength: f64,
    ) -> LlmResult<VerdictDraft> {
        let support_block = if supporting.is_empty() {
            "none".to_string()
        } else {
            summarize_evidences(supporting, 3)
        };
        let refute_block = if refuting.is_empty() {
            "none".to_string()
        } else {
            summarize_evidences(refuting, 3)
        };

        let language_note = if dominant_script_is_chinese(claim) {
            "\n\nWrite the reasoning in Chinese."
        } else {
            ""
        };

        let user = format!(
            "Claim: {claim}\n\n\
             Supporting evidence (strength {support_strength:.2}):\n{support_block}\n\n\
             Refuting evidence (strength {refute_strength:.2}):\n{refute_block}\n\n\
             Produce the verdict.{language_note}"
        );

        let request = ChatRequest {
            temperature: 0.5,
            ..ChatRequest::with_prompts(VERDICT_SYSTEM, &user)
        };
        let response = self.backend.chat(&request)?;
        match parse_verdict_response(&response) {
            Some(draft) => Ok(draft),
            None => {
                warn!(
                    response = %truncate_words(&response, 30),
                    "unparseable verdict, conservative default"
                );
                self.log
                    .record(format!("verdict parse failure: {}", truncate_words(&response, 60)));
                Ok(VerdictDraft {
                    decision: Some(Decision::NotEnoughEvidence),
                    reasoning: truncate_words(&response, 300),
                    key_evidence_ids: Vec::new(),
                })
            }
        }
    }
}

/// `None` when neither a `Decision:` nor a `Reasoning:` line is present.
fn parse_verdict_response(response: &str) -> Option<VerdictDraft> {
    let mut decision = None;
    let mut key_ids = Vec::new();
    let mut reasoning_lines = Vec::new();
    let mut in_reasoning = false;

    for line in response.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("Decision:") {
            decision = Decision::from_response(rest);
            in_reasoning = false;
        } else if let Some(rest) = trimmed.strip_prefix("Key evidence:") {
            key_ids = rest
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty() && *s != "none")
                .take(3)
                .collect();
            in_reasoning = false;
        } else if let Some(rest) = trimmed.strip_prefix("Reasoning:") {
            reasoning_lines.push(rest.trim().to_string());
            in_reasoning = true;
        } else if in_reasoning && !trimmed.is_empty() {
            reasoning_lines.push(trimmed.to_string());
        }
    }

    if decision.is_none() && reasoning_lines.is_empty() {
        return None;
    }

    let reasoning = if reasoning_lines.is_empty() {
        truncate_words(response, 300)
    } else {
        truncate_words(&reasoning_lines.join(" "), 300)
    };

    Some(VerdictDraft {
        decision,
        reasoning,
        key_evidence_ids: key_ids,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
