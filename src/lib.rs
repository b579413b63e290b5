// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # elenchus
//!
//! Adversarial debate fact-checker: two retrieval agents (Pro and Con)
//! argue a claim over several rounds, a typed attack graph records which
//! evidence defeats which, and a judge derives the verdict from the
//! grounded extension of that graph.
//!
//! ## Architecture
//!
//! - **Evidence** (`evidence`): immutable retrieval records with
//!   credibility/quality/priority scoring and a deduplicated pool
//! - **Argumentation** (`graph`): attack edges gated by a priority
//!   invariant, plus the grounded-extension solver
//! - **Chains** (`llm`): typed prompt chains over a pluggable chat backend
//! - **Retrieval** (`search`): pluggable search backend with hit parsing
//! - **Controllers** (`agents`): symmetric Pro/Con debaters and the judge
//! - **Orchestration** (`orchestrator`, `batch`): round scheduling with
//!   bounded fan-out, deadlines, and a resumable dataset driver
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use elenchus::config::DebateConfig;
//! use elenchus::llm::{DashScopeClient, DashScopeConfig};
//! use elenchus::orchestrator::Orchestrator;
//! use elenchus::search::{JinaClient, JinaConfig};
//!
//! let config = DebateConfig::default();
//! let llm = Arc::new(DashScopeClient::new(DashScopeConfig::default()));
//! let search = Arc::new(JinaClient::new(JinaConfig::default()));
//! let orchestrator = Orchestrator::new(config, llm, search);
//! let outcome = orchestrator.check_claim("The EU bans combustion cars from 2035.").unwrap();
//! println!("{} ({:.2})", outcome.verdict.decision, outcome.verdict.confidence);
//! ```

pub mod agents;
pub mod batch;
pub mod config;
pub mod detect;
pub mod error;
pub mod evidence;
pub mod graph;
pub mod llm;
pub mod orchestrator;
pub mod search;
