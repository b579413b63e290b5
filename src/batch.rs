//! Batch driver: sequential dataset runs with resumable progress.
//!
//! Claims are processed strictly one at a time to bound external API spend.
//! After every claim the driver rewrites `results.json` and
//! `progress.json`, and writes one full per-claim log under `logs/`; a
//! restart resumes from the recorded indices and never touches logs already
//! written. An unreadable progress file downgrades to "no progress" with a
//! warning rather than blocking the run.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::ConfigError;
use crate::error::ElenchusResult;
use crate::orchestrator::Orchestrator;

/// Errors from the batch driver.
#[derive(Debug, Error, Diagnostic)]
pub enum BatchError {
    #[error("failed to read dataset: {path}")]
    #[diagnostic(
        code(elenchus::batch::dataset_read),
        help("Check that the dataset file exists and is readable.")
    )]
    DatasetRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse dataset: {path}")]
    #[diagnostic(
        code(elenchus::batch::dataset_parse),
        help("The dataset must be a JSON array of objects with a \"claim\" field.")
    )]
    DatasetParse { path: String, message: String },

    #[error("failed to write {path}")]
    #[diagnostic(
        code(elenchus::batch::output_io),
        help("Check write permissions and free space in the output directory.")
    )]
    OutputIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type BatchResult<T> = std::result::Result<T, BatchError>;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One dataset entry. Only `claim` is required; the rest is carried through
/// to logs when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub claim: String,
    /// Ground-truth label, when the dataset has one.
    #[serde(default)]
    pub verdict: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub justification: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
}

/// The resumable progress record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Progress {
    pub processed_indices: Vec<usize>,
    pub total: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

/// One row of `results.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEntry {
    pub index: usize,
    pub claim: String,
    pub predicted: Option<String>,
    pub ground_truth: Option<String>,
    pub confidence: Option<f64>,
    pub correct: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate accuracy over a finished (or partial) batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub processed: usize,
    pub failed: usize,
    pub results: Vec<ResultEntry>,
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Runs a dataset through the orchestrator, claim by claim.
pub struct BatchDriver {
    orchestrator: Orchestrator,
    dataset_path: PathBuf,
    output_dir: PathBuf,
}

impl BatchDriver {
    /// Build from the orchestrator's config; `dataset_path` and
    /// `output_dir` must be set there.
    pub fn new(orchestrator: Orchestrator) -> ElenchusResult<Self> {
        let config = orchestrator.config();
        let dataset_path =
            config
                .dataset_path
                .clone()
                .ok_or_else(|| ConfigError::InvalidOption {
                    option: "dataset_path".into(),
                    message: "required in batch mode".into(),
                })?;
        let output_dir = config
            .output_dir
            .clone()
            .ok_or_else(|| ConfigError::InvalidOption {
                option: "output_dir".into(),
                message: "required in batch mode".into(),
            })?;
        Ok(Self {
            orchestrator,
            dataset_path,
            output_dir,
        })
    }

    /// Process the dataset sequentially, resuming from recorded progress.
    pub fn run(&self) -> ElenchusResult<BatchStats> {
        let dataset = self.load_dataset()?;
        let config = self.orchestrator.config();

        let logs_dir = self.output_dir.join("logs");
        std::fs::create_dir_all(&logs_dir).map_err(|source| BatchError::OutputIo {
            path: logs_dir.display().to_string(),
            source,
        })?;

        let progress_path = self.output_dir.join("progress.json");
        let results_path = self.output_dir.join("results.json");

        let mut processed: BTreeSet<usize> = load_progress(&progress_path)
            .processed_indices
            .into_iter()
            .collect();
        let mut results = load_results(&results_path);
        if !processed.is_empty() {
            info!(done = processed.len(), total = dataset.len(), "resuming batch");
        }

        for (index, record) in dataset.iter().enumerate() {
            if index < config.start_index || processed.contains(&index) {
                continue;
            }
            info!(index, total = dataset.len(), claim = %record.claim, "processing claim");

            match self.orchestrator.check_claim(&record.claim) {
                Ok(mut outcome) => {
                    outcome.ground_truth = record.verdict.clone();

                    let log_path = logs_dir.join(format!("log_{:03}.json", index + 1));
                    write_json(&log_path, &outcome)?;

                    let predicted = outcome.verdict.decision;
                    results.push(ResultEntry {
                        index,
                        claim: record.claim.clone(),
                        predicted: Some(predicted.to_string()),
                        ground_truth: record.verdict.clone(),
                        confidence: Some(outcome.verdict.confidence),
                        correct: record.verdict.as_deref().map(|gt| predicted.matches_label(gt)),
                        error: None,
                    });
                }
                Err(e) => {
                    error!(index, error = %e, "claim failed, continuing");
                    results.push(ResultEntry {
                        index,
                        claim: record.claim.clone(),
                        predicted: None,
                        ground_truth: record.verdict.clone(),
                        confidence: None,
                        correct: None,
                        error: Some(e.to_string()),
                    });
                }
            }

            write_json(&results_path, &results)?;

            processed.insert(index);
            let progress = Progress {
                processed_indices: processed.iter().copied().collect(),
                total: dataset.len(),
                last_updated: Some(Utc::now()),
            };
            write_json(&progress_path, &progress)?;
        }

        let stats = compute_stats(&results, processed.len());
        write_json(&self.output_dir.join("results_stats.json"), &stats)?;
        info!(
            total = stats.total,
            correct = stats.correct,
            accuracy = stats.accuracy,
            "batch complete"
        );
        Ok(stats)
    }

    fn load_dataset(&self) -> BatchResult<Vec<ClaimRecord>> {
        let text =
            std::fs::read_to_string(&self.dataset_path).map_err(|source| BatchError::DatasetRead {
                path: self.dataset_path.display().to_string(),
                source,
            })?;
        let mut dataset: Vec<ClaimRecord> =
            serde_json::from_str(&text).map_err(|e| BatchError::DatasetParse {
                path: self.dataset_path.display().to_string(),
                message: e.to_string(),
            })?;
        if let Some(max) = self.orchestrator.config().max_samples {
            dataset.truncate(max);
        }
        Ok(dataset)
    }
}

// ---------------------------------------------------------------------------
// Persistence helpers
// ---------------------------------------------------------------------------

/// Read progress; anything unreadable counts as no progress.
fn load_progress(path: &Path) -> Progress {
    match std::fs::read_to_string(path) {
        Ok(text) => match serde_json::from_str(&text) {
            Ok(progress) => progress,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt progress file, starting fresh");
                Progress::default()
            }
        },
        Err(_) => Progress::default(),
    }
}

/// Read prior results; anything unreadable counts as none.
fn load_results(path: &Path) -> Vec<ResultEntry> {
    match std::fs::read_to_string(path) {
        Ok(text) => match serde_json::from_str(&text) {
            Ok(results) => results,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt results file, starting fresh");
                Vec::new()
            }
        },
        Err(_) => Vec::new(),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> BatchResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| BatchError::OutputIo {
        path: path.display().to_string(),
        source: std::io::Error::other(e),
    })?;
    std::fs::write(path, json).map_err(|source| BatchError::OutputIo {
        path: path.display().to_string(),
        source,
    })
}

fn compute_stats(results: &[ResultEntry], processed: usize) -> BatchStats {
    let scored: Vec<&ResultEntry> = results
        .iter()
        .filter(|r| r.predicted.is_some() && r.correct.is_some())
        .collect();
    let total = scored.len();
    let correct = scored.iter().filter(|r| r.correct == Some(true)).count();
    let failed = results.iter().filter(|r| r.predicted.is_none()).count();
    BatchStats {
        total,
        correct,
        accuracy: if total > 0 { correct as f64 / total as f64 } else { 0.0 },
        processed,
        failed,
        results: results.to_vec(),
    }
}
