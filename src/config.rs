//! Run configuration: every knob of a debate run in one explicit struct.
//!
//! The orchestrator takes a [`DebateConfig`] at construction; nothing reads
//! environment variables or global state. Config files are TOML with serde
//! defaults, so a partial file overrides only the listed options. CLI flags
//! override file values in `main`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from configuration loading and validation.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file: {path}")]
    #[diagnostic(
        code(elenchus::config::read),
        help("Check that the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {path}")]
    #[diagnostic(
        code(elenchus::config::parse),
        help("Check the TOML syntax; see DebateConfig for recognized options.")
    )]
    Parse { path: String, message: String },

    #[error("invalid option {option}: {message}")]
    #[diagnostic(
        code(elenchus::config::invalid_option),
        help("Adjust the option to a value in its documented range.")
    )]
    InvalidOption { option: String, message: String },

    #[error("unknown attack mode: \"{value}\"")]
    #[diagnostic(
        code(elenchus::config::attack_mode),
        help("Valid modes are \"strict\" and \"relaxed\".")
    )]
    UnknownAttackMode { value: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// AttackMode
// ---------------------------------------------------------------------------

/// Margin below which a relaxed-mode rebuttal still counts as an attack.
pub const RELAXED_MARGIN: f64 = 0.15;

/// Which priority relation validates an attack edge.
///
/// Chosen once at configuration time and applied consistently to every edge
/// for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttackMode {
    /// Attacker must strictly outrank the target: `d > ε`.
    Strict,
    /// Rebuttals may attack near-peers: `d ≥ −0.15`.
    Relaxed,
}

impl AttackMode {
    /// Whether a priority difference `d = priority(attacker) − priority(target)`
    /// permits an attack under this mode.
    pub fn permits(self, diff: f64, epsilon: f64) -> bool {
        match self {
            AttackMode::Strict => diff > epsilon,
            AttackMode::Relaxed => diff >= -RELAXED_MARGIN,
        }
    }

    /// Strength assigned to a permitted edge with priority difference `diff`.
    /// Stays in `(0, 1]`.
    pub fn edge_strength(self, diff: f64) -> f64 {
        match self {
            AttackMode::Strict => diff.min(1.0),
            AttackMode::Relaxed => (diff + 0.2).clamp(0.1, 1.0),
        }
    }

    /// Parse a CLI/TOML value.
    pub fn parse(value: &str) -> ConfigResult<AttackMode> {
        match value.to_ascii_lowercase().as_str() {
            "strict" => Ok(AttackMode::Strict),
            "relaxed" => Ok(AttackMode::Relaxed),
            _ => Err(ConfigError::UnknownAttackMode {
                value: value.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for AttackMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttackMode::Strict => write!(f, "strict"),
            AttackMode::Relaxed => write!(f, "relaxed"),
        }
    }
}

// ---------------------------------------------------------------------------
// DebateConfig
// ---------------------------------------------------------------------------

/// All recognized options for one debate run (and batch driver).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateConfig {
    /// Number of debate rounds, ≥ 1.
    pub max_rounds: u32,
    /// Search results kept per query, ≥ 1.
    pub search_top_k: usize,
    /// Host suffixes treated as `High` credibility.
    pub credibility_whitelist: Vec<String>,
    /// Strict-mode attack threshold ε.
    pub priority_epsilon: f64,
    /// Priority relation used to validate attack edges.
    pub attack_mode: AttackMode,
    /// Per-call LLM timeout, seconds.
    pub llm_timeout_s: u64,
    /// Per-call search timeout, seconds.
    pub search_timeout_s: u64,
    /// Hard per-claim deadline, seconds (fractional allowed).
    pub claim_deadline_s: f64,
    /// Fan-out cap for concurrent searches within a round.
    pub concurrent_searches: usize,
    /// Maximum evidences retained per claim run.
    pub max_pool_size: usize,
    /// Retry cap for rate-limited LLM/search calls.
    pub max_retries: u32,

    /// Batch mode: dataset JSON path.
    pub dataset_path: Option<PathBuf>,
    /// Batch mode: output directory.
    pub output_dir: Option<PathBuf>,
    /// Batch mode: cap on claims processed.
    pub max_samples: Option<usize>,
    /// Batch mode: first dataset index to process.
    pub start_index: usize,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            search_top_k: 5,
            credibility_whitelist: vec![
                "reuters.com".to_string(),
                "bbc.com".to_string(),
                "apnews.com".to_string(),
            ],
            priority_epsilon: 0.05,
            attack_mode: AttackMode::Strict,
            llm_timeout_s: 60,
            search_timeout_s: 30,
            claim_deadline_s: 600.0,
            concurrent_searches: 4,
            max_pool_size: 100,
            max_retries: 3,
            dataset_path: None,
            output_dir: None,
            max_samples: None,
            start_index: 0,
        }
    }
}

impl DebateConfig {
    /// Load a config from a TOML file; unlisted options keep their defaults.
    pub fn from_toml_file(path: &Path) -> ConfigResult<DebateConfig> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: DebateConfig = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check option ranges; called after any load or override.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_rounds < 1 {
            return Err(ConfigError::InvalidOption {
                option: "max_rounds".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.search_top_k < 1 {
            return Err(ConfigError::InvalidOption {
                option: "search_top_k".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.concurrent_searches < 1 {
            return Err(ConfigError::InvalidOption {
                option: "concurrent_searches".into(),
                message: "must be at least 1".into(),
            });
        }
        if !(self.claim_deadline_s > 0.0) {
            return Err(ConfigError::InvalidOption {
                option: "claim_deadline_s".into(),
                message: "must be positive".into(),
            });
        }
        if self.priority_epsilon < 0.0 {
            return Err(ConfigError::InvalidOption {
                option: "priority_epsilon".into(),
                message: "must be non-negative".into(),
            });
        }
        Ok(())
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_s)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_s)
    }

    pub fn claim_deadline(&self) -> Duration {
        Duration::from_secs_f64(self.claim_deadline_s)
    }
}
