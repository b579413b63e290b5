//! Rich diagnostic error types for the debate engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]`
//! derives (config, llm, search, batch); this module wraps them into the
//! top-level [`ElenchusError`] used at the orchestrator and CLI boundary,
//! preserving the full diagnostic chain (error codes, help text, sources).

use miette::Diagnostic;
use thiserror::Error;

use crate::config::ConfigError;
use crate::llm::LlmError;
use crate::search::SearchError;

/// Top-level error type for the debate engine.
#[derive(Debug, Error, Diagnostic)]
pub enum ElenchusError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Batch(#[from] crate::batch::BatchError),

    #[error("both the LLM and search backends are unusable")]
    #[diagnostic(
        code(elenchus::external_unavailable),
        help(
            "Every LLM and search call failed this claim. Check API keys, \
             endpoints, and network connectivity."
        )
    )]
    ExternalUnavailable,
}

/// Convenience alias for engine operations.
pub type ElenchusResult<T> = std::result::Result<T, ElenchusError>;
