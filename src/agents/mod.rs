//! Debate controllers: the two retrieval debaters and the judge.
//!
//! Debaters generate search queries conditioned on the opponent's latest
//! evidence; the judge runs the solver over the final graph and derives the
//! verdict. All controllers hold read-only views; the orchestrator owns
//! every write to the pool and graph.

pub mod debater;
pub mod judge;

pub use debater::Debater;
pub use judge::{Judge, Verdict};
