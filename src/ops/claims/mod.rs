//! Ownership-claim evidence scoring and release gating.
//!
//! Claims accumulate typed evidence items, score them under a cap-aware
//! rubric, and sit behind a release hold that only clears through the
//! release gate: single approval for strong evidence, two distinct
//! approvers for low-scoring, disputed, contested, or fraud-flagged
//! claims.

pub mod domain;
pub mod gate;
pub mod repository;
pub mod score;
pub mod service;

#[cfg(test)]
mod tests;
