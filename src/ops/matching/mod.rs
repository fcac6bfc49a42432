//! Lost/found match confidence gating.
//!
//! Potential matches are born with owner notification blocked. The gate
//! lifts only after an approving human review on a match whose score
//! clears the notification threshold; a chip mismatch overrides every
//! other signal and rejects the match.

pub mod domain;
pub mod gate;
pub mod repository;
pub mod service;

#[cfg(test)]
mod tests;
