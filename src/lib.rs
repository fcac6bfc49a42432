//! Decision-gating core for emergency animal-rescue coordination.
//!
//! Four engines share one discipline: score deterministically, gate
//! behind explicit thresholds and human checkpoints, and record every
//! mutation in an append-only audit trail. Blocked is a decision, not an
//! error; executing a refused action is the hard failure.

pub mod config;
pub mod error;
pub mod ops;
pub mod telemetry;
