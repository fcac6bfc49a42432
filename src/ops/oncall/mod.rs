//! On-call rotations and timed escalation chains.
//!
//! A rotation names the primary, backup, and optional tertiary responder
//! for a coverage window. An escalation walks those tiers strictly in
//! order, each attempt carrying its own response deadline; exhausting the
//! ladder is a terminal failure that demands manual override. The engine
//! only decides; an external poller owns the clock.

pub mod domain;
pub mod engine;
pub mod repository;
pub mod schedule;
pub mod service;

#[cfg(test)]
mod tests;
