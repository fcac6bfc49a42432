//! Volunteer dispatch matching and lifecycle.
//!
//! Requests carry hard requirements and a ranked candidate list; the
//! matcher filters before it scores, so nobody unqualified ever appears
//! in the ranking. The lifecycle is an explicit state machine with a
//! conditional volunteer reservation guaranteeing at most one active
//! assignment per volunteer.

pub mod domain;
pub mod lifecycle;
pub mod matcher;
pub mod repository;
pub mod service;

#[cfg(test)]
mod tests;
