use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Identifier wrapper for rescue cases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaseId(pub String);

/// Identifier wrapper for ownership claims.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimId(pub String);

/// Identifier wrapper for individual evidence items.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvidenceId(pub String);

/// Identifier wrapper for people: claimants, moderators, responders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersonId(pub String);

/// Identifier wrapper for potential lost/found matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchId(pub String);

/// Identifier wrapper for lost-animal reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LostReportId(pub String);

/// Identifier wrapper for found reports and sightings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FoundReportId(pub String);

/// Identifier wrapper for dispatch requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DispatchId(pub String);

/// Identifier wrapper for volunteer dispatch profiles. Ordered so searches
/// can carry preferred volunteers in a sorted set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VolunteerId(pub String);

/// Identifier wrapper for on-call rotations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RotationId(pub String);

/// Identifier wrapper for escalations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EscalationId(pub String);

/// Operational roles, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    FieldVolunteer,
    Coordinator,
    Moderator,
    LeadModerator,
    Admin,
}

impl ActorRole {
    pub const fn label(self) -> &'static str {
        match self {
            ActorRole::FieldVolunteer => "field_volunteer",
            ActorRole::Coordinator => "coordinator",
            ActorRole::Moderator => "moderator",
            ActorRole::LeadModerator => "lead_moderator",
            ActorRole::Admin => "admin",
        }
    }

    /// Canonical numeric ranking. Every gate in the crate compares against
    /// this single function; no gate keeps its own level table.
    pub const fn rank(self) -> u8 {
        match self {
            ActorRole::FieldVolunteer => 0,
            ActorRole::Coordinator => 1,
            ActorRole::Moderator => 2,
            ActorRole::LeadModerator => 3,
            ActorRole::Admin => 4,
        }
    }

    pub const fn at_least(self, minimum: ActorRole) -> bool {
        self.rank() >= minimum.rank()
    }
}

/// Acting identity attached to every mutation and audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub person: PersonId,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(person: impl Into<String>, role: ActorRole) -> Self {
        Self {
            person: PersonId(person.into()),
            role,
        }
    }
}

/// Caller identity snapshot supplied by the external role resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssertion {
    pub role: ActorRole,
    pub identity_verified: bool,
}

impl RoleAssertion {
    /// Effective rank for precision ladders: verified identities round up
    /// one full tier, capped at admin. Integer arithmetic only; clearance
    /// and approval floors compare `ActorRole::rank` directly and never
    /// take this bump.
    pub fn effective_rank(self) -> u8 {
        let base = self.role.rank();
        if self.identity_verified {
            base.saturating_add(1).min(ActorRole::Admin.rank())
        } else {
            base
        }
    }
}

/// Identifier minting abstraction so services stay reproducible in tests.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self, prefix: &str) -> String;
}

/// Process-local sequential generator producing ids like `claim-000017`.
#[derive(Debug)]
pub struct SequenceIds {
    counter: AtomicU64,
}

impl SequenceIds {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(1),
        }
    }
}

impl Default for SequenceIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequenceIds {
    fn next_id(&self, prefix: &str) -> String {
        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}-{id:06}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ranking_is_strictly_increasing() {
        let ordered = [
            ActorRole::FieldVolunteer,
            ActorRole::Coordinator,
            ActorRole::Moderator,
            ActorRole::LeadModerator,
            ActorRole::Admin,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
        }
        assert!(ActorRole::LeadModerator.at_least(ActorRole::Moderator));
        assert!(!ActorRole::Coordinator.at_least(ActorRole::Moderator));
    }

    #[test]
    fn verified_assertions_round_up_one_full_tier() {
        let unverified = RoleAssertion {
            role: ActorRole::Coordinator,
            identity_verified: false,
        };
        let verified = RoleAssertion {
            role: ActorRole::Coordinator,
            identity_verified: true,
        };
        assert_eq!(unverified.effective_rank(), ActorRole::Coordinator.rank());
        assert_eq!(verified.effective_rank(), ActorRole::Moderator.rank());

        let admin = RoleAssertion {
            role: ActorRole::Admin,
            identity_verified: true,
        };
        assert_eq!(admin.effective_rank(), ActorRole::Admin.rank());
    }

    #[test]
    fn sequence_ids_are_prefixed_and_monotonic() {
        let ids = SequenceIds::new();
        let first = ids.next_id("claim");
        let second = ids.next_id("claim");
        assert_eq!(first, "claim-000001");
        assert_eq!(second, "claim-000002");
    }
}
