use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::identity::{Actor, PersonId};

/// Created/updated stamp embedded in every aggregate. `version` increments
/// on each mutation and backs optimistic concurrency at the stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: PersonId,
    pub version: u64,
}

impl AuditStamp {
    pub fn new(actor: &Actor, at: DateTime<Utc>) -> Self {
        Self {
            created_at: at,
            updated_at: at,
            updated_by: actor.person.clone(),
            version: 1,
        }
    }

    /// Copy with the next version. Every domain mutation goes through this.
    pub fn bumped(&self, actor: &Actor, at: DateTime<Utc>) -> Self {
        Self {
            created_at: self.created_at,
            updated_at: at,
            updated_by: actor.person.clone(),
            version: self.version + 1,
        }
    }
}

/// Aggregates the audit trail distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    OwnershipClaim,
    PotentialMatch,
    DispatchRequest,
    OnCallRotation,
    Escalation,
}

/// Closed vocabulary of auditable actions. Compliance tooling keys off
/// these names, so new variants are additions, never renames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    OwnershipClaimSubmitted,
    EvidenceRecorded,
    EvidenceVerified,
    ClaimChipVerificationRecorded,
    ClaimDisputeRaised,
    CompetingClaimsFlagged,
    SuspectedFraudFlagged,
    OwnershipClaimReviewed,
    ReleaseGateEvaluated,
    OwnershipClaimVerified,
    OwnershipClaimRejected,
    OwnershipClaimWithdrawn,
    ReleaseClearanceApproved,
    ReleaseHoldCleared,
    ReleaseHoldDenied,
    BreakGlassReleaseInvoked,
    PotentialMatchCreated,
    MatchAnalysisRecorded,
    MatchGateEvaluated,
    MatchHumanReviewRecorded,
    MatchChipVerificationRecorded,
    OwnerNotificationRecorded,
    ReunificationProgressRecorded,
    PotentialMatchRejected,
    PotentialMatchExpired,
    DispatchCreated,
    DispatchCandidatesRanked,
    DispatchAssigned,
    DispatchAccepted,
    DispatchDeclined,
    DispatchStatusChanged,
    DispatchCompleted,
    DispatchCancelled,
    DispatchFailed,
    OnCallRotationRegistered,
    FieldOperationEscalated,
    EscalationResponseRecorded,
    EscalationTierAdvanced,
    EscalationAcknowledged,
    EscalationResolved,
    EscalationFailed,
}

/// Append-only audit record shared by every engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub aggregate: AggregateKind,
    pub aggregate_id: String,
    pub kind: AuditEventKind,
    /// Aggregate version after the action; unchanged for pure evaluations.
    pub version: u64,
    pub recorded_at: DateTime<Utc>,
    pub actor: Actor,
    pub correlation_id: Option<String>,
    pub payload: Value,
}

/// Outbound audit hook. Implementations must preserve append order; the
/// services treat a sink failure as a failed operation.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}
