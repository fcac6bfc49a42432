use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ops::audit::AuditStamp;
use crate::ops::identity::{Actor, ActorRole, CaseId, ClaimId, EvidenceId, PersonId};
use crate::ops::scoring::TallyLine;

/// Lifecycle of an ownership claim. `Verified`, `Rejected`, and
/// `Withdrawn` are terminal; a verified claim is only usable for a
/// physical handoff once its release hold has cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Pending,
    UnderReview,
    EvidenceRequested,
    Verified,
    Rejected,
    Disputed,
    Withdrawn,
}

impl ClaimStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::UnderReview => "under_review",
            ClaimStatus::EvidenceRequested => "evidence_requested",
            ClaimStatus::Verified => "verified",
            ClaimStatus::Rejected => "rejected",
            ClaimStatus::Disputed => "disputed",
            ClaimStatus::Withdrawn => "withdrawn",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ClaimStatus::Verified | ClaimStatus::Rejected | ClaimStatus::Withdrawn
        )
    }
}

/// Closed set of ownership proof types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    MicrochipRegistration,
    VetRecords,
    AdoptionPaperwork,
    CityLicense,
    DatedPhoto,
    DistinctiveFeatureDescription,
    WitnessStatement,
}

impl EvidenceKind {
    pub const fn label(self) -> &'static str {
        match self {
            EvidenceKind::MicrochipRegistration => "microchip_registration",
            EvidenceKind::VetRecords => "vet_records",
            EvidenceKind::AdoptionPaperwork => "adoption_paperwork",
            EvidenceKind::CityLicense => "city_license",
            EvidenceKind::DatedPhoto => "dated_photo",
            EvidenceKind::DistinctiveFeatureDescription => "distinctive_feature_description",
            EvidenceKind::WitnessStatement => "witness_statement",
        }
    }
}

/// Verification state of one evidence item. Kinds the policy exempts from
/// verification enter as `Exempt` and count immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceVerification {
    Unverified,
    Verified,
    Exempt,
}

impl EvidenceVerification {
    /// Whether the item counts toward the claim score.
    pub const fn counts(self) -> bool {
        matches!(self, EvidenceVerification::Verified | EvidenceVerification::Exempt)
    }
}

/// A single piece of ownership proof attached to a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: EvidenceId,
    pub claim: ClaimId,
    pub kind: EvidenceKind,
    pub verification: EvidenceVerification,
    /// Raw points granted by the kind at submission time. Policy changes
    /// after submission never retroactively reprice recorded items.
    pub points: u16,
    pub submitted_by: PersonId,
    pub submitted_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Resolved evidence score with its per-item breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceScore {
    pub total: u16,
    pub breakdown: Vec<TallyLine<EvidenceKind>>,
}

impl EvidenceScore {
    pub fn empty() -> Self {
        Self {
            total: 0,
            breakdown: Vec::new(),
        }
    }
}

/// Why a release hold is in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    IntakeVerification,
    ActiveDispute,
    CompetingClaims,
    SuspectedFraud,
}

impl HoldReason {
    pub const fn label(self) -> &'static str {
        match self {
            HoldReason::IntakeVerification => "intake_verification",
            HoldReason::ActiveDispute => "active_dispute",
            HoldReason::CompetingClaims => "competing_claims",
            HoldReason::SuspectedFraud => "suspected_fraud",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    Active,
    Cleared,
    Denied,
}

impl HoldStatus {
    pub const fn label(self) -> &'static str {
        match self {
            HoldStatus::Active => "active",
            HoldStatus::Cleared => "cleared",
            HoldStatus::Denied => "denied",
        }
    }
}

/// Clearance signature recorded on the hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldApproval {
    pub approver: PersonId,
    pub role: ActorRole,
    pub approved_at: DateTime<Utc>,
}

/// How a hold ultimately cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearanceRoute {
    Standard,
    BreakGlass,
}

/// Blocking flag preventing physical handoff of the animal. Fields are
/// private and only the release gate mutates them, so no caller can forge
/// a cleared hold by flipping a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseHold {
    status: HoldStatus,
    reason: HoldReason,
    requires_two_person: bool,
    placed_by: PersonId,
    placed_at: DateTime<Utc>,
    approvals: Vec<HoldApproval>,
    cleared_by: Option<PersonId>,
    cleared_at: Option<DateTime<Utc>>,
    cleared_via: Option<ClearanceRoute>,
    denial_reason: Option<String>,
}

impl ReleaseHold {
    pub(super) fn place(reason: HoldReason, actor: &Actor, at: DateTime<Utc>) -> Self {
        Self {
            status: HoldStatus::Active,
            reason,
            requires_two_person: true,
            placed_by: actor.person.clone(),
            placed_at: at,
            approvals: Vec::new(),
            cleared_by: None,
            cleared_at: None,
            cleared_via: None,
            denial_reason: None,
        }
    }

    pub fn status(&self) -> HoldStatus {
        self.status
    }

    pub fn reason(&self) -> HoldReason {
        self.reason
    }

    pub fn requires_two_person(&self) -> bool {
        self.requires_two_person
    }

    pub fn placed_by(&self) -> &PersonId {
        &self.placed_by
    }

    pub fn placed_at(&self) -> DateTime<Utc> {
        self.placed_at
    }

    pub fn approvals(&self) -> &[HoldApproval] {
        &self.approvals
    }

    pub fn cleared_by(&self) -> Option<&PersonId> {
        self.cleared_by.as_ref()
    }

    pub fn cleared_at(&self) -> Option<DateTime<Utc>> {
        self.cleared_at
    }

    pub fn cleared_via(&self) -> Option<ClearanceRoute> {
        self.cleared_via
    }

    pub fn denial_reason(&self) -> Option<&str> {
        self.denial_reason.as_deref()
    }

    pub(super) fn set_two_person(&mut self, required: bool) {
        self.requires_two_person = required;
    }

    pub(super) fn set_reason(&mut self, reason: HoldReason) {
        self.reason = reason;
    }

    pub(super) fn push_approval(&mut self, approval: HoldApproval) {
        self.approvals.push(approval);
    }

    pub(super) fn mark_cleared(&mut self, by: &PersonId, at: DateTime<Utc>, via: ClearanceRoute) {
        self.status = HoldStatus::Cleared;
        self.cleared_by = Some(by.clone());
        self.cleared_at = Some(at);
        self.cleared_via = Some(via);
    }

    pub(super) fn mark_denied(&mut self, reason: &str) {
        self.status = HoldStatus::Denied;
        self.denial_reason = Some(reason.to_string());
    }
}

/// Open dispute attached to a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisputeRecord {
    pub raised_by: PersonId,
    pub raised_at: DateTime<Utc>,
    pub reason: String,
}

/// Hard identity contradiction. Once recorded, no score and no override
/// can authorize release through this claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContradictionRecord {
    pub kind: ContradictionKind,
    pub noted_by: PersonId,
    pub noted_at: DateTime<Utc>,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionKind {
    SpeciesMismatch,
    ChipRegisteredToAnother,
    DescriptionConflict,
}

impl ContradictionKind {
    pub const fn label(self) -> &'static str {
        match self {
            ContradictionKind::SpeciesMismatch => "species_mismatch",
            ContradictionKind::ChipRegisteredToAnother => "chip_registered_to_another",
            ContradictionKind::DescriptionConflict => "description_conflict",
        }
    }
}

/// Review ruling recorded on a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimDecision {
    pub decided_by: PersonId,
    pub decided_by_role: ActorRole,
    pub decided_at: DateTime<Utc>,
    pub release_authorized: bool,
    pub notes: String,
}

/// Claim-local review trail entry, kept on the aggregate for the case
/// detail view. The audit sink carries the full cross-aggregate trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub kind: ReviewEventKind,
    pub by: PersonId,
    pub at: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewEventKind {
    EvidenceAdded,
    EvidenceVerified,
    ChipVerification,
    DisputeRaised,
    CompetingClaimFlagged,
    ReviewRecorded,
    ClearanceApproval,
    HoldCleared,
    HoldDenied,
    BreakGlass,
    Withdrawal,
}

/// An assertion of ownership over a recovered animal, carrying its
/// evidence, score, and release hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnershipClaim {
    pub id: ClaimId,
    pub case: CaseId,
    pub claimant: PersonId,
    pub status: ClaimStatus,
    pub evidence: Vec<EvidenceItem>,
    pub score: EvidenceScore,
    pub hold: ReleaseHold,
    pub dispute: Option<DisputeRecord>,
    pub competing_claim: bool,
    pub contradiction: Option<ContradictionRecord>,
    pub decision: Option<ClaimDecision>,
    pub review_log: Vec<ReviewEvent>,
    pub audit: AuditStamp,
}

impl OwnershipClaim {
    /// Whether the animal may physically leave through this claim. The
    /// break-glass route clears holds without the verification path, so a
    /// hold cleared that way is usable on its own.
    pub fn is_usable_for_release(&self) -> bool {
        self.hold.status() == HoldStatus::Cleared
            && (self.status == ClaimStatus::Verified
                || self.hold.cleared_via() == Some(ClearanceRoute::BreakGlass))
    }

    pub fn evidence_item(&self, id: &EvidenceId) -> Option<&EvidenceItem> {
        self.evidence.iter().find(|item| &item.id == id)
    }

    pub(super) fn log(&mut self, kind: ReviewEventKind, actor: &Actor, at: DateTime<Utc>, notes: Option<String>) {
        self.review_log.push(ReviewEvent {
            kind,
            by: actor.person.clone(),
            at,
            notes,
        });
    }
}
