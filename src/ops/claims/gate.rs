use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::domain::{
    ClaimDecision, ClaimStatus, ContradictionKind, ContradictionRecord, DisputeRecord,
    EvidenceItem, EvidenceKind, EvidenceScore, EvidenceVerification, HoldApproval, HoldReason,
    HoldStatus, OwnershipClaim, ClearanceRoute, ReleaseHold, ReviewEventKind,
};
use super::score::{calculate_score, EvidencePolicy, ReviewTier};
use crate::ops::audit::AuditStamp;
use crate::ops::identity::{Actor, ActorRole, CaseId, ClaimId, EvidenceId, PersonId};

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("evidence kind {} is not priced by the evidence policy", .0.label())]
    UnpricedEvidenceKind(EvidenceKind),
    #[error("invalid state transition: {0}")]
    InvalidTransition(String),
    #[error("evidence item {0} not found on this claim")]
    EvidenceNotFound(String),
    #[error("approver {0} already signed this clearance")]
    DuplicateApprover(String),
    #[error("clearance not permitted: {0}")]
    ClearanceNotPermitted(String),
    #[error("action requires {} or above", .minimum.label())]
    RoleTooLow { minimum: ActorRole },
    #[error("evidence score {score} is below the {floor}-point review floor")]
    ScoreBelowApprovalFloor { score: u16, floor: u16 },
    #[error("recorded identity contradiction blocks release: {0}")]
    ContradictionBlocksRelease(String),
    #[error("break-glass grant rejected: {0}")]
    BreakGlassRejected(String),
    #[error("validation failed: {0}")]
    Validation(String),
}

/// New evidence offered for a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSubmission {
    pub kind: EvidenceKind,
    pub notes: Option<String>,
}

/// Result of a registry chip scan relayed from the field. A scan is an
/// automated registry lookup, never a substitute for human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChipScanOutcome {
    Confirmed,
    RegisteredToAnother { detail: String },
}

/// Ruling a human reviewer records against a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    AuthorizeRelease,
    RequestMoreEvidence,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRuling {
    pub outcome: ReviewOutcome,
    pub notes: String,
}

/// Outstanding work before a claim can progress, surfaced as data so the
/// caller can tell the claimant exactly what is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredStep {
    VerifyEvidence { evidence: EvidenceId },
    AddEvidencePoints { needed: u16 },
    ModeratorReview,
    LeadReview,
    ResolveDispute,
    ResolveContradiction,
    ClearanceApproval { approvals_needed: u8 },
    ApproverRoleTooLow { minimum: ActorRole },
}

impl RequiredStep {
    pub fn summary(&self) -> String {
        match self {
            RequiredStep::VerifyEvidence { evidence } => {
                format!("verify evidence item {}", evidence.0)
            }
            RequiredStep::AddEvidencePoints { needed } => {
                format!("add {needed} more verified evidence points")
            }
            RequiredStep::ModeratorReview => "record a moderator review".to_string(),
            RequiredStep::LeadReview => "record a lead moderator review".to_string(),
            RequiredStep::ResolveDispute => "resolve the open dispute".to_string(),
            RequiredStep::ResolveContradiction => {
                "resolve the recorded identity contradiction".to_string()
            }
            RequiredStep::ClearanceApproval { approvals_needed } => {
                format!("record {approvals_needed} more clearance approval(s)")
            }
            RequiredStep::ApproverRoleTooLow { minimum } => {
                format!("clearance requires {} or above", minimum.label())
            }
        }
    }
}

/// Pure snapshot of where a claim stands and what remains.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimAssessment {
    pub tier: ReviewTier,
    pub score: u16,
    pub requires_two_person_clearance: bool,
    pub required_actions: Vec<RequiredStep>,
}

/// Decision data for a clearance query. "Not yet allowed" is data here,
/// never an error; executing a clearance this gate refuses is the hard
/// error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClearanceDecision {
    pub allowed: bool,
    pub reason: String,
    pub requires_two_person: bool,
    pub required_actions: Vec<RequiredStep>,
}

/// Time-limited admin authorization for an emergency release. The grantor
/// and the executing actor must be distinct people.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakGlassGrant {
    pub granted_by: PersonId,
    pub granted_role: ActorRole,
    pub reason: String,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Two-person rule: low-scoring, disputed, contested, or fraud-flagged
/// claims need two distinct qualifying approvers before the hold clears.
pub(super) fn two_person_required(policy: &EvidencePolicy, claim: &OwnershipClaim) -> bool {
    claim.score.total < policy.moderator_approval_threshold
        || claim.dispute.is_some()
        || claim.competing_claim
        || claim.hold.reason() == HoldReason::SuspectedFraud
}

fn force_lead_review(claim: &OwnershipClaim) -> bool {
    claim.dispute.is_some() || claim.hold.reason() == HoldReason::SuspectedFraud
}

/// Outstanding steps for a claim, most blocking first.
pub(super) fn required_steps(policy: &EvidencePolicy, claim: &OwnershipClaim) -> Vec<RequiredStep> {
    let mut steps = Vec::new();
    if claim.contradiction.is_some() {
        steps.push(RequiredStep::ResolveContradiction);
        return steps;
    }
    if matches!(claim.status, ClaimStatus::Rejected | ClaimStatus::Withdrawn) {
        return steps;
    }
    if claim.dispute.is_some() {
        steps.push(RequiredStep::ResolveDispute);
    }
    for item in &claim.evidence {
        if item.verification == EvidenceVerification::Unverified {
            steps.push(RequiredStep::VerifyEvidence {
                evidence: item.id.clone(),
            });
        }
    }
    let score = claim.score.total;
    if score < policy.moderator_approval_threshold {
        steps.push(RequiredStep::AddEvidencePoints {
            needed: policy.moderator_approval_threshold - score,
        });
    }
    if claim.status != ClaimStatus::Verified {
        match policy.review_tier(score, force_lead_review(claim)) {
            ReviewTier::AutoVerify | ReviewTier::ModeratorApproval => {
                steps.push(RequiredStep::ModeratorReview)
            }
            ReviewTier::LeadReview => steps.push(RequiredStep::LeadReview),
            ReviewTier::InsufficientEvidence | ReviewTier::Reject => {}
        }
    } else if claim.hold.status() == HoldStatus::Active {
        let quorum: usize = if two_person_required(policy, claim) { 2 } else { 1 };
        let outstanding = quorum.saturating_sub(claim.hold.approvals().len());
        if outstanding > 0 {
            steps.push(RequiredStep::ClearanceApproval {
                approvals_needed: outstanding as u8,
            });
        }
    }
    steps
}

/// Scoring and lifecycle engine for ownership claims. Methods are
/// copy-on-write: they take the stored claim by reference and return the
/// mutated successor, leaving persistence to the caller.
#[derive(Debug, Clone)]
pub struct EvidenceEngine {
    policy: EvidencePolicy,
}

impl EvidenceEngine {
    pub fn new(policy: EvidencePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &EvidencePolicy {
        &self.policy
    }

    /// Open a claim with an active intake hold and an empty evidence set.
    pub fn open_claim(
        &self,
        id: ClaimId,
        case: CaseId,
        claimant: PersonId,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> OwnershipClaim {
        OwnershipClaim {
            id,
            case,
            claimant,
            status: ClaimStatus::Pending,
            evidence: Vec::new(),
            score: EvidenceScore::empty(),
            hold: ReleaseHold::place(HoldReason::IntakeVerification, actor, now),
            dispute: None,
            competing_claim: false,
            contradiction: None,
            decision: None,
            review_log: Vec::new(),
            audit: AuditStamp::new(actor, now),
        }
    }

    fn guard_open(&self, claim: &OwnershipClaim) -> Result<(), ClaimError> {
        if claim.status.is_terminal() {
            return Err(ClaimError::InvalidTransition(format!(
                "claim is {} and no longer accepts this action",
                claim.status.label()
            )));
        }
        Ok(())
    }

    fn refresh_two_person(&self, claim: &mut OwnershipClaim) {
        let required = two_person_required(&self.policy, claim);
        claim.hold.set_two_person(required);
    }

    /// Recompute the score and apply the one automatic transition: claims
    /// at or above the auto-verify threshold verify without human review,
    /// unless disputed, fraud-flagged, or contradicted.
    fn rescore(&self, claim: &mut OwnershipClaim, actor: &Actor, now: DateTime<Utc>) {
        claim.score = calculate_score(&claim.evidence, &self.policy);
        if claim.contradiction.is_none()
            && !claim.status.is_terminal()
            && claim.status != ClaimStatus::Disputed
            && !force_lead_review(claim)
            && self.policy.review_tier(claim.score.total, false) == ReviewTier::AutoVerify
        {
            claim.status = ClaimStatus::Verified;
            claim.decision = Some(ClaimDecision {
                decided_by: actor.person.clone(),
                decided_by_role: actor.role,
                decided_at: now,
                release_authorized: true,
                notes: format!("auto-verified at {} evidence points", claim.score.total),
            });
        }
    }

    /// Append an evidence item and rescore. The item enters unverified
    /// unless the policy exempts its kind from verification; kinds the
    /// policy does not price are rejected outright.
    pub fn add_evidence(
        &self,
        claim: &OwnershipClaim,
        id: EvidenceId,
        submission: EvidenceSubmission,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<OwnershipClaim, ClaimError> {
        self.guard_open(claim)?;
        let value = self
            .policy
            .value_for(submission.kind)
            .ok_or(ClaimError::UnpricedEvidenceKind(submission.kind))?;

        let mut next = claim.clone();
        let verification = if value.requires_verification {
            EvidenceVerification::Unverified
        } else {
            EvidenceVerification::Exempt
        };
        next.evidence.push(EvidenceItem {
            id,
            claim: claim.id.clone(),
            kind: submission.kind,
            verification,
            points: value.points,
            submitted_by: actor.person.clone(),
            submitted_at: now,
            notes: submission.notes,
        });
        if matches!(
            next.status,
            ClaimStatus::Pending | ClaimStatus::EvidenceRequested
        ) {
            next.status = ClaimStatus::UnderReview;
        }
        next.log(
            ReviewEventKind::EvidenceAdded,
            actor,
            now,
            Some(format!("{} ({} pts)", submission.kind.label(), value.points)),
        );
        self.rescore(&mut next, actor, now);
        self.refresh_two_person(&mut next);
        next.audit = claim.audit.bumped(actor, now);
        Ok(next)
    }

    /// Mark an evidence item verified and rescore.
    pub fn verify_evidence(
        &self,
        claim: &OwnershipClaim,
        evidence: &EvidenceId,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<OwnershipClaim, ClaimError> {
        self.guard_open(claim)?;
        if !actor.role.at_least(ActorRole::Moderator) {
            return Err(ClaimError::RoleTooLow {
                minimum: ActorRole::Moderator,
            });
        }

        let mut next = claim.clone();
        let kind = {
            let item = next
                .evidence
                .iter_mut()
                .find(|item| &item.id == evidence)
                .ok_or_else(|| ClaimError::EvidenceNotFound(evidence.0.clone()))?;
            match item.verification {
                EvidenceVerification::Unverified => item.verification = EvidenceVerification::Verified,
                EvidenceVerification::Verified => {
                    return Err(ClaimError::InvalidTransition(
                        "evidence item is already verified".to_string(),
                    ))
                }
                EvidenceVerification::Exempt => {
                    return Err(ClaimError::InvalidTransition(
                        "evidence kind does not take verification".to_string(),
                    ))
                }
            }
            item.kind
        };
        next.log(
            ReviewEventKind::EvidenceVerified,
            actor,
            now,
            Some(kind.label().to_string()),
        );
        self.rescore(&mut next, actor, now);
        self.refresh_two_person(&mut next);
        next.audit = claim.audit.bumped(actor, now);
        Ok(next)
    }

    /// Registry scan outcome for the claim's chip evidence. Confirmation
    /// verifies the chip item; a mismatch records a contradiction, denies
    /// the hold, and rejects the claim outright.
    pub fn record_chip_verification(
        &self,
        claim: &OwnershipClaim,
        outcome: ChipScanOutcome,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<OwnershipClaim, ClaimError> {
        self.guard_open(claim)?;
        let mut next = claim.clone();
        match outcome {
            ChipScanOutcome::Confirmed => {
                let item = next
                    .evidence
                    .iter_mut()
                    .find(|item| item.kind == EvidenceKind::MicrochipRegistration)
                    .ok_or_else(|| {
                        ClaimError::Validation(
                            "claim has no microchip registration evidence".to_string(),
                        )
                    })?;
                item.verification = EvidenceVerification::Verified;
                next.log(
                    ReviewEventKind::ChipVerification,
                    actor,
                    now,
                    Some("registry confirmed claimant".to_string()),
                );
                self.rescore(&mut next, actor, now);
            }
            ChipScanOutcome::RegisteredToAnother { detail } => {
                next.contradiction = Some(ContradictionRecord {
                    kind: ContradictionKind::ChipRegisteredToAnother,
                    noted_by: actor.person.clone(),
                    noted_at: now,
                    detail: detail.clone(),
                });
                next.status = ClaimStatus::Rejected;
                next.hold.mark_denied("chip registered to another owner");
                next.decision = Some(ClaimDecision {
                    decided_by: actor.person.clone(),
                    decided_by_role: actor.role,
                    decided_at: now,
                    release_authorized: false,
                    notes: "registry contradiction".to_string(),
                });
                next.log(ReviewEventKind::ChipVerification, actor, now, Some(detail));
            }
        }
        self.refresh_two_person(&mut next);
        next.audit = claim.audit.bumped(actor, now);
        Ok(next)
    }

    /// Open a dispute. A verified claim keeps its verification but its
    /// hold turns two-person; an unverified claim moves to disputed and
    /// its review escalates to a lead moderator.
    pub fn raise_dispute(
        &self,
        claim: &OwnershipClaim,
        reason: &str,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<OwnershipClaim, ClaimError> {
        if matches!(claim.status, ClaimStatus::Rejected | ClaimStatus::Withdrawn) {
            return Err(ClaimError::InvalidTransition(format!(
                "claim is {} and cannot be disputed",
                claim.status.label()
            )));
        }
        if claim.dispute.is_some() {
            return Err(ClaimError::Validation("a dispute is already open".to_string()));
        }
        if reason.trim().is_empty() {
            return Err(ClaimError::Validation(
                "dispute reason must not be empty".to_string(),
            ));
        }

        let mut next = claim.clone();
        next.dispute = Some(DisputeRecord {
            raised_by: actor.person.clone(),
            raised_at: now,
            reason: reason.to_string(),
        });
        if next.status != ClaimStatus::Verified {
            next.status = ClaimStatus::Disputed;
        }
        if next.hold.status() == HoldStatus::Active
            && next.hold.reason() != HoldReason::SuspectedFraud
        {
            next.hold.set_reason(HoldReason::ActiveDispute);
        }
        next.log(
            ReviewEventKind::DisputeRaised,
            actor,
            now,
            Some(reason.to_string()),
        );
        self.refresh_two_person(&mut next);
        next.audit = claim.audit.bumped(actor, now);
        Ok(next)
    }

    /// Flag a claim as suspected fraud. Forces lead review and two-person
    /// clearance until resolved by review.
    pub fn flag_suspected_fraud(
        &self,
        claim: &OwnershipClaim,
        detail: &str,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<OwnershipClaim, ClaimError> {
        self.guard_open(claim)?;
        if !actor.role.at_least(ActorRole::Moderator) {
            return Err(ClaimError::RoleTooLow {
                minimum: ActorRole::Moderator,
            });
        }
        if claim.hold.status() != HoldStatus::Active {
            return Err(ClaimError::InvalidTransition(
                "fraud flag applies to claims with an active hold".to_string(),
            ));
        }

        let mut next = claim.clone();
        next.hold.set_reason(HoldReason::SuspectedFraud);
        next.log(
            ReviewEventKind::CompetingClaimFlagged,
            actor,
            now,
            Some(format!("suspected fraud: {detail}")),
        );
        self.refresh_two_person(&mut next);
        next.audit = claim.audit.bumped(actor, now);
        Ok(next)
    }

    /// Flag or clear the competing-claims marker; the service places this
    /// when multiple open claims target one case. Idempotent.
    pub fn set_competing_flag(
        &self,
        claim: &OwnershipClaim,
        competing: bool,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<OwnershipClaim, ClaimError> {
        if claim.competing_claim == competing {
            return Ok(claim.clone());
        }

        let mut next = claim.clone();
        next.competing_claim = competing;
        if next.hold.status() == HoldStatus::Active {
            if competing && next.hold.reason() == HoldReason::IntakeVerification {
                next.hold.set_reason(HoldReason::CompetingClaims);
            } else if !competing && next.hold.reason() == HoldReason::CompetingClaims {
                next.hold.set_reason(HoldReason::IntakeVerification);
            }
        }
        next.log(
            ReviewEventKind::CompetingClaimFlagged,
            actor,
            now,
            Some(if competing {
                "competing claim detected".to_string()
            } else {
                "competing claim cleared".to_string()
            }),
        );
        self.refresh_two_person(&mut next);
        next.audit = claim.audit.bumped(actor, now);
        Ok(next)
    }

    /// Record a human review ruling. The reviewer's role must satisfy the
    /// claim's tier: moderators from the moderator band upward, lead
    /// moderators for the lead band and for disputed or fraud-flagged
    /// claims. A recorded review resolves any open dispute.
    pub fn record_review(
        &self,
        claim: &OwnershipClaim,
        ruling: ReviewRuling,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<OwnershipClaim, ClaimError> {
        if matches!(claim.status, ClaimStatus::Rejected | ClaimStatus::Withdrawn) {
            return Err(ClaimError::InvalidTransition(format!(
                "claim is {} and no longer accepts review",
                claim.status.label()
            )));
        }
        if claim.status == ClaimStatus::Verified && claim.dispute.is_none() {
            return Err(ClaimError::InvalidTransition(
                "claim is already verified".to_string(),
            ));
        }

        let force_lead = force_lead_review(claim);
        let tier = self.policy.review_tier(claim.score.total, force_lead);
        let minimum = match tier {
            ReviewTier::LeadReview => ActorRole::LeadModerator,
            _ => ActorRole::Moderator,
        };
        if !actor.role.at_least(minimum) {
            return Err(ClaimError::RoleTooLow { minimum });
        }

        if ruling.outcome == ReviewOutcome::AuthorizeRelease {
            if let Some(contradiction) = &claim.contradiction {
                return Err(ClaimError::ContradictionBlocksRelease(
                    contradiction.detail.clone(),
                ));
            }
            if matches!(
                tier,
                ReviewTier::InsufficientEvidence | ReviewTier::Reject
            ) {
                return Err(ClaimError::ScoreBelowApprovalFloor {
                    score: claim.score.total,
                    floor: self.policy.lead_review_threshold,
                });
            }
        }

        let mut next = claim.clone();
        if next.dispute.take().is_some()
            && next.hold.status() == HoldStatus::Active
            && next.hold.reason() == HoldReason::ActiveDispute
        {
            next.hold.set_reason(HoldReason::IntakeVerification);
        }
        match ruling.outcome {
            ReviewOutcome::AuthorizeRelease => {
                next.status = ClaimStatus::Verified;
                next.decision = Some(ClaimDecision {
                    decided_by: actor.person.clone(),
                    decided_by_role: actor.role,
                    decided_at: now,
                    release_authorized: true,
                    notes: ruling.notes.clone(),
                });
            }
            ReviewOutcome::RequestMoreEvidence => {
                next.status = ClaimStatus::EvidenceRequested;
            }
            ReviewOutcome::Reject => {
                next.status = ClaimStatus::Rejected;
                next.hold.mark_denied("claim rejected on review");
                next.decision = Some(ClaimDecision {
                    decided_by: actor.person.clone(),
                    decided_by_role: actor.role,
                    decided_at: now,
                    release_authorized: false,
                    notes: ruling.notes.clone(),
                });
            }
        }
        next.log(
            ReviewEventKind::ReviewRecorded,
            actor,
            now,
            Some(ruling.notes),
        );
        self.refresh_two_person(&mut next);
        next.audit = claim.audit.bumped(actor, now);
        Ok(next)
    }

    /// Claimant withdrawal. Terminal; the hold is denied so the case can
    /// never release through this claim.
    pub fn withdraw(
        &self,
        claim: &OwnershipClaim,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<OwnershipClaim, ClaimError> {
        self.guard_open(claim)?;
        if actor.person != claim.claimant && !actor.role.at_least(ActorRole::Moderator) {
            return Err(ClaimError::Validation(
                "only the claimant or a moderator may withdraw a claim".to_string(),
            ));
        }

        let mut next = claim.clone();
        next.status = ClaimStatus::Withdrawn;
        next.hold.mark_denied("claim withdrawn");
        next.log(ReviewEventKind::Withdrawal, actor, now, None);
        next.audit = claim.audit.bumped(actor, now);
        Ok(next)
    }

    /// Pure snapshot of where the claim stands and what remains.
    pub fn assess(&self, claim: &OwnershipClaim) -> ClaimAssessment {
        ClaimAssessment {
            tier: self
                .policy
                .review_tier(claim.score.total, force_lead_review(claim)),
            score: claim.score.total,
            requires_two_person_clearance: two_person_required(&self.policy, claim),
            required_actions: required_steps(&self.policy, claim),
        }
    }
}

/// Gate deciding whether and how a claim's release hold clears. The hold
/// itself only mutates through this gate.
#[derive(Debug, Clone)]
pub struct ReleaseGate {
    policy: EvidencePolicy,
}

impl ReleaseGate {
    pub fn new(policy: EvidencePolicy) -> Self {
        Self { policy }
    }

    /// Query form: whether and why a hold can clear for an approver role.
    /// Always recomputes the two-person requirement from current claim
    /// state rather than trusting the persisted flag.
    pub fn can_clear_hold(&self, claim: &OwnershipClaim, approver_role: ActorRole) -> ClearanceDecision {
        let requires_two_person = two_person_required(&self.policy, claim);
        let steps = required_steps(&self.policy, claim);

        if let Some(contradiction) = &claim.contradiction {
            return ClearanceDecision {
                allowed: false,
                reason: format!(
                    "identity contradiction on record: {}",
                    contradiction.kind.label()
                ),
                requires_two_person,
                required_actions: steps,
            };
        }
        match claim.hold.status() {
            HoldStatus::Cleared => {
                return ClearanceDecision {
                    allowed: false,
                    reason: "hold is already cleared".to_string(),
                    requires_two_person,
                    required_actions: Vec::new(),
                }
            }
            HoldStatus::Denied => {
                return ClearanceDecision {
                    allowed: false,
                    reason: "hold has been denied".to_string(),
                    requires_two_person,
                    required_actions: Vec::new(),
                }
            }
            HoldStatus::Active => {}
        }
        if claim.status != ClaimStatus::Verified {
            return ClearanceDecision {
                allowed: false,
                reason: format!(
                    "claim is {} and must be verified before its hold can clear",
                    claim.status.label()
                ),
                requires_two_person,
                required_actions: steps,
            };
        }
        if !claim
            .decision
            .as_ref()
            .map(|decision| decision.release_authorized)
            .unwrap_or(false)
        {
            return ClearanceDecision {
                allowed: false,
                reason: "no recorded ruling authorizes release".to_string(),
                requires_two_person,
                required_actions: steps,
            };
        }
        if !approver_role.at_least(ActorRole::Moderator) {
            let mut actions = steps;
            actions.push(RequiredStep::ApproverRoleTooLow {
                minimum: ActorRole::Moderator,
            });
            return ClearanceDecision {
                allowed: false,
                reason: format!(
                    "{} cannot clear release holds; moderator or above required",
                    approver_role.label()
                ),
                requires_two_person,
                required_actions: actions,
            };
        }

        let recorded = claim.hold.approvals().len();
        let reason = if requires_two_person {
            format!(
                "two distinct approvals required; {recorded} recorded so far"
            )
        } else {
            "single qualifying approval clears this hold".to_string()
        };
        ClearanceDecision {
            allowed: true,
            reason,
            requires_two_person,
            required_actions: steps,
        }
    }

    /// Record one clearance approval. The hold clears once the approval
    /// set satisfies the quorum; each approver may sign at most once.
    pub fn approve_clearance(
        &self,
        claim: &OwnershipClaim,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<OwnershipClaim, ClaimError> {
        let decision = self.can_clear_hold(claim, actor.role);
        if !decision.allowed {
            return Err(ClaimError::ClearanceNotPermitted(decision.reason));
        }
        if claim
            .hold
            .approvals()
            .iter()
            .any(|approval| approval.approver == actor.person)
        {
            return Err(ClaimError::DuplicateApprover(actor.person.0.clone()));
        }

        let mut next = claim.clone();
        next.hold.push_approval(HoldApproval {
            approver: actor.person.clone(),
            role: actor.role,
            approved_at: now,
        });
        next.log(ReviewEventKind::ClearanceApproval, actor, now, None);

        let quorum: usize = if decision.requires_two_person { 2 } else { 1 };
        if next.hold.approvals().len() >= quorum {
            next.hold.mark_cleared(&actor.person, now, ClearanceRoute::Standard);
            next.log(
                ReviewEventKind::HoldCleared,
                actor,
                now,
                Some("standard clearance".to_string()),
            );
        }
        next.audit = claim.audit.bumped(actor, now);
        Ok(next)
    }

    /// Deny the hold. The claim keeps its status; the animal can no longer
    /// release through it.
    pub fn deny_release(
        &self,
        claim: &OwnershipClaim,
        reason: &str,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<OwnershipClaim, ClaimError> {
        if !actor.role.at_least(ActorRole::Moderator) {
            return Err(ClaimError::RoleTooLow {
                minimum: ActorRole::Moderator,
            });
        }
        if claim.hold.status() != HoldStatus::Active {
            return Err(ClaimError::InvalidTransition(format!(
                "hold is {} and cannot be denied",
                claim.hold.status().label()
            )));
        }
        if reason.trim().is_empty() {
            return Err(ClaimError::Validation(
                "denial reason must not be empty".to_string(),
            ));
        }

        let mut next = claim.clone();
        next.hold.mark_denied(reason);
        next.log(
            ReviewEventKind::HoldDenied,
            actor,
            now,
            Some(reason.to_string()),
        );
        next.audit = claim.audit.bumped(actor, now);
        Ok(next)
    }

    /// Emergency medical override. Clears the hold without the scoring
    /// path, but never past a recorded contradiction, and only under a
    /// live grant from a second admin.
    pub fn break_glass_release(
        &self,
        claim: &OwnershipClaim,
        grant: &BreakGlassGrant,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<OwnershipClaim, ClaimError> {
        if actor.role != ActorRole::Admin {
            return Err(ClaimError::BreakGlassRejected(
                "only an admin may execute a break-glass release".to_string(),
            ));
        }
        if grant.granted_role != ActorRole::Admin {
            return Err(ClaimError::BreakGlassRejected(
                "grant must be authorized by an admin".to_string(),
            ));
        }
        if grant.granted_by == actor.person {
            return Err(ClaimError::BreakGlassRejected(
                "grantor and executing admin must be distinct people".to_string(),
            ));
        }
        if grant.reason.trim().is_empty() {
            return Err(ClaimError::BreakGlassRejected(
                "grant must carry a documented reason".to_string(),
            ));
        }
        if now > grant.expires_at {
            return Err(ClaimError::BreakGlassRejected(format!(
                "grant expired at {}",
                grant.expires_at
            )));
        }
        if let Some(contradiction) = &claim.contradiction {
            return Err(ClaimError::ContradictionBlocksRelease(
                contradiction.detail.clone(),
            ));
        }
        if matches!(claim.status, ClaimStatus::Rejected | ClaimStatus::Withdrawn) {
            return Err(ClaimError::InvalidTransition(format!(
                "claim is {} and cannot release",
                claim.status.label()
            )));
        }
        if claim.hold.status() != HoldStatus::Active {
            return Err(ClaimError::InvalidTransition(format!(
                "hold is {}; break-glass applies to active holds",
                claim.hold.status().label()
            )));
        }

        let mut next = claim.clone();
        next.hold
            .mark_cleared(&actor.person, now, ClearanceRoute::BreakGlass);
        next.log(
            ReviewEventKind::BreakGlass,
            actor,
            now,
            Some(format!(
                "granted by {} until {}: {}",
                grant.granted_by.0, grant.expires_at, grant.reason
            )),
        );
        next.audit = claim.audit.bumped(actor, now);
        Ok(next)
    }
}
