use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use super::domain::{ClaimStatus, EvidenceKind, HoldStatus, OwnershipClaim};
use super::gate::{
    BreakGlassGrant, ChipScanOutcome, ClaimAssessment, ClaimError, ClearanceDecision,
    EvidenceEngine, EvidenceSubmission, ReleaseGate, RequiredStep, ReviewRuling,
};
use super::score::EvidencePolicy;
use crate::ops::audit::{AggregateKind, AuditError, AuditEvent, AuditEventKind, AuditSink};
use crate::ops::clock::Clock;
use crate::ops::identity::{
    Actor, ActorRole, CaseId, ClaimId, EvidenceId, IdGenerator, PersonId, RoleAssertion,
};
use crate::ops::scoring::TallyLine;
use crate::ops::store::StoreError;

use super::repository::ClaimStore;

#[derive(Debug, Error)]
pub enum ClaimServiceError {
    #[error(transparent)]
    Claim(#[from] ClaimError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Audit(#[from] AuditError),
}

/// Sanitized external representation of a claim. Score breakdowns are
/// only populated for viewers whose effective rank reaches moderator.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimStatusView {
    pub claim: ClaimId,
    pub case: CaseId,
    pub status: &'static str,
    pub score: u16,
    pub tier: &'static str,
    pub hold_status: &'static str,
    pub hold_reason: &'static str,
    pub requires_two_person: bool,
    pub approvals_recorded: usize,
    pub required_actions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Vec<TallyLine<EvidenceKind>>>,
}

/// Orchestrates claim mutations against a store and the audit trail.
/// Every write is optimistic: the version read before the mutation rides
/// along and a conflicting write surfaces as `StoreError::VersionConflict`.
pub struct ClaimService<S, A> {
    store: Arc<S>,
    audit: Arc<A>,
    engine: EvidenceEngine,
    gate: ReleaseGate,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl<S, A> ClaimService<S, A>
where
    S: ClaimStore,
    A: AuditSink,
{
    pub fn new(
        store: Arc<S>,
        audit: Arc<A>,
        policy: EvidencePolicy,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            store,
            audit,
            engine: EvidenceEngine::new(policy.clone()),
            gate: ReleaseGate::new(policy),
            clock,
            ids,
        }
    }

    fn fetch_required(&self, id: &ClaimId) -> Result<OwnershipClaim, ClaimServiceError> {
        self.store
            .fetch(id)?
            .ok_or(ClaimServiceError::Store(StoreError::NotFound))
    }

    fn event(
        &self,
        kind: AuditEventKind,
        claim: &OwnershipClaim,
        actor: &Actor,
        payload: serde_json::Value,
    ) -> AuditEvent {
        AuditEvent {
            id: self.ids.next_id("event"),
            aggregate: AggregateKind::OwnershipClaim,
            aggregate_id: claim.id.0.clone(),
            kind,
            version: claim.audit.version,
            recorded_at: self.clock.now(),
            actor: actor.clone(),
            correlation_id: Some(claim.case.0.clone()),
            payload,
        }
    }

    /// Open a claim for a case. When this makes the case contested, every
    /// open claim on it gets the competing flag.
    pub fn submit_claim(
        &self,
        case: CaseId,
        claimant: PersonId,
        actor: &Actor,
    ) -> Result<OwnershipClaim, ClaimServiceError> {
        let now = self.clock.now();
        let id = ClaimId(self.ids.next_id("claim"));
        let claim = self
            .engine
            .open_claim(id, case.clone(), claimant, actor, now);
        let stored = self.store.insert(claim)?;
        self.audit.record(self.event(
            AuditEventKind::OwnershipClaimSubmitted,
            &stored,
            actor,
            json!({ "case": case.0 }),
        ))?;
        info!(claim = %stored.id.0, case = %case.0, "ownership claim submitted");

        if self.reconcile_competing(&case, actor)? {
            return self.fetch_required(&stored.id);
        }
        Ok(stored)
    }

    /// Recompute the competing-claims flag across a case. More than one
    /// open claim makes every open claim contested.
    fn reconcile_competing(&self, case: &CaseId, actor: &Actor) -> Result<bool, ClaimServiceError> {
        let claims = self.store.claims_for_case(case)?;
        let open: Vec<&OwnershipClaim> = claims
            .iter()
            .filter(|claim| {
                !matches!(claim.status, ClaimStatus::Rejected | ClaimStatus::Withdrawn)
            })
            .collect();
        let competing = open.len() > 1;

        let mut changed = false;
        for claim in open {
            if claim.competing_claim != competing {
                let next =
                    self.engine
                        .set_competing_flag(claim, competing, actor, self.clock.now())?;
                let stored = self.store.update(next, claim.audit.version)?;
                self.audit.record(self.event(
                    AuditEventKind::CompetingClaimsFlagged,
                    &stored,
                    actor,
                    json!({ "competing": competing }),
                ))?;
                changed = true;
            }
        }
        Ok(changed)
    }

    pub fn add_evidence(
        &self,
        id: &ClaimId,
        submission: EvidenceSubmission,
        actor: &Actor,
    ) -> Result<OwnershipClaim, ClaimServiceError> {
        let current = self.fetch_required(id)?;
        let expected = current.audit.version;
        let kind = submission.kind;
        let next = self.engine.add_evidence(
            &current,
            EvidenceId(self.ids.next_id("evidence")),
            submission,
            actor,
            self.clock.now(),
        )?;
        let auto_verified =
            current.status != ClaimStatus::Verified && next.status == ClaimStatus::Verified;
        let stored = self.store.update(next, expected)?;
        self.audit.record(self.event(
            AuditEventKind::EvidenceRecorded,
            &stored,
            actor,
            json!({ "kind": kind.label(), "score": stored.score.total }),
        ))?;
        if auto_verified {
            self.record_auto_verification(&stored, actor)?;
        }
        Ok(stored)
    }

    pub fn verify_evidence(
        &self,
        id: &ClaimId,
        evidence: &EvidenceId,
        actor: &Actor,
    ) -> Result<OwnershipClaim, ClaimServiceError> {
        let current = self.fetch_required(id)?;
        let expected = current.audit.version;
        let next = self
            .engine
            .verify_evidence(&current, evidence, actor, self.clock.now())?;
        let auto_verified =
            current.status != ClaimStatus::Verified && next.status == ClaimStatus::Verified;
        let stored = self.store.update(next, expected)?;
        self.audit.record(self.event(
            AuditEventKind::EvidenceVerified,
            &stored,
            actor,
            json!({ "evidence": evidence.0, "score": stored.score.total }),
        ))?;
        if auto_verified {
            self.record_auto_verification(&stored, actor)?;
        }
        Ok(stored)
    }

    fn record_auto_verification(
        &self,
        stored: &OwnershipClaim,
        actor: &Actor,
    ) -> Result<(), ClaimServiceError> {
        info!(claim = %stored.id.0, score = stored.score.total, "claim auto-verified");
        self.audit.record(self.event(
            AuditEventKind::OwnershipClaimVerified,
            stored,
            actor,
            json!({ "route": "auto", "score": stored.score.total }),
        ))?;
        Ok(())
    }

    pub fn record_chip_verification(
        &self,
        id: &ClaimId,
        outcome: ChipScanOutcome,
        actor: &Actor,
    ) -> Result<OwnershipClaim, ClaimServiceError> {
        let current = self.fetch_required(id)?;
        let expected = current.audit.version;
        let contradiction = matches!(outcome, ChipScanOutcome::RegisteredToAnother { .. });
        let next =
            self.engine
                .record_chip_verification(&current, outcome, actor, self.clock.now())?;
        let auto_verified =
            current.status != ClaimStatus::Verified && next.status == ClaimStatus::Verified;
        let stored = self.store.update(next, expected)?;
        self.audit.record(self.event(
            AuditEventKind::ClaimChipVerificationRecorded,
            &stored,
            actor,
            json!({ "confirmed": !contradiction, "score": stored.score.total }),
        ))?;
        if contradiction {
            warn!(claim = %stored.id.0, "chip registered to another owner; claim rejected");
            self.audit.record(self.event(
                AuditEventKind::OwnershipClaimRejected,
                &stored,
                actor,
                json!({ "route": "contradiction" }),
            ))?;
        } else if auto_verified {
            self.record_auto_verification(&stored, actor)?;
        }
        Ok(stored)
    }

    pub fn raise_dispute(
        &self,
        id: &ClaimId,
        reason: &str,
        actor: &Actor,
    ) -> Result<OwnershipClaim, ClaimServiceError> {
        let current = self.fetch_required(id)?;
        let expected = current.audit.version;
        let next = self
            .engine
            .raise_dispute(&current, reason, actor, self.clock.now())?;
        let stored = self.store.update(next, expected)?;
        warn!(claim = %stored.id.0, "dispute raised");
        self.audit.record(self.event(
            AuditEventKind::ClaimDisputeRaised,
            &stored,
            actor,
            json!({ "reason": reason }),
        ))?;
        Ok(stored)
    }

    pub fn flag_suspected_fraud(
        &self,
        id: &ClaimId,
        detail: &str,
        actor: &Actor,
    ) -> Result<OwnershipClaim, ClaimServiceError> {
        let current = self.fetch_required(id)?;
        let expected = current.audit.version;
        let next = self
            .engine
            .flag_suspected_fraud(&current, detail, actor, self.clock.now())?;
        let stored = self.store.update(next, expected)?;
        warn!(claim = %stored.id.0, "claim flagged as suspected fraud");
        self.audit.record(self.event(
            AuditEventKind::SuspectedFraudFlagged,
            &stored,
            actor,
            json!({ "detail": detail }),
        ))?;
        Ok(stored)
    }

    pub fn record_review(
        &self,
        id: &ClaimId,
        ruling: ReviewRuling,
        actor: &Actor,
    ) -> Result<OwnershipClaim, ClaimServiceError> {
        let current = self.fetch_required(id)?;
        let expected = current.audit.version;
        let next = self
            .engine
            .record_review(&current, ruling, actor, self.clock.now())?;
        let status = next.status;
        let stored = self.store.update(next, expected)?;
        self.audit.record(self.event(
            AuditEventKind::OwnershipClaimReviewed,
            &stored,
            actor,
            json!({ "status": status.label(), "score": stored.score.total }),
        ))?;
        match status {
            ClaimStatus::Verified => {
                info!(claim = %stored.id.0, "claim verified on review");
                self.audit.record(self.event(
                    AuditEventKind::OwnershipClaimVerified,
                    &stored,
                    actor,
                    json!({ "route": "review" }),
                ))?;
            }
            ClaimStatus::Rejected => {
                info!(claim = %stored.id.0, "claim rejected on review");
                self.audit.record(self.event(
                    AuditEventKind::OwnershipClaimRejected,
                    &stored,
                    actor,
                    json!({ "route": "review" }),
                ))?;
                self.reconcile_competing(&stored.case, actor)?;
            }
            _ => {}
        }
        Ok(stored)
    }

    pub fn withdraw(
        &self,
        id: &ClaimId,
        actor: &Actor,
    ) -> Result<OwnershipClaim, ClaimServiceError> {
        let current = self.fetch_required(id)?;
        let expected = current.audit.version;
        let next = self.engine.withdraw(&current, actor, self.clock.now())?;
        let stored = self.store.update(next, expected)?;
        self.audit.record(self.event(
            AuditEventKind::OwnershipClaimWithdrawn,
            &stored,
            actor,
            json!({}),
        ))?;
        self.reconcile_competing(&stored.case, actor)?;
        Ok(stored)
    }

    /// Audited clearance query: every evaluation lands in the trail with
    /// its outcome, allowed or not.
    pub fn evaluate_clearance(
        &self,
        id: &ClaimId,
        approver_role: ActorRole,
        actor: &Actor,
    ) -> Result<ClearanceDecision, ClaimServiceError> {
        let claim = self.fetch_required(id)?;
        let decision = self.gate.can_clear_hold(&claim, approver_role);
        self.audit.record(self.event(
            AuditEventKind::ReleaseGateEvaluated,
            &claim,
            actor,
            json!({
                "approver_role": approver_role.label(),
                "allowed": decision.allowed,
                "reason": decision.reason,
                "requires_two_person": decision.requires_two_person,
            }),
        ))?;
        Ok(decision)
    }

    pub fn approve_clearance(
        &self,
        id: &ClaimId,
        actor: &Actor,
    ) -> Result<OwnershipClaim, ClaimServiceError> {
        let current = self.fetch_required(id)?;
        let expected = current.audit.version;
        let next = self
            .gate
            .approve_clearance(&current, actor, self.clock.now())?;
        let cleared = next.hold.status() == HoldStatus::Cleared;
        let stored = self.store.update(next, expected)?;
        self.audit.record(self.event(
            AuditEventKind::ReleaseClearanceApproved,
            &stored,
            actor,
            json!({ "approvals": stored.hold.approvals().len() }),
        ))?;
        if cleared {
            info!(claim = %stored.id.0, "release hold cleared");
            self.audit.record(self.event(
                AuditEventKind::ReleaseHoldCleared,
                &stored,
                actor,
                json!({ "route": "standard" }),
            ))?;
        }
        Ok(stored)
    }

    pub fn deny_release(
        &self,
        id: &ClaimId,
        reason: &str,
        actor: &Actor,
    ) -> Result<OwnershipClaim, ClaimServiceError> {
        let current = self.fetch_required(id)?;
        let expected = current.audit.version;
        let next = self
            .gate
            .deny_release(&current, reason, actor, self.clock.now())?;
        let stored = self.store.update(next, expected)?;
        self.audit.record(self.event(
            AuditEventKind::ReleaseHoldDenied,
            &stored,
            actor,
            json!({ "reason": reason }),
        ))?;
        Ok(stored)
    }

    pub fn break_glass_release(
        &self,
        id: &ClaimId,
        grant: &BreakGlassGrant,
        actor: &Actor,
    ) -> Result<OwnershipClaim, ClaimServiceError> {
        let current = self.fetch_required(id)?;
        let expected = current.audit.version;
        let next = self
            .gate
            .break_glass_release(&current, grant, actor, self.clock.now())?;
        let stored = self.store.update(next, expected)?;
        warn!(
            claim = %stored.id.0,
            admin = %actor.person.0,
            granted_by = %grant.granted_by.0,
            "break-glass release invoked"
        );
        self.audit.record(self.event(
            AuditEventKind::BreakGlassReleaseInvoked,
            &stored,
            actor,
            json!({ "granted_by": grant.granted_by.0, "reason": grant.reason }),
        ))?;
        self.audit.record(self.event(
            AuditEventKind::ReleaseHoldCleared,
            &stored,
            actor,
            json!({ "route": "break_glass" }),
        ))?;
        Ok(stored)
    }

    pub fn assess(&self, id: &ClaimId) -> Result<ClaimAssessment, ClaimServiceError> {
        let claim = self.fetch_required(id)?;
        Ok(self.engine.assess(&claim))
    }

    pub fn get(&self, id: &ClaimId) -> Result<Option<OwnershipClaim>, ClaimServiceError> {
        Ok(self.store.fetch(id)?)
    }

    /// External status view with role-based redaction: the per-item score
    /// breakdown only appears at moderator effective rank or above.
    pub fn status_view(
        &self,
        id: &ClaimId,
        viewer: RoleAssertion,
    ) -> Result<ClaimStatusView, ClaimServiceError> {
        let claim = self.fetch_required(id)?;
        let assessment = self.engine.assess(&claim);
        let privileged = viewer.effective_rank() >= ActorRole::Moderator.rank();
        Ok(ClaimStatusView {
            claim: claim.id.clone(),
            case: claim.case.clone(),
            status: claim.status.label(),
            score: claim.score.total,
            tier: assessment.tier.label(),
            hold_status: claim.hold.status().label(),
            hold_reason: claim.hold.reason().label(),
            requires_two_person: assessment.requires_two_person_clearance,
            approvals_recorded: claim.hold.approvals().len(),
            required_actions: assessment
                .required_actions
                .iter()
                .map(RequiredStep::summary)
                .collect(),
            breakdown: if privileged {
                Some(claim.score.breakdown.clone())
            } else {
                None
            },
        })
    }
}
