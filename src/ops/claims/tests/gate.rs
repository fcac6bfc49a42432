use chrono::Duration;

use super::common::{
    admin, claimant, engine, fixed_now, lead, moderator, open_claim, release_gate,
    second_moderator, with_evidence, with_verified_evidence,
};
use crate::ops::claims::domain::{
    ClaimStatus, ClearanceRoute, EvidenceKind, HoldReason, HoldStatus,
};
use crate::ops::claims::gate::{
    BreakGlassGrant, ChipScanOutcome, ClaimError, EvidenceSubmission, RequiredStep,
    ReviewOutcome, ReviewRuling,
};
use crate::ops::identity::{Actor, ActorRole, EvidenceId};

fn authorize(notes: &str) -> ReviewRuling {
    ReviewRuling {
        outcome: ReviewOutcome::AuthorizeRelease,
        notes: notes.to_string(),
    }
}

#[test]
fn verified_chip_claim_clears_with_a_single_moderator() {
    let claim = open_claim("claim-a");
    let claim = with_verified_evidence(&claim, "ev-chip", EvidenceKind::MicrochipRegistration);
    assert_eq!(claim.status, ClaimStatus::UnderReview);

    let claim = engine()
        .record_review(&claim, authorize("chip on registry"), &moderator(), fixed_now())
        .expect("moderator review");
    assert_eq!(claim.status, ClaimStatus::Verified);

    let decision = release_gate().can_clear_hold(&claim, ActorRole::Moderator);
    assert!(decision.allowed);
    assert!(!decision.requires_two_person);

    let claim = release_gate()
        .approve_clearance(&claim, &moderator(), fixed_now())
        .expect("clearance");
    assert_eq!(claim.hold.status(), HoldStatus::Cleared);
    assert_eq!(claim.hold.cleared_via(), Some(ClearanceRoute::Standard));
    assert!(claim.is_usable_for_release());
}

#[test]
fn disputed_claim_needs_two_distinct_approvers_even_at_high_score() {
    let claim = open_claim("claim-b");
    let claim = with_verified_evidence(&claim, "ev-chip", EvidenceKind::MicrochipRegistration);
    let claim = with_evidence(&claim, "ev-photo", EvidenceKind::DatedPhoto);
    assert_eq!(claim.score.total, 100);
    assert_eq!(claim.status, ClaimStatus::Verified);

    let claim = engine()
        .raise_dispute(&claim, "second party claims the same dog", &lead(), fixed_now())
        .expect("dispute");
    assert_eq!(claim.status, ClaimStatus::Verified);
    assert_eq!(claim.hold.reason(), HoldReason::ActiveDispute);

    let decision = release_gate().can_clear_hold(&claim, ActorRole::Moderator);
    assert!(decision.allowed);
    assert!(decision.requires_two_person);

    let claim = release_gate()
        .approve_clearance(&claim, &moderator(), fixed_now())
        .expect("first approval");
    assert_eq!(claim.hold.status(), HoldStatus::Active);
    assert_eq!(claim.hold.approvals().len(), 1);

    let repeat = release_gate().approve_clearance(&claim, &moderator(), fixed_now());
    assert!(matches!(repeat, Err(ClaimError::DuplicateApprover(_))));

    let claim = release_gate()
        .approve_clearance(&claim, &second_moderator(), fixed_now())
        .expect("second approval");
    assert_eq!(claim.hold.status(), HoldStatus::Cleared);
    assert_eq!(claim.hold.approvals().len(), 2);
    assert!(claim
        .hold
        .approvals()
        .iter()
        .all(|approval| approval.approved_at == fixed_now()));
}

#[test]
fn lead_band_claim_rejects_moderator_review() {
    let claim = open_claim("claim-c");
    let claim = with_verified_evidence(&claim, "ev-vet", EvidenceKind::VetRecords);
    let claim = with_verified_evidence(&claim, "ev-w1", EvidenceKind::WitnessStatement);
    assert_eq!(claim.score.total, 55);

    let refused = engine().record_review(&claim, authorize("vet stack"), &moderator(), fixed_now());
    assert!(matches!(
        refused,
        Err(ClaimError::RoleTooLow {
            minimum: ActorRole::LeadModerator
        })
    ));

    let claim = engine()
        .record_review(&claim, authorize("records check out"), &lead(), fixed_now())
        .expect("lead review");
    assert_eq!(claim.status, ClaimStatus::Verified);

    let decision = release_gate().can_clear_hold(&claim, ActorRole::Moderator);
    assert!(decision.allowed);
    assert!(decision.requires_two_person);
}

#[test]
fn insufficient_evidence_cannot_authorize_release() {
    let claim = open_claim("claim-d");
    let claim = with_evidence(&claim, "ev-photo", EvidenceKind::DatedPhoto);
    let claim = with_verified_evidence(&claim, "ev-w1", EvidenceKind::WitnessStatement);
    assert_eq!(claim.score.total, 30);

    let refused = engine().record_review(&claim, authorize("gut feeling"), &lead(), fixed_now());
    assert!(matches!(
        refused,
        Err(ClaimError::ScoreBelowApprovalFloor { score: 30, floor: 40 })
    ));

    let claim = engine()
        .record_review(
            &claim,
            ReviewRuling {
                outcome: ReviewOutcome::Reject,
                notes: "not enough proof".to_string(),
            },
            &lead(),
            fixed_now(),
        )
        .expect("reject");
    assert_eq!(claim.status, ClaimStatus::Rejected);
    assert_eq!(claim.hold.status(), HoldStatus::Denied);
}

#[test]
fn chip_mismatch_rejects_and_blocks_every_release_path() {
    let claim = open_claim("claim-e");
    let claim = with_evidence(&claim, "ev-chip", EvidenceKind::MicrochipRegistration);
    let claim = engine()
        .record_chip_verification(
            &claim,
            ChipScanOutcome::RegisteredToAnother {
                detail: "registry lists a different household".to_string(),
            },
            &moderator(),
            fixed_now(),
        )
        .expect("scan recorded");
    assert_eq!(claim.status, ClaimStatus::Rejected);
    assert_eq!(claim.hold.status(), HoldStatus::Denied);

    let decision = release_gate().can_clear_hold(&claim, ActorRole::Admin);
    assert!(!decision.allowed);
    assert_eq!(
        decision.required_actions,
        vec![RequiredStep::ResolveContradiction]
    );

    let grant = BreakGlassGrant {
        granted_by: admin().person,
        granted_role: ActorRole::Admin,
        reason: "urgent surgery".to_string(),
        granted_at: fixed_now(),
        expires_at: fixed_now() + Duration::hours(1),
    };
    let executor = Actor::new("person-admin-2", ActorRole::Admin);
    let refused = release_gate().break_glass_release(&claim, &grant, &executor, fixed_now());
    assert!(matches!(
        refused,
        Err(ClaimError::ContradictionBlocksRelease(_))
    ));
}

#[test]
fn break_glass_clears_an_active_hold_under_a_live_grant() {
    let claim = open_claim("claim-f");
    assert_eq!(claim.status, ClaimStatus::Pending);

    let grant = BreakGlassGrant {
        granted_by: admin().person,
        granted_role: ActorRole::Admin,
        reason: "animal needs emergency transport to surgery".to_string(),
        granted_at: fixed_now(),
        expires_at: fixed_now() + Duration::minutes(30),
    };
    let executor = Actor::new("person-admin-2", ActorRole::Admin);

    let claim = release_gate()
        .break_glass_release(&claim, &grant, &executor, fixed_now())
        .expect("break glass");
    assert_eq!(claim.hold.status(), HoldStatus::Cleared);
    assert_eq!(claim.hold.cleared_via(), Some(ClearanceRoute::BreakGlass));
    assert!(claim.is_usable_for_release());
}

#[test]
fn break_glass_refuses_self_granted_or_expired_grants() {
    let claim = open_claim("claim-g");
    let self_grant = BreakGlassGrant {
        granted_by: admin().person,
        granted_role: ActorRole::Admin,
        reason: "urgent".to_string(),
        granted_at: fixed_now(),
        expires_at: fixed_now() + Duration::minutes(30),
    };
    let refused = release_gate().break_glass_release(&claim, &self_grant, &admin(), fixed_now());
    assert!(matches!(refused, Err(ClaimError::BreakGlassRejected(_))));

    let expired = BreakGlassGrant {
        granted_by: admin().person,
        granted_role: ActorRole::Admin,
        reason: "urgent".to_string(),
        granted_at: fixed_now() - Duration::hours(2),
        expires_at: fixed_now() - Duration::hours(1),
    };
    let executor = Actor::new("person-admin-2", ActorRole::Admin);
    let refused = release_gate().break_glass_release(&claim, &expired, &executor, fixed_now());
    assert!(matches!(refused, Err(ClaimError::BreakGlassRejected(_))));

    let non_admin = Actor::new("person-lead", ActorRole::LeadModerator);
    let valid = BreakGlassGrant {
        granted_by: admin().person,
        granted_role: ActorRole::Admin,
        reason: "urgent".to_string(),
        granted_at: fixed_now(),
        expires_at: fixed_now() + Duration::minutes(30),
    };
    let refused = release_gate().break_glass_release(&claim, &valid, &non_admin, fixed_now());
    assert!(matches!(refused, Err(ClaimError::BreakGlassRejected(_))));
}

#[test]
fn volunteers_cannot_clear_holds() {
    let claim = open_claim("claim-h");
    let claim = with_verified_evidence(&claim, "ev-chip", EvidenceKind::MicrochipRegistration);
    let claim = engine()
        .record_review(&claim, authorize("chip verified"), &moderator(), fixed_now())
        .expect("review");

    let decision = release_gate().can_clear_hold(&claim, ActorRole::FieldVolunteer);
    assert!(!decision.allowed);
    assert!(decision
        .required_actions
        .contains(&RequiredStep::ApproverRoleTooLow {
            minimum: ActorRole::Moderator
        }));

    let volunteer = Actor::new("person-volunteer", ActorRole::FieldVolunteer);
    let refused = release_gate().approve_clearance(&claim, &volunteer, fixed_now());
    assert!(matches!(refused, Err(ClaimError::ClearanceNotPermitted(_))));
}

#[test]
fn unverified_claims_cannot_clear() {
    let claim = open_claim("claim-i");
    let claim = with_verified_evidence(&claim, "ev-chip", EvidenceKind::MicrochipRegistration);

    let decision = release_gate().can_clear_hold(&claim, ActorRole::Moderator);
    assert!(!decision.allowed);
    assert!(decision.reason.contains("must be verified"));

    let refused = release_gate().approve_clearance(&claim, &moderator(), fixed_now());
    assert!(matches!(refused, Err(ClaimError::ClearanceNotPermitted(_))));
}

#[test]
fn dispute_suppresses_auto_verification() {
    let claim = open_claim("claim-j");
    let claim = with_evidence(&claim, "ev-photo", EvidenceKind::DatedPhoto);
    let claim = engine()
        .raise_dispute(&claim, "competing family", &moderator(), fixed_now())
        .expect("dispute");
    assert_eq!(claim.status, ClaimStatus::Disputed);

    let claim = with_verified_evidence(&claim, "ev-chip", EvidenceKind::MicrochipRegistration);
    assert_eq!(claim.score.total, 100);
    assert_eq!(claim.status, ClaimStatus::Disputed);

    let refused = engine().record_review(&claim, authorize("looks fine"), &moderator(), fixed_now());
    assert!(matches!(refused, Err(ClaimError::RoleTooLow { .. })));

    let claim = engine()
        .record_review(&claim, authorize("dispute withdrawn in person"), &lead(), fixed_now())
        .expect("lead resolves");
    assert_eq!(claim.status, ClaimStatus::Verified);
    assert!(claim.dispute.is_none());
}

#[test]
fn fraud_flag_forces_two_person_clearance() {
    let claim = open_claim("claim-k");
    let claim = with_verified_evidence(&claim, "ev-chip", EvidenceKind::MicrochipRegistration);
    let claim = engine()
        .flag_suspected_fraud(&claim, "reused photos from a shelter listing", &moderator(), fixed_now())
        .expect("fraud flag");
    assert_eq!(claim.hold.reason(), HoldReason::SuspectedFraud);
    assert!(claim.hold.requires_two_person());

    let refused = engine().record_review(&claim, authorize("fine"), &moderator(), fixed_now());
    assert!(matches!(
        refused,
        Err(ClaimError::RoleTooLow {
            minimum: ActorRole::LeadModerator
        })
    ));
}

#[test]
fn withdrawal_is_terminal_and_denies_the_hold() {
    let claim = open_claim("claim-l");
    let stranger = Actor::new("person-stranger", ActorRole::FieldVolunteer);
    let refused = engine().withdraw(&claim, &stranger, fixed_now());
    assert!(matches!(refused, Err(ClaimError::Validation(_))));

    let owner = Actor {
        person: claimant(),
        role: ActorRole::FieldVolunteer,
    };
    let claim = engine().withdraw(&claim, &owner, fixed_now()).expect("withdraw");
    assert_eq!(claim.status, ClaimStatus::Withdrawn);
    assert_eq!(claim.hold.status(), HoldStatus::Denied);

    let refused = engine().add_evidence(
        &claim,
        EvidenceId("ev-late".to_string()),
        EvidenceSubmission {
            kind: EvidenceKind::DatedPhoto,
            notes: None,
        },
        &moderator(),
        fixed_now(),
    );
    assert!(matches!(refused, Err(ClaimError::InvalidTransition(_))));
}

#[test]
fn required_steps_name_the_missing_work() {
    let claim = open_claim("claim-m");
    let claim = with_evidence(&claim, "ev-chip", EvidenceKind::MicrochipRegistration);

    let assessment = engine().assess(&claim);
    assert_eq!(assessment.score, 0);
    assert!(assessment
        .required_actions
        .iter()
        .any(|step| matches!(step, RequiredStep::VerifyEvidence { .. })));
    assert!(assessment
        .required_actions
        .contains(&RequiredStep::AddEvidencePoints { needed: 60 }));

    // Verifying the chip takes the claim to 80 and a moderator ruling
    // verifies it; the one remaining step is the clearance approval.
    let claim = engine()
        .verify_evidence(&claim, &EvidenceId("ev-chip".to_string()), &moderator(), fixed_now())
        .expect("verify chip");
    let claim = engine()
        .record_review(&claim, authorize("solid portfolio"), &moderator(), fixed_now())
        .expect("review");

    let assessment = engine().assess(&claim);
    assert_eq!(
        assessment.required_actions,
        vec![RequiredStep::ClearanceApproval { approvals_needed: 1 }]
    );
}
