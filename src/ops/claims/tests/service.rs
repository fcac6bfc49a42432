use std::sync::Arc;

use super::common::{
    claimant, fixed_now, moderator, second_moderator, MemoryClaimStore, RecordingAudit,
};
use crate::ops::audit::AuditEventKind;
use crate::ops::claims::domain::{ClaimStatus, EvidenceKind, HoldStatus};
use crate::ops::claims::gate::{EvidenceSubmission, ReviewOutcome, ReviewRuling};
use crate::ops::claims::repository::ClaimStore;
use crate::ops::claims::score::EvidencePolicy;
use crate::ops::claims::service::ClaimService;
use crate::ops::clock::FixedClock;
use crate::ops::identity::{
    Actor, ActorRole, CaseId, IdGenerator, PersonId, RoleAssertion, SequenceIds,
};
use crate::ops::store::StoreError;

fn service() -> (
    ClaimService<MemoryClaimStore, RecordingAudit>,
    Arc<MemoryClaimStore>,
    Arc<RecordingAudit>,
) {
    let store = Arc::new(MemoryClaimStore::default());
    let audit = Arc::new(RecordingAudit::default());
    let service = ClaimService::new(
        Arc::clone(&store),
        Arc::clone(&audit),
        EvidencePolicy::default(),
        Arc::new(FixedClock(fixed_now())),
        Arc::new(SequenceIds::new()),
    );
    (service, store, audit)
}

#[test]
fn submit_and_verify_records_the_full_audit_trail() {
    let (service, _store, audit) = service();
    let case = CaseId("case-100".to_string());

    let claim = service
        .submit_claim(case, claimant(), &moderator())
        .expect("submit");
    let claim = service
        .add_evidence(
            &claim.id,
            EvidenceSubmission {
                kind: EvidenceKind::MicrochipRegistration,
                notes: Some("chip 9851".to_string()),
            },
            &moderator(),
        )
        .expect("add evidence");
    let evidence_id = claim.evidence[0].id.clone();
    let claim = service
        .verify_evidence(&claim.id, &evidence_id, &moderator())
        .expect("verify");
    assert_eq!(claim.score.total, 80);

    let claim = service
        .record_review(
            &claim.id,
            ReviewRuling {
                outcome: ReviewOutcome::AuthorizeRelease,
                notes: "registry confirmed".to_string(),
            },
            &moderator(),
        )
        .expect("review");
    assert_eq!(claim.status, ClaimStatus::Verified);

    let claim = service
        .approve_clearance(&claim.id, &moderator())
        .expect("clearance");
    assert_eq!(claim.hold.status(), HoldStatus::Cleared);

    let kinds = audit.kinds();
    assert_eq!(
        kinds,
        vec![
            AuditEventKind::OwnershipClaimSubmitted,
            AuditEventKind::EvidenceRecorded,
            AuditEventKind::EvidenceVerified,
            AuditEventKind::OwnershipClaimReviewed,
            AuditEventKind::OwnershipClaimVerified,
            AuditEventKind::ReleaseClearanceApproved,
            AuditEventKind::ReleaseHoldCleared,
        ]
    );
}

#[test]
fn second_claim_on_a_case_flags_both_as_competing() {
    let (service, _store, audit) = service();
    let case = CaseId("case-200".to_string());

    let first = service
        .submit_claim(case.clone(), claimant(), &moderator())
        .expect("first claim");
    assert!(!first.competing_claim);

    let second = service
        .submit_claim(case, PersonId("person-other".to_string()), &moderator())
        .expect("second claim");
    assert!(second.competing_claim);

    let first = service.get(&first.id).expect("fetch").expect("present");
    assert!(first.competing_claim);
    assert!(first.hold.requires_two_person());

    assert!(audit
        .kinds()
        .contains(&AuditEventKind::CompetingClaimsFlagged));
}

#[test]
fn withdrawing_one_competitor_clears_the_flag_on_the_survivor() {
    let (service, _store, _audit) = service();
    let case = CaseId("case-300".to_string());

    let first = service
        .submit_claim(case.clone(), claimant(), &moderator())
        .expect("first claim");
    let second = service
        .submit_claim(case, PersonId("person-other".to_string()), &moderator())
        .expect("second claim");

    let owner = Actor {
        person: PersonId("person-other".to_string()),
        role: ActorRole::FieldVolunteer,
    };
    service.withdraw(&second.id, &owner).expect("withdraw");

    let survivor = service.get(&first.id).expect("fetch").expect("present");
    assert!(!survivor.competing_claim);
}

#[test]
fn stale_writers_hit_a_version_conflict() {
    let (service, store, _audit) = service();
    let case = CaseId("case-400".to_string());
    let claim = service
        .submit_claim(case, claimant(), &moderator())
        .expect("submit");

    let snapshot = store.fetch(&claim.id).expect("fetch").expect("present");
    service
        .add_evidence(
            &claim.id,
            EvidenceSubmission {
                kind: EvidenceKind::DatedPhoto,
                notes: None,
            },
            &moderator(),
        )
        .expect("fresh write");

    let stale = store.update(snapshot.clone(), snapshot.audit.version);
    assert!(matches!(
        stale,
        Err(StoreError::VersionConflict { expected: 1, found: 2 })
    ));
}

#[test]
fn clearance_evaluations_are_audited_even_when_blocked() {
    let (service, _store, audit) = service();
    let case = CaseId("case-500".to_string());
    let claim = service
        .submit_claim(case, claimant(), &moderator())
        .expect("submit");

    let decision = service
        .evaluate_clearance(&claim.id, ActorRole::Moderator, &moderator())
        .expect("evaluate");
    assert!(!decision.allowed);
    assert!(audit.kinds().contains(&AuditEventKind::ReleaseGateEvaluated));
}

#[test]
fn status_view_redacts_the_breakdown_below_moderator_rank() {
    let (service, _store, _audit) = service();
    let case = CaseId("case-600".to_string());
    let claim = service
        .submit_claim(case, claimant(), &moderator())
        .expect("submit");
    service
        .add_evidence(
            &claim.id,
            EvidenceSubmission {
                kind: EvidenceKind::DatedPhoto,
                notes: None,
            },
            &moderator(),
        )
        .expect("evidence");

    let public = service
        .status_view(
            &claim.id,
            RoleAssertion {
                role: ActorRole::FieldVolunteer,
                identity_verified: false,
            },
        )
        .expect("view");
    assert!(public.breakdown.is_none());

    // A verified coordinator rounds up to moderator rank and sees the
    // full breakdown.
    let elevated = service
        .status_view(
            &claim.id,
            RoleAssertion {
                role: ActorRole::Coordinator,
                identity_verified: true,
            },
        )
        .expect("view");
    assert!(elevated.breakdown.is_some());
}

#[test]
fn ids_are_minted_sequentially_per_prefix() {
    let ids = SequenceIds::new();
    assert_eq!(ids.next_id("claim"), "claim-000001");
    assert_eq!(ids.next_id("evidence"), "evidence-000002");

    let (service, _store, _audit) = service();
    let case = CaseId("case-700".to_string());
    let claim = service
        .submit_claim(case, claimant(), &second_moderator())
        .expect("submit");
    assert_eq!(claim.id.0, "claim-000001");
}
