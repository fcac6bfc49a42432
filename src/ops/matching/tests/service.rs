use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::common::{
    fixed_now, reviewer, strong_factors, weak_factors, MemoryMatchStore, RecordingAudit,
};
use crate::ops::audit::AuditEventKind;
use crate::ops::clock::FixedClock;
use crate::ops::identity::{FoundReportId, LostReportId, SequenceIds};
use crate::ops::matching::domain::{
    ConfidenceLevel, MatchGateStatus, MatchPolicy, ReviewDecision,
};
use crate::ops::matching::gate::MatchError;
use crate::ops::matching::repository::MatchStore;
use crate::ops::matching::service::{MatchService, MatchServiceError};
use crate::ops::store::StoreError;

fn service_with(
    store: &Arc<MemoryMatchStore>,
    audit: &Arc<RecordingAudit>,
    now: DateTime<Utc>,
) -> MatchService<MemoryMatchStore, RecordingAudit> {
    MatchService::new(
        Arc::clone(store),
        Arc::clone(audit),
        MatchPolicy::default(),
        Arc::new(FixedClock(now)),
        Arc::new(SequenceIds::new()),
    )
}

fn service() -> (
    MatchService<MemoryMatchStore, RecordingAudit>,
    Arc<MemoryMatchStore>,
    Arc<RecordingAudit>,
) {
    let store = Arc::new(MemoryMatchStore::default());
    let audit = Arc::new(RecordingAudit::default());
    let service = service_with(&store, &audit, fixed_now());
    (service, store, audit)
}

fn reports(n: u32) -> (LostReportId, FoundReportId) {
    (
        LostReportId(format!("lost-{n:03}")),
        FoundReportId(format!("found-{n:03}")),
    )
}

#[test]
fn approved_match_walks_the_full_audited_path() {
    let (service, _store, audit) = service();
    let (lost, found) = reports(1);

    let m = service
        .create(lost, found, strong_factors(), &reviewer())
        .expect("create");
    assert_eq!(m.id.0, "match-000001");

    service
        .record_human_review(&m.id, ReviewDecision::Approve, None, &reviewer())
        .expect("review");
    let decision = service
        .evaluate_notification(&m.id, &reviewer())
        .expect("evaluate");
    assert!(decision.allowed);

    service
        .record_owner_notification(&m.id, &reviewer())
        .expect("notify");
    service
        .record_reunification_progress(&m.id, false, &reviewer())
        .expect("in progress");
    let done = service
        .record_reunification_progress(&m.id, true, &reviewer())
        .expect("complete");
    assert_eq!(done.gate_status, MatchGateStatus::ReunificationComplete);
    assert_eq!(done.audit.version, 5);

    assert_eq!(
        audit.kinds(),
        vec![
            AuditEventKind::PotentialMatchCreated,
            AuditEventKind::MatchHumanReviewRecorded,
            AuditEventKind::MatchGateEvaluated,
            AuditEventKind::OwnerNotificationRecorded,
            AuditEventKind::ReunificationProgressRecorded,
            AuditEventKind::ReunificationProgressRecorded,
        ]
    );
}

#[test]
fn blocked_evaluations_are_audited_and_notification_hard_fails() {
    let (service, _store, audit) = service();
    let (lost, found) = reports(2);
    let m = service
        .create(lost, found, strong_factors(), &reviewer())
        .expect("create");

    let decision = service
        .evaluate_notification(&m.id, &reviewer())
        .expect("evaluate");
    assert!(!decision.allowed);

    let refused = service.record_owner_notification(&m.id, &reviewer());
    assert!(matches!(
        refused,
        Err(MatchServiceError::Match(MatchError::NotificationBlocked(_)))
    ));

    assert_eq!(
        audit.kinds(),
        vec![
            AuditEventKind::PotentialMatchCreated,
            AuditEventKind::MatchGateEvaluated,
        ]
    );
}

#[test]
fn chip_mismatch_is_audited_as_a_rejection() {
    let (service, _store, audit) = service();
    let (lost, found) = reports(3);
    let m = service
        .create(lost, found, strong_factors(), &reviewer())
        .expect("create");
    service
        .record_human_review(&m.id, ReviewDecision::Approve, None, &reviewer())
        .expect("review");

    let m = service
        .record_chip_scan(&m.id, false, Some("chip registered elsewhere".to_string()), &reviewer())
        .expect("scan");
    assert_eq!(m.gate_status, MatchGateStatus::Rejected);
    assert_eq!(m.confidence, ConfidenceLevel::FalsePositive);

    assert_eq!(
        audit.kinds(),
        vec![
            AuditEventKind::PotentialMatchCreated,
            AuditEventKind::MatchHumanReviewRecorded,
            AuditEventKind::MatchChipVerificationRecorded,
            AuditEventKind::PotentialMatchRejected,
        ]
    );
}

#[test]
fn review_rejection_records_the_outcome_event() {
    let (service, _store, audit) = service();
    let (lost, found) = reports(4);
    let m = service
        .create(lost, found, strong_factors(), &reviewer())
        .expect("create");
    service
        .record_human_review(&m.id, ReviewDecision::Reject, None, &reviewer())
        .expect("review");

    assert_eq!(
        audit.kinds(),
        vec![
            AuditEventKind::PotentialMatchCreated,
            AuditEventKind::MatchHumanReviewRecorded,
            AuditEventKind::PotentialMatchRejected,
        ]
    );
}

#[test]
fn expire_stale_sweeps_only_unreviewed_matches() {
    let store = Arc::new(MemoryMatchStore::default());
    let audit = Arc::new(RecordingAudit::default());
    let early = service_with(&store, &audit, fixed_now());

    let (lost, found) = reports(5);
    let parked = early
        .create(lost, found, weak_factors(), &reviewer())
        .expect("parked match");
    let (lost, found) = reports(6);
    let approved = early
        .create(lost, found, strong_factors(), &reviewer())
        .expect("strong match");
    early
        .record_human_review(&approved.id, ReviewDecision::Approve, None, &reviewer())
        .expect("review");

    let late = service_with(&store, &audit, fixed_now() + Duration::hours(73));
    let expired = late.expire_stale(&reviewer()).expect("sweep");
    assert_eq!(expired, vec![parked.id.clone()]);

    let parked = store.fetch(&parked.id).expect("fetch").expect("present");
    assert_eq!(parked.gate_status, MatchGateStatus::Expired);
    let approved = store.fetch(&approved.id).expect("fetch").expect("present");
    assert_eq!(approved.gate_status, MatchGateStatus::PendingOwnerContact);

    let expiry_events = audit
        .kinds()
        .into_iter()
        .filter(|kind| *kind == AuditEventKind::PotentialMatchExpired)
        .count();
    assert_eq!(expiry_events, 1);
}

#[test]
fn stale_writers_hit_a_version_conflict() {
    let (service, store, _audit) = service();
    let (lost, found) = reports(7);
    let m = service
        .create(lost, found, strong_factors(), &reviewer())
        .expect("create");

    let snapshot = store.fetch(&m.id).expect("fetch").expect("present");
    service
        .record_human_review(&m.id, ReviewDecision::NeedsMoreInfo, None, &reviewer())
        .expect("fresh write");

    let stale = store.update(snapshot.clone(), snapshot.audit.version);
    assert!(matches!(
        stale,
        Err(StoreError::VersionConflict { expected: 1, found: 2 })
    ));
}
