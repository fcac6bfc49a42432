use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};

use crate::ops::audit::{AuditError, AuditEvent, AuditEventKind, AuditSink};
use crate::ops::claims::domain::{EvidenceKind, OwnershipClaim};
use crate::ops::claims::gate::{EvidenceEngine, EvidenceSubmission, ReleaseGate};
use crate::ops::claims::repository::ClaimStore;
use crate::ops::claims::score::EvidencePolicy;
use crate::ops::identity::{Actor, ActorRole, CaseId, ClaimId, EvidenceId, PersonId};
use crate::ops::store::StoreError;

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap()
}

pub fn claimant() -> PersonId {
    PersonId("person-claimant".to_string())
}

pub fn coordinator() -> Actor {
    Actor::new("person-coordinator", ActorRole::Coordinator)
}

pub fn moderator() -> Actor {
    Actor::new("person-moderator", ActorRole::Moderator)
}

pub fn second_moderator() -> Actor {
    Actor::new("person-moderator-2", ActorRole::Moderator)
}

pub fn lead() -> Actor {
    Actor::new("person-lead", ActorRole::LeadModerator)
}

pub fn admin() -> Actor {
    Actor::new("person-admin", ActorRole::Admin)
}

pub fn engine() -> EvidenceEngine {
    EvidenceEngine::new(EvidencePolicy::default())
}

pub fn release_gate() -> ReleaseGate {
    ReleaseGate::new(EvidencePolicy::default())
}

/// Fresh claim with no evidence, opened by the coordinator.
pub fn open_claim(id: &str) -> OwnershipClaim {
    engine().open_claim(
        ClaimId(id.to_string()),
        CaseId("case-001".to_string()),
        claimant(),
        &coordinator(),
        fixed_now(),
    )
}

/// Append one evidence item of the given kind via the engine.
pub fn with_evidence(claim: &OwnershipClaim, id: &str, kind: EvidenceKind) -> OwnershipClaim {
    engine()
        .add_evidence(
            claim,
            EvidenceId(id.to_string()),
            EvidenceSubmission { kind, notes: None },
            &coordinator(),
            fixed_now(),
        )
        .expect("add evidence")
}

/// Append and immediately verify one evidence item.
pub fn with_verified_evidence(
    claim: &OwnershipClaim,
    id: &str,
    kind: EvidenceKind,
) -> OwnershipClaim {
    let next = with_evidence(claim, id, kind);
    engine()
        .verify_evidence(&next, &EvidenceId(id.to_string()), &moderator(), fixed_now())
        .expect("verify evidence")
}

/// In-memory claim store with the same optimistic-concurrency contract as
/// the production store.
#[derive(Default)]
pub struct MemoryClaimStore {
    records: Mutex<BTreeMap<String, OwnershipClaim>>,
}

impl ClaimStore for MemoryClaimStore {
    fn insert(&self, claim: OwnershipClaim) -> Result<OwnershipClaim, StoreError> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&claim.id.0) {
            return Err(StoreError::AlreadyExists);
        }
        records.insert(claim.id.0.clone(), claim.clone());
        Ok(claim)
    }

    fn update(
        &self,
        claim: OwnershipClaim,
        expected_version: u64,
    ) -> Result<OwnershipClaim, StoreError> {
        let mut records = self.records.lock().unwrap();
        match records.get(&claim.id.0) {
            None => Err(StoreError::NotFound),
            Some(existing) if existing.audit.version != expected_version => {
                Err(StoreError::VersionConflict {
                    expected: expected_version,
                    found: existing.audit.version,
                })
            }
            Some(_) => {
                records.insert(claim.id.0.clone(), claim.clone());
                Ok(claim)
            }
        }
    }

    fn fetch(&self, id: &ClaimId) -> Result<Option<OwnershipClaim>, StoreError> {
        Ok(self.records.lock().unwrap().get(&id.0).cloned())
    }

    fn claims_for_case(&self, case: &CaseId) -> Result<Vec<OwnershipClaim>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|claim| &claim.case == case)
            .cloned()
            .collect())
    }
}

/// Audit sink that records every event for assertions.
#[derive(Default)]
pub struct RecordingAudit {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAudit {
    pub fn kinds(&self) -> Vec<AuditEventKind> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.kind)
            .collect()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingAudit {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
