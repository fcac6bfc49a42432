use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};

use crate::ops::audit::{AuditError, AuditEvent, AuditEventKind, AuditSink};
use crate::ops::identity::{Actor, ActorRole, FoundReportId, LostReportId, MatchId};
use crate::ops::matching::domain::{
    FactorKind, MatchGateStatus, MatchPolicy, MatchingFactor, PotentialMatch,
};
use crate::ops::matching::gate::MatchGate;
use crate::ops::matching::repository::MatchStore;
use crate::ops::store::StoreError;

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap()
}

pub fn reviewer() -> Actor {
    Actor::new("person-reviewer", ActorRole::Moderator)
}

pub fn analyst() -> Actor {
    Actor::new("person-analyst", ActorRole::Coordinator)
}

pub fn match_gate() -> MatchGate {
    MatchGate::new(MatchPolicy::default())
}

pub fn factor(kind: FactorKind, matched: bool) -> MatchingFactor {
    let weight = MatchPolicy::default()
        .default_weight(kind)
        .expect("weight configured");
    MatchingFactor {
        factor: kind,
        weight,
        matched,
    }
}

/// Species + microchip + photo similarity: scores 85.
pub fn strong_factors() -> Vec<MatchingFactor> {
    vec![
        factor(FactorKind::Species, true),
        factor(FactorKind::Microchip, true),
        factor(FactorKind::PhotoSimilarity, true),
    ]
}

/// Species + photo + color: scores 43, inside the review band but below
/// the owner-notify threshold.
pub fn mid_factors() -> Vec<MatchingFactor> {
    vec![
        factor(FactorKind::Species, true),
        factor(FactorKind::PhotoSimilarity, true),
        factor(FactorKind::Color, true),
    ]
}

/// Species + color: scores 28, below the review threshold.
pub fn weak_factors() -> Vec<MatchingFactor> {
    vec![
        factor(FactorKind::Species, true),
        factor(FactorKind::Color, true),
    ]
}

pub fn new_match(id: &str, factors: Vec<MatchingFactor>) -> PotentialMatch {
    match_gate()
        .create_potential_match(
            MatchId(id.to_string()),
            LostReportId("lost-001".to_string()),
            FoundReportId("found-001".to_string()),
            factors,
            &analyst(),
            fixed_now(),
        )
        .expect("create match")
}

#[derive(Default)]
pub struct MemoryMatchStore {
    records: Mutex<BTreeMap<String, PotentialMatch>>,
}

impl MatchStore for MemoryMatchStore {
    fn insert(&self, m: PotentialMatch) -> Result<PotentialMatch, StoreError> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&m.id.0) {
            return Err(StoreError::AlreadyExists);
        }
        records.insert(m.id.0.clone(), m.clone());
        Ok(m)
    }

    fn update(
        &self,
        m: PotentialMatch,
        expected_version: u64,
    ) -> Result<PotentialMatch, StoreError> {
        let mut records = self.records.lock().unwrap();
        match records.get(&m.id.0) {
            None => Err(StoreError::NotFound),
            Some(existing) if existing.audit.version != expected_version => {
                Err(StoreError::VersionConflict {
                    expected: expected_version,
                    found: existing.audit.version,
                })
            }
            Some(_) => {
                records.insert(m.id.0.clone(), m.clone());
                Ok(m)
            }
        }
    }

    fn fetch(&self, id: &MatchId) -> Result<Option<PotentialMatch>, StoreError> {
        Ok(self.records.lock().unwrap().get(&id.0).cloned())
    }

    fn pending_review(&self) -> Result<Vec<PotentialMatch>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|m| {
                matches!(
                    m.gate_status,
                    MatchGateStatus::PendingAnalysis | MatchGateStatus::PendingHumanReview
                )
            })
            .cloned()
            .collect())
    }
}

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
}

impl AuditSink for RecordingAudit {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
