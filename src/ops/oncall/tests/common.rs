use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, NaiveTime, TimeZone, Utc};

use crate::ops::audit::{AuditError, AuditEvent, AuditEventKind, AuditSink};
use crate::ops::identity::{Actor, ActorRole, CaseId, EscalationId, PersonId, RotationId};
use crate::ops::oncall::domain::{
    ContactKind, ContactMethod, CoverageWindow, Escalation, EscalationSchedule,
    EscalationTrigger, EscalationTriggerKind, OnCallAssignment, OnCallRotation,
};
use crate::ops::oncall::engine::EscalationEngine;
use crate::ops::oncall::repository::{EscalationStore, RotationStore};
use crate::ops::store::StoreError;

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 8, 5, 22, 0, 0).unwrap()
}

pub fn coordinator() -> Actor {
    Actor::new("person-coordinator", ActorRole::Coordinator)
}

pub fn night_window() -> CoverageWindow {
    CoverageWindow {
        start: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
        end: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
    }
}

pub fn contact(kind: ContactKind, address: &str, priority: u8) -> ContactMethod {
    ContactMethod {
        kind,
        address: address.to_string(),
        priority,
    }
}

pub fn assignment(person: &str) -> OnCallAssignment {
    OnCallAssignment {
        person: PersonId(person.to_string()),
        contacts: vec![
            contact(ContactKind::Phone, &format!("{person}-phone"), 1),
            contact(ContactKind::Sms, &format!("{person}-sms"), 2),
        ],
    }
}

/// Primary and backup only; the ladder ends at backup.
pub fn two_tier_rotation(id: &str) -> OnCallRotation {
    OnCallRotation::new(
        RotationId(id.to_string()),
        night_window(),
        assignment("person-primary"),
        assignment("person-backup"),
        None,
        &coordinator(),
        fixed_now(),
    )
    .expect("rotation")
}

pub fn three_tier_rotation(id: &str) -> OnCallRotation {
    OnCallRotation::new(
        RotationId(id.to_string()),
        night_window(),
        assignment("person-primary"),
        assignment("person-backup"),
        Some(assignment("person-tertiary")),
        &coordinator(),
        fixed_now(),
    )
    .expect("rotation")
}

pub fn trigger() -> EscalationTrigger {
    EscalationTrigger {
        case: CaseId("case-700".to_string()),
        kind: EscalationTriggerKind::FieldEmergency,
        details: "injured dog reported on the highway shoulder".to_string(),
    }
}

pub fn engine() -> EscalationEngine {
    EscalationEngine::new(EscalationSchedule::default())
}

#[derive(Default)]
pub struct MemoryRotationStore {
    records: Mutex<BTreeMap<String, OnCallRotation>>,
}

impl RotationStore for MemoryRotationStore {
    fn insert(&self, rotation: OnCallRotation) -> Result<OnCallRotation, StoreError> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&rotation.id.0) {
            return Err(StoreError::AlreadyExists);
        }
        records.insert(rotation.id.0.clone(), rotation.clone());
        Ok(rotation)
    }

    fn fetch(&self, id: &RotationId) -> Result<Option<OnCallRotation>, StoreError> {
        Ok(self.records.lock().unwrap().get(&id.0).cloned())
    }
}

#[derive(Default)]
pub struct MemoryEscalationStore {
    records: Mutex<BTreeMap<String, Escalation>>,
}

impl EscalationStore for MemoryEscalationStore {
    fn insert(&self, escalation: Escalation) -> Result<Escalation, StoreError> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&escalation.id.0) {
            return Err(StoreError::AlreadyExists);
        }
        records.insert(escalation.id.0.clone(), escalation.clone());
        Ok(escalation)
    }

    fn update(
        &self,
        escalation: Escalation,
        expected_version: u64,
    ) -> Result<Escalation, StoreError> {
        let mut records = self.records.lock().unwrap();
        match records.get(&escalation.id.0) {
            None => Err(StoreError::NotFound),
            Some(existing) if existing.audit.version != expected_version => {
                Err(StoreError::VersionConflict {
                    expected: expected_version,
                    found: existing.audit.version,
                })
            }
            Some(_) => {
                records.insert(escalation.id.0.clone(), escalation.clone());
                Ok(escalation)
            }
        }
    }

    fn fetch(&self, id: &EscalationId) -> Result<Option<Escalation>, StoreError> {
        Ok(self.records.lock().unwrap().get(&id.0).cloned())
    }

    fn open(&self) -> Result<Vec<Escalation>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|e| !e.status.is_terminal())
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
