use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};

use crate::ops::audit::{AuditError, AuditEvent, AuditEventKind, AuditSink};
use crate::ops::dispatch::domain::{
    DispatchPolicy, DispatchPriority, DispatchRequest, DispatchRequirements, DispatchTask,
    Equipment, ExperienceLevel, GeoPoint, Skill, VolunteerDispatchProfile, VolunteerRole,
};
use crate::ops::dispatch::lifecycle::{open_request, DispatchIntake};
use crate::ops::dispatch::matcher::DispatchMatcher;
use crate::ops::dispatch::repository::DispatchStore;
use crate::ops::identity::{Actor, ActorRole, CaseId, DispatchId, VolunteerId};
use crate::ops::store::StoreError;

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 1, 8, 0, 0).unwrap()
}

pub fn dispatcher() -> Actor {
    Actor::new("person-dispatcher", ActorRole::Moderator)
}

pub fn responder(person: &str) -> Actor {
    Actor::new(person, ActorRole::FieldVolunteer)
}

pub fn matcher() -> DispatchMatcher {
    DispatchMatcher::new(DispatchPolicy::default())
}

pub fn base_requirements() -> DispatchRequirements {
    DispatchRequirements {
        roles: BTreeSet::from([VolunteerRole::FieldResponder]),
        skills: BTreeSet::from([Skill::AnimalHandling]),
        equipment: BTreeSet::from([Equipment::Vehicle]),
        physical: BTreeSet::new(),
        max_distance: None,
    }
}

pub fn intake(requirements: DispatchRequirements) -> DispatchIntake {
    DispatchIntake {
        case: CaseId("case-900".to_string()),
        task: DispatchTask::FieldSearch,
        priority: DispatchPriority::Routine,
        pickup: GeoPoint { x: 0.0, y: 0.0 },
        destination: None,
        requirements,
    }
}

/// Pending request at the origin with the baseline requirements.
pub fn base_request(id: &str) -> DispatchRequest {
    open_request(
        DispatchId(id.to_string()),
        intake(base_requirements()),
        &dispatcher(),
        fixed_now(),
    )
    .expect("open request")
}

/// Available field responder at `(x, 0)` satisfying the baseline
/// requirements, with middling history figures.
pub fn profile(id: &str, x: f64) -> VolunteerDispatchProfile {
    VolunteerDispatchProfile {
        volunteer: VolunteerId(id.to_string()),
        location: GeoPoint { x, y: 0.0 },
        available: true,
        roles: BTreeSet::from([VolunteerRole::FieldResponder, VolunteerRole::Driver]),
        skills: BTreeSet::from([Skill::AnimalHandling, Skill::AnimalFirstAid]),
        equipment: BTreeSet::from([Equipment::Vehicle, Equipment::TransportCrate]),
        physical: BTreeSet::new(),
        experience: ExperienceLevel::Intermediate,
        completed_dispatches: 10,
        responsiveness: 70,
        current_load: 20,
    }
}

/// In-memory dispatch store with the optimistic-concurrency contract and
/// a volunteer reservation ledger.
#[derive(Default)]
pub struct MemoryDispatchStore {
    records: Mutex<BTreeMap<String, DispatchRequest>>,
    reservations: Mutex<BTreeMap<String, String>>,
}

impl DispatchStore for MemoryDispatchStore {
    fn insert(&self, request: DispatchRequest) -> Result<DispatchRequest, StoreError> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&request.id.0) {
            return Err(StoreError::AlreadyExists);
        }
        records.insert(request.id.0.clone(), request.clone());
        Ok(request)
    }

    fn update(
        &self,
        request: DispatchRequest,
        expected_version: u64,
    ) -> Result<DispatchRequest, StoreError> {
        let mut records = self.records.lock().unwrap();
        match records.get(&request.id.0) {
            None => Err(StoreError::NotFound),
            Some(existing) if existing.audit.version != expected_version => {
                Err(StoreError::VersionConflict {
                    expected: expected_version,
                    found: existing.audit.version,
                })
            }
            Some(_) => {
                records.insert(request.id.0.clone(), request.clone());
                Ok(request)
            }
        }
    }

    fn fetch(&self, id: &DispatchId) -> Result<Option<DispatchRequest>, StoreError> {
        Ok(self.records.lock().unwrap().get(&id.0).cloned())
    }

    fn reserve(&self, volunteer: &VolunteerId, dispatch: &DispatchId) -> Result<bool, StoreError> {
        let mut reservations = self.reservations.lock().unwrap();
        if reservations.contains_key(&volunteer.0) {
            return Ok(false);
        }
        reservations.insert(volunteer.0.clone(), dispatch.0.clone());
        Ok(true)
    }

    fn release(&self, volunteer: &VolunteerId, dispatch: &DispatchId) -> Result<(), StoreError> {
        let mut reservations = self.reservations.lock().unwrap();
        if reservations.get(&volunteer.0) == Some(&dispatch.0) {
            reservations.remove(&volunteer.0);
        }
        Ok(())
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
}

impl AuditSink for RecordingAudit {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
