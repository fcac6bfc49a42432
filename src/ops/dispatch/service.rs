use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use super::domain::{DispatchPolicy, DispatchRequest, DispatchStatus, TravelModel, VolunteerDispatchProfile};
use super::lifecycle::{advance, ensure_assignee, open_request, DispatchError, DispatchIntake};
use super::matcher::{DispatchMatcher, DispatchSearch};
use super::repository::DispatchStore;
use crate::ops::audit::{AggregateKind, AuditError, AuditEvent, AuditEventKind, AuditSink};
use crate::ops::clock::Clock;
use crate::ops::identity::{Actor, DispatchId, IdGenerator, VolunteerId};
use crate::ops::store::StoreError;

#[derive(Debug, Error)]
pub enum DispatchServiceError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Audit(#[from] AuditError),
}

/// Orchestrates the dispatch lifecycle against a store and the audit
/// trail. Volunteer reservations go through the store's conditional
/// reserve so two concurrent assignments cannot both win.
pub struct DispatchService<S, A> {
    store: Arc<S>,
    audit: Arc<A>,
    matcher: DispatchMatcher,
    travel: Arc<dyn TravelModel>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl<S, A> DispatchService<S, A>
where
    S: DispatchStore,
    A: AuditSink,
{
    pub fn new(
        store: Arc<S>,
        audit: Arc<A>,
        policy: DispatchPolicy,
        travel: Arc<dyn TravelModel>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            store,
            audit,
            matcher: DispatchMatcher::new(policy),
            travel,
            clock,
            ids,
        }
    }

    fn fetch_required(&self, id: &DispatchId) -> Result<DispatchRequest, DispatchServiceError> {
        self.store
            .fetch(id)?
            .ok_or(DispatchServiceError::Store(StoreError::NotFound))
    }

    fn event(
        &self,
        kind: AuditEventKind,
        request: &DispatchRequest,
        actor: &Actor,
        payload: serde_json::Value,
    ) -> AuditEvent {
        AuditEvent {
            id: self.ids.next_id("event"),
            aggregate: AggregateKind::DispatchRequest,
            aggregate_id: request.id.0.clone(),
            kind,
            version: request.audit.version,
            recorded_at: self.clock.now(),
            actor: actor.clone(),
            correlation_id: Some(request.case.0.clone()),
            payload,
        }
    }

    pub fn create(
        &self,
        intake: DispatchIntake,
        actor: &Actor,
    ) -> Result<DispatchRequest, DispatchServiceError> {
        let id = DispatchId(self.ids.next_id("dispatch"));
        let request = open_request(id, intake, actor, self.clock.now())?;
        let stored = self.store.insert(request)?;
        info!(
            dispatch = %stored.id.0,
            task = stored.task.label(),
            priority = stored.priority.label(),
            "dispatch created"
        );
        self.audit.record(self.event(
            AuditEventKind::DispatchCreated,
            &stored,
            actor,
            json!({ "task": stored.task.label(), "priority": stored.priority.label() }),
        ))?;
        Ok(stored)
    }

    /// Run the matcher against a fresh profile snapshot and park the
    /// ranked list on the request. Legal while nothing is assigned.
    pub fn rank_candidates(
        &self,
        id: &DispatchId,
        search: &DispatchSearch,
        profiles: &[VolunteerDispatchProfile],
        actor: &Actor,
    ) -> Result<DispatchRequest, DispatchServiceError> {
        let current = self.fetch_required(id)?;
        if !matches!(
            current.status,
            DispatchStatus::Pending | DispatchStatus::Searching
        ) {
            return Err(DispatchError::InvalidTransition {
                from: current.status,
                to: DispatchStatus::Searching,
            }
            .into());
        }

        let ranked = self
            .matcher
            .find_matches(&current, search, profiles, self.travel.as_ref());
        let note = format!("ranked {} candidates", ranked.len());
        let mut next = advance(&current, DispatchStatus::Searching, note, actor, self.clock.now())?;
        next.candidates = ranked;
        let stored = self.store.update(next, current.audit.version)?;

        let top: Vec<&str> = stored
            .candidates
            .iter()
            .map(|m| m.volunteer.0.as_str())
            .collect();
        self.audit.record(self.event(
            AuditEventKind::DispatchCandidatesRanked,
            &stored,
            actor,
            json!({ "count": stored.candidates.len(), "ranked": top }),
        ))?;
        Ok(stored)
    }

    /// Reserve the volunteer and hand them the dispatch. The reservation
    /// is conditional: a volunteer already holding an active dispatch is
    /// refused, and a lost write race rolls the reservation back.
    pub fn assign(
        &self,
        id: &DispatchId,
        volunteer: VolunteerId,
        actor: &Actor,
    ) -> Result<DispatchRequest, DispatchServiceError> {
        let current = self.fetch_required(id)?;
        let note = format!("assigned to volunteer {}", volunteer.0);
        let mut next = advance(&current, DispatchStatus::Assigned, note, actor, self.clock.now())?;
        next.assigned_volunteer = Some(volunteer.clone());

        if !self.store.reserve(&volunteer, id)? {
            return Err(DispatchError::VolunteerBusy { volunteer }.into());
        }
        let stored = match self.store.update(next, current.audit.version) {
            Ok(stored) => stored,
            Err(err) => {
                self.store.release(&volunteer, id)?;
                return Err(err.into());
            }
        };

        info!(dispatch = %stored.id.0, volunteer = %volunteer.0, "dispatch assigned");
        self.audit.record(self.event(
            AuditEventKind::DispatchAssigned,
            &stored,
            actor,
            json!({ "volunteer": volunteer.0 }),
        ))?;
        Ok(stored)
    }

    /// Acceptance is only valid from the currently assigned volunteer.
    pub fn accept(
        &self,
        id: &DispatchId,
        volunteer: &VolunteerId,
        actor: &Actor,
    ) -> Result<DispatchRequest, DispatchServiceError> {
        let current = self.fetch_required(id)?;
        ensure_assignee(&current, volunteer)?;
        let next = advance(
            &current,
            DispatchStatus::Accepted,
            "assignment accepted",
            actor,
            self.clock.now(),
        )?;
        let stored = self.store.update(next, current.audit.version)?;
        info!(dispatch = %stored.id.0, volunteer = %volunteer.0, "dispatch accepted");
        self.audit.record(self.event(
            AuditEventKind::DispatchAccepted,
            &stored,
            actor,
            json!({ "volunteer": volunteer.0 }),
        ))?;
        Ok(stored)
    }

    /// Assigned volunteer bows out; the request returns to the search
    /// pool and the reservation is released.
    pub fn decline(
        &self,
        id: &DispatchId,
        volunteer: &VolunteerId,
        reason: Option<String>,
        actor: &Actor,
    ) -> Result<DispatchRequest, DispatchServiceError> {
        let current = self.fetch_required(id)?;
        ensure_assignee(&current, volunteer)?;
        let note = match &reason {
            Some(reason) => format!("assignment declined: {reason}"),
            None => "assignment declined".to_string(),
        };
        let mut next = advance(&current, DispatchStatus::Searching, note, actor, self.clock.now())?;
        next.assigned_volunteer = None;
        let stored = self.store.update(next, current.audit.version)?;
        self.store.release(volunteer, id)?;

        info!(dispatch = %stored.id.0, volunteer = %volunteer.0, "dispatch declined");
        self.audit.record(self.event(
            AuditEventKind::DispatchDeclined,
            &stored,
            actor,
            json!({ "volunteer": volunteer.0, "route": "declined", "reason": reason }),
        ))?;
        Ok(stored)
    }

    /// Assignment sat unanswered past its window; the poller pushes the
    /// request back into the search pool.
    pub fn timeout_assignment(
        &self,
        id: &DispatchId,
        actor: &Actor,
    ) -> Result<DispatchRequest, DispatchServiceError> {
        let current = self.fetch_required(id)?;
        let Some(volunteer) = current.assigned_volunteer.clone() else {
            return Err(DispatchError::InvalidTransition {
                from: current.status,
                to: DispatchStatus::Searching,
            }
            .into());
        };
        let mut next = advance(
            &current,
            DispatchStatus::Searching,
            "assignment timed out without acceptance",
            actor,
            self.clock.now(),
        )?;
        next.assigned_volunteer = None;
        let stored = self.store.update(next, current.audit.version)?;
        self.store.release(&volunteer, id)?;

        warn!(dispatch = %stored.id.0, volunteer = %volunteer.0, "assignment timed out");
        self.audit.record(self.event(
            AuditEventKind::DispatchDeclined,
            &stored,
            actor,
            json!({ "volunteer": volunteer.0, "route": "timeout" }),
        ))?;
        Ok(stored)
    }

    /// En-route and on-scene updates from the assigned volunteer.
    pub fn update_progress(
        &self,
        id: &DispatchId,
        volunteer: &VolunteerId,
        next_status: DispatchStatus,
        actor: &Actor,
    ) -> Result<DispatchRequest, DispatchServiceError> {
        if !matches!(
            next_status,
            DispatchStatus::EnRoute | DispatchStatus::OnScene
        ) {
            return Err(DispatchError::Validation(
                "progress updates are limited to en_route and on_scene".to_string(),
            )
            .into());
        }
        let current = self.fetch_required(id)?;
        ensure_assignee(&current, volunteer)?;
        let note = format!("volunteer reported {}", next_status.label());
        let next = advance(&current, next_status, note, actor, self.clock.now())?;
        let stored = self.store.update(next, current.audit.version)?;
        self.audit.record(self.event(
            AuditEventKind::DispatchStatusChanged,
            &stored,
            actor,
            json!({ "status": stored.status.label() }),
        ))?;
        Ok(stored)
    }

    pub fn complete(
        &self,
        id: &DispatchId,
        volunteer: &VolunteerId,
        note: Option<String>,
        actor: &Actor,
    ) -> Result<DispatchRequest, DispatchServiceError> {
        let current = self.fetch_required(id)?;
        ensure_assignee(&current, volunteer)?;
        let line = note.unwrap_or_else(|| "task completed".to_string());
        let next = advance(
            &current,
            DispatchStatus::Completed,
            line.clone(),
            actor,
            self.clock.now(),
        )?;
        let stored = self.store.update(next, current.audit.version)?;
        self.store.release(volunteer, id)?;

        info!(dispatch = %stored.id.0, volunteer = %volunteer.0, "dispatch completed");
        self.audit.record(self.event(
            AuditEventKind::DispatchCompleted,
            &stored,
            actor,
            json!({ "volunteer": volunteer.0, "note": line }),
        ))?;
        Ok(stored)
    }

    pub fn cancel(
        &self,
        id: &DispatchId,
        reason: impl Into<String>,
        actor: &Actor,
    ) -> Result<DispatchRequest, DispatchServiceError> {
        self.close(id, DispatchStatus::Cancelled, reason.into(), actor)
    }

    pub fn fail(
        &self,
        id: &DispatchId,
        reason: impl Into<String>,
        actor: &Actor,
    ) -> Result<DispatchRequest, DispatchServiceError> {
        self.close(id, DispatchStatus::Failed, reason.into(), actor)
    }

    fn close(
        &self,
        id: &DispatchId,
        terminal: DispatchStatus,
        reason: String,
        actor: &Actor,
    ) -> Result<DispatchRequest, DispatchServiceError> {
        let current = self.fetch_required(id)?;
        let next = advance(&current, terminal, reason.clone(), actor, self.clock.now())?;
        let stored = self.store.update(next, current.audit.version)?;
        if let Some(volunteer) = &stored.assigned_volunteer {
            self.store.release(volunteer, id)?;
        }

        let kind = if terminal == DispatchStatus::Cancelled {
            info!(dispatch = %stored.id.0, reason = %reason, "dispatch cancelled");
            AuditEventKind::DispatchCancelled
        } else {
            warn!(dispatch = %stored.id.0, reason = %reason, "dispatch failed");
            AuditEventKind::DispatchFailed
        };
        self.audit
            .record(self.event(kind, &stored, actor, json!({ "reason": reason })))?;
        Ok(stored)
    }

    pub fn get(&self, id: &DispatchId) -> Result<Option<DispatchRequest>, DispatchServiceError> {
        Ok(self.store.fetch(id)?)
    }
}
