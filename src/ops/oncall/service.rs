use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::domain::{
    AttemptResponse, Escalation, EscalationSchedule, EscalationStatus, EscalationTrigger,
    OnCallRotation, RotationIntake,
};
use super::engine::{EscalationEngine, EscalationError};
use super::repository::{EscalationStore, RotationStore};
use crate::ops::audit::{AggregateKind, AuditError, AuditEvent, AuditEventKind, AuditSink};
use crate::ops::clock::Clock;
use crate::ops::identity::{Actor, EscalationId, IdGenerator, PersonId, RotationId};
use crate::ops::store::StoreError;

#[derive(Debug, Error)]
pub enum OnCallServiceError {
    #[error(transparent)]
    Escalation(#[from] EscalationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Audit(#[from] AuditError),
}

/// Orchestrates rotations and escalations against their stores and the
/// audit trail. The sweeps are written for a poller that may run on
/// several nodes at once: a version conflict means another node already
/// advanced that escalation, so the loser skips it instead of retrying.
pub struct OnCallService<R, S, A> {
    rotations: Arc<R>,
    escalations: Arc<S>,
    audit: Arc<A>,
    engine: EscalationEngine,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl<R, S, A> OnCallService<R, S, A>
where
    R: RotationStore,
    S: EscalationStore,
    A: AuditSink,
{
    pub fn new(
        rotations: Arc<R>,
        escalations: Arc<S>,
        audit: Arc<A>,
        schedule: EscalationSchedule,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            rotations,
            escalations,
            audit,
            engine: EscalationEngine::new(schedule),
            clock,
            ids,
        }
    }

    fn fetch_rotation(&self, id: &RotationId) -> Result<OnCallRotation, OnCallServiceError> {
        self.rotations
            .fetch(id)?
            .ok_or(OnCallServiceError::Store(StoreError::NotFound))
    }

    fn fetch_escalation(&self, id: &EscalationId) -> Result<Escalation, OnCallServiceError> {
        self.escalations
            .fetch(id)?
            .ok_or(OnCallServiceError::Store(StoreError::NotFound))
    }

    fn event(
        &self,
        kind: AuditEventKind,
        escalation: &Escalation,
        actor: &Actor,
        payload: serde_json::Value,
    ) -> AuditEvent {
        AuditEvent {
            id: self.ids.next_id("event"),
            aggregate: AggregateKind::Escalation,
            aggregate_id: escalation.id.0.clone(),
            kind,
            version: escalation.audit.version,
            recorded_at: self.clock.now(),
            actor: actor.clone(),
            correlation_id: Some(escalation.trigger.case.0.clone()),
            payload,
        }
    }

    pub fn register_rotation(
        &self,
        intake: RotationIntake,
        actor: &Actor,
    ) -> Result<OnCallRotation, OnCallServiceError> {
        let id = RotationId(self.ids.next_id("rotation"));
        let rotation = OnCallRotation::new(
            id,
            intake.window,
            intake.primary,
            intake.backup,
            intake.tertiary,
            actor,
            self.clock.now(),
        )?;
        let stored = self.rotations.insert(rotation)?;
        info!(
            rotation = %stored.id.0,
            primary = %stored.primary.person.0,
            backup = %stored.backup.person.0,
            "on-call rotation registered"
        );
        self.audit.record(AuditEvent {
            id: self.ids.next_id("event"),
            aggregate: AggregateKind::OnCallRotation,
            aggregate_id: stored.id.0.clone(),
            kind: AuditEventKind::OnCallRotationRegistered,
            version: stored.audit.version,
            recorded_at: self.clock.now(),
            actor: actor.clone(),
            correlation_id: None,
            payload: json!({
                "primary": stored.primary.person.0,
                "backup": stored.backup.person.0,
                "tertiary": stored.tertiary.as_ref().map(|a| a.person.0.clone()),
            }),
        })?;
        Ok(stored)
    }

    /// Start the chain against a rotation's primary responder.
    pub fn trigger_escalation(
        &self,
        rotation_id: &RotationId,
        trigger: EscalationTrigger,
        actor: &Actor,
    ) -> Result<Escalation, OnCallServiceError> {
        let rotation = self.fetch_rotation(rotation_id)?;
        let id = EscalationId(self.ids.next_id("escalation"));
        let escalation = self
            .engine
            .initiate(id, &rotation, trigger, actor, self.clock.now())?;
        let stored = self.escalations.insert(escalation)?;

        warn!(
            escalation = %stored.id.0,
            rotation = %rotation.id.0,
            trigger = stored.trigger.kind.label(),
            contacted = %rotation.primary.person.0,
            "field operation escalated"
        );
        self.audit.record(self.event(
            AuditEventKind::FieldOperationEscalated,
            &stored,
            actor,
            json!({
                "rotation": rotation.id.0,
                "trigger": stored.trigger.kind.label(),
                "tier": "primary",
                "contacted": rotation.primary.person.0,
            }),
        ))?;
        Ok(stored)
    }

    pub fn record_response(
        &self,
        id: &EscalationId,
        responder: &PersonId,
        response: AttemptResponse,
        actor: &Actor,
    ) -> Result<Escalation, OnCallServiceError> {
        let current = self.fetch_escalation(id)?;
        let next = self
            .engine
            .record_response(&current, responder, response, actor, self.clock.now())?;
        let stored = self.escalations.update(next, current.audit.version)?;

        info!(
            escalation = %stored.id.0,
            responder = %responder.0,
            response = response.label(),
            "escalation response recorded"
        );
        self.audit.record(self.event(
            AuditEventKind::EscalationResponseRecorded,
            &stored,
            actor,
            json!({ "responder": responder.0, "response": response.label() }),
        ))?;
        if stored.status == EscalationStatus::Acknowledged {
            self.audit.record(self.event(
                AuditEventKind::EscalationAcknowledged,
                &stored,
                actor,
                json!({ "responder": responder.0 }),
            ))?;
        }
        Ok(stored)
    }

    /// Explicit tier advance, either after a decline or once the open
    /// attempt is overdue.
    pub fn advance_tier(
        &self,
        id: &EscalationId,
        actor: &Actor,
    ) -> Result<Escalation, OnCallServiceError> {
        let current = self.fetch_escalation(id)?;
        self.advance_one(current, actor)
    }

    fn advance_one(
        &self,
        current: Escalation,
        actor: &Actor,
    ) -> Result<Escalation, OnCallServiceError> {
        let rotation = self.fetch_rotation(&current.rotation)?;
        let next = self
            .engine
            .escalate_to_next_tier(&current, &rotation, actor, self.clock.now())?;
        let stored = self.escalations.update(next, current.audit.version)?;

        if stored.status == EscalationStatus::Failed {
            warn!(
                escalation = %stored.id.0,
                reason = stored.failure_reason.as_deref().unwrap_or("unknown"),
                "escalation exhausted all tiers"
            );
            self.audit.record(self.event(
                AuditEventKind::EscalationFailed,
                &stored,
                actor,
                json!({
                    "reason": stored.failure_reason,
                    "manual_override_required": stored.manual_override_required,
                }),
            ))?;
        } else if let Some(attempt) = stored.current_attempt() {
            warn!(
                escalation = %stored.id.0,
                tier = attempt.tier.label(),
                contacted = %attempt.contacted.0,
                "escalation advanced to next tier"
            );
            self.audit.record(self.event(
                AuditEventKind::EscalationTierAdvanced,
                &stored,
                actor,
                json!({
                    "tier": attempt.tier.label(),
                    "attempt_number": attempt.attempt_number,
                    "contacted": attempt.contacted.0,
                }),
            ))?;
        }
        Ok(stored)
    }

    pub fn resolve(
        &self,
        id: &EscalationId,
        actor: &Actor,
    ) -> Result<Escalation, OnCallServiceError> {
        let current = self.fetch_escalation(id)?;
        let next = self.engine.resolve(&current, actor, self.clock.now())?;
        let stored = self.escalations.update(next, current.audit.version)?;
        info!(escalation = %stored.id.0, "escalation resolved");
        self.audit.record(self.event(
            AuditEventKind::EscalationResolved,
            &stored,
            actor,
            json!({}),
        ))?;
        Ok(stored)
    }

    /// Poller sweep: push every overdue open escalation to its next tier.
    pub fn advance_overdue(&self, actor: &Actor) -> Result<Vec<Escalation>, OnCallServiceError> {
        let now = self.clock.now();
        let mut advanced = Vec::new();
        for escalation in self.escalations.open()? {
            if !self.engine.is_overdue(&escalation, now) {
                continue;
            }
            let id = escalation.id.clone();
            match self.advance_one(escalation, actor) {
                Ok(stored) => advanced.push(stored),
                Err(OnCallServiceError::Store(StoreError::VersionConflict { .. })) => {
                    debug!(escalation = %id.0, "another node advanced this escalation first");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(advanced)
    }

    /// Poller sweep: terminally fail every open escalation that has outrun
    /// its overall budget.
    pub fn fail_timed_out(&self, actor: &Actor) -> Result<Vec<Escalation>, OnCallServiceError> {
        let now = self.clock.now();
        let mut failed = Vec::new();
        for escalation in self.escalations.open()? {
            if !self.engine.is_timed_out(&escalation, now) {
                continue;
            }
            let expected = escalation.audit.version;
            let next = self.engine.fail_on_timeout(&escalation, actor, now)?;
            let stored = match self.escalations.update(next, expected) {
                Ok(stored) => stored,
                Err(StoreError::VersionConflict { .. }) => {
                    debug!(escalation = %escalation.id.0, "another node closed this escalation first");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            warn!(escalation = %stored.id.0, "escalation timed out");
            self.audit.record(self.event(
                AuditEventKind::EscalationFailed,
                &stored,
                actor,
                json!({
                    "reason": stored.failure_reason,
                    "manual_override_required": stored.manual_override_required,
                }),
            ))?;
            failed.push(stored);
        }
        Ok(failed)
    }

    pub fn get(&self, id: &EscalationId) -> Result<Option<Escalation>, OnCallServiceError> {
        Ok(self.escalations.fetch(id)?)
    }

    pub fn get_rotation(
        &self,
        id: &RotationId,
    ) -> Result<Option<OnCallRotation>, OnCallServiceError> {
        Ok(self.rotations.fetch(id)?)
    }
}
