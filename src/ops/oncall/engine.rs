use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use super::domain::{
    AttemptResponse, Escalation, EscalationAttempt, EscalationSchedule, EscalationStatus,
    EscalationTier, EscalationTrigger, OnCallRotation, RecordedResponse,
};
use crate::ops::audit::AuditStamp;
use crate::ops::identity::{Actor, EscalationId, PersonId};

#[derive(Debug, Error)]
pub enum EscalationError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("escalation is already {}", .status.label())]
    NotEscalating { status: EscalationStatus },
    #[error("person {} was not contacted for the current attempt", .person.0)]
    NotContacted { person: PersonId },
    #[error("escalation must be acknowledged before resolution, found {}", .status.label())]
    NotAcknowledged { status: EscalationStatus },
    #[error("current attempt is still inside its response window")]
    TierStillWaiting,
    #[error("overall escalation timeout has not passed")]
    NotYetTimedOut,
}

/// Pure escalation decisions. The engine never sends anything and never
/// sleeps: it turns a snapshot plus the current time into the next
/// snapshot, and an external poller owns the actual timers.
#[derive(Debug, Clone, Default)]
pub struct EscalationEngine {
    schedule: EscalationSchedule,
}

impl EscalationEngine {
    pub fn new(schedule: EscalationSchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &EscalationSchedule {
        &self.schedule
    }

    /// Open the chain with attempt #1 against the primary assignee.
    pub fn initiate(
        &self,
        id: EscalationId,
        rotation: &OnCallRotation,
        trigger: EscalationTrigger,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Escalation, EscalationError> {
        if trigger.details.trim().is_empty() {
            return Err(EscalationError::Validation(
                "escalation trigger needs a stated reason".to_string(),
            ));
        }

        let window = Duration::minutes(self.schedule.window_minutes(EscalationTier::Primary));
        let overall = Duration::minutes(self.schedule.overall_timeout_minutes(rotation));
        let first = EscalationAttempt {
            attempt_number: 1,
            tier: EscalationTier::Primary,
            contacted: rotation.primary.person.clone(),
            contacts: rotation.primary.contacts.clone(),
            started_at: now,
            response_deadline: now + window,
            response: None,
        };

        Ok(Escalation {
            id,
            rotation: rotation.id.clone(),
            trigger,
            status: EscalationStatus::Escalating,
            attempts: vec![first],
            started_at: now,
            overall_deadline: now + overall,
            manual_override_required: false,
            failure_reason: None,
            audit: AuditStamp::new(actor, now),
        })
    }

    /// Record what the contacted responder said. Acknowledgement stops the
    /// ladder; a decline leaves the escalation waiting for an explicit
    /// tier advance. Only the person named on the open attempt may answer.
    pub fn record_response(
        &self,
        escalation: &Escalation,
        responder: &PersonId,
        response: AttemptResponse,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Escalation, EscalationError> {
        if escalation.status != EscalationStatus::Escalating {
            return Err(EscalationError::NotEscalating {
                status: escalation.status,
            });
        }
        let Some(attempt) = escalation.current_attempt() else {
            return Err(EscalationError::Validation(
                "escalation has no attempts on record".to_string(),
            ));
        };
        if &attempt.contacted != responder {
            return Err(EscalationError::NotContacted {
                person: responder.clone(),
            });
        }
        if attempt.response.is_some() {
            return Err(EscalationError::Validation(
                "current attempt already has a recorded response".to_string(),
            ));
        }

        let mut next = escalation.clone();
        if let Some(open) = next.attempts.last_mut() {
            open.response = Some(RecordedResponse {
                response,
                responded_at: now,
            });
        }
        if response == AttemptResponse::Acknowledged {
            next.status = EscalationStatus::Acknowledged;
        }
        next.audit = escalation.audit.bumped(actor, now);
        Ok(next)
    }

    /// Move to the next tier, strictly primary then backup then tertiary.
    /// Running past the last configured tier is the terminal failure that
    /// demands manual override, not an error and not a retry.
    pub fn escalate_to_next_tier(
        &self,
        escalation: &Escalation,
        rotation: &OnCallRotation,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Escalation, EscalationError> {
        if escalation.status != EscalationStatus::Escalating {
            return Err(EscalationError::NotEscalating {
                status: escalation.status,
            });
        }
        let Some(current) = escalation.current_attempt() else {
            return Err(EscalationError::Validation(
                "escalation has no attempts on record".to_string(),
            ));
        };
        let declined = matches!(
            current.response.map(|r| r.response),
            Some(AttemptResponse::Declined)
        );
        if !declined && now < current.response_deadline {
            return Err(EscalationError::TierStillWaiting);
        }

        let next_assignment = current
            .tier
            .next()
            .and_then(|tier| rotation.assignment_for(tier).map(|a| (tier, a)));
        let mut next = escalation.clone();
        match next_assignment {
            Some((tier, assignment)) => {
                let window = Duration::minutes(self.schedule.window_minutes(tier));
                // Deadlines never move backwards across attempts.
                let deadline = (now + window).max(current.response_deadline);
                next.attempts.push(EscalationAttempt {
                    attempt_number: current.attempt_number + 1,
                    tier,
                    contacted: assignment.person.clone(),
                    contacts: assignment.contacts.clone(),
                    started_at: now,
                    response_deadline: deadline,
                    response: None,
                });
            }
            None => {
                next.status = EscalationStatus::Failed;
                next.manual_override_required = true;
                next.failure_reason = Some(format!(
                    "no tier remains after {}; all on-call tiers exhausted without acknowledgement",
                    current.tier.label()
                ));
            }
        }
        next.audit = escalation.audit.bumped(actor, now);
        Ok(next)
    }

    /// Close out an acknowledged escalation once the field situation is
    /// actually handled.
    pub fn resolve(
        &self,
        escalation: &Escalation,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Escalation, EscalationError> {
        if escalation.status != EscalationStatus::Acknowledged {
            return Err(EscalationError::NotAcknowledged {
                status: escalation.status,
            });
        }
        let mut next = escalation.clone();
        next.status = EscalationStatus::Resolved;
        next.audit = escalation.audit.bumped(actor, now);
        Ok(next)
    }

    /// The open attempt's deadline has passed and nobody has acknowledged.
    pub fn is_overdue(&self, escalation: &Escalation, now: DateTime<Utc>) -> bool {
        escalation.status == EscalationStatus::Escalating
            && escalation
                .current_attempt()
                .is_some_and(|attempt| now >= attempt.response_deadline)
    }

    /// The whole chain has outrun its total budget.
    pub fn is_timed_out(&self, escalation: &Escalation, now: DateTime<Utc>) -> bool {
        escalation.status == EscalationStatus::Escalating && now >= escalation.overall_deadline
    }

    /// Explicit terminal transition for a chain that ran out its overall
    /// budget. Refused while time remains so pollers cannot fail early.
    pub fn fail_on_timeout(
        &self,
        escalation: &Escalation,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Escalation, EscalationError> {
        if escalation.status != EscalationStatus::Escalating {
            return Err(EscalationError::NotEscalating {
                status: escalation.status,
            });
        }
        if now < escalation.overall_deadline {
            return Err(EscalationError::NotYetTimedOut);
        }
        let mut next = escalation.clone();
        next.status = EscalationStatus::Failed;
        next.manual_override_required = true;
        next.failure_reason = Some("overall escalation timeout elapsed without acknowledgement".to_string());
        next.audit = escalation.audit.bumped(actor, now);
        Ok(next)
    }
}
