use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::domain::{
    DispatchNote, DispatchPriority, DispatchRequest, DispatchRequirements, DispatchStatus,
    DispatchTask, GeoPoint,
};
use crate::ops::audit::AuditStamp;
use crate::ops::identity::{Actor, CaseId, DispatchId, VolunteerId};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("cannot move dispatch from {} to {}", .from.label(), .to.label())]
    InvalidTransition {
        from: DispatchStatus,
        to: DispatchStatus,
    },
    #[error("dispatch is not assigned to volunteer {}", .volunteer.0)]
    NotAssignedVolunteer { volunteer: VolunteerId },
    #[error("volunteer {} already holds an active dispatch", .volunteer.0)]
    VolunteerBusy { volunteer: VolunteerId },
}

/// Everything a moderator supplies when opening a dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchIntake {
    pub case: CaseId,
    pub task: DispatchTask,
    pub priority: DispatchPriority,
    pub pickup: GeoPoint,
    pub destination: Option<GeoPoint>,
    #[serde(default)]
    pub requirements: DispatchRequirements,
}

/// Legal moves in the dispatch state machine. Everything else is refused.
pub const fn transition_allowed(from: DispatchStatus, to: DispatchStatus) -> bool {
    use DispatchStatus as S;
    matches!(
        (from, to),
        (S::Pending, S::Searching)
            | (S::Pending, S::Cancelled)
            | (S::Searching, S::Searching)
            | (S::Searching, S::Assigned)
            | (S::Searching, S::Cancelled)
            | (S::Searching, S::Failed)
            | (S::Assigned, S::Accepted)
            | (S::Assigned, S::Searching)
            | (S::Assigned, S::Cancelled)
            | (S::Assigned, S::Failed)
            | (S::Accepted, S::EnRoute)
            | (S::Accepted, S::Cancelled)
            | (S::Accepted, S::Failed)
            | (S::EnRoute, S::OnScene)
            | (S::EnRoute, S::Cancelled)
            | (S::EnRoute, S::Failed)
            | (S::OnScene, S::Completed)
            | (S::OnScene, S::Cancelled)
            | (S::OnScene, S::Failed)
    )
}

/// Build a fresh request in `Pending` with its opening history line.
pub fn open_request(
    id: DispatchId,
    intake: DispatchIntake,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<DispatchRequest, DispatchError> {
    if let Some(cap) = intake.requirements.max_distance {
        if !cap.is_finite() || cap <= 0.0 {
            return Err(DispatchError::Validation(
                "distance cap must be a positive number of map units".to_string(),
            ));
        }
    }

    Ok(DispatchRequest {
        id,
        case: intake.case,
        task: intake.task,
        priority: intake.priority,
        pickup: intake.pickup,
        destination: intake.destination,
        requirements: intake.requirements,
        status: DispatchStatus::Pending,
        candidates: Vec::new(),
        assigned_volunteer: None,
        notes: vec![DispatchNote {
            recorded_at: now,
            recorded_by: actor.person.clone(),
            status: DispatchStatus::Pending,
            note: "dispatch created".to_string(),
        }],
        audit: AuditStamp::new(actor, now),
    })
}

/// Move the request to `next_status`, appending the immutable history
/// line and bumping the version. Refused when the table forbids the move.
pub fn advance(
    request: &DispatchRequest,
    next_status: DispatchStatus,
    note: impl Into<String>,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<DispatchRequest, DispatchError> {
    if !transition_allowed(request.status, next_status) {
        return Err(DispatchError::InvalidTransition {
            from: request.status,
            to: next_status,
        });
    }

    let mut next = request.clone();
    next.status = next_status;
    next.notes.push(DispatchNote {
        recorded_at: now,
        recorded_by: actor.person.clone(),
        status: next_status,
        note: note.into(),
    });
    next.audit = request.audit.bumped(actor, now);
    Ok(next)
}

/// Assignment-holder guard shared by accept, decline, and progress
/// updates. Acting as the assignee without holding the assignment is a
/// hard error, never a no-op.
pub fn ensure_assignee(
    request: &DispatchRequest,
    volunteer: &VolunteerId,
) -> Result<(), DispatchError> {
    match &request.assigned_volunteer {
        Some(assigned) if assigned == volunteer => Ok(()),
        _ => Err(DispatchError::NotAssignedVolunteer {
            volunteer: volunteer.clone(),
        }),
    }
}
