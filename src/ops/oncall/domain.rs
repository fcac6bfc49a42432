use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ops::audit::AuditStamp;
use crate::ops::identity::{Actor, CaseId, EscalationId, PersonId, RotationId};

use super::engine::EscalationError;

/// How a responder can be reached. Attempts carry the full ordered list
/// so the person working the escalation knows what to try next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactKind {
    Phone,
    Sms,
    Email,
    Radio,
}

impl ContactKind {
    pub const fn label(self) -> &'static str {
        match self {
            ContactKind::Phone => "phone",
            ContactKind::Sms => "sms",
            ContactKind::Email => "email",
            ContactKind::Radio => "radio",
        }
    }
}

/// One way to reach a responder. Lower `priority` is tried first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactMethod {
    pub kind: ContactKind,
    pub address: String,
    pub priority: u8,
}

/// Escalation ladder position. Order matters: escalations walk strictly
/// downward through this list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTier {
    Primary,
    Backup,
    Tertiary,
}

impl EscalationTier {
    pub const fn label(self) -> &'static str {
        match self {
            EscalationTier::Primary => "primary",
            EscalationTier::Backup => "backup",
            EscalationTier::Tertiary => "tertiary",
        }
    }

    /// The tier that follows this one, if the ladder continues.
    pub const fn next(self) -> Option<EscalationTier> {
        match self {
            EscalationTier::Primary => Some(EscalationTier::Backup),
            EscalationTier::Backup => Some(EscalationTier::Tertiary),
            EscalationTier::Tertiary => None,
        }
    }
}

/// A responder plus the ordered contact methods for reaching them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnCallAssignment {
    pub person: PersonId,
    pub contacts: Vec<ContactMethod>,
}

/// Daily time window a rotation covers. `start == end` means the rotation
/// covers the whole day; `start > end` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl CoverageWindow {
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start == self.end {
            return true;
        }
        if self.start < self.end {
            self.start <= time && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

/// Everything a coordinator supplies when registering a rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationIntake {
    pub window: CoverageWindow,
    pub primary: OnCallAssignment,
    pub backup: OnCallAssignment,
    #[serde(default)]
    pub tertiary: Option<OnCallAssignment>,
}

/// Who answers when the schedule fires: a required primary and backup,
/// optionally a tertiary, all covering one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnCallRotation {
    pub id: RotationId,
    pub window: CoverageWindow,
    pub primary: OnCallAssignment,
    pub backup: OnCallAssignment,
    pub tertiary: Option<OnCallAssignment>,
    pub audit: AuditStamp,
}

impl OnCallRotation {
    /// Structural validation happens here, not at escalation time: the
    /// assignees must be pairwise distinct people and every assignment
    /// needs at least one contact method.
    pub fn new(
        id: RotationId,
        window: CoverageWindow,
        primary: OnCallAssignment,
        backup: OnCallAssignment,
        tertiary: Option<OnCallAssignment>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Self, EscalationError> {
        if primary.person == backup.person {
            return Err(EscalationError::Validation(
                "primary and backup must be different people".to_string(),
            ));
        }
        if let Some(third) = &tertiary {
            if third.person == primary.person || third.person == backup.person {
                return Err(EscalationError::Validation(
                    "tertiary must differ from primary and backup".to_string(),
                ));
            }
        }
        let mut assignments = vec![&primary, &backup];
        assignments.extend(tertiary.as_ref());
        if assignments.iter().any(|a| a.contacts.is_empty()) {
            return Err(EscalationError::Validation(
                "every assignment needs at least one contact method".to_string(),
            ));
        }

        let mut rotation = Self {
            id,
            window,
            primary,
            backup,
            tertiary,
            audit: AuditStamp::new(actor, now),
        };
        rotation.primary.contacts.sort_by_key(|c| c.priority);
        rotation.backup.contacts.sort_by_key(|c| c.priority);
        if let Some(third) = &mut rotation.tertiary {
            third.contacts.sort_by_key(|c| c.priority);
        }
        Ok(rotation)
    }

    pub fn assignment_for(&self, tier: EscalationTier) -> Option<&OnCallAssignment> {
        match tier {
            EscalationTier::Primary => Some(&self.primary),
            EscalationTier::Backup => Some(&self.backup),
            EscalationTier::Tertiary => self.tertiary.as_ref(),
        }
    }

    pub fn tier_count(&self) -> i64 {
        if self.tertiary.is_some() {
            3
        } else {
            2
        }
    }
}

/// Per-tier response windows and the pause between tiers, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationSchedule {
    pub primary_window_minutes: i64,
    pub backup_window_minutes: i64,
    pub tertiary_window_minutes: i64,
    pub inter_tier_delay_minutes: i64,
}

impl Default for EscalationSchedule {
    fn default() -> Self {
        Self {
            primary_window_minutes: 15,
            backup_window_minutes: 10,
            tertiary_window_minutes: 10,
            inter_tier_delay_minutes: 2,
        }
    }
}

impl EscalationSchedule {
    pub const fn window_minutes(&self, tier: EscalationTier) -> i64 {
        match tier {
            EscalationTier::Primary => self.primary_window_minutes,
            EscalationTier::Backup => self.backup_window_minutes,
            EscalationTier::Tertiary => self.tertiary_window_minutes,
        }
    }

    /// Total budget before the whole escalation is declared timed out:
    /// every window this rotation can reach plus the inter-tier pause for
    /// each hand-off.
    pub fn overall_timeout_minutes(&self, rotation: &OnCallRotation) -> i64 {
        let mut total = self.primary_window_minutes + self.backup_window_minutes;
        if rotation.tertiary.is_some() {
            total += self.tertiary_window_minutes;
        }
        total + self.inter_tier_delay_minutes * (rotation.tier_count() - 1)
    }
}

/// Where an escalation sits. Acknowledged stops the clocks but stays open
/// until someone confirms the field situation is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Escalating,
    Acknowledged,
    Resolved,
    Failed,
}

impl EscalationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            EscalationStatus::Escalating => "escalating",
            EscalationStatus::Acknowledged => "acknowledged",
            EscalationStatus::Resolved => "resolved",
            EscalationStatus::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, EscalationStatus::Resolved | EscalationStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptResponse {
    Acknowledged,
    Declined,
}

impl AttemptResponse {
    pub const fn label(self) -> &'static str {
        match self {
            AttemptResponse::Acknowledged => "acknowledged",
            AttemptResponse::Declined => "declined",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedResponse {
    pub response: AttemptResponse,
    pub responded_at: DateTime<Utc>,
}

/// One timed contact attempt against a tier. Attempts accumulate in an
/// append-only list; the open attempt's response is filled in exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationAttempt {
    pub attempt_number: u32,
    pub tier: EscalationTier,
    pub contacted: PersonId,
    pub contacts: Vec<ContactMethod>,
    pub started_at: DateTime<Utc>,
    pub response_deadline: DateTime<Utc>,
    pub response: Option<RecordedResponse>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTriggerKind {
    FieldEmergency,
    DispatchStalled,
    MedicalTransport,
    AfterHoursIntake,
}

impl EscalationTriggerKind {
    pub const fn label(self) -> &'static str {
        match self {
            EscalationTriggerKind::FieldEmergency => "field_emergency",
            EscalationTriggerKind::DispatchStalled => "dispatch_stalled",
            EscalationTriggerKind::MedicalTransport => "medical_transport",
            EscalationTriggerKind::AfterHoursIntake => "after_hours_intake",
        }
    }
}

/// Why the chain was started, tied back to the field case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationTrigger {
    pub case: CaseId,
    pub kind: EscalationTriggerKind,
    pub details: String,
}

/// The timed notification chain itself. `manual_override_required` flips
/// to true only on terminal failure; it is the signal a human must step in
/// outside the ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub id: EscalationId,
    pub rotation: RotationId,
    pub trigger: EscalationTrigger,
    pub status: EscalationStatus,
    pub attempts: Vec<EscalationAttempt>,
    pub started_at: DateTime<Utc>,
    pub overall_deadline: DateTime<Utc>,
    pub manual_override_required: bool,
    pub failure_reason: Option<String>,
    pub audit: AuditStamp,
}

impl Escalation {
    pub fn current_attempt(&self) -> Option<&EscalationAttempt> {
        self.attempts.last()
    }

    pub fn current_tier(&self) -> Option<EscalationTier> {
        self.current_attempt().map(|a| a.tier)
    }
}
