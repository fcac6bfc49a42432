use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::domain::{
    ConfidenceLevel, FactorKind, MatchGateStatus, MatchPolicy, MatchingFactor, PotentialMatch,
    ReviewDecision, VerificationEvent, VerificationEventKind,
};
use crate::ops::audit::AuditStamp;
use crate::ops::identity::{Actor, FoundReportId, LostReportId, MatchId};
use crate::ops::scoring::matched_weight_sum;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid state transition: {0}")]
    InvalidTransition(String),
    #[error("owner notification blocked: {0}")]
    NotificationBlocked(String),
    #[error("match has not reached its expiry horizon")]
    NotYetExpired,
}

/// One gate a notification check exercises, with its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCheck {
    BlockFlagLifted,
    SpeciesFactorMatched,
    ConfidenceThresholdMet,
    HumanReviewOnFile,
    GateStatusReady,
}

impl NotificationCheck {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationCheck::BlockFlagLifted => "block_flag_lifted",
            NotificationCheck::SpeciesFactorMatched => "species_factor_matched",
            NotificationCheck::ConfidenceThresholdMet => "confidence_threshold_met",
            NotificationCheck::HumanReviewOnFile => "human_review_on_file",
            NotificationCheck::GateStatusReady => "gate_status_ready",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub check: NotificationCheck,
    pub passed: bool,
}

/// Outcome of the owner-notification gate. Blocked is data, not an error;
/// the decision always carries every check it ran so the audit trail can
/// show exactly which requirement failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationDecision {
    pub allowed: bool,
    pub reason: String,
    pub required_actions: Vec<String>,
    pub checks: Vec<CheckResult>,
}

/// Engine for potential-match creation and the owner-notification gate.
/// Fail-closed: every path that cannot prove a match is contactable
/// leaves it blocked.
#[derive(Debug, Clone)]
pub struct MatchGate {
    policy: MatchPolicy,
}

impl MatchGate {
    pub fn new(policy: MatchPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    fn validate_factors(&self, factors: &[MatchingFactor]) -> Result<(), MatchError> {
        if factors.is_empty() {
            return Err(MatchError::Validation(
                "a match needs at least one comparison factor".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for factor in factors {
            if factor.weight == 0 || factor.weight > self.policy.max_factor_weight {
                return Err(MatchError::Validation(format!(
                    "factor {} has weight {}; weights must be in 1..={}",
                    factor.factor.label(),
                    factor.weight,
                    self.policy.max_factor_weight
                )));
            }
            if !seen.insert(factor.factor) {
                return Err(MatchError::Validation(format!(
                    "factor {} appears more than once",
                    factor.factor.label()
                )));
            }
        }
        if !seen.contains(&FactorKind::Species) {
            return Err(MatchError::Validation(
                "a match must record the species factor".to_string(),
            ));
        }
        Ok(())
    }

    fn score(&self, factors: &[MatchingFactor]) -> u16 {
        matched_weight_sum(
            factors.iter().map(|factor| (factor.weight, factor.matched)),
            100,
        )
    }

    /// Validate factors, score them, and construct the match. Matches are
    /// born with owner notification blocked regardless of score; those
    /// below the review threshold park in `PendingAnalysis`.
    pub fn create_potential_match(
        &self,
        id: MatchId,
        lost_report: LostReportId,
        found_report: FoundReportId,
        factors: Vec<MatchingFactor>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<PotentialMatch, MatchError> {
        self.validate_factors(&factors)?;
        let score = self.score(&factors);
        let gate_status = if score >= self.policy.review_threshold {
            MatchGateStatus::PendingHumanReview
        } else {
            MatchGateStatus::PendingAnalysis
        };

        Ok(PotentialMatch {
            id,
            lost_report,
            found_report,
            confidence: self.policy.confidence_for(score),
            score,
            gate_status,
            factors,
            owner_notification_blocked: true,
            events: vec![VerificationEvent {
                kind: VerificationEventKind::AiAnalysis,
                decision: ReviewDecision::NeedsMoreInfo,
                recorded_by: actor.person.clone(),
                recorded_at: now,
                notes: Some(format!("initial analysis scored {score}")),
            }],
            audit: AuditStamp::new(actor, now),
        })
    }

    /// Re-run automated analysis with a fresh factor set. Analysis can
    /// promote a parked match into the review queue but can never lift
    /// the notification block or touch verified confidence levels.
    pub fn record_analysis(
        &self,
        m: &PotentialMatch,
        factors: Vec<MatchingFactor>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<PotentialMatch, MatchError> {
        if !matches!(
            m.gate_status,
            MatchGateStatus::PendingAnalysis | MatchGateStatus::PendingHumanReview
        ) {
            return Err(MatchError::InvalidTransition(format!(
                "match is {}; analysis only applies before review",
                m.gate_status.label()
            )));
        }
        self.validate_factors(&factors)?;

        let mut next = m.clone();
        next.score = self.score(&factors);
        next.factors = factors;
        next.confidence = self.policy.confidence_for(next.score);
        next.gate_status = if next.score >= self.policy.review_threshold {
            MatchGateStatus::PendingHumanReview
        } else {
            MatchGateStatus::PendingAnalysis
        };
        next.events.push(VerificationEvent {
            kind: VerificationEventKind::AiAnalysis,
            decision: ReviewDecision::NeedsMoreInfo,
            recorded_by: actor.person.clone(),
            recorded_at: now,
            notes: Some(format!("re-analysis scored {}", next.score)),
        });
        next.audit = m.audit.bumped(actor, now);
        Ok(next)
    }

    /// The single choke point before any owner-facing communication.
    pub fn can_notify_owner(&self, m: &PotentialMatch) -> NotificationDecision {
        let checks = vec![
            CheckResult {
                check: NotificationCheck::BlockFlagLifted,
                passed: !m.owner_notification_blocked,
            },
            CheckResult {
                check: NotificationCheck::SpeciesFactorMatched,
                passed: m.species_factor_matched(),
            },
            CheckResult {
                check: NotificationCheck::ConfidenceThresholdMet,
                passed: m.score >= self.policy.owner_notify_threshold,
            },
            CheckResult {
                check: NotificationCheck::HumanReviewOnFile,
                passed: m.has_human_approval(),
            },
            CheckResult {
                check: NotificationCheck::GateStatusReady,
                passed: matches!(
                    m.gate_status,
                    MatchGateStatus::PendingOwnerContact | MatchGateStatus::OwnerNotified
                ),
            },
        ];

        let allowed = checks.iter().all(|result| result.passed);
        let reason = if allowed {
            "all notification gates passed".to_string()
        } else {
            let failed: Vec<&str> = checks
                .iter()
                .filter(|result| !result.passed)
                .map(|result| result.check.label())
                .collect();
            format!("blocked by: {}", failed.join(", "))
        };
        let required_actions = checks
            .iter()
            .filter(|result| !result.passed)
            .map(|result| match result.check {
                NotificationCheck::BlockFlagLifted | NotificationCheck::HumanReviewOnFile => {
                    "record an approving human review".to_string()
                }
                NotificationCheck::SpeciesFactorMatched => {
                    "species must match before any owner contact".to_string()
                }
                NotificationCheck::ConfidenceThresholdMet => format!(
                    "confidence score must reach {}",
                    self.policy.owner_notify_threshold
                ),
                NotificationCheck::GateStatusReady => format!(
                    "match is {}; it must pass review first",
                    m.gate_status.label()
                ),
            })
            .collect();

        NotificationDecision {
            allowed,
            reason,
            required_actions,
            checks,
        }
    }

    /// Record a human review. Approval is the only way the notification
    /// block lifts; rejection is terminal and marks a false positive.
    pub fn record_human_review(
        &self,
        m: &PotentialMatch,
        decision: ReviewDecision,
        notes: Option<String>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<PotentialMatch, MatchError> {
        if m.gate_status.is_terminal() {
            return Err(MatchError::InvalidTransition(format!(
                "match is {} and no longer accepts review",
                m.gate_status.label()
            )));
        }

        let mut next = m.clone();
        next.events.push(VerificationEvent {
            kind: VerificationEventKind::HumanReview,
            decision,
            recorded_by: actor.person.clone(),
            recorded_at: now,
            notes,
        });
        match decision {
            ReviewDecision::Approve => {
                next.owner_notification_blocked = false;
                if matches!(
                    next.gate_status,
                    MatchGateStatus::PendingAnalysis | MatchGateStatus::PendingHumanReview
                ) {
                    next.gate_status = MatchGateStatus::PendingOwnerContact;
                }
                if next.confidence != ConfidenceLevel::ChipVerified {
                    next.confidence = ConfidenceLevel::HumanVerified;
                }
            }
            ReviewDecision::Reject => {
                next.owner_notification_blocked = true;
                next.gate_status = MatchGateStatus::Rejected;
                next.confidence = ConfidenceLevel::FalsePositive;
            }
            ReviewDecision::NeedsMoreInfo => {
                next.owner_notification_blocked = true;
                if matches!(
                    next.gate_status,
                    MatchGateStatus::PendingAnalysis | MatchGateStatus::PendingOwnerContact
                ) {
                    next.gate_status = MatchGateStatus::PendingHumanReview;
                }
            }
        }
        next.audit = m.audit.bumped(actor, now);
        Ok(next)
    }

    /// Record a chip scan. A confirmed chip raises confidence to the top
    /// of the ladder but still does not lift the notification block; a
    /// mismatch overrides everything, including an approved review.
    pub fn record_chip_scan(
        &self,
        m: &PotentialMatch,
        chip_matched: bool,
        notes: Option<String>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<PotentialMatch, MatchError> {
        if matches!(
            m.gate_status,
            MatchGateStatus::Rejected | MatchGateStatus::Expired
        ) {
            return Err(MatchError::InvalidTransition(format!(
                "match is {} and no longer accepts scans",
                m.gate_status.label()
            )));
        }

        let mut next = m.clone();
        next.events.push(VerificationEvent {
            kind: VerificationEventKind::ChipScan,
            decision: if chip_matched {
                ReviewDecision::Approve
            } else {
                ReviewDecision::Reject
            },
            recorded_by: actor.person.clone(),
            recorded_at: now,
            notes,
        });
        if chip_matched {
            next.confidence = ConfidenceLevel::ChipVerified;
        } else {
            next.owner_notification_blocked = true;
            next.gate_status = MatchGateStatus::Rejected;
            next.confidence = ConfidenceLevel::FalsePositive;
        }
        next.audit = m.audit.bumped(actor, now);
        Ok(next)
    }

    /// Record that the owner was contacted. Hard-fails unless the gate
    /// allows it right now.
    pub fn record_owner_notification(
        &self,
        m: &PotentialMatch,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<PotentialMatch, MatchError> {
        let decision = self.can_notify_owner(m);
        if !decision.allowed {
            return Err(MatchError::NotificationBlocked(decision.reason));
        }

        let mut next = m.clone();
        next.events.push(VerificationEvent {
            kind: VerificationEventKind::OwnerContact,
            decision: ReviewDecision::Approve,
            recorded_by: actor.person.clone(),
            recorded_at: now,
            notes: None,
        });
        next.gate_status = MatchGateStatus::OwnerNotified;
        next.audit = m.audit.bumped(actor, now);
        Ok(next)
    }

    /// Walk reunification forward: notified -> in progress -> complete.
    pub fn record_reunification_progress(
        &self,
        m: &PotentialMatch,
        completed: bool,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<PotentialMatch, MatchError> {
        let next_status = match (m.gate_status, completed) {
            (MatchGateStatus::OwnerNotified, false) => MatchGateStatus::ReunificationInProgress,
            (MatchGateStatus::ReunificationInProgress, true) => {
                MatchGateStatus::ReunificationComplete
            }
            _ => {
                return Err(MatchError::InvalidTransition(format!(
                    "cannot record reunification progress from {}",
                    m.gate_status.label()
                )))
            }
        };

        let mut next = m.clone();
        next.gate_status = next_status;
        next.audit = m.audit.bumped(actor, now);
        Ok(next)
    }

    /// Whether the match has sat unreviewed past the expiry horizon.
    pub fn is_expired(&self, m: &PotentialMatch, now: DateTime<Utc>) -> bool {
        matches!(
            m.gate_status,
            MatchGateStatus::PendingAnalysis | MatchGateStatus::PendingHumanReview
        ) && m.age_hours(now) >= self.policy.unreviewed_expiry_hours
    }

    /// Expire a stale unreviewed match so it stops surfacing in queues.
    pub fn mark_expired(
        &self,
        m: &PotentialMatch,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<PotentialMatch, MatchError> {
        if !self.is_expired(m, now) {
            return Err(MatchError::NotYetExpired);
        }

        let mut next = m.clone();
        next.gate_status = MatchGateStatus::Expired;
        next.owner_notification_blocked = true;
        next.audit = m.audit.bumped(actor, now);
        Ok(next)
    }
}
