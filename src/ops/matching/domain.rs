use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ops::audit::AuditStamp;
use crate::ops::identity::{FoundReportId, LostReportId, MatchId, PersonId};

/// Confidence ladder for a potential match. Score-derived levels sit at
/// the bottom; human and chip verification sit above anything automated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Unverified,
    Low,
    Moderate,
    High,
    HumanVerified,
    ChipVerified,
    FalsePositive,
}

impl ConfidenceLevel {
    pub const fn label(self) -> &'static str {
        match self {
            ConfidenceLevel::Unverified => "unverified",
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Moderate => "moderate",
            ConfidenceLevel::High => "high",
            ConfidenceLevel::HumanVerified => "human_verified",
            ConfidenceLevel::ChipVerified => "chip_verified",
            ConfidenceLevel::FalsePositive => "false_positive",
        }
    }
}

/// Gate position of a potential match. Owner-facing communication is only
/// legal in `PendingOwnerContact` and `OwnerNotified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchGateStatus {
    PendingAnalysis,
    PendingHumanReview,
    PendingOwnerContact,
    OwnerNotified,
    ReunificationInProgress,
    ReunificationComplete,
    Rejected,
    Expired,
}

impl MatchGateStatus {
    pub const fn label(self) -> &'static str {
        match self {
            MatchGateStatus::PendingAnalysis => "pending_analysis",
            MatchGateStatus::PendingHumanReview => "pending_human_review",
            MatchGateStatus::PendingOwnerContact => "pending_owner_contact",
            MatchGateStatus::OwnerNotified => "owner_notified",
            MatchGateStatus::ReunificationInProgress => "reunification_in_progress",
            MatchGateStatus::ReunificationComplete => "reunification_complete",
            MatchGateStatus::Rejected => "rejected",
            MatchGateStatus::Expired => "expired",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            MatchGateStatus::ReunificationComplete
                | MatchGateStatus::Rejected
                | MatchGateStatus::Expired
        )
    }
}

/// Comparable signal between a lost report and a found report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    Species,
    Breed,
    Color,
    Size,
    DistinctiveMarks,
    Location,
    PhotoSimilarity,
    Microchip,
}

impl FactorKind {
    pub const fn label(self) -> &'static str {
        match self {
            FactorKind::Species => "species",
            FactorKind::Breed => "breed",
            FactorKind::Color => "color",
            FactorKind::Size => "size",
            FactorKind::DistinctiveMarks => "distinctive_marks",
            FactorKind::Location => "location",
            FactorKind::PhotoSimilarity => "photo_similarity",
            FactorKind::Microchip => "microchip",
        }
    }
}

/// One weighted comparison signal recorded by analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingFactor {
    pub factor: FactorKind,
    pub weight: u16,
    pub matched: bool,
}

/// Decision attached to a verification event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
    NeedsMoreInfo,
}

/// The only inputs that move a match through its gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationEventKind {
    AiAnalysis,
    HumanReview,
    ChipScan,
    OwnerContact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationEvent {
    pub kind: VerificationEventKind,
    pub decision: ReviewDecision,
    pub recorded_by: PersonId,
    pub recorded_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Unconfirmed pairing between a lost report and a found report. Born
/// blocked: no owner-facing path opens until a human approves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PotentialMatch {
    pub id: MatchId,
    pub lost_report: LostReportId,
    pub found_report: FoundReportId,
    pub confidence: ConfidenceLevel,
    pub score: u16,
    pub gate_status: MatchGateStatus,
    pub factors: Vec<MatchingFactor>,
    pub owner_notification_blocked: bool,
    pub events: Vec<VerificationEvent>,
    pub audit: AuditStamp,
}

impl PotentialMatch {
    pub fn species_factor_matched(&self) -> bool {
        self.factors
            .iter()
            .any(|factor| factor.factor == FactorKind::Species && factor.matched)
    }

    /// A human review that did not reject: the one thing automation can
    /// never substitute for.
    pub fn has_human_approval(&self) -> bool {
        self.events.iter().any(|event| {
            event.kind == VerificationEventKind::HumanReview
                && event.decision != ReviewDecision::Reject
        })
    }

    pub fn age_hours(&self, now: DateTime<Utc>) -> i64 {
        (now - self.audit.created_at).num_hours()
    }
}

/// Thresholds, expiry horizon, and default factor weights for match
/// gating. Weights are integer points on a 0..=100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPolicy {
    pub review_threshold: u16,
    pub owner_notify_threshold: u16,
    pub high_confidence_threshold: u16,
    pub moderate_confidence_threshold: u16,
    pub unreviewed_expiry_hours: i64,
    pub max_factor_weight: u16,
    pub weights: BTreeMap<FactorKind, u16>,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        let mut weights = BTreeMap::new();
        weights.insert(FactorKind::Species, 20);
        weights.insert(FactorKind::Microchip, 50);
        weights.insert(FactorKind::PhotoSimilarity, 15);
        weights.insert(FactorKind::DistinctiveMarks, 12);
        weights.insert(FactorKind::Breed, 10);
        weights.insert(FactorKind::Location, 10);
        weights.insert(FactorKind::Color, 8);
        weights.insert(FactorKind::Size, 7);

        Self {
            review_threshold: 40,
            owner_notify_threshold: 60,
            high_confidence_threshold: 75,
            moderate_confidence_threshold: 55,
            unreviewed_expiry_hours: 72,
            max_factor_weight: 50,
            weights,
        }
    }
}

impl MatchPolicy {
    pub fn default_weight(&self, kind: FactorKind) -> Option<u16> {
        self.weights.get(&kind).copied()
    }

    /// Score-derived confidence level. Human and chip levels are assigned
    /// by their verification events, never by score.
    pub fn confidence_for(&self, score: u16) -> ConfidenceLevel {
        if score >= self.high_confidence_threshold {
            ConfidenceLevel::High
        } else if score >= self.moderate_confidence_threshold {
            ConfidenceLevel::Moderate
        } else if score >= self.review_threshold {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::Unverified
        }
    }
}
