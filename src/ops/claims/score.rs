use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{EvidenceItem, EvidenceKind, EvidenceScore};
use crate::ops::scoring::{tally, TallyEntry};

/// Point value, instance cap, and verification requirement for one
/// evidence kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceValue {
    pub points: u16,
    pub cap: u8,
    pub requires_verification: bool,
}

/// Review tier a claim lands in after scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewTier {
    AutoVerify,
    ModeratorApproval,
    LeadReview,
    InsufficientEvidence,
    Reject,
}

impl ReviewTier {
    pub const fn label(self) -> &'static str {
        match self {
            ReviewTier::AutoVerify => "auto_verify",
            ReviewTier::ModeratorApproval => "moderator_approval",
            ReviewTier::LeadReview => "lead_review",
            ReviewTier::InsufficientEvidence => "insufficient_evidence",
            ReviewTier::Reject => "reject",
        }
    }
}

/// Rubric for evidence scoring and claim review thresholds. Values are
/// deployment-tunable; the defaults below are the operational baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidencePolicy {
    pub auto_verify_threshold: u16,
    pub moderator_approval_threshold: u16,
    pub lead_review_threshold: u16,
    pub reject_below: u16,
    pub values: BTreeMap<EvidenceKind, EvidenceValue>,
}

impl Default for EvidencePolicy {
    fn default() -> Self {
        let mut values = BTreeMap::new();
        values.insert(
            EvidenceKind::MicrochipRegistration,
            EvidenceValue {
                points: 80,
                cap: 1,
                requires_verification: true,
            },
        );
        values.insert(
            EvidenceKind::VetRecords,
            EvidenceValue {
                points: 45,
                cap: 2,
                requires_verification: true,
            },
        );
        values.insert(
            EvidenceKind::AdoptionPaperwork,
            EvidenceValue {
                points: 40,
                cap: 1,
                requires_verification: true,
            },
        );
        values.insert(
            EvidenceKind::CityLicense,
            EvidenceValue {
                points: 35,
                cap: 1,
                requires_verification: true,
            },
        );
        values.insert(
            EvidenceKind::DatedPhoto,
            EvidenceValue {
                points: 20,
                cap: 3,
                requires_verification: false,
            },
        );
        values.insert(
            EvidenceKind::DistinctiveFeatureDescription,
            EvidenceValue {
                points: 15,
                cap: 2,
                requires_verification: false,
            },
        );
        values.insert(
            EvidenceKind::WitnessStatement,
            EvidenceValue {
                points: 10,
                cap: 2,
                requires_verification: true,
            },
        );

        Self {
            auto_verify_threshold: 85,
            moderator_approval_threshold: 60,
            lead_review_threshold: 40,
            reject_below: 25,
            values,
        }
    }
}

impl EvidencePolicy {
    pub fn value_for(&self, kind: EvidenceKind) -> Option<EvidenceValue> {
        self.values.get(&kind).copied()
    }

    /// Instance cap for a kind. Kinds absent from the policy (items
    /// recorded under an older rubric) default to a single countable
    /// instance.
    pub fn cap_for(&self, kind: EvidenceKind) -> u8 {
        self.values.get(&kind).map(|value| value.cap).unwrap_or(1)
    }

    /// Deterministic tier for a score. Disputed or fraud-flagged claims
    /// force lead review regardless of score.
    pub fn review_tier(&self, score: u16, force_lead_review: bool) -> ReviewTier {
        if force_lead_review {
            return ReviewTier::LeadReview;
        }
        if score >= self.auto_verify_threshold {
            ReviewTier::AutoVerify
        } else if score >= self.moderator_approval_threshold {
            ReviewTier::ModeratorApproval
        } else if score >= self.lead_review_threshold {
            ReviewTier::LeadReview
        } else if score >= self.reject_below {
            ReviewTier::InsufficientEvidence
        } else {
            ReviewTier::Reject
        }
    }
}

/// Recompute a claim's evidence score from scratch. Unverified items whose
/// kind requires verification contribute nothing; each kind counts at most
/// its configured cap, strongest instances first.
pub fn calculate_score(items: &[EvidenceItem], policy: &EvidencePolicy) -> EvidenceScore {
    let entries: Vec<TallyEntry<EvidenceKind>> = items
        .iter()
        .map(|item| TallyEntry {
            category: item.kind,
            reference: item.id.0.clone(),
            points: item.points,
            cap: policy.cap_for(item.kind),
            eligible: item.verification.counts(),
        })
        .collect();

    let outcome = tally(entries);
    EvidenceScore {
        total: outcome.total,
        breakdown: outcome.lines,
    }
}
