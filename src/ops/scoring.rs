//! Weighted-sum primitives shared by the evidence and match engines.
//!
//! Scores are plain integer point sums, never floats, so two replays of the
//! same inputs always land on the same side of a threshold.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One candidate line for a cap-aware tally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TallyEntry<C> {
    pub category: C,
    /// Identifier of the underlying item, echoed into the breakdown.
    pub reference: String,
    pub points: u16,
    /// Most instances of this category that may count.
    pub cap: u8,
    pub eligible: bool,
}

/// Why a line did not count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TallyAdjustment {
    Ineligible,
    CapExceeded,
}

/// Per-line outcome echoed back for auditability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TallyLine<C> {
    pub category: C,
    pub reference: String,
    pub points: u16,
    pub counted: bool,
    pub adjustment: Option<TallyAdjustment>,
}

/// A capped total plus one line per input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TallyOutcome<C> {
    pub total: u16,
    pub lines: Vec<TallyLine<C>>,
}

/// Cap-aware weighted sum. Entries are walked in descending point order so
/// the strongest instances of a category consume its cap first; ineligible
/// entries and entries beyond their category cap never count. Point order
/// ties break on the reference id, keeping replays byte-stable.
pub fn tally<C: Ord + Clone>(entries: Vec<TallyEntry<C>>) -> TallyOutcome<C> {
    let mut ordered = entries;
    ordered.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then_with(|| a.reference.cmp(&b.reference))
    });

    let mut used: BTreeMap<C, u8> = BTreeMap::new();
    let mut total: u16 = 0;
    let mut lines = Vec::with_capacity(ordered.len());

    for entry in ordered {
        if !entry.eligible {
            lines.push(TallyLine {
                category: entry.category,
                reference: entry.reference,
                points: entry.points,
                counted: false,
                adjustment: Some(TallyAdjustment::Ineligible),
            });
            continue;
        }

        let used_count = used.entry(entry.category.clone()).or_insert(0);
        if *used_count >= entry.cap {
            lines.push(TallyLine {
                category: entry.category,
                reference: entry.reference,
                points: entry.points,
                counted: false,
                adjustment: Some(TallyAdjustment::CapExceeded),
            });
            continue;
        }

        *used_count += 1;
        total = total.saturating_add(entry.points);
        lines.push(TallyLine {
            category: entry.category,
            reference: entry.reference,
            points: entry.points,
            counted: true,
            adjustment: None,
        });
    }

    TallyOutcome { total, lines }
}

/// Sum of the weights whose factor matched, clamped to `scale`.
pub fn matched_weight_sum<I>(weights: I, scale: u16) -> u16
where
    I: IntoIterator<Item = (u16, bool)>,
{
    let sum: u32 = weights
        .into_iter()
        .filter(|(_, matched)| *matched)
        .map(|(weight, _)| u32::from(weight))
        .sum();
    sum.min(u32::from(scale)) as u16
}

/// Clamp a blended floating score into `[0, 100]` and round to an integer.
pub fn clamp_round_score(raw: f64) -> u8 {
    raw.clamp(0.0, 100.0).round() as u8
}
