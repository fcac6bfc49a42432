use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::domain::{
    DispatchPolicy, DispatchRequest, ExperienceLevel, RankFactor, ScoreComponent, Skill,
    TravelModel, VolunteerDispatchProfile, VolunteerMatch,
};
use crate::ops::identity::VolunteerId;
use crate::ops::scoring::clamp_round_score;

// Cutoffs for the human-readable reason strings.
const NEAR_DISTANCE: f64 = 5.0;
const FAR_FRACTION: f64 = 0.8;
const HIGH_RESPONSIVENESS: u8 = 85;
const LOW_RESPONSIVENESS: u8 = 40;
const HIGH_LOAD: u8 = 70;
const THIN_HISTORY: u32 = 5;

/// Caller-tunable knobs for one ranking run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSearch {
    pub limit: usize,
    /// Overrides both the request cap and the policy default when set.
    pub max_distance: Option<f64>,
    pub preferred: BTreeSet<VolunteerId>,
}

impl Default for DispatchSearch {
    fn default() -> Self {
        Self {
            limit: 5,
            max_distance: None,
            preferred: BTreeSet::new(),
        }
    }
}

/// Ranks volunteer candidates for a dispatch request. Pure: consumes a
/// profile snapshot plus a travel model and returns an ordered list.
#[derive(Debug, Clone)]
pub struct DispatchMatcher {
    policy: DispatchPolicy,
}

impl DispatchMatcher {
    pub fn new(policy: DispatchPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    /// Effective distance cap: search override, then the request's own
    /// cap, then the policy default.
    pub fn effective_max_distance(
        &self,
        request: &DispatchRequest,
        search: &DispatchSearch,
    ) -> f64 {
        search
            .max_distance
            .or(request.requirements.max_distance)
            .unwrap_or(self.policy.default_max_distance)
    }

    /// Hard filters first, scoring second. Unavailable volunteers, anyone
    /// missing a required role, skill, equipment piece, or physical
    /// capability, and anyone beyond the effective distance cap never
    /// reach the scorer.
    pub fn find_matches(
        &self,
        request: &DispatchRequest,
        search: &DispatchSearch,
        profiles: &[VolunteerDispatchProfile],
        travel: &dyn TravelModel,
    ) -> Vec<VolunteerMatch> {
        let max_distance = self.effective_max_distance(request, search);
        let needs = &request.requirements;

        let mut matches: Vec<VolunteerMatch> = profiles
            .iter()
            .filter(|profile| profile.available)
            .filter(|profile| needs.roles.is_subset(&profile.roles))
            .filter(|profile| needs.skills.is_subset(&profile.skills))
            .filter(|profile| needs.equipment.is_subset(&profile.equipment))
            .filter(|profile| needs.physical.is_subset(&profile.physical))
            .filter_map(|profile| {
                let distance = travel.distance(profile.location, request.pickup);
                (distance <= max_distance).then(|| self.rank(request, search, profile, distance))
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.volunteer.0.cmp(&b.volunteer.0))
        });
        matches.truncate(search.limit);
        matches
    }

    fn rank(
        &self,
        request: &DispatchRequest,
        search: &DispatchSearch,
        profile: &VolunteerDispatchProfile,
        distance: f64,
    ) -> VolunteerMatch {
        let policy = &self.policy;

        let location = (1.0 - distance / policy.reference_distance).max(0.0) * 100.0;
        let skills = skill_coverage(&request.requirements.skills, &profile.skills) * 100.0;
        let availability = f64::from(profile.responsiveness);
        let experience = (policy.experience_base(profile.experience)
            + f64::from(profile.completed_dispatches / policy.completed_per_point.max(1))
                .min(policy.completed_bonus_cap))
        .min(100.0);
        let workload = f64::from(100u8.saturating_sub(profile.current_load));

        let components = vec![
            component(RankFactor::Location, location, policy.location_weight),
            component(RankFactor::Skills, skills, policy.skills_weight),
            component(RankFactor::Availability, availability, policy.availability_weight),
            component(RankFactor::Experience, experience, policy.experience_weight),
            component(RankFactor::Workload, workload, policy.workload_weight),
        ];
        let blended: f64 = components.iter().map(|c| c.points).sum();

        let mut positives = Vec::new();
        let mut negatives = Vec::new();
        if distance <= NEAR_DISTANCE {
            positives.push("very close to the pickup point".to_string());
        } else if distance >= policy.reference_distance * FAR_FRACTION {
            negatives.push("long travel distance".to_string());
        }
        if profile.responsiveness >= HIGH_RESPONSIVENESS {
            positives.push("consistently fast to respond".to_string());
        } else if profile.responsiveness <= LOW_RESPONSIVENESS {
            negatives.push("slow response history".to_string());
        }
        if profile.current_load >= HIGH_LOAD {
            negatives.push("high current workload".to_string());
        } else if profile.current_load == 0 {
            positives.push("no active assignments".to_string());
        }
        match profile.experience {
            ExperienceLevel::Veteran => positives.push("veteran responder".to_string()),
            ExperienceLevel::Novice if profile.completed_dispatches < THIN_HISTORY => {
                negatives.push("limited field history".to_string());
            }
            _ => {}
        }

        let mut total = blended + policy.priority_bonus(request.priority);
        if search.preferred.contains(&profile.volunteer) {
            total += policy.preferred_bonus;
            positives.push("on the caller's preferred list".to_string());
        }

        VolunteerMatch {
            volunteer: profile.volunteer.clone(),
            score: clamp_round_score(total),
            distance,
            eta_minutes: (distance / policy.average_speed).ceil() as u32,
            components,
            positives,
            negatives,
        }
    }
}

fn component(factor: RankFactor, subscore: f64, weight: f64) -> ScoreComponent {
    ScoreComponent {
        factor,
        subscore,
        points: subscore * weight / 100.0,
    }
}

fn skill_coverage(required: &BTreeSet<Skill>, held: &BTreeSet<Skill>) -> f64 {
    if required.is_empty() {
        return 1.0;
    }
    required.intersection(held).count() as f64 / required.len() as f64
}
