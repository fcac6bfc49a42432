use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ops::audit::AuditStamp;
use crate::ops::identity::{CaseId, DispatchId, PersonId, VolunteerId};

/// Planar coordinate in abstract map units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub x: f64,
    pub y: f64,
}

/// Injected geo-distance seam. Deployments swap in road-network or
/// great-circle models; the matcher only sees distances.
pub trait TravelModel: Send + Sync {
    fn distance(&self, from: GeoPoint, to: GeoPoint) -> f64;
}

/// Straight-line distance in map units.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarTravel;

impl TravelModel for PlanarTravel {
    fn distance(&self, from: GeoPoint, to: GeoPoint) -> f64 {
        (from.x - to.x).hypot(from.y - to.y)
    }
}

/// Field task a dispatch asks a volunteer to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchTask {
    Transport,
    FieldSearch,
    TrapAndRecover,
    EmergencyVetRun,
    SupplyRun,
}

impl DispatchTask {
    pub const fn label(self) -> &'static str {
        match self {
            DispatchTask::Transport => "transport",
            DispatchTask::FieldSearch => "field_search",
            DispatchTask::TrapAndRecover => "trap_and_recover",
            DispatchTask::EmergencyVetRun => "emergency_vet_run",
            DispatchTask::SupplyRun => "supply_run",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPriority {
    Routine,
    Elevated,
    Urgent,
    Critical,
}

impl DispatchPriority {
    pub const fn label(self) -> &'static str {
        match self {
            DispatchPriority::Routine => "routine",
            DispatchPriority::Elevated => "elevated",
            DispatchPriority::Urgent => "urgent",
            DispatchPriority::Critical => "critical",
        }
    }
}

/// Operational roles a volunteer can hold for dispatch purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolunteerRole {
    Driver,
    FieldResponder,
    TrapSpecialist,
    VetTech,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Skill {
    AnimalHandling,
    TrapOperation,
    AnimalFirstAid,
    CrowdManagement,
    NightSearch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Equipment {
    Vehicle,
    HumaneTrap,
    TransportCrate,
    CatchPole,
    ThermalImager,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicalCapability {
    HeavyLifting,
    LongHike,
    ConfinedSpaces,
    WaterRescue,
}

/// Hard requirements a candidate must satisfy before scoring runs. Every
/// set is all-of: a volunteer missing any listed entry is filtered out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchRequirements {
    pub roles: BTreeSet<VolunteerRole>,
    pub skills: BTreeSet<Skill>,
    pub equipment: BTreeSet<Equipment>,
    pub physical: BTreeSet<PhysicalCapability>,
    /// Per-request distance cap in map units; the policy default applies
    /// when unset.
    pub max_distance: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Novice,
    Intermediate,
    Veteran,
}

impl ExperienceLevel {
    pub const fn label(self) -> &'static str {
        match self {
            ExperienceLevel::Novice => "novice",
            ExperienceLevel::Intermediate => "intermediate",
            ExperienceLevel::Veteran => "veteran",
        }
    }
}

/// Read-only availability snapshot refreshed by an external source. The
/// matcher consumes these; nothing in this crate mutates one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolunteerDispatchProfile {
    pub volunteer: VolunteerId,
    pub location: GeoPoint,
    pub available: bool,
    pub roles: BTreeSet<VolunteerRole>,
    pub skills: BTreeSet<Skill>,
    pub equipment: BTreeSet<Equipment>,
    pub physical: BTreeSet<PhysicalCapability>,
    pub experience: ExperienceLevel,
    pub completed_dispatches: u32,
    /// Precomputed 0-100 figure from response history.
    pub responsiveness: u8,
    /// Precomputed 0-100 figure; 0 means fully free.
    pub current_load: u8,
}

/// Weighted factors in the candidate blend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankFactor {
    Location,
    Skills,
    Availability,
    Experience,
    Workload,
}

impl RankFactor {
    pub const fn label(self) -> &'static str {
        match self {
            RankFactor::Location => "location",
            RankFactor::Skills => "skills",
            RankFactor::Availability => "availability",
            RankFactor::Experience => "experience",
            RankFactor::Workload => "workload",
        }
    }
}

/// One factor's contribution: the raw 0-100 sub-score and the weighted
/// points it adds to the blended total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub factor: RankFactor,
    pub subscore: f64,
    pub points: f64,
}

/// Ranked candidate with everything a moderator needs to trust the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolunteerMatch {
    pub volunteer: VolunteerId,
    pub score: u8,
    pub distance: f64,
    pub eta_minutes: u32,
    pub components: Vec<ScoreComponent>,
    pub positives: Vec<String>,
    pub negatives: Vec<String>,
}

/// Dispatch lifecycle position. The legal moves live in the lifecycle
/// transition table; nothing mutates status outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Pending,
    Searching,
    Assigned,
    Accepted,
    EnRoute,
    OnScene,
    Completed,
    Cancelled,
    Failed,
}

impl DispatchStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DispatchStatus::Pending => "pending",
            DispatchStatus::Searching => "searching",
            DispatchStatus::Assigned => "assigned",
            DispatchStatus::Accepted => "accepted",
            DispatchStatus::EnRoute => "en_route",
            DispatchStatus::OnScene => "on_scene",
            DispatchStatus::Completed => "completed",
            DispatchStatus::Cancelled => "cancelled",
            DispatchStatus::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            DispatchStatus::Completed | DispatchStatus::Cancelled | DispatchStatus::Failed
        )
    }
}

/// Immutable history line; one per transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchNote {
    pub recorded_at: DateTime<Utc>,
    pub recorded_by: PersonId,
    pub status: DispatchStatus,
    pub note: String,
}

/// A time-bound field task routed to at most one volunteer at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub id: DispatchId,
    pub case: CaseId,
    pub task: DispatchTask,
    pub priority: DispatchPriority,
    pub pickup: GeoPoint,
    pub destination: Option<GeoPoint>,
    pub requirements: DispatchRequirements,
    pub status: DispatchStatus,
    /// Ranked output of the most recent candidate search.
    pub candidates: Vec<VolunteerMatch>,
    pub assigned_volunteer: Option<VolunteerId>,
    pub notes: Vec<DispatchNote>,
    pub audit: AuditStamp,
}

/// Weights, caps, and speed assumptions for candidate ranking. The five
/// weights are percentages and sum to 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchPolicy {
    pub location_weight: f64,
    pub skills_weight: f64,
    pub availability_weight: f64,
    pub experience_weight: f64,
    pub workload_weight: f64,
    /// Distance at which the location sub-score decays to zero.
    pub reference_distance: f64,
    /// Cap applied when neither the search nor the request carries one.
    pub default_max_distance: f64,
    /// Average travel speed in map units per minute, for ETA estimates.
    pub average_speed: f64,
    pub urgent_bonus: f64,
    pub critical_bonus: f64,
    pub preferred_bonus: f64,
    pub novice_base: f64,
    pub intermediate_base: f64,
    pub veteran_base: f64,
    /// One extra experience point per this many completed dispatches.
    pub completed_per_point: u32,
    pub completed_bonus_cap: f64,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            location_weight: 30.0,
            skills_weight: 25.0,
            availability_weight: 20.0,
            experience_weight: 15.0,
            workload_weight: 10.0,
            reference_distance: 50.0,
            default_max_distance: 75.0,
            average_speed: 0.8,
            urgent_bonus: 5.0,
            critical_bonus: 10.0,
            preferred_bonus: 8.0,
            novice_base: 40.0,
            intermediate_base: 65.0,
            veteran_base: 85.0,
            completed_per_point: 5,
            completed_bonus_cap: 15.0,
        }
    }
}

impl DispatchPolicy {
    pub fn experience_base(&self, level: ExperienceLevel) -> f64 {
        match level {
            ExperienceLevel::Novice => self.novice_base,
            ExperienceLevel::Intermediate => self.intermediate_base,
            ExperienceLevel::Veteran => self.veteran_base,
        }
    }

    pub fn priority_bonus(&self, priority: DispatchPriority) -> f64 {
        match priority {
            DispatchPriority::Routine | DispatchPriority::Elevated => 0.0,
            DispatchPriority::Urgent => self.urgent_bonus,
            DispatchPriority::Critical => self.critical_bonus,
        }
    }
}
