use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use rescue_ops::config::{AppConfig, PolicyBundle};
use rescue_ops::error::AppError;
use rescue_ops::ops::claims::domain::OwnershipClaim;
use rescue_ops::ops::claims::gate::{ClaimAssessment, ClearanceDecision, EvidenceEngine, ReleaseGate};
use rescue_ops::ops::dispatch::domain::{
    DispatchRequest, PlanarTravel, VolunteerDispatchProfile, VolunteerMatch,
};
use rescue_ops::ops::dispatch::matcher::{DispatchMatcher, DispatchSearch};
use rescue_ops::ops::identity::{ActorRole, VolunteerId};
use rescue_ops::ops::oncall::domain::{Escalation, EscalationStatus, OnCallRotation};
use rescue_ops::ops::oncall::engine::{EscalationEngine, EscalationError};
use rescue_ops::telemetry;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "Rescue Operations Gate",
    about = "Run the rescue coordination decision gates against JSON snapshots from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate an ownership claim against the evidence and release gates
    Claim {
        #[command(subcommand)]
        command: ClaimCommand,
    },
    /// Rank volunteer candidates for a dispatch request
    Dispatch {
        #[command(subcommand)]
        command: DispatchCommand,
    },
    /// Inspect an escalation chain against its rotation schedule
    Oncall {
        #[command(subcommand)]
        command: OncallCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ClaimCommand {
    /// Score the claim's evidence and report the clearance decision
    Evaluate(ClaimEvaluateArgs),
}

#[derive(Subcommand, Debug)]
enum DispatchCommand {
    /// Rank a volunteer roster for one request and explain the order
    Rank(DispatchRankArgs),
}

#[derive(Subcommand, Debug)]
enum OncallCommand {
    /// Report whether an escalation chain is waiting, overdue, or timed out
    Check(OncallCheckArgs),
}

#[derive(Args, Debug)]
struct ClaimEvaluateArgs {
    /// Path to an ownership claim snapshot (JSON)
    #[arg(long)]
    claim: PathBuf,
    /// Role of the person asking to clear the release hold
    #[arg(long, value_parser = parse_role)]
    approver_role: ActorRole,
}

#[derive(Args, Debug)]
struct DispatchRankArgs {
    /// Path to a dispatch request snapshot (JSON)
    #[arg(long)]
    request: PathBuf,
    /// Path to a volunteer profile roster (JSON array)
    #[arg(long)]
    volunteers: PathBuf,
    /// Maximum number of candidates to list
    #[arg(long, default_value_t = 5)]
    limit: usize,
    /// Override the distance cap for this run
    #[arg(long)]
    max_distance: Option<f64>,
    /// Volunteer the requester asked for by name (repeatable)
    #[arg(long)]
    preferred: Vec<String>,
}

#[derive(Args, Debug)]
struct OncallCheckArgs {
    /// Path to an escalation snapshot (JSON)
    #[arg(long)]
    escalation: PathBuf,
    /// Path to the rotation the escalation runs against (JSON)
    #[arg(long)]
    rotation: PathBuf,
    /// Evaluation instant (RFC 3339, defaults to now)
    #[arg(long, value_parser = parse_instant)]
    at: Option<DateTime<Utc>>,
}

fn main() {
    if let Err(err) = run_cli() {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    let policies = PolicyBundle::load(config.policy_file.as_deref())?;

    match cli.command {
        Command::Claim {
            command: ClaimCommand::Evaluate(args),
        } => run_claim_evaluate(args, &policies),
        Command::Dispatch {
            command: DispatchCommand::Rank(args),
        } => run_dispatch_rank(args, &policies),
        Command::Oncall {
            command: OncallCommand::Check(args),
        } => run_oncall_check(args, &policies),
    }
}

fn parse_role(raw: &str) -> Result<ActorRole, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "field_volunteer" | "volunteer" => Ok(ActorRole::FieldVolunteer),
        "coordinator" => Ok(ActorRole::Coordinator),
        "moderator" => Ok(ActorRole::Moderator),
        "lead_moderator" | "lead" => Ok(ActorRole::LeadModerator),
        "admin" => Ok(ActorRole::Admin),
        other => Err(format!(
            "unknown role '{other}'; expected field_volunteer, coordinator, moderator, lead_moderator, or admin"
        )),
    }
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|err| format!("failed to parse '{raw}' as an RFC 3339 instant ({err})"))
}

fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn run_claim_evaluate(args: ClaimEvaluateArgs, policies: &PolicyBundle) -> Result<(), AppError> {
    let claim: OwnershipClaim = read_snapshot(&args.claim)?;

    let engine = EvidenceEngine::new(policies.evidence.clone());
    let gate = ReleaseGate::new(policies.evidence.clone());

    let assessment = engine.assess(&claim);
    let decision = gate.can_clear_hold(&claim, args.approver_role);

    render_claim_report(&claim, &assessment, &decision, args.approver_role);
    Ok(())
}

fn run_dispatch_rank(args: DispatchRankArgs, policies: &PolicyBundle) -> Result<(), AppError> {
    let request: DispatchRequest = read_snapshot(&args.request)?;
    let profiles: Vec<VolunteerDispatchProfile> = read_snapshot(&args.volunteers)?;

    let matcher = DispatchMatcher::new(policies.dispatch.clone());
    let search = DispatchSearch {
        limit: args.limit,
        max_distance: args.max_distance,
        preferred: args.preferred.into_iter().map(VolunteerId).collect(),
    };

    let ranked = matcher.find_matches(&request, &search, &profiles, &PlanarTravel);
    let max_distance = matcher.effective_max_distance(&request, &search);

    render_dispatch_ranking(&request, &ranked, profiles.len(), max_distance);
    Ok(())
}

fn run_oncall_check(args: OncallCheckArgs, policies: &PolicyBundle) -> Result<(), AppError> {
    let escalation: Escalation = read_snapshot(&args.escalation)?;
    let rotation: OnCallRotation = read_snapshot(&args.rotation)?;

    if escalation.rotation != rotation.id {
        return Err(EscalationError::Validation(format!(
            "escalation {} runs against rotation {}, not {}",
            escalation.id.0, escalation.rotation.0, rotation.id.0
        ))
        .into());
    }

    let now = args.at.unwrap_or_else(Utc::now);
    let engine = EscalationEngine::new(policies.escalation.clone());

    render_escalation_check(&escalation, &rotation, &engine, now);
    Ok(())
}

fn render_claim_report(
    claim: &OwnershipClaim,
    assessment: &ClaimAssessment,
    decision: &ClearanceDecision,
    approver_role: ActorRole,
) {
    println!("Release gate evaluation");
    println!(
        "Claim {} on case {}, claimant {}",
        claim.id.0, claim.case.0, claim.claimant.0
    );
    println!(
        "Claim status: {} | hold: {} | competing claim: {}",
        claim.status.label(),
        claim.hold.status().label(),
        if claim.competing_claim { "yes" } else { "no" }
    );

    println!("\nEvidence assessment");
    println!(
        "- {} evidence items score {} -> {} tier",
        claim.evidence.len(),
        assessment.score,
        assessment.tier.label()
    );
    println!(
        "- two-person clearance: {}",
        if assessment.requires_two_person_clearance {
            "required"
        } else {
            "not required"
        }
    );

    println!("\nClearance decision for {}", approver_role.label());
    if decision.allowed {
        println!("- ALLOWED: {}", decision.reason);
    } else {
        println!("- BLOCKED: {}", decision.reason);
    }

    if decision.required_actions.is_empty() {
        println!("\nOutstanding steps: none");
    } else {
        println!("\nOutstanding steps");
        for step in &decision.required_actions {
            println!("- {}", step.summary());
        }
    }
}

fn render_dispatch_ranking(
    request: &DispatchRequest,
    ranked: &[VolunteerMatch],
    considered: usize,
    max_distance: f64,
) {
    println!("Dispatch candidate ranking");
    println!(
        "Request {} on case {}: {} at {} priority",
        request.id.0,
        request.case.0,
        request.task.label(),
        request.priority.label()
    );
    println!(
        "Considered {} profiles within {:.1} distance units of the pickup",
        considered, max_distance
    );

    if ranked.is_empty() {
        println!("\nCandidates: none qualified");
        return;
    }

    println!("\nCandidates");
    for (position, candidate) in ranked.iter().enumerate() {
        println!(
            "{}. {} | score {} | {:.1} units away | ETA {} min",
            position + 1,
            candidate.volunteer.0,
            candidate.score,
            candidate.distance,
            candidate.eta_minutes
        );
        for reason in &candidate.positives {
            println!("   + {reason}");
        }
        for reason in &candidate.negatives {
            println!("   - {reason}");
        }
    }
}

fn render_escalation_check(
    escalation: &Escalation,
    rotation: &OnCallRotation,
    engine: &EscalationEngine,
    now: DateTime<Utc>,
) {
    println!("Escalation chain check");
    println!(
        "Escalation {} on case {} against rotation {} ({} tiers)",
        escalation.id.0,
        escalation.trigger.case.0,
        rotation.id.0,
        rotation.tier_count()
    );
    println!(
        "Trigger: {} ({})",
        escalation.trigger.kind.label(),
        escalation.trigger.details
    );
    println!("Evaluated at {now}");

    println!("\nChain state");
    println!("- status: {}", escalation.status.label());
    match escalation.current_attempt() {
        Some(attempt) => {
            println!(
                "- attempt #{} at the {} tier, contacting {}, response due {}",
                attempt.attempt_number,
                attempt.tier.label(),
                attempt.contacted.0,
                attempt.response_deadline
            );
            match attempt.response {
                Some(recorded) => println!(
                    "- response: {} at {}",
                    recorded.response.label(),
                    recorded.responded_at
                ),
                None => println!("- response: none yet"),
            }
        }
        None => println!("- no attempts on record"),
    }
    println!(
        "- overall deadline {} on a {} minute budget",
        escalation.overall_deadline,
        engine.schedule().overall_timeout_minutes(rotation)
    );

    println!("\nPoller verdict");
    if !matches!(escalation.status, EscalationStatus::Escalating) {
        println!("- chain is settled; nothing left to poll");
    } else if engine.is_timed_out(escalation, now) {
        println!("- TIMED OUT: the overall budget elapsed; fail the chain");
    } else if engine.is_overdue(escalation, now) {
        println!("- OVERDUE: the current response window elapsed; advance to the next tier");
    } else {
        println!("- WAITING: the current attempt is still inside its response window");
    }

    if escalation.manual_override_required {
        println!(
            "- manual override required: {}",
            escalation.failure_reason.as_deref().unwrap_or("unspecified")
        );
    }
}
