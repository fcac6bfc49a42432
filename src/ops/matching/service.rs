use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::domain::{MatchGateStatus, MatchPolicy, MatchingFactor, PotentialMatch, ReviewDecision};
use super::gate::{MatchError, MatchGate, NotificationDecision};
use super::repository::MatchStore;
use crate::ops::audit::{AggregateKind, AuditError, AuditEvent, AuditEventKind, AuditSink};
use crate::ops::clock::Clock;
use crate::ops::identity::{Actor, FoundReportId, IdGenerator, LostReportId, MatchId};
use crate::ops::store::StoreError;

#[derive(Debug, Error)]
pub enum MatchServiceError {
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Audit(#[from] AuditError),
}

/// Orchestrates match mutations against a store and the audit trail.
pub struct MatchService<S, A> {
    store: Arc<S>,
    audit: Arc<A>,
    gate: MatchGate,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl<S, A> MatchService<S, A>
where
    S: MatchStore,
    A: AuditSink,
{
    pub fn new(
        store: Arc<S>,
        audit: Arc<A>,
        policy: MatchPolicy,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            store,
            audit,
            gate: MatchGate::new(policy),
            clock,
            ids,
        }
    }

    fn fetch_required(&self, id: &MatchId) -> Result<PotentialMatch, MatchServiceError> {
        self.store
            .fetch(id)?
            .ok_or(MatchServiceError::Store(StoreError::NotFound))
    }

    fn event(
        &self,
        kind: AuditEventKind,
        m: &PotentialMatch,
        actor: &Actor,
        payload: serde_json::Value,
    ) -> AuditEvent {
        AuditEvent {
            id: self.ids.next_id("event"),
            aggregate: AggregateKind::PotentialMatch,
            aggregate_id: m.id.0.clone(),
            kind,
            version: m.audit.version,
            recorded_at: self.clock.now(),
            actor: actor.clone(),
            correlation_id: Some(m.lost_report.0.clone()),
            payload,
        }
    }

    pub fn create(
        &self,
        lost_report: LostReportId,
        found_report: FoundReportId,
        factors: Vec<MatchingFactor>,
        actor: &Actor,
    ) -> Result<PotentialMatch, MatchServiceError> {
        let id = MatchId(self.ids.next_id("match"));
        let m = self.gate.create_potential_match(
            id,
            lost_report,
            found_report,
            factors,
            actor,
            self.clock.now(),
        )?;
        let stored = self.store.insert(m)?;
        info!(
            potential_match = %stored.id.0,
            score = stored.score,
            status = stored.gate_status.label(),
            "potential match created"
        );
        self.audit.record(self.event(
            AuditEventKind::PotentialMatchCreated,
            &stored,
            actor,
            json!({ "score": stored.score, "status": stored.gate_status.label() }),
        ))?;
        Ok(stored)
    }

    pub fn record_analysis(
        &self,
        id: &MatchId,
        factors: Vec<MatchingFactor>,
        actor: &Actor,
    ) -> Result<PotentialMatch, MatchServiceError> {
        let current = self.fetch_required(id)?;
        let expected = current.audit.version;
        let next = self
            .gate
            .record_analysis(&current, factors, actor, self.clock.now())?;
        let stored = self.store.update(next, expected)?;
        self.audit.record(self.event(
            AuditEventKind::MatchAnalysisRecorded,
            &stored,
            actor,
            json!({ "score": stored.score, "status": stored.gate_status.label() }),
        ))?;
        Ok(stored)
    }

    /// Audited gate query. Every evaluation lands in the trail with its
    /// full check list, allowed or blocked.
    pub fn evaluate_notification(
        &self,
        id: &MatchId,
        actor: &Actor,
    ) -> Result<NotificationDecision, MatchServiceError> {
        let m = self.fetch_required(id)?;
        let decision = self.gate.can_notify_owner(&m);
        let checks: Vec<serde_json::Value> = decision
            .checks
            .iter()
            .map(|result| json!({ "check": result.check.label(), "passed": result.passed }))
            .collect();
        self.audit.record(self.event(
            AuditEventKind::MatchGateEvaluated,
            &m,
            actor,
            json!({ "allowed": decision.allowed, "reason": decision.reason, "checks": checks }),
        ))?;
        Ok(decision)
    }

    pub fn record_human_review(
        &self,
        id: &MatchId,
        decision: ReviewDecision,
        notes: Option<String>,
        actor: &Actor,
    ) -> Result<PotentialMatch, MatchServiceError> {
        let current = self.fetch_required(id)?;
        let expected = current.audit.version;
        let next =
            self.gate
                .record_human_review(&current, decision, notes, actor, self.clock.now())?;
        let stored = self.store.update(next, expected)?;
        self.audit.record(self.event(
            AuditEventKind::MatchHumanReviewRecorded,
            &stored,
            actor,
            json!({
                "decision": format!("{decision:?}").to_lowercase(),
                "status": stored.gate_status.label(),
            }),
        ))?;
        if stored.gate_status == MatchGateStatus::Rejected {
            info!(potential_match = %stored.id.0, "match rejected on review");
            self.audit.record(self.event(
                AuditEventKind::PotentialMatchRejected,
                &stored,
                actor,
                json!({ "route": "human_review" }),
            ))?;
        }
        Ok(stored)
    }

    pub fn record_chip_scan(
        &self,
        id: &MatchId,
        chip_matched: bool,
        notes: Option<String>,
        actor: &Actor,
    ) -> Result<PotentialMatch, MatchServiceError> {
        let current = self.fetch_required(id)?;
        let expected = current.audit.version;
        let next =
            self.gate
                .record_chip_scan(&current, chip_matched, notes, actor, self.clock.now())?;
        let stored = self.store.update(next, expected)?;
        self.audit.record(self.event(
            AuditEventKind::MatchChipVerificationRecorded,
            &stored,
            actor,
            json!({ "chip_matched": chip_matched }),
        ))?;
        if !chip_matched {
            warn!(potential_match = %stored.id.0, "chip mismatch; match rejected");
            self.audit.record(self.event(
                AuditEventKind::PotentialMatchRejected,
                &stored,
                actor,
                json!({ "route": "chip_mismatch" }),
            ))?;
        }
        Ok(stored)
    }

    pub fn record_owner_notification(
        &self,
        id: &MatchId,
        actor: &Actor,
    ) -> Result<PotentialMatch, MatchServiceError> {
        let current = self.fetch_required(id)?;
        let expected = current.audit.version;
        let next = self
            .gate
            .record_owner_notification(&current, actor, self.clock.now())?;
        let stored = self.store.update(next, expected)?;
        info!(potential_match = %stored.id.0, "owner notified");
        self.audit.record(self.event(
            AuditEventKind::OwnerNotificationRecorded,
            &stored,
            actor,
            json!({}),
        ))?;
        Ok(stored)
    }

    pub fn record_reunification_progress(
        &self,
        id: &MatchId,
        completed: bool,
        actor: &Actor,
    ) -> Result<PotentialMatch, MatchServiceError> {
        let current = self.fetch_required(id)?;
        let expected = current.audit.version;
        let next = self.gate.record_reunification_progress(
            &current,
            completed,
            actor,
            self.clock.now(),
        )?;
        let stored = self.store.update(next, expected)?;
        self.audit.record(self.event(
            AuditEventKind::ReunificationProgressRecorded,
            &stored,
            actor,
            json!({ "status": stored.gate_status.label() }),
        ))?;
        Ok(stored)
    }

    /// Expire every unreviewed match past the horizon. Returns the ids
    /// that expired in this sweep.
    pub fn expire_stale(&self, actor: &Actor) -> Result<Vec<MatchId>, MatchServiceError> {
        let now = self.clock.now();
        let mut expired = Vec::new();
        for m in self.store.pending_review()? {
            if !self.gate.is_expired(&m, now) {
                continue;
            }
            let expected = m.audit.version;
            let next = self.gate.mark_expired(&m, actor, now)?;
            let stored = match self.store.update(next, expected) {
                Ok(stored) => stored,
                Err(StoreError::VersionConflict { .. }) => {
                    debug!(potential_match = %m.id.0, "another node touched this match first");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            self.audit.record(self.event(
                AuditEventKind::PotentialMatchExpired,
                &stored,
                actor,
                json!({ "age_hours": stored.age_hours(now) }),
            ))?;
            expired.push(stored.id.clone());
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "expired stale unreviewed matches");
        }
        Ok(expired)
    }

    pub fn get(&self, id: &MatchId) -> Result<Option<PotentialMatch>, MatchServiceError> {
        Ok(self.store.fetch(id)?)
    }
}
