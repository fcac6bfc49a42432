use super::domain::{Escalation, OnCallRotation};
use crate::ops::identity::{EscalationId, RotationId};
use crate::ops::store::StoreError;

/// Rotations are registered once and read at escalation time; nothing in
/// this core rewrites them.
pub trait RotationStore: Send + Sync {
    fn insert(&self, rotation: OnCallRotation) -> Result<OnCallRotation, StoreError>;
    fn fetch(&self, id: &RotationId) -> Result<Option<OnCallRotation>, StoreError>;
}

/// Escalation storage, optimistic like the claim store. `open` feeds the
/// overdue and timeout sweeps.
pub trait EscalationStore: Send + Sync {
    fn insert(&self, escalation: Escalation) -> Result<Escalation, StoreError>;
    fn update(&self, escalation: Escalation, expected_version: u64)
        -> Result<Escalation, StoreError>;
    fn fetch(&self, id: &EscalationId) -> Result<Option<Escalation>, StoreError>;
    fn open(&self) -> Result<Vec<Escalation>, StoreError>;
}
