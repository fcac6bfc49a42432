use super::domain::DispatchRequest;
use crate::ops::identity::{DispatchId, VolunteerId};
use crate::ops::store::StoreError;

/// Persistence seam for dispatch requests plus the volunteer reservation
/// ledger backing the at-most-one-active-assignment rule.
pub trait DispatchStore: Send + Sync {
    fn insert(&self, request: DispatchRequest) -> Result<DispatchRequest, StoreError>;

    /// Optimistic-concurrency write: fails with
    /// [`StoreError::VersionConflict`] when the stored version moved.
    fn update(
        &self,
        request: DispatchRequest,
        expected_version: u64,
    ) -> Result<DispatchRequest, StoreError>;

    fn fetch(&self, id: &DispatchId) -> Result<Option<DispatchRequest>, StoreError>;

    /// Conditionally reserve the volunteer for this dispatch. Returns
    /// `false` without side effects when they already hold an active
    /// reservation.
    fn reserve(&self, volunteer: &VolunteerId, dispatch: &DispatchId) -> Result<bool, StoreError>;

    /// Release the reservation if, and only if, this dispatch holds it.
    /// Releasing an absent reservation is a no-op.
    fn release(&self, volunteer: &VolunteerId, dispatch: &DispatchId) -> Result<(), StoreError>;
}
