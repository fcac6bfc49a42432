use super::domain::OwnershipClaim;
use crate::ops::identity::{CaseId, ClaimId};
use crate::ops::store::StoreError;

/// Storage abstraction for ownership claims. `update` carries the version
/// the caller read; implementations must reject writes whose expectation
/// no longer matches the stored aggregate.
pub trait ClaimStore: Send + Sync {
    fn insert(&self, claim: OwnershipClaim) -> Result<OwnershipClaim, StoreError>;
    fn update(&self, claim: OwnershipClaim, expected_version: u64) -> Result<OwnershipClaim, StoreError>;
    fn fetch(&self, id: &ClaimId) -> Result<Option<OwnershipClaim>, StoreError>;
    fn claims_for_case(&self, case: &CaseId) -> Result<Vec<OwnershipClaim>, StoreError>;
}
