use super::domain::PotentialMatch;
use crate::ops::identity::MatchId;
use crate::ops::store::StoreError;

/// Storage abstraction for potential matches, optimistic like the claim
/// store. `pending_review` feeds the expiry sweep.
pub trait MatchStore: Send + Sync {
    fn insert(&self, m: PotentialMatch) -> Result<PotentialMatch, StoreError>;
    fn update(&self, m: PotentialMatch, expected_version: u64) -> Result<PotentialMatch, StoreError>;
    fn fetch(&self, id: &MatchId) -> Result<Option<PotentialMatch>, StoreError>;
    fn pending_review(&self) -> Result<Vec<PotentialMatch>, StoreError>;
}
