pub mod audit;
pub mod claims;
pub mod clock;
pub mod dispatch;
pub mod identity;
pub mod matching;
pub mod oncall;
pub mod scoring;
pub mod store;
