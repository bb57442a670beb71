//! Core engine: balance check, stake sizing, resource reset, two-leg
//! placement, and the scheduler loop that drives it.

pub mod balances;
pub mod cleanup;
pub mod executor;
pub mod scheduler;
pub mod scraper;
