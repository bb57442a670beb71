//! Strategy layer: arbitrage feasibility and stake sizing.

pub mod stake;

pub use stake::{budget_allocation, is_arbitrage, known_stake_allocation, KnownStake};
