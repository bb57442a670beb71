//! SUREBET: two-leg sports arbitrage execution engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod bookmakers;
pub mod currency;
pub mod strategy;
pub mod engine;
pub mod storage;
pub mod control;
