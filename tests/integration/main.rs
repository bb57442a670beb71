//! Integration tests: full saga runs and scheduler cycles against
//! in-memory mock bookmakers.

mod mock_bookmaker;
mod saga;
mod scheduler;
