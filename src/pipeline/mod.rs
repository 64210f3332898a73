//! Sync pipeline — data types and the run orchestrator.

pub mod runner;
pub mod types;

pub use runner::SyncRunner;
pub use types::{CandidateMessage, RunOutcome, TransactionRecord};
