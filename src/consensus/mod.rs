//! Dual-track consensus engine
//!
//! Proposals are voted on by two independent tracks, synthient agents and
//! human reviewers. Each track is tallied on its own (threshold + veto) and
//! the pair of results drives the proposal lifecycle:
//!
//! 1. **Ingestion**: validate and record a vote under the proposal's lock
//! 2. **Tally**: recompute both tracks from their full vote sets
//! 3. **State machine**: derive the new status and next action
//! 4. **Reporting**: read-only views for dashboards, filtered by role

pub mod ingestion;
pub mod locks;
pub mod reporter;
pub mod state_machine;
pub mod tally;

pub use ingestion::{Ballot, VoteIngestion, VoteOutcome};
pub use reporter::TallyReporter;
pub use tally::ConsensusCalculator;
