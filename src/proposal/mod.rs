//! Proposal module
//!
//! Proposal records, their storage, and how new ones are admitted.

mod gate;
mod models;
mod service;
mod store;

pub use gate::{StaticGate, ZerothGate};
pub use models::*;
pub use service::{NewProposal, ProposalIntake, MAX_TITLE_LEN};
pub use store::{InMemoryProposalStore, ProposalFilter, ProposalRepository};
