//! Zeroth-gate: the external ethical pre-check consulted before a proposal
//! may be created. This service only sees its boolean verdict.

use crate::proposal::NewProposal;

pub trait ZerothGate: Send + Sync {
    fn permits(&self, proposal: &NewProposal) -> bool;
}

/// Gate with a fixed verdict, taken from configuration
#[derive(Debug, Clone, Copy)]
pub struct StaticGate {
    open: bool,
}

impl StaticGate {
    pub fn new(open: bool) -> Self {
        Self { open }
    }
}

impl ZerothGate for StaticGate {
    fn permits(&self, _proposal: &NewProposal) -> bool {
        self.open
    }
}
