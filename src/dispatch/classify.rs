//! Fault classification for upstream errors.

use crate::error::Fault;
use crate::resilience::circuit_breaker::Outcome;
use crate::upstream::UpstreamError;

/// Statuses blamed on the caller by default.
pub const DEFAULT_CALLER_FAULT_STATUSES: &[u16] = &[400];

/// Decides which upstream errors count against an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultPolicy {
    caller_fault_statuses: Vec<u16>,
}

impl Default for FaultPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CALLER_FAULT_STATUSES.to_vec())
    }
}

impl FaultPolicy {
    pub fn new(caller_fault_statuses: Vec<u16>) -> Self {
        Self { caller_fault_statuses }
    }

    /// Caller faults are listed API statuses. Everything else, including
    /// transport and decode errors, is the endpoint's.
    pub fn fault_of(&self, error: &UpstreamError) -> Fault {
        match error.status() {
            Some(status) if self.caller_fault_statuses.contains(&status) => Fault::Caller,
            _ => Fault::Endpoint,
        }
    }

    pub fn outcome<T>(&self, result: &Result<T, UpstreamError>) -> Outcome {
        match result {
            Ok(_) => Outcome::Success,
            Err(e) => outcome_for(self.fault_of(e)),
        }
    }
}

pub fn outcome_for(fault: Fault) -> Outcome {
    match fault {
        Fault::Caller => Outcome::Ignored,
        Fault::Endpoint => Outcome::Failure,
    }
}
