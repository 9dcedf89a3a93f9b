//! Services Engine Error Registry

use crate::types::ExecutionState;
use credits_core::{Address, CreditsError};
use thiserror::Error;

/// Services result type
pub type ServicesResult<T> = Result<T, ServicesError>;

/// Services engine error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServicesError {
    /// Execution requested on a service that is disabled (or was never
    /// created; unknown services read as disabled)
    #[error("service {service_nonce} is disabled")]
    DisabledService { service_nonce: u64 },

    /// No service exists under this nonce
    #[error("service {service_nonce} does not exist")]
    UnknownService { service_nonce: u64 },

    /// State machine transition attempted from an unexpected state
    #[error("invalid execution state {current:?}")]
    InvalidExecutionState { current: ExecutionState },

    /// Caller is not in the allowed principal set for the transition
    #[error("account {caller} may not perform this execution action")]
    UnauthorizedExecutionAction { caller: Address },

    /// Failure surfaced by the credits engine (escrow moves, role
    /// checks, creator lookups)
    #[error(transparent)]
    Credits(#[from] CreditsError),
}
