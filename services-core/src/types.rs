//! Services Marketplace Types

use chrono::{DateTime, Utc};
use credits_core::{Address, VisibilityId};
use ethereum_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle of one requested execution.
///
/// `Uninitialized` is the implicit state of a key no execution was ever
/// written under. `Refunded` and `Validated` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Uninitialized,
    Requested,
    Accepted,
    Disputed,
    Refunded,
    Validated,
}

impl ExecutionState {
    /// Terminal states accept no further transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Refunded | ExecutionState::Validated)
    }
}

/// One requested instance of a service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub state: ExecutionState,
    /// Original caller that created the execution (refund recipient)
    pub requester: Address,
    /// Time of the last state transition
    pub last_update_ts: DateTime<Utc>,
}

/// A creator-defined product priced in credits of one visibility
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Service {
    pub enabled: bool,
    /// Application-defined tag, e.g. `x-post`
    pub service_type: String,
    /// Visibility whose credits pay for this service
    pub visibility_id: VisibilityId,
    /// Exact credit cost per execution
    pub credits_cost: U256,
    /// Next execution nonce
    pub executions_nonce: u64,
    pub executions: BTreeMap<u64, Execution>,
}

/// Read view of an execution; unknown keys read as `Uninitialized`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionInfo {
    pub state: ExecutionState,
    pub requester: Address,
    pub last_update_ts: Option<DateTime<Utc>>,
}

impl ExecutionInfo {
    pub fn uninitialized() -> Self {
        Self {
            state: ExecutionState::Uninitialized,
            requester: Address::zero(),
            last_update_ts: None,
        }
    }
}

/// Services engine events
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum ServiceEvent {
    ServiceCreated {
        nonce: u64,
        service_type: String,
        visibility_id: VisibilityId,
        credits_cost_amount: U256,
    },
    ServiceUpdated {
        nonce: u64,
        enabled: bool,
    },
    ServiceExecutionRequested {
        service_nonce: u64,
        execution_nonce: u64,
        requester: Address,
        request_data: String,
    },
    ServiceExecutionCanceled {
        service_nonce: u64,
        execution_nonce: u64,
        from: Address,
        cancel_data: String,
    },
    ServiceExecutionAccepted {
        service_nonce: u64,
        execution_nonce: u64,
        response_data: String,
    },
    ServiceExecutionValidated {
        service_nonce: u64,
        execution_nonce: u64,
    },
    ServiceExecutionDisputed {
        service_nonce: u64,
        execution_nonce: u64,
        dispute_data: String,
    },
    ServiceExecutionResolved {
        service_nonce: u64,
        execution_nonce: u64,
        refund: bool,
        resolve_data: String,
    },
}
