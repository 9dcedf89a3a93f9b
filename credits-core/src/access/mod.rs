//! Access Control
//!
//! Shared role registry with a delayed default-admin transfer protocol.
//! Role checks are immediate; only the admin swap and the change of the
//! admin delay itself are time-gated.

mod registry;

pub use registry::{AdminChange, RoleRegistry};

use serde::{Deserialize, Serialize};

/// Protocol roles
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May grant and revoke every other role, and update the treasury
    DefaultAdmin,
    /// May bind and unbind creators to visibilities
    CreatorsChecker,
    /// May move credits between accounts without touching supply or fees
    CreditsTransfer,
    /// May settle disputed service executions
    DisputeResolver,
}

impl Role {
    /// Role name for error messages and logs
    pub fn name(&self) -> &'static str {
        match self {
            Role::DefaultAdmin => "DefaultAdmin",
            Role::CreatorsChecker => "CreatorsChecker",
            Role::CreditsTransfer => "CreditsTransfer",
            Role::DisputeResolver => "DisputeResolver",
        }
    }
}
