//! Credits Engine Error Registry
//!
//! Every failure aborts the surrounding operation before any state is
//! written; errors are surfaced to the caller verbatim and never retried
//! or swallowed internally.

use crate::access::Role;
use crate::types::Address;
use chrono::{DateTime, Utc};
use ethereum_types::U256;
use thiserror::Error;

/// Credits result type
pub type CreditsResult<T> = Result<T, CreditsError>;

/// Credits engine error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CreditsError {
    /// Null account supplied where disallowed
    #[error("invalid address: zero address not allowed")]
    InvalidAddress,

    /// Caller or target is not the bound creator, or none is set
    #[error("invalid creator for visibility {visibility_id}")]
    InvalidCreator { visibility_id: String },

    /// Zero amount, supply-cap overflow, over-sell, or empty claim
    #[error("invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// Init-time fee constant sanity check failed
    #[error("invalid fee params: protocol {protocol_ppm}ppm, referrer {referrer_ppm}ppm")]
    InvalidFeeParams { protocol_ppm: u32, referrer_ppm: u32 },

    /// Buyer attached less native currency than the total trade cost
    #[error("not enough eth sent: required {required}, attached {attached}")]
    NotEnoughEthSent { required: U256, attached: U256 },

    /// Seller or transfer source is under-funded in credits
    #[error("not enough credits owned: required {required}, owned {owned}")]
    NotEnoughCreditsOwned { required: U256, owned: U256 },

    /// Caller lacks a required role
    #[error("account {account} is missing role {role:?}")]
    MissingRole { role: Role, account: Address },

    /// No admin transfer or delay change is currently scheduled
    #[error("no pending admin change")]
    NoPendingAdminChange,

    /// The scheduled admin change cannot be applied yet
    #[error("admin change not ready until {ready_at}")]
    AdminChangeNotReady { ready_at: DateTime<Utc> },

    /// Caller is not the scheduled new admin
    #[error("account {account} is not the pending admin")]
    NotPendingAdmin { account: Address },

    /// Granting or revoking the admin role outside the transfer protocol
    #[error("default admin role can only change through the delayed transfer")]
    EnforcedAdminRules,
}

impl CreditsError {
    /// Shorthand for `InvalidAmount`
    pub fn invalid_amount(reason: impl Into<String>) -> Self {
        CreditsError::InvalidAmount {
            reason: reason.into(),
        }
    }
}
