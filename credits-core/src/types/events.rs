//! Emitted Events
//!
//! Each engine buffers the events of its committed operations; the
//! embedding ledger drains them after commit and stamps them with its
//! own commit context (block number, timestamp, transaction hash).
//! Downstream indexers rely on the exact field names and order here.

use super::{Address, VisibilityId};
use crate::access::Role;
use chrono::{DateTime, Utc};
use ethereum_types::U256;
use serde::{Deserialize, Serialize};

/// Parameters of a committed buy or sell
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub from: Address,
    pub visibility_id: VisibilityId,
    pub amount: U256,
    pub is_buy: bool,
    pub trade_cost: U256,
    pub creator_fee: U256,
    pub protocol_fee: U256,
    pub referrer_fee: U256,
    pub referrer: Option<Address>,
    pub new_total_supply: U256,
    pub new_current_price: U256,
}

/// Credits engine events
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum CreditsEvent {
    CreatorFeeClaimed {
        creator: Address,
        amount: U256,
    },
    CreatorVisibilitySet {
        visibility_id: VisibilityId,
        creator: Option<Address>,
    },
    CreditsTrade(TradeEvent),
    CreditsTransfer {
        visibility_id: VisibilityId,
        from: Address,
        to: Address,
        amount: U256,
    },
}

/// Role registry and delayed-admin events
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum AccessEvent {
    RoleGranted {
        role: Role,
        account: Address,
    },
    RoleRevoked {
        role: Role,
        account: Address,
    },
    RoleAdminChanged {
        previous_admin: Address,
        new_admin: Address,
    },
    DefaultAdminTransferScheduled {
        new_admin: Address,
        accept_schedule: DateTime<Utc>,
    },
    DefaultAdminTransferCanceled,
    DefaultAdminDelayChangeScheduled {
        new_delay_secs: i64,
        effect_schedule: DateTime<Utc>,
    },
    DefaultAdminDelayChangeCanceled,
}
