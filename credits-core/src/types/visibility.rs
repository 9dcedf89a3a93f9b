//! Visibility Records

use super::{Address, VisibilityId};
use ethereum_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-visibility credit book.
///
/// Created implicitly on first write and never destroyed; the supply may
/// return to zero but the record persists.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Visibility {
    /// Account entitled to the accumulated creator fees (set by a linker role)
    pub creator: Option<Address>,
    /// Total credits in circulation, bounded by the supply cap
    pub total_supply: U256,
    /// Native currency owed to `creator`, not yet paid out
    pub claimable_fee_balance: U256,
    /// Credit balances per account (the services escrow account included)
    pub credit_balances: HashMap<Address, U256>,
}

impl Visibility {
    /// Credit balance of an account (zero for unknown accounts)
    pub fn balance_of(&self, account: &Address) -> U256 {
        self.credit_balances
            .get(account)
            .copied()
            .unwrap_or_default()
    }

    /// Sum of all credit balances; equals `total_supply` at every commit
    pub fn balances_total(&self) -> U256 {
        self.credit_balances
            .values()
            .fold(U256::zero(), |acc, b| acc + b)
    }
}

/// Buy or sell side of a trade
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Committed outcome of a single buy or sell
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeReceipt {
    pub visibility_id: VisibilityId,
    pub side: TradeSide,
    /// Units traded
    pub amount: U256,
    /// Curve cost before fees
    pub trade_cost: U256,
    pub creator_fee: U256,
    pub protocol_fee: U256,
    pub referrer_fee: U256,
    /// Buyer: total paid in. Seller: reimbursement paid out.
    pub settled: U256,
    /// Excess of the attached value returned to the buyer (zero on sells)
    pub refund: U256,
    pub new_total_supply: U256,
    /// Instantaneous unit price at the post-trade supply
    pub new_current_price: U256,
}
