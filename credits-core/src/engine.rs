//! Credits Engine
//!
//! Mints and burns per-visibility credits against the bonding curve,
//! decomposes and forwards fees, tracks claimable creator balances and
//! enforces role gates. Every public mutating operation is one atomic
//! commit: all validation runs up front, credit state mutates next, and
//! native-currency disbursements run last.

use crate::access::{Role, RoleRegistry};
use crate::bank::NativeBank;
use crate::clock::TimeSource;
use crate::curve;
use crate::error::{CreditsError, CreditsResult};
use crate::fees::{FeeParams, FeeSplit};
use crate::types::{
    Address, CreditsEvent, TradeEvent, TradeReceipt, TradeSide, Visibility, VisibilityId,
    VisibilityKey,
};
use ethereum_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Quoted cost of a prospective trade
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeQuote {
    /// Curve cost before fees
    pub trade_cost: U256,
    pub creator_fee: U256,
    pub protocol_fee: U256,
    pub referrer_fee: U256,
    /// Buy: total the buyer must attach. Sell: reimbursement paid out.
    pub total: U256,
}

/// Credits engine
pub struct CreditsEngine {
    /// The engine's own native-currency account (curve reserve plus
    /// unclaimed creator fees live here)
    address: Address,
    /// Recipient of protocol fees
    treasury: Address,
    fee_params: FeeParams,
    visibilities: HashMap<VisibilityId, Visibility>,
    bank: NativeBank,
    roles: RoleRegistry,
    events: Vec<CreditsEvent>,
}

impl CreditsEngine {
    /// Create an engine. Fails `InvalidFeeParams` on inconsistent fee
    /// ratios and `InvalidAddress` on a zero engine, admin or treasury
    /// account.
    pub fn new(
        address: Address,
        admin: Address,
        treasury: Address,
        fee_params: FeeParams,
        clock: Arc<dyn TimeSource>,
    ) -> CreditsResult<Self> {
        if address.is_zero() || treasury.is_zero() {
            return Err(CreditsError::InvalidAddress);
        }
        fee_params.validate()?;
        Ok(Self {
            address,
            treasury,
            fee_params,
            visibilities: HashMap::new(),
            bank: NativeBank::new(),
            roles: RoleRegistry::new(admin, clock)?,
            events: Vec::new(),
        })
    }

    // ========================================================================
    // Trading
    // ========================================================================

    /// Buy `amount` credits of a visibility against the curve.
    ///
    /// The caller attaches `value` native units; anything above
    /// `trade_cost + fees` stays untouched on the caller's account.
    pub fn buy_credits(
        &mut self,
        caller: Address,
        visibility_id: &VisibilityId,
        amount: U256,
        referrer: Option<Address>,
        value: U256,
    ) -> CreditsResult<TradeReceipt> {
        let supply = self.total_supply(visibility_id);
        let trade_cost = curve::buy_cost(supply, amount)?;
        let split = self.fee_params.split(trade_cost, referrer);
        let total = trade_cost + split.total();

        if value < total {
            return Err(CreditsError::NotEnoughEthSent {
                required: total,
                attached: value,
            });
        }
        let funds = self.bank.balance_of(&caller);
        if funds < value {
            return Err(CreditsError::NotEnoughEthSent {
                required: value,
                attached: funds,
            });
        }

        // Credit state commits before any native currency moves.
        let visibility = self.visibilities.entry(visibility_id.clone()).or_default();
        visibility.total_supply = visibility.total_supply + amount;
        let balance = visibility.credit_balances.entry(caller).or_default();
        *balance = *balance + amount;
        visibility.claimable_fee_balance = visibility.claimable_fee_balance + split.creator_fee;
        let new_total_supply = visibility.total_supply;

        self.bank.transfer(caller, self.address, total)?;
        self.disburse_fees(&split)?;

        let new_current_price = curve::unit_price(new_total_supply);
        let receipt = TradeReceipt {
            visibility_id: visibility_id.clone(),
            side: TradeSide::Buy,
            amount,
            trade_cost,
            creator_fee: split.creator_fee,
            protocol_fee: split.protocol_fee,
            referrer_fee: split.referrer_fee,
            settled: total,
            refund: value - total,
            new_total_supply,
            new_current_price,
        };
        info!(
            visibility_id = %visibility_id,
            caller = %caller,
            amount = %amount,
            trade_cost = %trade_cost,
            new_total_supply = %new_total_supply,
            operation = "buy_credits",
            "credits bought"
        );
        self.log_trade(caller, &receipt, split.referrer);
        Ok(receipt)
    }

    /// Sell `amount` credits of a visibility back to the curve.
    ///
    /// The seller is reimbursed the curve cost minus all fees.
    pub fn sell_credits(
        &mut self,
        caller: Address,
        visibility_id: &VisibilityId,
        amount: U256,
        referrer: Option<Address>,
    ) -> CreditsResult<TradeReceipt> {
        let supply = self.total_supply(visibility_id);
        let trade_cost = curve::sell_cost(supply, amount)?;
        let owned = self.credit_balance_of(visibility_id, &caller);
        if owned < amount {
            return Err(CreditsError::NotEnoughCreditsOwned {
                required: amount,
                owned,
            });
        }
        let split = self.fee_params.split(trade_cost, referrer);
        let reimbursement = trade_cost - split.total();

        let visibility = self.visibilities.entry(visibility_id.clone()).or_default();
        visibility.total_supply = visibility.total_supply - amount;
        let balance = visibility.credit_balances.entry(caller).or_default();
        *balance = *balance - amount;
        visibility.claimable_fee_balance = visibility.claimable_fee_balance + split.creator_fee;
        let new_total_supply = visibility.total_supply;

        self.bank.transfer(self.address, caller, reimbursement)?;
        self.disburse_fees(&split)?;

        let new_current_price = curve::unit_price(new_total_supply);
        let receipt = TradeReceipt {
            visibility_id: visibility_id.clone(),
            side: TradeSide::Sell,
            amount,
            trade_cost,
            creator_fee: split.creator_fee,
            protocol_fee: split.protocol_fee,
            referrer_fee: split.referrer_fee,
            settled: reimbursement,
            refund: U256::zero(),
            new_total_supply,
            new_current_price,
        };
        info!(
            visibility_id = %visibility_id,
            caller = %caller,
            amount = %amount,
            trade_cost = %trade_cost,
            new_total_supply = %new_total_supply,
            operation = "sell_credits",
            "credits sold"
        );
        self.log_trade(caller, &receipt, split.referrer);
        Ok(receipt)
    }

    /// Pay out a visibility's accumulated creator fees to its creator.
    /// Callable by anyone; the recipient is always the recorded creator.
    pub fn claim_creator_fee(
        &mut self,
        caller: Address,
        visibility_id: &VisibilityId,
    ) -> CreditsResult<U256> {
        let visibility = self.visibilities.get_mut(visibility_id).ok_or_else(|| {
            CreditsError::InvalidCreator {
                visibility_id: visibility_id.as_str().to_string(),
            }
        })?;
        let creator = visibility
            .creator
            .ok_or_else(|| CreditsError::InvalidCreator {
                visibility_id: visibility_id.as_str().to_string(),
            })?;
        let amount = visibility.claimable_fee_balance;
        if amount.is_zero() {
            return Err(CreditsError::invalid_amount("no claimable creator fees"));
        }

        visibility.claimable_fee_balance = U256::zero();
        self.bank.transfer(self.address, creator, amount)?;

        info!(
            visibility_id = %visibility_id,
            caller = %caller,
            creator = %creator,
            amount = %amount,
            operation = "claim_creator_fee",
            "creator fees claimed"
        );
        self.events
            .push(CreditsEvent::CreatorFeeClaimed { creator, amount });
        Ok(amount)
    }

    // ========================================================================
    // Administration
    // ========================================================================

    /// Bind (or unbind, with `None`) the creator of a visibility.
    /// Requires the `CreatorsChecker` role.
    pub fn set_creator_visibility(
        &mut self,
        caller: Address,
        visibility_id: &VisibilityId,
        creator: Option<Address>,
    ) -> CreditsResult<()> {
        self.roles.require_role(Role::CreatorsChecker, &caller)?;
        let visibility = self.visibilities.entry(visibility_id.clone()).or_default();
        visibility.creator = creator.filter(|c| !c.is_zero());
        info!(
            visibility_id = %visibility_id,
            creator = ?visibility.creator,
            operation = "set_creator_visibility",
            "creator bound"
        );
        self.events.push(CreditsEvent::CreatorVisibilitySet {
            visibility_id: visibility_id.clone(),
            creator: visibility.creator,
        });
        Ok(())
    }

    /// Move credits between accounts without touching supply or fees.
    /// Requires the `CreditsTransfer` role.
    pub fn transfer_credits(
        &mut self,
        caller: Address,
        visibility_id: &VisibilityId,
        from: Address,
        to: Address,
        amount: U256,
    ) -> CreditsResult<()> {
        self.roles.require_role(Role::CreditsTransfer, &caller)?;
        let owned = self.credit_balance_of(visibility_id, &from);
        if owned < amount {
            return Err(CreditsError::NotEnoughCreditsOwned {
                required: amount,
                owned,
            });
        }

        let visibility = self.visibilities.entry(visibility_id.clone()).or_default();
        let from_balance = visibility.credit_balances.entry(from).or_default();
        *from_balance = *from_balance - amount;
        let to_balance = visibility.credit_balances.entry(to).or_default();
        *to_balance = *to_balance + amount;

        info!(
            visibility_id = %visibility_id,
            from = %from,
            to = %to,
            amount = %amount,
            operation = "transfer_credits",
            "credits transferred"
        );
        self.events.push(CreditsEvent::CreditsTransfer {
            visibility_id: visibility_id.clone(),
            from,
            to,
            amount,
        });
        Ok(())
    }

    /// Replace the protocol treasury. Admin only; the zero address is
    /// rejected.
    pub fn update_treasury(&mut self, caller: Address, treasury: Address) -> CreditsResult<()> {
        self.roles.require_role(Role::DefaultAdmin, &caller)?;
        if treasury.is_zero() {
            return Err(CreditsError::InvalidAddress);
        }
        self.treasury = treasury;
        info!(treasury = %treasury, operation = "update_treasury", "treasury updated");
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Quote a buy at the current supply
    pub fn buy_cost_with_fees(
        &self,
        visibility_id: &VisibilityId,
        amount: U256,
        referrer: Option<Address>,
    ) -> CreditsResult<TradeQuote> {
        let trade_cost = curve::buy_cost(self.total_supply(visibility_id), amount)?;
        let split = self.fee_params.split(trade_cost, referrer);
        Ok(TradeQuote {
            trade_cost,
            creator_fee: split.creator_fee,
            protocol_fee: split.protocol_fee,
            referrer_fee: split.referrer_fee,
            total: trade_cost + split.total(),
        })
    }

    /// Quote a sell at the current supply
    pub fn sell_cost_with_fees(
        &self,
        visibility_id: &VisibilityId,
        amount: U256,
        referrer: Option<Address>,
    ) -> CreditsResult<TradeQuote> {
        let trade_cost = curve::sell_cost(self.total_supply(visibility_id), amount)?;
        let split = self.fee_params.split(trade_cost, referrer);
        Ok(TradeQuote {
            trade_cost,
            creator_fee: split.creator_fee,
            protocol_fee: split.protocol_fee,
            referrer_fee: split.referrer_fee,
            total: trade_cost - split.total(),
        })
    }

    /// Visibility record, if it has ever been written
    pub fn get_visibility(&self, visibility_id: &VisibilityId) -> Option<&Visibility> {
        self.visibilities.get(visibility_id)
    }

    /// Recorded creator of a visibility
    pub fn get_creator(&self, visibility_id: &VisibilityId) -> Option<Address> {
        self.visibilities
            .get(visibility_id)
            .and_then(|v| v.creator)
    }

    /// Current credit supply of a visibility
    pub fn total_supply(&self, visibility_id: &VisibilityId) -> U256 {
        self.visibilities
            .get(visibility_id)
            .map(|v| v.total_supply)
            .unwrap_or_default()
    }

    /// Credit balance of an account under a visibility
    pub fn credit_balance_of(&self, visibility_id: &VisibilityId, account: &Address) -> U256 {
        self.visibilities
            .get(visibility_id)
            .map(|v| v.balance_of(account))
            .unwrap_or_default()
    }

    /// Instantaneous unit price at the current supply
    pub fn current_price(&self, visibility_id: &VisibilityId) -> U256 {
        curve::unit_price(self.total_supply(visibility_id))
    }

    /// Domain-separated storage key digest of a visibility id
    pub fn visibility_key(&self, visibility_id: &VisibilityId) -> VisibilityKey {
        visibility_id.key()
    }

    /// Native-currency balance of an account in the engine's bank
    pub fn native_balance_of(&self, account: &Address) -> U256 {
        self.bank.balance_of(account)
    }

    /// Fund an account's native balance from outside the book (the
    /// embedding ledger's deposit hook)
    pub fn deposit_native(&mut self, account: Address, amount: U256) {
        self.bank.deposit(account, amount);
    }

    /// The engine's own account
    pub fn address(&self) -> Address {
        self.address
    }

    /// Current protocol treasury
    pub fn treasury(&self) -> Address {
        self.treasury
    }

    /// Role registry (shared with the services layer)
    pub fn roles(&self) -> &RoleRegistry {
        &self.roles
    }

    /// Role registry, mutable
    pub fn roles_mut(&mut self) -> &mut RoleRegistry {
        &mut self.roles
    }

    /// Verify the per-visibility conservation invariants: the supply
    /// equals the sum of balances, stays under the cap, and the
    /// claimable fees are covered by the engine's native holdings.
    pub fn verify_invariants(&self, visibility_id: &VisibilityId) -> bool {
        let Some(visibility) = self.visibilities.get(visibility_id) else {
            return true;
        };
        let claimable_total = self
            .visibilities
            .values()
            .fold(U256::zero(), |acc, v| acc + v.claimable_fee_balance);
        visibility.total_supply == visibility.balances_total()
            && visibility.total_supply <= U256::from(u64::MAX)
            && claimable_total <= self.bank.balance_of(&self.address)
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Events emitted since the last drain
    pub fn events(&self) -> &[CreditsEvent] {
        &self.events
    }

    /// Drain buffered events
    pub fn drain_events(&mut self) -> Vec<CreditsEvent> {
        std::mem::take(&mut self.events)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Forward protocol and referrer fees out of the engine account
    fn disburse_fees(&mut self, split: &FeeSplit) -> CreditsResult<()> {
        self.bank
            .transfer(self.address, self.treasury, split.protocol_fee)?;
        if let Some(referrer) = split.referrer {
            self.bank
                .transfer(self.address, referrer, split.referrer_fee)?;
        }
        Ok(())
    }

    fn log_trade(&mut self, from: Address, receipt: &TradeReceipt, referrer: Option<Address>) {
        self.events.push(CreditsEvent::CreditsTrade(TradeEvent {
            from,
            visibility_id: receipt.visibility_id.clone(),
            amount: receipt.amount,
            is_buy: receipt.side == TradeSide::Buy,
            trade_cost: receipt.trade_cost,
            creator_fee: receipt.creator_fee,
            protocol_fee: receipt.protocol_fee,
            referrer_fee: receipt.referrer_fee,
            referrer,
            new_total_supply: receipt.new_total_supply,
            new_current_price: receipt.new_current_price,
        }));
    }
}
