//! Native Currency Bank
//!
//! The engine's view of native-currency accounts: buyers pay in from
//! their account, the engine retains curve reserves and claimable
//! creator fees on its own account, and fee forwards leave toward the
//! treasury and referrers. Within an operation every movement runs
//! after the credit-state mutation, and every outbound payment is
//! covered by a same-operation pay-in or the engine's own holdings.

use crate::error::{CreditsError, CreditsResult};
use crate::types::Address;
use ethereum_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Native-currency account book
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NativeBank {
    balances: HashMap<Address, U256>,
}

impl NativeBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of an account (zero for unknown accounts)
    pub fn balance_of(&self, account: &Address) -> U256 {
        self.balances.get(account).copied().unwrap_or_default()
    }

    /// Credit an account with funds arriving from outside the book
    pub fn deposit(&mut self, account: Address, amount: U256) {
        if amount.is_zero() {
            return;
        }
        let entry = self.balances.entry(account).or_default();
        *entry = *entry + amount;
    }

    /// Move funds between accounts
    pub fn transfer(&mut self, from: Address, to: Address, amount: U256) -> CreditsResult<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let available = self.balance_of(&from);
        if available < amount {
            return Err(CreditsError::NotEnoughEthSent {
                required: amount,
                attached: available,
            });
        }
        self.balances.insert(from, available - amount);
        let entry = self.balances.entry(to).or_default();
        *entry = *entry + amount;
        Ok(())
    }

    /// Sum of every account balance
    pub fn total(&self) -> U256 {
        self.balances
            .values()
            .fold(U256::zero(), |acc, b| acc + b)
    }
}
