//! Bonding Curve
//!
//! Per-unit instantaneous price at supply `s`:
//!
//! ```text
//! price(s) = BASE + A * s^2 + B * s
//! ```
//!
//! A trade of `amount` units settles the sum of unit prices over a
//! contiguous supply range, computed in closed form from
//! `S2(n) = n(n+1)(2n+1)/6` and `S1(n) = n(n+1)/2`. Both divisions are
//! exact. All intermediates stay in `U256`: with supply capped at
//! `2^64 - 1` the largest product is below `2^226`.

use crate::constants::{A_COEFF, BASE_PRICE, B_COEFF, MAX_TOTAL_SUPPLY};
use crate::error::{CreditsError, CreditsResult};
use ethereum_types::U256;

/// Instantaneous price of the next unit at the given supply
pub fn unit_price(supply: U256) -> U256 {
    U256::from(BASE_PRICE) + U256::from(A_COEFF) * supply * supply + U256::from(B_COEFF) * supply
}

/// Curve cost of buying `amount` units at `total_supply`, before fees.
///
/// The buyer pays unit prices over `[total_supply, total_supply + amount - 1]`.
pub fn buy_cost(total_supply: U256, amount: U256) -> CreditsResult<U256> {
    if amount.is_zero() {
        return Err(CreditsError::invalid_amount("zero trade amount"));
    }
    let new_supply = total_supply
        .checked_add(amount)
        .filter(|s| *s <= U256::from(MAX_TOTAL_SUPPLY))
        .ok_or_else(|| CreditsError::invalid_amount("total supply cap exceeded"))?;
    Ok(range_cost(total_supply, new_supply - 1, amount))
}

/// Curve reimbursement for selling `amount` units at `total_supply`, before
/// fees.
///
/// The seller is reimbursed unit prices over
/// `[total_supply - amount, total_supply - 1]`.
pub fn sell_cost(total_supply: U256, amount: U256) -> CreditsResult<U256> {
    if amount.is_zero() {
        return Err(CreditsError::invalid_amount("zero trade amount"));
    }
    if amount > total_supply {
        return Err(CreditsError::invalid_amount(
            "sell amount exceeds total supply",
        ));
    }
    Ok(range_cost(total_supply - amount, total_supply - 1, amount))
}

/// Sum of `price(k)` for `k` in the inclusive range `[from, to]`
fn range_cost(from: U256, to: U256, amount: U256) -> U256 {
    let (sq, lin) = if from.is_zero() {
        (sum_squares(to), sum_first(to))
    } else {
        (
            sum_squares(to) - sum_squares(from - 1),
            sum_first(to) - sum_first(from - 1),
        )
    };
    U256::from(BASE_PRICE) * amount + U256::from(A_COEFF) * sq + U256::from(B_COEFF) * lin
}

/// `0^2 + 1^2 + ... + n^2 = n(n+1)(2n+1)/6`, exact
fn sum_squares(n: U256) -> U256 {
    n * (n + 1) * (U256::from(2) * n + 1) / 6
}

/// `0 + 1 + ... + n = n(n+1)/2`, exact
fn sum_first(n: U256) -> U256 {
    n * (n + 1) / 2
}
