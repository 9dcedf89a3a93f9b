//! Fee Decomposition
//!
//! Every trade cost splits into a creator fee, a protocol fee and an
//! optional referrer fee, all expressed in parts per million of the
//! curve cost. The referrer share is carved out of the protocol share,
//! so a referred trade costs the buyer exactly as much as an unreferred
//! one.

use crate::constants::{
    CREATOR_FEE_PPM, FEE_DENOMINATOR, PROTOCOL_FEE_PPM, REFERRER_FEE_PPM,
};
use crate::error::{CreditsError, CreditsResult};
use crate::types::Address;
use ethereum_types::U256;
use serde::{Deserialize, Serialize};

/// Fee ratio configuration, validated at engine construction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeParams {
    pub creator_ppm: u32,
    pub protocol_ppm: u32,
    pub referrer_ppm: u32,
}

impl Default for FeeParams {
    fn default() -> Self {
        Self {
            creator_ppm: CREATOR_FEE_PPM,
            protocol_ppm: PROTOCOL_FEE_PPM,
            referrer_ppm: REFERRER_FEE_PPM,
        }
    }
}

impl FeeParams {
    /// Init-time sanity check: the referrer share must fit inside the
    /// protocol share, and no single ratio may reach the denominator.
    pub fn validate(&self) -> CreditsResult<()> {
        if self.protocol_ppm <= self.referrer_ppm
            || self.creator_ppm >= FEE_DENOMINATOR
            || self.protocol_ppm >= FEE_DENOMINATOR
        {
            return Err(CreditsError::InvalidFeeParams {
                protocol_ppm: self.protocol_ppm,
                referrer_ppm: self.referrer_ppm,
            });
        }
        Ok(())
    }

    /// Decompose a trade cost.
    ///
    /// A zero-address referrer is normalized to no referrer.
    pub fn split(&self, trade_cost: U256, referrer: Option<Address>) -> FeeSplit {
        let referrer = referrer.filter(|r| !r.is_zero());
        let den = U256::from(FEE_DENOMINATOR);
        let creator_fee = trade_cost * U256::from(self.creator_ppm) / den;
        let (protocol_fee, referrer_fee) = match referrer {
            Some(_) => (
                trade_cost * U256::from(self.protocol_ppm - self.referrer_ppm) / den,
                trade_cost * U256::from(self.referrer_ppm) / den,
            ),
            None => (trade_cost * U256::from(self.protocol_ppm) / den, U256::zero()),
        };
        FeeSplit {
            creator_fee,
            protocol_fee,
            referrer_fee,
            referrer,
        }
    }
}

/// Decomposed fees of one trade
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeSplit {
    pub creator_fee: U256,
    pub protocol_fee: U256,
    pub referrer_fee: U256,
    /// Normalized referrer (never the zero address)
    pub referrer: Option<Address>,
}

impl FeeSplit {
    /// Total fee outflow of the trade
    pub fn total(&self) -> U256 {
        self.creator_fee + self.protocol_fee + self.referrer_fee
    }
}
