//! Visibility Credits Engine
//!
//! Per-creator credit books priced by a deterministic bonding curve.
//! A credit is a fungible claim inside one visibility's namespace;
//! credits are never fungible across visibilities. The engine mints and
//! burns credits against the curve, decomposes every trade cost into
//! creator, protocol and referrer fees, accumulates claimable creator
//! balances, and gates privileged operations behind a shared role
//! registry with a delayed default-admin transfer.
//!
//! # Conservation Invariants
//!
//! | Invariant | Core requirement |
//! |-----------|------------------|
//! | **Supply** | `total_supply == sum of credit balances` at every commit |
//! | **Cap** | `total_supply <= 2^64 - 1`, enforced before minting |
//! | **Coverage** | claimable creator fees never exceed the engine's native holdings |
//! | **Settlement** | buyer pays exactly `trade_cost + fees`; excess value never leaves the buyer |
//! | **Ordering** | credit state commits before any native-currency disbursement |
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Services Marketplace Layer                  │
//! │        (escrow state machine, services-core crate)           │
//! ├─────────────────────────────────────────────────────────────┤
//! │               Credits Engine (this crate)                    │
//! │   (bonding curve, credit book, fee ledger, role registry)   │
//! ├─────────────────────────────────────────────────────────────┤
//! │              Linearizable Ledger Substrate                   │
//! │        (atomic commit per operation, event drain)            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod access;
pub mod bank;
pub mod clock;
pub mod constants;
pub mod curve;
pub mod engine;
pub mod error;
pub mod fees;
pub mod types;

pub use access::{AdminChange, Role, RoleRegistry};
pub use bank::NativeBank;
pub use clock::{ManualClock, SystemClock, TimeSource};
pub use engine::{CreditsEngine, TradeQuote};
pub use error::{CreditsError, CreditsResult};
pub use fees::{FeeParams, FeeSplit};
pub use types::{
    AccessEvent, Address, CreditsEvent, TradeEvent, TradeReceipt, TradeSide, Visibility,
    VisibilityId, VisibilityKey,
};

/// Re-exported for callers that only need the arithmetic type
pub use ethereum_types::U256;
