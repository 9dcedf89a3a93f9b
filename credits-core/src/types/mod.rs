//! Credits Core Types

mod common;
mod events;
mod visibility;

pub use common::{Address, VisibilityId, VisibilityKey};
pub use events::{AccessEvent, CreditsEvent, TradeEvent};
pub use visibility::{TradeReceipt, TradeSide, Visibility};
