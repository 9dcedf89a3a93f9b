//! Services Marketplace Layer
//!
//! Creator-defined services priced in visibility credits, settled by a
//! per-execution state machine with escrow, time-based auto-validation
//! and privileged dispute resolution. This crate sits on top of
//! `credits-core` and touches it through exactly two seams: the
//! role-gated credit transfer (escrow in, settlement out) and the live
//! creator lookup.
//!
//! # Escrow Discipline
//!
//! Between request and settlement the execution's cost sits on the
//! engine's own credit account. Every settlement transition moves the
//! full cost out before the state and timestamp commit; at every
//! observable moment exactly one of requester, escrow or creator holds
//! the credits.

pub mod engine;
pub mod error;
pub mod types;

pub use engine::ServicesEngine;
pub use error::{ServicesError, ServicesResult};
pub use types::{Execution, ExecutionInfo, ExecutionState, Service, ServiceEvent};
