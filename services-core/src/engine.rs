//! Services Engine
//!
//! Runs the per-execution state machine and escrows credits through the
//! credits engine's transfer primitive. The engine's own account holds
//! the escrow and must be granted the `CreditsTransfer` role on the
//! credits engine. Creator identity is looked up live on every
//! transition, so a rebound creator takes over authorization
//! immediately.
//!
//! ```text
//! UNINITIALIZED ──request──▶ REQUESTED ──accept──▶ ACCEPTED ──validate──▶ VALIDATED
//!                                │                    │
//!                              cancel              dispute
//!                                ▼                    ▼
//!                            REFUNDED             DISPUTED ──resolve──▶ REFUNDED | VALIDATED
//! ```

use crate::error::{ServicesError, ServicesResult};
use crate::types::{Execution, ExecutionInfo, ExecutionState, Service, ServiceEvent};
use chrono::{DateTime, Duration, Utc};
use credits_core::constants::AUTO_VALIDATION_DELAY_SECS;
use credits_core::{Address, CreditsEngine, CreditsError, Role, TimeSource, VisibilityId};
use ethereum_types::U256;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Snapshot of an execution used by transition checks
struct TransitionCtx {
    visibility_id: VisibilityId,
    credits_cost: U256,
    state: ExecutionState,
    requester: Address,
    last_update_ts: DateTime<Utc>,
}

/// Services engine
pub struct ServicesEngine {
    /// The engine's own account; escrowed credits sit on it
    address: Address,
    services: BTreeMap<u64, Service>,
    services_nonce: u64,
    clock: Arc<dyn TimeSource>,
    events: Vec<ServiceEvent>,
}

impl ServicesEngine {
    /// Create an engine bound to its escrow account
    pub fn new(address: Address, clock: Arc<dyn TimeSource>) -> ServicesResult<Self> {
        if address.is_zero() {
            return Err(CreditsError::InvalidAddress.into());
        }
        Ok(Self {
            address,
            services: BTreeMap::new(),
            services_nonce: 0,
            clock,
            events: Vec::new(),
        })
    }

    // ========================================================================
    // Service Management
    // ========================================================================

    /// Define a new service. Only the visibility's current creator may
    /// create services for it.
    pub fn create_service(
        &mut self,
        credits: &CreditsEngine,
        caller: Address,
        service_type: impl Into<String>,
        visibility_id: VisibilityId,
        credits_cost: U256,
    ) -> ServicesResult<u64> {
        require_creator(credits, &visibility_id, &caller)?;

        let nonce = self.services_nonce;
        let service_type = service_type.into();
        self.services.insert(
            nonce,
            Service {
                enabled: true,
                service_type: service_type.clone(),
                visibility_id: visibility_id.clone(),
                credits_cost,
                executions_nonce: 0,
                executions: BTreeMap::new(),
            },
        );
        self.services_nonce += 1;

        info!(
            nonce,
            service_type = %service_type,
            visibility_id = %visibility_id,
            credits_cost = %credits_cost,
            operation = "create_service",
            "service created"
        );
        self.events.push(ServiceEvent::ServiceCreated {
            nonce,
            service_type,
            visibility_id,
            credits_cost_amount: credits_cost,
        });
        Ok(nonce)
    }

    /// Toggle a service. Only the visibility's current creator.
    pub fn update_service(
        &mut self,
        credits: &CreditsEngine,
        caller: Address,
        service_nonce: u64,
        enabled: bool,
    ) -> ServicesResult<()> {
        let service = self
            .services
            .get(&service_nonce)
            .ok_or(ServicesError::UnknownService { service_nonce })?;
        require_creator(credits, &service.visibility_id, &caller)?;

        self.services
            .get_mut(&service_nonce)
            .ok_or(ServicesError::UnknownService { service_nonce })?
            .enabled = enabled;

        info!(service_nonce, enabled, operation = "update_service", "service updated");
        self.events.push(ServiceEvent::ServiceUpdated {
            nonce: service_nonce,
            enabled,
        });
        Ok(())
    }

    // ========================================================================
    // Execution State Machine
    // ========================================================================

    /// Request an execution, escrowing `credits_cost` from the caller.
    /// Unknown services read as disabled.
    pub fn request_service_execution(
        &mut self,
        credits: &mut CreditsEngine,
        caller: Address,
        service_nonce: u64,
        request_data: impl Into<String>,
    ) -> ServicesResult<u64> {
        let now = self.clock.now();
        let service = self
            .services
            .get(&service_nonce)
            .filter(|s| s.enabled)
            .ok_or(ServicesError::DisabledService { service_nonce })?;
        let visibility_id = service.visibility_id.clone();
        let credits_cost = service.credits_cost;

        // Escrow first; a failed transfer leaves no execution behind.
        credits.transfer_credits(self.address, &visibility_id, caller, self.address, credits_cost)?;

        let service = self
            .services
            .get_mut(&service_nonce)
            .ok_or(ServicesError::UnknownService { service_nonce })?;
        let execution_nonce = service.executions_nonce;
        service.executions.insert(
            execution_nonce,
            Execution {
                state: ExecutionState::Requested,
                requester: caller,
                last_update_ts: now,
            },
        );
        service.executions_nonce += 1;

        let request_data = request_data.into();
        info!(
            service_nonce,
            execution_nonce,
            requester = %caller,
            operation = "request_service_execution",
            "execution requested"
        );
        self.events.push(ServiceEvent::ServiceExecutionRequested {
            service_nonce,
            execution_nonce,
            requester: caller,
            request_data,
        });
        Ok(execution_nonce)
    }

    /// Creator accepts a requested execution
    pub fn accept_service_execution(
        &mut self,
        credits: &CreditsEngine,
        caller: Address,
        service_nonce: u64,
        execution_nonce: u64,
        response_data: impl Into<String>,
    ) -> ServicesResult<()> {
        let now = self.clock.now();
        let ctx = self.transition_ctx(service_nonce, execution_nonce)?;
        expect_state(&ctx, ExecutionState::Requested)?;
        let creator = live_creator(credits, &ctx.visibility_id)?;
        if caller != creator {
            return Err(ServicesError::UnauthorizedExecutionAction { caller });
        }

        self.commit_transition(service_nonce, execution_nonce, ExecutionState::Accepted, now);
        info!(
            service_nonce,
            execution_nonce,
            operation = "accept_service_execution",
            "execution accepted"
        );
        self.events.push(ServiceEvent::ServiceExecutionAccepted {
            service_nonce,
            execution_nonce,
            response_data: response_data.into(),
        });
        Ok(())
    }

    /// Requester or creator cancels a requested execution; the escrow
    /// returns to the requester.
    pub fn cancel_service_execution(
        &mut self,
        credits: &mut CreditsEngine,
        caller: Address,
        service_nonce: u64,
        execution_nonce: u64,
        cancel_data: impl Into<String>,
    ) -> ServicesResult<()> {
        let now = self.clock.now();
        let ctx = self.transition_ctx(service_nonce, execution_nonce)?;
        expect_state(&ctx, ExecutionState::Requested)?;
        let creator = credits.get_creator(&ctx.visibility_id);
        if caller != ctx.requester && Some(caller) != creator {
            return Err(ServicesError::UnauthorizedExecutionAction { caller });
        }

        credits.transfer_credits(
            self.address,
            &ctx.visibility_id,
            self.address,
            ctx.requester,
            ctx.credits_cost,
        )?;
        self.commit_transition(service_nonce, execution_nonce, ExecutionState::Refunded, now);

        info!(
            service_nonce,
            execution_nonce,
            from = %caller,
            operation = "cancel_service_execution",
            "execution canceled"
        );
        self.events.push(ServiceEvent::ServiceExecutionCanceled {
            service_nonce,
            execution_nonce,
            from: caller,
            cancel_data: cancel_data.into(),
        });
        Ok(())
    }

    /// Settle an accepted execution to the creator. The requester may
    /// validate at any time; once the auto-validation delay has passed,
    /// anyone may.
    pub fn validate_service_execution(
        &mut self,
        credits: &mut CreditsEngine,
        caller: Address,
        service_nonce: u64,
        execution_nonce: u64,
    ) -> ServicesResult<()> {
        let now = self.clock.now();
        let ctx = self.transition_ctx(service_nonce, execution_nonce)?;
        expect_state(&ctx, ExecutionState::Accepted)?;
        let deadline = ctx.last_update_ts + Duration::seconds(AUTO_VALIDATION_DELAY_SECS);
        if caller != ctx.requester && now <= deadline {
            return Err(ServicesError::UnauthorizedExecutionAction { caller });
        }
        let creator = live_creator(credits, &ctx.visibility_id)?;

        credits.transfer_credits(
            self.address,
            &ctx.visibility_id,
            self.address,
            creator,
            ctx.credits_cost,
        )?;
        self.commit_transition(service_nonce, execution_nonce, ExecutionState::Validated, now);

        info!(
            service_nonce,
            execution_nonce,
            operation = "validate_service_execution",
            "execution validated"
        );
        self.events.push(ServiceEvent::ServiceExecutionValidated {
            service_nonce,
            execution_nonce,
        });
        Ok(())
    }

    /// Requester contests an accepted execution
    pub fn dispute_service_execution(
        &mut self,
        caller: Address,
        service_nonce: u64,
        execution_nonce: u64,
        dispute_data: impl Into<String>,
    ) -> ServicesResult<()> {
        let now = self.clock.now();
        let ctx = self.transition_ctx(service_nonce, execution_nonce)?;
        expect_state(&ctx, ExecutionState::Accepted)?;
        if caller != ctx.requester {
            return Err(ServicesError::UnauthorizedExecutionAction { caller });
        }

        self.commit_transition(service_nonce, execution_nonce, ExecutionState::Disputed, now);
        info!(
            service_nonce,
            execution_nonce,
            operation = "dispute_service_execution",
            "execution disputed"
        );
        self.events.push(ServiceEvent::ServiceExecutionDisputed {
            service_nonce,
            execution_nonce,
            dispute_data: dispute_data.into(),
        });
        Ok(())
    }

    /// Dispute resolver settles a disputed execution: escrow back to
    /// the requester on refund, to the creator otherwise.
    pub fn resolve_service_execution(
        &mut self,
        credits: &mut CreditsEngine,
        caller: Address,
        service_nonce: u64,
        execution_nonce: u64,
        refund: bool,
        resolve_data: impl Into<String>,
    ) -> ServicesResult<()> {
        let now = self.clock.now();
        credits.roles().require_role(Role::DisputeResolver, &caller)?;
        let ctx = self.transition_ctx(service_nonce, execution_nonce)?;
        expect_state(&ctx, ExecutionState::Disputed)?;

        let (recipient, final_state) = if refund {
            (ctx.requester, ExecutionState::Refunded)
        } else {
            (live_creator(credits, &ctx.visibility_id)?, ExecutionState::Validated)
        };
        credits.transfer_credits(
            self.address,
            &ctx.visibility_id,
            self.address,
            recipient,
            ctx.credits_cost,
        )?;
        self.commit_transition(service_nonce, execution_nonce, final_state, now);

        info!(
            service_nonce,
            execution_nonce,
            refund,
            operation = "resolve_service_execution",
            "execution resolved"
        );
        self.events.push(ServiceEvent::ServiceExecutionResolved {
            service_nonce,
            execution_nonce,
            refund,
            resolve_data: resolve_data.into(),
        });
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Service record, if it exists
    pub fn get_service(&self, service_nonce: u64) -> Option<&Service> {
        self.services.get(&service_nonce)
    }

    /// Execution view; unknown keys read as uninitialized
    pub fn get_service_execution(&self, service_nonce: u64, execution_nonce: u64) -> ExecutionInfo {
        self.services
            .get(&service_nonce)
            .and_then(|s| s.executions.get(&execution_nonce))
            .map(|e| ExecutionInfo {
                state: e.state,
                requester: e.requester,
                last_update_ts: Some(e.last_update_ts),
            })
            .unwrap_or_else(ExecutionInfo::uninitialized)
    }

    /// Number of executions of a service still holding escrow
    pub fn open_executions(&self, service_nonce: u64) -> usize {
        self.services
            .get(&service_nonce)
            .map(|s| {
                s.executions
                    .values()
                    .filter(|e| !e.state.is_terminal())
                    .count()
            })
            .unwrap_or(0)
    }

    /// The engine's escrow account
    pub fn address(&self) -> Address {
        self.address
    }

    /// Events emitted since the last drain
    pub fn events(&self) -> &[ServiceEvent] {
        &self.events
    }

    /// Drain buffered events
    pub fn drain_events(&mut self) -> Vec<ServiceEvent> {
        std::mem::take(&mut self.events)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn transition_ctx(
        &self,
        service_nonce: u64,
        execution_nonce: u64,
    ) -> ServicesResult<TransitionCtx> {
        let service = self
            .services
            .get(&service_nonce)
            .ok_or(ServicesError::UnknownService { service_nonce })?;
        let execution = service.executions.get(&execution_nonce).ok_or(
            ServicesError::InvalidExecutionState {
                current: ExecutionState::Uninitialized,
            },
        )?;
        Ok(TransitionCtx {
            visibility_id: service.visibility_id.clone(),
            credits_cost: service.credits_cost,
            state: execution.state,
            requester: execution.requester,
            last_update_ts: execution.last_update_ts,
        })
    }

    /// Write the new state and stamp the transition time. The credit
    /// movement of the transition has already happened.
    fn commit_transition(
        &mut self,
        service_nonce: u64,
        execution_nonce: u64,
        state: ExecutionState,
        now: DateTime<Utc>,
    ) {
        if let Some(execution) = self
            .services
            .get_mut(&service_nonce)
            .and_then(|s| s.executions.get_mut(&execution_nonce))
        {
            execution.state = state;
            execution.last_update_ts = now;
        }
    }
}

/// Live creator lookup; a visibility without a creator cannot receive
/// settlements.
fn live_creator(credits: &CreditsEngine, visibility_id: &VisibilityId) -> ServicesResult<Address> {
    credits
        .get_creator(visibility_id)
        .ok_or_else(|| {
            CreditsError::InvalidCreator {
                visibility_id: visibility_id.as_str().to_string(),
            }
            .into()
        })
}

/// Management-path creator check (`InvalidCreator`, not the execution
/// authorization error)
fn require_creator(
    credits: &CreditsEngine,
    visibility_id: &VisibilityId,
    caller: &Address,
) -> ServicesResult<()> {
    match credits.get_creator(visibility_id) {
        Some(creator) if creator == *caller => Ok(()),
        _ => Err(CreditsError::InvalidCreator {
            visibility_id: visibility_id.as_str().to_string(),
        }
        .into()),
    }
}

fn expect_state(ctx: &TransitionCtx, expected: ExecutionState) -> ServicesResult<()> {
    if ctx.state != expected {
        return Err(ServicesError::InvalidExecutionState { current: ctx.state });
    }
    Ok(())
}
