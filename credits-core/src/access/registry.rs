//! Role Registry
//!
//! Stores the `(role, account)` membership set and runs the two-phase
//! admin-change protocol. The default admin is not a member of the set;
//! it is a single slot that only the delayed transfer can reassign.

use super::Role;
use crate::clock::TimeSource;
use crate::constants::INITIAL_ADMIN_DELAY_SECS;
use crate::error::{CreditsError, CreditsResult};
use crate::types::{AccessEvent, Address};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Pending admin-change state
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdminChange {
    /// No change scheduled
    Stable,
    /// Admin hand-over scheduled
    TransferPending {
        new_admin: Address,
        accept_at: DateTime<Utc>,
    },
    /// Change of the transfer delay scheduled
    DelayChangePending {
        new_delay_secs: i64,
        effect_at: DateTime<Utc>,
    },
}

/// Role registry with delayed admin transfer
pub struct RoleRegistry {
    admin: Address,
    members: HashSet<(Role, Address)>,
    delay_secs: i64,
    pending: AdminChange,
    clock: Arc<dyn TimeSource>,
    events: Vec<AccessEvent>,
}

impl RoleRegistry {
    /// Create a registry with the given initial admin
    pub fn new(admin: Address, clock: Arc<dyn TimeSource>) -> CreditsResult<Self> {
        if admin.is_zero() {
            return Err(CreditsError::InvalidAddress);
        }
        Ok(Self {
            admin,
            members: HashSet::new(),
            delay_secs: INITIAL_ADMIN_DELAY_SECS,
            pending: AdminChange::Stable,
            clock,
            events: Vec::new(),
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Current default admin
    pub fn default_admin(&self) -> Address {
        self.admin
    }

    /// Membership check. The default-admin role is held by exactly the
    /// current admin slot.
    pub fn has_role(&self, role: Role, account: &Address) -> bool {
        match role {
            Role::DefaultAdmin => *account == self.admin,
            _ => self.members.contains(&(role, *account)),
        }
    }

    /// Fail with `MissingRole` unless the account holds the role
    pub fn require_role(&self, role: Role, account: &Address) -> CreditsResult<()> {
        if self.has_role(role, account) {
            return Ok(());
        }
        Err(CreditsError::MissingRole {
            role,
            account: *account,
        })
    }

    /// Currently effective admin delay in seconds. A scheduled delay
    /// change whose effect time has passed is already reflected here.
    pub fn current_delay_secs(&self) -> i64 {
        match self.pending {
            AdminChange::DelayChangePending {
                new_delay_secs,
                effect_at,
            } if self.clock.now() > effect_at => new_delay_secs,
            _ => self.delay_secs,
        }
    }

    /// Pending change, if any
    pub fn pending_change(&self) -> &AdminChange {
        &self.pending
    }

    // ========================================================================
    // Role Management (admin-gated)
    // ========================================================================

    /// Grant a role. Returns false when the account already held it.
    pub fn grant_role(
        &mut self,
        caller: &Address,
        role: Role,
        account: Address,
    ) -> CreditsResult<bool> {
        self.require_role(Role::DefaultAdmin, caller)?;
        if role == Role::DefaultAdmin {
            return Err(CreditsError::EnforcedAdminRules);
        }
        if account.is_zero() {
            return Err(CreditsError::InvalidAddress);
        }
        let granted = self.members.insert((role, account));
        if granted {
            info!(role = role.name(), account = %account, "role granted");
            self.events.push(AccessEvent::RoleGranted { role, account });
        }
        Ok(granted)
    }

    /// Revoke a role. Returns false when the account did not hold it.
    pub fn revoke_role(
        &mut self,
        caller: &Address,
        role: Role,
        account: Address,
    ) -> CreditsResult<bool> {
        self.require_role(Role::DefaultAdmin, caller)?;
        if role == Role::DefaultAdmin {
            return Err(CreditsError::EnforcedAdminRules);
        }
        let revoked = self.members.remove(&(role, account));
        if revoked {
            info!(role = role.name(), account = %account, "role revoked");
            self.events.push(AccessEvent::RoleRevoked { role, account });
        }
        Ok(revoked)
    }

    // ========================================================================
    // Delayed Admin Transfer
    // ========================================================================

    /// Schedule the admin hand-over. Replaces any previously pending
    /// change; acceptance opens after the currently effective delay.
    pub fn begin_default_admin_transfer(
        &mut self,
        caller: &Address,
        new_admin: Address,
    ) -> CreditsResult<DateTime<Utc>> {
        self.require_role(Role::DefaultAdmin, caller)?;
        if new_admin.is_zero() {
            return Err(CreditsError::InvalidAddress);
        }
        let now = self.clock.now();
        self.settle_delay_change(now);
        let accept_at = now + Duration::seconds(self.delay_secs);
        self.pending = AdminChange::TransferPending {
            new_admin,
            accept_at,
        };
        info!(new_admin = %new_admin, accept_at = %accept_at, "default admin transfer scheduled");
        self.events.push(AccessEvent::DefaultAdminTransferScheduled {
            new_admin,
            accept_schedule: accept_at,
        });
        Ok(accept_at)
    }

    /// Cancel a pending admin hand-over
    pub fn cancel_default_admin_transfer(&mut self, caller: &Address) -> CreditsResult<()> {
        self.require_role(Role::DefaultAdmin, caller)?;
        match self.pending {
            AdminChange::TransferPending { .. } => {
                self.pending = AdminChange::Stable;
                info!("default admin transfer canceled");
                self.events.push(AccessEvent::DefaultAdminTransferCanceled);
                Ok(())
            }
            _ => Err(CreditsError::NoPendingAdminChange),
        }
    }

    /// Complete the hand-over. Only the scheduled new admin may accept,
    /// and only after the schedule has passed.
    pub fn accept_default_admin_transfer(&mut self, caller: &Address) -> CreditsResult<()> {
        let (new_admin, accept_at) = match self.pending {
            AdminChange::TransferPending {
                new_admin,
                accept_at,
            } => (new_admin, accept_at),
            _ => return Err(CreditsError::NoPendingAdminChange),
        };
        if *caller != new_admin {
            return Err(CreditsError::NotPendingAdmin { account: *caller });
        }
        let now = self.clock.now();
        if now <= accept_at {
            return Err(CreditsError::AdminChangeNotReady {
                ready_at: accept_at,
            });
        }
        let previous_admin = self.admin;
        self.admin = new_admin;
        self.pending = AdminChange::Stable;
        info!(previous_admin = %previous_admin, new_admin = %new_admin, "default admin changed");
        self.events.push(AccessEvent::RoleAdminChanged {
            previous_admin,
            new_admin,
        });
        Ok(())
    }

    // ========================================================================
    // Delayed Delay Change
    // ========================================================================

    /// Schedule a change of the admin delay itself. Takes effect after
    /// the currently effective delay; replaces any pending change.
    pub fn begin_default_admin_delay_change(
        &mut self,
        caller: &Address,
        new_delay_secs: i64,
    ) -> CreditsResult<DateTime<Utc>> {
        self.require_role(Role::DefaultAdmin, caller)?;
        if new_delay_secs < 0 {
            return Err(CreditsError::invalid_amount("negative admin delay"));
        }
        let now = self.clock.now();
        self.settle_delay_change(now);
        let effect_at = now + Duration::seconds(self.delay_secs);
        self.pending = AdminChange::DelayChangePending {
            new_delay_secs,
            effect_at,
        };
        info!(new_delay_secs, effect_at = %effect_at, "admin delay change scheduled");
        self.events
            .push(AccessEvent::DefaultAdminDelayChangeScheduled {
                new_delay_secs,
                effect_schedule: effect_at,
            });
        Ok(effect_at)
    }

    /// Cancel a pending delay change that has not yet taken effect
    pub fn cancel_default_admin_delay_change(&mut self, caller: &Address) -> CreditsResult<()> {
        self.require_role(Role::DefaultAdmin, caller)?;
        let now = self.clock.now();
        self.settle_delay_change(now);
        match self.pending {
            AdminChange::DelayChangePending { .. } => {
                self.pending = AdminChange::Stable;
                info!("admin delay change canceled");
                self.events
                    .push(AccessEvent::DefaultAdminDelayChangeCanceled);
                Ok(())
            }
            _ => Err(CreditsError::NoPendingAdminChange),
        }
    }

    /// Commit a scheduled delay change whose effect time has passed
    fn settle_delay_change(&mut self, now: DateTime<Utc>) {
        if let AdminChange::DelayChangePending {
            new_delay_secs,
            effect_at,
        } = self.pending
        {
            if now > effect_at {
                self.delay_secs = new_delay_secs;
                self.pending = AdminChange::Stable;
            }
        }
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Events emitted since the last drain
    pub fn events(&self) -> &[AccessEvent] {
        &self.events
    }

    /// Drain buffered events
    pub fn drain_events(&mut self) -> Vec<AccessEvent> {
        std::mem::take(&mut self.events)
    }
}
