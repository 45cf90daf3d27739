//! Call context
//!
//! Every mutating operation receives the caller, the current instant and the
//! collaborators it consults for roles and fee rates. The engine holds no
//! ambient authority of its own.

use crate::collaborators::{GlobalsLike, PoolManagerLike};

/// Caller identity, clock and role sources for one operation
#[derive(Clone, Copy)]
pub struct CallContext<'a> {
    /// Account invoking the operation
    pub caller: &'a str,

    /// Current unix timestamp
    pub now: u64,

    /// Platform fee rates, governor, migration admin
    pub globals: &'a dyn GlobalsLike,

    /// Pool delegate and delegate fee rate
    pub pool_manager: &'a dyn PoolManagerLike,
}

impl<'a> CallContext<'a> {
    pub fn new(
        caller: &'a str,
        now: u64,
        globals: &'a dyn GlobalsLike,
        pool_manager: &'a dyn PoolManagerLike,
    ) -> Self {
        Self {
            caller,
            now,
            globals,
            pool_manager,
        }
    }

    /// Same collaborators, different caller
    pub fn as_caller(&self, caller: &'a str) -> Self {
        Self { caller, ..*self }
    }

    /// Same collaborators, different instant
    pub fn at(&self, now: u64) -> Self {
        Self { now, ..*self }
    }

    pub fn is_pool_delegate(&self) -> bool {
        self.caller == self.pool_manager.pool_delegate()
    }

    pub fn is_governor(&self) -> bool {
        self.caller == self.globals.governor()
    }

    pub fn is_migration_admin(&self) -> bool {
        self.caller == self.globals.migration_admin()
    }

    pub fn is_pool_deployer(&self) -> bool {
        self.globals.is_pool_deployer(self.caller)
    }
}

impl std::fmt::Debug for CallContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("caller", &self.caller)
            .field("now", &self.now)
            .field("pool_manager", &self.pool_manager.id())
            .finish()
    }
}
