//! Shared handle for concurrent hosts
//!
//! One mutex guards the whole manager. Mutations and queries both go
//! through it, so a reader never observes a half-applied operation.

use crate::orchestrator::engine::{LoanManager, LoanManagerError};
use std::sync::{Arc, Mutex, MutexGuard};

/// Cloneable, thread-safe handle to one [`LoanManager`]
#[derive(Clone)]
pub struct SharedLoanManager {
    inner: Arc<Mutex<LoanManager>>,
}

impl SharedLoanManager {
    pub fn new(manager: LoanManager) -> Self {
        Self {
            inner: Arc::new(Mutex::new(manager)),
        }
    }

    /// Lock the manager for a sequence of calls
    pub fn lock(&self) -> Result<MutexGuard<'_, LoanManager>, LoanManagerError> {
        self.inner
            .lock()
            .map_err(|_| LoanManagerError::StateValidation("loan manager lock poisoned".to_string()))
    }

    /// Run `f` with exclusive access
    pub fn with<R>(&self, f: impl FnOnce(&mut LoanManager) -> R) -> Result<R, LoanManagerError> {
        let mut guard = self.lock()?;
        Ok(f(&mut guard))
    }

    pub fn assets_under_management(&self, now: u64) -> Result<u128, LoanManagerError> {
        Ok(self.lock()?.assets_under_management(now))
    }

    pub fn accrued_interest(&self, now: u64) -> Result<u128, LoanManagerError> {
        Ok(self.lock()?.accrued_interest(now))
    }
}
