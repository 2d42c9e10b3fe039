use crate::ledger::AccountId;

use parking_lot::ReentrantMutexGuard;

/// Proof that the current thread holds an account's reservation lock.
///
/// Dropping it is the "unlock": the lock is handed over fairly to the next
/// waiting thread, if any.
#[must_use = "the reservation is released as soon as it is dropped"]
pub struct Reservation<'a> {
    account: AccountId,
    guard: Option<ReentrantMutexGuard<'a, ()>>,
}

impl<'a> Reservation<'a> {
    pub(super) fn new(account: AccountId, guard: ReentrantMutexGuard<'a, ()>) -> Self {
        tracing::trace!(account, "reserved");
        Self {
            account,
            guard: Some(guard),
        }
    }

    pub fn account(&self) -> AccountId {
        self.account
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            ReentrantMutexGuard::unlock_fair(guard);
            tracing::trace!(account = self.account, "released");
        }
    }
}
