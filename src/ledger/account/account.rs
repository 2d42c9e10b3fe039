use crate::ledger::{AccountId, Amount, DECIMAL_PRECISION};

use super::reservation::Reservation;
use parking_lot::{ReentrantMutex, RwLock};

/// Note: I chose to keep errors simple here.
/// The ledger wraps them with the account id when it needs to report them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    /// Funds in the account are unsufficient for a withdrawal.
    #[error("not enough funds")]
    NotEnoughFunds,

    /// Amounts moved in or out of an account must be positive or zero.
    #[error("negative amount")]
    NegativeAmount,

    /// The new balance is too large for the decimal type to represent.
    #[error("balance overflow")]
    Overflow,
}

/// An account is a single balance that can be shared between threads.
///
/// It carries two independent locks:
/// - the balance lock, a task-fair read/write lock held only for the
///   duration of a single `balance`, `withdraw` or `deposit` call.
///   Readers never block each other;
/// - the reservation lock, a reentrant mutex that callers hold across a
///   sequence of operations (see `reserve`). The balance operations never
///   take it, so reading a balance is never blocked by a transfer that
///   merely holds a reservation.
pub struct Account {
    id: AccountId,
    pub(super) balance: RwLock<Amount>,
    pub(super) reservation: ReentrantMutex<()>,
}

impl Account {
    /// The opening balance is rounded to cents.
    ///
    /// It isn't checked here: `Ledger::new` refuses accounts that open with a
    /// negative balance.
    pub fn new(id: AccountId, opening_balance: Amount) -> Self {
        Self {
            id,
            balance: RwLock::new(opening_balance.round_dp(DECIMAL_PRECISION)),
            reservation: ReentrantMutex::new(()),
        }
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    /// Read the current balance.
    ///
    /// Never observes a balance in the middle of a withdrawal or deposit.
    pub fn balance(&self) -> Amount {
        let amount = *self.balance.read();
        tracing::trace!(account = self.id, %amount, "read balance");

        amount
    }

    /// Hold the account "reserved" until the returned guard is dropped.
    ///
    /// The same thread can reserve the same account several times without
    /// deadlocking itself. Releasing hands the lock over to the thread that
    /// has been waiting the longest, so a busy account can't starve anyone.
    pub fn reserve(&self) -> Reservation<'_> {
        Reservation::new(self.id, self.reservation.lock())
    }

    /// Whether any thread currently holds a reservation on the account.
    pub fn is_reserved(&self) -> bool {
        self.reservation.is_locked()
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("balance", &self.balance())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Account;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[test]
    fn test_new_rounds_to_cents() {
        let acc = Account::new(7, dec!(1000.005));
        assert_eq!(7, acc.id());
        assert_eq!(dec!(1000.00), acc.balance());

        let acc = Account::new(7, dec!(1000.015));
        assert_eq!(dec!(1000.02), acc.balance());
    }

    #[test]
    // A shared read lock lets as many readers in as needed.
    fn test_concurrent_reads() {
        let acc = Arc::new(Account::new(1, dec!(42.00)));
        let _reader = acc.balance.read();

        let other = Arc::clone(&acc);
        let got = std::thread::spawn(move || other.balance())
            .join()
            .unwrap();
        assert_eq!(dec!(42.00), got);
    }

    #[test]
    // A reservation doesn't prevent anyone from reading the balance.
    fn test_read_while_reserved() {
        let acc = Arc::new(Account::new(1, dec!(42.00)));
        let _reservation = acc.reserve();

        let other = Arc::clone(&acc);
        let got = std::thread::spawn(move || other.balance())
            .join()
            .unwrap();
        assert_eq!(dec!(42.00), got);
    }
}
