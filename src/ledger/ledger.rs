use super::account::{Account, AccountError};
use super::observer::{Event, Observer, TracingObserver};
use super::ordering;
use super::sequencing::{Cancellation, Completion, GateState};
use super::transfer::{Fault, Transfer, TransferError};
use super::{AccountId, Amount, TransferId};

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Two accounts were given the same id.
    #[error("duplicate account {0}")]
    DuplicateAccount(AccountId),

    /// An account opened with a negative balance.
    #[error("account {0} has a negative opening balance")]
    NegativeBalance(AccountId),
}

/// A fixed set of accounts, and the protocol to move money between them.
///
/// The set of accounts never changes after construction, so looking an
/// account up needs no lock at all. Every bit of synchronisation happens
/// per account (balance and reservation locks), plus the gates transfers
/// can wait on. There is no ledger-wide lock.
///
/// A transfer goes through these steps:
/// 1. wait for its prerequisites to commit;
/// 2. look both accounts up;
/// 3. reserve both accounts, lowest id first;
/// 4. check the source holds enough money;
/// 5. withdraw from the source;
/// 6. deposit into the destination;
/// 7. open its own gate, so dependents can start;
/// 8. release both reservations.
///
/// If anything goes wrong after step 5, whatever was applied is undone
/// before the reservations are released.
///
/// Other transfers touching either account can only observe a transfer as
/// not applied or fully applied. A plain `balance()` read doesn't take the
/// reservation though, so it can see the withdrawal before the deposit.
pub struct Ledger {
    accounts: HashMap<AccountId, Account>,
    observer: Arc<dyn Observer>,
}

impl Ledger {
    pub fn new(accounts: Vec<Account>) -> Result<Self, LedgerError> {
        let mut by_id = HashMap::with_capacity(accounts.len());
        for account in accounts {
            let id = account.id();
            if account.balance() < Amount::ZERO {
                return Err(LedgerError::NegativeBalance(id));
            }
            if by_id.insert(id, account).is_some() {
                return Err(LedgerError::DuplicateAccount(id));
            }
        }

        Ok(Self {
            accounts: by_id,
            observer: Arc::new(TracingObserver),
        })
    }

    /// Send events to `observer` instead of `tracing`.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.get(&id)
    }

    pub fn balance(&self, id: AccountId) -> Option<Amount> {
        self.account(id).map(Account::balance)
    }

    /// All balances, sorted by account id.
    ///
    /// Each balance is read on its own: this is not a snapshot of the whole
    /// ledger if transfers are running.
    pub fn balances(&self) -> Vec<(AccountId, Amount)> {
        let mut balances: Vec<_> = self
            .accounts
            .values()
            .map(|account| (account.id(), account.balance()))
            .collect();
        balances.sort_unstable_by_key(|(id, _)| *id);

        balances
    }

    /// Sum of all balances. Same caveat as `balances`.
    pub fn total(&self) -> Amount {
        self.accounts.values().map(Account::balance).sum()
    }

    pub fn transfer(&self, transfer: &Transfer) -> Result<(), TransferError> {
        self.transfer_with(transfer, &Cancellation::default())
    }

    /// Apply a transfer, giving up if `cancellation` fires while it is still
    /// waiting on a prerequisite.
    ///
    /// Whatever the outcome, the transfer's gate is resolved before this
    /// returns: dependents never wait on a transfer that already returned.
    pub fn transfer_with(
        &self,
        transfer: &Transfer,
        cancellation: &Cancellation,
    ) -> Result<(), TransferError> {
        let handle = transfer.own_handle();
        if !handle.claim() {
            // Whoever claimed it first is in charge of its gate.
            let reason = TransferError::AlreadyExecuted;
            self.notify(Event::Aborted {
                transfer: transfer.id(),
                reason: reason.clone(),
            });
            return Err(reason);
        }

        let completion = Completion::new(handle);
        self.notify(Event::Attempted {
            transfer: transfer.id(),
            from: transfer.from(),
            to: transfer.to(),
            amount: transfer.amount(),
        });

        let result = self.execute(transfer, cancellation, completion);
        if let Err(reason) = &result {
            // The other failures are reported as they happen.
            if !matches!(
                reason,
                TransferError::InsufficientFunds(_)
                    | TransferError::RolledBack(_)
                    | TransferError::Unreconciled { .. }
            ) {
                self.notify(Event::Aborted {
                    transfer: transfer.id(),
                    reason: reason.clone(),
                });
            }
        }

        result
    }

    /// Undo a transfer: move `amount` back from `to` into `from`.
    ///
    /// The destination is checked again before anything moves, since it may
    /// have spent the money in the meantime. If it did, nothing changes and
    /// `Unreconciled` is returned: the ledger can't be put back the way it
    /// was without driving an account negative.
    pub fn reverse_transaction(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<(), TransferError> {
        if amount < Amount::ZERO {
            return Err(TransferError::InvalidAmount);
        }

        let from = self.lookup(from)?;
        let to = self.lookup(to)?;

        self.reverse(None, from, to, amount, None)
    }

    fn execute(
        &self,
        transfer: &Transfer,
        cancellation: &Cancellation,
        completion: Completion<'_>,
    ) -> Result<(), TransferError> {
        let id = transfer.id();
        let amount = transfer.amount();
        if amount < Amount::ZERO {
            return Err(TransferError::InvalidAmount);
        }

        for prerequisite in transfer.prerequisites() {
            if prerequisite.wait(cancellation)? != GateState::Committed {
                return Err(TransferError::PrerequisiteFailed(prerequisite.id()));
            }
        }

        let from = self.lookup(transfer.from())?;
        let to = self.lookup(transfer.to())?;

        let reservations = ordering::reserve_in_order(from, to);
        self.notify(Event::Started { transfer: id });

        // `withdraw` checks the funds again, but anyone holding a reference to
        // the account can withdraw without reserving it first.
        if from.balance() < amount {
            return Err(self.insufficient_funds(id, from.id(), amount));
        }

        match from.withdraw(amount) {
            Ok(_) => {}
            Err(AccountError::NotEnoughFunds) => {
                return Err(self.insufficient_funds(id, from.id(), amount))
            }
            Err(cause) => {
                return Err(TransferError::Rejected {
                    account: from.id(),
                    cause,
                })
            }
        }

        // From here on, money has moved: any fault must be rolled back.
        let mut deposited = false;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.notify(Event::Withdrawn {
                transfer: id,
                account: from.id(),
                amount,
            });
            to.deposit(amount)?;
            deposited = true;
            self.notify(Event::Committed { transfer: id });

            Ok::<(), Fault>(())
        }));

        let fault = match outcome {
            Ok(Ok(())) => {
                completion.commit();
                drop(reservations);
                return Ok(());
            }
            Ok(Err(fault)) => fault,
            Err(payload) => Fault::Panic(panic_message(payload.as_ref())),
        };

        let rolled_back = if deposited {
            self.reverse(Some(id), from, to, amount, Some(&fault))
        } else {
            self.refund(id, from, to, amount, &fault)
        };
        drop(reservations);

        Err(match rolled_back {
            Ok(()) => TransferError::RolledBack(fault),
            Err(err) => err,
        })
    }

    // Only the withdrawal went through: give the money back to the source.
    fn refund(
        &self,
        transfer: TransferId,
        from: &Account,
        to: &Account,
        amount: Amount,
        fault: &Fault,
    ) -> Result<(), TransferError> {
        let _reservations = ordering::reserve_in_order(from, to);

        if let Err(cause) = from.deposit(amount) {
            return Err(self.unreconciled(Some(transfer), from.id(), cause));
        }

        self.notify(Event::Reversed {
            transfer: Some(transfer),
            from: from.id(),
            to: to.id(),
            amount,
            fault: Some(fault.clone()),
        });
        Ok(())
    }

    // Reservations are reentrant, so this is safe to call from a transfer
    // that already holds them.
    fn reverse(
        &self,
        transfer: Option<TransferId>,
        from: &Account,
        to: &Account,
        amount: Amount,
        fault: Option<&Fault>,
    ) -> Result<(), TransferError> {
        let _reservations = ordering::reserve_in_order(from, to);

        // Withdrawing first is what validates the destination still has the
        // money. Nobody else can touch either account through the ledger
        // until both legs are done.
        if let Err(cause) = to.withdraw(amount) {
            return Err(self.unreconciled(transfer, to.id(), cause));
        }

        if let Err(cause) = from.deposit(amount) {
            if let Err(err) = to.deposit(amount) {
                self.notify(Event::Unreconciled {
                    transfer,
                    account: to.id(),
                    cause: err,
                });
            }
            return Err(self.unreconciled(transfer, from.id(), cause));
        }

        self.notify(Event::Reversed {
            transfer,
            from: from.id(),
            to: to.id(),
            amount,
            fault: fault.cloned(),
        });
        Ok(())
    }

    fn lookup(&self, id: AccountId) -> Result<&Account, TransferError> {
        self.accounts
            .get(&id)
            .ok_or(TransferError::UnknownAccount(id))
    }

    fn insufficient_funds(
        &self,
        transfer: TransferId,
        account: AccountId,
        amount: Amount,
    ) -> TransferError {
        self.notify(Event::InsufficientFunds {
            transfer,
            account,
            amount,
        });

        TransferError::InsufficientFunds(account)
    }

    fn unreconciled(
        &self,
        transfer: Option<TransferId>,
        account: AccountId,
        cause: AccountError,
    ) -> TransferError {
        self.notify(Event::Unreconciled {
            transfer,
            account,
            cause,
        });

        TransferError::Unreconciled { account, cause }
    }

    fn notify(&self, event: Event) {
        self.observer.notify(&event);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}



#[cfg(test)]
mod reverse_tests {
    use super::test_support::{three_accounts, Recorder};
    use crate::ledger::account::AccountError;
    use crate::ledger::observer::Event;
    use crate::ledger::transfer::{Transfer, TransferError};

    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[test]
    fn test_reverse_ok() {
        let ledger = three_accounts();
        ledger.transfer(&Transfer::new(1, 2, dec!(100.00))).unwrap();

        assert_eq!(Ok(()), ledger.reverse_transaction(1, 2, dec!(100.00)));
        assert_eq!(Some(dec!(1000.00)), ledger.balance(1));
        assert_eq!(Some(dec!(2000.00)), ledger.balance(2));
    }

    #[test]
    // Reversals requested from outside a transfer carry no fault.
    fn test_reverse_event() {
        let recorder = Arc::new(Recorder::default());
        let ledger = three_accounts().with_observer(recorder.clone());

        assert_eq!(Ok(()), ledger.reverse_transaction(3, 1, dec!(25.00)));
        assert_eq!(
            Some(&Event::Reversed {
                transfer: None,
                from: 3,
                to: 1,
                amount: dec!(25.00),
                fault: None,
            }),
            recorder.events.lock().last()
        );
    }

    #[test]
    // The destination already spent the money: the reversal refuses to
    // drive it negative, and reports the ledger can't be reconciled.
    fn test_reverse_destination_spent() {
        let recorder = Arc::new(Recorder::default());
        let ledger = three_accounts().with_observer(recorder.clone());
        ledger.transfer(&Transfer::new(1, 2, dec!(500.00))).unwrap();
        ledger.transfer(&Transfer::new(2, 3, dec!(2400.00))).unwrap();

        let got = ledger.reverse_transaction(1, 2, dec!(500.00));
        assert_eq!(
            Err(TransferError::Unreconciled {
                account: 2,
                cause: AccountError::NotEnoughFunds
            }),
            got
        );
        assert!(got.unwrap_err().is_fatal());
        assert_eq!(Some(dec!(500.00)), ledger.balance(1));
        assert_eq!(Some(dec!(100.00)), ledger.balance(2));
        assert_eq!(
            Some(&Event::Unreconciled {
                transfer: None,
                account: 2,
                cause: AccountError::NotEnoughFunds
            }),
            recorder.events.lock().last()
        );
    }

    #[test]
    fn test_reverse_unknown_account() {
        let ledger = three_accounts();

        assert_eq!(
            Err(TransferError::UnknownAccount(7)),
            ledger.reverse_transaction(1, 7, dec!(1.00))
        );
        assert_eq!(
            Err(TransferError::InvalidAmount),
            ledger.reverse_transaction(1, 2, dec!(-1.00))
        );
        assert_eq!(dec!(6000.00), ledger.total());
    }
}


#[cfg(test)]
mod concurrency_tests {
    use super::Ledger;
    use crate::ledger::account::Account;
    use crate::ledger::ordering;
    use crate::ledger::transfer::{Transfer, TransferError};
    use crate::ledger::Amount;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc};
    use std::time::Duration;

    fn ledger(accounts: u32, balance: Amount) -> Arc<Ledger> {
        Arc::new(
            Ledger::new((1..=accounts).map(|id| Account::new(id, balance)).collect()).unwrap(),
        )
    }

    #[test]
    // Lots of transfers in every direction, including 1->2 racing 2->1: they
    // all complete in bounded time, and money is neither created nor lost.
    fn test_no_deadlock_and_conservation() {
        let ledger = ledger(4, dec!(500.00));
        let (tx, rx) = mpsc::channel();

        for seed in 0..8 {
            let ledger = Arc::clone(&ledger);
            let tx = tx.clone();
            std::thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                for _ in 0..500 {
                    let from = rng.gen_range(1..=4);
                    let to = rng.gen_range(1..=4);
                    let amount = Amount::new(rng.gen_range(1..=20_000), 2);
                    match ledger.transfer(&Transfer::new(from, to, amount)) {
                        Ok(()) | Err(TransferError::InsufficientFunds(_)) => {}
                        Err(err) => panic!("unexpected error: {:?}", err),
                    }
                }
                tx.send(()).unwrap();
            });
        }
        drop(tx);

        for _ in 0..8 {
            rx.recv_timeout(Duration::from_secs(60))
                .expect("transfers did not complete: deadlock?");
        }

        assert_eq!(dec!(2000.00), ledger.total());
        for (_, balance) in ledger.balances() {
            assert!(balance >= dec!(0), "negative balance {}", balance);
        }
    }

    #[test]
    // A reader holding both reservations never sees a half-applied transfer.
    fn test_atomic_visibility_under_reservations() {
        let ledger = ledger(2, dec!(1000.00));
        let done = Arc::new(AtomicBool::new(false));

        let writers: Vec<_> = [(1, 2), (2, 1)]
            .into_iter()
            .map(|(from, to)| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for _ in 0..2_000 {
                        let _ = ledger.transfer(&Transfer::new(from, to, dec!(3.33)));
                    }
                })
            })
            .collect();

        let reader = {
            let ledger = Arc::clone(&ledger);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                let one = ledger.account(1).unwrap();
                let two = ledger.account(2).unwrap();
                while !done.load(Ordering::Acquire) {
                    let _reservations = ordering::reserve_in_order(one, two);
                    assert_eq!(dec!(2000.00), one.balance() + two.balance());
                }
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::Release);
        reader.join().unwrap();
    }
}

#[cfg(test)]
mod property_tests {
    use super::Ledger;
    use crate::ledger::account::Account;
    use crate::ledger::transfer::{Transfer, TransferError};
    use crate::ledger::Amount;

    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: whatever the transfers, no balance goes negative, and
        /// each successful transfer moves exactly its amount.
        #[test]
        fn transfers_conserve_money(
            openings in prop::collection::vec(0i64..100_000, 2..6),
            transfers in prop::collection::vec((0usize..6, 0usize..6, 0i64..50_000), 1..40)
        ) {
            let count = openings.len();
            let ledger = Ledger::new(
                openings
                    .iter()
                    .enumerate()
                    .map(|(i, cents)| Account::new(i as u32 + 1, Amount::new(*cents, 2)))
                    .collect(),
            )
            .unwrap();
            let total = ledger.total();

            for (from, to, cents) in transfers {
                let (from, to) = ((from % count) as u32 + 1, (to % count) as u32 + 1);
                let amount = Amount::new(cents, 2);
                let before = ledger.balance(from).unwrap() + ledger.balance(to).unwrap();

                match ledger.transfer(&Transfer::new(from, to, amount)) {
                    Ok(()) => {}
                    Err(TransferError::InsufficientFunds(account)) => {
                        prop_assert_eq!(from, account);
                        prop_assert!(ledger.balance(from).unwrap() < amount);
                    }
                    Err(err) => return Err(TestCaseError::fail(format!("{:?}", err))),
                }

                let after = ledger.balance(from).unwrap() + ledger.balance(to).unwrap();
                prop_assert_eq!(before, after);
                for (_, balance) in ledger.balances() {
                    prop_assert!(balance >= Amount::ZERO);
                }
            }

            prop_assert_eq!(total, ledger.total());
        }
    }
}
