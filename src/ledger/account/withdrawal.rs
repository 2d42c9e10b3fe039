use crate::ledger::Amount;

use super::account::{Account, AccountError};

impl Account {
    /// Take `amount` out of the account, and return the new balance.
    ///
    /// The balance never goes below zero: when the funds are insufficient,
    /// the balance is left untouched and `NotEnoughFunds` is returned.
    /// The write lock is released on every path, since the guard is dropped
    /// when the function returns.
    pub fn withdraw(&self, amount: Amount) -> Result<Amount, AccountError> {
        if amount < Amount::ZERO {
            return Err(AccountError::NegativeAmount);
        }

        let mut balance = self.balance.write();
        if amount > *balance {
            return Err(AccountError::NotEnoughFunds);
        }

        *balance -= amount;
        let new_balance = *balance;
        tracing::debug!(account = self.id(), %amount, %new_balance, "withdrawn");

        Ok(new_balance)
    }
}

#[cfg(test)]
mod withdrawal_tests {
    use crate::ledger::account::{Account, AccountError};

    use rust_decimal_macros::dec;

    #[test]
    fn test_withdrawal_ok() {
        let acc = Account::new(1, dec!(3.00));

        let got = acc.withdraw(dec!(3.00));
        assert_eq!(Ok(dec!(0)), got);
        assert_eq!(dec!(0), acc.balance());
    }

    #[test]
    fn test_withdrawal_not_enough_funds() {
        let acc = Account::new(1, dec!(2.50));

        let got = acc.withdraw(dec!(3.00));
        assert_eq!(Err(AccountError::NotEnoughFunds), got);
        assert_eq!(dec!(2.50), acc.balance());
    }

    #[test]
    fn test_withdrawal_negative_amount() {
        let acc = Account::new(1, dec!(2.50));

        let got = acc.withdraw(dec!(-1.00));
        assert_eq!(Err(AccountError::NegativeAmount), got);
        assert_eq!(dec!(2.50), acc.balance());
    }

    #[test]
    fn test_withdrawal_zero() {
        let acc = Account::new(1, dec!(0));

        assert_eq!(Ok(dec!(0)), acc.withdraw(dec!(0)));
    }

    #[test]
    // Many threads racing for the same money: exactly as many withdrawals as
    // the balance allows go through, and the balance ends at zero.
    fn test_concurrent_withdrawals_never_go_negative() {
        use std::sync::Arc;

        let acc = Arc::new(Account::new(1, dec!(100.00)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let acc = Arc::clone(&acc);
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| acc.withdraw(dec!(1.00)).is_ok())
                        .count()
                })
            })
            .collect();

        let succeeded: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(100, succeeded);
        assert_eq!(dec!(0), acc.balance());
    }
}
