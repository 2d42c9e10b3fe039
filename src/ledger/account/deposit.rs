use crate::ledger::Amount;

use super::account::{Account, AccountError};

impl Account {
    /// Add `amount` to the account, and return the new balance.
    ///
    /// There is no upper bound besides what the decimal type can represent:
    /// only a new balance above `Decimal::MAX` is refused.
    pub fn deposit(&self, amount: Amount) -> Result<Amount, AccountError> {
        if amount < Amount::ZERO {
            return Err(AccountError::NegativeAmount);
        }

        let mut balance = self.balance.write();
        let new_balance = balance.checked_add(amount).ok_or(AccountError::Overflow)?;
        *balance = new_balance;
        tracing::debug!(account = self.id(), %amount, %new_balance, "deposited");

        Ok(new_balance)
    }
}
