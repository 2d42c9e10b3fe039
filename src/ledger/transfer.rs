use super::account::AccountError;
use super::sequencing::TransferHandle;
use super::{AccountId, Amount, TransferId, DECIMAL_PRECISION};

/// Something unexpected that interrupted a transfer after money had already
/// moved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    #[error("account refused the operation: {0}")]
    Account(#[from] AccountError),

    #[error("panicked: {0}")]
    Panic(String),
}

/// Why a transfer wasn't applied.
///
/// Only `Unreconciled` means the ledger is left in an inconsistent state,
/// every other variant means no balance was changed (or the changes were
/// rolled back).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// Amounts must be positive or zero.
    #[error("invalid amount")]
    InvalidAmount,

    /// No account with that id exists in the ledger.
    #[error("unknown account {0}")]
    UnknownAccount(AccountId),

    /// The source account doesn't hold enough money. This is an expected
    /// outcome rather than a failure of the system.
    #[error("insufficient funds in account {0}")]
    InsufficientFunds(AccountId),

    /// An account refused the operation before anything was applied.
    #[error("account {account} rejected the transfer: {cause}")]
    Rejected {
        account: AccountId,
        cause: AccountError,
    },

    /// The wait on a prerequisite was cancelled.
    #[error("cancelled while waiting on a prerequisite")]
    Cancelled,

    /// A prerequisite transfer didn't commit, so this one can't run.
    #[error("prerequisite transfer {0} did not commit")]
    PrerequisiteFailed(TransferId),

    /// The same transfer was submitted twice.
    #[error("transfer was already executed")]
    AlreadyExecuted,

    /// A fault happened mid-transfer, and both balances were restored.
    #[error("transfer rolled back: {0}")]
    RolledBack(Fault),

    /// Restoring the balances failed: the ledger needs a human.
    #[error("account {account} could not be reconciled: {cause}")]
    Unreconciled {
        account: AccountId,
        cause: AccountError,
    },
}

impl TransferError {
    /// Whether the error left the ledger in an inconsistent state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unreconciled { .. })
    }
}

/// A request to move `amount` from one account to another.
///
/// A transfer can declare prerequisites: other transfers that must commit
/// before this one starts touching accounts. Dropping a transfer that never
/// ran fails its gate, and with it every transfer depending on it.
///
/// ```
/// use bank_ledger::ledger::Transfer;
/// use rust_decimal_macros::dec;
///
/// let first = Transfer::new(1, 2, dec!(100));
/// let second = Transfer::new(2, 3, dec!(50)).after(&first.handle());
/// assert_eq!(vec![first.id()], second.prerequisites().iter().map(|h| h.id()).collect::<Vec<_>>());
/// ```
#[derive(Debug)]
pub struct Transfer {
    from: AccountId,
    to: AccountId,
    amount: Amount,
    handle: TransferHandle,
    prerequisites: Vec<TransferHandle>,
}

impl Transfer {
    // The new() function ensures we can only move amounts with a precision of cents.
    pub fn new(from: AccountId, to: AccountId, amount: Amount) -> Self {
        Self {
            from,
            to,
            amount: amount.round_dp(DECIMAL_PRECISION),
            handle: TransferHandle::new(),
            prerequisites: Vec::new(),
        }
    }

    /// Only start once `prerequisite` has committed.
    pub fn after(mut self, prerequisite: &TransferHandle) -> Self {
        self.prerequisites.push(prerequisite.clone());
        self
    }

    /// The handle other transfers can depend on.
    pub fn handle(&self) -> TransferHandle {
        self.handle.clone()
    }

    pub fn id(&self) -> TransferId {
        self.handle.id()
    }

    pub fn from(&self) -> AccountId {
        self.from
    }

    pub fn to(&self) -> AccountId {
        self.to
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn prerequisites(&self) -> &[TransferHandle] {
        &self.prerequisites
    }

    pub(super) fn own_handle(&self) -> &TransferHandle {
        &self.handle
    }
}

impl Drop for Transfer {
    fn drop(&mut self) {
        self.handle.abandon();
    }
}

#[test]
// Precision is 2 decimal places. We should be unable to have more precise amounts.
fn test_transfer_decimal_precision() {
    use rust_decimal_macros::dec;

    for (raw_amount, want_amount) in vec![
        (dec!(1.0), dec!(1.0)),
        (dec!(0.999), dec!(1.00)),
        (dec!(1.0000001), dec!(1.00)),
        (dec!(12.34), dec!(12.34)),
        (dec!(12.346), dec!(12.35)),
    ] {
        let transfer = Transfer::new(1, 2, raw_amount);
        assert_eq!(want_amount, transfer.amount());
    }
}

#[test]
fn test_drop_unexecuted_transfer_fails_gate() {
    use super::sequencing::GateState;
    use rust_decimal_macros::dec;

    let transfer = Transfer::new(1, 2, dec!(1));
    let handle = transfer.handle();
    assert_eq!(GateState::Pending, handle.state());

    drop(transfer);
    assert_eq!(GateState::Failed, handle.state());
}

#[test]
fn test_is_fatal() {
    assert!(TransferError::Unreconciled {
        account: 1,
        cause: AccountError::NotEnoughFunds
    }
    .is_fatal());

    for err in vec![
        TransferError::InsufficientFunds(1),
        TransferError::UnknownAccount(1),
        TransferError::Cancelled,
        TransferError::PrerequisiteFailed(1),
        TransferError::RolledBack(Fault::Panic("boom".to_string())),
    ] {
        assert!(!err.is_fatal(), "{:?}", err);
    }
}
