pub mod account;
#[allow(clippy::module_inception)]
pub mod ledger;
pub mod observer;
pub mod ordering;
pub mod sequencing;
pub mod transfer;

pub use account::{Account, AccountError, Reservation};
pub use ledger::{Ledger, LedgerError};
pub use observer::{Event, Observer, TracingObserver};
pub use sequencing::{Cancellation, GateState, TransferHandle};
pub use transfer::{Fault, Transfer, TransferError};

// Using named types doesn't provide any compiler help, but it helps a lot with
// readability.
// Consider the following, when creating the accounts HashMap:
// (1) accounts: HashMap<u32, Account>
// (2) accounts: HashMap<AccountId, Account>
// Implementation (1) would most likely need comments, and could be confusing.
// Implementation (2) is self-explanatory.
pub type AccountId = u32;
pub type TransferId = u64;

// I decided to use a decimal library instead of the built-in f64 type, to be
// safer when dealing with money: summing thousands of deposits and
// withdrawals never drifts.
pub type Amount = rust_decimal::Decimal;

// Money is handled in cents.
pub const DECIMAL_PRECISION: u32 = 2;
