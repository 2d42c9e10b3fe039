#[allow(clippy::module_inception)]
pub mod account;
pub mod deposit;
pub mod reservation;
pub mod withdrawal;

pub use account::{Account, AccountError};
pub use reservation::Reservation;
