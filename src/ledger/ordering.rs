//! Deadlock-free reservation of two accounts.
//!
//! If transfer 1->2 reserved account 1 then 2 while transfer 2->1 reserved
//! account 2 then 1, each could end up waiting on the other forever. Instead,
//! accounts are always reserved by ascending id, whatever the direction of
//! the transfer, so there can't be a circular wait.

use super::account::{Account, Reservation};

/// Both reservations of a transfer.
///
/// Fields are dropped in declaration order, so the reservations are released
/// in the order they were acquired. They are independent locks, so the
/// release order doesn't matter for correctness.
pub struct Reservations<'a> {
    first: Reservation<'a>,
    second: Reservation<'a>,
}

impl Reservations<'_> {
    /// Ids of the reserved accounts, in acquisition order.
    #[cfg(test)]
    fn order(&self) -> [crate::ledger::AccountId; 2] {
        [self.first.account(), self.second.account()]
    }
}

/// Sort two accounts by ascending id.
pub fn in_order<'a>(a: &'a Account, b: &'a Account) -> (&'a Account, &'a Account) {
    if a.id() < b.id() {
        (a, b)
    } else {
        (b, a)
    }
}

/// Reserve both accounts, lowest id first.
///
/// Reserving the same account twice is fine: the reservation is reentrant.
pub fn reserve_in_order<'a>(a: &'a Account, b: &'a Account) -> Reservations<'a> {
    let (first, second) = in_order(a, b);
    let first = first.reserve();
    let second = second.reserve();

    Reservations { first, second }
}
