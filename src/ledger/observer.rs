use super::account::AccountError;
use super::transfer::{Fault, TransferError};
use super::{AccountId, Amount, TransferId};
use crate::output::format_currency;

/// Everything worth reporting about transfers.
///
/// `Started` and `Committed` mark the beginning and the end of a transfer's
/// critical section: both accounts are reserved in between.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Attempted {
        transfer: TransferId,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    Started {
        transfer: TransferId,
    },
    Withdrawn {
        transfer: TransferId,
        account: AccountId,
        amount: Amount,
    },
    Committed {
        transfer: TransferId,
    },
    InsufficientFunds {
        transfer: TransferId,
        account: AccountId,
        amount: Amount,
    },
    /// `transfer` is `None` for reversals requested from outside a transfer.
    /// `fault` is what interrupted the transfer, when it was rolled back.
    Reversed {
        transfer: Option<TransferId>,
        from: AccountId,
        to: AccountId,
        amount: Amount,
        fault: Option<Fault>,
    },
    Unreconciled {
        transfer: Option<TransferId>,
        account: AccountId,
        cause: AccountError,
    },
    /// The transfer didn't run: see `reason`.
    Aborted {
        transfer: TransferId,
        reason: TransferError,
    },
}

/// Receives events from the ledger, from whichever thread produced them.
///
/// A panic raised from `notify` while a transfer is in its critical section
/// is treated as a fault: the transfer gets rolled back.
pub trait Observer: Send + Sync {
    fn notify(&self, event: &Event);
}

/// Turns events into structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn notify(&self, event: &Event) {
        match event {
            Event::Attempted {
                transfer,
                from,
                to,
                amount,
            } => tracing::info!(
                transfer,
                from,
                to,
                amount = %format_currency(*amount),
                "attempting transfer"
            ),
            Event::Started { transfer } => tracing::debug!(transfer, "accounts reserved"),
            Event::Withdrawn {
                transfer,
                account,
                amount,
            } => tracing::debug!(
                transfer,
                account,
                amount = %format_currency(*amount),
                "withdrawn"
            ),
            Event::Committed { transfer } => {
                tracing::info!(transfer, "transfer completed successfully")
            }
            Event::InsufficientFunds {
                transfer,
                account,
                amount,
            } => tracing::warn!(
                transfer,
                account,
                amount = %format_currency(*amount),
                "transfer failed: insufficient funds"
            ),
            Event::Reversed {
                transfer,
                from,
                to,
                amount,
                fault: Some(fault),
            } => tracing::warn!(
                transfer = ?transfer,
                from,
                to,
                amount = %format_currency(*amount),
                %fault,
                "error during transfer, transaction reversed"
            ),
            Event::Reversed {
                transfer,
                from,
                to,
                amount,
                fault: None,
            } => tracing::info!(
                transfer = ?transfer,
                from,
                to,
                amount = %format_currency(*amount),
                "transaction reversed"
            ),
            Event::Unreconciled {
                transfer,
                account,
                cause,
            } => tracing::error!(
                transfer = ?transfer,
                account,
                %cause,
                "ledger left inconsistent"
            ),
            Event::Aborted { transfer, reason } => {
                tracing::warn!(transfer, %reason, "transfer aborted")
            }
        }
    }
}
