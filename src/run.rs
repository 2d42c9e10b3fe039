//! Wires everything together: accounts with random opening balances, one
//! worker thread per planned transfer, a reader thread, and the final
//! balances written as CSV.

use crate::config::{Config, ConfigError};
use crate::error_handler;
use crate::generate::AmountGenerator;
use crate::input::{self, PlanEntry, PlanId};
use crate::ledger::{Account, AccountId, Amount, Ledger, LedgerError, TransferError};
use crate::output::{self, format_currency};

use rust_decimal_macros::dec;
use std::sync::mpsc::{self, Sender};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Input(#[from] input::Error),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("failed to write balances: {0}")]
    Output(#[from] std::io::Error),
}

#[derive(Debug, PartialEq)]
pub struct Summary {
    pub committed: usize,
    pub failed: usize,
    pub balances: Vec<(AccountId, Amount)>,
}

/// The plan used when none is given: 1->2, then 2->3 once the first one
/// committed, then 3->1 once both did.
pub fn default_plan(generator: &mut AmountGenerator) -> Vec<PlanEntry> {
    vec![
        PlanEntry {
            id: 1,
            from: 1,
            to: 2,
            amount: generator.amount(dec!(50), dec!(200)),
            after: vec![],
        },
        PlanEntry {
            id: 2,
            from: 2,
            to: 3,
            amount: generator.amount(dec!(100), dec!(300)),
            after: vec![1],
        },
        PlanEntry {
            id: 3,
            from: 3,
            to: 1,
            amount: generator.amount(dec!(25), dec!(150)),
            after: vec![1, 2],
        },
    ]
}

/// Run `plan` (or the default plan) concurrently, and write the final
/// balances to `output_stream`.
pub fn run(
    config: &Config,
    plan: Option<Vec<PlanEntry>>,
    output_stream: impl std::io::Write,
) -> Result<Summary, Error> {
    config.validate()?;

    let mut generator = match config.seed {
        Some(seed) => AmountGenerator::seeded(seed),
        None => AmountGenerator::from_entropy(),
    };
    let accounts = (1..=config.accounts)
        .map(|id| Account::new(id, generator.amount(config.min_balance, config.max_balance)))
        .collect();
    let ledger = Ledger::new(accounts)?;
    log_balances(&ledger, "initial balance");

    let plan = match plan {
        Some(plan) => plan,
        None => default_plan(&mut generator),
    };
    let transfers = input::transfers(plan)?;
    tracing::info!(transfers = transfers.len(), "starting transactions");

    let (failures_tx, failures_rx) = mpsc::channel();
    let reporter = error_handler::report(failures_rx);

    let committed = std::thread::scope(|scope| {
        let workers: Vec<_> = transfers
            .iter()
            .map(|(plan_id, transfer)| {
                let failures = failures_tx.clone();
                let ledger = &ledger;
                scope.spawn(move || match ledger.transfer(transfer) {
                    Ok(()) => true,
                    Err(err) => {
                        send_failure(&failures, *plan_id, err);
                        false
                    }
                })
            })
            .collect();

        // Reads the first and the last account while the transfers run.
        let ledger = &ledger;
        let last = config.accounts;
        scope.spawn(move || {
            for id in [1, last] {
                if let Some(balance) = ledger.balance(id) {
                    tracing::info!(account = id, balance = %format_currency(balance), "reading balance");
                }
            }
        });

        workers
            .into_iter()
            .map(|worker| worker.join())
            .filter(|joined| matches!(joined, Ok(true)))
            .count()
    });

    // Once every sender is gone, the reporter is done.
    drop(failures_tx);
    let failed = reporter.join().unwrap_or_default();

    tracing::info!(committed, failed, "all transactions completed");
    log_balances(&ledger, "final balance");

    let balances = ledger.balances();
    output::write(output_stream, &balances)?;

    Ok(Summary {
        committed,
        failed,
        balances,
    })
}

fn send_failure(failures: &Sender<(PlanId, TransferError)>, plan_id: PlanId, err: TransferError) {
    // The reporter only stops once every sender is dropped, so this can't fail.
    let _ = failures.send((plan_id, err));
}

fn log_balances(ledger: &Ledger, message: &'static str) {
    for (account, balance) in ledger.balances() {
        tracing::info!(account, balance = %format_currency(balance), "{}", message);
    }
}
