use crate::ledger::Amount;

use clap::Parser;
use rust_decimal_macros::dec;
use std::path::PathBuf;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("the ledger needs at least one account")]
    NoAccounts,

    #[error("opening balances can't be negative")]
    NegativeBalance,

    #[error("minimum balance {min} is above maximum balance {max}")]
    InvalidRange { min: Amount, max: Amount },
}

/// Runs a set of concurrent transfers over a fixed set of accounts, then
/// prints the final balances as CSV.
#[derive(Parser, Debug, Clone)]
#[command(name = "bank_ledger")]
#[command(about = "Concurrent transfers between bank accounts", long_about = None)]
pub struct Config {
    /// Number of accounts, with ids 1 to N
    #[arg(long, default_value_t = 3)]
    pub accounts: u32,

    /// Lowest random opening balance
    #[arg(long, default_value = "1000")]
    pub min_balance: Amount,

    /// Highest random opening balance
    #[arg(long, default_value = "5000")]
    pub max_balance: Amount,

    /// Seed for opening balances and transfer amounts, for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// CSV transfer plan (id,from,to,amount,after). Defaults to a chain of
    /// three dependent transfers between accounts 1, 2 and 3
    #[arg(long)]
    pub plan: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            accounts: 3,
            min_balance: dec!(1000),
            max_balance: dec!(5000),
            seed: None,
            plan: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accounts == 0 {
            return Err(ConfigError::NoAccounts);
        }
        if self.min_balance < Amount::ZERO {
            return Err(ConfigError::NegativeBalance);
        }
        if self.min_balance > self.max_balance {
            return Err(ConfigError::InvalidRange {
                min: self.min_balance,
                max: self.max_balance,
            });
        }

        Ok(())
    }
}
