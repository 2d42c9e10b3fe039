use crate::ledger::{AccountId, Amount, DECIMAL_PRECISION};

use serde::Serialize;

/// Render an amount for humans, e.g. `$1234.50`.
pub fn format_currency(amount: Amount) -> String {
    format!("${}", to_cents(amount))
}

// Always show exactly two decimal places, `1000` becomes `1000.00`.
fn to_cents(amount: Amount) -> Amount {
    let mut amount = amount.round_dp(DECIMAL_PRECISION);
    amount.rescale(DECIMAL_PRECISION);
    amount
}

#[derive(Serialize)]
struct AccountRecord {
    #[serde(rename = "account")]
    account_id: AccountId,

    balance: Amount,
}

impl AccountRecord {
    fn new(account_id: AccountId, balance: Amount) -> Self {
        Self {
            account_id,
            balance: to_cents(balance),
        }
    }
}

// Writes the balances to the given stream.
pub fn write(
    output_stream: impl std::io::Write,
    balances: &[(AccountId, Amount)],
) -> Result<(), std::io::Error> {
    let mut writer = csv::Writer::from_writer(output_stream);

    for (account_id, balance) in balances {
        writer.serialize(AccountRecord::new(*account_id, *balance))?;
    }
    writer.flush()?;

    Ok(())
}
