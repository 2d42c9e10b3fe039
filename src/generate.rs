//! Random amounts, for opening balances and transfer amounts.
//!
//! Seed the generator to get the same amounts on every run.

use crate::ledger::{Amount, DECIMAL_PRECISION};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;

pub struct AmountGenerator {
    rng: StdRng,
}

impl AmountGenerator {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// An amount in `[min, max]`, both inclusive, with a precision of cents.
    ///
    /// Works in whole cents, so the result can't fall outside the range
    /// because of rounding. The bounds are swapped if `min > max`.
    pub fn amount(&mut self, min: Amount, max: Amount) -> Amount {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let low = to_cents((min * dec!(100)).ceil());
        let high = to_cents((max * dec!(100)).floor());

        // There may be no whole cent in between, e.g. [0.001, 0.009].
        if low > high {
            return min.round_dp(DECIMAL_PRECISION);
        }

        Amount::new(self.rng.gen_range(low..=high), DECIMAL_PRECISION)
    }
}

// Amounts that don't fit in i64 cents are way beyond anything a bank holds.
fn to_cents(amount: Amount) -> i64 {
    amount.to_i64().unwrap_or(if amount.is_sign_negative() {
        i64::MIN
    } else {
        i64::MAX
    })
}
