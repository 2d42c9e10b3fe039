//! Reads a transfer plan: which transfers to run, and which ones must wait
//! for others.
//!
//! ```text
//! id,from,to,amount,after
//! 1,1,2,100.00,
//! 2,2,3,50.00,1
//! 3,3,1,25.00,1;2
//! ```

use crate::ledger::{AccountId, Amount, Transfer, TransferHandle};

use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

/// Identifies a transfer inside a plan.
pub type PlanId = u32;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("malformed CSV: {0}")]
    Csv(String), // CSV is malformed

    #[error("invalid plan: {0}")]
    Format(String), // Data format is incorrect
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntry {
    pub id: PlanId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
    pub after: Vec<PlanId>,
}

// When parsing, I'm making the assumption that we want to completely abort
// on errors: running half a plan, with some dependencies missing, makes no
// sense. Fix the CSV, then try again.
pub fn parse(input_stream: impl std::io::Read) -> Result<Vec<PlanEntry>, Error> {
    let buffered = std::io::BufReader::new(input_stream);
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(buffered);

    reader
        .deserialize::<PlanRecord>()
        .map(|record| -> Result<PlanEntry, Error> { record?.try_into() })
        .collect()
}

/// Turn plan entries into transfers, wiring up their dependencies.
///
/// A transfer can only depend on transfers listed before it. This rules out
/// cycles, which would leave transfers waiting on each other forever.
pub fn transfers(entries: Vec<PlanEntry>) -> Result<Vec<(PlanId, Transfer)>, Error> {
    let mut handles: HashMap<PlanId, TransferHandle> = HashMap::with_capacity(entries.len());
    let mut transfers = Vec::with_capacity(entries.len());

    for entry in entries {
        if handles.contains_key(&entry.id) {
            return Err(Error::Format(format!("duplicate transfer id {}", entry.id)));
        }

        let mut transfer = Transfer::new(entry.from, entry.to, entry.amount);
        for prerequisite in &entry.after {
            let handle = handles.get(prerequisite).ok_or_else(|| {
                Error::Format(format!(
                    "transfer {} depends on {}, which is not listed before it",
                    entry.id, prerequisite
                ))
            })?;
            transfer = transfer.after(handle);
        }

        handles.insert(entry.id, transfer.handle());
        transfers.push((entry.id, transfer));
    }

    Ok(transfers)
}

// I have a PlanRecord type because the `after` column is a list, which
// doesn't map directly to a CSV field.
#[derive(Debug, Deserialize)]
struct PlanRecord {
    id: PlanId,
    from: AccountId,
    to: AccountId,
    amount: Decimal,

    #[serde(default)]
    after: Option<String>,
}

impl TryFrom<PlanRecord> for PlanEntry {
    type Error = Error;

    fn try_from(record: PlanRecord) -> Result<Self, Self::Error> {
        if record.amount < Decimal::ZERO {
            return Err(Error::Format(format!(
                "transfer {} has a negative amount",
                record.id
            )));
        }

        let after = record
            .after
            .as_deref()
            .unwrap_or_default()
            .split(';')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| {
                id.parse::<PlanId>()
                    .map_err(|_| Error::Format(format!("invalid dependency `{}`", id)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: record.id,
            from: record.from,
            to: record.to,
            amount: record.amount,
            after,
        })
    }
}

#[test]
// Parsing well-formed data should return a vector of PlanEntry.
fn test_parse_ok() {
    use rust_decimal_macros::dec;

    let data = r#"id, from, to, amount, after
1, 1, 2, 100.00,
2, 2, 3, 50.00, 1
3, 3, 1, 25.00, 1;2"#;
    let entries = parse(std::io::Cursor::new(data)).expect("parsing should succeed");

    assert_eq!(
        vec![
            PlanEntry {
                id: 1,
                from: 1,
                to: 2,
                amount: dec!(100.00),
                after: vec![]
            },
            PlanEntry {
                id: 2,
                from: 2,
                to: 3,
                amount: dec!(50.00),
                after: vec![1]
            },
            PlanEntry {
                id: 3,
                from: 3,
                to: 1,
                amount: dec!(25.00),
                after: vec![1, 2]
            },
        ],
        entries
    );
}

#[test]
// Parsing incorrectly formatted data should return an Err.
fn test_parse_invalid_format() {
    for (data, err_contains) in vec![
        (
            r#"id,from,to,amount,after
1,,2,1.0,"#, // missing from
            "cannot parse integer from empty string",
        ),
        (
            r#"id,from,to,amount,after
1,1,2"#,
            "found record with 3 fields, but the previous record has 5 fields",
        ),
    ] {
        match parse(std::io::Cursor::new(data)) {
            Err(Error::Csv(msg)) => assert!(msg.contains(err_contains), "{:?}", msg),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}

#[test]
fn test_parse_invalid_data() {
    for (data, want_err) in vec![
        (
            r#"id,from,to,amount,after
1,1,2,-1.0,"#,
            Error::Format("transfer 1 has a negative amount".to_string()),
        ),
        (
            r#"id,from,to,amount,after
1,1,2,1.0,one"#,
            Error::Format("invalid dependency `one`".to_string()),
        ),
    ] {
        assert_eq!(Err(want_err), parse(std::io::Cursor::new(data)));
    }
}

#[test]
fn test_transfers_wires_dependencies() {
    use rust_decimal_macros::dec;

    let entry = |id, after: Vec<PlanId>| PlanEntry {
        id,
        from: 1,
        to: 2,
        amount: dec!(1),
        after,
    };

    let transfers = transfers(vec![entry(1, vec![]), entry(2, vec![1]), entry(3, vec![1, 2])])
        .expect("plan should be valid");

    let ids: Vec<_> = transfers.iter().map(|(_, t)| t.id()).collect();
    let prerequisites = |i: usize| -> Vec<_> {
        transfers[i]
            .1
            .prerequisites()
            .iter()
            .map(TransferHandle::id)
            .collect()
    };
    assert_eq!(Vec::<u64>::new(), prerequisites(0));
    assert_eq!(vec![ids[0]], prerequisites(1));
    assert_eq!(vec![ids[0], ids[1]], prerequisites(2));
}

#[test]
fn test_transfers_invalid_dependencies() {
    use rust_decimal_macros::dec;

    let entry = |id, after: Vec<PlanId>| PlanEntry {
        id,
        from: 1,
        to: 2,
        amount: dec!(1),
        after,
    };

    for (plan, want_err) in vec![
        (
            vec![entry(1, vec![2]), entry(2, vec![])],
            "transfer 1 depends on 2, which is not listed before it",
        ),
        (
            vec![entry(1, vec![1])],
            "transfer 1 depends on 1, which is not listed before it",
        ),
        (vec![entry(1, vec![]), entry(1, vec![])], "duplicate transfer id 1"),
    ] {
        match transfers(plan) {
            Err(Error::Format(msg)) => assert_eq!(want_err, msg),
            _ => panic!("expected a format error"),
        }
    }
}
