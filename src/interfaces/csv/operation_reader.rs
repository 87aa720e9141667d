use crate::application::bank::Operation;
use crate::domain::account::AccountNumber;
use crate::error::{BankError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum OpKind {
    Open,
    CreatePin,
    UpdatePin,
    Deposit,
    Withdraw,
    Transfer,
    Otp,
}

/// One CSV row. Columns a given operation does not use may be left empty.
#[derive(Debug, Deserialize)]
struct OperationRecord {
    op: OpKind,
    account: Option<String>,
    target: Option<String>,
    pin: Option<String>,
    new_pin: Option<String>,
    password: Option<String>,
    amount: Option<Decimal>,
    category: Option<String>,
    name: Option<String>,
    email: Option<String>,
}

fn required(value: Option<String>, column: &str, op: OpKind) -> Result<String> {
    value.ok_or_else(|| BankError::MalformedInput(format!("{op:?} requires a {column} column")))
}

/// Credentials are passed on as given, empty included, so the engine reports
/// them the way it reports any other empty credential.
fn credential(value: Option<String>) -> String {
    value.unwrap_or_default()
}

impl TryFrom<OperationRecord> for Operation {
    type Error = BankError;

    fn try_from(record: OperationRecord) -> Result<Self> {
        let op = record.op;
        let account = |value: Option<String>| -> Result<AccountNumber> {
            required(value, "account", op).map(AccountNumber::new)
        };

        Ok(match op {
            OpKind::Open => Operation::Open {
                name: required(record.name, "name", op)?,
                email: required(record.email, "email", op)?,
                password: credential(record.password),
                account: record.account.map(AccountNumber::new),
            },
            OpKind::CreatePin => Operation::CreatePin {
                account: account(record.account)?,
                password: credential(record.password),
                pin: credential(record.pin),
            },
            OpKind::UpdatePin => Operation::UpdatePin {
                account: account(record.account)?,
                old_pin: credential(record.pin),
                password: credential(record.password),
                new_pin: credential(record.new_pin),
            },
            OpKind::Deposit => Operation::Deposit {
                account: account(record.account)?,
                pin: credential(record.pin),
                amount: amount(record.amount, op)?,
            },
            OpKind::Withdraw => Operation::Withdraw {
                account: account(record.account)?,
                pin: credential(record.pin),
                amount: amount(record.amount, op)?,
            },
            OpKind::Transfer => Operation::Transfer {
                account: account(record.account)?,
                target: required(record.target, "target", op).map(AccountNumber::new)?,
                pin: credential(record.pin),
                amount: amount(record.amount, op)?,
                category: record.category,
            },
            OpKind::Otp => Operation::Otp {
                account: account(record.account)?,
            },
        })
    }
}

fn amount(value: Option<Decimal>, op: OpKind) -> Result<Decimal> {
    value.ok_or_else(|| BankError::MalformedInput(format!("{op:?} requires an amount column")))
}

/// Reads operations from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<Operation>`.
/// It handles whitespace trimming and flexible record lengths automatically.
pub struct OperationReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> OperationReader<R> {
    /// Creates a new `OperationReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and converts operations, so
    /// large files are processed as a stream.
    pub fn operations(self) -> impl Iterator<Item = Result<Operation>> {
        self.reader
            .into_deserialize::<OperationRecord>()
            .map(|result| result.map_err(BankError::from).and_then(Operation::try_from))
    }
}
