use crate::domain::account::Account;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct AccountRow<'a> {
    account: &'a str,
    balance: Decimal,
    pin_set: bool,
}

/// Writes final account states as CSV (`account,balance,pin_set`), sorted by
/// account number so output is stable across storage backends.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_accounts(&mut self, mut accounts: Vec<Account>) -> Result<()> {
        accounts.sort_by(|a, b| a.number.cmp(&b.number));
        for account in &accounts {
            self.writer.serialize(AccountRow {
                account: account.number.as_str(),
                balance: account.balance.value().normalize(),
                pin_set: account.has_pin(),
            })?;
        }
        if accounts.is_empty() {
            self.writer.write_record(["account", "balance", "pin_set"])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
