#![allow(dead_code)]

use async_trait::async_trait;
use bankcore::application::bank::{Backends, Bank, Operation};
use bankcore::clock::ManualClock;
use bankcore::config::BankConfig;
use bankcore::domain::account::{Account, AccountNumber};
use bankcore::domain::notification::{EmailMessage, NotifyError};
use bankcore::domain::ports::{CacheStore, LedgerStore, LedgerUnit, Mailer};
use bankcore::domain::transaction::Transaction;
use bankcore::error::{BankError, CacheError, Result};
use bankcore::infrastructure::in_memory::InMemoryLedgerStore;
use rust_decimal::Decimal;
use std::io::{Error, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CSV_HEADER: [&str; 10] = [
    "op", "account", "target", "pin", "new_pin", "password", "amount", "category", "name", "email",
];

pub const PASSWORD: &str = "secret";
pub const PIN: &str = "1234";

/// A bank over in-memory stores with a controllable clock and a mailer that
/// keeps everything it is asked to send.
pub struct Harness {
    pub bank: Bank,
    pub clock: Arc<ManualClock>,
    pub outbox: Arc<Outbox>,
}

pub fn harness() -> Harness {
    harness_with(|_| {})
}

pub fn harness_with(customize: impl FnOnce(&mut Backends)) -> Harness {
    let config = BankConfig::default();
    let clock = Arc::new(ManualClock::default());
    let outbox = Arc::new(Outbox::default());

    let mut backends = Backends::in_memory(&config);
    backends.clock = clock.clone();
    backends.mailer = outbox.clone();
    customize(&mut backends);

    Harness {
        bank: Bank::new(backends, &config),
        clock,
        outbox,
    }
}

/// Opens `number` with the shared test password and PIN.
pub async fn open_with_pin(bank: &Bank, number: &str) -> AccountNumber {
    bank.execute(Operation::Open {
        name: "Ann".to_string(),
        email: format!("{number}@example.com"),
        password: PASSWORD.to_string(),
        account: Some(number.into()),
    })
    .await
    .unwrap();
    bank.execute(Operation::CreatePin {
        account: number.into(),
        password: PASSWORD.to_string(),
        pin: PIN.to_string(),
    })
    .await
    .unwrap();
    number.into()
}

pub async fn balance(bank: &Bank, number: &AccountNumber) -> Decimal {
    bank.engine().account(number).await.unwrap().balance.value()
}

#[derive(Default)]
pub struct Outbox {
    sent: Mutex<Vec<EmailMessage>>,
}

impl Outbox {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for Outbox {
    async fn send(&self, message: EmailMessage) -> std::result::Result<(), NotifyError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

/// A cache whose every call fails, as when the cache server is down.
pub struct DownCache;

#[async_trait]
impl CacheStore for DownCache {
    async fn exists(&self, _key: &str) -> std::result::Result<bool, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn get(&self, _key: &str) -> std::result::Result<Option<String>, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn put(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Option<Duration>,
    ) -> std::result::Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> std::result::Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }
}

/// Ledger whose units stage normally but refuse to commit while failing is on.
#[derive(Default)]
pub struct FailingCommitLedger {
    inner: InMemoryLedgerStore,
    failing: AtomicBool,
}

impl FailingCommitLedger {
    pub fn failing() -> Self {
        let ledger = Self::default();
        ledger.set_failing(true);
        ledger
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

struct FailingUnit {
    inner: Box<dyn LedgerUnit>,
    fail: bool,
}

#[async_trait]
impl LedgerUnit for FailingUnit {
    fn account(&self, number: &AccountNumber) -> Option<&Account> {
        self.inner.account(number)
    }

    fn stage_account(&mut self, account: Account) {
        self.inner.stage_account(account);
    }

    fn stage_transaction(&mut self, transaction: Transaction) {
        self.inner.stage_transaction(transaction);
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if self.fail {
            return Err(BankError::Storage("disk full".to_string()));
        }
        self.inner.commit().await
    }
}

#[async_trait]
impl LedgerStore for FailingCommitLedger {
    async fn begin(&self, accounts: &[AccountNumber]) -> Result<Box<dyn LedgerUnit>> {
        let inner = self.inner.begin(accounts).await?;
        Ok(Box::new(FailingUnit {
            inner,
            fail: self.failing.load(Ordering::SeqCst),
        }))
    }

    async fn find_account(&self, number: &AccountNumber) -> Result<Option<Account>> {
        self.inner.find_account(number).await
    }

    async fn insert_account(&self, account: Account) -> Result<()> {
        self.inner.insert_account(account).await
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        self.inner.all_accounts().await
    }

    async fn transactions_for(&self, number: &AccountNumber) -> Result<Vec<Transaction>> {
        self.inner.transactions_for(number).await
    }
}

/// Writes an operations CSV with the standard header followed by `rows`.
/// Short rows are padded with empty columns.
pub fn write_csv(rows: &[&[&str]]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    {
        let mut wtr = csv::Writer::from_writer(file.as_file_mut());
        wtr.write_record(CSV_HEADER).unwrap();
        for row in rows {
            let mut record: Vec<&str> = row.to_vec();
            record.resize(CSV_HEADER.len(), "");
            wtr.write_record(&record).unwrap();
        }
        wtr.flush().unwrap();
    }
    file.flush().unwrap();
    file
}

/// Opens `accounts` accounts, sets their PINs and deposits into each one.
pub fn generate_operations_csv(path: &Path, accounts: usize) -> std::result::Result<(), Error> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(CSV_HEADER)?;

    for i in 0..accounts {
        let number = format!("a{i:05}");
        let amount = ((i % 1000 + 1) * 100).to_string();
        let email = format!("{number}@example.com");
        wtr.write_record(["open", &number, "", "", "", PASSWORD, "", "", "Ann", &email])?;
        wtr.write_record(["create_pin", &number, "", PIN, "", PASSWORD, "", "", "", ""])?;
        wtr.write_record(["deposit", &number, "", PIN, "", "", &amount, "", "", ""])?;
    }

    wtr.flush()?;
    Ok(())
}
