use crate::domain::account::{Account, AccountNumber};
use crate::domain::otp::{OtpAttempts, OtpInfo};
use crate::domain::ports::{LedgerStore, LedgerUnit, OtpStore, UserStore};
use crate::domain::transaction::Transaction;
use crate::domain::user::{User, UserId};
use crate::error::{BankError, Result};
use crate::sync::KeyedLocks;
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

/// Column Family for storing account states.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for the append-only transaction log.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for account owners.
pub const CF_USERS: &str = "users";
/// Column Family for the live OTP of each account.
pub const CF_OTP: &str = "otp";
/// Column Family for OTP retry-limit state.
pub const CF_OTP_ATTEMPTS: &str = "otp_attempts";

const COLUMN_FAMILIES: [&str; 5] = [CF_ACCOUNTS, CF_TRANSACTIONS, CF_USERS, CF_OTP, CF_OTP_ATTEMPTS];

/// A persistent store implementation using RocksDB.
///
/// Accounts, transactions, users and OTP state live in separate Column
/// Families. A ledger unit commits its account updates and transaction
/// entries in one `WriteBatch`, so either all of them land or none do.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    locks: Arc<KeyedLocks>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column family.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            locks: Arc::new(KeyedLocks::new()),
        })
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        let handle = cf_handle(&self.db, cf)?;
        match self.db.get_pinned_cf(handle, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let handle = cf_handle(&self.db, cf)?;
        self.db.put_cf(handle, key, serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let handle = cf_handle(&self.db, cf)?;
        self.db
            .iterator_cf(handle, IteratorMode::Start)
            .map(|item| -> Result<T> {
                let (_key, value) = item?;
                Ok(serde_json::from_slice(&value)?)
            })
            .collect()
    }
}

fn cf_handle<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| BankError::Storage(format!("column family {name} not found")))
}

/// Transactions are keyed by timestamp first so a scan yields them in
/// chronological order.
fn transaction_key(tx: &Transaction) -> Vec<u8> {
    let mut key = tx
        .timestamp
        .timestamp_nanos_opt()
        .unwrap_or(i64::MAX)
        .to_be_bytes()
        .to_vec();
    key.extend_from_slice(tx.id.as_bytes());
    key
}

struct RocksDBUnit {
    db: Arc<DB>,
    snapshot: HashMap<AccountNumber, Account>,
    dirty: HashSet<AccountNumber>,
    transactions: Vec<Transaction>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

#[async_trait]
impl LedgerUnit for RocksDBUnit {
    fn account(&self, number: &AccountNumber) -> Option<&Account> {
        self.snapshot.get(number)
    }

    fn stage_account(&mut self, account: Account) {
        self.dirty.insert(account.number.clone());
        self.snapshot.insert(account.number.clone(), account);
    }

    fn stage_transaction(&mut self, transaction: Transaction) {
        self.transactions.push(transaction);
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let accounts = cf_handle(&self.db, CF_ACCOUNTS)?;
        let transactions = cf_handle(&self.db, CF_TRANSACTIONS)?;

        let mut batch = WriteBatch::default();
        for number in &self.dirty {
            if let Some(account) = self.snapshot.get(number) {
                batch.put_cf(accounts, number.as_str(), serde_json::to_vec(account)?);
            }
        }
        for tx in &self.transactions {
            batch.put_cf(transactions, transaction_key(tx), serde_json::to_vec(tx)?);
        }

        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for RocksDBStore {
    async fn begin(&self, accounts: &[AccountNumber]) -> Result<Box<dyn LedgerUnit>> {
        let guards = self
            .locks
            .lock_all(accounts.iter().map(AccountNumber::as_str))
            .await;

        let mut snapshot = HashMap::with_capacity(accounts.len());
        for number in accounts {
            if let Some(account) = self.get_json::<Account>(CF_ACCOUNTS, number.as_str().as_bytes())? {
                snapshot.insert(number.clone(), account);
            }
        }

        Ok(Box::new(RocksDBUnit {
            db: Arc::clone(&self.db),
            snapshot,
            dirty: HashSet::new(),
            transactions: Vec::new(),
            _guards: guards,
        }))
    }

    async fn find_account(&self, number: &AccountNumber) -> Result<Option<Account>> {
        self.get_json(CF_ACCOUNTS, number.as_str().as_bytes())
    }

    async fn insert_account(&self, account: Account) -> Result<()> {
        let _guard = self.locks.lock(account.number.as_str()).await;
        let key = account.number.as_str().as_bytes();
        let handle = cf_handle(&self.db, CF_ACCOUNTS)?;
        if self.db.get_pinned_cf(handle, key)?.is_some() {
            return Err(BankError::AccountNumberTaken(account.number.to_string()));
        }
        self.put_json(CF_ACCOUNTS, key, &account)
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        self.scan(CF_ACCOUNTS)
    }

    async fn transactions_for(&self, number: &AccountNumber) -> Result<Vec<Transaction>> {
        let mut transactions: Vec<Transaction> = self.scan(CF_TRANSACTIONS)?;
        transactions.retain(|tx| tx.involves(number));
        Ok(transactions)
    }
}

#[async_trait]
impl UserStore for RocksDBStore {
    async fn store(&self, user: User) -> Result<()> {
        self.put_json(CF_USERS, user.id.0.as_bytes(), &user)
    }

    async fn get(&self, id: UserId) -> Result<Option<User>> {
        self.get_json(CF_USERS, id.0.as_bytes())
    }
}

#[async_trait]
impl OtpStore for RocksDBStore {
    async fn find(&self, account: &AccountNumber) -> Result<Option<OtpInfo>> {
        self.get_json(CF_OTP, account.as_str().as_bytes())
    }

    async fn save(&self, otp: OtpInfo) -> Result<()> {
        self.put_json(CF_OTP, otp.account.as_str().as_bytes(), &otp)
    }

    async fn delete(&self, account: &AccountNumber) -> Result<()> {
        let handle = cf_handle(&self.db, CF_OTP)?;
        self.db.delete_cf(handle, account.as_str())?;
        Ok(())
    }

    async fn attempts(&self, account: &AccountNumber) -> Result<OtpAttempts> {
        Ok(self
            .get_json(CF_OTP_ATTEMPTS, account.as_str().as_bytes())?
            .unwrap_or_default())
    }

    async fn save_attempts(&self, account: &AccountNumber, attempts: OtpAttempts) -> Result<()> {
        self.put_json(CF_OTP_ATTEMPTS, account.as_str().as_bytes(), &attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{Amount, Balance};
    use chrono::{TimeDelta, Utc};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in COLUMN_FAMILIES {
            assert!(store.db.cf_handle(name).is_some(), "missing {name}");
        }
    }

    #[tokio::test]
    async fn test_rocksdb_account_roundtrip_and_duplicate() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let account = Account::new("abc123".into(), UserId::generate());

        store.insert_account(account.clone()).await.unwrap();
        assert_eq!(
            store.find_account(&"abc123".into()).await.unwrap(),
            Some(account.clone())
        );
        assert!(matches!(
            store.insert_account(account).await,
            Err(BankError::AccountNumberTaken(_))
        ));
        assert_eq!(store.all_accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rocksdb_unit_commits_batch() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let owner = UserId::generate();
        store.insert_account(Account::new("aaa111".into(), owner)).await.unwrap();
        store.insert_account(Account::new("bbb222".into(), owner)).await.unwrap();
        let (a, b): (AccountNumber, AccountNumber) = ("aaa111".into(), "bbb222".into());
        let amount = Amount::new(dec!(300)).unwrap();
        let start = Utc::now();

        let mut unit = store.begin(&[a.clone(), b.clone()]).await.unwrap();
        let mut source = unit.account(&a).cloned().unwrap();
        source.deposit(amount);
        unit.stage_account(source);
        unit.stage_transaction(Transaction::deposit(a.clone(), amount, start));
        unit.stage_transaction(Transaction::transfer(
            a.clone(),
            b.clone(),
            amount,
            None,
            start + TimeDelta::seconds(1),
        ));
        unit.commit().await.unwrap();

        let stored = store.find_account(&a).await.unwrap().unwrap();
        assert_eq!(stored.balance, Balance::new(dec!(300)));
        let history = store.transactions_for(&a).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].timestamp < history[1].timestamp);
        assert_eq!(store.transactions_for(&b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rocksdb_otp_state() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let number: AccountNumber = "abc123".into();
        let otp = OtpInfo::issue(number.clone(), Utc::now());

        store.save(otp.clone()).await.unwrap();
        assert_eq!(store.find(&number).await.unwrap(), Some(otp));
        store.delete(&number).await.unwrap();
        assert!(store.find(&number).await.unwrap().is_none());

        let mut attempts = store.attempts(&number).await.unwrap();
        assert_eq!(attempts, OtpAttempts::default());
        attempts.increment();
        store.save_attempts(&number, attempts).await.unwrap();
        assert_eq!(store.attempts(&number).await.unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn test_rocksdb_reopen_keeps_data() {
        let dir = tempdir().unwrap();
        let user = User {
            id: UserId::generate(),
            name: "Ann".to_string(),
            email: "ann@example.com".to_string(),
            password_digest: "x$y".to_string(),
        };
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            UserStore::store(&store, user.clone()).await.unwrap();
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        assert_eq!(UserStore::get(&store, user.id).await.unwrap(), Some(user));
    }
}
