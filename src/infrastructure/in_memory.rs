use crate::domain::account::{Account, AccountNumber};
use crate::domain::otp::{OtpAttempts, OtpInfo};
use crate::domain::ports::{LedgerStore, LedgerUnit, OtpStore, UserStore};
use crate::domain::transaction::Transaction;
use crate::domain::user::{User, UserId};
use crate::error::{BankError, Result};
use crate::sync::KeyedLocks;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{OwnedMutexGuard, RwLock};

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<AccountNumber, Account>,
    transactions: Vec<Transaction>,
}

/// A thread-safe in-memory ledger.
///
/// Row locks come from [`KeyedLocks`]; the `RwLock` around the state is only
/// held for the snapshot read in `begin` and the apply step in `commit`, so
/// units over disjoint accounts run concurrently.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
    locks: Arc<KeyedLocks>,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

struct InMemoryUnit {
    state: Arc<RwLock<LedgerState>>,
    snapshot: HashMap<AccountNumber, Account>,
    dirty: HashSet<AccountNumber>,
    transactions: Vec<Transaction>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

#[async_trait]
impl LedgerUnit for InMemoryUnit {
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
        let InMemoryUnit {
            state,
            mut snapshot,
            dirty,
            transactions,
            _guards,
        } = *self;

        let mut state = state.write().await;
        for number in dirty {
            if let Some(account) = snapshot.remove(&number) {
                state.accounts.insert(number, account);
            }
        }
        state.transactions.extend(transactions);
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self, accounts: &[AccountNumber]) -> Result<Box<dyn LedgerUnit>> {
        let guards = self
            .locks
            .lock_all(accounts.iter().map(AccountNumber::as_str))
            .await;

        let state = self.state.read().await;
        let snapshot = accounts
            .iter()
            .filter_map(|number| {
                state
                    .accounts
                    .get(number)
                    .map(|account| (number.clone(), account.clone()))
            })
            .collect();
        drop(state);

        Ok(Box::new(InMemoryUnit {
            state: Arc::clone(&self.state),
            snapshot,
            dirty: HashSet::new(),
            transactions: Vec::new(),
            _guards: guards,
        }))
    }

    async fn find_account(&self, number: &AccountNumber) -> Result<Option<Account>> {
        let state = self.state.read().await;
        Ok(state.accounts.get(number).cloned())
    }

    async fn insert_account(&self, account: Account) -> Result<()> {
        let mut state = self.state.write().await;
        if state.accounts.contains_key(&account.number) {
            return Err(BankError::AccountNumberTaken(account.number.to_string()));
        }
        state.accounts.insert(account.number.clone(), account);
        Ok(())
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        let state = self.state.read().await;
        Ok(state.accounts.values().cloned().collect())
    }

    async fn transactions_for(&self, number: &AccountNumber) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .iter()
            .filter(|tx| tx.involves(number))
            .cloned()
            .collect())
    }
}

/// A thread-safe in-memory store for account owners.
#[derive(Default, Clone)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<HashMap<UserId, User>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn store(&self, user: User) -> Result<()> {
        let mut users = self.users.write().await;
        users.insert(user.id, user);
        Ok(())
    }

    async fn get(&self, id: UserId) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }
}

/// In-memory OTP records and retry-limit state, keyed by account.
#[derive(Default, Clone)]
pub struct InMemoryOtpStore {
    otps: Arc<RwLock<HashMap<AccountNumber, OtpInfo>>>,
    attempts: Arc<RwLock<HashMap<AccountNumber, OtpAttempts>>>,
}

impl InMemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OtpStore for InMemoryOtpStore {
    async fn find(&self, account: &AccountNumber) -> Result<Option<OtpInfo>> {
        let otps = self.otps.read().await;
        Ok(otps.get(account).cloned())
    }

    async fn save(&self, otp: OtpInfo) -> Result<()> {
        let mut otps = self.otps.write().await;
        otps.insert(otp.account.clone(), otp);
        Ok(())
    }

    async fn delete(&self, account: &AccountNumber) -> Result<()> {
        let mut otps = self.otps.write().await;
        otps.remove(account);
        Ok(())
    }

    async fn attempts(&self, account: &AccountNumber) -> Result<OtpAttempts> {
        let attempts = self.attempts.read().await;
        Ok(attempts.get(account).copied().unwrap_or_default())
    }

    async fn save_attempts(&self, account: &AccountNumber, state: OtpAttempts) -> Result<()> {
        let mut attempts = self.attempts.write().await;
        attempts.insert(account.clone(), state);
        Ok(())
    }
}
