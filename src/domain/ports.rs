//! Boundaries between the engines and their collaborators.

use super::account::{Account, AccountNumber};
use super::notification::{EmailMessage, Geolocation, NotifyError};
use super::otp::{OtpAttempts, OtpInfo};
use super::transaction::Transaction;
use super::user::{User, UserId};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Account and ledger-entry storage.
///
/// All balance mutations go through a [`LedgerUnit`] obtained from
/// [`LedgerStore::begin`], which holds the row locks of the accounts it
/// covers until it is committed or dropped.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Locks the given accounts (missing ones included) and snapshots them.
    async fn begin(&self, accounts: &[AccountNumber]) -> Result<Box<dyn LedgerUnit>>;
    async fn find_account(&self, number: &AccountNumber) -> Result<Option<Account>>;
    /// Inserts a new account. Fails with `AccountNumberTaken` if the number exists.
    async fn insert_account(&self, account: Account) -> Result<()>;
    async fn all_accounts(&self) -> Result<Vec<Account>>;
    async fn transactions_for(&self, number: &AccountNumber) -> Result<Vec<Transaction>>;
}

/// Atomic unit of work over a locked set of accounts.
///
/// Staged writes become visible together on [`LedgerUnit::commit`]; dropping
/// the unit without committing discards them.
#[async_trait]
pub trait LedgerUnit: Send {
    /// Snapshot of a locked account, reflecting writes staged in this unit.
    fn account(&self, number: &AccountNumber) -> Option<&Account>;
    fn stage_account(&mut self, account: Account);
    fn stage_transaction(&mut self, transaction: Transaction);
    async fn commit(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn store(&self, user: User) -> Result<()>;
    async fn get(&self, id: UserId) -> Result<Option<User>>;
}

/// One live OTP record per account plus its retry-limit state.
#[async_trait]
pub trait OtpStore: Send + Sync {
    async fn find(&self, account: &AccountNumber) -> Result<Option<OtpInfo>>;
    async fn save(&self, otp: OtpInfo) -> Result<()>;
    async fn delete(&self, account: &AccountNumber) -> Result<()>;
    async fn attempts(&self, account: &AccountNumber) -> Result<OtpAttempts>;
    async fn save_attempts(&self, account: &AccountNumber, attempts: OtpAttempts) -> Result<()>;
}

/// Key-value cache with TTL. Advisory only: callers must survive any error.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn exists(&self, key: &str) -> std::result::Result<bool, CacheError>;
    async fn get(&self, key: &str) -> std::result::Result<Option<String>, CacheError>;
    async fn put(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> std::result::Result<(), CacheError>;
    async fn delete(&self, key: &str) -> std::result::Result<(), CacheError>;
}

pub trait SecretHasher: Send + Sync {
    fn hash(&self, secret: &str) -> String;
    fn verify(&self, secret: &str, digest: &str) -> bool;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> std::result::Result<(), NotifyError>;
}

#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn locate(&self, ip: &str) -> std::result::Result<Geolocation, NotifyError>;
}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;
pub type UserStoreRef = Arc<dyn UserStore>;
pub type OtpStoreRef = Arc<dyn OtpStore>;
pub type CacheStoreRef = Arc<dyn CacheStore>;
pub type SecretHasherRef = Arc<dyn SecretHasher>;
pub type MailerRef = Arc<dyn Mailer>;
pub type GeolocatorRef = Arc<dyn Geolocator>;
