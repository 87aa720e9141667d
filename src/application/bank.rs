//! Wiring of the engines behind one entry point.

use crate::application::engine::{LedgerEngine, NewAccount};
use crate::application::history::HistoryService;
use crate::application::idempotency::{IdempotencyGate, IdempotencyKey};
use crate::application::notify::{LoginNotifier, NotificationDispatcher};
use crate::application::otp::OtpGuard;
use crate::clock::{ClockRef, SystemClock};
use crate::config::BankConfig;
use crate::domain::account::{Account, AccountNumber};
use crate::domain::ports::{
    CacheStoreRef, GeolocatorRef, LedgerStoreRef, MailerRef, OtpStoreRef, SecretHasherRef,
    UserStoreRef,
};
use crate::domain::transaction::Transaction;
use crate::error::Result;
use crate::infrastructure::cache::{FallbackCache, LocalCache};
use crate::infrastructure::geolocation::HttpGeolocator;
use crate::infrastructure::hashing::Sha256Hasher;
use crate::infrastructure::in_memory::{InMemoryLedgerStore, InMemoryOtpStore, InMemoryUserStore};
use crate::infrastructure::mailer::LogMailer;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

/// A request against the bank, as submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Open {
        name: String,
        email: String,
        password: String,
        account: Option<AccountNumber>,
    },
    CreatePin {
        account: AccountNumber,
        password: String,
        pin: String,
    },
    UpdatePin {
        account: AccountNumber,
        old_pin: String,
        password: String,
        new_pin: String,
    },
    Deposit {
        account: AccountNumber,
        pin: String,
        amount: Decimal,
    },
    Withdraw {
        account: AccountNumber,
        pin: String,
        amount: Decimal,
    },
    Transfer {
        account: AccountNumber,
        target: AccountNumber,
        pin: String,
        amount: Decimal,
        category: Option<String>,
    },
    Otp {
        account: AccountNumber,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Open { .. } => "open",
            Operation::CreatePin { .. } => "create_pin",
            Operation::UpdatePin { .. } => "update_pin",
            Operation::Deposit { .. } => "deposit",
            Operation::Withdraw { .. } => "withdraw",
            Operation::Transfer { .. } => "transfer",
            Operation::Otp { .. } => "otp",
        }
    }

    /// The account whose balance or PIN the operation changes, for the
    /// operations that are deduplicated.
    fn guarded_account(&self) -> Option<&AccountNumber> {
        match self {
            Operation::CreatePin { account, .. }
            | Operation::UpdatePin { account, .. }
            | Operation::Deposit { account, .. }
            | Operation::Withdraw { account, .. }
            | Operation::Transfer { account, .. } => Some(account),
            Operation::Open { .. } | Operation::Otp { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Opened(Account),
    PinChanged,
    Recorded(Transaction),
    OtpIssued(String),
}

/// The collaborators a [`Bank`] runs on.
#[derive(Clone)]
pub struct Backends {
    pub ledger: LedgerStoreRef,
    pub users: UserStoreRef,
    pub otps: OtpStoreRef,
    pub cache: CacheStoreRef,
    pub hasher: SecretHasherRef,
    pub mailer: MailerRef,
    pub geolocator: Option<GeolocatorRef>,
    pub clock: ClockRef,
}

impl Backends {
    /// Process-local stores, a local-only cache and a logging mailer.
    pub fn in_memory(config: &BankConfig) -> Self {
        Self {
            ledger: Arc::new(InMemoryLedgerStore::new()),
            users: Arc::new(InMemoryUserStore::new()),
            otps: Arc::new(InMemoryOtpStore::new()),
            cache: Arc::new(FallbackCache::local_only(LocalCache::new(
                config.local_cache_capacity,
                config.idempotency_ttl,
            ))),
            hasher: Arc::new(Sha256Hasher::new()),
            mailer: Arc::new(LogMailer::new()),
            geolocator: config.geolocation_url.as_ref().map(|url| {
                Arc::new(HttpGeolocator::new(url.clone(), config.geolocation_token.clone()))
                    as GeolocatorRef
            }),
            clock: Arc::new(SystemClock),
        }
    }
}

pub struct Bank {
    engine: LedgerEngine,
    otp: OtpGuard,
    gate: IdempotencyGate,
    history: HistoryService,
    login: LoginNotifier,
}

impl Bank {
    pub fn new(backends: Backends, config: &BankConfig) -> Self {
        let dispatcher = NotificationDispatcher::new(backends.mailer);
        Self {
            engine: LedgerEngine::new(
                Arc::clone(&backends.ledger),
                Arc::clone(&backends.users),
                backends.hasher,
                Arc::clone(&backends.clock),
            ),
            otp: OtpGuard::new(
                Arc::clone(&backends.ledger),
                backends.otps,
                backends.clock,
                config.otp,
                dispatcher.clone(),
            ),
            gate: IdempotencyGate::new(backends.cache, config.idempotency_ttl),
            history: HistoryService::new(backends.ledger, backends.users, dispatcher.clone()),
            login: LoginNotifier::new(backends.geolocator, dispatcher),
        }
    }

    pub fn engine(&self) -> &LedgerEngine {
        &self.engine
    }

    pub fn otp(&self) -> &OtpGuard {
        &self.otp
    }

    pub fn gate(&self) -> &IdempotencyGate {
        &self.gate
    }

    pub fn history(&self) -> &HistoryService {
        &self.history
    }

    pub fn login(&self) -> &LoginNotifier {
        &self.login
    }

    /// Runs one operation. Balance and PIN changes pass through the
    /// idempotency gate, keyed by the operation's full payload.
    pub async fn execute(&self, operation: Operation) -> Result<Outcome> {
        let key = match operation.guarded_account() {
            Some(account) => Some(IdempotencyKey::new(account, operation.name(), &operation)?),
            None => None,
        };
        match key {
            Some(key) => self.gate.execute(&key, || self.apply(operation)).await,
            None => self.apply(operation).await,
        }
    }

    async fn apply(&self, operation: Operation) -> Result<Outcome> {
        match operation {
            Operation::Open {
                name,
                email,
                password,
                account,
            } => {
                let account = self
                    .engine
                    .open_account(NewAccount {
                        name,
                        email,
                        password,
                        number: account,
                    })
                    .await?;
                Ok(Outcome::Opened(account))
            }
            Operation::CreatePin {
                account,
                password,
                pin,
            } => {
                self.engine.create_pin(&account, &password, &pin).await?;
                Ok(Outcome::PinChanged)
            }
            Operation::UpdatePin {
                account,
                old_pin,
                password,
                new_pin,
            } => {
                self.engine
                    .update_pin(&account, &old_pin, &password, &new_pin)
                    .await?;
                Ok(Outcome::PinChanged)
            }
            Operation::Deposit {
                account,
                pin,
                amount,
            } => Ok(Outcome::Recorded(
                self.engine.deposit(&account, &pin, amount).await?,
            )),
            Operation::Withdraw {
                account,
                pin,
                amount,
            } => Ok(Outcome::Recorded(
                self.engine.withdraw(&account, &pin, amount).await?,
            )),
            Operation::Transfer {
                account,
                target,
                pin,
                amount,
                category,
            } => Ok(Outcome::Recorded(
                self.engine
                    .transfer(&account, &target, &pin, amount, category)
                    .await?,
            )),
            Operation::Otp { account } => {
                let code = self.otp.generate_otp(&account).await?;
                match self.engine.owner(&account).await {
                    Ok(Some(owner)) => {
                        // delivery is fire-and-forget
                        drop(
                            self.otp
                                .send_otp_email(&owner.email, &owner.name, &account, &code),
                        );
                    }
                    Ok(None) => {
                        tracing::warn!(account = %account, "no owner to send the OTP to");
                    }
                    Err(e) => {
                        tracing::error!(account = %account, error = %e, "owner lookup failed, OTP not mailed");
                    }
                }
                Ok(Outcome::OtpIssued(code))
            }
        }
    }
}
