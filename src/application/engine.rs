use crate::clock::ClockRef;
use crate::domain::account::{Account, AccountNumber, Amount, validate_pin_format};
use crate::domain::ports::{LedgerStoreRef, LedgerUnit, SecretHasherRef, UserStoreRef};
use crate::domain::transaction::Transaction;
use crate::domain::user::{User, UserId};
use crate::error::{AuthFailure, BankError, Result};
use rust_decimal::Decimal;
use std::slice;

/// Attempts at drawing an unused random account number before giving up.
const ACCOUNT_NUMBER_ATTEMPTS: usize = 32;

/// Registration data for a new customer.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password: String,
    /// Requested account number. A random unused one is assigned when `None`.
    pub number: Option<AccountNumber>,
}

/// The main entry point for money movement.
///
/// `LedgerEngine` owns every balance mutation. Each mutating operation runs
/// inside one [`LedgerUnit`]: the involved accounts are locked, validated
/// against their locked snapshot, and the new balances are committed together
/// with the ledger entry. An operation that fails never commits, so nothing
/// partial is ever visible.
///
/// Checks run in a fixed order: password, then PIN, then amount, then
/// self-transfer, target existence and balance.
pub struct LedgerEngine {
    ledger: LedgerStoreRef,
    users: UserStoreRef,
    hasher: SecretHasherRef,
    clock: ClockRef,
}

impl LedgerEngine {
    pub fn new(
        ledger: LedgerStoreRef,
        users: UserStoreRef,
        hasher: SecretHasherRef,
        clock: ClockRef,
    ) -> Self {
        Self {
            ledger,
            users,
            hasher,
            clock,
        }
    }

    /// Registers the owner and a zero-balance account. No ledger entry is written.
    pub async fn open_account(&self, request: NewAccount) -> Result<Account> {
        tracing::info!(email = %request.email, "opening account");
        if request.password.is_empty() {
            return Err(BankError::Unauthorized(AuthFailure::PasswordEmpty));
        }

        // The owner goes first so an account never exists without one.
        let owner = UserId::generate();
        self.users
            .store(User {
                id: owner,
                name: request.name,
                email: request.email,
                password_digest: self.hasher.hash(&request.password),
            })
            .await?;

        let account = match request.number {
            Some(number) => {
                let account = Account::new(number, owner);
                self.ledger.insert_account(account.clone()).await?;
                account
            }
            None => self.insert_with_random_number(owner).await?,
        };

        tracing::info!(account = %account.number, "account opened");
        Ok(account)
    }

    async fn insert_with_random_number(&self, owner: UserId) -> Result<Account> {
        for _ in 0..ACCOUNT_NUMBER_ATTEMPTS {
            let account = Account::new(AccountNumber::generate(), owner);
            match self.ledger.insert_account(account.clone()).await {
                Ok(()) => return Ok(account),
                Err(BankError::AccountNumberTaken(number)) => {
                    tracing::debug!(account = %number, "account number taken, drawing again");
                }
                Err(e) => return Err(e),
            }
        }
        Err(BankError::Storage(
            "could not find an unused account number".to_string(),
        ))
    }

    pub async fn account(&self, number: &AccountNumber) -> Result<Account> {
        self.ledger
            .find_account(number)
            .await?
            .ok_or(BankError::AccountNotFound)
    }

    pub async fn accounts(&self) -> Result<Vec<Account>> {
        self.ledger.all_accounts().await
    }

    /// The user that owns `number`, if their record still exists.
    pub async fn owner(&self, number: &AccountNumber) -> Result<Option<User>> {
        let account = self.account(number).await?;
        self.users.get(account.owner).await
    }

    pub async fn is_pin_created(&self, number: &AccountNumber) -> Result<bool> {
        tracing::debug!(account = %number, "checking PIN status");
        Ok(self.account(number).await?.has_pin())
    }

    /// Credits `amount` to `number`. Returns the recorded ledger entry.
    pub async fn deposit(
        &self,
        number: &AccountNumber,
        pin: &str,
        amount: Decimal,
    ) -> Result<Transaction> {
        tracing::info!(account = %number, %amount, "cash deposit requested");
        let mut unit = self.ledger.begin(slice::from_ref(number)).await?;

        let mut account = locked_account(&*unit, number)?;
        self.verify_pin(&account, pin)?;
        let amount = checked_amount(number, amount)?;

        account.deposit(amount);
        let new_balance = account.balance.value();
        let tx = Transaction::deposit(number.clone(), amount, self.clock.now());
        unit.stage_account(account);
        unit.stage_transaction(tx.clone());
        commit(unit, number).await?;

        tracing::info!(account = %number, balance = %new_balance, "cash deposit committed");
        Ok(tx)
    }

    /// Debits `amount` from `number`. Fails with `InsufficientBalance` when the
    /// balance does not cover it.
    pub async fn withdraw(
        &self,
        number: &AccountNumber,
        pin: &str,
        amount: Decimal,
    ) -> Result<Transaction> {
        tracing::info!(account = %number, %amount, "cash withdrawal requested");
        let mut unit = self.ledger.begin(slice::from_ref(number)).await?;

        let mut account = locked_account(&*unit, number)?;
        self.verify_pin(&account, pin)?;
        let amount = checked_amount(number, amount)?;

        if let Err(e) = account.withdraw(amount) {
            tracing::warn!(
                account = %number,
                balance = %account.balance.value(),
                requested = %amount.value(),
                "insufficient balance"
            );
            return Err(e);
        }
        let new_balance = account.balance.value();
        let tx = Transaction::withdrawal(number.clone(), amount, self.clock.now());
        unit.stage_account(account);
        unit.stage_transaction(tx.clone());
        commit(unit, number).await?;

        tracing::info!(account = %number, balance = %new_balance, "cash withdrawal committed");
        Ok(tx)
    }

    /// Moves `amount` from `source` to `target` as one ledger entry. Both
    /// balances change together or not at all.
    pub async fn transfer(
        &self,
        source: &AccountNumber,
        target: &AccountNumber,
        pin: &str,
        amount: Decimal,
        category: Option<String>,
    ) -> Result<Transaction> {
        tracing::info!(source = %source, target = %target, %amount, ?category, "fund transfer requested");
        let mut unit = self
            .ledger
            .begin(&[source.clone(), target.clone()])
            .await?;

        let mut from = locked_account(&*unit, source)?;
        self.verify_pin(&from, pin)?;
        let amount = checked_amount(source, amount)?;

        if source == target {
            tracing::warn!(account = %source, "transfer to the same account");
            return Err(BankError::FundTransfer);
        }
        let Some(mut to) = unit.account(target).cloned() else {
            tracing::warn!(account = %target, "transfer target not found");
            return Err(BankError::AccountNotFound);
        };
        if let Err(e) = from.withdraw(amount) {
            tracing::warn!(account = %source, balance = %from.balance.value(), "insufficient balance for transfer");
            return Err(e);
        }
        to.deposit(amount);

        let tx = Transaction::transfer(
            source.clone(),
            target.clone(),
            amount,
            category,
            self.clock.now(),
        );
        unit.stage_account(from);
        unit.stage_account(to);
        unit.stage_transaction(tx.clone());
        commit(unit, source).await?;

        tracing::info!(source = %source, target = %target, "fund transfer committed");
        Ok(tx)
    }

    pub async fn create_pin(&self, number: &AccountNumber, password: &str, pin: &str) -> Result<()> {
        tracing::info!(account = %number, "creating PIN");
        let mut unit = self.ledger.begin(slice::from_ref(number)).await?;

        let mut account = locked_account(&*unit, number)?;
        self.verify_password(&account, password).await?;
        if account.has_pin() {
            tracing::warn!(account = %number, "PIN already exists");
            return Err(BankError::Unauthorized(AuthFailure::PinAlreadyExists));
        }
        validate_pin_format(pin).inspect_err(|_| {
            tracing::warn!(account = %number, "rejected PIN format");
        })?;

        account.pin_digest = Some(self.hasher.hash(pin));
        unit.stage_account(account);
        commit(unit, number).await?;
        tracing::info!(account = %number, "PIN created");
        Ok(())
    }

    pub async fn update_pin(
        &self,
        number: &AccountNumber,
        old_pin: &str,
        password: &str,
        new_pin: &str,
    ) -> Result<()> {
        tracing::info!(account = %number, "updating PIN");
        let mut unit = self.ledger.begin(slice::from_ref(number)).await?;

        let mut account = locked_account(&*unit, number)?;
        self.verify_password(&account, password).await?;
        self.verify_pin(&account, old_pin)?;
        validate_pin_format(new_pin).inspect_err(|_| {
            tracing::warn!(account = %number, "rejected new PIN format");
        })?;

        account.pin_digest = Some(self.hasher.hash(new_pin));
        unit.stage_account(account);
        commit(unit, number).await?;
        tracing::info!(account = %number, "PIN updated");
        Ok(())
    }

    fn verify_pin(&self, account: &Account, pin: &str) -> Result<()> {
        let Some(digest) = &account.pin_digest else {
            tracing::warn!(account = %account.number, "PIN not created");
            return Err(BankError::Unauthorized(AuthFailure::PinNotCreated));
        };
        if pin.is_empty() {
            tracing::warn!(account = %account.number, "PIN is empty");
            return Err(BankError::Unauthorized(AuthFailure::PinEmpty));
        }
        if !self.hasher.verify(pin, digest) {
            tracing::warn!(account = %account.number, "invalid PIN");
            return Err(BankError::Unauthorized(AuthFailure::PinInvalid));
        }
        Ok(())
    }

    async fn verify_password(&self, account: &Account, password: &str) -> Result<()> {
        if password.is_empty() {
            tracing::warn!(account = %account.number, "password is empty");
            return Err(BankError::Unauthorized(AuthFailure::PasswordEmpty));
        }
        let owner = self.users.get(account.owner).await?.ok_or_else(|| {
            tracing::error!(account = %account.number, owner = %account.owner, "account owner missing");
            BankError::AccountNotFound
        })?;
        if !self.hasher.verify(password, &owner.password_digest) {
            tracing::warn!(account = %account.number, "invalid password");
            return Err(BankError::Unauthorized(AuthFailure::PasswordInvalid));
        }
        Ok(())
    }
}

fn locked_account(unit: &dyn LedgerUnit, number: &AccountNumber) -> Result<Account> {
    unit.account(number).cloned().ok_or_else(|| {
        tracing::warn!(account = %number, "account not found");
        BankError::AccountNotFound
    })
}

fn checked_amount(number: &AccountNumber, amount: Decimal) -> Result<Amount> {
    Amount::new(amount).inspect_err(|e| {
        tracing::warn!(account = %number, %amount, reason = %e, "rejected amount");
    })
}

async fn commit(unit: Box<dyn LedgerUnit>, number: &AccountNumber) -> Result<()> {
    unit.commit().await.inspect_err(|e| {
        tracing::error!(account = %number, error = %e, "ledger commit failed, nothing applied");
    })
}
