use crate::application::notify::NotificationDispatcher;
use crate::clock::ClockRef;
use crate::domain::account::AccountNumber;
use crate::domain::notification::EmailMessage;
use crate::domain::otp::{OtpAttempts, OtpInfo, OtpPolicy};
use crate::domain::ports::{LedgerStoreRef, OtpStoreRef};
use crate::error::{BankError, Result};
use crate::sync::KeyedLocks;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

/// Issues, re-sends and validates one-time codes, and throttles issuance per
/// account.
///
/// The OTP record, the attempt counter and the limit timestamp of an account
/// are read and written under one per-account lock.
pub struct OtpGuard {
    ledger: LedgerStoreRef,
    otps: OtpStoreRef,
    clock: ClockRef,
    policy: OtpPolicy,
    locks: KeyedLocks,
    dispatcher: NotificationDispatcher,
}

impl OtpGuard {
    pub fn new(
        ledger: LedgerStoreRef,
        otps: OtpStoreRef,
        clock: ClockRef,
        policy: OtpPolicy,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            ledger,
            otps,
            clock,
            policy,
            locks: KeyedLocks::new(),
            dispatcher,
        }
    }

    pub fn policy(&self) -> &OtpPolicy {
        &self.policy
    }

    /// Returns the code to deliver for `account`.
    ///
    /// A live, unexpired code is handed out again with a fresh timestamp; an
    /// expired one is replaced. Fails with `OtpRetryLimitExceeded` while the
    /// account is cooling down.
    pub async fn generate_otp(&self, account: &AccountNumber) -> Result<String> {
        tracing::info!(account = %account, "generating OTP");
        if self.ledger.find_account(account).await?.is_none() {
            tracing::warn!(account = %account, "OTP requested for unknown account");
            return Err(BankError::AccountDoesNotExist);
        }

        let _guard = self.locks.lock(account.as_str()).await;
        let now = self.clock.now();
        let mut attempts = self.otps.attempts(account).await?;

        let Some(mut existing) = self.otps.find(account).await? else {
            attempts.increment();
            self.otps.save_attempts(account, attempts).await?;
            return self.issue(account, now).await;
        };

        self.enforce_retry_limit(&existing, &mut attempts, now)
            .await?;

        if existing.is_expired(now, &self.policy) {
            tracing::debug!(account = %account, "existing OTP expired, issuing a new one");
            return self.issue(account, now).await;
        }

        existing.generated_at = now;
        attempts.increment();
        self.otps.save(existing.clone()).await?;
        self.otps.save_attempts(account, attempts).await?;
        tracing::info!(account = %account, attempts = attempts.attempts, "re-sending live OTP");
        Ok(existing.code)
    }

    async fn enforce_retry_limit(
        &self,
        existing: &OtpInfo,
        attempts: &mut OtpAttempts,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if attempts.attempts < self.policy.attempts_limit {
            return Ok(());
        }

        let account = &existing.account;
        if attempts.cooldown_elapsed(now, &self.policy) {
            tracing::debug!(account = %account, "OTP cool-down elapsed, resetting attempts");
            attempts.reset();
            self.otps.save_attempts(account, *attempts).await?;
            return Ok(());
        }

        if !existing.generated_within(self.policy.window, now) {
            return Ok(());
        }

        if attempts.limit_reached_at.is_none() {
            attempts.limit_reached_at = Some(now);
            self.otps.save_attempts(account, *attempts).await?;
        }
        let wait_minutes = attempts.remaining_wait_minutes(now, &self.policy);
        tracing::warn!(account = %account, wait_minutes, "OTP retry limit exceeded");
        Err(BankError::OtpRetryLimitExceeded { wait_minutes })
    }

    async fn issue(&self, account: &AccountNumber, now: DateTime<Utc>) -> Result<String> {
        let otp = OtpInfo::issue(account.clone(), now);
        let code = otp.code.clone();
        self.otps.save(otp).await?;
        tracing::info!(account = %account, "new OTP issued");
        Ok(code)
    }

    /// Checks `code` against the live OTP of `account`.
    ///
    /// Fails with `InvalidOtp` when no record matches. A matching record is
    /// consumed whether it was still valid or had expired.
    pub async fn validate_otp(&self, account: &AccountNumber, code: &str) -> Result<bool> {
        tracing::debug!(account = %account, "validating OTP");
        let _guard = self.locks.lock(account.as_str()).await;

        let otp = match self.otps.find(account).await? {
            Some(otp) if otp.code == code => otp,
            _ => {
                tracing::warn!(account = %account, "invalid OTP");
                return Err(BankError::InvalidOtp);
            }
        };

        self.otps.delete(account).await?;
        let valid = !otp.is_expired(self.clock.now(), &self.policy);
        if valid {
            tracing::info!(account = %account, "OTP validated");
        } else {
            tracing::warn!(account = %account, "OTP expired");
        }
        Ok(valid)
    }

    /// Mails `code` to the account owner without waiting for delivery.
    pub fn send_otp_email(
        &self,
        email: &str,
        name: &str,
        account: &AccountNumber,
        code: &str,
    ) -> JoinHandle<bool> {
        tracing::info!(account = %account, "sending OTP email");
        let message = EmailMessage {
            to: email.to_string(),
            subject: "OTP Verification".to_string(),
            body: format!(
                "Hello {name},\n\nYour one-time password for account {} is {code}.\n\
                 It expires in {} minutes. Do not share it with anyone.\n",
                account.masked(),
                self.policy.expiry.num_minutes()
            ),
        };
        self.dispatcher.dispatch(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::domain::account::Account;
    use crate::domain::ports::{LedgerStore, OtpStore};
    use crate::domain::user::UserId;
    use crate::infrastructure::in_memory::{InMemoryLedgerStore, InMemoryOtpStore};
    use crate::infrastructure::mailer::LogMailer;
    use chrono::TimeDelta;
    use std::sync::Arc;

    async fn guard() -> (OtpGuard, Arc<ManualClock>, Arc<InMemoryOtpStore>) {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        ledger
            .insert_account(Account::new("abc123".into(), UserId::generate()))
            .await
            .unwrap();
        let otps = Arc::new(InMemoryOtpStore::new());
        let clock = Arc::new(ManualClock::default());
        let guard = OtpGuard::new(
            ledger,
            otps.clone(),
            clock.clone(),
            OtpPolicy::default(),
            NotificationDispatcher::new(Arc::new(LogMailer::new())),
        );
        (guard, clock, otps)
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let (guard, _, _) = guard().await;
        let result = guard.generate_otp(&"nope00".into()).await;
        assert!(matches!(result, Err(BankError::AccountDoesNotExist)));
    }

    #[tokio::test]
    async fn test_resend_returns_same_code() {
        let (guard, clock, _) = guard().await;
        let account: AccountNumber = "abc123".into();

        let first = guard.generate_otp(&account).await.unwrap();
        clock.advance(TimeDelta::minutes(1));
        let second = guard.generate_otp(&account).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 6);
    }

    #[tokio::test]
    async fn test_expired_code_is_replaced_without_counting() {
        let (guard, clock, otps) = guard().await;
        let account: AccountNumber = "abc123".into();

        let first = guard.generate_otp(&account).await.unwrap();
        clock.advance(TimeDelta::minutes(6));
        guard.generate_otp(&account).await.unwrap();

        let stored = otps.find(&account).await.unwrap().unwrap();
        assert_eq!(stored.generated_at, clock.now());
        assert_eq!(otps.attempts(&account).await.unwrap().attempts, 1);
        assert_eq!(stored.code.len(), first.len());
    }

    #[tokio::test]
    async fn test_limit_trips_and_cools_down() {
        let (guard, clock, otps) = guard().await;
        let account: AccountNumber = "abc123".into();

        for _ in 0..3 {
            guard.generate_otp(&account).await.unwrap();
        }
        let err = guard.generate_otp(&account).await.unwrap_err();
        assert!(matches!(err, BankError::OtpRetryLimitExceeded { wait_minutes: 10 }));

        clock.advance(TimeDelta::minutes(4));
        let err = guard.generate_otp(&account).await.unwrap_err();
        assert!(matches!(err, BankError::OtpRetryLimitExceeded { wait_minutes: 6 }));

        clock.advance(TimeDelta::minutes(7));
        guard.generate_otp(&account).await.unwrap();
        let attempts = otps.attempts(&account).await.unwrap();
        assert_eq!(attempts.attempts, 0);
        assert!(attempts.limit_reached_at.is_none());
    }

    #[tokio::test]
    async fn test_validate_consumes_code() {
        let (guard, _, otps) = guard().await;
        let account: AccountNumber = "abc123".into();
        let code = guard.generate_otp(&account).await.unwrap();

        assert!(guard.validate_otp(&account, &code).await.unwrap());
        assert!(otps.find(&account).await.unwrap().is_none());
        assert!(matches!(
            guard.validate_otp(&account, &code).await,
            Err(BankError::InvalidOtp)
        ));
    }

    #[tokio::test]
    async fn test_validate_expired_code_returns_false_and_deletes() {
        let (guard, clock, otps) = guard().await;
        let account: AccountNumber = "abc123".into();
        let code = guard.generate_otp(&account).await.unwrap();

        clock.advance(TimeDelta::minutes(6));
        assert!(!guard.validate_otp(&account, &code).await.unwrap());
        assert!(otps.find(&account).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_validate_wrong_code() {
        let (guard, _, _) = guard().await;
        let account: AccountNumber = "abc123".into();
        guard.generate_otp(&account).await.unwrap();

        assert!(matches!(
            guard.validate_otp(&account, "000000").await,
            Err(BankError::InvalidOtp)
        ));
    }

    #[tokio::test]
    async fn test_send_otp_email_delivers() {
        let (guard, _, _) = guard().await;
        let delivered = guard
            .send_otp_email("ann@example.com", "Ann", &"abc123".into(), "123456")
            .await
            .unwrap();
        assert!(delivered);
    }
}
