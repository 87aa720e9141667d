use super::account::AccountNumber;
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const OTP_LEN: usize = 6;

/// Timing and limit rules for OTP issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtpPolicy {
    /// A code older than this is expired.
    pub expiry: TimeDelta,
    /// Issued codes allowed before the limit can trip.
    pub attempts_limit: u32,
    /// How long generation stays blocked once the limit trips.
    pub cooldown: TimeDelta,
    /// The limit only trips while the live code was generated within this window.
    pub window: TimeDelta,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            expiry: TimeDelta::minutes(5),
            attempts_limit: 3,
            cooldown: TimeDelta::minutes(10),
            window: TimeDelta::minutes(15),
        }
    }
}

/// The single live one-time code of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpInfo {
    pub account: AccountNumber,
    pub code: String,
    pub generated_at: DateTime<Utc>,
}

impl OtpInfo {
    /// Fresh 6-digit code in `100000..=999999`.
    pub fn issue(account: AccountNumber, now: DateTime<Utc>) -> Self {
        let code = rand::thread_rng().gen_range(100_000..1_000_000u32);
        Self {
            account,
            code: code.to_string(),
            generated_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, policy: &OtpPolicy) -> bool {
        self.generated_at < now - policy.expiry
    }

    pub fn generated_within(&self, window: TimeDelta, now: DateTime<Utc>) -> bool {
        self.generated_at > now - window
    }
}

/// Per-account retry-limit state, kept next to the OTP record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpAttempts {
    pub attempts: u32,
    pub limit_reached_at: Option<DateTime<Utc>>,
}

impl OtpAttempts {
    pub fn increment(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn cooldown_elapsed(&self, now: DateTime<Utc>, policy: &OtpPolicy) -> bool {
        self.limit_reached_at
            .is_some_and(|reached| now - reached >= policy.cooldown)
    }

    /// Minutes left before generation unblocks, rounded up. At least 1
    /// while the cool-down is still running.
    pub fn remaining_wait_minutes(&self, now: DateTime<Utc>, policy: &OtpPolicy) -> i64 {
        let reached = self.limit_reached_at.unwrap_or(now);
        let remaining = policy.cooldown - (now - reached);
        if remaining <= TimeDelta::zero() {
            return 0;
        }
        ((remaining.num_seconds() + 59) / 60).max(1)
    }
}
