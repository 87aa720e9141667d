//! Application layer containing the business logic orchestration.
//!
//! - [`engine::LedgerEngine`]: balance mutations and PIN management.
//! - [`otp::OtpGuard`]: one-time code issuance with per-account throttling.
//! - [`idempotency::IdempotencyGate`]: deduplication of retried requests.
//! - [`history::HistoryService`]: transaction history and statements.
//! - [`bank::Bank`]: all of the above behind a single `execute`.

pub mod bank;
pub mod engine;
pub mod history;
pub mod idempotency;
pub mod notify;
pub mod otp;
