use crate::application::notify::NotificationDispatcher;
use crate::domain::account::AccountNumber;
use crate::domain::notification::EmailMessage;
use crate::domain::ports::{LedgerStoreRef, UserStoreRef};
use crate::domain::transaction::{Transaction, TransactionType};
use crate::error::{BankError, Result};
use rust_decimal::Decimal;
use std::fmt::Write;
use tokio::task::JoinHandle;

/// Totals over an account's history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistorySummary {
    pub entries: usize,
    pub deposited: Decimal,
    pub withdrawn: Decimal,
    pub transferred_out: Decimal,
    pub received: Decimal,
}

impl HistorySummary {
    pub fn net(&self) -> Decimal {
        self.deposited + self.received - self.withdrawn - self.transferred_out
    }
}

/// Read side of the ledger: history, summaries and statements.
pub struct HistoryService {
    ledger: LedgerStoreRef,
    users: UserStoreRef,
    dispatcher: NotificationDispatcher,
}

impl HistoryService {
    pub fn new(
        ledger: LedgerStoreRef,
        users: UserStoreRef,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            ledger,
            users,
            dispatcher,
        }
    }

    /// Every entry where `number` is source or target, newest first.
    /// Transfers received by `number` are reported as `credit`.
    pub async fn for_account(&self, number: &AccountNumber) -> Result<Vec<Transaction>> {
        tracing::debug!(account = %number, "loading transaction history");
        if self.ledger.find_account(number).await?.is_none() {
            return Err(BankError::AccountNotFound);
        }

        let mut history: Vec<Transaction> = self
            .ledger
            .transactions_for(number)
            .await?
            .into_iter()
            .map(|mut tx| {
                if tx.r#type == TransactionType::Transfer && &tx.source != number {
                    tx.r#type = TransactionType::Credit;
                }
                tx
            })
            .collect();
        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        tracing::debug!(account = %number, entries = history.len(), "transaction history loaded");
        Ok(history)
    }

    pub async fn summary(&self, number: &AccountNumber) -> Result<HistorySummary> {
        let history = self.for_account(number).await?;
        let mut summary = HistorySummary {
            entries: history.len(),
            ..Default::default()
        };
        for tx in &history {
            let amount = tx.amount.value();
            match tx.r#type {
                TransactionType::Deposit => summary.deposited += amount,
                TransactionType::Withdrawal => summary.withdrawn += amount,
                TransactionType::Transfer => summary.transferred_out += amount,
                TransactionType::Credit => summary.received += amount,
            }
        }
        Ok(summary)
    }

    /// Plain-text statement, one line per entry, newest first.
    pub async fn statement(&self, number: &AccountNumber) -> Result<String> {
        let history = self.for_account(number).await?;
        let mut text = format!("Bank Statement for Account: {number}\n\n");
        for tx in &history {
            // writing into a String cannot fail
            let _ = writeln!(
                text,
                "Date: {}, Type: {}, Amount: {}",
                tx.timestamp.format("%Y-%m-%d %H:%M:%S"),
                tx.r#type,
                tx.amount.value()
            );
        }
        Ok(text)
    }

    /// Mails the statement to the account owner. Returns `None` when the
    /// owner has no user record to mail to.
    pub async fn send_statement(&self, number: &AccountNumber) -> Result<Option<JoinHandle<bool>>> {
        tracing::info!(account = %number, "sending bank statement");
        let statement = self.statement(number).await?;
        let account = self
            .ledger
            .find_account(number)
            .await?
            .ok_or(BankError::AccountNotFound)?;

        let Some(owner) = self.users.get(account.owner).await? else {
            tracing::warn!(account = %number, "no owner to send the statement to");
            return Ok(None);
        };

        let handle = self.dispatcher.dispatch(EmailMessage {
            to: owner.email,
            subject: "Your Bank Statement".to_string(),
            body: statement,
        });
        Ok(Some(handle))
    }
}
