use super::account::{AccountNumber, Amount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Transfer,
    /// A transfer seen from the receiving account.
    Credit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Transfer => "transfer",
            TransactionType::Credit => "credit",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable ledger entry, appended exactly once per committed balance change.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub id: Uuid,
    pub amount: Amount,
    pub r#type: TransactionType,
    pub timestamp: DateTime<Utc>,
    pub source: AccountNumber,
    /// Present only for transfers.
    pub target: Option<AccountNumber>,
    pub category: Option<String>,
}

impl Transaction {
    pub fn deposit(source: AccountNumber, amount: Amount, timestamp: DateTime<Utc>) -> Self {
        Self::entry(TransactionType::Deposit, source, None, amount, None, timestamp)
    }

    pub fn withdrawal(source: AccountNumber, amount: Amount, timestamp: DateTime<Utc>) -> Self {
        Self::entry(TransactionType::Withdrawal, source, None, amount, None, timestamp)
    }

    pub fn transfer(
        source: AccountNumber,
        target: AccountNumber,
        amount: Amount,
        category: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::entry(
            TransactionType::Transfer,
            source,
            Some(target),
            amount,
            category,
            timestamp,
        )
    }

    fn entry(
        r#type: TransactionType,
        source: AccountNumber,
        target: Option<AccountNumber>,
        amount: Amount,
        category: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            amount,
            r#type,
            timestamp,
            source,
            target,
            category,
        }
    }

    pub fn involves(&self, number: &AccountNumber) -> bool {
        &self.source == number || self.target.as_ref() == Some(number)
    }
}
