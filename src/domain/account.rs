use crate::domain::user::UserId;
use crate::error::{AmountViolation, BankError, PinViolation};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

/// Smallest denomination accepted by cash operations.
pub const MIN_UNIT: Decimal = dec!(100);
/// Largest amount a single operation may move.
pub const MAX_AMOUNT: Decimal = dec!(100000);
pub const ACCOUNT_NUMBER_LEN: usize = 6;
pub const PIN_LEN: usize = 4;

/// External account identifier. Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountNumber(String);

impl AccountNumber {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Random 6-character identifier taken from a v4 UUID.
    pub fn generate() -> Self {
        let simple = uuid::Uuid::new_v4().simple().to_string();
        Self(simple[..ACCOUNT_NUMBER_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Masks the first three characters, e.g. `xxx4f2`.
    pub fn masked(&self) -> String {
        let suffix = self.0.get(3..).unwrap_or_default();
        format!("xxx{suffix}")
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountNumber {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Monetary balance. Never negative: only [`Balance::checked_sub`] decreases it.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

/// An amount that passed the cash-operation rules: positive, a multiple of
/// [`MIN_UNIT`] and at most [`MAX_AMOUNT`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, BankError> {
        if value <= Decimal::ZERO {
            return Err(BankError::InvalidAmount(AmountViolation::NotPositive));
        }
        if value % MIN_UNIT != Decimal::ZERO {
            return Err(BankError::InvalidAmount(AmountViolation::NotMultipleOfUnit));
        }
        if value > MAX_AMOUNT {
            return Err(BankError::InvalidAmount(AmountViolation::ExceedsLimit));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = BankError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Returns `None` instead of going below zero.
    pub fn checked_sub(self, amount: Amount) -> Option<Self> {
        if self.0 >= amount.0 {
            Some(Self(self.0 - amount.0))
        } else {
            None
        }
    }
}

impl Add<Amount> for Balance {
    type Output = Self;
    fn add(self, rhs: Amount) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign<Amount> for Balance {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

/// Checks that a PIN is exactly four ASCII digits.
pub fn validate_pin_format(pin: &str) -> Result<(), BankError> {
    if pin.is_empty() {
        return Err(BankError::InvalidPin(PinViolation::Empty));
    }
    if pin.len() != PIN_LEN || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BankError::InvalidPin(PinViolation::Format));
    }
    Ok(())
}

/// A customer account.
///
/// Created once at registration with a zero balance and no PIN. Balance and
/// PIN digest are only changed through the ledger engine.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Account {
    pub number: AccountNumber,
    pub balance: Balance,
    /// Hashed PIN, present only after PIN creation.
    pub pin_digest: Option<String>,
    pub owner: UserId,
}

impl Account {
    pub fn new(number: AccountNumber, owner: UserId) -> Self {
        Self {
            number,
            balance: Balance::ZERO,
            pin_digest: None,
            owner,
        }
    }

    pub fn has_pin(&self) -> bool {
        self.pin_digest.is_some()
    }

    pub fn deposit(&mut self, amount: Amount) {
        self.balance += amount;
    }

    /// Withdraws funds if the balance covers the amount; otherwise leaves it untouched.
    pub fn withdraw(&mut self, amount: Amount) -> Result<(), BankError> {
        match self.balance.checked_sub(amount) {
            Some(balance) => {
                self.balance = balance;
                Ok(())
            }
            None => Err(BankError::InsufficientBalance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account() -> Account {
        Account::new(AccountNumber::new("a1b2c3"), UserId::generate())
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(100)).is_ok());
        assert!(Amount::new(dec!(100000)).is_ok());
        assert!(Amount::new(dec!(500.00)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0)),
            Err(BankError::InvalidAmount(AmountViolation::NotPositive))
        ));
        assert!(matches!(
            Amount::new(dec!(-100)),
            Err(BankError::InvalidAmount(AmountViolation::NotPositive))
        ));
        assert!(matches!(
            Amount::new(dec!(150)),
            Err(BankError::InvalidAmount(AmountViolation::NotMultipleOfUnit))
        ));
        assert!(matches!(
            Amount::new(dec!(100.5)),
            Err(BankError::InvalidAmount(AmountViolation::NotMultipleOfUnit))
        ));
        assert!(matches!(
            Amount::new(dec!(100100)),
            Err(BankError::InvalidAmount(AmountViolation::ExceedsLimit))
        ));
    }

    #[test]
    fn test_balance_checked_sub() {
        let balance = Balance::new(dec!(300));
        let amount = Amount::new(dec!(200)).unwrap();
        assert_eq!(balance.checked_sub(amount), Some(Balance::new(dec!(100))));
        let too_much = Amount::new(dec!(400)).unwrap();
        assert_eq!(balance.checked_sub(too_much), None);
    }

    #[test]
    fn test_account_deposit() {
        let mut account = account();
        account.deposit(Amount::new(dec!(1000)).unwrap());
        assert_eq!(account.balance, Balance::new(dec!(1000)));
    }

    #[test]
    fn test_account_withdraw_insufficient() {
        let mut account = account();
        account.deposit(Amount::new(dec!(100)).unwrap());

        let result = account.withdraw(Amount::new(dec!(200)).unwrap());
        assert!(matches!(result, Err(BankError::InsufficientBalance)));
        assert_eq!(account.balance, Balance::new(dec!(100)));
    }

    #[test]
    fn test_pin_format() {
        assert!(validate_pin_format("0420").is_ok());
        assert!(matches!(
            validate_pin_format(""),
            Err(BankError::InvalidPin(PinViolation::Empty))
        ));
        for bad in ["123", "12345", "12a4", "١٢٣٤"] {
            assert!(matches!(
                validate_pin_format(bad),
                Err(BankError::InvalidPin(PinViolation::Format))
            ));
        }
    }

    #[test]
    fn test_account_number_generation_and_mask() {
        let number = AccountNumber::generate();
        assert_eq!(number.as_str().len(), ACCOUNT_NUMBER_LEN);
        assert_eq!(AccountNumber::new("abc123").masked(), "xxx123");
    }
}
