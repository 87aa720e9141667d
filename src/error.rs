use thiserror::Error;

/// Why a password or PIN check was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("PIN has not been created for this account")]
    PinNotCreated,
    #[error("PIN cannot be empty")]
    PinEmpty,
    #[error("Invalid PIN")]
    PinInvalid,
    #[error("PIN already created for this account")]
    PinAlreadyExists,
    #[error("Password cannot be empty")]
    PasswordEmpty,
    #[error("Invalid password")]
    PasswordInvalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AmountViolation {
    #[error("Amount must be greater than 0")]
    NotPositive,
    #[error("Amount must be in multiples of 100")]
    NotMultipleOfUnit,
    #[error("Amount cannot be greater than 100,000")]
    ExceedsLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PinViolation {
    #[error("PIN cannot be empty")]
    Empty,
    #[error("PIN must be 4 digits")]
    Format,
}

/// HTTP-equivalent class of a rejected operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    BadRequest,
    Unauthorized,
    NotFound,
    Conflict,
    TooManyRequests,
    ServerError,
}

impl StatusClass {
    pub fn http_status(self) -> u16 {
        match self {
            StatusClass::BadRequest => 400,
            StatusClass::Unauthorized => 401,
            StatusClass::NotFound => 404,
            StatusClass::Conflict => 409,
            StatusClass::TooManyRequests => 429,
            StatusClass::ServerError => 500,
        }
    }
}

#[derive(Error, Debug)]
pub enum BankError {
    #[error("Account not found")]
    AccountNotFound,
    #[error("{0}")]
    Unauthorized(AuthFailure),
    #[error("{0}")]
    InvalidAmount(AmountViolation),
    #[error("{0}")]
    InvalidPin(PinViolation),
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("Source and target account cannot be the same")]
    FundTransfer,
    #[error("Account does not exist")]
    AccountDoesNotExist,
    #[error("Invalid OTP")]
    InvalidOtp,
    #[error("OTP generation limit exceeded. Please try again after {wait_minutes} minutes")]
    OtpRetryLimitExceeded { wait_minutes: i64 },
    #[error("{operation} request already processed")]
    DuplicateRequest { operation: String },
    #[error("Account number {0} is already taken")]
    AccountNumberTaken(String),
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl BankError {
    pub fn status(&self) -> StatusClass {
        match self {
            BankError::AccountNotFound | BankError::AccountDoesNotExist => StatusClass::NotFound,
            BankError::Unauthorized(_) => StatusClass::Unauthorized,
            BankError::InvalidAmount(_)
            | BankError::InvalidPin(_)
            | BankError::InsufficientBalance
            | BankError::FundTransfer
            | BankError::InvalidOtp
            | BankError::MalformedInput(_)
            | BankError::Csv(_) => StatusClass::BadRequest,
            BankError::OtpRetryLimitExceeded { .. } => StatusClass::TooManyRequests,
            BankError::DuplicateRequest { .. } | BankError::AccountNumberTaken(_) => {
                StatusClass::Conflict
            }
            BankError::Storage(_)
            | BankError::Cache(_)
            | BankError::Io(_)
            | BankError::Internal(_) => StatusClass::ServerError,
        }
    }

    /// Only infrastructure failures are worth retrying; business rejections never are.
    pub fn is_retryable(&self) -> bool {
        self.status() == StatusClass::ServerError
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for BankError {
    fn from(err: rocksdb::Error) -> Self {
        BankError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for BankError {
    fn from(err: serde_json::Error) -> Self {
        BankError::Internal(Box::new(err))
    }
}

/// Failures of the advisory cache layer. Never escalated into ledger failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation failed: {0}")]
    Operation(String),
}

pub type Result<T> = std::result::Result<T, BankError>;
