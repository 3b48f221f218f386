// ⚠️ Ledger Errors
// Business-rule failures are surfaced verbatim to the caller, store faults are
// retried (when transient) or wrapped.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::entities::EntryType;

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    // ========================================================================
    // BUSINESS RULES (recoverable, never retried)
    // ========================================================================
    #[error("cannot add history to inactive account {account_id}")]
    InactiveAccount { account_id: i64 },

    #[error("entry type {entry_type} cannot be created manually: {hint}")]
    ForbiddenType {
        entry_type: EntryType,
        hint: &'static str,
    },

    #[error("{entry_type} amount must be {expected}, got {amount}")]
    InvalidSign {
        entry_type: EntryType,
        expected: &'static str,
        amount: Decimal,
    },

    #[error("insufficient balance: current balance is {current:.2}, operation is {amount}")]
    InsufficientBalance { current: Decimal, amount: Decimal },

    #[error("initial balance cannot be negative, got {amount}")]
    InvalidInitialBalance { amount: Decimal },

    #[error("{amount} {reason}")]
    AmountOutOfRange {
        field: &'static str,
        amount: Decimal,
        reason: &'static str,
    },

    #[error("account name {reason}")]
    InvalidName { reason: &'static str },

    #[error("account {account_id} cannot be closed while its balance is {balance:.2}; balance must be zero")]
    NonZeroBalance { account_id: i64, balance: Decimal },

    #[error("account {account_id} is already active")]
    AccountAlreadyActive { account_id: i64 },

    #[error("account {account_id} is already closed")]
    AccountAlreadyClosed { account_id: i64 },

    #[error("entry dated {date} is before the latest entry of account {account_id} ({latest})")]
    OutOfOrderDate {
        account_id: i64,
        date: chrono::NaiveDate,
        latest: chrono::NaiveDate,
    },

    // ========================================================================
    // LOOKUP
    // ========================================================================
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    // ========================================================================
    // STORE
    // ========================================================================
    /// Optimistic version check lost against a concurrent writer.
    #[error("concurrent update on account {account_id}")]
    Conflict { account_id: i64 },

    #[error("store contention persisted after {attempts} attempts")]
    Contention { attempts: u32 },

    #[error("ledger data is inconsistent: {0}")]
    Corrupt(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

impl LedgerError {
    /// Field the error is attributed to in API responses.
    pub fn field(&self) -> &'static str {
        match self {
            LedgerError::InactiveAccount { .. } => "account",
            LedgerError::ForbiddenType { .. } => "type",
            LedgerError::InvalidSign { .. } => "value",
            LedgerError::InsufficientBalance { .. } => "value",
            LedgerError::InvalidInitialBalance { .. } => "initial_value",
            LedgerError::AmountOutOfRange { field, .. } => *field,
            LedgerError::InvalidName { .. } => "name",
            LedgerError::NonZeroBalance { .. } => "account",
            LedgerError::AccountAlreadyActive { .. } => "account",
            LedgerError::AccountAlreadyClosed { .. } => "account",
            LedgerError::OutOfOrderDate { .. } => "date",
            LedgerError::NotFound { .. } => "id",
            _ => "non_field_errors",
        }
    }

    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            LedgerError::InactiveAccount { .. }
                | LedgerError::ForbiddenType { .. }
                | LedgerError::InvalidSign { .. }
                | LedgerError::InsufficientBalance { .. }
                | LedgerError::InvalidInitialBalance { .. }
                | LedgerError::AmountOutOfRange { .. }
                | LedgerError::InvalidName { .. }
                | LedgerError::NonZeroBalance { .. }
                | LedgerError::AccountAlreadyActive { .. }
                | LedgerError::AccountAlreadyClosed { .. }
                | LedgerError::OutOfOrderDate { .. }
        )
    }

    /// Busy/locked store errors and lost version races are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            LedgerError::Conflict { .. } => true,
            LedgerError::Store(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Translate a foreign-key violation into a missing-account error.
    pub(crate) fn from_insert(err: rusqlite::Error, account_id: i64) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation
                    && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                LedgerError::NotFound {
                    entity: "account",
                    id: account_id,
                }
            }
            _ => LedgerError::Store(err),
        }
    }
}
