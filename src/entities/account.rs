// 💳 Account Entity
//
// The row id is the identity, `name` is a free-text value. `is_active` is
// cached lifecycle state: only the ledger controller writes it, in the same
// store transaction as the Closure/Reactivation entry that justifies it.
// `version` bumps with every write to the account and backs the optimistic
// check on appends.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{LedgerError, LedgerResult};

pub const MAX_ACCOUNT_NAME_LEN: usize = 100;

// ============================================================================
// ACCOUNT ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    /// Store-assigned id (never changes)
    pub id: i64,

    /// Display name (e.g., "Tesouro Selic 2029")
    pub name: String,

    /// False between a Closure entry and the next Reactivation entry
    pub is_active: bool,

    /// Write counter, compared-and-set on every ledger write
    #[serde(skip_serializing)]
    pub version: i64,

    #[serde(skip_serializing)]
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// An account that accepts balance-affecting entries.
    pub fn accepts_entries(&self) -> bool {
        self.is_active
    }
}

/// Trimmed account name, non-empty and at most 100 characters.
pub fn validate_account_name(name: &str) -> LedgerResult<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::InvalidName {
            reason: "cannot be blank",
        });
    }
    if trimmed.chars().count() > MAX_ACCOUNT_NAME_LEN {
        return Err(LedgerError::InvalidName {
            reason: "cannot be longer than 100 characters",
        });
    }
    Ok(trimmed)
}

// ============================================================================
// ACCOUNT SUMMARY (presentation shape)
// ============================================================================

/// Account plus the figures derived from its ordered history.
#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    #[serde(flatten)]
    pub account: Account,

    pub current_balance: Decimal,

    pub total_yield: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_account(is_active: bool) -> Account {
        Account {
            id: 7,
            name: "Tesouro Selic".to_string(),
            is_active,
            version: 3,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_inactive_account_rejects_entries() {
        assert!(create_test_account(true).accepts_entries());
        assert!(!create_test_account(false).accepts_entries());
    }

    #[test]
    fn test_account_name_validation() {
        assert_eq!(validate_account_name("  Tesouro Selic ").unwrap(), "Tesouro Selic");
        assert!(validate_account_name("").is_err());
        assert!(validate_account_name(&"ç".repeat(100)).is_ok());
        assert!(validate_account_name(&"ç".repeat(101)).is_err());
    }

    #[test]
    fn test_summary_serializes_flat_without_internal_fields() {
        let summary = AccountSummary {
            account: create_test_account(true),
            current_balance: Decimal::new(12050, 2),
            total_yield: Decimal::new(550, 2),
        };

        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["id"], 7);
        assert_eq!(json["name"], "Tesouro Selic");
        assert_eq!(json["is_active"], true);
        assert_eq!(json["current_balance"], "120.50");
        assert_eq!(json["total_yield"], "5.50");
        assert!(json.get("version").is_none());
        assert!(json.get("created_at").is_none());
    }
}
