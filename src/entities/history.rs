// 📒 AccountHistory Entity - one ledger entry
//
// Entries are append-only. `end_balance` is the account balance AFTER the
// entry (raw column `value`), `operation_amount` is the delta it applied.
// Per account, entries are totally ordered by (date asc, id asc).
//
// External names follow the REST representation:
//   operation_amount → "value", end_balance → "end_value", entry_type → "type"

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ENTRY TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    /// Opening balance, written only by account creation
    #[serde(rename = "I")]
    Init,

    /// Interest / returns
    #[serde(rename = "R")]
    Yield,

    /// Money put into the account
    #[serde(rename = "A")]
    Contribution,

    /// Money taken out of the account
    #[serde(rename = "W")]
    Withdrawal,

    /// Closure marker, written only by close
    #[serde(rename = "E")]
    Closure,

    /// Reactivation marker, written only by reactivate
    #[serde(rename = "V")]
    Reactivation,
}

impl EntryType {
    pub const ALL: [EntryType; 6] = [
        EntryType::Init,
        EntryType::Yield,
        EntryType::Contribution,
        EntryType::Withdrawal,
        EntryType::Closure,
        EntryType::Reactivation,
    ];

    /// Single-letter code stored in the `type` column.
    pub fn code(&self) -> &'static str {
        match self {
            EntryType::Init => "I",
            EntryType::Yield => "R",
            EntryType::Contribution => "A",
            EntryType::Withdrawal => "W",
            EntryType::Closure => "E",
            EntryType::Reactivation => "V",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Init => "Init",
            EntryType::Yield => "Yield",
            EntryType::Contribution => "Contribution",
            EntryType::Withdrawal => "Withdrawal",
            EntryType::Closure => "Closure",
            EntryType::Reactivation => "Reactivation",
        }
    }

    pub fn from_code(code: &str) -> Option<EntryType> {
        EntryType::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Lifecycle markers are only ever produced by the ledger itself.
    pub fn is_system_generated(&self) -> bool {
        matches!(
            self,
            EntryType::Init | EntryType::Closure | EntryType::Reactivation
        )
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

impl FromStr for EntryType {
    type Err = String;

    /// Accepts either the stored code ("W") or the name ("withdrawal").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        EntryType::from_code(&trimmed.to_uppercase())
            .or_else(|| {
                EntryType::ALL
                    .into_iter()
                    .find(|t| t.as_str().eq_ignore_ascii_case(trimmed))
            })
            .ok_or_else(|| format!("unknown entry type: {}", s))
    }
}

// ============================================================================
// ACCOUNT HISTORY ENTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountHistory {
    pub id: i64,

    #[serde(rename = "account")]
    pub account_id: i64,

    /// Delta applied by this entry
    #[serde(rename = "value")]
    pub operation_amount: Decimal,

    /// Balance after this entry
    #[serde(rename = "end_value")]
    pub end_balance: Decimal,

    #[serde(rename = "type")]
    pub entry_type: EntryType,

    pub date: NaiveDate,

    pub description: Option<String>,
}

impl AccountHistory {
    /// Total ordering key within one account.
    pub fn order_key(&self) -> (NaiveDate, i64) {
        (self.date, self.id)
    }
}

/// Entry as presented in history listings: the row plus its windowed variation.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryView {
    #[serde(flatten)]
    pub entry: AccountHistory,

    pub account_name: String,

    /// end_balance minus the previous entry's end_balance (0 before the first)
    #[serde(rename = "monthly_variation")]
    pub variation: Decimal,
}

// ============================================================================
// WRITE / QUERY INPUTS
// ============================================================================

/// Proposed entry from a caller. `end_balance` is never accepted from outside.
#[derive(Debug, Clone, Deserialize)]
pub struct NewEntry {
    #[serde(rename = "account")]
    pub account_id: i64,

    #[serde(rename = "value")]
    pub operation_amount: Decimal,

    #[serde(rename = "type")]
    pub entry_type: EntryType,

    pub date: NaiveDate,

    #[serde(default)]
    pub description: Option<String>,
}

/// History listing filter (all fields optional, combined with AND).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryFilter {
    #[serde(default)]
    pub account: Option<i64>,

    #[serde(default, rename = "type")]
    pub entry_type: Option<EntryType>,

    #[serde(default)]
    pub date: Option<NaiveDate>,
}
