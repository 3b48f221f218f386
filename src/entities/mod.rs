// Entity Models
//
// Account: identity + cached lifecycle flag
// AccountHistory: append-only ledger entries, owned by one account

pub mod account;
pub mod history;

pub use account::{validate_account_name, Account, AccountSummary, MAX_ACCOUNT_NAME_LEN};
pub use history::{AccountHistory, EntryType, HistoryFilter, HistoryView, NewEntry};
