// Wealth Ledger - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod aggregation; // Total wealth over latest balances
pub mod balance;     // Balance engine: pure rules over ordered history
pub mod config;
pub mod db;          // Ledger store: SQLite + WAL
pub mod entities;
pub mod error;
pub mod export;      // CSV export
pub mod ledger;      // Lifecycle controller: every write goes through here
pub mod retry;

// Re-export commonly used types
pub use aggregation::{total_wealth, wealth_breakdown, WealthBreakdown};
pub use balance::{
    compute_variation, current_balance, total_yield, validate_proposed_entry, verify_continuity,
    ContinuityBreak, ValidatedEntry,
};
pub use config::LedgerConfig;
pub use db::{Event, LatestBalance};
pub use entities::{
    Account, AccountHistory, AccountSummary, EntryType, HistoryFilter, HistoryView, NewEntry,
};
pub use error::{LedgerError, LedgerResult};
pub use ledger::{AuditReport, Ledger};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the tracing subscriber used by the binaries (`RUST_LOG`, default info).
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
