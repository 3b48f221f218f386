// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::fs::File;
use std::io;
use std::path::PathBuf;

use wealth_ledger::export::write_history_csv;
use wealth_ledger::{EntryType, HistoryFilter, Ledger, LedgerConfig, NewEntry};

#[derive(Parser)]
#[command(name = "wealth-ledger", version, about = "Personal account balance ledger")]
struct Cli {
    /// Database file (overrides LEDGER_DB and the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open a new account
    Open {
        name: String,
        /// Opening balance, recorded as the Init entry
        #[arg(long, default_value = "0")]
        initial: Decimal,
    },
    /// Append a yield (R), contribution (A) or withdrawal (W)
    Append {
        account: i64,
        #[arg(value_name = "TYPE")]
        entry_type: EntryType,
        /// Signed amount: negative for withdrawals
        #[arg(allow_negative_numbers = true)]
        value: Decimal,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Close an account (balance must be zero)
    Close { account: i64 },
    /// Reactivate a closed account
    Reactivate { account: i64 },
    /// Rename an account
    Rename { account: i64, name: String },
    /// Delete an account and its history
    Delete { account: i64 },
    /// List accounts with balance and total yield
    Accounts {
        /// Include closed accounts
        #[arg(long)]
        all: bool,
    },
    /// List history entries, newest first
    History {
        #[arg(long)]
        account: Option<i64>,
        #[arg(long = "type")]
        entry_type: Option<EntryType>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Total wealth across active accounts
    Wealth,
    /// Re-check an account's stored history
    Audit { account: i64 },
    /// Export history to CSV (stdout unless --output)
    Export {
        #[arg(long)]
        account: Option<i64>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Interactive terminal dashboard
    Ui,
}

fn main() -> Result<()> {
    wealth_ledger::init_tracing();

    let cli = Cli::parse();
    let mut config = LedgerConfig::load()?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    let mut ledger = Ledger::open(&config)
        .with_context(|| format!("Failed to open ledger at {}", config.database_path.display()))?
        .with_actor("cli");

    match cli.command {
        Command::Open { name, initial } => {
            let account = ledger.open_account(&name, initial)?;
            println!("✓ Opened account #{} \"{}\" with balance {:.2}", account.id, account.name, initial);
        }
        Command::Append {
            account,
            entry_type,
            value,
            date,
            description,
        } => {
            let entry = ledger.append_entry(&NewEntry {
                account_id: account,
                operation_amount: value,
                entry_type,
                date: date.unwrap_or_else(|| Local::now().date_naive()),
                description,
            })?;
            println!(
                "✓ Entry #{} {} {} → balance {:.2}",
                entry.id,
                entry.entry_type.as_str(),
                entry.operation_amount,
                entry.end_balance
            );
        }
        Command::Close { account } => {
            ledger.close_account(account)?;
            println!("✓ Account #{} closed", account);
        }
        Command::Reactivate { account } => {
            ledger.reactivate_account(account)?;
            println!("✓ Account #{} reactivated", account);
        }
        Command::Rename { account, name } => {
            let renamed = ledger.rename_account(account, &name)?;
            println!("✓ Account #{} renamed to \"{}\"", renamed.id, renamed.name);
        }
        Command::Delete { account } => {
            ledger.delete_account(account)?;
            println!("✓ Account #{} deleted", account);
        }
        Command::Accounts { all } => print_accounts(&ledger, all)?,
        Command::History {
            account,
            entry_type,
            date,
        } => {
            let rows = ledger.history(&HistoryFilter {
                account,
                entry_type,
                date,
            })?;
            println!("{:>6}  {:<10}  {:<20}  {:<13}  {:>12}  {:>12}  {:>12}", "ID", "DATE", "ACCOUNT", "TYPE", "VALUE", "END VALUE", "VARIATION");
            for row in &rows {
                println!(
                    "{:>6}  {}  {:<20}  {:<13}  {:>12.2}  {:>12.2}  {:>12.2}",
                    row.entry.id,
                    row.entry.date,
                    truncate(&row.account_name, 20),
                    row.entry.entry_type.as_str(),
                    row.entry.operation_amount,
                    row.entry.end_balance,
                    row.variation
                );
            }
            println!("{} entries", rows.len());
        }
        Command::Wealth => {
            let breakdown = ledger.wealth_breakdown()?;
            for row in &breakdown.accounts {
                println!(
                    "  #{:<4} {:<24} {:>14.2}",
                    row.account_id,
                    truncate(&row.name, 24),
                    row.end_balance.unwrap_or(Decimal::ZERO)
                );
            }
            println!("💰 Total wealth: {:.2}", breakdown.total_wealth);
        }
        Command::Audit { account } => {
            let report = ledger.audit_account(account)?;
            println!("🔍 Account #{}: {} entries, balance {:.2}", report.account_id, report.entries, report.balance);
            for b in &report.breaks {
                match b.expected {
                    Some(expected) => println!("   ✗ entry #{} ends at {} (expected {})", b.entry_id, b.actual, expected),
                    None => println!("   ✗ entry #{} ends at {} (predecessor + value overflows)", b.entry_id, b.actual),
                }
            }
            if !report.flag_consistent {
                println!("   ✗ is_active disagrees with the latest closure/reactivation entry");
            }
            if report.is_clean() {
                println!("   ✓ history is consistent");
            } else {
                std::process::exit(2);
            }
        }
        Command::Export { account, output } => {
            let rows = ledger.history(&HistoryFilter {
                account,
                ..Default::default()
            })?;
            let written = match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    write_history_csv(file, &rows)?
                }
                None => write_history_csv(io::stdout().lock(), &rows)?,
            };
            eprintln!("✓ Exported {} entries", written);
        }
        Command::Ui => run_ui_mode(&ledger)?,
    }

    Ok(())
}

fn print_accounts(ledger: &Ledger, include_inactive: bool) -> Result<()> {
    let summaries = ledger.list_accounts(include_inactive)?;

    println!("{:>4}  {:<24}  {:<8}  {:>14}  {:>12}", "ID", "NAME", "STATUS", "BALANCE", "YIELD");
    for s in &summaries {
        println!(
            "{:>4}  {:<24}  {:<8}  {:>14.2}  {:>12.2}",
            s.account.id,
            truncate(&s.account.name, 24),
            if s.account.is_active { "active" } else { "closed" },
            s.current_balance,
            s.total_yield
        );
    }
    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(feature = "tui")]
fn run_ui_mode(ledger: &Ledger) -> Result<()> {
    let accounts = ledger.list_accounts(true)?;
    let history = ledger.history(&HistoryFilter::default())?;
    let total_wealth = ledger.total_wealth()?;

    let mut app = ui::App::new(accounts, history, total_wealth);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_ledger: &Ledger) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin ledger-server --features server");
    std::process::exit(1);
}
