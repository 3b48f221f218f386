// 📘 Ledger - account lifecycle controller
//
// All writes go through here. Each one is a single immediate transaction:
//
//   lock → load account + ordered history → validate → append entry
//        → compare-and-set account version (and is_active) → audit event
//
// so an entry and the flag flip it implies either both persist or neither
// does. Reads use plain statements and see the last committed state.

use chrono::{Local, NaiveDate, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregation::{self, WealthBreakdown};
use crate::balance::{self, ContinuityBreak, ValidatedEntry};
use crate::config::LedgerConfig;
use crate::db::{self, Event};
use crate::entities::{
    validate_account_name, Account, AccountHistory, AccountSummary, EntryType, HistoryFilter,
    HistoryView, NewEntry,
};
use crate::error::{LedgerError, LedgerResult};
use crate::retry::run_write;

const DEFAULT_ACTOR: &str = "ledger";

pub struct Ledger {
    conn: Connection,
    config: LedgerConfig,
    actor: String,
}

/// Result of re-checking one account's stored history.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub account_id: i64,
    pub entries: usize,
    pub balance: Decimal,
    pub breaks: Vec<ContinuityBreak>,
    /// `is_active` agrees with the latest Closure/Reactivation marker
    pub flag_consistent: bool,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.breaks.is_empty() && self.flag_consistent
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

impl Ledger {
    // ========================================================================
    // CONSTRUCTION
    // ========================================================================

    /// Open (and create if needed) the database named in `config`.
    pub fn open(config: &LedgerConfig) -> LedgerResult<Self> {
        let conn = db::open_connection(&config.database_path, config.busy_timeout())?;
        Self::from_connection(conn, config.clone())
    }

    pub fn open_in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory()?;
        let config = LedgerConfig::default();
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Self::from_connection(conn, config)
    }

    fn from_connection(conn: Connection, config: LedgerConfig) -> LedgerResult<Self> {
        db::setup_database(&conn)?;
        Ok(Ledger {
            conn,
            config,
            actor: DEFAULT_ACTOR.to_string(),
        })
    }

    /// Name recorded as the actor of audit events.
    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Create an active account. A positive initial balance becomes the
    /// account's single Init entry, written in the same transaction.
    pub fn open_account(&mut self, name: &str, initial_balance: Decimal) -> LedgerResult<Account> {
        let name = validate_account_name(name)?;
        if initial_balance < Decimal::ZERO {
            return Err(LedgerError::InvalidInitialBalance {
                amount: initial_balance,
            });
        }
        balance::check_money("initial_value", initial_balance)?;

        let actor = self.actor.clone();
        let account = run_write(&mut self.conn, &self.config, "open_account", |tx| {
            let account = db::insert_account(tx, name, Utc::now())?;

            if initial_balance > Decimal::ZERO {
                db::insert_history_entry(
                    tx,
                    &ValidatedEntry {
                        account_id: account.id,
                        operation_amount: initial_balance,
                        end_balance: initial_balance,
                        entry_type: EntryType::Init,
                        date: today(),
                        description: Some("Initial balance".to_string()),
                    },
                )?;
            }

            db::insert_event(
                tx,
                &Event::for_account(
                    "account_opened",
                    account.id,
                    serde_json::json!({
                        "name": account.name,
                        "initial_balance": initial_balance.to_string(),
                    }),
                    &actor,
                ),
            )?;
            Ok(account)
        })?;

        info!(account_id = account.id, name = %account.name, %initial_balance, "account opened");
        Ok(account)
    }

    /// Append a Yield, Contribution or Withdrawal entry.
    pub fn append_entry(&mut self, proposed: &NewEntry) -> LedgerResult<AccountHistory> {
        let actor = self.actor.clone();
        let entry = run_write(&mut self.conn, &self.config, "append_entry", |tx| {
            let account = db::require_account(tx, proposed.account_id)?;
            let history = db::get_history_ordered(tx, account.id)?;

            let validated = balance::validate_proposed_entry(&account, &history, proposed)?;
            balance::check_entry_date(account.id, &history, validated.date)?;

            let entry = db::insert_history_entry(tx, &validated)?;
            verify_appended(tx, &history, &entry)?;
            db::advance_account_version(tx, account.id, account.version, true)?;

            db::insert_event(
                tx,
                &Event::for_account(
                    "entry_appended",
                    account.id,
                    serde_json::json!({
                        "entry_id": entry.id,
                        "type": entry.entry_type.code(),
                        "value": entry.operation_amount.to_string(),
                        "end_value": entry.end_balance.to_string(),
                    }),
                    &actor,
                ),
            )?;
            Ok(entry)
        })?;

        info!(
            account_id = entry.account_id,
            entry_id = entry.id,
            entry_type = entry.entry_type.as_str(),
            amount = %entry.operation_amount,
            end_balance = %entry.end_balance,
            "entry appended"
        );
        Ok(entry)
    }

    /// Close an account whose balance is exactly zero.
    pub fn close_account(&mut self, account_id: i64) -> LedgerResult<AccountHistory> {
        let actor = self.actor.clone();
        let entry = run_write(&mut self.conn, &self.config, "close_account", |tx| {
            let account = db::require_account(tx, account_id)?;
            if !account.is_active {
                return Err(LedgerError::AccountAlreadyClosed { account_id });
            }

            let history = db::get_history_ordered(tx, account_id)?;
            let current = balance::current_balance(&history);
            if !current.is_zero() {
                return Err(LedgerError::NonZeroBalance {
                    account_id,
                    balance: current,
                });
            }

            let entry = db::insert_history_entry(
                tx,
                &ValidatedEntry {
                    account_id,
                    operation_amount: Decimal::ZERO,
                    end_balance: Decimal::ZERO,
                    entry_type: EntryType::Closure,
                    date: balance::marker_date(&history, today()),
                    description: Some("Account closed".to_string()),
                },
            )?;
            verify_appended(tx, &history, &entry)?;
            db::advance_account_version(tx, account_id, account.version, false)?;

            db::insert_event(
                tx,
                &Event::for_account(
                    "account_closed",
                    account_id,
                    serde_json::json!({ "entry_id": entry.id }),
                    &actor,
                ),
            )?;
            Ok(entry)
        })?;

        info!(account_id, entry_id = entry.id, "account closed");
        Ok(entry)
    }

    /// Reactivate a closed account. The balance is carried over unchanged.
    pub fn reactivate_account(&mut self, account_id: i64) -> LedgerResult<AccountHistory> {
        let actor = self.actor.clone();
        let entry = run_write(&mut self.conn, &self.config, "reactivate_account", |tx| {
            let account = db::require_account(tx, account_id)?;
            if account.is_active {
                return Err(LedgerError::AccountAlreadyActive { account_id });
            }

            let history = db::get_history_ordered(tx, account_id)?;
            let entry = db::insert_history_entry(
                tx,
                &ValidatedEntry {
                    account_id,
                    operation_amount: Decimal::ZERO,
                    end_balance: balance::current_balance(&history),
                    entry_type: EntryType::Reactivation,
                    date: balance::marker_date(&history, today()),
                    description: Some("Account reactivated".to_string()),
                },
            )?;
            verify_appended(tx, &history, &entry)?;
            db::advance_account_version(tx, account_id, account.version, true)?;

            db::insert_event(
                tx,
                &Event::for_account(
                    "account_reactivated",
                    account_id,
                    serde_json::json!({ "entry_id": entry.id }),
                    &actor,
                ),
            )?;
            Ok(entry)
        })?;

        info!(account_id, entry_id = entry.id, "account reactivated");
        Ok(entry)
    }

    /// Rename an account. Lifecycle state and history are untouched.
    pub fn rename_account(&mut self, account_id: i64, name: &str) -> LedgerResult<Account> {
        let name = validate_account_name(name)?;

        let actor = self.actor.clone();
        let account = run_write(&mut self.conn, &self.config, "rename_account", |tx| {
            let account = db::require_account(tx, account_id)?;
            db::rename_account(tx, account_id, name)?;
            let version = db::advance_account_version(tx, account_id, account.version, account.is_active)?;

            db::insert_event(
                tx,
                &Event::for_account(
                    "account_renamed",
                    account_id,
                    serde_json::json!({ "from": account.name, "to": name }),
                    &actor,
                ),
            )?;
            Ok(Account {
                name: name.to_string(),
                version,
                ..account
            })
        })?;

        info!(account_id, name = %account.name, "account renamed");
        Ok(account)
    }

    /// Administrative delete. Takes the same write lock as appends, so it can
    /// never interleave with an in-flight append to the same account.
    pub fn delete_account(&mut self, account_id: i64) -> LedgerResult<()> {
        let actor = self.actor.clone();
        run_write(&mut self.conn, &self.config, "delete_account", |tx| {
            let account = db::require_account(tx, account_id)?;
            let entries = db::get_history_ordered(tx, account_id)?.len();
            db::delete_account(tx, account_id)?;

            db::insert_event(
                tx,
                &Event::for_account(
                    "account_deleted",
                    account_id,
                    serde_json::json!({ "name": account.name, "entries": entries }),
                    &actor,
                ),
            )?;
            Ok(())
        })?;

        info!(account_id, "account deleted");
        Ok(())
    }

    // ========================================================================
    // READS
    // ========================================================================

    pub fn account(&self, account_id: i64) -> LedgerResult<Account> {
        db::require_account(&self.conn, account_id)
    }

    /// Ledger-ordered history of one account.
    pub fn history_of(&self, account_id: i64) -> LedgerResult<Vec<AccountHistory>> {
        db::require_account(&self.conn, account_id)?;
        db::get_history_ordered(&self.conn, account_id)
    }

    pub fn current_balance(&self, account_id: i64) -> LedgerResult<Decimal> {
        db::require_account(&self.conn, account_id)?;
        Ok(db::get_latest_entry(&self.conn, account_id)?
            .map(|entry| entry.end_balance)
            .unwrap_or(Decimal::ZERO))
    }

    pub fn account_summary(&self, account_id: i64) -> LedgerResult<AccountSummary> {
        let account = db::require_account(&self.conn, account_id)?;
        let history = db::get_history_ordered(&self.conn, account_id)?;
        Ok(summarize(account, &history))
    }

    /// Accounts with balance and yield, from one history scan for all of them.
    pub fn list_accounts(&self, include_inactive: bool) -> LedgerResult<Vec<AccountSummary>> {
        let accounts = db::list_accounts(&self.conn, include_inactive)?;
        let mut histories = db::history_by_account(&self.conn, include_inactive)?;
        debug!(accounts = accounts.len(), "listing accounts");

        Ok(accounts
            .into_iter()
            .map(|account| {
                let history = histories.remove(&account.id).unwrap_or_default();
                summarize(account, &history)
            })
            .collect())
    }

    pub fn history(&self, filter: &HistoryFilter) -> LedgerResult<Vec<HistoryView>> {
        db::query_history(&self.conn, filter)
    }

    pub fn history_entry(&self, entry_id: i64) -> LedgerResult<HistoryView> {
        db::get_history_entry(&self.conn, entry_id)?.ok_or(LedgerError::NotFound {
            entity: "account history entry",
            id: entry_id,
        })
    }

    pub fn total_wealth(&self) -> LedgerResult<Decimal> {
        let latest = db::latest_balances(&self.conn, true)?;
        Ok(aggregation::total_wealth(&latest))
    }

    pub fn wealth_breakdown(&self) -> LedgerResult<WealthBreakdown> {
        let latest = db::latest_balances(&self.conn, true)?;
        Ok(aggregation::wealth_breakdown(latest))
    }

    pub fn events(&self, account_id: i64) -> LedgerResult<Vec<Event>> {
        db::get_events_for_entity(&self.conn, "account", &account_id.to_string())
    }

    /// Re-check continuity of the whole stored history and that `is_active`
    /// agrees with the lifecycle markers.
    pub fn audit_account(&self, account_id: i64) -> LedgerResult<AuditReport> {
        let account = db::require_account(&self.conn, account_id)?;
        let history = db::get_history_ordered(&self.conn, account_id)?;

        let breaks = balance::verify_continuity(&history).err().unwrap_or_default();
        let derived_active = history
            .iter()
            .rev()
            .find(|entry| matches!(entry.entry_type, EntryType::Closure | EntryType::Reactivation))
            .map(|entry| entry.entry_type == EntryType::Reactivation)
            .unwrap_or(true);

        Ok(AuditReport {
            account_id,
            entries: history.len(),
            balance: balance::current_balance(&history),
            breaks,
            flag_consistent: derived_active == account.is_active,
        })
    }
}

fn summarize(account: Account, history: &[AccountHistory]) -> AccountSummary {
    AccountSummary {
        current_balance: balance::current_balance(history),
        total_yield: balance::total_yield(history),
        account,
    }
}

/// The stored row must now be the account's latest entry, chained onto the
/// previous latest one.
fn verify_appended(
    conn: &Connection,
    previous: &[AccountHistory],
    appended: &AccountHistory,
) -> LedgerResult<()> {
    let latest = db::get_latest_entry(conn, appended.account_id)?
        .ok_or_else(|| LedgerError::Corrupt(format!("entry {} vanished after insert", appended.id)))?;

    if latest.id != appended.id {
        return Err(LedgerError::Corrupt(format!(
            "entry {} is not the latest entry of account {}",
            appended.id, appended.account_id
        )));
    }

    let expected = balance::current_balance(previous)
        .checked_add(latest.operation_amount)
        .ok_or_else(|| LedgerError::Corrupt(format!("entry {} overflows its predecessor", latest.id)))?;
    if latest.end_balance != expected {
        return Err(LedgerError::Corrupt(format!(
            "entry {} ends at {} but predecessor + delta is {}",
            latest.id, latest.end_balance, expected
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ledger() -> Ledger {
        Ledger::open_in_memory().unwrap().with_actor("test")
    }

    fn entry(account_id: i64, entry_type: EntryType, amount: Decimal) -> NewEntry {
        NewEntry {
            account_id,
            operation_amount: amount,
            entry_type,
            date: today(),
            description: None,
        }
    }

    #[test]
    fn test_open_account_with_initial_balance() {
        let mut ledger = ledger();
        let before = today();
        let account = ledger.open_account("CDB", dec!(100)).unwrap();
        let after = today();

        assert!(account.is_active);
        let history = ledger.history_of(account.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].entry_type, EntryType::Init);
        assert_eq!(history[0].operation_amount, dec!(100));
        assert_eq!(history[0].end_balance, dec!(100));
        assert!(before <= history[0].date && history[0].date <= after);
    }

    #[test]
    fn test_open_account_without_initial_balance_has_no_history() {
        let mut ledger = ledger();
        let account = ledger.open_account("Empty", Decimal::ZERO).unwrap();

        assert!(ledger.history_of(account.id).unwrap().is_empty());
        assert_eq!(ledger.current_balance(account.id).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_open_account_rejects_negative_initial_balance() {
        let mut ledger = ledger();
        let err = ledger.open_account("Bad", dec!(-1)).unwrap_err();

        assert!(matches!(err, LedgerError::InvalidInitialBalance { .. }));
        assert!(ledger.list_accounts(true).unwrap().is_empty());
    }

    #[test]
    fn test_open_account_rejects_out_of_range_initial_balance() {
        let mut ledger = ledger();

        for amount in [dec!(0.001), dec!(10000000000), Decimal::MAX] {
            let err = ledger.open_account("Bad", amount).unwrap_err();
            assert!(matches!(err, LedgerError::AmountOutOfRange { field: "initial_value", .. }));
        }
        assert!(ledger.list_accounts(true).unwrap().is_empty());
    }

    #[test]
    fn test_open_account_validates_name() {
        let mut ledger = ledger();

        assert!(matches!(ledger.open_account("   ", dec!(1)), Err(LedgerError::InvalidName { .. })));
        assert!(matches!(
            ledger.open_account(&"x".repeat(101), dec!(1)),
            Err(LedgerError::InvalidName { .. })
        ));
        assert_eq!(ledger.open_account("  CDB  ", dec!(1)).unwrap().name, "CDB");
    }

    #[test]
    fn test_overflowing_append_is_rejected_without_panic() {
        let mut ledger = ledger();
        let account = ledger.open_account("A", dec!(1)).unwrap();

        let err = ledger
            .append_entry(&entry(account.id, EntryType::Contribution, Decimal::MAX))
            .unwrap_err();
        assert!(matches!(err, LedgerError::AmountOutOfRange { field: "value", .. }));

        let err = ledger
            .append_entry(&entry(account.id, EntryType::Yield, dec!(0.000001)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::AmountOutOfRange { .. }));

        assert_eq!(ledger.current_balance(account.id).unwrap(), dec!(1));
        assert_eq!(ledger.history_of(account.id).unwrap().len(), 1);
    }

    #[test]
    fn test_rename_account_bumps_version_and_is_audited() {
        let mut ledger = ledger();
        let account = ledger.open_account("CDB", dec!(10)).unwrap();

        let renamed = ledger.rename_account(account.id, "CDB Banco X").unwrap();
        assert_eq!(renamed.name, "CDB Banco X");
        assert_eq!(renamed.version, account.version + 1);
        assert!(renamed.is_active);
        assert_eq!(ledger.account(account.id).unwrap(), renamed);
        assert_eq!(ledger.history_of(account.id).unwrap().len(), 1);

        let events = ledger.events(account.id).unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.event_type, "account_renamed");
        assert_eq!(last.data["from"], "CDB");
        assert_eq!(last.data["to"], "CDB Banco X");

        assert!(matches!(ledger.rename_account(account.id, ""), Err(LedgerError::InvalidName { .. })));
        assert!(matches!(ledger.rename_account(999, "X"), Err(LedgerError::NotFound { .. })));
    }

    #[test]
    fn test_second_init_is_forbidden() {
        let mut ledger = ledger();
        let account = ledger.open_account("CDB", dec!(100)).unwrap();

        let err = ledger
            .append_entry(&entry(account.id, EntryType::Init, dec!(50)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::ForbiddenType { .. }));
        assert_eq!(ledger.history_of(account.id).unwrap().len(), 1);
    }

    #[test]
    fn test_append_derives_end_balance_and_bumps_version() {
        let mut ledger = ledger();
        let account = ledger.open_account("CDB", dec!(100)).unwrap();

        let withdrawal = ledger
            .append_entry(&entry(account.id, EntryType::Withdrawal, dec!(-50)))
            .unwrap();
        assert_eq!(withdrawal.end_balance, dec!(50));

        let reloaded = ledger.account(account.id).unwrap();
        assert_eq!(reloaded.version, account.version + 1);
        assert_eq!(ledger.current_balance(account.id).unwrap(), dec!(50));
    }

    #[test]
    fn test_insufficient_balance_leaves_history_untouched() {
        let mut ledger = ledger();
        let account = ledger.open_account("CDB", dec!(20)).unwrap();

        let err = ledger
            .append_entry(&entry(account.id, EntryType::Withdrawal, dec!(-30)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(ledger.history_of(account.id).unwrap().len(), 1);
        assert_eq!(ledger.account(account.id).unwrap().version, 1);
    }

    #[test]
    fn test_backdated_append_rejected() {
        let mut ledger = ledger();
        let account = ledger.open_account("CDB", dec!(100)).unwrap();

        let mut backdated = entry(account.id, EntryType::Yield, dec!(1));
        backdated.date = today() - chrono::Duration::days(1);

        let err = ledger.append_entry(&backdated).unwrap_err();
        assert!(matches!(err, LedgerError::OutOfOrderDate { .. }));
    }

    #[test]
    fn test_append_to_missing_account_is_not_found() {
        let mut ledger = ledger();
        let err = ledger
            .append_entry(&entry(99, EntryType::Contribution, dec!(1)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { id: 99, .. }));
    }

    #[test]
    fn test_close_and_reactivate_round_trip() {
        let mut ledger = ledger();
        let account = ledger.open_account("Poupança", dec!(100)).unwrap();

        ledger
            .append_entry(&entry(account.id, EntryType::Withdrawal, dec!(-100)))
            .unwrap();

        let closure = ledger.close_account(account.id).unwrap();
        assert_eq!(closure.entry_type, EntryType::Closure);
        assert_eq!(closure.operation_amount, Decimal::ZERO);
        assert_eq!(closure.end_balance, Decimal::ZERO);
        assert!(!ledger.account(account.id).unwrap().is_active);

        let err = ledger
            .append_entry(&entry(account.id, EntryType::Contribution, dec!(10)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InactiveAccount { .. }));

        let err = ledger.close_account(account.id).unwrap_err();
        assert!(matches!(err, LedgerError::AccountAlreadyClosed { .. }));

        let reactivation = ledger.reactivate_account(account.id).unwrap();
        assert_eq!(reactivation.entry_type, EntryType::Reactivation);
        assert_eq!(reactivation.operation_amount, Decimal::ZERO);
        assert!(ledger.account(account.id).unwrap().is_active);
        assert_eq!(ledger.current_balance(account.id).unwrap(), Decimal::ZERO);

        let err = ledger.reactivate_account(account.id).unwrap_err();
        assert!(matches!(err, LedgerError::AccountAlreadyActive { .. }));

        assert!(ledger.audit_account(account.id).unwrap().is_clean());
    }

    #[test]
    fn test_close_requires_zero_balance() {
        let mut ledger = ledger();
        let account = ledger.open_account("CDB", dec!(100)).unwrap();
        ledger
            .append_entry(&entry(account.id, EntryType::Withdrawal, dec!(-60)))
            .unwrap();

        let err = ledger.close_account(account.id).unwrap_err();
        match err {
            LedgerError::NonZeroBalance { balance, .. } => assert_eq!(balance, dec!(40)),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(ledger.account(account.id).unwrap().is_active);
    }

    #[test]
    fn test_account_without_history_can_close() {
        let mut ledger = ledger();
        let account = ledger.open_account("Empty", Decimal::ZERO).unwrap();

        ledger.close_account(account.id).unwrap();
        assert!(!ledger.account(account.id).unwrap().is_active);
    }

    #[test]
    fn test_summaries_and_total_wealth() {
        let mut ledger = ledger();
        let a = ledger.open_account("A", dec!(100)).unwrap();
        let b = ledger.open_account("B", Decimal::ZERO).unwrap();
        let c = ledger.open_account("C", dec!(200)).unwrap();
        let d = ledger.open_account("D", dec!(500)).unwrap();

        ledger.append_entry(&entry(c.id, EntryType::Yield, dec!(50))).unwrap();
        ledger.append_entry(&entry(d.id, EntryType::Withdrawal, dec!(-500))).unwrap();
        ledger.close_account(d.id).unwrap();
        ledger.append_entry(&entry(b.id, EntryType::Contribution, dec!(30))).unwrap();
        ledger.append_entry(&entry(b.id, EntryType::Withdrawal, dec!(-30))).unwrap();

        assert_eq!(ledger.total_wealth().unwrap(), dec!(350));

        let summaries = ledger.list_accounts(false).unwrap();
        let ids: Vec<i64> = summaries.iter().map(|s| s.account.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
        assert_eq!(summaries[2].current_balance, dec!(250));
        assert_eq!(summaries[2].total_yield, dec!(50));

        assert_eq!(ledger.list_accounts(true).unwrap().len(), 4);
        assert_eq!(ledger.wealth_breakdown().unwrap().accounts.len(), 3);
    }

    #[test]
    fn test_history_listing_newest_first_with_variation() {
        let mut ledger = ledger();
        let account = ledger.open_account("CDB", dec!(100)).unwrap();
        ledger.append_entry(&entry(account.id, EntryType::Yield, dec!(5))).unwrap();
        ledger.append_entry(&entry(account.id, EntryType::Withdrawal, dec!(-30))).unwrap();

        let rows = ledger
            .history(&HistoryFilter {
                account: Some(account.id),
                ..Default::default()
            })
            .unwrap();
        let variations: Vec<Decimal> = rows.iter().map(|r| r.variation).collect();
        assert_eq!(variations, vec![dec!(-30), dec!(5), dec!(100)]);

        let single = ledger.history_entry(rows[1].entry.id).unwrap();
        assert_eq!(single.entry.entry_type, EntryType::Yield);
        assert!(matches!(ledger.history_entry(999), Err(LedgerError::NotFound { .. })));
    }

    #[test]
    fn test_delete_account_removes_history_and_logs_event() {
        let mut ledger = ledger();
        let account = ledger.open_account("CDB", dec!(100)).unwrap();

        ledger.delete_account(account.id).unwrap();
        assert!(matches!(ledger.account(account.id), Err(LedgerError::NotFound { .. })));
        assert!(ledger.history(&HistoryFilter::default()).unwrap().is_empty());

        let events: Vec<String> = ledger
            .events(account.id)
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(events, vec!["account_opened", "account_deleted"]);

        assert!(matches!(ledger.delete_account(account.id), Err(LedgerError::NotFound { .. })));
    }

    #[test]
    fn test_every_write_is_audited() {
        let mut ledger = ledger();
        let account = ledger.open_account("CDB", dec!(10)).unwrap();
        ledger.append_entry(&entry(account.id, EntryType::Withdrawal, dec!(-10))).unwrap();
        ledger.close_account(account.id).unwrap();
        ledger.reactivate_account(account.id).unwrap();

        let events = ledger.events(account.id).unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            kinds,
            vec!["account_opened", "entry_appended", "account_closed", "account_reactivated"]
        );
        assert!(events.iter().all(|e| e.actor == "test"));
    }

    #[test]
    fn test_audit_detects_tampered_rows() {
        let mut ledger = ledger();
        let account = ledger.open_account("CDB", dec!(100)).unwrap();
        ledger.append_entry(&entry(account.id, EntryType::Yield, dec!(5))).unwrap();

        // Administrative edit outside the ledger
        ledger
            .connection()
            .execute("UPDATE account_history SET value = '999' WHERE type = 'R'", [])
            .unwrap();
        ledger
            .connection()
            .execute("UPDATE accounts SET is_active = 0", [])
            .unwrap();

        let report = ledger.audit_account(account.id).unwrap();
        assert_eq!(report.breaks.len(), 1);
        assert!(!report.flag_consistent);
        assert!(!report.is_clean());
    }
}
