// 🗄️ Ledger Store - SQLite + WAL
//
// Tables:
//   accounts         id, name, is_active, version, created_at
//   account_history  id, account_id → accounts ON DELETE CASCADE,
//                    value (end balance), operation_value (delta),
//                    date, type, description
//   events           audit trail, one row per ledger write
//
// Decimals are stored as exact decimal text, dates as YYYY-MM-DD so that
// text ordering is chronological ordering.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::balance::{self, ValidatedEntry};
use crate::entities::{Account, AccountHistory, EntryType, HistoryFilter, HistoryView};
use crate::error::{LedgerError, LedgerResult};

// ============================================================================
// CONNECTION & SCHEMA
// ============================================================================

/// Open a connection with WAL, foreign keys and a bounded busy wait.
pub fn open_connection(path: &Path, busy_timeout: Duration) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    configure_connection(&conn, busy_timeout)?;
    Ok(conn)
}

pub fn configure_connection(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    // WAL lets readers proceed while a writer holds the lock
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            version INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS account_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            value TEXT NOT NULL,
            operation_value TEXT NOT NULL DEFAULT '0',
            date TEXT NOT NULL,
            type TEXT NOT NULL CHECK (type IN ('I', 'R', 'A', 'W', 'E', 'V')),
            description TEXT
        );

        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        );

        -- (date, id) is the per-account ordering key
        CREATE INDEX IF NOT EXISTS idx_history_account_order
            ON account_history(account_id, date, id);
        CREATE INDEX IF NOT EXISTS idx_history_type ON account_history(type);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_history_single_init
            ON account_history(account_id) WHERE type = 'I';
        CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
        CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);",
    )
}

// ============================================================================
// COLUMN DECODING
// ============================================================================

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

/// Money columns are numeric(12, 2); anything else is a decoding failure.
fn parse_money(idx: usize, text: &str) -> rusqlite::Result<Decimal> {
    let value = Decimal::from_str(text).map_err(|e| conversion_error(idx, e))?;
    match balance::money_range_violation(value) {
        Some(reason) => Err(conversion_error(
            idx,
            std::io::Error::new(std::io::ErrorKind::InvalidData, format!("stored amount {value} {reason}")),
        )),
        None => Ok(value),
    }
}

fn decimal_col(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    parse_money(idx, &text)
}

fn date_col(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

fn entry_type_col(row: &Row, idx: usize) -> rusqlite::Result<EntryType> {
    let code: String = row.get(idx)?;
    EntryType::from_code(&code).ok_or_else(|| {
        conversion_error(
            idx,
            std::io::Error::new(std::io::ErrorKind::InvalidData, format!("unknown entry type {code}")),
        )
    })
}

fn timestamp_col(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn date_param(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

const ACCOUNT_COLUMNS: &str = "id, name, is_active, version, created_at";

fn account_from_row(row: &Row) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        name: row.get(1)?,
        is_active: row.get(2)?,
        version: row.get(3)?,
        created_at: timestamp_col(row, 4)?,
    })
}

const HISTORY_COLUMNS: &str = "id, account_id, operation_value, value, type, date, description";

fn history_from_row(row: &Row) -> rusqlite::Result<AccountHistory> {
    Ok(AccountHistory {
        id: row.get(0)?,
        account_id: row.get(1)?,
        operation_amount: decimal_col(row, 2)?,
        end_balance: decimal_col(row, 3)?,
        entry_type: entry_type_col(row, 4)?,
        date: date_col(row, 5)?,
        description: row.get(6)?,
    })
}

// ============================================================================
// ACCOUNTS
// ============================================================================

pub fn insert_account(conn: &Connection, name: &str, created_at: DateTime<Utc>) -> LedgerResult<Account> {
    conn.execute(
        "INSERT INTO accounts (name, is_active, version, created_at) VALUES (?1, 1, 1, ?2)",
        params![name, created_at.to_rfc3339()],
    )?;

    Ok(Account {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        is_active: true,
        version: 1,
        created_at,
    })
}

pub fn get_account(conn: &Connection, id: i64) -> LedgerResult<Option<Account>> {
    let account = conn
        .query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
            [id],
            account_from_row,
        )
        .optional()?;
    Ok(account)
}

/// Same as [`get_account`] but a missing row is an error.
pub fn require_account(conn: &Connection, id: i64) -> LedgerResult<Account> {
    get_account(conn, id)?.ok_or(LedgerError::NotFound {
        entity: "account",
        id,
    })
}

pub fn list_accounts(conn: &Connection, include_inactive: bool) -> LedgerResult<Vec<Account>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts
         WHERE is_active = 1 OR ?1
         ORDER BY id"
    ))?;

    let accounts = stmt
        .query_map([include_inactive], account_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(accounts)
}

pub fn rename_account(conn: &Connection, account_id: i64, name: &str) -> LedgerResult<()> {
    let updated = conn.execute("UPDATE accounts SET name = ?1 WHERE id = ?2", params![name, account_id])?;
    if updated == 0 {
        return Err(LedgerError::NotFound {
            entity: "account",
            id: account_id,
        });
    }
    Ok(())
}

/// Compare-and-set on the account version, optionally flipping `is_active`.
///
/// Zero affected rows means another writer committed in between.
pub fn advance_account_version(
    conn: &Connection,
    account_id: i64,
    expected_version: i64,
    is_active: bool,
) -> LedgerResult<i64> {
    let updated = conn.execute(
        "UPDATE accounts SET is_active = ?1, version = version + 1
         WHERE id = ?2 AND version = ?3",
        params![is_active, account_id, expected_version],
    )?;

    if updated == 0 {
        return Err(LedgerError::Conflict { account_id });
    }
    Ok(expected_version + 1)
}

/// Delete an account; history rows go with it (ON DELETE CASCADE).
pub fn delete_account(conn: &Connection, account_id: i64) -> LedgerResult<bool> {
    let deleted = conn.execute("DELETE FROM accounts WHERE id = ?1", [account_id])?;
    Ok(deleted > 0)
}

// ============================================================================
// HISTORY
// ============================================================================

pub fn insert_history_entry(conn: &Connection, entry: &ValidatedEntry) -> LedgerResult<AccountHistory> {
    conn.execute(
        "INSERT INTO account_history (account_id, value, operation_value, date, type, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.account_id,
            entry.end_balance.to_string(),
            entry.operation_amount.to_string(),
            date_param(entry.date),
            entry.entry_type.code(),
            entry.description,
        ],
    )
    .map_err(|e| LedgerError::from_insert(e, entry.account_id))?;

    Ok(AccountHistory {
        id: conn.last_insert_rowid(),
        account_id: entry.account_id,
        operation_amount: entry.operation_amount,
        end_balance: entry.end_balance,
        entry_type: entry.entry_type,
        date: entry.date,
        description: entry.description.clone(),
    })
}

/// One account's history in ledger order (date asc, id asc).
pub fn get_history_ordered(conn: &Connection, account_id: i64) -> LedgerResult<Vec<AccountHistory>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {HISTORY_COLUMNS} FROM account_history
         WHERE account_id = ?1
         ORDER BY date ASC, id ASC"
    ))?;

    let history = stmt
        .query_map([account_id], history_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(history)
}

/// Ordered history of every listed account in one scan, grouped by account.
pub fn history_by_account(
    conn: &Connection,
    include_inactive: bool,
) -> LedgerResult<HashMap<i64, Vec<AccountHistory>>> {
    let mut stmt = conn.prepare(
        "SELECT h.id, h.account_id, h.operation_value, h.value, h.type, h.date, h.description
         FROM account_history h
         JOIN accounts a ON a.id = h.account_id
         WHERE a.is_active = 1 OR ?1
         ORDER BY h.account_id, h.date ASC, h.id ASC",
    )?;

    let mut grouped: HashMap<i64, Vec<AccountHistory>> = HashMap::new();
    for entry in stmt.query_map([include_inactive], history_from_row)? {
        let entry = entry?;
        grouped.entry(entry.account_id).or_default().push(entry);
    }

    Ok(grouped)
}

/// Latest entry of one account, without scanning its history.
pub fn get_latest_entry(conn: &Connection, account_id: i64) -> LedgerResult<Option<AccountHistory>> {
    let entry = conn
        .query_row(
            &format!(
                "SELECT {HISTORY_COLUMNS} FROM account_history
                 WHERE account_id = ?1
                 ORDER BY date DESC, id DESC
                 LIMIT 1"
            ),
            [account_id],
            history_from_row,
        )
        .optional()?;
    Ok(entry)
}

/// History rows with the windowed variation column:
///
///   value - LAG(value, 1, 0) OVER (PARTITION BY account_id ORDER BY date, id)
///
/// The window is computed over the full partition before any filter, so a
/// filtered listing still reports variation against the true predecessor.
const WINDOWED_HISTORY: &str = "
    SELECT h.id, h.account_id, h.operation_value, h.value, h.type, h.date, h.description,
           a.name AS account_name,
           LAG(h.value, 1, '0') OVER (
               PARTITION BY h.account_id ORDER BY h.date ASC, h.id ASC
           ) AS previous_value
    FROM account_history h
    JOIN accounts a ON a.id = h.account_id";

fn history_view_from_row(row: &Row) -> rusqlite::Result<HistoryView> {
    let entry = history_from_row(row)?;
    let previous = decimal_col(row, 8)?;
    Ok(HistoryView {
        variation: entry.end_balance - previous,
        account_name: row.get(7)?,
        entry,
    })
}

/// Filtered history listing, newest first.
pub fn query_history(conn: &Connection, filter: &HistoryFilter) -> LedgerResult<Vec<HistoryView>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT * FROM ({WINDOWED_HISTORY}) w
         WHERE (?1 IS NULL OR w.account_id = ?1)
           AND (?2 IS NULL OR w.type = ?2)
           AND (?3 IS NULL OR w.date = ?3)
         ORDER BY w.date DESC, w.id DESC"
    ))?;

    let rows = stmt
        .query_map(
            params![
                filter.account,
                filter.entry_type.map(|t| t.code()),
                filter.date.map(date_param),
            ],
            history_view_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub fn get_history_entry(conn: &Connection, id: i64) -> LedgerResult<Option<HistoryView>> {
    let view = conn
        .query_row(
            &format!("SELECT * FROM ({WINDOWED_HISTORY}) w WHERE w.id = ?1"),
            [id],
            history_view_from_row,
        )
        .optional()?;
    Ok(view)
}

// ============================================================================
// LATEST PER ACCOUNT (bulk)
// ============================================================================

/// An account with the end balance of its latest entry (None = no history).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestBalance {
    pub account_id: i64,
    pub name: String,
    pub is_active: bool,
    pub end_balance: Option<Decimal>,
}

/// Latest entry per account in one statement (ROW_NUMBER per partition),
/// never one history scan per account.
pub fn latest_balances(conn: &Connection, active_only: bool) -> LedgerResult<Vec<LatestBalance>> {
    let mut stmt = conn.prepare_cached(
        "SELECT a.id, a.name, a.is_active, latest.value
         FROM accounts a
         LEFT JOIN (
             SELECT account_id, value,
                    ROW_NUMBER() OVER (
                        PARTITION BY account_id ORDER BY date DESC, id DESC
                    ) AS rn
             FROM account_history
         ) latest ON latest.account_id = a.id AND latest.rn = 1
         WHERE a.is_active = 1 OR NOT ?1
         ORDER BY a.id",
    )?;

    let rows = stmt
        .query_map([active_only], |row| {
            let value: Option<String> = row.get(3)?;
            let end_balance = value
                .map(|v| parse_money(3, &v))
                .transpose()?;
            Ok(LatestBalance {
                account_id: row.get(0)?,
                name: row.get(1)?,
                is_active: row.get(2)?,
                end_balance,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// Event for audit trail: every ledger write leaves one
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }

    /// Event about an account, keyed by its id.
    pub fn for_account(event_type: &str, account_id: i64, data: serde_json::Value, actor: &str) -> Self {
        Self::new(event_type, "account", &account_id.to_string(), data, actor)
    }
}

pub fn insert_event(conn: &Connection, event: &Event) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            event.data.to_string(),
            event.actor,
        ],
    )?;

    Ok(())
}

/// Events for one entity, oldest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> LedgerResult<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id ASC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: timestamp_col(row, 1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| conversion_error(5, e))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}
