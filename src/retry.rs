// 🔁 Write transactions with bounded retry
//
// Every ledger write runs inside BEGIN IMMEDIATE: SQLite hands out the write
// lock before the first read, so validation and append see the same balance
// and no other writer can commit in between. Busy/locked errors and lost
// version races roll back and retry with exponential backoff.

use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::thread;
use tracing::{debug, warn};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};

/// Run `op` in an immediate transaction, committing on success.
///
/// A failing attempt is rolled back when its transaction drops, so nothing
/// from a failed attempt ever persists.
pub fn run_write<T, F>(
    conn: &mut Connection,
    config: &LedgerConfig,
    label: &str,
    mut op: F,
) -> LedgerResult<T>
where
    F: FnMut(&Transaction<'_>) -> LedgerResult<T>,
{
    let max_attempts = config.max_retries.max(1);
    let mut attempt = 1;

    loop {
        match attempt_write(conn, &mut op) {
            Ok(value) => {
                debug!(op = label, attempt, "write committed");
                return Ok(value);
            }
            Err(err) if err.is_transient() => {
                if attempt >= max_attempts {
                    warn!(op = label, attempts = attempt, error = %err, "giving up on contended write");
                    return Err(LedgerError::Contention { attempts: attempt });
                }
                let delay = config.retry_delay(attempt);
                warn!(op = label, attempt, ?delay, error = %err, "transient store error, retrying");
                thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn attempt_write<T, F>(conn: &mut Connection, op: &mut F) -> LedgerResult<T>
where
    F: FnMut(&Transaction<'_>) -> LedgerResult<T>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = op(&tx)?;
    tx.commit()?;
    Ok(value)
}
