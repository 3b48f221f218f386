// ⚙️ Configuration
// Defaults → optional TOML file → environment overrides.
//
//   LEDGER_CONFIG  path to a TOML file (optional)
//   LEDGER_DB      database path
//   LEDGER_ADDR    server listen address

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Address the REST server binds to
    pub listen_addr: String,

    /// How long a connection waits on a locked database before SQLITE_BUSY
    pub busy_timeout_ms: u64,

    /// Attempts for a write hitting transient contention
    pub max_retries: u32,

    /// First backoff delay, doubled on each retry
    pub retry_base_delay_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            database_path: PathBuf::from("ledger.db"),
            listen_addr: "0.0.0.0:3000".to_string(),
            busy_timeout_ms: 5_000,
            max_retries: 5,
            retry_base_delay_ms: 20,
        }
    }
}

impl LedgerConfig {
    /// Load from `LEDGER_CONFIG` (if set) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os("LEDGER_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Environment values win over file values.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup("LEDGER_DB") {
            self.database_path = PathBuf::from(db);
        }
        if let Some(addr) = lookup("LEDGER_ADDR") {
            self.listen_addr = addr;
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Backoff before retry `attempt` (1-based): base * 2^(attempt-1).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(10);
        Duration::from_millis(self.retry_base_delay_ms.saturating_mul(factor))
    }
}
