//! Handles settings for the application. Configuration is written in
//! `settings.toml` and can be overridden with `ORCAMENTO__<SECTION>__<KEY>`
//! environment variables.
use std::time::Duration;

use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use engine::{TxBudget, TxBudgets};
use serde::Deserialize;
use sof_client::{DEFAULT_BASE_URL, RetryPolicy};

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct App {
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
    Url(String),
}

impl Default for Database {
    fn default() -> Self {
        Self::Sqlite("./orcamento.db".to_string())
    }
}

impl Database {
    pub fn url(&self) -> String {
        match self {
            Database::Memory => String::from("sqlite::memory:"),
            Database::Sqlite(path) => format!("sqlite:{path}?mode=rwc"),
            Database::Url(url) => url.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Sof {
    pub base_url: String,
    pub timeout_secs: u64,
    pub retry_limit: usize,
    pub backoff_ms: u64,
}

impl Default for Sof {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            retry_limit: 2,
            backoff_ms: 500,
        }
    }
}

impl Sof {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            limit: self.retry_limit,
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Transactions {
    pub allocation_max_wait_ms: u64,
    pub allocation_timeout_ms: u64,
    pub reconcile_max_wait_ms: u64,
    pub reconcile_timeout_ms: u64,
}

impl Default for Transactions {
    fn default() -> Self {
        let ms = |d: Duration| u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
        Self {
            allocation_max_wait_ms: ms(TxBudget::ALLOCATIONS.max_wait),
            allocation_timeout_ms: ms(TxBudget::ALLOCATIONS.timeout),
            reconcile_max_wait_ms: ms(TxBudget::RECONCILIATION.max_wait),
            reconcile_timeout_ms: ms(TxBudget::RECONCILIATION.timeout),
        }
    }
}

impl Transactions {
    pub fn budgets(&self) -> TxBudgets {
        TxBudgets {
            allocations: TxBudget::new(
                Duration::from_millis(self.allocation_max_wait_ms),
                Duration::from_millis(self.allocation_timeout_ms),
            ),
            reconciliation: TxBudget::new(
                Duration::from_millis(self.reconcile_max_wait_ms),
                Duration::from_millis(self.reconcile_timeout_ms),
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Period {
    pub timezone: String,
}

impl Default for Period {
    fn default() -> Self {
        Self {
            timezone: "America/Sao_Paulo".to_string(),
        }
    }
}

impl Period {
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|err| ConfigError::Message(format!("period.timezone: {err}")))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: App,
    pub database: Database,
    pub sof: Sof,
    pub transactions: Transactions,
    pub period: Period,
}

impl Settings {
    /// Reads `path` (or an optional `settings.toml` in the working directory)
    /// and layers the environment on top.
    pub fn new(path: Option<&str>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::with_name(path),
            None => File::with_name("settings").required(false),
        };
        let settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("ORCAMENTO")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}
