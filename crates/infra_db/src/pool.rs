//! Pool construction and schema migrations

use std::str::FromStr;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::info;

use crate::error::DatabaseError;

pub type DatabasePool = PgPool;

/// Schema shipped with the crate, applied by [`run_migrations`]
static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Pool settings
///
/// ```rust,ignore
/// let config = DatabaseConfig::new("postgres://localhost/ledger")
///     .max_connections(8)
///     .acquire_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a caller waits for a free connection
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    /// Reported in `pg_stat_activity`
    pub application_name: String,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(10 * 60),
            application_name: "ledger".to_string(),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    fn connect_options(&self) -> Result<PgConnectOptions, DatabaseError> {
        let options = PgConnectOptions::from_str(&self.url)
            .map_err(|e| DatabaseError::ConnectionFailed(format!("invalid database url: {}", e)))?;
        Ok(options.application_name(&self.application_name))
    }
}

/// Opens a pool; fails fast when the first connection cannot be made
///
/// # Errors
///
/// `DatabaseError::ConnectionFailed` for a malformed URL or an unreachable server
pub async fn create_pool(config: DatabaseConfig) -> Result<DatabasePool, DatabaseError> {
    let options = config.connect_options()?;
    info!(
        max_connections = config.max_connections,
        application = %config.application_name,
        "opening ledger database pool"
    );

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections.min(config.max_connections))
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect_with(options)
        .await
        .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))
}

/// Brings the ledger schema up to date
pub async fn run_migrations(pool: &DatabasePool) -> Result<(), DatabaseError> {
    info!(known = MIGRATOR.iter().count(), "applying ledger migrations");
    MIGRATOR.run(pool).await?;
    Ok(())
}
