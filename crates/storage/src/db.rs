//! Connection factory and driver flag.

use simap_config::{DatabaseBackend, DatabaseConfig, MysqlConfig};
use simap_core::error::StoreError;
use sqlx::any::{AnyPoolOptions, install_default_drivers};
use sqlx::AnyPool;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The engine behind a [`Database`], fixed at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    MySql,
    Sqlite,
}

impl Driver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Driver::MySql => "mysql",
            Driver::Sqlite => "sqlite",
        }
    }

    /// Rewrite `$1`, `$2`, ... into this driver's positional placeholders:
    /// bare `?` for MySQL, numbered `?N` for SQLite.
    pub fn sql(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '$' || !chars.peek().is_some_and(char::is_ascii_digit) {
                out.push(c);
                continue;
            }
            let mut index = String::new();
            while let Some(d) = chars.next_if(char::is_ascii_digit) {
                index.push(d);
            }
            match self {
                Driver::MySql => out.push('?'),
                Driver::Sqlite => {
                    out.push('?');
                    out.push_str(&index);
                }
            }
        }
        out
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pooled access to the consultations and prompts tables.
///
/// Each query checks a connection out of the pool and returns it when the
/// statement completes, on success or error.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: AnyPool,
    pub(crate) driver: Driver,
    pub(crate) fallback_user_id: i64,
}

impl Database {
    /// Connect per `config`. With the MySQL backend a connection failure
    /// falls back to the SQLite file, whose schema is bootstrapped.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        install_default_drivers();

        if config.backend == DatabaseBackend::Mysql {
            match Self::connect_mysql(&config.mysql, config.max_connections).await {
                Ok(db) => return Ok(db),
                Err(e) => warn!(
                    error = %e,
                    sqlite_path = %config.sqlite_path.display(),
                    "MySQL unreachable, falling back to SQLite"
                ),
            }
        }

        let db = Self::open_sqlite(&config.sqlite_path, config.max_connections).await?;
        db.ensure_schema().await?;
        Ok(db)
    }

    pub async fn connect_mysql(config: &MysqlConfig, max_connections: u32) -> Result<Self, StoreError> {
        install_default_drivers();
        let url = mysql_url(config)?;
        debug!(host = %config.host, port = config.port, database = %config.database, "Connecting to MySQL");

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs.max(1)))
            .connect(&url)
            .await
            .map_err(|e| StoreError::Connection(format!("MySQL {}:{}: {e}", config.host, config.port)))?;

        info!(host = %config.host, database = %config.database, "MySQL store connected");
        Ok(Self::from_pool(pool, Driver::MySql))
    }

    /// Open (creating if needed) the SQLite file at `path`.
    pub async fn open_sqlite(path: &Path, max_connections: u32) -> Result<Self, StoreError> {
        install_default_drivers();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        let url = format!("sqlite://{}?mode=rwc", path.display());
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(&url)
            .await
            .map_err(|e| StoreError::Connection(format!("SQLite {}: {e}", path.display())))?;

        info!("SQLite store initialized at {}", path.display());
        Ok(Self::from_pool(pool, Driver::Sqlite))
    }

    /// A private in-memory SQLite database with the schema applied.
    pub async fn in_memory() -> Result<Self, StoreError> {
        install_default_drivers();
        // One connection that never expires, or the database goes with it.
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::Connection(format!("SQLite memory: {e}")))?;

        let db = Self::from_pool(pool, Driver::Sqlite);
        db.ensure_schema().await?;
        Ok(db)
    }

    fn from_pool(pool: AnyPool, driver: Driver) -> Self {
        Self {
            pool,
            driver,
            fallback_user_id: simap_core::consultation::DEFAULT_USER_ID,
        }
    }

    /// User id recorded when the configured one violates a users-table
    /// constraint.
    pub fn with_fallback_user(mut self, user_id: i64) -> Self {
        self.fallback_user_id = user_id;
        self
    }

    pub fn driver(&self) -> Driver {
        self.driver
    }

    /// Round-trip a trivial statement.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Connection(format!("{} ping failed: {e}", self.driver)))?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub(crate) fn sql(&self, template: &str) -> String {
        self.driver.sql(template)
    }
}

fn mysql_url(config: &MysqlConfig) -> Result<String, StoreError> {
    let invalid = || StoreError::Connection(format!("invalid MySQL address {}:{}", config.host, config.port));
    let mut url = reqwest::Url::parse(&format!(
        "mysql://{}:{}/{}",
        config.host, config.port, config.database
    ))
    .map_err(|_| invalid())?;
    url.set_username(&config.user).map_err(|_| invalid())?;
    url.set_password(config.password.as_deref()).map_err(|_| invalid())?;
    Ok(url.into())
}
