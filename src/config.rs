use std::time::Duration;

use anyhow::{bail, Context};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::info;

const MAX_CONNECTIONS: u32 = 5;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the database lives. `DATABASE_URL` takes precedence over the
/// individual `DB_*` variables.
#[derive(Debug, Clone)]
pub enum DbConfig {
    Url(String),
    Parts {
        host: String,
        port: u16,
        user: String,
        password: String,
        database: String,
    },
}

impl DbConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        if let Some(url) = lookup("DATABASE_URL").filter(|value| !value.is_empty()) {
            return Ok(DbConfig::Url(url));
        }

        let require = |key: &str| -> anyhow::Result<String> {
            match lookup(key) {
                Some(value) if !value.is_empty() => Ok(value),
                _ => bail!("{key} must be set (or provide DATABASE_URL)"),
            }
        };

        let port = require("DB_PORT")?;
        Ok(DbConfig::Parts {
            host: require("DB_HOST")?,
            port: port
                .parse()
                .with_context(|| format!("DB_PORT must be a port number, got `{port}`"))?,
            user: require("DB_USER")?,
            password: require("DB_PASSWORD")?,
            database: require("DB_NAME")?,
        })
    }

    fn connect_options(&self) -> anyhow::Result<PgConnectOptions> {
        match self {
            DbConfig::Url(url) => url.parse().context("DATABASE_URL is not a valid Postgres URL"),
            DbConfig::Parts {
                host,
                port,
                user,
                password,
                database,
            } => Ok(PgConnectOptions::new()
                .host(host)
                .port(*port)
                .username(user)
                .password(password)
                .database(database)),
        }
    }

    pub async fn connect(&self) -> anyhow::Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect_with(self.connect_options()?)
            .await
            .context("failed to connect to Postgres")?;
        info!("database connection established");
        Ok(pool)
    }
}
