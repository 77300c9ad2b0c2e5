//! API server configuration.

use std::str::FromStr;

use chrono::TimeDelta;
use gatehouse_core::auth::AuthSettings;
use gatehouse_core::auth::codec::resolve_jwt_secret;

/// Where users, roles and sessions are kept.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Process-local; everything is lost on restart.
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(format!("unknown storage backend: {other}")),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:8000").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// JWT signing secret.
    pub jwt_secret: String,
    /// Token lifetimes and bcrypt cost.
    pub auth: AuthSettings,
    pub storage: StorageBackend,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                     | Default                                  |
    /// |------------------------------|------------------------------------------|
    /// | `BIND_ADDR`                  | `127.0.0.1:8000`                         |
    /// | `DATABASE_URL`               | `postgres://localhost:5432/gatehouse`    |
    /// | `JWT_SECRET` / `AUTH_SECRET` | generated & persisted to file            |
    /// | `ACCESS_TOKEN_TTL_SECS`      | `3600`                                   |
    /// | `REFRESH_TOKEN_TTL_DAYS`     | `10`                                     |
    /// | `GATEHOUSE_STORAGE`          | `postgres`                               |
    pub fn from_env() -> Self {
        let defaults = AuthSettings::default();
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8000".into()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/gatehouse".into()),
            jwt_secret: resolve_jwt_secret(),
            auth: AuthSettings {
                access_ttl: positive_ttl(
                    "ACCESS_TOKEN_TTL_SECS",
                    env_parse("ACCESS_TOKEN_TTL_SECS"),
                    TimeDelta::try_seconds,
                    defaults.access_ttl,
                ),
                refresh_ttl: positive_ttl(
                    "REFRESH_TOKEN_TTL_DAYS",
                    env_parse("REFRESH_TOKEN_TTL_DAYS"),
                    TimeDelta::try_days,
                    defaults.refresh_ttl,
                ),
                ..defaults
            },
            storage: env_parse("GATEHOUSE_STORAGE").unwrap_or_default(),
        }
    }
}

/// Parse an env var, treating unset and unparseable values alike.
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment variable");
            None
        }
    }
}

/// Convert a configured TTL, falling back to `default` when it is unset,
/// not positive, or too large to represent.
fn positive_ttl(
    key: &str,
    raw: Option<i64>,
    to_delta: fn(i64) -> Option<TimeDelta>,
    default: TimeDelta,
) -> TimeDelta {
    let Some(value) = raw else {
        return default;
    };
    match to_delta(value).filter(|ttl| *ttl > TimeDelta::zero()) {
        Some(ttl) => ttl,
        None => {
            tracing::warn!(key, value, "TTL must be positive and in range, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use gatehouse_core::auth::{DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_DAYS};

    use super::*;

    #[test]
    fn ttl_falls_back_on_out_of_range_values() {
        let default = TimeDelta::seconds(DEFAULT_ACCESS_TTL_SECS);
        let secs = |raw| positive_ttl("ACCESS", raw, TimeDelta::try_seconds, default);
        assert_eq!(secs(None), default);
        assert_eq!(secs(Some(90)), TimeDelta::seconds(90));
        assert_eq!(secs(Some(0)), default);
        assert_eq!(secs(Some(-5)), default);
        assert_eq!(secs(Some(i64::MAX)), default);

        let default = TimeDelta::days(DEFAULT_REFRESH_TTL_DAYS);
        let days = |raw| positive_ttl("REFRESH", raw, TimeDelta::try_days, default);
        assert_eq!(days(Some(30)), TimeDelta::days(30));
        assert_eq!(days(Some(i64::MAX / 2)), default);
        assert_eq!(days(Some(-1)), default);
    }

    #[test]
    fn storage_backend_parses_aliases() {
        assert_eq!("postgres".parse::<StorageBackend>(), Ok(StorageBackend::Postgres));
        assert_eq!("PG".parse::<StorageBackend>(), Ok(StorageBackend::Postgres));
        assert_eq!(" memory ".parse::<StorageBackend>(), Ok(StorageBackend::Memory));
        assert!("redis".parse::<StorageBackend>().is_err());
    }
}
