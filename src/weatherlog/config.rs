// weatherlog - Weather observation ingestion for a coordinate grid
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::limiter::QuotaPolicy;
use reqwest::Url;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Values shipped in the example configuration. Seeing one of these means the
/// operator never filled in real credentials.
const PLACEHOLDER_API_KEY: &str = "1234abcd";
const PLACEHOLDER_DB_USER: &str = "user";
const PLACEHOLDER_DB_PASSWORD: &str = "1234";
const PLACEHOLDER_DB_NAME: &str = "database";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing value for {0}")]
    Missing(&'static str),

    #[error("{0} still contains the placeholder value")]
    Placeholder(&'static str),

    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

/// Settings for the remote weather API.
#[derive(Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    pub api_key: String,
    pub timeout: Duration,
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Connection settings for the PostgreSQL database holding `coords` and `data`.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub connect_timeout: Duration,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// How hard to try before giving up on the database during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageRetry {
    /// Extra attempts for a single row after the first write fails.
    pub retries: u32,
    /// Delay before the first retry, doubled for each retry after.
    pub base_delay: Duration,
    /// Consecutive rows that may fail to write before the run is abandoned.
    pub max_consecutive_failures: u32,
}

impl Default for StorageRetry {
    fn default() -> Self {
        StorageRetry {
            retries: 3,
            base_delay: Duration::from_millis(500),
            max_consecutive_failures: 3,
        }
    }
}

/// Everything an ingestion run needs, built once at startup and never changed.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub quota: QuotaPolicy,
    pub storage: StorageRetry,
}

impl IngestConfig {
    /// Reject configuration that can only fail at runtime: empty or placeholder
    /// credentials, an API URL that can't have paths appended, and a quota that
    /// allows no requests at all.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_credential("api key", &self.api.api_key, PLACEHOLDER_API_KEY)?;
        check_credential("database user", &self.database.user, PLACEHOLDER_DB_USER)?;
        check_credential("database password", &self.database.password, PLACEHOLDER_DB_PASSWORD)?;
        check_credential("database name", &self.database.name, PLACEHOLDER_DB_NAME)?;

        if self.database.host.trim().is_empty() {
            return Err(ConfigError::Missing("database host"));
        }

        if self.api.base_url.cannot_be_a_base() {
            return Err(ConfigError::Invalid("api url", self.api.base_url.to_string()));
        }

        if self.api.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout", "must be greater than zero".to_owned()));
        }

        if self.quota.per_run_cap() == 0 {
            return Err(ConfigError::Invalid(
                "monthly quota",
                format!("{:?} allows no requests per run", self.quota),
            ));
        }

        Ok(())
    }
}

fn check_credential(name: &'static str, value: &str, placeholder: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Missing(name))
    } else if value == placeholder {
        Err(ConfigError::Placeholder(name))
    } else {
        Ok(())
    }
}
