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

use chrono::{DateTime, Utc};
use clap::Parser;
use reqwest::{Client, Url};
use std::process::ExitCode;
use std::time::Duration;
use tracing::Level;
use weatherlog::client::WeatherApiClient;
use weatherlog::config::{ApiConfig, DatabaseConfig, IngestConfig, StorageRetry};
use weatherlog::ingest::Ingestor;
use weatherlog::limiter::QuotaPolicy;
use weatherlog::model::run_timestamp;
use weatherlog::store::{CoordinateSource, PgStore};

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_API_URL: &str = "https://api.weatherapi.com/v1/";
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;
const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_DB_TIMEOUT_MILLIS: u64 = 10_000;
const DEFAULT_MONTHLY_QUOTA: u64 = 1_000_000;
const DEFAULT_RUNS_PER_DAY: u32 = 8;
const DEFAULT_STORAGE_RETRIES: u32 = 3;
const DEFAULT_MAX_STORAGE_FAILURES: u32 = 3;
const STARTUP_FAILURE: u8 = 1;

#[derive(Debug, Parser)]
#[clap(name = "weatherlog", version = clap::crate_version!())]
struct WeatherlogApplication {
    /// API key for weatherapi.com
    #[clap(long, env = "WEATHERLOG_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Base URL for the weatherapi.com API
    #[clap(long, default_value = DEFAULT_API_URL)]
    api_url: Url,

    /// Timeout for each request to the weather API, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Database host name or IP address
    #[clap(long, env = "WEATHERLOG_DB_HOST")]
    db_host: String,

    /// Database port
    #[clap(long, env = "WEATHERLOG_DB_PORT", default_value_t = DEFAULT_DB_PORT)]
    db_port: u16,

    /// Database user
    #[clap(long, env = "WEATHERLOG_DB_USER")]
    db_user: String,

    /// Password for the database user
    #[clap(long, env = "WEATHERLOG_DB_PASSWORD", hide_env_values = true)]
    db_password: String,

    /// Name of the database containing the 'coords' and 'data' tables
    #[clap(long, env = "WEATHERLOG_DB_NAME")]
    db_name: String,

    /// Timeout for connecting to the database, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_DB_TIMEOUT_MILLIS)]
    db_timeout_millis: u64,

    /// Number of API calls allowed per month by your weatherapi.com plan
    #[clap(long, default_value_t = DEFAULT_MONTHLY_QUOTA)]
    monthly_quota: u64,

    /// Number of times per day the scheduler runs weatherlog. Used to divide the monthly
    /// quota into a per-run cap.
    #[clap(long, default_value_t = DEFAULT_RUNS_PER_DAY)]
    runs_per_day: u32,

    /// Maximum number of API calls per minute. Unlimited by default.
    #[clap(long)]
    per_minute_limit: Option<u32>,

    /// Number of times to retry writing a single observation if the database fails.
    #[clap(long, default_value_t = DEFAULT_STORAGE_RETRIES)]
    storage_retries: u32,

    /// Abandon the run after this many observations in a row could not be written.
    #[clap(long, default_value_t = DEFAULT_MAX_STORAGE_FAILURES)]
    max_storage_failures: u32,

    /// Timestamp to store observations under (RFC 3339), instead of the start of the
    /// current hour. Useful for re-running a previous run.
    #[clap(long)]
    timestamp: Option<DateTime<Utc>>,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,
}

impl WeatherlogApplication {
    fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            api: ApiConfig {
                base_url: self.api_url.clone(),
                api_key: self.api_key.clone(),
                timeout: Duration::from_millis(self.timeout_millis),
            },
            database: DatabaseConfig {
                host: self.db_host.clone(),
                port: self.db_port,
                user: self.db_user.clone(),
                password: self.db_password.clone(),
                name: self.db_name.clone(),
                connect_timeout: Duration::from_millis(self.db_timeout_millis),
            },
            quota: QuotaPolicy::new(self.monthly_quota, self.runs_per_day, self.per_minute_limit),
            storage: StorageRetry {
                retries: self.storage_retries,
                max_consecutive_failures: self.max_storage_failures,
                ..StorageRetry::default()
            },
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let opts = WeatherlogApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let config = opts.ingest_config();
    if let Err(e) = config.validate() {
        tracing::error!(message = "invalid configuration", error = %e);
        return ExitCode::from(STARTUP_FAILURE);
    }

    let http_client = match Client::builder().timeout(config.api.timeout).build() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(message = "unable to initialize HTTP client", error = %e);
            return ExitCode::from(STARTUP_FAILURE);
        }
    };

    // Load the grid before making any API calls so that a database that is down
    // doesn't cost us any quota.
    let store = match PgStore::connect(&config.database).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(message = "unable to connect to database", host = %config.database.host, error = %e);
            return ExitCode::from(STARTUP_FAILURE);
        }
    };

    let coordinates = match store.coordinates().await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(message = "unable to load coordinates", error = %e);
            return ExitCode::from(STARTUP_FAILURE);
        }
    };

    let time = opts.timestamp.unwrap_or_else(|| run_timestamp(Utc::now()));
    let client = WeatherApiClient::new(http_client, &config.api);
    let outcome = Ingestor::from_config(&client, &store, &config)
        .run(&coordinates, time)
        .await;

    ExitCode::from(outcome.health().exit_code())
}
