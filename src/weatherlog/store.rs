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

use crate::config::DatabaseConfig;
use crate::model::{Coordinate, Observation};
use async_trait::async_trait;
use bb8::RunError;
use bb8_postgres::PostgresConnectionManager;
use thiserror::Error;
use tokio_postgres::error::SqlState;
use tokio_postgres::NoTls;

pub type Pool = bb8::Pool<PostgresConnectionManager<NoTls>>;

const SELECT_COORDS: &str = "SELECT id::INT4 AS id, lat::FLOAT8 AS lat, lon::FLOAT8 AS lon \
    FROM coords \
    ORDER BY id";

const INSERT_DATA: &str = "INSERT INTO data (id, time, temp, humidity, clouds, rain, wind, wind_dir, gusts) \
    VALUES ($1, $2, $3::FLOAT8, $4::INT4, $5::INT4, $6::FLOAT8, $7::FLOAT8, $8::INT4, $9::FLOAT8) \
    ON CONFLICT (id, time) DO NOTHING";

/// Failure talking to the database itself, as opposed to the database refusing
/// a particular row.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unable to get database connection: {0}")]
    Pool(#[source] RunError<tokio_postgres::Error>),

    #[error("database error: {0}")]
    Database(#[source] tokio_postgres::Error),
}

/// What happened to a single observation handed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    /// A row for the same coordinate and timestamp was already present.
    AlreadyExists,
    /// The coordinate the observation refers to doesn't exist.
    RejectedForeignKey,
    /// The database refused the values in this row (out of range, NOT NULL, CHECK).
    /// Writing it again will fail the same way.
    RejectedRow,
}

/// Supplies the grid of coordinates to poll, in the order they should be polled.
#[async_trait]
pub trait CoordinateSource {
    async fn coordinates(&self) -> Result<Vec<Coordinate>, StoreError>;
}

/// Insert-if-absent persistence of observations, one atomic write per row.
#[async_trait]
pub trait ObservationStore {
    async fn upsert(&self, obs: &Observation) -> Result<WriteOutcome, StoreError>;
}

/// PostgreSQL backed store for the `coords` and `data` tables.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    /// Create a connection pool and open its first connection, failing if the
    /// database can't be reached.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.host)
            .port(config.port)
            .user(&config.user)
            .password(&config.password)
            .dbname(&config.name)
            .connect_timeout(config.connect_timeout);

        let mgr = PostgresConnectionManager::new(pg, NoTls);
        let pool = bb8::Pool::builder()
            .max_size(1)
            .min_idle(Some(1))
            .connection_timeout(config.connect_timeout)
            .build(mgr)
            .await
            .map_err(StoreError::Database)?;

        tracing::debug!(message = "connected to database", host = %config.host, database = %config.name);
        Ok(PgStore { pool })
    }
}

#[async_trait]
impl CoordinateSource for PgStore {
    async fn coordinates(&self) -> Result<Vec<Coordinate>, StoreError> {
        let conn = self.pool.get().await.map_err(StoreError::Pool)?;
        let rows = conn.query(SELECT_COORDS, &[]).await.map_err(StoreError::Database)?;

        rows.iter()
            .map(|row| -> Result<Coordinate, StoreError> {
                Ok(Coordinate::new(
                    row.try_get("id").map_err(StoreError::Database)?,
                    row.try_get("lat").map_err(StoreError::Database)?,
                    row.try_get("lon").map_err(StoreError::Database)?,
                ))
            })
            .collect()
    }
}

#[async_trait]
impl ObservationStore for PgStore {
    async fn upsert(&self, obs: &Observation) -> Result<WriteOutcome, StoreError> {
        let conn = self.pool.get().await.map_err(StoreError::Pool)?;
        let res = conn
            .execute(
                INSERT_DATA,
                &[
                    &obs.coordinate_id,
                    &obs.time.naive_utc(),
                    &obs.temperature,
                    &obs.humidity,
                    &obs.clouds,
                    &obs.rain,
                    &obs.wind,
                    &obs.wind_dir,
                    &obs.gusts,
                ],
            )
            .await;

        match res {
            Ok(0) => Ok(WriteOutcome::AlreadyExists),
            Ok(_) => Ok(WriteOutcome::Inserted),
            Err(e) => classify_error(e),
        }
    }
}

/// Turn constraint violations into outcomes and leave everything else as an error.
fn classify_error(e: tokio_postgres::Error) -> Result<WriteOutcome, StoreError> {
    match e.code().and_then(classify_sqlstate) {
        Some(outcome) => {
            tracing::warn!(message = "database refused observation", error = %e);
            Ok(outcome)
        }
        None => Err(StoreError::Database(e)),
    }
}

/// Outcome for errors caused by the row itself. Class 22 (data exception) and
/// class 23 (integrity constraint violation) depend only on the values written,
/// anything else is a problem with the database or connection.
fn classify_sqlstate(code: &SqlState) -> Option<WriteOutcome> {
    if *code == SqlState::FOREIGN_KEY_VIOLATION {
        Some(WriteOutcome::RejectedForeignKey)
    } else if *code == SqlState::UNIQUE_VIOLATION {
        // Only possible if the conflict target doesn't match the primary key
        Some(WriteOutcome::AlreadyExists)
    } else if code.code().starts_with("22") || code.code().starts_with("23") {
        Some(WriteOutcome::RejectedRow)
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::{classify_sqlstate, PgStore, StoreError, WriteOutcome};
    use crate::config::DatabaseConfig;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_postgres::error::SqlState;

    #[test]
    fn test_classify_sqlstate_constraint_violations() {
        assert_eq!(
            Some(WriteOutcome::RejectedForeignKey),
            classify_sqlstate(&SqlState::FOREIGN_KEY_VIOLATION)
        );
        assert_eq!(Some(WriteOutcome::AlreadyExists), classify_sqlstate(&SqlState::UNIQUE_VIOLATION));
    }

    #[test]
    fn test_classify_sqlstate_row_rejected() {
        assert_eq!(
            Some(WriteOutcome::RejectedRow),
            classify_sqlstate(&SqlState::NUMERIC_VALUE_OUT_OF_RANGE)
        );
        assert_eq!(Some(WriteOutcome::RejectedRow), classify_sqlstate(&SqlState::NOT_NULL_VIOLATION));
        assert_eq!(Some(WriteOutcome::RejectedRow), classify_sqlstate(&SqlState::CHECK_VIOLATION));
    }

    #[test]
    fn test_classify_sqlstate_database_problems() {
        assert_eq!(None, classify_sqlstate(&SqlState::ADMIN_SHUTDOWN));
        assert_eq!(None, classify_sqlstate(&SqlState::DISK_FULL));
        assert_eq!(None, classify_sqlstate(&SqlState::CONNECTION_FAILURE));
        assert_eq!(None, classify_sqlstate(&SqlState::UNDEFINED_TABLE));
    }

    #[tokio::test]
    async fn test_connect_fails_when_database_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = DatabaseConfig {
            host: "127.0.0.1".to_owned(),
            port,
            user: "weather".to_owned(),
            password: "hunter2".to_owned(),
            name: "weather".to_owned(),
            connect_timeout: Duration::from_millis(500),
        };

        let res = PgStore::connect(&config).await;
        assert!(matches!(res, Err(StoreError::Database(_))), "unexpected result {:?}", res);
    }
}
