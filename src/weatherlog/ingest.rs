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

use crate::client::{FetchError, WeatherSource};
use crate::config::{IngestConfig, StorageRetry};
use crate::limiter::{Permit, QuotaPolicy, RateLimiter};
use crate::model::{Coordinate, Observation};
use crate::store::{ObservationStore, StoreError, WriteOutcome};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{Instrument, Level};

/// Why a single coordinate didn't produce a new observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FailureReason {
    Transport,
    Timeout,
    RateLimited,
    Server,
    Rejected,
    AuthOrQuota,
    Decode,
    Validation,
    ForeignKey,
    RowRejected,
    Storage,
}

impl From<&FetchError> for FailureReason {
    fn from(e: &FetchError) -> Self {
        match e {
            FetchError::Transport(_) => Self::Transport,
            FetchError::Timeout(_) => Self::Timeout,
            FetchError::AuthOrQuota { .. } => Self::AuthOrQuota,
            FetchError::RateLimited(_) => Self::RateLimited,
            FetchError::Server(_) => Self::Server,
            FetchError::Rejected { .. } => Self::Rejected,
            FetchError::Decode(_) => Self::Decode,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::Server => "server",
            Self::Rejected => "rejected",
            Self::AuthOrQuota => "auth_or_quota",
            Self::Decode => "decode",
            Self::Validation => "validation",
            Self::ForeignKey => "foreign_key",
            Self::RowRejected => "row_rejected",
            Self::Storage => "storage",
        };

        f.write_str(name)
    }
}

/// Condition that ended a run early because continuing could only fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatalCondition {
    AuthOrQuota(String),
    StorageUnavailable(String),
}

impl fmt::Display for FatalCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthOrQuota(m) => write!(f, "API credentials or quota exhausted: {}", m),
            Self::StorageUnavailable(m) => write!(f, "database unavailable: {}", m),
        }
    }
}

/// Overall health of a run, used as the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunHealth {
    /// Every coordinate was recorded (includes runs with no coordinates).
    Success,
    /// Some coordinates were recorded, some failed or were skipped.
    Partial,
    /// There were coordinates to poll but none of them were recorded, either
    /// because every attempt failed or because the request cap skipped them all.
    Degraded,
    /// The run was abandoned because of an API credential or database problem.
    Fatal,
}

impl RunHealth {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Partial => 2,
            Self::Degraded => 3,
            Self::Fatal => 4,
        }
    }
}

/// Counts for a single pass over the coordinate grid. Kept in memory only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutcome {
    pub attempted: u64,
    pub succeeded: u64,
    pub already_recorded: u64,
    pub skipped: u64,
    pub failures: BTreeMap<FailureReason, u64>,
    pub fatal: Option<FatalCondition>,
}

impl RunOutcome {
    pub fn failed(&self) -> u64 {
        self.failures.values().sum()
    }

    pub fn failures_for(&self, reason: FailureReason) -> u64 {
        self.failures.get(&reason).copied().unwrap_or(0)
    }

    pub fn health(&self) -> RunHealth {
        if self.fatal.is_some() {
            RunHealth::Fatal
        } else if self.failed() == 0 && self.skipped == 0 {
            RunHealth::Success
        } else if self.succeeded + self.already_recorded == 0 {
            RunHealth::Degraded
        } else {
            RunHealth::Partial
        }
    }

    fn record_failure(&mut self, reason: FailureReason) {
        *self.failures.entry(reason).or_insert(0) += 1;
    }
}

/// Result of processing one coordinate.
#[derive(Debug)]
enum Step {
    Inserted,
    AlreadyRecorded,
    Failed(FailureReason),
    Fatal(FailureReason, FatalCondition),
}

/// Fetches, validates, and stores one observation per coordinate, sequentially
/// and in the order given.
#[derive(Debug)]
pub struct Ingestor<'a, S, W> {
    source: &'a S,
    store: &'a W,
    quota: QuotaPolicy,
    retry: StorageRetry,
}

impl<'a, S, W> Ingestor<'a, S, W>
where
    S: WeatherSource,
    W: ObservationStore,
{
    pub fn new(source: &'a S, store: &'a W, quota: QuotaPolicy, retry: StorageRetry) -> Self {
        Ingestor {
            source,
            store,
            quota,
            retry,
        }
    }

    pub fn from_config(source: &'a S, store: &'a W, config: &IngestConfig) -> Self {
        Self::new(source, store, config.quota, config.storage)
    }

    /// Make a single pass over `coordinates`, tagging every observation with `time`.
    ///
    /// Failures for individual coordinates are counted and the pass moves on. The
    /// pass only stops early when the API rejects our credentials or quota, when
    /// the database has been unreachable for too many rows in a row, or when the
    /// per-run request cap is used up. Anything not visited is counted as skipped.
    pub async fn run(&self, coordinates: &[Coordinate], time: DateTime<Utc>) -> RunOutcome {
        let mut outcome = RunOutcome::default();
        let mut limiter = RateLimiter::new(&self.quota);
        let mut storage_failures = 0;

        tracing::info!(
            message = "starting ingestion run",
            coordinates = coordinates.len(),
            time = %time,
            request_cap = limiter.cap(),
        );

        for (i, coordinate) in coordinates.iter().enumerate() {
            let step = self
                .process(coordinate, time, &mut limiter)
                .instrument(tracing::span!(Level::DEBUG, "coordinate", id = coordinate.id))
                .await;

            let step = match step {
                Some(s) => s,
                None => {
                    outcome.skipped = (coordinates.len() - i) as u64;
                    tracing::warn!(
                        message = "per-run request cap reached, skipping remaining coordinates",
                        cap = limiter.cap(),
                        skipped = outcome.skipped,
                    );
                    break;
                }
            };

            outcome.attempted += 1;
            match step {
                Step::Inserted => {
                    storage_failures = 0;
                    outcome.succeeded += 1;
                }
                Step::AlreadyRecorded => {
                    storage_failures = 0;
                    outcome.already_recorded += 1;
                }
                Step::Failed(FailureReason::Storage) => {
                    storage_failures += 1;
                    outcome.record_failure(FailureReason::Storage);

                    if storage_failures >= self.retry.max_consecutive_failures.max(1) {
                        outcome.fatal = Some(FatalCondition::StorageUnavailable(format!(
                            "{} consecutive rows could not be written",
                            storage_failures
                        )));
                    }
                }
                Step::Failed(reason) => {
                    // The database answered, so it's reachable
                    if matches!(reason, FailureReason::ForeignKey | FailureReason::RowRejected) {
                        storage_failures = 0;
                    }
                    outcome.record_failure(reason);
                }
                Step::Fatal(reason, condition) => {
                    outcome.record_failure(reason);
                    outcome.fatal = Some(condition);
                }
            }

            if let Some(fatal) = &outcome.fatal {
                outcome.skipped = (coordinates.len() - i - 1) as u64;
                tracing::error!(
                    message = "abandoning ingestion run",
                    reason = %fatal,
                    skipped = outcome.skipped,
                );
                break;
            }
        }

        log_outcome(&outcome);
        outcome
    }

    /// Fetch, validate, and persist a single coordinate. Returns `None` without
    /// making a request if the per-run cap has been reached.
    async fn process(&self, coordinate: &Coordinate, time: DateTime<Utc>, limiter: &mut RateLimiter) -> Option<Step> {
        if let Err(e) = coordinate.validate() {
            tracing::warn!(message = "invalid coordinate, not requesting", coordinate = %coordinate, error = %e);
            return Some(Step::Failed(FailureReason::Validation));
        }

        if limiter.acquire().await == Permit::CapReached {
            return None;
        }

        let reading = match self.source.current(coordinate).await {
            Ok(r) => r,
            Err(e) if e.is_run_fatal() => {
                tracing::error!(message = "API rejected credentials or quota", coordinate = %coordinate, error = %e);
                return Some(Step::Fatal(
                    FailureReason::AuthOrQuota,
                    FatalCondition::AuthOrQuota(e.to_string()),
                ));
            }
            Err(e) => {
                tracing::warn!(message = "failed to fetch current conditions", coordinate = %coordinate, error = %e);
                return Some(Step::Failed(FailureReason::from(&e)));
            }
        };

        let source_time = reading.source_time;
        let obs = match Observation::from_reading(coordinate, time, reading) {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(message = "discarding invalid reading", coordinate = %coordinate, error = %e);
                return Some(Step::Failed(FailureReason::Validation));
            }
        };

        Some(match self.persist(&obs).await {
            Ok(WriteOutcome::Inserted) => {
                tracing::debug!(
                    message = "stored observation",
                    coordinate = %coordinate,
                    source_time = ?source_time,
                    observation = ?obs,
                );
                Step::Inserted
            }
            Ok(WriteOutcome::AlreadyExists) => {
                tracing::debug!(message = "observation already recorded", coordinate = %coordinate, time = %time);
                Step::AlreadyRecorded
            }
            Ok(WriteOutcome::RejectedForeignKey) => {
                tracing::error!(
                    message = "observation references unknown coordinate, not stored",
                    coordinate = %coordinate,
                );
                Step::Failed(FailureReason::ForeignKey)
            }
            Ok(WriteOutcome::RejectedRow) => {
                tracing::error!(
                    message = "database refused observation values, not stored",
                    coordinate = %coordinate,
                    observation = ?obs,
                );
                Step::Failed(FailureReason::RowRejected)
            }
            Err(e) => {
                tracing::error!(message = "failed to store observation", coordinate = %coordinate, error = %e);
                Step::Failed(FailureReason::Storage)
            }
        })
    }

    /// Write an observation, retrying with exponential backoff when the database
    /// itself fails.
    async fn persist(&self, obs: &Observation) -> Result<WriteOutcome, StoreError> {
        let mut attempt = 0;
        loop {
            match self.store.upsert(obs).await {
                Ok(o) => return Ok(o),
                Err(e) if attempt < self.retry.retries => {
                    let delay = self.retry.base_delay * 2u32.saturating_pow(attempt);
                    tracing::warn!(
                        message = "retrying observation write",
                        attempt = attempt + 1,
                        retries = self.retry.retries,
                        delay = ?delay,
                        error = %e,
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn log_outcome(outcome: &RunOutcome) {
    let health = outcome.health();
    match health {
        RunHealth::Success => tracing::info!(
            message = "ingestion run complete",
            health = ?health,
            attempted = outcome.attempted,
            succeeded = outcome.succeeded,
            already_recorded = outcome.already_recorded,
            failed = outcome.failed(),
            skipped = outcome.skipped,
        ),
        RunHealth::Partial => tracing::warn!(
            message = "ingestion run complete with failures",
            health = ?health,
            attempted = outcome.attempted,
            succeeded = outcome.succeeded,
            already_recorded = outcome.already_recorded,
            failed = outcome.failed(),
            skipped = outcome.skipped,
            failures = ?outcome.failures,
        ),
        RunHealth::Degraded | RunHealth::Fatal => tracing::error!(
            message = "ingestion run recorded no new data or was abandoned",
            health = ?health,
            attempted = outcome.attempted,
            succeeded = outcome.succeeded,
            already_recorded = outcome.already_recorded,
            failed = outcome.failed(),
            skipped = outcome.skipped,
            failures = ?outcome.failures,
        ),
    }
}

#[cfg(test)]
mod test {
    use super::{FailureReason, FatalCondition, Ingestor, RunHealth, RunOutcome};
    use crate::client::FetchError;
    use crate::config::StorageRetry;
    use crate::limiter::QuotaPolicy;
    use crate::model::{Coordinate, Reading};
    use crate::testing::{FakeSource, MemoryStore};
    use chrono::{DateTime, TimeZone, Utc};
    use reqwest::StatusCode;
    use std::time::Duration;

    fn reading() -> Reading {
        Reading {
            temperature: 21.0,
            humidity: 60,
            clouds: 5,
            rain: 0.0,
            wind: 3.7,
            wind_dir: 120,
            gusts: Some(5.3),
            source_time: None,
        }
    }

    fn time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn grid() -> Vec<Coordinate> {
        vec![
            Coordinate::new(0, 52.50, 13.40),
            Coordinate::new(1, 48.14, 11.58),
            Coordinate::new(2, 53.55, 9.99),
        ]
    }

    fn quota() -> QuotaPolicy {
        QuotaPolicy::new(1_000_000, 8, None)
    }

    fn retry() -> StorageRetry {
        StorageRetry {
            retries: 2,
            base_delay: Duration::from_millis(100),
            max_consecutive_failures: 3,
        }
    }

    #[tokio::test]
    async fn test_empty_grid() {
        let source = FakeSource::new(reading());
        let store = MemoryStore::new(vec![]);
        let outcome = Ingestor::new(&source, &store, quota(), retry()).run(&[], time()).await;

        assert_eq!(RunOutcome::default(), outcome);
        assert_eq!(RunHealth::Success, outcome.health());
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_single_coordinate_stored() {
        let coords = vec![Coordinate::new(0, 52.50, 13.40)];
        let source = FakeSource::new(reading());
        let store = MemoryStore::new(coords.clone());
        let outcome = Ingestor::new(&source, &store, quota(), retry()).run(&coords, time()).await;

        assert_eq!(1, outcome.attempted);
        assert_eq!(1, outcome.succeeded);
        assert_eq!(0, outcome.failed());
        assert_eq!(RunHealth::Success, outcome.health());

        let rows = store.rows();
        assert_eq!(1, rows.len());
        let row = &rows[0];
        assert_eq!(0, row.coordinate_id);
        assert_eq!(time(), row.time);
        assert_eq!(21.0, row.temperature);
        assert_eq!(60, row.humidity);
        assert_eq!(5, row.clouds);
        assert_eq!(0.0, row.rain);
        assert_eq!(3.7, row.wind);
        assert_eq!(120, row.wind_dir);
        assert_eq!(Some(5.3), row.gusts);
    }

    #[tokio::test]
    async fn test_source_time_does_not_change_row_time() {
        let coords = vec![Coordinate::new(0, 52.50, 13.40)];
        let updated = Utc.with_ymd_and_hms(2024, 6, 1, 11, 45, 0).unwrap();
        let source = FakeSource::new(Reading {
            source_time: Some(updated),
            ..reading()
        });
        let store = MemoryStore::new(coords.clone());
        let outcome = Ingestor::new(&source, &store, quota(), retry()).run(&coords, time()).await;

        assert_eq!(1, outcome.succeeded);
        assert_eq!(vec![time()], store.rows().iter().map(|r| r.time).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_timeout_does_not_abort_run() {
        let coords = grid();
        let source = FakeSource::new(reading()).with_failure(1, || FetchError::Timeout(Duration::from_secs(5)));
        let store = MemoryStore::new(coords.clone());
        let outcome = Ingestor::new(&source, &store, quota(), retry()).run(&coords, time()).await;

        assert_eq!(3, outcome.attempted);
        assert_eq!(2, outcome.succeeded);
        assert_eq!(1, outcome.failed());
        assert_eq!(1, outcome.failures_for(FailureReason::Timeout));
        assert_eq!(RunHealth::Partial, outcome.health());
        assert_eq!(vec![0, 1, 2], source.calls());

        let ids: Vec<i32> = store.rows().iter().map(|r| r.coordinate_id).collect();
        assert_eq!(vec![0, 2], ids);
    }

    #[tokio::test]
    async fn test_rerun_same_timestamp_is_idempotent() {
        let coords = vec![Coordinate::new(0, 52.50, 13.40)];
        let source = FakeSource::new(reading());
        let store = MemoryStore::new(coords.clone());
        let ingestor = Ingestor::new(&source, &store, quota(), retry());

        let first = ingestor.run(&coords, time()).await;
        assert_eq!(1, first.succeeded);

        let second = ingestor.run(&coords, time()).await;
        assert_eq!(1, second.attempted);
        assert_eq!(0, second.succeeded);
        assert_eq!(1, second.already_recorded);
        assert_eq!(0, second.failed());
        assert_eq!(RunHealth::Success, second.health());
        assert_eq!(1, store.rows().len());
    }

    #[tokio::test]
    async fn test_invalid_reading_not_stored() {
        let coords = vec![Coordinate::new(0, 52.50, 13.40)];
        let source = FakeSource::new(reading()).with_reading(0, Reading { humidity: 150, ..reading() });
        let store = MemoryStore::new(coords.clone());
        let outcome = Ingestor::new(&source, &store, quota(), retry()).run(&coords, time()).await;

        assert_eq!(1, outcome.failures_for(FailureReason::Validation));
        assert_eq!(0, store.writes());
        assert!(store.rows().is_empty());
        assert_eq!(RunHealth::Degraded, outcome.health());
    }

    #[tokio::test]
    async fn test_invalid_coordinate_not_requested() {
        let coords = vec![Coordinate::new(7, 95.0, 13.40), Coordinate::new(0, 52.50, 13.40)];
        let source = FakeSource::new(reading());
        let store = MemoryStore::new(coords.clone());
        let outcome = Ingestor::new(&source, &store, quota(), retry()).run(&coords, time()).await;

        assert_eq!(2, outcome.attempted);
        assert_eq!(1, outcome.succeeded);
        assert_eq!(1, outcome.failures_for(FailureReason::Validation));
        assert_eq!(vec![0], source.calls());
    }

    #[tokio::test]
    async fn test_unknown_coordinate_rejected() {
        let coords = grid();
        let source = FakeSource::new(reading());
        // Coordinate 2 is missing from the store
        let store = MemoryStore::new(coords[..2].to_vec());
        let outcome = Ingestor::new(&source, &store, quota(), retry()).run(&coords, time()).await;

        assert_eq!(2, outcome.succeeded);
        assert_eq!(1, outcome.failures_for(FailureReason::ForeignKey));
        assert!(store.rows().iter().all(|r| r.coordinate_id != 2));
        assert_eq!(RunHealth::Partial, outcome.health());
    }

    #[tokio::test]
    async fn test_auth_failure_abandons_run() {
        let coords = grid();
        let source = FakeSource::new(reading()).with_failure(0, || FetchError::AuthOrQuota {
            status: StatusCode::FORBIDDEN,
            message: "API key has exceeded calls per month quota.".to_owned(),
        });
        let store = MemoryStore::new(coords.clone());
        let outcome = Ingestor::new(&source, &store, quota(), retry()).run(&coords, time()).await;

        assert_eq!(1, outcome.attempted);
        assert_eq!(2, outcome.skipped);
        assert_eq!(1, outcome.failures_for(FailureReason::AuthOrQuota));
        assert!(matches!(outcome.fatal, Some(FatalCondition::AuthOrQuota(_))));
        assert_eq!(RunHealth::Fatal, outcome.health());
        assert_eq!(vec![0], source.calls());
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_all_fetches_fail_is_degraded() {
        let coords = grid();
        let source = FakeSource::new(reading())
            .with_failure(0, || FetchError::Server(StatusCode::BAD_GATEWAY))
            .with_failure(1, || FetchError::RateLimited(StatusCode::TOO_MANY_REQUESTS))
            .with_failure(2, || FetchError::Decode(serde_json::from_str::<u32>("{").unwrap_err()));
        let store = MemoryStore::new(coords.clone());
        let outcome = Ingestor::new(&source, &store, quota(), retry()).run(&coords, time()).await;

        assert_eq!(3, outcome.attempted);
        assert_eq!(3, outcome.failed());
        assert_eq!(1, outcome.failures_for(FailureReason::Server));
        assert_eq!(1, outcome.failures_for(FailureReason::RateLimited));
        assert_eq!(1, outcome.failures_for(FailureReason::Decode));
        assert_eq!(RunHealth::Degraded, outcome.health());
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_failure_retried() {
        let coords = vec![Coordinate::new(0, 52.50, 13.40)];
        let source = FakeSource::new(reading());
        let store = MemoryStore::new(coords.clone());
        store.fail_next(2);
        let outcome = Ingestor::new(&source, &store, quota(), retry()).run(&coords, time()).await;

        assert_eq!(1, outcome.succeeded);
        assert_eq!(0, outcome.failed());
        assert_eq!(3, store.writes());
        assert_eq!(1, store.rows().len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_unavailable_abandons_run() {
        let coords: Vec<Coordinate> = (0..5).map(|i| Coordinate::new(i, 50.0 + f64::from(i), 10.0)).collect();
        let source = FakeSource::new(reading());
        let store = MemoryStore::new(coords.clone());
        store.fail_next(u32::MAX);
        let outcome = Ingestor::new(&source, &store, quota(), retry()).run(&coords, time()).await;

        assert_eq!(3, outcome.attempted);
        assert_eq!(3, outcome.failures_for(FailureReason::Storage));
        assert_eq!(2, outcome.skipped);
        assert!(matches!(outcome.fatal, Some(FatalCondition::StorageUnavailable(_))));
        assert_eq!(RunHealth::Fatal, outcome.health());
        // One attempt plus two retries for each of the three rows
        assert_eq!(9, store.writes());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_rows_not_retried_or_fatal() {
        let coords: Vec<Coordinate> = (0..5).map(|i| Coordinate::new(i, 50.0 + f64::from(i), 10.0)).collect();
        let source = FakeSource::new(reading());
        let store = coords
            .iter()
            .fold(MemoryStore::new(coords.clone()), |s, c| s.with_rejected_rows(c.id));
        let outcome = Ingestor::new(&source, &store, quota(), retry()).run(&coords, time()).await;

        assert_eq!(5, outcome.attempted);
        assert_eq!(5, outcome.failures_for(FailureReason::RowRejected));
        assert_eq!(0, outcome.failures_for(FailureReason::Storage));
        assert_eq!(0, outcome.skipped);
        assert_eq!(None, outcome.fatal);
        assert_eq!(RunHealth::Degraded, outcome.health());
        assert_eq!(5, store.writes());
    }

    #[tokio::test]
    async fn test_request_cap_of_zero_skips_everything() {
        let coords = grid();
        let source = FakeSource::new(reading());
        let store = MemoryStore::new(coords.clone());
        // 100 calls a month spread over 24 runs a day leaves nothing for a single run
        let outcome = Ingestor::new(&source, &store, QuotaPolicy::new(100, 24, None), retry())
            .run(&coords, time())
            .await;

        assert_eq!(0, outcome.attempted);
        assert_eq!(3, outcome.skipped);
        assert_eq!(0, outcome.failed());
        assert_eq!(RunHealth::Degraded, outcome.health());
        assert!(source.calls().is_empty());
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_request_cap_skips_remaining() {
        let coords = grid();
        let source = FakeSource::new(reading());
        let store = MemoryStore::new(coords.clone());
        // 62 calls a month, once a day: 2 per run
        let outcome = Ingestor::new(&source, &store, QuotaPolicy::new(62, 1, None), retry())
            .run(&coords, time())
            .await;

        assert_eq!(2, outcome.attempted);
        assert_eq!(2, outcome.succeeded);
        assert_eq!(1, outcome.skipped);
        assert_eq!(RunHealth::Partial, outcome.health());
        assert_eq!(vec![0, 1], source.calls());
    }

    #[tokio::test]
    async fn test_duplicate_coordinate_ids_processed_independently() {
        let coords = vec![Coordinate::new(0, 52.50, 13.40), Coordinate::new(0, 52.50, 13.40)];
        let source = FakeSource::new(reading());
        let store = MemoryStore::new(coords[..1].to_vec());
        let outcome = Ingestor::new(&source, &store, quota(), retry()).run(&coords, time()).await;

        assert_eq!(2, outcome.attempted);
        assert_eq!(1, outcome.succeeded);
        assert_eq!(1, outcome.already_recorded);
        assert_eq!(1, store.rows().len());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(0, RunHealth::Success.exit_code());
        assert_eq!(2, RunHealth::Partial.exit_code());
        assert_eq!(3, RunHealth::Degraded.exit_code());
        assert_eq!(4, RunHealth::Fatal.exit_code());
    }
}
