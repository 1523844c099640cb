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

//! In-memory stand-ins for the weather API and the database used by tests.

use crate::client::{FetchError, WeatherSource};
use crate::model::{Coordinate, Observation, Reading};
use crate::store::{CoordinateSource, ObservationStore, StoreError, WriteOutcome};
use async_trait::async_trait;
use bb8::RunError;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

type FailureFn = Box<dyn Fn() -> FetchError + Send + Sync>;

/// Returns the same reading for every coordinate unless told otherwise for a
/// specific coordinate ID.
pub struct FakeSource {
    reading: Reading,
    overrides: HashMap<i32, Reading>,
    failures: HashMap<i32, FailureFn>,
    calls: Mutex<Vec<i32>>,
}

impl FakeSource {
    pub fn new(reading: Reading) -> Self {
        FakeSource {
            reading,
            overrides: HashMap::new(),
            failures: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reading(mut self, id: i32, reading: Reading) -> Self {
        self.overrides.insert(id, reading);
        self
    }

    pub fn with_failure<F>(mut self, id: i32, f: F) -> Self
    where
        F: Fn() -> FetchError + Send + Sync + 'static,
    {
        self.failures.insert(id, Box::new(f));
        self
    }

    /// Coordinate IDs requested so far, in order.
    pub fn calls(&self) -> Vec<i32> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WeatherSource for FakeSource {
    async fn current(&self, coordinate: &Coordinate) -> Result<Reading, FetchError> {
        self.calls.lock().unwrap().push(coordinate.id);

        if let Some(f) = self.failures.get(&coordinate.id) {
            return Err(f());
        }

        Ok(self
            .overrides
            .get(&coordinate.id)
            .cloned()
            .unwrap_or_else(|| self.reading.clone()))
    }
}

/// Enforces the same constraints as the `data` table: a primary key on
/// coordinate and time, and a foreign key to the known coordinates.
pub struct MemoryStore {
    coords: Vec<Coordinate>,
    rejected: HashSet<i32>,
    rows: Mutex<BTreeMap<(i32, DateTime<Utc>), Observation>>,
    failing_writes: Mutex<u32>,
    writes: Mutex<u32>,
}

impl MemoryStore {
    pub fn new(coords: Vec<Coordinate>) -> Self {
        MemoryStore {
            coords,
            rejected: HashSet::new(),
            rows: Mutex::new(BTreeMap::new()),
            failing_writes: Mutex::new(0),
            writes: Mutex::new(0),
        }
    }

    /// Refuse every row for coordinate `id` the way the database refuses values
    /// that don't fit a column.
    pub fn with_rejected_rows(mut self, id: i32) -> Self {
        self.rejected.insert(id);
        self
    }

    /// Make the next `n` writes fail as if the database were unreachable.
    pub fn fail_next(&self, n: u32) {
        *self.failing_writes.lock().unwrap() = n;
    }

    pub fn rows(&self) -> Vec<Observation> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    /// Number of write attempts, including failed ones.
    pub fn writes(&self) -> u32 {
        *self.writes.lock().unwrap()
    }
}

#[async_trait]
impl CoordinateSource for MemoryStore {
    async fn coordinates(&self) -> Result<Vec<Coordinate>, StoreError> {
        Ok(self.coords.clone())
    }
}

#[async_trait]
impl ObservationStore for MemoryStore {
    async fn upsert(&self, obs: &Observation) -> Result<WriteOutcome, StoreError> {
        *self.writes.lock().unwrap() += 1;

        {
            let mut failing = self.failing_writes.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(StoreError::Pool(RunError::TimedOut));
            }
        }

        if !self.coords.iter().any(|c| c.id == obs.coordinate_id) {
            return Ok(WriteOutcome::RejectedForeignKey);
        }

        if self.rejected.contains(&obs.coordinate_id) {
            return Ok(WriteOutcome::RejectedRow);
        }

        let mut rows = self.rows.lock().unwrap();
        let key = (obs.coordinate_id, obs.time);
        if rows.contains_key(&key) {
            Ok(WriteOutcome::AlreadyExists)
        } else {
            rows.insert(key, obs.clone());
            Ok(WriteOutcome::Inserted)
        }
    }
}
