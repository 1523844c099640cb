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

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use std::fmt;
use thiserror::Error;

const MIN_TEMPERATURE_C: f64 = -100.0;
const MAX_TEMPERATURE_C: f64 = 70.0;
/// Largest value a `NUMERIC(5, 2)` column holds.
const MAX_STORED_DECIMAL: f64 = 999.99;

/// A fixed point on the polling grid, as stored in the `coords` table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub id: i32,
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(id: i32, lat: f64, lon: f64) -> Self {
        Coordinate { id, lat, lon }
    }

    /// Ensure the latitude and longitude are real positions on the globe.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(ValidationError::new(Field::Latitude, self.lat));
        }

        if !self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon) {
            return Err(ValidationError::new(Field::Longitude, self.lon));
        }

        Ok(())
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2}, {:.2})", self.id, self.lat, self.lon)
    }
}

/// Current conditions for a single coordinate, already translated from the
/// remote API schema into our units (celsius, percent, millimeters, km/h, degrees).
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub temperature: f64,
    pub humidity: i32,
    pub clouds: i32,
    pub rain: f64,
    pub wind: f64,
    pub wind_dir: i32,
    pub gusts: Option<f64>,
    /// When the source last updated this reading. Informational only, observations
    /// are keyed by the run timestamp.
    pub source_time: Option<DateTime<Utc>>,
}

impl Reading {
    /// Round decimals to the precision stored in the database and fold a wind
    /// direction of 360 into 0.
    pub fn normalize(self) -> Self {
        Reading {
            temperature: round2(self.temperature),
            rain: round2(self.rain),
            wind: round2(self.wind),
            gusts: self.gusts.map(round2),
            wind_dir: if self.wind_dir == 360 { 0 } else { self.wind_dir },
            ..self
        }
    }

    /// Check every field against its physical bounds, returning the first field
    /// that is out of range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.temperature.is_finite() || !(MIN_TEMPERATURE_C..=MAX_TEMPERATURE_C).contains(&self.temperature) {
            return Err(ValidationError::new(Field::Temperature, self.temperature));
        }

        if !(0..=100).contains(&self.humidity) {
            return Err(ValidationError::new(Field::Humidity, self.humidity));
        }

        if !(0..=100).contains(&self.clouds) {
            return Err(ValidationError::new(Field::Clouds, self.clouds));
        }

        check_stored_decimal(Field::Rain, self.rain)?;
        check_stored_decimal(Field::Wind, self.wind)?;

        if !(0..=359).contains(&self.wind_dir) {
            return Err(ValidationError::new(Field::WindDirection, self.wind_dir));
        }

        if let Some(gusts) = self.gusts {
            check_stored_decimal(Field::Gusts, gusts)?;
        }

        Ok(())
    }
}

/// A validated reading bound to the coordinate it was taken for and the
/// timestamp of the run that fetched it. One row of the `data` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub coordinate_id: i32,
    pub time: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: i32,
    pub clouds: i32,
    pub rain: f64,
    pub wind: f64,
    pub wind_dir: i32,
    pub gusts: Option<f64>,
}

impl Observation {
    /// Normalize and validate a reading, producing a row that is safe to persist.
    pub fn from_reading(coordinate: &Coordinate, time: DateTime<Utc>, reading: Reading) -> Result<Self, ValidationError> {
        let reading = reading.normalize();
        reading.validate()?;

        Ok(Observation {
            coordinate_id: coordinate.id,
            time,
            temperature: reading.temperature,
            humidity: reading.humidity,
            clouds: reading.clouds,
            rain: reading.rain,
            wind: reading.wind,
            wind_dir: reading.wind_dir,
            gusts: reading.gusts,
        })
    }
}

/// Field of a coordinate or reading that failed a sanity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Latitude,
    Longitude,
    Temperature,
    Humidity,
    Clouds,
    Rain,
    Wind,
    WindDirection,
    Gusts,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Latitude => "lat",
            Self::Longitude => "lon",
            Self::Temperature => "temp",
            Self::Humidity => "humidity",
            Self::Clouds => "clouds",
            Self::Rain => "rain",
            Self::Wind => "wind",
            Self::WindDirection => "wind_dir",
            Self::Gusts => "gusts",
        };

        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field} out of range: {value}")]
pub struct ValidationError {
    pub field: Field,
    pub value: String,
}

impl ValidationError {
    fn new<V: fmt::Display>(field: Field, value: V) -> Self {
        ValidationError {
            field,
            value: value.to_string(),
        }
    }
}

/// Timestamp shared by every observation in a run: the given instant truncated
/// to the start of its hour.
pub fn run_timestamp(now: DateTime<Utc>) -> DateTime<Utc> {
    now.duration_trunc(TimeDelta::hours(1)).unwrap_or(now)
}

fn check_stored_decimal(field: Field, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && (0.0..=MAX_STORED_DECIMAL).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::new(field, value))
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
