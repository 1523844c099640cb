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

//! Weather observation ingestion for a coordinate grid
//!
//! ## Features
//!
//! `weatherlog` fetches current conditions for every coordinate of a fixed grid from the
//! [weatherapi.com] API and stores one row per coordinate in a PostgreSQL database for later
//! analysis. It is meant to be run from a scheduler (cron, a systemd timer) every few hours.
//! The following values are stored for each coordinate when available.
//!
//! * `temp` - Temperature, in degrees celsius.
//! * `humidity` - Relative humidity (0-100).
//! * `clouds` - Cloud cover (0-100).
//! * `rain` - Precipitation, in millimeters.
//! * `wind` - Wind speed, in km/h.
//! * `wind_dir` - Wind direction, in degrees (0-359).
//! * `gusts` - Gust speed, in km/h (may be missing).
//!
//! Every row written during a run uses the same timestamp: the start of the hour the run
//! started in (UTC). Running again for the same hour doesn't create duplicates, rows that
//! already exist are left alone.
//!
//! [weatherapi.com]: https://www.weatherapi.com/docs/
//!
//! ## Build
//!
//! `weatherlog` is a Rust program and must be built from source using a [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! git clone git@github.com:56quarters/weatherlog.git && cd weatherlog
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! ### Database
//!
//! `weatherlog` expects two tables to exist. The `coords` table must be filled with the grid
//! to poll before the first run.
//!
//! ```text
//! CREATE TABLE coords (
//!     id INTEGER PRIMARY KEY,
//!     lat NUMERIC(5, 2) NOT NULL,
//!     lon NUMERIC(5, 2) NOT NULL
//! );
//!
//! CREATE TABLE data (
//!     id INTEGER NOT NULL REFERENCES coords (id),
//!     time TIMESTAMP NOT NULL,
//!     temp NUMERIC(5, 2),
//!     humidity SMALLINT,
//!     clouds SMALLINT,
//!     rain NUMERIC(5, 2),
//!     wind NUMERIC(5, 2),
//!     wind_dir SMALLINT,
//!     gusts NUMERIC(5, 2),
//!     PRIMARY KEY (id, time)
//! );
//!
//! CREATE INDEX data_time_idx ON data (time);
//! ```
//!
//! ### Run
//!
//! Credentials can be given as flags or environment variables.
//!
//! ```text
//! export WEATHERLOG_API_KEY=...
//! export WEATHERLOG_DB_PASSWORD=...
//! ./weatherlog --db-host localhost --db-user weather --db-name weather
//! ```
//!
//! A crontab entry to run every three hours might look like this.
//!
//! ```text
//! 0 */3 * * * /usr/local/bin/weatherlog --runs-per-day 8 --db-host localhost --db-user weather --db-name weather
//! ```
//!
//! ### Quota
//!
//! Each run makes at most `monthly-quota / (runs-per-day * 31)` requests so that a month of
//! scheduled runs stays under the API quota. Coordinates beyond that cap are skipped for
//! the run. Use `--per-minute-limit` to additionally space requests out.
//!
//! ### Exit status
//!
//! * `0` - Every coordinate was recorded.
//! * `1` - Invalid configuration or the database could not be reached at startup.
//! * `2` - Some coordinates were recorded, some failed or were skipped.
//! * `3` - No coordinates were recorded.
//! * `4` - The run was abandoned: the API key was rejected, the quota is exhausted, or the
//!   database stopped accepting writes.
//!

pub mod client;
pub mod config;
pub mod ingest;
pub mod limiter;
pub mod model;
pub mod store;

#[cfg(test)]
mod testing;
