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

use std::time::Duration;
use tokio::time::Instant;

/// Longest month, so a per-run cap derived from it holds for every month.
const DAYS_PER_MONTH: u64 = 31;

/// Call budget for the remote API.
///
/// Nothing is tracked between runs. Instead each run is limited to its share of
/// the monthly quota, assuming the external scheduler triggers `runs_per_day`
/// runs every day of a 31 day month. As long as the schedule matches, the
/// monthly total can't exceed the quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    monthly_quota: u64,
    runs_per_day: u32,
    per_minute_limit: Option<u32>,
}

impl QuotaPolicy {
    pub fn new(monthly_quota: u64, runs_per_day: u32, per_minute_limit: Option<u32>) -> Self {
        QuotaPolicy {
            monthly_quota,
            runs_per_day,
            per_minute_limit,
        }
    }

    /// Maximum number of requests a single run may make.
    pub fn per_run_cap(&self) -> u64 {
        let runs_per_month = u64::from(self.runs_per_day.max(1)) * DAYS_PER_MONTH;
        self.monthly_quota / runs_per_month
    }

    /// Minimum time between the start of two consecutive requests.
    pub fn min_interval(&self) -> Duration {
        match self.per_minute_limit {
            Some(n) if n > 0 => Duration::from_secs(60) / n,
            _ => Duration::ZERO,
        }
    }
}

/// Result of asking the limiter for permission to make a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    Granted,
    CapReached,
}

/// Paces requests within a single run and enforces the per-run cap.
#[derive(Debug)]
pub struct RateLimiter {
    cap: u64,
    issued: u64,
    min_interval: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(policy: &QuotaPolicy) -> Self {
        RateLimiter {
            cap: policy.per_run_cap(),
            issued: 0,
            min_interval: policy.min_interval(),
            last: None,
        }
    }

    /// Wait until the next request is allowed, or return `Permit::CapReached`
    /// immediately if this run has used its whole budget.
    pub async fn acquire(&mut self) -> Permit {
        if self.issued >= self.cap {
            return Permit::CapReached;
        }

        if let Some(last) = self.last {
            let next = last + self.min_interval;
            if Instant::now() < next {
                tracing::trace!(message = "pacing before next request", delay = ?(next - Instant::now()));
                tokio::time::sleep_until(next).await;
            }
        }

        self.last = Some(Instant::now());
        self.issued += 1;
        Permit::Granted
    }

    pub fn issued(&self) -> u64 {
        self.issued
    }

    pub fn cap(&self) -> u64 {
        self.cap
    }
}
