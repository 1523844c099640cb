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

use crate::config::ApiConfig;
use crate::model::{Coordinate, Reading};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Why the current conditions for a coordinate could not be fetched.
///
/// Every variant is a per-coordinate failure except `AuthOrQuota`, which means
/// every following request will fail the same way.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("API key rejected or quota exhausted ({status}): {message}")]
    AuthOrQuota { status: StatusCode, message: String },

    #[error("rate limited by API ({0})")]
    RateLimited(StatusCode),

    #[error("server error {0}")]
    Server(StatusCode),

    #[error("request rejected ({status}): {message}")]
    Rejected { status: StatusCode, message: String },

    #[error("unable to decode response: {0}")]
    Decode(#[source] serde_json::Error),
}

impl FetchError {
    /// True if this failure will repeat for every coordinate in the run.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Self::AuthOrQuota { .. })
    }
}

/// Source of current weather conditions for a coordinate.
#[async_trait]
pub trait WeatherSource {
    async fn current(&self, coordinate: &Coordinate) -> Result<Reading, FetchError>;
}

/// Client for the weatherapi.com `current.json` endpoint.
#[derive(Debug)]
pub struct WeatherApiClient {
    client: Client,
    base_url: Url,
    api_key: String,
    timeout: Duration,
}

impl WeatherApiClient {
    const USER_AGENT: &'static str = "weatherlog (https://github.com/56quarters/weatherlog)";
    const JSON_RESPONSE: &'static str = "application/json";
    const REDACTED: &'static str = "REDACTED";

    pub fn new(client: Client, config: &ApiConfig) -> Self {
        WeatherApiClient {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        }
    }

    fn current_url(&self, coordinate: &Coordinate, key: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut p) = url.path_segments_mut() {
            p.pop_if_empty().push("current.json");
        }

        url.query_pairs_mut()
            .append_pair("key", key)
            .append_pair("q", &format!("{},{}", coordinate.lat, coordinate.lon))
            .append_pair("aqi", "no");

        url
    }
}

#[async_trait]
impl WeatherSource for WeatherApiClient {
    async fn current(&self, coordinate: &Coordinate) -> Result<Reading, FetchError> {
        let request_url = self.current_url(coordinate, &self.api_key);
        tracing::debug!(
            message = "making current conditions request",
            url = %self.current_url(coordinate, Self::REDACTED),
        );

        let res = self
            .client
            .get(request_url)
            .header(USER_AGENT, Self::USER_AGENT)
            .header(ACCEPT, Self::JSON_RESPONSE)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = res.status();
        let body = res.text().await.map_err(|e| self.transport_error(e))?;
        tracing::trace!(message = "received API response", status = %status, body = %body);

        if status != StatusCode::OK {
            return Err(classify_status(status, &body));
        }

        parse_current(&body)
    }
}

impl WeatherApiClient {
    fn transport_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transport(e)
        }
    }
}

/// Map a non-200 response to the matching failure, using the message from the
/// API error body when there is one.
pub fn classify_status(status: StatusCode, body: &str) -> FetchError {
    let message = serde_json::from_str::<ApiErrorResponse>(body)
        .map(|e| format!("{} (code {})", e.error.message, e.error.code))
        .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown").to_owned());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::AuthOrQuota { status, message },
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited(status),
        s if s.is_server_error() => FetchError::Server(s),
        _ => FetchError::Rejected { status, message },
    }
}

/// Decode a `current.json` response body into a `Reading`.
pub fn parse_current(body: &str) -> Result<Reading, FetchError> {
    let res = serde_json::from_str::<CurrentResponse>(body).map_err(FetchError::Decode)?;
    Ok(res.current.into())
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CurrentResponse {
    #[serde(alias = "current")]
    pub current: Current,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Current {
    #[serde(alias = "last_updated_epoch")]
    pub last_updated_epoch: Option<i64>,
    #[serde(alias = "temp_c")]
    pub temp_c: f64,
    #[serde(alias = "humidity")]
    pub humidity: i32,
    #[serde(alias = "cloud")]
    pub cloud: i32,
    #[serde(alias = "precip_mm")]
    pub precip_mm: f64,
    #[serde(alias = "wind_kph")]
    pub wind_kph: f64,
    #[serde(alias = "wind_degree")]
    pub wind_degree: i32,
    #[serde(alias = "gust_kph")]
    pub gust_kph: Option<f64>,
}

impl From<Current> for Reading {
    fn from(c: Current) -> Self {
        Reading {
            temperature: c.temp_c,
            humidity: c.humidity,
            clouds: c.cloud,
            rain: c.precip_mm,
            wind: c.wind_kph,
            wind_dir: c.wind_degree,
            gusts: c.gust_kph,
            source_time: c.last_updated_epoch.and_then(|s| DateTime::from_timestamp(s, 0)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ApiErrorResponse {
    #[serde(alias = "error")]
    pub error: ApiErrorBody,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ApiErrorBody {
    #[serde(alias = "code")]
    pub code: i64,
    #[serde(alias = "message")]
    pub message: String,
}
